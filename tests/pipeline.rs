use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use job104_crawler::writer::read_table;
use job104_crawler::{
    BrowserSession, CheckpointStore, CrawlContext, CrawlError, CrawlPipeline, CrawlPolicy,
    Diagnostics, InterruptFlag, Job104Client, ListPageCrawler, Locator, OutputPaths,
    OutputStore, RunStage, SessionLauncher,
};
use scraper::Html;
use tempfile::TempDir;

#[derive(Default)]
struct FakeSite {
    pages: HashMap<String, String>,
    unreachable: HashSet<String>,
    drops_session_once: RefCell<HashSet<String>>,
    interrupts_on: HashMap<String, InterruptFlag>,
    visits: RefCell<Vec<String>>,
}

impl FakeSite {
    fn visits_to(&self, url: &str) -> usize {
        self.visits.borrow().iter().filter(|v| v.as_str() == url).count()
    }
}

struct FakeSession {
    site: Rc<FakeSite>,
    current: Option<String>,
}

impl BrowserSession for FakeSession {
    fn navigate(&mut self, url: &str) -> job104_crawler::Result<()> {
        self.site.visits.borrow_mut().push(url.to_string());
        self.current = Some(url.to_string());
        if self.site.drops_session_once.borrow_mut().remove(url) {
            return Err(CrawlError::SessionLost("target closed".into()));
        }
        if let Some(flag) = self.site.interrupts_on.get(url) {
            flag.raise();
        }
        if self.site.unreachable.contains(url) {
            return Err(CrawlError::Browser("net::ERR_CONNECTION_RESET".into()));
        }
        Ok(())
    }

    fn title(&self) -> job104_crawler::Result<String> {
        Ok("104人力銀行".to_string())
    }

    fn content(&self) -> job104_crawler::Result<String> {
        let html = self
            .current
            .as_ref()
            .and_then(|url| self.site.pages.get(url))
            .cloned()
            .unwrap_or_else(|| "<html><body>blocked</body></html>".to_string());
        Ok(html)
    }

    fn wait_for(&self, locator: &Locator, _timeout: Duration) -> job104_crawler::Result<bool> {
        let document = Html::parse_document(&self.content()?);
        Ok(locator.find_text(&document).is_some())
    }

    fn scroll_to_bottom(&self) -> job104_crawler::Result<()> {
        Ok(())
    }
}

struct FakeLauncher {
    site: Rc<FakeSite>,
    launches: Rc<Cell<u32>>,
}

impl SessionLauncher for FakeLauncher {
    type Session = FakeSession;

    fn launch(&self, _user_agent: &str) -> job104_crawler::Result<FakeSession> {
        self.launches.set(self.launches.get() + 1);
        Ok(FakeSession {
            site: Rc::clone(&self.site),
            current: None,
        })
    }
}

fn listing(ids: &[&str]) -> String {
    let cards: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<div class="info-container">
                     <h2><a data-gtm-joblist="職缺-職缺名稱" href="https://www.104.com.tw/job/{id}">職缺 {id}</a></h2>
                     <div class="info-tags"><a data-gtm-joblist="職缺-薪資">月薪40,000~60,000元</a></div>
                   </div>
                   <div class="date-container">10/18</div>"#
            )
        })
        .collect();
    format!("<html><body>{cards}</body></html>")
}

fn detail_page(text: &str) -> String {
    format!(
        r#"<html><body>
             <p class="job-description__content">{text}</p>
             <div class="job-description-table">
               <div class="list-row"><h3 class="h3">遠端工作</h3><div class="t3 mb-0">完全遠端</div></div>
             </div>
           </body></html>"#
    )
}

fn detail_url(id: &str) -> String {
    format!("https://www.104.com.tw/job/{id}")
}

struct Harness {
    dir: TempDir,
    site: Rc<FakeSite>,
    launches: Rc<Cell<u32>>,
    client: Job104Client,
}

impl Harness {
    fn new(build: impl FnOnce(&Job104Client, &mut FakeSite)) -> Self {
        let client = Job104Client::default();
        let mut site = FakeSite::default();
        build(&client, &mut site);
        Self {
            dir: TempDir::new().unwrap(),
            site: Rc::new(site),
            launches: Rc::new(Cell::new(0)),
            client,
        }
    }

    fn paths(&self) -> OutputPaths {
        OutputPaths {
            csv: self.dir.path().join("jobs.csv"),
            json: self.dir.path().join("jobs.json"),
        }
    }

    fn checkpoint_path(&self) -> std::path::PathBuf {
        self.dir.path().join("checkpoint.json")
    }

    fn pipeline(&self) -> CrawlPipeline<Job104Client, FakeLauncher> {
        let launcher = FakeLauncher {
            site: Rc::clone(&self.site),
            launches: Rc::clone(&self.launches),
        };
        let ctx = CrawlContext::new(
            launcher,
            CrawlPolicy::immediate(),
            Diagnostics::new(self.dir.path(), false),
        );
        CrawlPipeline::new(
            Job104Client::default(),
            ctx,
            CheckpointStore::new(self.checkpoint_path()),
            OutputStore::new(self.paths()),
        )
    }

    fn dir(&self) -> &Path {
        self.dir.path()
    }
}

#[test]
fn skips_known_and_failed_jobs_and_persists_the_rest() {
    let harness = Harness::new(|client, site| {
        site.pages
            .insert(client.build_page_url(1), listing(&["A", "B", "C"]));
        site.unreachable.insert(detail_url("A"));
        site.pages
            .insert(detail_url("C"), detail_page("Python and SQL pipelines"));
    });

    let existing: HashSet<String> = ["B".to_string()].into_iter().collect();
    let mut pipeline = harness.pipeline().with_existing_ids(existing);
    let summary = pipeline.run(1, 1).unwrap();

    assert_eq!(pipeline.stage(), RunStage::Done);
    assert_eq!(summary.pages_completed, 1);
    assert_eq!(summary.details_collected, 1);
    assert_eq!(summary.rows_in_table, 1);

    let table = read_table(&harness.paths().csv).unwrap();
    assert_eq!(table.len(), 1);
    let row = &table[0];
    assert_eq!(row.job_id(), "C");
    assert_eq!(row.skills, vec!["Python", "SQL"]);
    assert_eq!(row.remote_work, "完全遠端");
    assert_eq!(row.summary.salary_info.salary_avg, Some(50000.0));

    assert_eq!(harness.site.visits_to(&detail_url("A")), 3);
    assert_eq!(harness.site.visits_to(&detail_url("B")), 0);
    assert!(harness.dir().join("error_A.html").exists());
    assert!(harness.paths().json.exists());
    assert_eq!(CheckpointStore::new(harness.checkpoint_path()).load(), 1);
}

#[test]
fn resumes_from_the_later_of_checkpoint_and_start_page() {
    let harness = Harness::new(|client, site| {
        site.pages.insert(client.build_page_url(3), listing(&["X"]));
        site.pages.insert(detail_url("X"), detail_page("Kafka"));
    });
    CheckpointStore::new(harness.checkpoint_path()).save(3).unwrap();

    let mut pipeline = harness.pipeline();
    let summary = pipeline.run(2, 3).unwrap();

    assert_eq!(summary.first_page, 3);
    assert_eq!(summary.pages_completed, 1);
    assert_eq!(harness.site.visits_to(&harness.client.build_page_url(2)), 0);
    assert_eq!(harness.site.visits_to(&harness.client.build_page_url(3)), 1);
}

#[test]
fn listing_without_container_is_retried_then_skipped() {
    let harness = Harness::new(|client, site| {
        site.pages
            .insert(client.build_page_url(1), "<html><body>maintenance</body></html>".into());
    });

    let mut pipeline = harness.pipeline();
    let summary = pipeline.run(1, 1).unwrap();

    let url = harness.client.build_page_url(1);
    assert_eq!(harness.site.visits_to(&url), 3);
    assert_eq!(summary.details_collected, 0);
    assert_eq!(CheckpointStore::new(harness.checkpoint_path()).load(), 1);
    assert!(!harness.paths().csv.exists());
}

#[test]
fn lost_session_is_relaunched_and_the_unit_retried() {
    let harness = Harness::new(|client, site| {
        site.pages.insert(client.build_page_url(1), listing(&["Q"]));
        site.pages.insert(detail_url("Q"), detail_page("Docker"));
        site.drops_session_once.borrow_mut().insert(detail_url("Q"));
    });

    let mut pipeline = harness.pipeline();
    let summary = pipeline.run(1, 1).unwrap();

    assert_eq!(summary.details_collected, 1);
    assert_eq!(harness.launches.get(), 2);
    assert_eq!(pipeline.context().sessions.launches(), 2);
    assert_eq!(harness.site.visits_to(&detail_url("Q")), 2);
}

#[test]
fn interruption_stops_before_the_next_unit() {
    let harness = Harness::new(|client, site| {
        site.pages.insert(client.build_page_url(1), listing(&["A"]));
    });

    let interrupt = InterruptFlag::new();
    interrupt.raise();
    let mut pipeline = harness.pipeline().with_interrupt(interrupt);
    let summary = pipeline.run(1, 5).unwrap();

    assert!(summary.interrupted);
    assert_eq!(pipeline.stage(), RunStage::Interrupted);
    assert_eq!(summary.pages_completed, 0);
    assert!(harness.site.visits.borrow().is_empty());
}

#[test]
fn interruption_mid_page_saves_buffered_rows_without_checkpointing() {
    let interrupt = InterruptFlag::new();
    let harness = Harness::new(|client, site| {
        site.pages
            .insert(client.build_page_url(1), listing(&["A", "B", "C"]));
        site.pages.insert(detail_url("A"), detail_page("Airflow"));
        site.pages.insert(detail_url("B"), detail_page("Kafka"));
        site.pages.insert(detail_url("C"), detail_page("Spark"));
        site.interrupts_on.insert(detail_url("A"), interrupt.clone());
    });

    let mut pipeline = harness.pipeline().with_interrupt(interrupt);
    let summary = pipeline.run(1, 3).unwrap();

    assert!(summary.interrupted);
    assert_eq!(pipeline.stage(), RunStage::Interrupted);
    assert_eq!(summary.pages_completed, 0);
    assert_eq!(summary.details_collected, 1);
    assert_eq!(summary.rows_in_table, 1);
    assert_eq!(harness.site.visits_to(&detail_url("B")), 0);
    assert_eq!(harness.site.visits_to(&harness.client.build_page_url(2)), 0);

    let table = read_table(&harness.paths().csv).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].job_id(), "A");
    assert_eq!(table[0].skills, vec!["Airflow"]);
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(harness.paths().json).unwrap()).unwrap();
    assert_eq!(json[0]["job_id"], "A");

    assert!(!harness.checkpoint_path().exists());
}

#[test]
fn flushes_every_few_pages_and_dedups_across_pages() {
    let harness = Harness::new(|client, site| {
        site.pages.insert(client.build_page_url(1), listing(&["A"]));
        site.pages.insert(client.build_page_url(2), listing(&["A", "B"]));
        site.pages.insert(detail_url("A"), detail_page("Spark"));
        site.pages.insert(detail_url("B"), detail_page("Scala"));
    });

    let launcher = FakeLauncher {
        site: Rc::clone(&harness.site),
        launches: Rc::clone(&harness.launches),
    };
    let policy = CrawlPolicy {
        flush_every: 1,
        relaunch_every: 2,
        ..CrawlPolicy::immediate()
    };
    let ctx = CrawlContext::new(launcher, policy, Diagnostics::new(harness.dir(), false));
    let mut pipeline = CrawlPipeline::new(
        Job104Client::default(),
        ctx,
        CheckpointStore::new(harness.checkpoint_path()),
        OutputStore::new(harness.paths()),
    );
    let summary = pipeline.run(1, 2).unwrap();

    assert_eq!(summary.details_collected, 3);
    assert_eq!(summary.rows_in_table, 2);
    // Three detail pages with a relaunch after every second one.
    assert_eq!(harness.launches.get(), 2);

    let ids: Vec<String> = read_table(&harness.paths().csv)
        .unwrap()
        .iter()
        .map(|job| job.job_id().to_string())
        .collect();
    assert_eq!(ids, vec!["A", "B"]);
}
