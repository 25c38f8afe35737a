use crate::diagnostics::Diagnostics;
use crate::models::{JobDetail, JobSummary, UNKNOWN};
use crate::policy::CrawlPolicy;
use crate::session::{BrowserSession, Locator, SessionLauncher, SessionManager};
use crate::Result;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

const CHALLENGE_TITLE: &str = "Just a moment...";

/// Result of one attempt at a page. `Err` is reserved for a dead session or a
/// failed relaunch; everything the retry loops expect lives here.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Found(T),
    Empty,
    Failed(String),
}

/// Everything a fetch needs besides the site itself.
pub struct CrawlContext<L: SessionLauncher> {
    pub sessions: SessionManager<L>,
    pub policy: CrawlPolicy,
    pub diagnostics: Diagnostics,
}

impl<L: SessionLauncher> CrawlContext<L> {
    pub fn new(launcher: L, policy: CrawlPolicy, diagnostics: Diagnostics) -> Self {
        Self {
            sessions: SessionManager::new(launcher, &policy),
            policy,
            diagnostics,
        }
    }
}

pub fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

pub fn is_challenge_title(title: &str) -> bool {
    title.contains(CHALLENGE_TITLE)
}

/// Drops entries repeated on the same page and entries captured by earlier runs.
pub fn filter_new_jobs(summaries: Vec<JobSummary>, existing: &HashSet<String>) -> Vec<JobSummary> {
    let mut seen = HashSet::new();
    summaries
        .into_iter()
        .filter(|job| {
            if !seen.insert(job.job_id.clone()) {
                debug!(job_id = %job.job_id, "skipping duplicate entry on page");
                return false;
            }
            if existing.contains(&job.job_id) {
                debug!(job_id = %job.job_id, "skipping job captured by a previous run");
                return false;
            }
            true
        })
        .collect()
}

pub trait ListPageCrawler {
    fn build_page_url(&self, page: u32) -> String;

    /// Element whose presence means the result list has rendered.
    fn list_ready_locator(&self) -> Locator;

    fn parse_list_page(&self, html: &str, source_url: &str) -> Vec<JobSummary>;

    /// Loads one search-results page and returns the entries not seen before.
    /// Exhausted retries give an empty batch; only a failed relaunch is an error.
    fn harvest_page<L: SessionLauncher>(
        &self,
        ctx: &mut CrawlContext<L>,
        url: &str,
        existing: &HashSet<String>,
    ) -> Result<Vec<JobSummary>> {
        let max_attempts = ctx.policy.list_max_attempts.max(1);
        let mut relaunched = false;
        let mut attempt = 1;

        while attempt <= max_attempts {
            match self.load_list_page(ctx, url, attempt) {
                Ok(FetchOutcome::Found(summaries)) => {
                    let fresh = filter_new_jobs(summaries, existing);
                    info!(url, new_jobs = fresh.len(), "collected listing entries");
                    return Ok(fresh);
                }
                Ok(FetchOutcome::Empty) => {
                    warn!(url, "no listing entries found, selectors may be stale");
                    return Ok(Vec::new());
                }
                Ok(FetchOutcome::Failed(reason)) => {
                    warn!(url, attempt, max_attempts, %reason, "listing page attempt failed");
                }
                Err(err) if err.is_session_lost() => {
                    warn!(url, error = %err, "browser session lost while loading listing");
                    ctx.sessions.relaunch()?;
                    if !relaunched {
                        relaunched = true;
                        continue;
                    }
                }
                Err(err) => {
                    warn!(url, attempt, max_attempts, error = %err, "listing page attempt failed");
                }
            }

            if attempt < max_attempts {
                ctx.policy.list_retry_backoff.scaled(attempt).pause();
            }
            attempt += 1;
        }

        error!(url, "giving up on listing page");
        Ok(Vec::new())
    }

    fn load_list_page<L: SessionLauncher>(
        &self,
        ctx: &mut CrawlContext<L>,
        url: &str,
        attempt: u32,
    ) -> Result<FetchOutcome<Vec<JobSummary>>> {
        let policy = &ctx.policy;
        let session = ctx.sessions.session()?;

        session.navigate(url)?;
        policy.list_load_delay.pause();

        let title = session.title()?;
        debug!(url, %title, "listing page loaded");
        if is_challenge_title(&title) {
            warn!(url, "anti-bot interstitial detected, waiting for it to clear");
            policy.challenge_delay.pause();
            if is_challenge_title(&session.title()?) {
                return Ok(FetchOutcome::Failed("anti-bot interstitial did not clear".into()));
            }
        }

        if ctx.diagnostics.dumps_list_pages() {
            ctx.diagnostics.dump_list_attempt(attempt, &session.content()?);
        }

        if !session.wait_for(&self.list_ready_locator(), policy.list_wait_timeout())? {
            return Ok(FetchOutcome::Failed("listing container did not appear".into()));
        }
        policy.list_settle_delay.pause();

        let html = session.content()?;
        let summaries = self.parse_list_page(&html, url);
        info!(url, attempt, entries = summaries.len(), "parsed listing page");

        if summaries.is_empty() {
            Ok(FetchOutcome::Empty)
        } else {
            Ok(FetchOutcome::Found(summaries))
        }
    }
}

pub trait DetailCrawler {
    fn detail_url(&self, job_id: &str) -> String;

    /// Tried in order; the first one present supplies the description.
    fn description_locators(&self) -> &[Locator];

    fn parse_detail(&self, html: &str, summary: &JobSummary, description: String) -> JobDetail;

    /// Fetches one posting. `Ok(None)` means the posting was skipped after
    /// exhausting retries; its markup is left in the diagnostics directory.
    fn fetch_detail<L: SessionLauncher>(
        &self,
        ctx: &mut CrawlContext<L>,
        summary: &JobSummary,
    ) -> Result<Option<JobDetail>> {
        let job_id = summary.job_id.as_str();
        let max_attempts = ctx.policy.detail_max_attempts.max(1);
        let mut relaunched = false;
        let mut attempt = 1;

        while attempt <= max_attempts {
            match self.load_detail_page(ctx, summary) {
                Ok(FetchOutcome::Found(detail)) => return Ok(Some(detail)),
                Ok(FetchOutcome::Empty) => {
                    warn!(job_id, attempt, "detail page had no content");
                }
                Ok(FetchOutcome::Failed(reason)) => {
                    warn!(job_id, attempt, max_attempts, %reason, "detail attempt failed");
                }
                Err(err) if err.is_session_lost() => {
                    warn!(job_id, error = %err, "browser session lost while loading detail");
                    ctx.sessions.relaunch()?;
                    if !relaunched {
                        relaunched = true;
                        continue;
                    }
                }
                Err(err) => {
                    warn!(job_id, attempt, max_attempts, error = %err, "detail attempt failed");
                }
            }

            if attempt < max_attempts {
                ctx.policy.detail_retry_backoff.scaled(attempt).pause();
            }
            attempt += 1;
        }

        error!(job_id, "giving up on detail page");
        let markup = ctx
            .sessions
            .session()
            .and_then(|session| session.content());
        match markup {
            Ok(html) => {
                ctx.diagnostics.dump_failed_detail(job_id, &html);
            }
            Err(err) => warn!(job_id, error = %err, "could not read markup of failed page"),
        }
        Ok(None)
    }

    fn load_detail_page<L: SessionLauncher>(
        &self,
        ctx: &mut CrawlContext<L>,
        summary: &JobSummary,
    ) -> Result<FetchOutcome<JobDetail>> {
        let policy = &ctx.policy;
        let session = ctx.sessions.session()?;
        let url = self.detail_url(&summary.job_id);

        session.navigate(&url)?;
        for _ in 0..policy.detail_scroll_passes {
            session.scroll_to_bottom()?;
            policy.detail_scroll_delay.pause();
        }

        if is_challenge_title(&session.title()?) {
            return Ok(FetchOutcome::Failed("anti-bot interstitial on detail page".into()));
        }

        let mut description = None;
        for locator in self.description_locators() {
            if session.wait_for(locator, policy.detail_wait_timeout())? {
                let document = Html::parse_document(&session.content()?);
                if let Some(text) = locator.find_text(&document) {
                    description = Some(text);
                    break;
                }
            }
        }
        let description = description.unwrap_or_else(|| {
            warn!(job_id = %summary.job_id, "job description not found");
            UNKNOWN.to_string()
        });

        policy.detail_settle_delay.pause();

        let html = session.content()?;
        if html.trim().is_empty() {
            return Ok(FetchOutcome::Empty);
        }
        Ok(FetchOutcome::Found(self.parse_detail(&html, summary, description)))
    }
}
