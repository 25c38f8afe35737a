use crate::crawler::element_text;
use crate::policy::{CrawlPolicy, DelayRange};
use crate::{CrawlError, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::prelude::IndexedRandom;
use scraper::{ElementRef, Html, Selector};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Identity strings rotated across browser launches.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/141.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 Chrome/141.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:129.0) Gecko/20100101 Firefox/129.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 Version/17.0 Safari/605.1.15",
];

/// Something on a live page that can be waited for and read back from its markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    Css(&'static str),
    /// First `<p>` carrying `class` among the following siblings of a
    /// `heading` element whose text contains `label`.
    LabelledSibling {
        heading: &'static str,
        label: &'static str,
        class: &'static str,
    },
}

impl Locator {
    pub fn xpath(&self) -> Option<String> {
        match self {
            Locator::Css(_) => None,
            Locator::LabelledSibling {
                heading,
                label,
                class,
            } => Some(format!(
                "//{heading}[contains(text(), '{label}')]/following-sibling::p[contains(@class, '{class}')]"
            )),
        }
    }

    /// Text of the first element this locator matches in `document`, if non-empty.
    pub fn find_text(&self, document: &Html) -> Option<String> {
        let text = match self {
            Locator::Css(css) => {
                let selector = Selector::parse(css).ok()?;
                document.select(&selector).next().map(element_text)?
            }
            Locator::LabelledSibling {
                heading,
                label,
                class,
            } => {
                let selector = Selector::parse(heading).ok()?;
                document
                    .select(&selector)
                    .filter(|el| element_text(*el).contains(label))
                    .find_map(|el| {
                        el.next_siblings()
                            .filter_map(ElementRef::wrap)
                            .find(|sib| {
                                sib.value().name() == "p"
                                    && sib.value().classes().any(|c| c == *class)
                            })
                    })
                    .map(element_text)?
            }
        };
        (!text.is_empty()).then_some(text)
    }
}

/// One live browser page. Exclusively owned by the run loop.
pub trait BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<()>;

    fn title(&self) -> Result<String>;

    fn content(&self) -> Result<String>;

    /// Blocks until `locator` is present or `timeout` elapses. A timeout is
    /// `Ok(false)`; only a dead session surfaces as an error.
    fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<bool>;

    fn scroll_to_bottom(&self) -> Result<()>;
}

pub trait SessionLauncher {
    type Session: BrowserSession;

    fn launch(&self, user_agent: &str) -> Result<Self::Session>;
}

pub struct ChromeLauncher {
    pub headless: bool,
    pub window_size: (u32, u32),
}

impl ChromeLauncher {
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            window_size: (1920, 1080),
        }
    }
}

impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    fn launch(&self, user_agent: &str) -> Result<ChromeSession> {
        let user_agent_arg = format!("--user-agent={}", user_agent);
        let browser = Browser::new(LaunchOptions {
            headless: self.headless,
            window_size: Some(self.window_size),
            // Pacing pauses can exceed the default idle timeout.
            idle_browser_timeout: Duration::from_secs(900),
            args: vec![
                OsStr::new(&user_agent_arg),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-gpu"),
            ],
            ..Default::default()
        })
        .map_err(|e| CrawlError::Launch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| CrawlError::Launch(e.to_string()))?;

        Ok(ChromeSession {
            tab,
            _browser: browser,
        })
    }
}

pub struct ChromeSession {
    tab: Arc<Tab>,
    // Dropping the browser shuts down the Chrome process.
    _browser: Browser,
}

impl BrowserSession for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(CrawlError::from_browser)?;
        Ok(())
    }

    fn title(&self) -> Result<String> {
        self.tab.get_title().map_err(CrawlError::from_browser)
    }

    fn content(&self) -> Result<String> {
        self.tab.get_content().map_err(CrawlError::from_browser)
    }

    fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<bool> {
        let waited = match (locator, locator.xpath()) {
            (Locator::Css(css), _) => self
                .tab
                .wait_for_element_with_custom_timeout(css, timeout)
                .map(|_| ()),
            (_, Some(xpath)) => self
                .tab
                .wait_for_xpath_with_custom_timeout(&xpath, timeout)
                .map(|_| ()),
            (_, None) => return Ok(false),
        };

        match waited.map_err(CrawlError::from_browser) {
            Ok(()) => Ok(true),
            Err(err) if err.is_session_lost() => Err(err),
            Err(_) => Ok(false),
        }
    }

    fn scroll_to_bottom(&self) -> Result<()> {
        self.tab
            .evaluate("window.scrollTo(0, document.body.scrollHeight)", false)
            .map_err(CrawlError::from_browser)?;
        Ok(())
    }
}

/// Holds the single browser session and decides when it is replaced.
pub struct SessionManager<L: SessionLauncher> {
    launcher: L,
    session: Option<L::Session>,
    relaunch_every: u32,
    settle_delay: DelayRange,
    processed_details: u32,
    launches: u32,
}

impl<L: SessionLauncher> SessionManager<L> {
    pub fn new(launcher: L, policy: &CrawlPolicy) -> Self {
        Self {
            launcher,
            session: None,
            relaunch_every: policy.relaunch_every,
            settle_delay: policy.relaunch_settle_delay,
            processed_details: 0,
            launches: 0,
        }
    }

    /// Launches the first session; failing here ends the run.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_none() {
            self.session = Some(self.launch()?);
        }
        Ok(())
    }

    pub fn session(&mut self) -> Result<&mut L::Session> {
        self.start()?;
        self.session
            .as_mut()
            .ok_or_else(|| CrawlError::SessionLost("no active browser session".to_string()))
    }

    pub fn relaunch(&mut self) -> Result<()> {
        if self.session.take().is_some() {
            info!("closed previous browser session");
        }
        self.session = Some(self.launch()?);
        Ok(())
    }

    /// Counts a finished detail page and relaunches on the configured cadence.
    pub fn record_detail_processed(&mut self) -> Result<()> {
        self.processed_details += 1;
        if self.relaunch_every > 0 && self.processed_details % self.relaunch_every == 0 {
            info!(
                processed = self.processed_details,
                "relaunching browser after scheduled number of detail pages"
            );
            self.relaunch()?;
        }
        Ok(())
    }

    pub fn launches(&self) -> u32 {
        self.launches
    }

    pub fn processed_details(&self) -> u32 {
        self.processed_details
    }

    pub fn shutdown(&mut self) {
        if self.session.take().is_some() {
            info!("browser session closed");
        }
    }

    fn launch(&mut self) -> Result<L::Session> {
        let user_agent = USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        let session = self.launcher.launch(user_agent).inspect_err(|e| {
            warn!(error = %e, "browser launch failed");
        })?;
        self.launches += 1;
        info!(launch = self.launches, user_agent, "browser session started");
        self.settle_delay.pause();
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct NullSession;

    impl BrowserSession for NullSession {
        fn navigate(&mut self, _url: &str) -> Result<()> {
            Ok(())
        }
        fn title(&self) -> Result<String> {
            Ok(String::new())
        }
        fn content(&self) -> Result<String> {
            Ok(String::new())
        }
        fn wait_for(&self, _locator: &Locator, _timeout: Duration) -> Result<bool> {
            Ok(false)
        }
        fn scroll_to_bottom(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct RecordingLauncher {
        agents: Rc<RefCell<Vec<String>>>,
        fail: bool,
    }

    impl SessionLauncher for RecordingLauncher {
        type Session = NullSession;

        fn launch(&self, user_agent: &str) -> Result<NullSession> {
            if self.fail {
                return Err(CrawlError::Launch("chrome not found".to_string()));
            }
            self.agents.borrow_mut().push(user_agent.to_string());
            Ok(NullSession)
        }
    }

    fn policy(relaunch_every: u32) -> CrawlPolicy {
        CrawlPolicy {
            relaunch_every,
            ..CrawlPolicy::immediate()
        }
    }

    #[test]
    fn relaunches_on_cadence() {
        let launcher = RecordingLauncher::default();
        let agents = launcher.agents.clone();
        let mut manager = SessionManager::new(launcher, &policy(2));
        manager.start().unwrap();

        for _ in 0..5 {
            manager.record_detail_processed().unwrap();
        }

        assert_eq!(manager.launches(), 3);
        assert_eq!(agents.borrow().len(), 3);
        assert!(agents
            .borrow()
            .iter()
            .all(|ua| USER_AGENTS.contains(&ua.as_str())));
    }

    #[test]
    fn session_is_launched_lazily_once() {
        let mut manager = SessionManager::new(RecordingLauncher::default(), &policy(30));
        manager.session().unwrap();
        manager.session().unwrap();
        assert_eq!(manager.launches(), 1);
    }

    #[test]
    fn launch_failure_propagates() {
        let launcher = RecordingLauncher {
            fail: true,
            ..Default::default()
        };
        let mut manager = SessionManager::new(launcher, &policy(30));
        assert!(matches!(manager.start(), Err(CrawlError::Launch(_))));
    }

    #[test]
    fn labelled_sibling_locator_reads_following_paragraph() {
        let document = Html::parse_document(
            r#"<div><h2>工作內容</h2><span>x</span><p class="job-description__content mb-0">負責資料管線</p></div>"#,
        );
        let locator = Locator::LabelledSibling {
            heading: "h2",
            label: "工作內容",
            class: "job-description__content",
        };
        assert_eq!(locator.find_text(&document).as_deref(), Some("負責資料管線"));
        assert!(locator.xpath().unwrap().starts_with("//h2[contains(text(), '工作內容')]"));
    }

    #[test]
    fn css_locator_ignores_empty_matches() {
        let document = Html::parse_document(r#"<p class="job-description__content">  </p>"#);
        assert_eq!(
            Locator::Css("p.job-description__content").find_text(&document),
            None
        );
    }
}
