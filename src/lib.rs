pub mod checkpoint;
pub mod cli;
pub mod clients;
pub mod crawler;
pub mod diagnostics;
pub mod error;
pub mod interrupt;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod salary;
pub mod session;
pub mod skills;
pub mod writer;

pub use checkpoint::{resume_page, CheckpointStore};
pub use cli::{run, Cli};
pub use clients::{Job104Client, Job104CrawlConfig};
pub use crawler::{CrawlContext, DetailCrawler, FetchOutcome, ListPageCrawler};
pub use diagnostics::Diagnostics;
pub use error::CrawlError;
pub use interrupt::InterruptFlag;
pub use models::{JobDetail, JobSummary, SalaryInfo};
pub use pipeline::{CrawlPipeline, RunStage, RunSummary};
pub use policy::{CrawlPolicy, DelayRange};
pub use salary::parse_salary;
pub use session::{BrowserSession, ChromeLauncher, Locator, SessionLauncher, SessionManager};
pub use skills::extract_skills;
pub use writer::{load_existing_ids, OutputPaths, OutputStore};

pub type Result<T> = std::result::Result<T, CrawlError>;
