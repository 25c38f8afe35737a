pub mod job104;

pub use job104::{Job104Client, Job104CrawlConfig};
