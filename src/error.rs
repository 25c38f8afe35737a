use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("browser session is no longer valid: {0}")]
    SessionLost(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("policy file error: {0}")]
    Policy(#[from] toml::de::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CrawlError {
    /// Maps a headless_chrome failure onto the crate taxonomy. A dropped
    /// DevTools connection or closed target means the session must be relaunched.
    pub fn from_browser(err: impl std::fmt::Display) -> Self {
        let message = err.to_string();
        let lowered = message.to_lowercase();
        let lost = [
            "connection is closed",
            "connectionclosed",
            "target closed",
            "no such target",
            "browser has closed",
            "channel closed",
        ]
        .iter()
        .any(|needle| lowered.contains(needle));

        if lost {
            CrawlError::SessionLost(message)
        } else {
            CrawlError::Browser(message)
        }
    }

    pub fn is_session_lost(&self) -> bool {
        matches!(self, CrawlError::SessionLost(_))
    }
}
