use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const FIRST_PAGE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_page: u32,
}

/// Single-value store for the last fully processed listing page.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last recorded page, or page 1 when the file is missing or unreadable.
    pub fn load(&self) -> u32 {
        if !self.path.exists() {
            return FIRST_PAGE;
        }
        let parsed = std::fs::read_to_string(&self.path)
            .map_err(crate::CrawlError::from)
            .and_then(|raw| serde_json::from_str::<Checkpoint>(&raw).map_err(Into::into));
        match parsed {
            Ok(checkpoint) => checkpoint.last_page,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read checkpoint");
                FIRST_PAGE
            }
        }
    }

    pub fn save(&self, page: u32) -> Result<()> {
        let body = serde_json::to_string(&Checkpoint { last_page: page })?;
        std::fs::write(&self.path, body)?;
        info!(page, "checkpoint saved");
        Ok(())
    }
}

/// Page a run starts from: the checkpoint or the requested start, whichever is later.
pub fn resume_page(checkpoint: u32, requested_start: u32) -> u32 {
    checkpoint.max(requested_start)
}
