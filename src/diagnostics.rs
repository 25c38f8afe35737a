use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where raw markup goes when something needs a human to look at it.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    dir: PathBuf,
    dump_list_pages: bool,
}

impl Diagnostics {
    pub fn new(dir: impl Into<PathBuf>, dump_list_pages: bool) -> Self {
        Self {
            dir: dir.into(),
            dump_list_pages,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dumps_list_pages(&self) -> bool {
        self.dump_list_pages
    }

    /// Writes `error_{job_id}.html`. Best effort: a failed write is only logged.
    pub fn dump_failed_detail(&self, job_id: &str, html: &str) -> Option<PathBuf> {
        self.write(&format!("error_{}.html", job_id), html)
    }

    pub fn dump_list_attempt(&self, attempt: u32, html: &str) -> Option<PathBuf> {
        if !self.dump_list_pages {
            return None;
        }
        self.write(&format!("page_source_attempt_{}.html", attempt), html)
    }

    fn write(&self, file_name: &str, html: &str) -> Option<PathBuf> {
        let path = self.dir.join(file_name);
        let written = std::fs::create_dir_all(&self.dir).and_then(|_| std::fs::write(&path, html));
        match written {
            Ok(()) => {
                info!(path = %path.display(), "saved page markup");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not save page markup");
                None
            }
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(".", false)
    }
}
