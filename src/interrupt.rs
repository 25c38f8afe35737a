use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Set once the operator asks the run to stop. Checked between work units.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Listens for Ctrl+C on a background thread. The first press raises the
/// flag so the run loop can flush; a second press exits right away.
pub fn install_ctrl_c_handler() -> Result<InterruptFlag> {
    let flag = InterruptFlag::new();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let raised = flag.clone();
    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("interrupt received, finishing current unit and saving results");
                raised.raise();

                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("second interrupt received, exiting without saving");
                    std::process::exit(130);
                }
            });
        })?;

    Ok(flag)
}
