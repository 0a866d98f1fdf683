//! SIGINT/SIGTERM handling.
//!
//! The first signal sets the interrupt flag, which the monitor task turns
//! into an orderly stop. A second signal exits immediately.

use anyhow::Context;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Install the handler and return the interrupt flag it sets.
pub fn install() -> anyhow::Result<Arc<AtomicBool>> {
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();

    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::Relaxed) {
            warn!("received second interrupt, forcing exit");
            std::process::exit(1);
        }
    })
    .context("failed to install signal handler")?;

    Ok(interrupt)
}
