use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// Shutdown context shared by the Ctrl-C handler and every polling loop.
// Loops check it between reads so the almanac can be stored before power-off.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    // Install the Ctrl-C handler and return the signal it trips.
    pub fn install() -> Result<Self> {
        let signal = Self::new();
        let for_handler = signal.clone();
        ctrlc::set_handler(move || for_handler.request())
            .context("installing Ctrl-C handler failed")?;
        Ok(signal)
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_the_same_request() {
        let signal = ShutdownSignal::new();
        let handler_side = signal.clone();
        assert!(!signal.requested());
        handler_side.request();
        assert!(signal.requested());
    }
}
