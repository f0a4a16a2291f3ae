//! Cooperative run cancellation.
//!
//! The binary hands a clone of the flag to its Ctrl-C handler; the page loops
//! check it before starting each page and stop once it is set. The page in
//! flight is finished or abandoned, never rolled back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    token: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.load(Ordering::Relaxed)
    }
}
