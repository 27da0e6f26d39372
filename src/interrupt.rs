//! Cooperative stop flag shared between the Ctrl-C handler and the drivers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Raised once by the signal handler; polled at operation boundaries only.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag; returns true if it was already raised.
    pub fn trigger(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
