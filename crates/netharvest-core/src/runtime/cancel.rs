// crates/netharvest-core/src/runtime/cancel.rs
// ============================================================================
// Module: Netharvest Cancellation
// Description: Cooperative cancellation signal threaded through run layers.
// Purpose: Let batch, job, and device layers observe one shared stop signal.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Cancellation is an explicit signal, not an unwinding mechanism: the token
//! is checked at every suspension point, devices not yet started are counted
//! skipped, and in-flight sessions finish or are abandoned at their hard
//! deadline. Cloning is cheap; every clone observes the same flag.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

// ============================================================================
// SECTION: Cancel Token
// ============================================================================

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    /// Shared flag; `true` once cancelled.
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
