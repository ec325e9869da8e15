//! [`FallbackGuard`] – repeated solver-fallback detector.
//!
//! A single fallback is routine: the filter passes the nominal command on and
//! logs a warning.  A run of them means the vehicle is being driven without
//! any safety correction, which the operator needs to hear about.
//!
//! The guard counts consecutive fallback cycles.  [`FallbackGuard::record`]
//! returns `true` on the cycle where the streak reaches the threshold, and
//! again every further `threshold` fallbacks while the streak lasts.  Any
//! cycle that did not fall back clears the streak.
//!
//! # Example
//!
//! ```rust
//! use navigator_runtime::fallback_guard::FallbackGuard;
//!
//! let mut guard = FallbackGuard::new(3);
//!
//! assert!(!guard.record(true));
//! assert!(!guard.record(true));
//! assert!(guard.record(true)); // third fallback in a row → escalate
//!
//! // A certified cycle clears the streak.
//! assert!(!guard.record(false));
//! assert_eq!(guard.streak(), 0);
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// FallbackGuard
// ─────────────────────────────────────────────────────────────────────────────

/// Counts consecutive cycles in which the safety filter fell back to the
/// nominal command.
#[derive(Debug, Clone)]
pub struct FallbackGuard {
    /// Streak length that triggers escalation.  Clamped to at least 1.
    threshold: usize,
    /// Current number of consecutive fallbacks.
    streak: usize,
}

impl FallbackGuard {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            streak: 0,
        }
    }

    /// Record the outcome of one control cycle.
    ///
    /// Returns `true` when this fallback completes a full `threshold`-long
    /// run and should be escalated.
    pub fn record(&mut self, fell_back: bool) -> bool {
        if !fell_back {
            self.streak = 0;
            return false;
        }
        self.streak = self.streak.saturating_add(1);
        self.streak % self.threshold == 0
    }

    pub fn streak(&self) -> usize {
        self.streak
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
