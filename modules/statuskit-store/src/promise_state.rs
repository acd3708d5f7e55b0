//! Immutable lifecycle snapshots for asynchronous values.
//!
//! A `PromiseState` describes where one async value is in its life:
//! pending → fulfilled or rejected, with an orthogonal `refreshing` flag
//! for cache revalidation. A previously fulfilled value stays visible
//! (value intact, `fulfilled: true`) while a refresh is in flight.
//!
//! States are never mutated in place — every transition constructs a new
//! instance through one of the named factories.

use serde::Serialize;
use serde_json::Value;

/// Snapshot of an asynchronous value's lifecycle.
///
/// Exactly one of pending-only / fulfilled / rejected holds on the primary
/// axis; `refreshing` may combine with any of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromiseState {
    pub pending: bool,
    pub refreshing: bool,
    pub fulfilled: bool,
    pub rejected: bool,
    pub value: Option<Value>,
    pub reason: Option<String>,
}

impl PromiseState {
    /// A fresh pending state: no value, no reason.
    pub fn pending() -> Self {
        Self {
            pending: true,
            refreshing: false,
            fulfilled: false,
            rejected: false,
            value: None,
            reason: None,
        }
    }

    /// A refreshing state carrying the previous snapshot forward.
    ///
    /// With no previous state this is both pending and refreshing, so a
    /// standalone `refreshing(None)` still reads as "nothing settled yet".
    pub fn refreshing(previous: Option<&PromiseState>) -> Self {
        let base = match previous {
            Some(prev) => prev.clone(),
            None => Self::pending(),
        };
        Self {
            refreshing: true,
            ..base
        }
    }

    /// A fulfilled state holding the resolved value.
    pub fn fulfilled(value: Value) -> Self {
        Self {
            pending: false,
            refreshing: false,
            fulfilled: true,
            rejected: false,
            value: Some(value),
            reason: None,
        }
    }

    /// A rejected state holding the failure reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            pending: false,
            refreshing: false,
            fulfilled: false,
            rejected: true,
            value: None,
            reason: Some(reason.into()),
        }
    }

    /// Whether the value has settled (fulfilled or rejected).
    pub fn settled(&self) -> bool {
        self.fulfilled || self.rejected
    }
}
