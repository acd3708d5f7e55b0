//! Pure state layer for statuskit.
//!
//! Named "status" slices live in a single `StatusState` tree, keyed by name
//! and reference-counted across consumers. All changes flow through three
//! typed messages reduced by a pure function; async value lifecycles are
//! modeled as immutable `PromiseState` snapshots embedded in slice values.
//!
//! The async orchestration (store, memoization, controller) lives in
//! `statuskit-engine`; this crate has no runtime dependency.

pub mod error;
pub mod messages;
pub mod promise_state;
pub mod reducer;
pub mod selectors;

pub use error::ConfigError;
pub use messages::{partial, InitializePayload, Message, Slice, StatusValue, UpdateFn, UpdatePayload};
pub use promise_state::PromiseState;
pub use reducer::{reduce, SliceMeta, StatusState};
pub use selectors::{status_meta, status_meta_in, status_value, status_value_in};
