//! Async binding layer over `statuskit-store`: controllers with declared
//! async values, per-controller memoization, and a tokio-backed store.

mod cache;
pub mod controller;
pub mod descriptor;
pub mod store;

pub use controller::{ExpireFn, StatusConfig, StatusController};
pub use descriptor::{AsyncValueDef, AsyncValues, AsyncValuesFn, FetchFn};
pub use store::{StatusBackend, StatusStore};
