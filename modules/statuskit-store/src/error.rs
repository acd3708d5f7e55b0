use thiserror::Error;

/// Configuration errors — programmer mistakes surfaced synchronously at
/// mount/registration time, never swallowed. Fetch failures are not errors
/// at this level; they become `PromiseState::rejected` state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("status name is required and must be a non-empty string")]
    EmptyName,

    #[error("async value '{key}': max_size must be at least 1")]
    ZeroMaxSize { key: String },

    #[error("async value '{key}': max_args must be at least 1")]
    ZeroMaxArgs { key: String },
}
