//! Declared async values.
//!
//! An `AsyncValueDef` binds a slice key to a promise-producing function plus
//! its cache policy: the argument tuple an invocation identifies with,
//! `max_age` freshness, `max_args` tuple truncation, and `max_size` bounded
//! tuple count. A consumer declares its set of async values as a function of
//! its props, re-evaluated on every lifecycle event.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use statuskit_store::ConfigError;

/// The fetch seam: args in, boxed future out. Failures carry the reason that
/// ends up in `PromiseState::rejected`.
pub type FetchFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// One declared async value: a fetch function and its cache policy.
#[derive(Clone)]
pub struct AsyncValueDef {
    pub(crate) fetch: FetchFn,
    pub(crate) args: Vec<Value>,
    pub(crate) max_age: Option<Duration>,
    pub(crate) max_args: Option<usize>,
    pub(crate) max_size: Option<usize>,
}

impl AsyncValueDef {
    /// A descriptor with empty args and no cache limits.
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            fetch: Arc::new(move |args| Box::pin(fetch(args))),
            args: Vec::new(),
            max_age: None,
            max_args: None,
            max_size: None,
        }
    }

    /// The argument tuple to invoke and cache under.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Cached results older than this are refetched; absent means no time
    /// expiry.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Only the first `n` arguments count toward cache identity.
    pub fn with_max_args(mut self, n: usize) -> Self {
        self.max_args = Some(n);
        self
    }

    /// At most `n` argument tuples are tracked; the oldest is evicted.
    pub fn with_max_size(mut self, n: usize) -> Self {
        self.max_size = Some(n);
        self
    }

    /// Invoke the fetch with the declared args.
    pub(crate) fn call(&self) -> BoxFuture<'static, anyhow::Result<Value>> {
        (self.fetch)(self.args.clone())
    }

    /// Fail fast on nonsense cache bounds — a caller bug, not a fetch
    /// failure.
    pub(crate) fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.max_size == Some(0) {
            return Err(ConfigError::ZeroMaxSize { key: key.into() });
        }
        if self.max_args == Some(0) {
            return Err(ConfigError::ZeroMaxArgs { key: key.into() });
        }
        Ok(())
    }
}

impl fmt::Debug for AsyncValueDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncValueDef")
            .field("args", &self.args)
            .field("max_age", &self.max_age)
            .field("max_args", &self.max_args)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

/// A consumer's declared async values, keyed by slice key.
pub type AsyncValues = HashMap<String, AsyncValueDef>;

/// Descriptor set as a function of the consumer's props.
pub type AsyncValuesFn<P> = Arc<dyn Fn(&P) -> AsyncValues + Send + Sync>;
