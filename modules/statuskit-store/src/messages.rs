//! Typed messages for the status action channel.
//!
//! Three message kinds, each carrying the slice name: `Initialize` (mount),
//! `Destroy` (unmount), `Update` (merge a partial slice). These are the only
//! way state changes — every transition, including async fetch completions,
//! goes through the same channel.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::promise_state::PromiseState;

/// What a slice key maps to: a plain JSON value or an async lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatusValue {
    Promise(PromiseState),
    Plain(Value),
}

impl From<Value> for StatusValue {
    fn from(value: Value) -> Self {
        StatusValue::Plain(value)
    }
}

impl From<PromiseState> for StatusValue {
    fn from(state: PromiseState) -> Self {
        StatusValue::Promise(state)
    }
}

impl StatusValue {
    /// The embedded promise state, if this key holds one.
    pub fn as_promise(&self) -> Option<&PromiseState> {
        match self {
            StatusValue::Promise(p) => Some(p),
            StatusValue::Plain(_) => None,
        }
    }

    /// The plain JSON value, if this key holds one.
    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            StatusValue::Plain(v) => Some(v),
            StatusValue::Promise(_) => None,
        }
    }
}

/// A named slice's key → value table.
pub type Slice = HashMap<String, StatusValue>;

/// Closure form of an update: reads the current slice, returns a partial.
pub type UpdateFn = Arc<dyn Fn(&Slice) -> Slice + Send + Sync>;

/// Payload of an `Initialize` message — the typed projection of a consumer's
/// configuration. `async_keys` lists the declared async value keys so the
/// reducer can seed pending placeholders without evaluating descriptors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitializePayload {
    pub initial_values: Slice,
    pub persist: bool,
    pub auto_refresh: bool,
    pub async_keys: Vec<String>,
}

impl Default for InitializePayload {
    fn default() -> Self {
        Self {
            initial_values: Slice::new(),
            persist: true,
            auto_refresh: true,
            async_keys: Vec::new(),
        }
    }
}

/// Payload of an `Update` message: a ready partial slice, or a closure that
/// derives one from the slice's current value (read-modify-write).
#[derive(Clone)]
pub enum UpdatePayload {
    Merge(Slice),
    With(UpdateFn),
}

impl UpdatePayload {
    /// Build a closure payload.
    pub fn with(f: impl Fn(&Slice) -> Slice + Send + Sync + 'static) -> Self {
        UpdatePayload::With(Arc::new(f))
    }

    /// Resolve against the current slice value.
    pub fn resolve(&self, current: &Slice) -> Slice {
        match self {
            UpdatePayload::Merge(partial) => partial.clone(),
            UpdatePayload::With(f) => f(current),
        }
    }
}

impl From<Slice> for UpdatePayload {
    fn from(partial: Slice) -> Self {
        UpdatePayload::Merge(partial)
    }
}

impl fmt::Debug for UpdatePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePayload::Merge(partial) => f.debug_tuple("Merge").field(partial).finish(),
            UpdatePayload::With(_) => f.write_str("With(<fn>)"),
        }
    }
}

/// A status action. Unknown kinds do not exist — the enum is closed.
#[derive(Debug, Clone)]
pub enum Message {
    Initialize {
        name: String,
        payload: InitializePayload,
    },
    Destroy {
        name: String,
    },
    Update {
        name: String,
        payload: UpdatePayload,
    },
}

impl Message {
    pub fn initialize(name: impl Into<String>, payload: InitializePayload) -> Self {
        Message::Initialize {
            name: name.into(),
            payload,
        }
    }

    pub fn destroy(name: impl Into<String>) -> Self {
        Message::Destroy { name: name.into() }
    }

    pub fn update(name: impl Into<String>, payload: impl Into<UpdatePayload>) -> Self {
        Message::Update {
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// The slice name this message targets.
    pub fn name(&self) -> &str {
        match self {
            Message::Initialize { name, .. }
            | Message::Destroy { name }
            | Message::Update { name, .. } => name,
        }
    }

    /// Stable type tag, for logging.
    pub fn message_type(&self) -> &'static str {
        match self {
            Message::Initialize { .. } => "status:initialize",
            Message::Destroy { .. } => "status:destroy",
            Message::Update { .. } => "status:update",
        }
    }
}

/// Build a partial slice from key/value pairs. Convenience for tests and
/// completion dispatches.
pub fn partial<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Slice
where
    K: Into<String>,
    V: Into<StatusValue>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
