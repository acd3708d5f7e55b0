//! Per-consumer status controller.
//!
//! One controller per mounted consumer instance. Mounting registers the
//! slice (Initialize), evaluates the declared async values, and spawns
//! fetches whose completions dispatch Update messages; unmounting (or drop)
//! dispatches Destroy. The memoization table is controller-local: two
//! consumers of the same slice name share state but not caches.
//!
//! Lifecycle: Unmounted → Mounting → Mounted → Unmounting → Unmounted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use statuskit_store::{
    partial, ConfigError, InitializePayload, Message, PromiseState, Slice, StatusValue,
    UpdatePayload,
};

use crate::cache::CacheEntry;
use crate::descriptor::{AsyncValueDef, AsyncValues, AsyncValuesFn};
use crate::store::StatusBackend;

/// Called with the key whose cached value passed `max_age` — the only async
/// event not triggered by a lifecycle hook. Typical use: force a
/// re-evaluation from the consumer.
pub type ExpireFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Consumer configuration. `name` is required and must be non-empty;
/// everything else has the conventional defaults (`persist` and
/// `auto_refresh` on).
#[derive(Clone, TypedBuilder)]
pub struct StatusConfig<P> {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default)]
    pub initial_values: Slice,
    #[builder(default, setter(strip_option))]
    pub async_values: Option<AsyncValuesFn<P>>,
    #[builder(default = true)]
    pub persist: bool,
    #[builder(default = true)]
    pub auto_refresh: bool,
    #[builder(default, setter(strip_option))]
    pub on_expire: Option<ExpireFn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Mounting,
    Mounted,
    Unmounting,
    Unmounted,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Evaluation {
    Mount,
    Update,
    Forced,
}

#[derive(Default)]
struct CacheTable {
    entries: HashMap<String, CacheEntry>,
    /// Argument tuple of each key's previous evaluation, for the
    /// same-tuple skip rule.
    prev_args: HashMap<String, Vec<Value>>,
}

/// Controller for one mounted consumer of a named slice.
pub struct StatusController<P, B: StatusBackend> {
    backend: Arc<B>,
    name: String,
    auto_refresh: bool,
    async_values: Option<AsyncValuesFn<P>>,
    on_expire: Option<ExpireFn>,
    props: P,
    caches: Arc<Mutex<CacheTable>>,
    lifecycle: Lifecycle,
}

impl<P, B: StatusBackend + 'static> StatusController<P, B> {
    /// Register the slice and run the mount-time evaluation.
    ///
    /// Fails fast on configuration errors; fetch failures never surface
    /// here — they become rejected promise states. Must run inside a tokio
    /// runtime, since fetches are spawned tasks.
    pub fn mount(backend: Arc<B>, config: StatusConfig<P>, props: P) -> Result<Self, ConfigError> {
        if config.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let declared = match &config.async_values {
            Some(f) => f(&props),
            None => AsyncValues::new(),
        };
        for (key, def) in &declared {
            def.validate(key)?;
        }

        let mut async_keys: Vec<String> = declared.keys().cloned().collect();
        async_keys.sort();

        backend.dispatch(Message::initialize(
            &config.name,
            InitializePayload {
                initial_values: config.initial_values.clone(),
                persist: config.persist,
                auto_refresh: config.auto_refresh,
                async_keys,
            },
        ));
        info!(name = %config.name, async_keys = declared.len(), "status slice mounted");

        let mut controller = Self {
            backend,
            name: config.name,
            auto_refresh: config.auto_refresh,
            async_values: config.async_values,
            on_expire: config.on_expire,
            props,
            caches: Arc::new(Mutex::new(CacheTable::default())),
            lifecycle: Lifecycle::Mounting,
        };

        // Mount-time evaluation runs against a synthetic status built from
        // the initial values: the reduced slice may not be observable yet
        // this tick.
        let mut synthetic = config.initial_values;
        if controller.auto_refresh {
            for key in declared.keys() {
                synthetic.insert(key.clone(), PromiseState::pending().into());
            }
        }
        controller.evaluate(&declared, Some(&synthetic), Evaluation::Mount);

        controller.lifecycle = Lifecycle::Mounted;
        Ok(controller)
    }

    /// The slice this controller is bound to.
    pub fn status_name(&self) -> &str {
        &self.name
    }

    /// Current value of the bound slice, if mounted in the store.
    pub fn status(&self) -> Option<Slice> {
        self.backend.snapshot().values.get(&self.name).cloned()
    }

    /// Render gate: false until every declared async key has at least a
    /// pending placeholder in the reduced slice (a late mounter joining an
    /// existing slice can observe keys it declared but the slice never
    /// initialized). Only gates while auto-refresh is on.
    pub fn should_render(&self) -> bool {
        let Some(slice) = self.status() else {
            return false;
        };
        if !self.auto_refresh {
            return true;
        }
        let Some(f) = &self.async_values else {
            return true;
        };
        f(&self.props).keys().all(|key| slice.contains_key(key))
    }

    /// Props changed: re-evaluate the declared async values. Returns the
    /// render gate — false means the update was suppressed and nothing was
    /// evaluated.
    pub fn update(&mut self, props: P) -> bool {
        self.props = props;
        if !self.should_render() {
            debug!(name = %self.name, "update suppressed: declared async key absent from status");
            return false;
        }
        if let Some(f) = &self.async_values {
            let declared = f(&self.props);
            self.evaluate(&declared, None, Evaluation::Update);
        }
        true
    }

    /// Forced re-evaluation: bypasses cache hits and rejection stickiness
    /// for every declared key.
    pub fn refresh(&self) {
        if let Some(f) = &self.async_values {
            let declared = f(&self.props);
            self.evaluate(&declared, None, Evaluation::Forced);
        }
    }

    /// Merge a partial into this controller's slice.
    pub fn set_status(&self, payload: impl Into<UpdatePayload>) {
        self.backend.dispatch(Message::update(&self.name, payload));
    }

    /// Merge a partial into an arbitrary named slice — the escape hatch for
    /// cross-slice updates.
    pub fn set_status_to(&self, name: &str, payload: impl Into<UpdatePayload>) {
        self.backend.dispatch(Message::update(name, payload));
    }

    /// Deregister the slice. Also runs on drop, so an explicit call is only
    /// needed when unmount ordering matters.
    pub fn unmount(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.lifecycle == Lifecycle::Unmounted {
            return;
        }
        self.lifecycle = Lifecycle::Unmounting;
        self.backend.dispatch(Message::destroy(&self.name));
        self.lifecycle = Lifecycle::Unmounted;
        debug!(name = %self.name, "status slice unmounted");
    }

    fn evaluate(&self, declared: &AsyncValues, synthetic: Option<&Slice>, evaluation: Evaluation) {
        // auto_refresh=false disables every non-forced (re)fetch.
        if !self.auto_refresh && evaluation != Evaluation::Forced {
            return;
        }

        let status = match synthetic {
            Some(slice) => Some(slice.clone()),
            None => self.status(),
        };
        for (key, def) in declared {
            self.evaluate_key(key, def, status.as_ref(), evaluation);
        }
    }

    fn evaluate_key(
        &self,
        key: &str,
        def: &AsyncValueDef,
        status: Option<&Slice>,
        evaluation: Evaluation,
    ) {
        let forced = evaluation == Evaluation::Forced;

        // A rejected key stays rejected until an explicit refresh retries it.
        if !forced {
            let rejected = status
                .and_then(|s| s.get(key))
                .and_then(StatusValue::as_promise)
                .is_some_and(|p| p.rejected);
            if rejected {
                debug!(name = %self.name, key, "skipping rejected key (refresh to retry)");
                return;
            }
        }

        let mut table = self.caches.lock().unwrap();
        let previous_args = table.prev_args.insert(key.to_string(), def.args.clone());

        match table.entries.get_mut(key) {
            Some(entry) => {
                let args_key = entry.args_key(&def.args);
                if !forced && entry.has_fresh(&args_key) {
                    if evaluation == Evaluation::Update
                        && previous_args.as_deref() == Some(&def.args[..])
                    {
                        // Cache hit on an unchanged tuple: nothing to do.
                        return;
                    }
                    // Known tuple reached by a changed evaluation: serve the
                    // cached value without touching the fetch. An in-flight
                    // call dispatches on its own completion.
                    if let Some(value) = entry.cached_value(&args_key) {
                        drop(table);
                        debug!(name = %self.name, key, "serving cached value");
                        self.set_status(partial([(key, PromiseState::fulfilled(value))]));
                    }
                    return;
                }

                // New/expired tuple, or forced: revalidate while keeping the
                // previous value visible.
                let generation = entry.begin(&args_key);
                drop(table);
                self.dispatch_refreshing(key);
                self.spawn_fetch(key, def, args_key, generation);
            }
            None => {
                let mut entry = CacheEntry::new(def);
                let args_key = entry.args_key(&def.args);
                let generation = entry.begin(&args_key);
                table.entries.insert(key.to_string(), entry);
                drop(table);

                if evaluation != Evaluation::Mount {
                    // Mount seeding already produced the pending placeholder.
                    self.set_status(partial([(key, PromiseState::pending())]));
                }
                self.spawn_fetch(key, def, args_key, generation);
            }
        }
    }

    fn dispatch_refreshing(&self, key: &str) {
        let key = key.to_string();
        self.set_status(UpdatePayload::with(move |slice: &Slice| {
            let previous = slice.get(&key).and_then(StatusValue::as_promise);
            partial([(key.clone(), PromiseState::refreshing(previous))])
        }));
    }

    fn spawn_fetch(&self, key: &str, def: &AsyncValueDef, args_key: String, generation: u64) {
        let fut = def.call();
        let backend = Arc::clone(&self.backend);
        let caches = Arc::clone(&self.caches);
        let name = self.name.clone();
        let key = key.to_string();
        let max_age = def.max_age;
        let on_expire = self.on_expire.clone();

        tokio::spawn(async move {
            match fut.await {
                Ok(value) => {
                    let admitted = caches
                        .lock()
                        .unwrap()
                        .entries
                        .get_mut(&key)
                        .is_some_and(|e| e.admit(&args_key, generation, value.clone()));

                    // A superseded call still dispatches — there is no
                    // cancellation, so a stale completion may overwrite newer
                    // state. The cache refuses the stale admit; the dispatch
                    // race is intentional and documented.
                    backend.dispatch(Message::update(
                        &name,
                        partial([(key.clone(), PromiseState::fulfilled(value))]),
                    ));

                    if admitted {
                        if let Some(age) = max_age {
                            let caches = Arc::clone(&caches);
                            tokio::spawn(async move {
                                tokio::time::sleep(age).await;
                                let expired = caches
                                    .lock()
                                    .unwrap()
                                    .entries
                                    .get_mut(&key)
                                    .is_some_and(|e| e.invalidate(&args_key, generation));
                                if expired {
                                    debug!(key, "cached value expired");
                                    if let Some(callback) = &on_expire {
                                        callback(&key);
                                    }
                                }
                            });
                        }
                    }
                }
                Err(e) => {
                    // Rejections are not cached: the tuple is dropped so a
                    // forced refresh starts clean. Stickiness comes from the
                    // rejected flag in the slice, checked on evaluation.
                    if let Some(entry) = caches.lock().unwrap().entries.get_mut(&key) {
                        entry.invalidate(&args_key, generation);
                    }
                    backend.dispatch(Message::update(
                        &name,
                        partial([(key.clone(), PromiseState::rejected(e.to_string()))]),
                    ));
                }
            }
        });
    }
}

impl<P, B: StatusBackend> Drop for StatusController<P, B> {
    fn drop(&mut self) {
        if self.lifecycle != Lifecycle::Unmounted {
            self.backend.dispatch(Message::destroy(&self.name));
            self.lifecycle = Lifecycle::Unmounted;
        }
    }
}
