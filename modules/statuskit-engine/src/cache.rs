//! Controller-local memoization of async calls.
//!
//! One `CacheEntry` per declared key, owned by the controller instance that
//! declared it — never by the store, so nothing here is serialized or shared
//! across consumers. Entries map an argument-tuple key to a call outcome:
//! in-flight (at most one per exact tuple) or fulfilled with an admission
//! `Instant` for `max_age` freshness. Rejected calls leave no entry.
//!
//! Every `begin` hands out a generation number; admits, rejections, and
//! expiries carrying a stale generation are refused, so a superseding call
//! can never be clobbered by the one it replaced.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::descriptor::AsyncValueDef;

#[derive(Debug, Clone, PartialEq)]
enum CallOutcome {
    InFlight,
    Fulfilled(Value),
}

#[derive(Debug, Clone)]
struct CachedCall {
    outcome: CallOutcome,
    generation: u64,
    inserted_at: Instant,
}

/// Memoization table for one declared key.
pub(crate) struct CacheEntry {
    calls: HashMap<String, CachedCall>,
    /// Tuple keys in insertion order, oldest first. Drives `max_size`
    /// eviction.
    order: Vec<String>,
    max_age: Option<Duration>,
    max_args: Option<usize>,
    max_size: Option<usize>,
    next_generation: u64,
}

impl CacheEntry {
    pub fn new(def: &AsyncValueDef) -> Self {
        Self {
            calls: HashMap::new(),
            order: Vec::new(),
            max_age: def.max_age,
            max_args: def.max_args,
            max_size: def.max_size,
            next_generation: 0,
        }
    }

    /// Canonical cache key for an argument tuple, truncated to `max_args`.
    pub fn args_key(&self, args: &[Value]) -> String {
        let tracked = match self.max_args {
            Some(n) => &args[..args.len().min(n)],
            None => args,
        };
        serde_json::to_string(tracked).unwrap_or_default()
    }

    fn is_fresh(&self, call: &CachedCall) -> bool {
        match call.outcome {
            // An in-flight call counts as a hit: at most one fetch per tuple.
            CallOutcome::InFlight => true,
            CallOutcome::Fulfilled(_) => self
                .max_age
                .is_none_or(|age| call.inserted_at.elapsed() < age),
        }
    }

    /// Whether the tuple is cached and unexpired (in-flight included).
    pub fn has_fresh(&self, args_key: &str) -> bool {
        self.calls.get(args_key).is_some_and(|c| self.is_fresh(c))
    }

    /// The fulfilled value for a fresh tuple, if one has settled.
    pub fn cached_value(&self, args_key: &str) -> Option<Value> {
        let call = self.calls.get(args_key)?;
        if !self.is_fresh(call) {
            return None;
        }
        match &call.outcome {
            CallOutcome::Fulfilled(value) => Some(value.clone()),
            CallOutcome::InFlight => None,
        }
    }

    /// Mark a tuple in-flight and return the call's generation. Evicts the
    /// oldest tuples beyond `max_size`.
    pub fn begin(&mut self, args_key: &str) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;

        if !self.calls.contains_key(args_key) {
            self.order.push(args_key.to_string());
            if let Some(max) = self.max_size {
                while self.order.len() > max {
                    let oldest = self.order.remove(0);
                    self.calls.remove(&oldest);
                }
            }
        }

        self.calls.insert(
            args_key.to_string(),
            CachedCall {
                outcome: CallOutcome::InFlight,
                generation,
                inserted_at: Instant::now(),
            },
        );
        generation
    }

    /// Admit a fulfilled result. Refused (returns false) when a newer call
    /// for the tuple has superseded this generation.
    pub fn admit(&mut self, args_key: &str, generation: u64, value: Value) -> bool {
        match self.calls.get_mut(args_key) {
            Some(call) if call.generation == generation => {
                call.outcome = CallOutcome::Fulfilled(value);
                call.inserted_at = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Drop a tuple (rejection or `max_age` expiry). Refused when a newer
    /// call has superseded this generation.
    pub fn invalidate(&mut self, args_key: &str, generation: u64) -> bool {
        let current = self
            .calls
            .get(args_key)
            .is_some_and(|c| c.generation == generation);
        if current {
            self.calls.remove(args_key);
            self.order.retain(|k| k != args_key);
        }
        current
    }
}
