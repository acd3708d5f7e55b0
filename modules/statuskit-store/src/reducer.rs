//! The status reducer.
//!
//! Pure state updates, no I/O, no side effects. Every transition produces a
//! fresh `StatusState`; input state is never mutated, so identical inputs
//! always reduce to structurally equal outputs.
//!
//! Slices are shared by name: a second `Initialize` for an existing name
//! bumps the reference count and leaves the values untouched, so late
//! mounters join the live state instead of resetting it.

use std::collections::HashMap;

use serde::Serialize;

use crate::messages::{Message, Slice};
use crate::promise_state::PromiseState;

/// Per-slice bookkeeping: the configuration it was first mounted with and
/// how many consumers currently reference it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceMeta {
    pub name: String,
    pub initial_values: Slice,
    pub persist: bool,
    pub count: u32,
}

/// The reduced state tree: slice values and slice metadata, 1:1 by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusState {
    pub values: HashMap<String, Slice>,
    pub meta: HashMap<String, SliceMeta>,
}

/// Reduce a message into the next state.
///
/// `None` seeds the empty `{values: {}, meta: {}}` regardless of the message.
/// This is the store-seeding path: the first invocation against a fresh store
/// establishes the tree, and the dispatcher re-reduces from there.
pub fn reduce(state: Option<&StatusState>, message: &Message) -> StatusState {
    let Some(state) = state else {
        return StatusState::default();
    };

    match message {
        Message::Initialize { name, payload } => {
            let mut values = state.values.clone();
            let mut meta = state.meta.clone();

            if values.contains_key(name) && meta.contains_key(name) {
                if let Some(existing) = meta.get_mut(name) {
                    existing.count += 1;
                }
            } else {
                let mut slice = payload.initial_values.clone();
                if payload.auto_refresh {
                    // Consumers see a pending placeholder for every declared
                    // async key before any fetch completes.
                    for key in &payload.async_keys {
                        slice.insert(key.clone(), PromiseState::pending().into());
                    }
                }
                values.insert(name.clone(), slice);
                meta.insert(
                    name.clone(),
                    SliceMeta {
                        name: name.clone(),
                        initial_values: payload.initial_values.clone(),
                        persist: payload.persist,
                        count: 1,
                    },
                );
            }

            StatusState { values, meta }
        }

        Message::Destroy { name } => {
            let mut values = state.values.clone();
            let mut meta = state.meta.clone();

            let retain = matches!(
                (values.contains_key(name), meta.get(name)),
                (true, Some(m)) if m.persist && m.count > 1
            );

            if retain {
                if let Some(existing) = meta.get_mut(name) {
                    existing.count -= 1;
                }
            } else {
                // Decrement-to-zero deletes: a persist slice lives only while
                // at least one consumer remains mounted. Destroy without a
                // prior Initialize is a safe no-op here.
                values.remove(name);
                meta.remove(name);
            }

            StatusState { values, meta }
        }

        Message::Update { name, payload } => {
            let mut values = state.values.clone();

            // Update for a nonexistent slice is a no-op: consumers may race
            // during unmount/mount transitions and a late completion must
            // never crash the dispatch path.
            if let Some(slice) = values.get_mut(name) {
                let partial = payload.resolve(slice);
                for (key, value) in partial {
                    slice.insert(key, value);
                }
            }

            StatusState {
                values,
                meta: state.meta.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{partial, InitializePayload, UpdatePayload, StatusValue};
    use serde_json::{json, Value};

    fn init_payload(initial: Slice) -> InitializePayload {
        InitializePayload {
            initial_values: initial,
            ..InitializePayload::default()
        }
    }

    fn counter_state() -> StatusState {
        reduce(
            Some(&StatusState::default()),
            &Message::initialize("Counter", init_payload(partial([("value", json!(0))]))),
        )
    }

    #[test]
    fn missing_state_seeds_empty_tree_for_any_message() {
        let from_destroy = reduce(None, &Message::destroy("whatever"));
        assert_eq!(from_destroy, StatusState::default());

        let from_update = reduce(None, &Message::update("whatever", Slice::new()));
        assert!(from_update.values.is_empty());

        // Even Initialize only seeds the tree; its slice mounts on the next
        // dispatch, when the seeded state is passed back in.
        let from_init = reduce(None, &Message::initialize("A", InitializePayload::default()));
        assert_eq!(from_init, StatusState::default());
    }

    #[test]
    fn initialize_seeds_values_and_meta() {
        let state = counter_state();
        assert_eq!(
            state.values["Counter"],
            partial([("value", json!(0))])
        );
        let meta = &state.meta["Counter"];
        assert_eq!(meta.count, 1);
        assert!(meta.persist);
        assert_eq!(meta.name, "Counter");
    }

    #[test]
    fn initialize_seeds_pending_for_async_keys() {
        let payload = InitializePayload {
            async_keys: vec!["posts".into()],
            ..InitializePayload::default()
        };
        let state = reduce(
            Some(&StatusState::default()),
            &Message::initialize("Async", payload),
        );
        assert_eq!(
            state.values["Async"]["posts"],
            StatusValue::Promise(PromiseState::pending())
        );
    }

    #[test]
    fn auto_refresh_false_skips_pending_seeds() {
        let payload = InitializePayload {
            auto_refresh: false,
            async_keys: vec!["posts".into()],
            ..InitializePayload::default()
        };
        let state = reduce(
            Some(&StatusState::default()),
            &Message::initialize("Async", payload),
        );
        assert!(!state.values["Async"].contains_key("posts"));
    }

    #[test]
    fn second_initialize_shares_slice_and_bumps_count() {
        let first = counter_state();
        let bumped = reduce(
            Some(&first),
            &Message::update("Counter", partial([("value", json!(7))])),
        );
        let second = reduce(
            Some(&bumped),
            &Message::initialize("Counter", init_payload(partial([("value", json!(0))]))),
        );

        // Values untouched — the late mounter joins live state.
        assert_eq!(
            second.values["Counter"]["value"],
            StatusValue::Plain(json!(7))
        );
        assert_eq!(second.meta["Counter"].count, 2);
    }

    #[test]
    fn destroy_with_remaining_consumers_decrements_and_retains() {
        let mut state = counter_state();
        state = reduce(
            Some(&state),
            &Message::initialize("Counter", init_payload(Slice::new())),
        );
        assert_eq!(state.meta["Counter"].count, 2);

        state = reduce(Some(&state), &Message::destroy("Counter"));
        assert_eq!(state.meta["Counter"].count, 1);
        assert!(state.values.contains_key("Counter"));
    }

    #[test]
    fn destroy_of_last_consumer_removes_slice_entirely() {
        let state = counter_state();
        let gone = reduce(Some(&state), &Message::destroy("Counter"));
        assert!(!gone.values.contains_key("Counter"));
        assert!(!gone.meta.contains_key("Counter"));

        // A later Initialize for the same name starts fresh.
        let fresh = reduce(
            Some(&gone),
            &Message::initialize("Counter", init_payload(partial([("value", json!(0))]))),
        );
        assert_eq!(
            fresh.values["Counter"]["value"],
            StatusValue::Plain(json!(0))
        );
        assert_eq!(fresh.meta["Counter"].count, 1);
    }

    #[test]
    fn destroy_without_persist_deletes_even_with_other_consumers() {
        let payload = InitializePayload {
            persist: false,
            ..init_payload(Slice::new())
        };
        let mut state = reduce(
            Some(&StatusState::default()),
            &Message::initialize("Shared", payload.clone()),
        );
        state = reduce(Some(&state), &Message::initialize("Shared", payload));
        assert_eq!(state.meta["Shared"].count, 2);

        let gone = reduce(Some(&state), &Message::destroy("Shared"));
        assert!(!gone.values.contains_key("Shared"));
        assert!(!gone.meta.contains_key("Shared"));
    }

    #[test]
    fn destroy_of_unknown_slice_is_noop() {
        let state = counter_state();
        let next = reduce(Some(&state), &Message::destroy("Nope"));
        assert_eq!(next, state);
    }

    #[test]
    fn update_shallow_merges_partial() {
        let mut state = counter_state();
        state = reduce(
            Some(&state),
            &Message::update("Counter", partial([("label", json!("a"))])),
        );
        state = reduce(
            Some(&state),
            &Message::update("Counter", partial([("value", json!(3))])),
        );

        let slice = &state.values["Counter"];
        assert_eq!(slice["value"], StatusValue::Plain(json!(3)));
        // Sibling key untouched by the second merge.
        assert_eq!(slice["label"], StatusValue::Plain(json!("a")));
    }

    #[test]
    fn update_closure_reads_current_slice() {
        let state = counter_state();
        let bump = UpdatePayload::with(|s: &Slice| {
            let prev = s
                .get("value")
                .and_then(StatusValue::as_plain)
                .and_then(Value::as_i64)
                .unwrap_or(0);
            partial([("value", json!(prev + 1))])
        });

        let once = reduce(Some(&state), &Message::update("Counter", bump.clone()));
        let twice = reduce(Some(&once), &Message::update("Counter", bump));
        assert_eq!(
            twice.values["Counter"]["value"],
            StatusValue::Plain(json!(2))
        );
    }

    #[test]
    fn update_for_unknown_slice_is_noop_not_panic() {
        let state = counter_state();
        let next = reduce(
            Some(&state),
            &Message::update("Ghost", partial([("x", json!(1))])),
        );
        assert_eq!(next, state);
    }

    #[test]
    fn reduce_is_pure_and_does_not_mutate_input() {
        let state = counter_state();
        let snapshot = state.clone();
        let message = Message::update("Counter", partial([("value", json!(9))]));

        let a = reduce(Some(&state), &message);
        let b = reduce(Some(&state), &message);

        assert_eq!(a, b);
        assert_eq!(state, snapshot);
        assert_ne!(a, state);
    }
}
