//! End-to-end reducer scenarios: full message sequences against one tree.

use serde_json::{json, Value};
use statuskit_store::{
    partial, reduce, status_meta, status_value, InitializePayload, Message, PromiseState, Slice,
    StatusState, StatusValue, UpdatePayload,
};

#[test]
fn counter_lifecycle_roundtrip() {
    // First contact with the store seeds the empty tree
    let state = reduce(None, &Message::destroy("anything"));
    assert_eq!(state, StatusState::default());

    // Mount
    let state = reduce(
        Some(&state),
        &Message::initialize(
            "Counter",
            InitializePayload {
                initial_values: partial([("value", json!(0))]),
                persist: true,
                ..InitializePayload::default()
            },
        ),
    );
    assert_eq!(
        status_value(&state, "Counter").and_then(|s| s.get("value")),
        Some(&StatusValue::Plain(json!(0)))
    );
    assert_eq!(status_meta(&state, "Counter").map(|m| m.count), Some(1));

    // Increment through the closure payload
    let state = reduce(
        Some(&state),
        &Message::update(
            "Counter",
            UpdatePayload::with(|s: &Slice| {
                let prev = s
                    .get("value")
                    .and_then(StatusValue::as_plain)
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                partial([("value", json!(prev + 1))])
            }),
        ),
    );
    assert_eq!(
        status_value(&state, "Counter").and_then(|s| s.get("value")),
        Some(&StatusValue::Plain(json!(1)))
    );

    // Last consumer unmounts: persist defers nothing at count 1, slice goes.
    let state = reduce(Some(&state), &Message::destroy("Counter"));
    assert!(status_value(&state, "Counter").is_none());
    assert!(status_meta(&state, "Counter").is_none());
}

#[test]
fn async_keys_are_pending_before_any_fetch_completes() {
    let state = reduce(
        Some(&StatusState::default()),
        &Message::initialize(
            "Async",
            InitializePayload {
                async_keys: vec!["posts".into()],
                ..InitializePayload::default()
            },
        ),
    );

    let posts = status_value(&state, "Async")
        .and_then(|s| s.get("posts"))
        .and_then(StatusValue::as_promise)
        .expect("posts should be seeded");
    assert_eq!(*posts, PromiseState::pending());

    // Completion arrives through the same channel as sync updates.
    let state = reduce(
        Some(&state),
        &Message::update(
            "Async",
            partial([("posts", PromiseState::fulfilled(json!(["a", "b"])))]),
        ),
    );
    let posts = status_value(&state, "Async")
        .and_then(|s| s.get("posts"))
        .and_then(StatusValue::as_promise)
        .unwrap();
    assert!(posts.fulfilled);
    assert_eq!(posts.value, Some(json!(["a", "b"])));
}

#[test]
fn two_registrants_share_one_slice_until_both_leave() {
    let init = Message::initialize(
        "Shared",
        InitializePayload {
            initial_values: partial([("ready", json!(false))]),
            ..InitializePayload::default()
        },
    );

    let mut state = reduce(Some(&StatusState::default()), &init);
    state = reduce(Some(&state), &init);
    assert_eq!(status_meta(&state, "Shared").map(|m| m.count), Some(2));

    state = reduce(Some(&state), &Message::destroy("Shared"));
    assert_eq!(status_meta(&state, "Shared").map(|m| m.count), Some(1));
    assert!(status_value(&state, "Shared").is_some());

    state = reduce(Some(&state), &Message::destroy("Shared"));
    assert!(status_value(&state, "Shared").is_none());
}
