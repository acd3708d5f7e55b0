//! Read accessors over the reduced state.
//!
//! Pure projections, no error handling: absence is `None` and callers decide
//! what that means. The `_in` variants take an accessor closure for hosts
//! that mount the status tree somewhere other than a `StatusState` value.

use crate::messages::Slice;
use crate::reducer::{SliceMeta, StatusState};

/// The values of a named slice, if mounted.
pub fn status_value<'a>(state: &'a StatusState, name: &str) -> Option<&'a Slice> {
    state.values.get(name)
}

/// The metadata of a named slice, if mounted.
pub fn status_meta<'a>(state: &'a StatusState, name: &str) -> Option<&'a SliceMeta> {
    state.meta.get(name)
}

/// `status_value` against a host state tree, via an accessor for the mount
/// point.
pub fn status_value_in<'a, G>(
    global: &'a G,
    name: &str,
    get_status_state: impl Fn(&'a G) -> &'a StatusState,
) -> Option<&'a Slice> {
    status_value(get_status_state(global), name)
}

/// `status_meta` against a host state tree.
pub fn status_meta_in<'a, G>(
    global: &'a G,
    name: &str,
    get_status_state: impl Fn(&'a G) -> &'a StatusState,
) -> Option<&'a SliceMeta> {
    status_meta(get_status_state(global), name)
}
