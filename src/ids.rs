//! Process-wide identifiers for handles and schedule nodes.
//!
//! A [`HandleId`] names a [`ScheduleMultiDim`](crate::handle::ScheduleMultiDim)
//! for its whole lifetime, independent of which [`Schedule`](crate::schedule::Schedule)
//! it happens to be registered with. A [`NodeId`] names a DAG node inside one
//! schedule. The two spaces are never compared against each other, so they are
//! kept as separate atomics rather than sharing one counter.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// Unique numeric identifier for a [`ScheduleMultiDim`](crate::handle::ScheduleMultiDim).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct HandleId(u64);

impl HandleId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the underlying numeric value. Useful for logging and tests.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Unique numeric identifier for an operator node inside a [`Schedule`](crate::schedule::Schedule).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Reset both global counters to zero. Test-only: makes id assignment
/// deterministic across test cases that run in the same process.
///
/// Not safe to call while any `Schedule` or `ScheduleMultiDim` is alive in
/// another thread of the same test binary; intended for single-threaded
/// `#[test]` functions that build fresh state at the top.
pub fn reset_id_generators() {
    NEXT_HANDLE_ID.store(0, Ordering::SeqCst);
    NEXT_NODE_ID.store(0, Ordering::SeqCst);
}
