//! The `Variable` and variable-set types the rest of the crate treats opaquely.
//!
//! Variable identity is by handle, never by name: two variables that happen
//! to share a label are still distinct unless they are the same `Arc`.

use std::collections::BTreeSet;
use std::sync::Arc;

/// A named, finite discrete domain.
///
/// Implementors are owned by the caller (the network/model layer, out of
/// scope for this crate) and shared into schedules via `Arc`.
pub trait Variable: Send + Sync {
    /// Number of values in this variable's domain.
    fn domain_size(&self) -> u32;

    /// Human-readable name, used only for diagnostics.
    fn name(&self) -> &str;
}

/// A reference-counted handle to a `Variable`, compared by pointer identity.
#[derive(Clone)]
pub struct VarHandle(Arc<dyn Variable>);

impl VarHandle {
    pub fn new(var: Arc<dyn Variable>) -> Self {
        Self(var)
    }

    pub fn domain_size(&self) -> u32 {
        self.0.domain_size()
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl PartialEq for VarHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for VarHandle {}

impl PartialOrd for VarHandle {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for VarHandle {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let a = Arc::as_ptr(&self.0) as *const () as usize;
        let b = Arc::as_ptr(&other.0) as *const () as usize;
        a.cmp(&b)
    }
}

impl std::hash::Hash for VarHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl std::fmt::Debug for VarHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VarHandle({})", self.0.name())
    }
}

/// An ordered, deduplicated set of variables. Ordered by pointer identity so
/// that iteration is deterministic within a process run (not across runs).
pub type VarSet = BTreeSet<VarHandle>;

/// Product of the domain sizes of every variable in `vars`. This is the
/// table size the planners use as their cost proxy.
pub fn domain_product(vars: &VarSet) -> u64 {
    vars.iter().map(|v| v.domain_size() as u64).product()
}
