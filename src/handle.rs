//! `ScheduleMultiDim`: a symbolic handle to a table that may not exist yet.

use crate::error::{Result, ScheduleError};
use crate::ids::HandleId;
use crate::table::MultiDimTable;
use crate::variable::VarSet;
use std::sync::{Arc, RwLock};

/// Content state of a handle.
///
/// Both `Owned` and `Shared` tables in the design notes' ownership sketch
/// are represented the same way here, as an `Arc<dyn MultiDimTable>` — the
/// distinction between "the schedule's own intermediate" and "a caller's
/// source table" is purely the `persistent`/`emplaced` bookkeeping layered
/// on top, not a different storage representation. Storing both as `Arc`
/// is what lets [`ScheduleMultiDim::duplicate`] alias a concrete table's
/// content into a fresh handle without requiring `Clone` on `dyn
/// MultiDimTable`.
enum Content {
    Abstract,
    Concrete(Arc<dyn MultiDimTable>),
    /// Content reclaimed by a `DeleteOp`. Distinct from `Abstract` so the
    /// "once concrete, never abstract again" invariant still holds; a
    /// released handle simply has nothing left to read.
    Released,
}

struct Inner {
    id: HandleId,
    variables: VarSet,
    content: Content,
    persistent: bool,
}

/// A symbolic reference to a (possibly not-yet-computed) table.
///
/// Cloning a `ScheduleMultiDim` via [`Clone`] is cheap and identity-preserving
/// (both clones name the same handle id) — this is how the same handle is
/// passed to multiple operators or registered in multiple schedules. To get
/// the spec's notion of "clone producing a fresh handle with a new id", call
/// [`ScheduleMultiDim::duplicate`] instead.
#[derive(Clone)]
pub struct ScheduleMultiDim(Arc<RwLock<Inner>>);

impl ScheduleMultiDim {
    /// Wrap an owned table as a concrete handle. Ownership of `table` passes
    /// to the returned handle; it is dropped when the last handle/schedule
    /// reference to it goes away unless `persistent` is set (in which case
    /// callers typically also keep their own `Arc` via [`Self::new_shared`]).
    pub fn new_concrete(table: impl MultiDimTable + 'static, persistent: bool) -> Self {
        Self::new_shared(Arc::new(table), persistent)
    }

    /// Wrap a caller-owned `Arc<Table>` as a concrete handle. This is the
    /// *emplaced* case from the component design: the schedule never clones
    /// the underlying table, only the `Arc` pointer.
    pub fn new_shared(table: Arc<dyn MultiDimTable>, persistent: bool) -> Self {
        let variables = table.variables().clone();
        Self(Arc::new(RwLock::new(Inner {
            id: HandleId::next(),
            variables,
            content: Content::Concrete(table),
            persistent,
        })))
    }

    /// Create an abstract handle: variables known, content pending.
    pub fn new_abstract(variables: VarSet) -> Self {
        Self(Arc::new(RwLock::new(Inner {
            id: HandleId::next(),
            variables,
            content: Content::Abstract,
            persistent: false,
        })))
    }

    pub fn id(&self) -> HandleId {
        self.lock().id
    }

    pub fn variables(&self) -> VarSet {
        self.lock().variables.clone()
    }

    pub fn domain_size(&self) -> u64 {
        crate::variable::domain_product(&self.variables())
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.lock().content, Content::Abstract)
    }

    /// True once a `DeleteOp` has reclaimed this handle's table. A released
    /// handle is concrete from the state machine's point of view (it never
    /// goes back to abstract) but has no content left to read.
    pub fn is_released(&self) -> bool {
        matches!(self.lock().content, Content::Released)
    }

    pub fn persistent(&self) -> bool {
        self.lock().persistent
    }

    pub fn set_persistent(&self, persistent: bool) {
        self.lock_mut().persistent = persistent;
    }

    /// Transition an abstract handle to concrete. Fails with
    /// [`ScheduleError::AlreadyConcrete`] if already concrete — once
    /// concrete, a handle never becomes abstract again.
    pub fn materialize(&self, table: Box<dyn MultiDimTable>) -> Result<()> {
        let mut inner = self.lock_mut();
        if !matches!(inner.content, Content::Abstract) {
            return Err(ScheduleError::AlreadyConcrete(inner.id));
        }
        inner.content = Content::Concrete(Arc::from(table));
        Ok(())
    }

    /// Reclaim this handle's table, transitioning it to [`Content::Released`].
    /// Called by [`crate::operator::ScheduleOperator`]'s delete variant on
    /// execution. No-op on an already-released or abstract handle.
    pub(crate) fn release(&self) {
        let mut inner = self.lock_mut();
        if matches!(inner.content, Content::Concrete(_)) {
            inner.content = Content::Released;
        }
    }

    pub fn has_same_variables(&self, other: &Self) -> bool {
        self.variables() == other.variables()
    }

    /// Content-level equality. Two concrete handles match iff their tables
    /// do; two released handles always match (there is nothing left to
    /// differ on, and a schedule that has cloned past an executed delete
    /// needs released-vs-released to count as equal for `Schedule::eq` to
    /// hold). Returns `false` if either side is abstract, or sides disagree
    /// on released-vs-concrete. Used exclusively by `Schedule::eq`, never by
    /// planning.
    pub fn has_same_content(&self, other: &Self) -> bool {
        let a = self.lock();
        let b = other.lock();
        match (&a.content, &b.content) {
            (Content::Concrete(t1), Content::Concrete(t2)) => t1.content_eq(t2.as_ref()),
            (Content::Released, Content::Released) => true,
            _ => false,
        }
    }

    /// Produce a new handle with a fresh id. If `self` is concrete, the
    /// duplicate aliases the same underlying table by reference (no table
    /// copy is made, matching the spec's "shares the underlying table"
    /// clause); if `self` is abstract or released, the duplicate starts
    /// abstract.
    pub fn duplicate(&self) -> Self {
        let inner = self.lock();
        let content = match &inner.content {
            Content::Concrete(t) => Content::Concrete(Arc::clone(t)),
            Content::Abstract | Content::Released => Content::Abstract,
        };
        Self(Arc::new(RwLock::new(Inner {
            id: HandleId::next(),
            variables: inner.variables.clone(),
            content,
            persistent: false,
        })))
    }

    pub fn with_table<R>(&self, f: impl FnOnce(&dyn MultiDimTable) -> R) -> Option<R> {
        let inner = self.lock();
        match &inner.content {
            Content::Concrete(t) => Some(f(t.as_ref())),
            Content::Abstract | Content::Released => None,
        }
    }

    /// Clone of the underlying `Arc`, for callers (e.g. the combination
    /// planner's ad-hoc `execute`) that need to hold the table independent
    /// of this handle's lifetime. Returns `None` if abstract or released.
    pub fn table_arc(&self) -> Option<Arc<dyn MultiDimTable>> {
        match &self.lock().content {
            Content::Concrete(t) => Some(Arc::clone(t)),
            Content::Abstract | Content::Released => None,
        }
    }

    fn lock(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.0.read().expect("handle lock poisoned")
    }

    fn lock_mut(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.0.write().expect("handle lock poisoned")
    }
}

impl PartialEq for ScheduleMultiDim {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
impl Eq for ScheduleMultiDim {}

impl std::hash::Hash for ScheduleMultiDim {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl std::fmt::Debug for ScheduleMultiDim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleMultiDim")
            .field("id", &self.id())
            .field("abstract", &self.is_abstract())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTable, MockVariable};
    use std::sync::Arc as StdArc;

    fn table(vars: &[&StdArc<MockVariable>]) -> MockTable {
        MockTable::new(vars.iter().map(|v| (*v).clone()).collect(), |_| 1.0)
    }

    #[test]
    fn duplicate_of_concrete_shares_table_but_gets_new_id() {
        let a = StdArc::new(MockVariable::new("A", 2));
        let h = ScheduleMultiDim::new_concrete(table(&[&a]), false);
        let d = h.duplicate();
        assert_ne!(h.id(), d.id());
        assert!(d.has_same_content(&h));
    }

    #[test]
    fn duplicate_of_abstract_stays_abstract() {
        let a = StdArc::new(MockVariable::new("A", 2));
        let mut vars = VarSet::new();
        vars.insert(crate::variable::VarHandle::new(a));
        let h = ScheduleMultiDim::new_abstract(vars);
        let d = h.duplicate();
        assert!(d.is_abstract());
    }

    #[test]
    fn materialize_twice_fails() {
        let a = StdArc::new(MockVariable::new("A", 2));
        let mut vars = VarSet::new();
        vars.insert(crate::variable::VarHandle::new(a.clone()));
        let h = ScheduleMultiDim::new_abstract(vars);
        h.materialize(Box::new(table(&[&a]))).unwrap();
        let err = h.materialize(Box::new(table(&[&a]))).unwrap_err();
        assert!(matches!(err, ScheduleError::AlreadyConcrete(_)));
    }

    #[test]
    fn release_clears_content_without_becoming_abstract() {
        let a = StdArc::new(MockVariable::new("A", 2));
        let h = ScheduleMultiDim::new_concrete(table(&[&a]), false);
        h.release();
        assert!(!h.is_abstract());
        assert!(h.is_released());
        assert!(h.with_table(|_| ()).is_none());
    }

    #[test]
    fn two_released_handles_have_same_content() {
        let a = StdArc::new(MockVariable::new("A", 2));
        let h1 = ScheduleMultiDim::new_concrete(table(&[&a]), false);
        let h2 = ScheduleMultiDim::new_concrete(table(&[&a]), false);
        h1.release();
        h2.release();
        assert!(h1.has_same_content(&h2));
    }

    #[test]
    fn released_and_concrete_do_not_have_same_content() {
        let a = StdArc::new(MockVariable::new("A", 2));
        let h1 = ScheduleMultiDim::new_concrete(table(&[&a]), false);
        let h2 = ScheduleMultiDim::new_concrete(table(&[&a]), false);
        h1.release();
        assert!(!h1.has_same_content(&h2));
    }
}
