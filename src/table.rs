//! The `MultiDimTable` trait: the opaque numeric container the scheduler
//! moves around without ever inspecting its values.

use crate::variable::VarSet;
use std::any::Any;
use std::fmt::Debug;

/// A factor over a set of discrete variables.
///
/// The scheduler never reads a table's contents itself; it only asks for the
/// variable set (to compute costs and result shapes) and, in tests, for
/// content equality.
pub trait MultiDimTable: Debug + Send + Sync {
    fn variables(&self) -> &VarSet;

    fn domain_size(&self) -> u64 {
        crate::variable::domain_product(self.variables())
    }

    /// Content equality, used only by `Schedule::eq` and by tests. Never
    /// consulted by planning.
    fn content_eq(&self, other: &dyn MultiDimTable) -> bool;

    /// Downcasting hook for combine/project kernels that need to recover a
    /// concrete table type (e.g. the `testing` module's reference combine
    /// and project functors). Planning and the schedule itself never call
    /// this; it exists purely for the benefit of functor implementations.
    fn as_any(&self) -> &dyn Any;
}

/// Signature a caller-supplied combine kernel must satisfy.
///
/// Must be deterministic and must not mutate its inputs. Any error raised
/// here propagates to the scheduler caller unchanged, wrapped in
/// [`crate::error::ScheduleError::FunctorError`].
pub type CombineFn =
    dyn Fn(&dyn MultiDimTable, &dyn MultiDimTable) -> anyhow::Result<Box<dyn MultiDimTable>>
        + Send
        + Sync;

/// Signature a caller-supplied projection kernel must satisfy.
pub type ProjectFn = dyn Fn(&dyn MultiDimTable, &VarSet) -> anyhow::Result<Box<dyn MultiDimTable>>
    + Send
    + Sync;
