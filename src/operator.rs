//! `ScheduleOperator`: the closed sum type of symbolic operations a
//! [`Schedule`](crate::schedule::Schedule) can hold — combine, project, and
//! delete — per the design notes' "closed sum type rather than open
//! inheritance" decision.

use crate::error::{Result, ScheduleError};
use crate::handle::ScheduleMultiDim;
use crate::table::{CombineFn, ProjectFn};
use crate::variable::VarSet;
use std::sync::Arc;

/// A combine kernel, compared by pointer identity so `is_same_operator` can
/// tell two operators built from the same functor apart from two operators
/// built from different (even behaviorally-equivalent) ones.
#[derive(Clone)]
pub struct CombineFunctor(pub Arc<CombineFn>);

impl PartialEq for CombineFunctor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl std::fmt::Debug for CombineFunctor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CombineFunctor(@{:p})", Arc::as_ptr(&self.0))
    }
}

/// A project kernel, compared by pointer identity; see [`CombineFunctor`].
#[derive(Clone)]
pub struct ProjectFunctor(pub Arc<ProjectFn>);

impl PartialEq for ProjectFunctor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl std::fmt::Debug for ProjectFunctor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProjectFunctor(@{:p})", Arc::as_ptr(&self.0))
    }
}

/// A symbolic operation over [`ScheduleMultiDim`] handles.
///
/// `args()`/`results()` order is significant: it's what `Schedule::eq`
/// compares position-by-position. `executed` is monotonic — once true it
/// never goes back to false.
#[derive(Clone, Debug)]
pub enum ScheduleOperator {
    Combine {
        args: [ScheduleMultiDim; 2],
        result: ScheduleMultiDim,
        functor: CombineFunctor,
        executed: bool,
    },
    Project {
        arg: ScheduleMultiDim,
        del_vars: VarSet,
        result: ScheduleMultiDim,
        functor: ProjectFunctor,
        executed: bool,
    },
    Delete {
        arg: ScheduleMultiDim,
        executed: bool,
    },
}

impl ScheduleOperator {
    /// `V(result) = V(a) ∪ V(b)`.
    pub fn new_combine(a: ScheduleMultiDim, b: ScheduleMultiDim, functor: Arc<CombineFn>) -> Self {
        let mut vars = a.variables();
        vars.extend(b.variables());
        let result = ScheduleMultiDim::new_abstract(vars);
        Self::Combine {
            args: [a, b],
            result,
            functor: CombineFunctor(functor),
            executed: false,
        }
    }

    /// `V(result) = V(a) ∖ del_vars`.
    pub fn new_project(a: ScheduleMultiDim, del_vars: VarSet, functor: Arc<ProjectFn>) -> Self {
        let vars: VarSet = a.variables().difference(&del_vars).cloned().collect();
        let result = ScheduleMultiDim::new_abstract(vars);
        Self::Project {
            arg: a,
            del_vars,
            result,
            functor: ProjectFunctor(functor),
            executed: false,
        }
    }

    pub fn new_delete(a: ScheduleMultiDim) -> Self {
        Self::Delete {
            arg: a,
            executed: false,
        }
    }

    /// Argument handles, in the order significant for equality and for
    /// `update_args`.
    pub fn args(&self) -> Vec<ScheduleMultiDim> {
        match self {
            Self::Combine { args, .. } => args.to_vec(),
            Self::Project { arg, .. } => vec![arg.clone()],
            Self::Delete { arg, .. } => vec![arg.clone()],
        }
    }

    /// Result handles produced by this operator; empty for `Delete`.
    pub fn results(&self) -> Vec<ScheduleMultiDim> {
        match self {
            Self::Combine { result, .. } | Self::Project { result, .. } => vec![result.clone()],
            Self::Delete { .. } => vec![],
        }
    }

    pub fn implies_deletion(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    /// Work proxy used by the planners' `nb_operations`: the number of
    /// table cells this operator's functor must visit. A combine produces
    /// exactly one output cell per multiplication, so its cost is the
    /// result's domain size; a projection sums over every input cell, so
    /// its cost is the *argument's* domain size, not the (smaller) result's.
    /// `Delete` performs no numeric work.
    pub fn cost(&self) -> u64 {
        match self {
            Self::Combine { result, .. } => result.domain_size(),
            Self::Project { arg, .. } => arg.domain_size(),
            Self::Delete { .. } => 0,
        }
    }

    pub fn is_executed(&self) -> bool {
        match self {
            Self::Combine { executed, .. }
            | Self::Project { executed, .. }
            | Self::Delete { executed, .. } => *executed,
        }
    }

    /// Identity used for the `NotReady`/`AlreadyExecuted` error variants:
    /// the first result handle's id, or (for `Delete`, which has no
    /// result) its argument's id.
    fn identity(&self) -> crate::ids::HandleId {
        match self {
            Self::Combine { result, .. } | Self::Project { result, .. } => result.id(),
            Self::Delete { arg, .. } => arg.id(),
        }
    }

    /// Invoke the functor on concrete inputs, materialize the result(s), and
    /// mark `executed = true`. Fails with `NotReady` if any argument is
    /// still abstract or released, `AlreadyExecuted` if called twice.
    pub fn execute(&mut self) -> Result<()> {
        if self.is_executed() {
            return Err(ScheduleError::AlreadyExecuted {
                result: self.identity(),
            });
        }
        match self {
            Self::Combine {
                args: [a, b],
                result,
                functor,
                executed,
            } => {
                let (ta, tb) = match (a.table_arc(), b.table_arc()) {
                    (Some(ta), Some(tb)) => (ta, tb),
                    _ => {
                        return Err(ScheduleError::NotReady {
                            result: result.id(),
                        });
                    }
                };
                let out = (functor.0)(ta.as_ref(), tb.as_ref())?;
                result.materialize(out)?;
                *executed = true;
            }
            Self::Project {
                arg,
                del_vars,
                result,
                functor,
                executed,
            } => {
                let ta = arg.table_arc().ok_or(ScheduleError::NotReady {
                    result: result.id(),
                })?;
                let out = (functor.0)(ta.as_ref(), del_vars)?;
                result.materialize(out)?;
                *executed = true;
            }
            Self::Delete { arg, executed } => {
                if arg.is_abstract() {
                    return Err(ScheduleError::NotReady { result: arg.id() });
                }
                arg.release();
                *executed = true;
            }
        }
        Ok(())
    }

    /// Rebind argument handles. Only valid before `execute()`, and only if
    /// `new_args` has the same arity and each position's variable set
    /// matches the handle it replaces.
    pub fn update_args(&mut self, new_args: &[ScheduleMultiDim]) -> Result<()> {
        if self.is_executed() {
            return Err(ScheduleError::AlreadyExecuted {
                result: self.identity(),
            });
        }
        match self {
            Self::Combine { args, .. } => {
                if new_args.len() != 2 {
                    return Err(ScheduleError::IncompatibleVariables(
                        new_args.first().map(ScheduleMultiDim::id).unwrap_or(args[0].id()),
                    ));
                }
                for (old, new) in args.iter().zip(new_args) {
                    if !old.has_same_variables(new) {
                        return Err(ScheduleError::IncompatibleVariables(new.id()));
                    }
                }
                *args = [new_args[0].clone(), new_args[1].clone()];
            }
            Self::Project { arg, .. } => {
                let Some(new_arg) = new_args.first() else {
                    return Err(ScheduleError::IncompatibleVariables(arg.id()));
                };
                if new_args.len() != 1 || !arg.has_same_variables(new_arg) {
                    return Err(ScheduleError::IncompatibleVariables(new_arg.id()));
                }
                *arg = new_arg.clone();
            }
            Self::Delete { arg, .. } => {
                let Some(new_arg) = new_args.first() else {
                    return Err(ScheduleError::IncompatibleVariables(arg.id()));
                };
                if new_args.len() != 1 || !arg.has_same_variables(new_arg) {
                    return Err(ScheduleError::IncompatibleVariables(new_arg.id()));
                }
                *arg = new_arg.clone();
            }
        }
        Ok(())
    }

    /// Same variant and, for `Combine`/`Project`, the same functor identity
    /// (and for `Project`, the same `del_vars`). Argument *identity* is not
    /// part of this comparison — `Schedule::eq` compares that separately via
    /// its bijection walk.
    pub fn is_same_operator(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Combine { functor: f1, .. }, Self::Combine { functor: f2, .. }) => f1 == f2,
            (
                Self::Project {
                    functor: f1,
                    del_vars: d1,
                    ..
                },
                Self::Project {
                    functor: f2,
                    del_vars: d2,
                    ..
                },
            ) => f1 == f2 && d1 == d2,
            (Self::Delete { .. }, Self::Delete { .. }) => true,
            _ => false,
        }
    }

    /// Deep-clone with fresh abstract result handles, per the public
    /// `ScheduleOperator::clone()` contract in the component design. Used by
    /// `Schedule::copy()`; distinct from `#[derive(Clone)]`, which preserves
    /// handle identity (used internally by `insert_operation`).
    pub fn duplicate(&self) -> Self {
        match self {
            Self::Combine {
                args, functor, ..
            } => Self::new_combine(args[0].clone(), args[1].clone(), Arc::clone(&functor.0)),
            Self::Project {
                arg,
                del_vars,
                functor,
                ..
            } => Self::new_project(arg.clone(), del_vars.clone(), Arc::clone(&functor.0)),
            Self::Delete { arg, .. } => Self::new_delete(arg.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_combine, mock_project, mock_var, reset_id_generator, MockTable};
    use std::sync::Arc as StdArc;

    #[test]
    fn combine_executes_and_materializes_result() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let b = mock_var("B", 3);
        let ha = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a.clone()], 2.0), false);
        let hb = ScheduleMultiDim::new_concrete(MockTable::constant(vec![b.clone()], 3.0), false);
        let mut op = ScheduleOperator::new_combine(ha, hb, StdArc::new(mock_combine));
        assert!(!op.is_executed());
        op.execute().unwrap();
        assert!(op.is_executed());
        let result = &op.results()[0];
        assert!(!result.is_abstract());
        assert_eq!(result.variables().len(), 2);
    }

    #[test]
    fn execute_twice_fails() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let ha = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a.clone()], 2.0), false);
        let mut op = ScheduleOperator::new_delete(ha);
        op.execute().unwrap();
        let err = op.execute().unwrap_err();
        assert!(matches!(err, ScheduleError::AlreadyExecuted { .. }));
    }

    #[test]
    fn execute_with_abstract_arg_is_not_ready() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let mut vars = VarSet::new();
        vars.insert(a.clone());
        let ha = ScheduleMultiDim::new_abstract(vars);
        let del = VarSet::new();
        let mut op = ScheduleOperator::new_project(ha, del, StdArc::new(mock_project));
        let err = op.execute().unwrap_err();
        assert!(matches!(err, ScheduleError::NotReady { .. }));
    }

    #[test]
    fn update_args_rejects_incompatible_variables() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let b = mock_var("B", 3);
        let ha = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a.clone()], 1.0), false);
        let hb = ScheduleMultiDim::new_concrete(MockTable::constant(vec![b.clone()], 1.0), false);
        let del = VarSet::new();
        let mut op = ScheduleOperator::new_project(ha.clone(), del, StdArc::new(mock_project));
        let err = op.update_args(&[hb]).unwrap_err();
        assert!(matches!(err, ScheduleError::IncompatibleVariables(_)));
        // same variables: succeeds
        let ha2 = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a], 5.0), false);
        op.update_args(&[ha2]).unwrap();
    }

    #[test]
    fn cost_uses_result_size_for_combine_and_argument_size_for_project() {
        reset_id_generator();
        let a = mock_var("A", 4);
        let b = mock_var("B", 4);
        let c = mock_var("C", 4);
        let ha = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a.clone(), b.clone()], 1.0), false);
        let hb = ScheduleMultiDim::new_concrete(MockTable::constant(vec![b, c], 1.0), false);
        let combine = ScheduleOperator::new_combine(ha, hb, StdArc::new(mock_combine));
        assert_eq!(combine.cost(), 64); // variables {A,B,C}, domain 4 each

        reset_id_generator();
        let a = mock_var("A", 4);
        let b = mock_var("B", 4);
        let c = mock_var("C", 4);
        let habc = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a, b.clone(), c], 1.0), false);
        let mut del = VarSet::new();
        del.insert(b);
        let project = ScheduleOperator::new_project(habc, del, StdArc::new(mock_project));
        assert_eq!(project.cost(), 64); // argument domain, not the smaller {A,C} result
    }

    #[test]
    fn duplicate_gives_fresh_abstract_results() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let ha = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a.clone()], 1.0), false);
        let del = VarSet::new();
        let op = ScheduleOperator::new_project(ha, del, StdArc::new(mock_project));
        let dup = op.duplicate();
        assert_ne!(op.results()[0].id(), dup.results()[0].id());
        assert!(dup.results()[0].is_abstract());
        assert!(op.is_same_operator(&dup));
    }
}
