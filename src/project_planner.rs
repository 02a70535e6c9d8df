//! `ProjectionPlanner`: a single project operation, or a pass-through if
//! the variables to eliminate don't intersect the table's variables.

use crate::error::Result;
use crate::handle::ScheduleMultiDim;
use crate::operator::ScheduleOperator;
use crate::schedule::Schedule;
use crate::table::{MultiDimTable, ProjectFn};
use crate::variable::{domain_product, VarSet};
use std::sync::Arc;

pub struct ProjectionPlanner;

impl ProjectionPlanner {
    /// Plan the projection without touching any `Schedule`. If
    /// `d ∩ V(h) = ∅`, returns no operations and `h` unchanged.
    pub fn operations(
        h: &ScheduleMultiDim,
        d: &VarSet,
        functor: &Arc<ProjectFn>,
    ) -> (Vec<ScheduleOperator>, ScheduleMultiDim) {
        let relevant: VarSet = h.variables().intersection(d).cloned().collect();
        if relevant.is_empty() {
            return (vec![], h.clone());
        }
        let op = ScheduleOperator::new_project(h.clone(), relevant, Arc::clone(functor));
        let result = op.results().into_iter().next().unwrap();
        (vec![op], result)
    }

    pub fn schedule(
        sched: &mut Schedule,
        h: &ScheduleMultiDim,
        d: &VarSet,
        functor: &Arc<ProjectFn>,
        persistent: bool,
    ) -> Result<ScheduleMultiDim> {
        let (ops, _) = Self::operations(h, d, functor);
        let Some(op) = ops.into_iter().next() else {
            return Ok(h.clone());
        };
        let node = sched.insert_operation(op, persistent)?;
        Ok(sched.operation(node).unwrap().results()[0].clone())
    }

    /// Cost estimate: summing out a variable visits every cell of the
    /// *input* table, so the cost is `h`'s own domain size, not the
    /// (smaller) result's — matching [`ScheduleOperator::cost`].
    pub fn nb_operations(h: &ScheduleMultiDim, d: &VarSet) -> u64 {
        let relevant: VarSet = h.variables().intersection(d).cloned().collect();
        if relevant.is_empty() {
            return 0;
        }
        h.domain_size()
    }

    pub fn memory_usage(h: &ScheduleMultiDim, d: &VarSet) -> (u64, u64) {
        let input = h.domain_size();
        let relevant: VarSet = h.variables().intersection(d).cloned().collect();
        if relevant.is_empty() {
            return (input, input);
        }
        let result_vars: VarSet = h.variables().difference(&relevant).cloned().collect();
        let result_size = domain_product(&result_vars);
        (input + result_size, result_size)
    }

    pub fn execute(
        table: &Arc<dyn MultiDimTable>,
        d: &VarSet,
        functor: &Arc<ProjectFn>,
    ) -> anyhow::Result<Arc<dyn MultiDimTable>> {
        let relevant: VarSet = table.variables().intersection(d).cloned().collect();
        if relevant.is_empty() {
            return Ok(Arc::clone(table));
        }
        let out = functor(table.as_ref(), &relevant)?;
        Ok(Arc::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_project, mock_var, reset_id_generator, MockTable};

    #[test]
    fn projecting_an_unrelated_variable_is_a_no_op() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let b = mock_var("B", 3);
        let h = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a], 1.0), false);
        let mut d = VarSet::new();
        d.insert(b);
        let functor: Arc<ProjectFn> = Arc::new(mock_project);
        let (ops, result) = ProjectionPlanner::operations(&h, &d, &functor);
        assert!(ops.is_empty());
        assert_eq!(result.id(), h.id());
    }

    #[test]
    fn projecting_a_present_variable_emits_one_op() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let b = mock_var("B", 3);
        let h = ScheduleMultiDim::new_concrete(MockTable::new(vec![a.clone(), b.clone()], |idx| (idx[0] + idx[1]) as f64), false);
        let mut d = VarSet::new();
        d.insert(b);
        let functor: Arc<ProjectFn> = Arc::new(mock_project);
        let (mut ops, result) = ProjectionPlanner::operations(&h, &d, &functor);
        assert_eq!(ops.len(), 1);
        assert!(result.variables().contains(&a));
        ops[0].execute().unwrap();
        assert!(!result.is_abstract());
    }
}
