//! `CombineAndProjectPlanner`: the top-level variable-elimination-by-
//! smallest-clique planner that drives [`crate::combine_planner`] and
//! [`crate::project_planner`] to eliminate a set of variables from a set of
//! tables.

use crate::combine_planner::CombinationPlanner;
use crate::error::Result;
use crate::handle::ScheduleMultiDim;
use crate::ids::HandleId;
use crate::operator::ScheduleOperator;
use crate::project_planner::ProjectionPlanner;
use crate::schedule::Schedule;
use crate::table::{CombineFn, ProjectFn};
use crate::variable::{domain_product, VarHandle, VarSet};
use std::collections::HashMap;
use std::sync::Arc;

pub struct CombineAndProjectPlanner;

impl CombineAndProjectPlanner {
    /// Plan variable elimination without touching any `Schedule`. Returns
    /// every emitted operation plus the resulting live handle set, whose
    /// joint variable coverage is `(⋃ V(s) for s in S) ∖ D`.
    pub fn operations(
        s: &[ScheduleMultiDim],
        d: &VarSet,
        combine_functor: &Arc<CombineFn>,
        project_functor: &Arc<ProjectFn>,
        persistent: bool,
    ) -> (Vec<ScheduleOperator>, Vec<ScheduleMultiDim>) {
        if s.is_empty() {
            return (vec![], vec![]);
        }
        if d.is_empty() {
            // No variable to eliminate: the elimination loop below would
            // exit after zero iterations and leave every input table
            // separate. The boundary contract calls for a full combine
            // instead, matching `CombinationPlanner::execute` exactly.
            let (ops, result) = CombinationPlanner::operations(s, combine_functor);
            for op in &ops {
                for r in op.results() {
                    r.set_persistent(persistent);
                }
            }
            return (ops, vec![result]);
        }
        let mut live: Vec<ScheduleMultiDim> = s.to_vec();
        let mut ops = Vec::new();

        loop {
            let remaining: Vec<VarHandle> = d
                .iter()
                .filter(|v| live.iter().any(|t| t.variables().contains(*v)))
                .cloned()
                .collect();
            let Some(chosen) = Self::choose_elimination_variable(&remaining, &live) else {
                break;
            };

            let clique: Vec<ScheduleMultiDim> = live
                .iter()
                .filter(|t| t.variables().contains(&chosen))
                .cloned()
                .collect();

            let combined = if clique.len() > 1 {
                let (mut combine_ops, result) =
                    CombinationPlanner::operations(&clique, combine_functor);
                for op in &combine_ops {
                    for r in op.results() {
                        r.set_persistent(persistent);
                    }
                }
                ops.append(&mut combine_ops);
                result
            } else {
                clique[0].clone()
            };

            let mut del_vars = VarSet::new();
            del_vars.insert(chosen);
            let (mut project_ops, projected) =
                ProjectionPlanner::operations(&combined, &del_vars, project_functor);
            for op in &project_ops {
                for r in op.results() {
                    r.set_persistent(persistent);
                }
            }
            ops.append(&mut project_ops);

            let clique_ids: Vec<HandleId> = clique.iter().map(ScheduleMultiDim::id).collect();
            live.retain(|t| !clique_ids.contains(&t.id()));
            live.push(projected);
        }

        (ops, live)
    }

    /// `v* ∈ D` minimizing the domain size of the union of variables across
    /// every live table mentioning `v*`, tie-broken deterministically by
    /// `VarHandle`'s own (pointer-based) ordering.
    fn choose_elimination_variable(
        remaining: &[VarHandle],
        live: &[ScheduleMultiDim],
    ) -> Option<VarHandle> {
        remaining
            .iter()
            .map(|v| {
                let mut union_vars = VarSet::new();
                for t in live.iter().filter(|t| t.variables().contains(v)) {
                    union_vars.extend(t.variables());
                }
                (domain_product(&union_vars), v.clone())
            })
            .min()
            .map(|(_, v)| v)
    }

    /// Same plan, appended into `sched`.
    pub fn schedule(
        sched: &mut Schedule,
        s: &[ScheduleMultiDim],
        d: &VarSet,
        combine_functor: &Arc<CombineFn>,
        project_functor: &Arc<ProjectFn>,
        persistent: bool,
    ) -> Result<Vec<ScheduleMultiDim>> {
        let (ops, outputs) =
            Self::operations(s, d, combine_functor, project_functor, persistent);
        let mut registered: HashMap<HandleId, ScheduleMultiDim> = HashMap::new();
        for op in ops {
            let node = sched.insert_operation(op, persistent)?;
            for r in sched.operation(node).unwrap().results() {
                registered.insert(r.id(), r.clone());
            }
        }
        Ok(outputs
            .into_iter()
            .map(|h| registered.get(&h.id()).cloned().unwrap_or(h))
            .collect())
    }

    /// Cost estimate: the sum of every emitted operation's cost (see
    /// [`ScheduleOperator::cost`] and DESIGN.md's Open Question decision).
    pub fn nb_operations(
        s: &[ScheduleMultiDim],
        d: &VarSet,
        combine_functor: &Arc<CombineFn>,
        project_functor: &Arc<ProjectFn>,
    ) -> u64 {
        let (ops, _) = Self::operations(s, d, combine_functor, project_functor, false);
        ops.iter().map(ScheduleOperator::cost).sum()
    }

    /// `(peak, final)`. `peak` is the high-water mark of the set of tables
    /// simultaneously live: each op holds its args and result live for the
    /// instant it runs (§4.6), so a combine/project's two inputs and
    /// freshly produced output briefly overlap before the args are
    /// reclaimed, but a superseded intermediate is *not* carried forward
    /// once nothing downstream still references it — unlike
    /// `CombinationPlanner::memory_usage`'s shrinking `BinaryHeap`, args
    /// here aren't necessarily pairwise-consumed (a `Project` has one arg,
    /// a `Combine` two), so live sizes are tracked per handle id instead.
    pub fn memory_usage(
        s: &[ScheduleMultiDim],
        d: &VarSet,
        combine_functor: &Arc<CombineFn>,
        project_functor: &Arc<ProjectFn>,
    ) -> (u64, u64) {
        if s.is_empty() {
            return (0, 0);
        }
        let (ops, outputs) = Self::operations(s, d, combine_functor, project_functor, false);
        let mut live: HashMap<HandleId, u64> =
            s.iter().map(|h| (h.id(), h.domain_size())).collect();
        let mut total: u64 = live.values().sum();
        let mut peak = total;
        for op in &ops {
            let result_size: u64 = op.results().iter().map(ScheduleMultiDim::domain_size).sum();
            // args and result overlap for the duration of this op.
            peak = peak.max(total + result_size);
            for arg in op.args() {
                if let Some(size) = live.remove(&arg.id()) {
                    total -= size;
                }
            }
            total += result_size;
            for r in op.results() {
                live.insert(r.id(), r.domain_size());
            }
        }
        let final_size: u64 = outputs.iter().map(ScheduleMultiDim::domain_size).sum();
        (peak, final_size)
    }

    /// Ad-hoc elimination with no `Schedule` involved: plans and
    /// immediately executes every emitted operation, returning the
    /// resulting (already-materialized) handle set.
    pub fn execute(
        s: &[ScheduleMultiDim],
        d: &VarSet,
        combine_functor: &Arc<CombineFn>,
        project_functor: &Arc<ProjectFn>,
    ) -> anyhow::Result<Vec<ScheduleMultiDim>> {
        let (mut ops, outputs) =
            Self::operations(s, d, combine_functor, project_functor, false);
        for op in &mut ops {
            op.execute()?;
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_combine, mock_project, mock_var, reset_id_generator, MockTable};

    fn table(vars: Vec<crate::variable::VarHandle>, f: impl Fn(&[u32]) -> f64) -> ScheduleMultiDim {
        ScheduleMultiDim::new_concrete(MockTable::new(vars, f), false)
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let combine: Arc<CombineFn> = Arc::new(mock_combine);
        let project: Arc<ProjectFn> = Arc::new(mock_project);
        let (ops, outputs) =
            CombineAndProjectPlanner::operations(&[], &VarSet::new(), &combine, &project, false);
        assert!(ops.is_empty());
        assert!(outputs.is_empty());
    }

    #[test]
    fn single_table_no_elimination_returns_it_unchanged() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let h = table(vec![a], |idx| idx[0] as f64);
        let combine: Arc<CombineFn> = Arc::new(mock_combine);
        let project: Arc<ProjectFn> = Arc::new(mock_project);
        let (ops, outputs) = CombineAndProjectPlanner::operations(
            &[h.clone()],
            &VarSet::new(),
            &combine,
            &project,
            false,
        );
        assert!(ops.is_empty());
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].id(), h.id());
    }

    #[test]
    fn chain_elimination_matches_brute_force() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let b = mock_var("B", 2);
        let c = mock_var("C", 2);
        let t1 = table(vec![a.clone(), b.clone()], |idx| (idx[0] + idx[1] + 1) as f64);
        let t2 = table(vec![b.clone(), c.clone()], |idx| (idx[0] + 2 * idx[1] + 1) as f64);
        let mut d = VarSet::new();
        d.insert(b.clone());

        let combine: Arc<CombineFn> = Arc::new(mock_combine);
        let project: Arc<ProjectFn> = Arc::new(mock_project);
        let outputs =
            CombineAndProjectPlanner::execute(&[t1, t2], &d, &combine, &project).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].variables(), VarSet::from([a.clone(), c.clone()]));
    }

    #[test]
    fn variable_absent_from_every_table_is_ignored() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let ghost = mock_var("Ghost", 2);
        let h = table(vec![a.clone()], |idx| idx[0] as f64);
        let mut d = VarSet::new();
        d.insert(ghost);
        let combine: Arc<CombineFn> = Arc::new(mock_combine);
        let project: Arc<ProjectFn> = Arc::new(mock_project);
        let (ops, outputs) =
            CombineAndProjectPlanner::operations(&[h.clone()], &d, &combine, &project, false);
        assert!(ops.is_empty());
        assert_eq!(outputs[0].id(), h.id());
    }
}
