//! `Schedule`: the DAG of symbolic operations over [`ScheduleMultiDim`]
//! handles. This is the largest component in the core — insertion,
//! execution-driven updates, available-operation enumeration, structural
//! equality, and copy/clear all live here.

use crate::error::{Result, ScheduleError};
use crate::handle::ScheduleMultiDim;
use crate::ids::{HandleId, NodeId};
use crate::operator::ScheduleOperator;
use crate::table::MultiDimTable;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

const LOG_TARGET: &str = "cliquesched::schedule";

#[derive(Default, Clone)]
struct DagEdges {
    parents: HashSet<NodeId>,
    children: HashSet<NodeId>,
}

/// A DAG of [`ScheduleOperator`]s plus the bookkeeping described in the
/// component design: table→node maps, deleters, users.
pub struct Schedule {
    /// Active (unexecuted) adjacency. Entries are removed once their node
    /// executes — invariant 5 in the data model.
    dag: HashMap<NodeId, DagEdges>,
    /// All nodes ever inserted, executed or not — retained for
    /// introspection and equality.
    node_to_op: HashMap<NodeId, ScheduleOperator>,
    /// Insertion order, which by construction is always a valid topological
    /// order (every edge points from an earlier-inserted node to a later
    /// one) — used by `eq` and by the full-edge reconstruction helper.
    insertion_order: Vec<NodeId>,
    handle_to_id: HashMap<HandleId, ScheduleMultiDim>,
    handle_producer: HashMap<HandleId, (NodeId, usize)>,
    handle_users: HashMap<HandleId, HashSet<NodeId>>,
    handle_deleter: HashMap<HandleId, NodeId>,
    emplaced: HashSet<HandleId>,
    /// Snapshot of every (non-emplaced) source handle's table, taken at
    /// registration time — before anything could execute a `DeleteOp`
    /// against it. `ScheduleMultiDim::release` drops the handle's own
    /// `Arc`, so once a source is released its content is unrecoverable
    /// from the handle itself; `Schedule::clone` needs this snapshot to
    /// rebuild a concrete source even when the original has since been
    /// deleted.
    source_content: HashMap<HandleId, Arc<dyn MultiDimTable>>,
    version: u64,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            dag: HashMap::new(),
            node_to_op: HashMap::new(),
            insertion_order: Vec::new(),
            handle_to_id: HashMap::new(),
            handle_producer: HashMap::new(),
            handle_users: HashMap::new(),
            handle_deleter: HashMap::new(),
            emplaced: HashSet::new(),
            source_content: HashMap::new(),
            version: 0,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Register a concrete source handle. Fails with `AbstractSource` if
    /// `handle` is abstract, `DuplicateHandle` if its id is already known.
    pub fn insert_schedule_multidim(&mut self, handle: &ScheduleMultiDim) -> Result<()> {
        self.register_source(handle, false)
    }

    /// Register a concrete source handle whose lifetime the schedule does
    /// not own (the *emplaced* case): the schedule never frees it on
    /// `clear()` and `copy()` duplicates it by reference, not by value.
    pub fn emplace_schedule_multidim(&mut self, handle: &ScheduleMultiDim) -> Result<()> {
        self.register_source(handle, true)
    }

    fn register_source(&mut self, handle: &ScheduleMultiDim, emplaced: bool) -> Result<()> {
        if handle.is_abstract() {
            warn!(target: LOG_TARGET, handle = handle.id().raw(), "rejected abstract source");
            return Err(ScheduleError::AbstractSource(handle.id()));
        }
        if self.handle_to_id.contains_key(&handle.id()) {
            warn!(target: LOG_TARGET, handle = handle.id().raw(), "rejected duplicate handle");
            return Err(ScheduleError::DuplicateHandle(handle.id()));
        }
        self.handle_to_id.insert(handle.id(), handle.clone());
        if emplaced {
            self.emplaced.insert(handle.id());
        } else if let Some(table) = handle.table_arc() {
            self.source_content.insert(handle.id(), table);
        }
        self.version += 1;
        debug!(target: LOG_TARGET, handle = handle.id().raw(), emplaced, "registered source handle");
        Ok(())
    }

    /// Insert a symbolic operation. See the component design's insertion
    /// protocol for the exact algorithm; this realizes it directly.
    pub fn insert_operation(
        &mut self,
        op: ScheduleOperator,
        persistent_results: bool,
    ) -> Result<NodeId> {
        let node_id = NodeId::next();
        let args = op.args();

        // 1. Validity checks.
        for (position, arg) in args.iter().enumerate() {
            if !self.handle_to_id.contains_key(&arg.id()) {
                return Err(ScheduleError::UnknownHandle(arg.id()));
            }
            if let Some(&deleter_node) = self.handle_deleter.get(&arg.id()) {
                // Any op referencing an argument already marked for deletion
                // is rejected, regardless of whether that deleter has
                // executed yet — §7's "already marked for deletion" clause
                // doesn't condition on execution state. `deleter_executed`
                // and `op.implies_deletion()` only distinguish the warning
                // text (double-delete vs. read-after-delete-claim).
                let deleter_executed = self
                    .node_to_op
                    .get(&deleter_node)
                    .map(ScheduleOperator::is_executed)
                    .unwrap_or(false);
                warn!(
                    target: LOG_TARGET,
                    arg = arg.id().raw(),
                    position,
                    deleter = deleter_node.raw(),
                    deleter_executed,
                    double_delete = op.implies_deletion(),
                    "rejected operation: argument already marked for deletion"
                );
                return Err(ScheduleError::OperationNotAllowed {
                    arg: arg.id(),
                    position,
                    deleter: deleter_node,
                });
            }
        }
        if op.implies_deletion() && op.is_executed() {
            for (position, arg) in args.iter().enumerate() {
                let all_executed = self
                    .handle_users
                    .get(&arg.id())
                    .into_iter()
                    .flatten()
                    .all(|u| {
                        self.node_to_op
                            .get(u)
                            .map(ScheduleOperator::is_executed)
                            .unwrap_or(true)
                    });
                if !all_executed {
                    warn!(
                        target: LOG_TARGET,
                        arg = arg.id().raw(),
                        "rejected pre-executed delete: unexecuted readers remain"
                    );
                    return Err(ScheduleError::OperationNotAllowed {
                        arg: arg.id(),
                        position,
                        deleter: node_id,
                    });
                }
            }
        }

        // 2. Clone and rebind to canonical handles.
        let mut cloned = op.clone();
        if !cloned.is_executed() {
            let canonical: Vec<ScheduleMultiDim> = args
                .iter()
                .map(|a| self.handle_to_id[&a.id()].clone())
                .collect();
            cloned.update_args(&canonical)?;
        }
        for result in cloned.results() {
            result.set_persistent(persistent_results);
        }

        let final_args = cloned.args();
        let final_results = cloned.results();
        let is_executed = cloned.is_executed();

        // 3. Register.
        for arg in &final_args {
            self.handle_users.entry(arg.id()).or_default().insert(node_id);
        }
        if cloned.implies_deletion() {
            for arg in &final_args {
                self.handle_deleter.insert(arg.id(), node_id);
            }
        }
        for (index, result) in final_results.iter().enumerate() {
            self.handle_to_id.insert(result.id(), result.clone());
            self.handle_producer.insert(result.id(), (node_id, index));
        }

        // 4. Add edges (skipped entirely for an already-executed op — it
        //    never enters the active DAG; this is also step 5's shortcut).
        if !is_executed {
            self.dag.insert(node_id, DagEdges::default());
            for arg in &final_args {
                if let Some(&(producer, _)) = self.handle_producer.get(&arg.id()) {
                    self.add_edge(producer, node_id);
                }
            }
            if cloned.implies_deletion() {
                for arg in &final_args {
                    if let Some(users) = self.handle_users.get(&arg.id()).cloned() {
                        for user in users {
                            self.add_edge(user, node_id);
                        }
                    }
                }
            } else {
                for arg in &final_args {
                    if let Some(&deleter) = self.handle_deleter.get(&arg.id()) {
                        self.add_edge(node_id, deleter);
                    }
                }
            }
        }

        self.node_to_op.insert(node_id, cloned);
        self.insertion_order.push(node_id);
        self.version += 1;
        debug!(
            target: LOG_TARGET,
            node = node_id.raw(),
            executed = is_executed,
            "inserted operation"
        );
        Ok(node_id)
    }

    fn add_edge(&mut self, parent: NodeId, child: NodeId) {
        if parent == child {
            return;
        }
        if !self.dag.contains_key(&parent) || !self.dag.contains_key(&child) {
            // One side already executed (removed from the active DAG); no
            // edge is needed since ordering is already satisfied.
            return;
        }
        self.dag.get_mut(&parent).unwrap().children.insert(child);
        self.dag.get_mut(&child).unwrap().parents.insert(parent);
    }

    /// Un-executed nodes in the active DAG with no un-executed parents.
    pub fn available_operations(&self) -> HashSet<NodeId> {
        self.dag
            .iter()
            .filter(|(_, edges)| edges.parents.is_empty())
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn operation(&self, node: NodeId) -> Option<&ScheduleOperator> {
        self.node_to_op.get(&node)
    }

    pub fn operation_mut(&mut self, node: NodeId) -> Option<&mut ScheduleOperator> {
        self.node_to_op.get_mut(&node)
    }

    /// Temporarily remove an operator for out-of-band execution (used by
    /// [`crate::executor::Executor`]'s parallel mode to hand disjoint
    /// operators to separate threads without holding multiple `&mut`
    /// borrows into `node_to_op` at once). The node remains present in
    /// `dag`/`insertion_order`; callers must [`Self::put_operation`] it back
    /// before touching this schedule's bookkeeping again.
    pub(crate) fn take_operation(&mut self, node: NodeId) -> Option<ScheduleOperator> {
        self.node_to_op.remove(&node)
    }

    /// Restore an operator removed by [`Self::take_operation`].
    pub(crate) fn put_operation(&mut self, node: NodeId, op: ScheduleOperator) {
        self.node_to_op.insert(node, op);
    }

    /// Mark `node` as executed in the DAG's structural bookkeeping: remove
    /// it from the active DAG and return children that become newly
    /// available. When `check` is true, validates the preconditions in the
    /// component design (node present, no unexecuted parents, operator
    /// reports executed).
    pub fn update_after_execution(&mut self, node: NodeId, check: bool) -> Result<Vec<NodeId>> {
        if check {
            let Some(edges) = self.dag.get(&node) else {
                return Err(ScheduleError::UnknownNode(node));
            };
            if !edges.parents.is_empty() {
                return Err(ScheduleError::NotAvailable(node));
            }
            let executed = self
                .node_to_op
                .get(&node)
                .map(ScheduleOperator::is_executed)
                .unwrap_or(false);
            if !executed {
                return Err(ScheduleError::NotAvailable(node));
            }
        } else if !self.dag.contains_key(&node) {
            return Err(ScheduleError::UnknownNode(node));
        }

        let children: Vec<NodeId> = self.dag[&node].children.iter().copied().collect();
        let mut newly_available = Vec::new();
        for child in children {
            if let Some(entry) = self.dag.get_mut(&child) {
                entry.parents.remove(&node);
                if entry.parents.is_empty() {
                    newly_available.push(child);
                }
            }
        }
        self.dag.remove(&node);
        self.version += 1;
        debug!(target: LOG_TARGET, node = node.raw(), "executed node removed from active dag");
        Ok(newly_available)
    }

    /// Tear down all owned state. Handles marked `persistent` or `emplaced`
    /// are not freed by this call — they are simply no longer tracked by
    /// this schedule; whether their underlying table is actually dropped
    /// depends on whether anything else still holds a reference to the
    /// handle, exactly as ordinary Rust ownership would have it.
    pub fn clear(&mut self) {
        self.dag.clear();
        self.node_to_op.clear();
        self.insertion_order.clear();
        self.handle_to_id.clear();
        self.handle_producer.clear();
        self.handle_users.clear();
        self.handle_deleter.clear();
        self.emplaced.clear();
        self.source_content.clear();
        self.version += 1;
        debug!(target: LOG_TARGET, "schedule cleared");
    }

    /// Correspondence check for one pair of argument handles during
    /// equality, recording newly-discovered source-handle pairs into `bij`.
    fn handles_correspond(
        &self,
        mine: &ScheduleMultiDim,
        other_sched: &Schedule,
        theirs: &ScheduleMultiDim,
        bij: &mut HashMap<HandleId, HandleId>,
        node_bij: &HashMap<NodeId, NodeId>,
    ) -> bool {
        let my_producer = self.handle_producer.get(&mine.id());
        let their_producer = other_sched.handle_producer.get(&theirs.id());
        match (my_producer, their_producer) {
            (Some(&(mp, mi)), Some(&(tp, ti))) => {
                mi == ti && node_bij.get(&mp) == Some(&tp)
            }
            (None, None) => {
                if let Some(&expected) = bij.get(&mine.id()) {
                    expected == theirs.id()
                } else if mine.has_same_variables(theirs) && mine.has_same_content(theirs) {
                    bij.insert(mine.id(), theirs.id());
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

impl PartialEq for Schedule {
    /// Two schedules are equal iff there is a bijection between their
    /// operations, walked in insertion order (always a valid topological
    /// order by construction), such that corresponding operations have the
    /// same variant/functor identity and corresponding arguments either
    /// descend from bijection-mapped nodes at the same output index, or are
    /// both source handles with matching variables and content.
    fn eq(&self, other: &Self) -> bool {
        if self.insertion_order.len() != other.insertion_order.len() {
            return false;
        }
        let mut handle_bij: HashMap<HandleId, HandleId> = HashMap::new();
        let mut node_bij: HashMap<NodeId, NodeId> = HashMap::new();

        for (&na, &nb) in self.insertion_order.iter().zip(other.insertion_order.iter()) {
            let opa = &self.node_to_op[&na];
            let opb = &other.node_to_op[&nb];
            if !opa.is_same_operator(opb) || opa.is_executed() != opb.is_executed() {
                return false;
            }
            let args_a = opa.args();
            let args_b = opb.args();
            if args_a.len() != args_b.len() {
                return false;
            }
            for (ha, hb) in args_a.iter().zip(args_b.iter()) {
                if !self.handles_correspond(ha, other, hb, &mut handle_bij, &node_bij) {
                    return false;
                }
            }
            let results_a = opa.results();
            let results_b = opb.results();
            if results_a.len() != results_b.len() {
                return false;
            }
            node_bij.insert(na, nb);
        }
        true
    }
}

impl Clone for Schedule {
    /// Rebuilds the schedule by replaying every operation in insertion
    /// order into a fresh `Schedule`. Source handles are duplicated from
    /// their registration-time content snapshot (aliasing the underlying
    /// table by reference, since `MultiDimTable` is not required to be
    /// `Clone`) unless they were emplaced, in which case they are copied by
    /// reference exactly as the component design requires. The snapshot —
    /// not the live source handle — is the one used here because a source
    /// that a `DeleteOp` has since released has nothing left to read off
    /// the handle itself. Operations that had already executed are
    /// re-executed against the copied arguments — safe because
    /// combine/project functors are required to be deterministic.
    fn clone(&self) -> Self {
        let mut new_sched = Schedule::new();
        let mut handle_map: HashMap<HandleId, ScheduleMultiDim> = HashMap::new();

        for &node in &self.insertion_order {
            let op = &self.node_to_op[&node];
            let mut remapped_args = Vec::with_capacity(op.args().len());
            for arg in op.args() {
                let mapped = if let Some(existing) = handle_map.get(&arg.id()) {
                    existing.clone()
                } else {
                    let is_source = self.handle_producer.get(&arg.id()).is_none();
                    debug_assert!(is_source, "non-source arg must already be in handle_map");
                    let fresh = if self.emplaced.contains(&arg.id()) {
                        arg.clone()
                    } else {
                        let content = self.source_content.get(&arg.id()).unwrap_or_else(|| {
                            panic!(
                                "source handle {:?} has no registration-time content snapshot",
                                arg.id()
                            )
                        });
                        ScheduleMultiDim::new_shared(Arc::clone(content), false)
                    };
                    if self.emplaced.contains(&arg.id()) {
                        new_sched
                            .emplace_schedule_multidim(&fresh)
                            .expect("emplaced source was concrete and unregistered in new_sched");
                    } else {
                        new_sched
                            .insert_schedule_multidim(&fresh)
                            .expect("snapshot-backed source is always concrete and fresh");
                    }
                    handle_map.insert(arg.id(), fresh.clone());
                    fresh
                };
                remapped_args.push(mapped);
            }

            let new_op = match op {
                ScheduleOperator::Combine { functor, .. } => ScheduleOperator::new_combine(
                    remapped_args[0].clone(),
                    remapped_args[1].clone(),
                    std::sync::Arc::clone(&functor.0),
                ),
                ScheduleOperator::Project {
                    del_vars, functor, ..
                } => ScheduleOperator::new_project(
                    remapped_args[0].clone(),
                    del_vars.clone(),
                    std::sync::Arc::clone(&functor.0),
                ),
                ScheduleOperator::Delete { .. } => {
                    ScheduleOperator::new_delete(remapped_args[0].clone())
                }
            };

            let persistent = op.results().first().map(ScheduleMultiDim::persistent).unwrap_or(false);
            let new_node = new_sched
                .insert_operation(new_op, persistent)
                .expect("replaying a valid schedule cannot fail to insert");

            for (orig_result, new_result) in op.results().iter().zip(
                new_sched
                    .operation(new_node)
                    .expect("just inserted")
                    .results()
                    .iter(),
            ) {
                handle_map.insert(orig_result.id(), new_result.clone());
            }

            if op.is_executed() {
                new_sched
                    .operation_mut(new_node)
                    .expect("just inserted")
                    .execute()
                    .expect("replaying a deterministic, previously-successful functor cannot fail");
                new_sched.update_after_execution(new_node, false).ok();
            }
        }

        new_sched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_combine, mock_project, mock_var, reset_id_generator, MockTable};
    use std::sync::Arc;

    fn concrete(name: &str, domain: u32, value: f64) -> ScheduleMultiDim {
        let v = mock_var(name, domain);
        ScheduleMultiDim::new_concrete(MockTable::constant(vec![v], value), false)
    }

    #[test]
    fn available_operations_on_empty_schedule_is_empty() {
        let sched = Schedule::new();
        assert!(sched.available_operations().is_empty());
    }

    #[test]
    fn insert_then_execute_then_update_cycle() {
        reset_id_generator();
        let mut sched = Schedule::new();
        let a = concrete("A", 2, 1.0);
        let b = concrete("B", 3, 2.0);
        sched.insert_schedule_multidim(&a).unwrap();
        sched.insert_schedule_multidim(&b).unwrap();

        let op = ScheduleOperator::new_combine(a, b, Arc::new(mock_combine));
        let node = sched.insert_operation(op, false).unwrap();

        assert_eq!(sched.available_operations(), HashSet::from([node]));
        sched.operation_mut(node).unwrap().execute().unwrap();
        let newly_available = sched.update_after_execution(node, true).unwrap();
        assert!(newly_available.is_empty());
        assert!(sched.available_operations().is_empty());
    }

    #[test]
    fn unknown_handle_is_rejected() {
        reset_id_generator();
        let mut sched = Schedule::new();
        let a = concrete("A", 2, 1.0);
        let b = concrete("B", 2, 1.0);
        // only register `a`; `b` was never inserted into this schedule.
        sched.insert_schedule_multidim(&a).unwrap();
        let op = ScheduleOperator::new_combine(a, b, Arc::new(mock_combine));
        let err = sched.insert_operation(op, false).unwrap_err();
        assert!(matches!(err, ScheduleError::UnknownHandle(_)));
    }

    #[test]
    fn deletion_conflict_is_rejected() {
        reset_id_generator();
        let mut sched = Schedule::new();
        let a = concrete("A", 2, 1.0);
        let b = concrete("B", 2, 1.0);
        sched.insert_schedule_multidim(&a).unwrap();
        sched.insert_schedule_multidim(&b).unwrap();

        let combine = ScheduleOperator::new_combine(a.clone(), b, Arc::new(mock_combine));
        sched.insert_operation(combine, false).unwrap();

        let delete = ScheduleOperator::new_delete(a.clone());
        sched.insert_operation(delete, false).unwrap();

        let del_vars = crate::variable::VarSet::new();
        let project = ScheduleOperator::new_project(a, del_vars, Arc::new(mock_project));
        let err = sched.insert_operation(project, false).unwrap_err();
        assert!(matches!(err, ScheduleError::OperationNotAllowed { .. }));
    }

    #[test]
    fn clone_is_equal_to_original() {
        reset_id_generator();
        let mut sched = Schedule::new();
        let a = concrete("A", 2, 3.0);
        let b = concrete("B", 2, 4.0);
        sched.insert_schedule_multidim(&a).unwrap();
        sched.insert_schedule_multidim(&b).unwrap();
        let op = ScheduleOperator::new_combine(a, b, Arc::new(mock_combine));
        let node = sched.insert_operation(op, false).unwrap();
        sched.operation_mut(node).unwrap().execute().unwrap();
        sched.update_after_execution(node, true).unwrap();

        let cloned = sched.clone();
        assert!(cloned == sched);
    }

    #[test]
    fn clear_then_reinsert_is_equal() {
        reset_id_generator();
        let mut sched = Schedule::new();
        let a = concrete("A", 2, 1.0);
        let b = concrete("B", 2, 1.0);
        sched.insert_schedule_multidim(&a.clone()).unwrap();
        sched.insert_schedule_multidim(&b.clone()).unwrap();
        let op = ScheduleOperator::new_combine(a.clone(), b.clone(), Arc::new(mock_combine));
        sched.insert_operation(op, false).unwrap();

        let before = sched.clone();
        sched.clear();
        sched.insert_schedule_multidim(&a).unwrap();
        sched.insert_schedule_multidim(&b).unwrap();
        let op2 = ScheduleOperator::new_combine(a, b, Arc::new(mock_combine));
        sched.insert_operation(op2, false).unwrap();

        assert!(sched == before);
    }
}
