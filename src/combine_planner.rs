//! `CombinationPlanner`: greedy Huffman-like pairing of table handles into a
//! single combined handle, minimizing the sum of intermediate table sizes.

use crate::error::Result;
use crate::handle::ScheduleMultiDim;
use crate::operator::ScheduleOperator;
use crate::schedule::Schedule;
use crate::table::{CombineFn, MultiDimTable};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

/// A heap entry ordered by `(domain size, handle id)`, giving the "pop the
/// two smallest, tie-break on id" rule the component design calls for.
#[derive(Clone)]
struct HeapItem {
    size: u64,
    tie: u64,
    handle: ScheduleMultiDim,
}

impl HeapItem {
    fn new(handle: ScheduleMultiDim) -> Self {
        Self {
            size: handle.domain_size(),
            tie: handle.id().raw(),
            handle,
        }
    }

    fn key(&self) -> (u64, u64) {
        (self.size, self.tie)
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for HeapItem {}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Stateless planner: given a nonempty set of handles and a combine functor,
/// collapses them into one handle via greedy minimum-size pairing.
pub struct CombinationPlanner;

impl CombinationPlanner {
    /// Plan the combine chain without touching any `Schedule`. Returns the
    /// ordered operations and the single handle they collapse `handles`
    /// into. Panics if `handles` is empty — callers (the top-level
    /// variable-elimination planner) never invoke this on an empty clique.
    pub fn operations(
        handles: &[ScheduleMultiDim],
        functor: &Arc<CombineFn>,
    ) -> (Vec<ScheduleOperator>, ScheduleMultiDim) {
        assert!(
            !handles.is_empty(),
            "CombinationPlanner::operations requires at least one handle"
        );
        let mut heap: BinaryHeap<Reverse<HeapItem>> = handles
            .iter()
            .cloned()
            .map(|h| Reverse(HeapItem::new(h)))
            .collect();
        let mut ops = Vec::new();
        while heap.len() > 1 {
            let Reverse(a) = heap.pop().unwrap();
            let Reverse(b) = heap.pop().unwrap();
            let op = ScheduleOperator::new_combine(a.handle, b.handle, Arc::clone(functor));
            let result = op.results().into_iter().next().unwrap();
            heap.push(Reverse(HeapItem::new(result)));
            ops.push(op);
        }
        let Reverse(last) = heap.pop().expect("non-empty input has at least one item");
        (ops, last.handle)
    }

    /// Same plan, appended into `sched`. `persistent` is applied to every
    /// intermediate combine result.
    pub fn schedule(
        sched: &mut Schedule,
        handles: &[ScheduleMultiDim],
        functor: &Arc<CombineFn>,
        persistent: bool,
    ) -> Result<ScheduleMultiDim> {
        if handles.len() == 1 {
            return Ok(handles[0].clone());
        }
        let (ops, _) = Self::operations(handles, functor);
        let mut final_handle = handles[0].clone();
        for op in ops {
            let node = sched.insert_operation(op, persistent)?;
            final_handle = sched.operation(node).unwrap().results()[0].clone();
        }
        Ok(final_handle)
    }

    /// Cost estimate: the sum of every intermediate combine operation's
    /// cost (the Open Question's chosen cost model — see DESIGN.md).
    pub fn nb_operations(handles: &[ScheduleMultiDim], functor: &Arc<CombineFn>) -> u64 {
        if handles.len() <= 1 {
            return 0;
        }
        let (ops, _) = Self::operations(handles, functor);
        ops.iter().map(ScheduleOperator::cost).sum()
    }

    /// `(peak, final)` byte-count proxy. `peak` replays the same pairing
    /// order tracking a running live-total; exact result sizes come from
    /// the handles `operations()` actually produced, so the replay is
    /// faithful even though it only needs the multiset of input sizes (tie
    /// order among equal-sized handles never changes which values are
    /// popped together).
    pub fn memory_usage(handles: &[ScheduleMultiDim], functor: &Arc<CombineFn>) -> (u64, u64) {
        if handles.is_empty() {
            return (0, 0);
        }
        let (ops, final_handle) = Self::operations(handles, functor);
        let mut heap: BinaryHeap<Reverse<u64>> =
            handles.iter().map(|h| Reverse(h.domain_size())).collect();
        let mut total: u64 = heap.iter().map(|Reverse(s)| *s).sum();
        let mut peak = total;
        for op in &ops {
            let result_size = op.results()[0].domain_size();
            let Reverse(a) = heap.pop().unwrap();
            let Reverse(b) = heap.pop().unwrap();
            total = total - a - b + result_size;
            heap.push(Reverse(result_size));
            peak = peak.max(total);
        }
        (peak, final_handle.domain_size())
    }

    /// Ad-hoc combine of concrete tables with no `Schedule` involved, for
    /// callers that just want a combined table. Returns `Arc` (not `Box`)
    /// since the scheduler's internal representation is `Arc`-based
    /// throughout and an extra ownership transfer would buy nothing.
    pub fn execute(
        tables: &[Arc<dyn MultiDimTable>],
        functor: &Arc<CombineFn>,
    ) -> anyhow::Result<Arc<dyn MultiDimTable>> {
        if tables.is_empty() {
            anyhow::bail!("CombinationPlanner::execute requires at least one table");
        }
        let handles: Vec<ScheduleMultiDim> = tables
            .iter()
            .map(|t| ScheduleMultiDim::new_shared(Arc::clone(t), false))
            .collect();
        let (mut ops, final_handle) = Self::operations(&handles, functor);
        for op in &mut ops {
            op.execute()?;
        }
        Ok(final_handle
            .table_arc()
            .expect("every combine op executed; final handle must be concrete"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_combine, mock_var, reset_id_generator, MockTable};

    #[test]
    fn single_handle_produces_no_operations() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let h = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a], 1.0), false);
        let functor: Arc<CombineFn> = Arc::new(mock_combine);
        let (ops, result) = CombinationPlanner::operations(&[h.clone()], &functor);
        assert!(ops.is_empty());
        assert_eq!(result.id(), h.id());
    }

    #[test]
    fn three_handles_combine_pairwise() {
        reset_id_generator();
        let a = mock_var("A", 2);
        let b = mock_var("B", 3);
        let c = mock_var("C", 5);
        let ha = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a], 1.0), false);
        let hb = ScheduleMultiDim::new_concrete(MockTable::constant(vec![b], 1.0), false);
        let hc = ScheduleMultiDim::new_concrete(MockTable::constant(vec![c], 1.0), false);
        let functor: Arc<CombineFn> = Arc::new(mock_combine);
        let (ops, result) = CombinationPlanner::operations(&[ha, hb, hc], &functor);
        assert_eq!(ops.len(), 2);
        assert_eq!(result.variables().len(), 3);
    }

    #[test]
    fn schedule_variant_executes_cleanly() {
        reset_id_generator();
        let mut sched = Schedule::new();
        let a = mock_var("A", 2);
        let b = mock_var("B", 3);
        let ha = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a], 2.0), false);
        let hb = ScheduleMultiDim::new_concrete(MockTable::constant(vec![b], 3.0), false);
        sched.insert_schedule_multidim(&ha).unwrap();
        sched.insert_schedule_multidim(&hb).unwrap();
        let functor: Arc<CombineFn> = Arc::new(mock_combine);
        let result = CombinationPlanner::schedule(&mut sched, &[ha, hb], &functor, false).unwrap();
        assert!(result.is_abstract());
        let node = sched.available_operations().into_iter().next().unwrap();
        sched.operation_mut(node).unwrap().execute().unwrap();
        assert!(!result.is_abstract());
    }
}
