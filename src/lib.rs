//! # cliquesched
//!
//! The inference-scheduling core of a probabilistic graphical model library:
//! a directed-acyclic-graph [`Schedule`] of symbolic operations over
//! multi-dimensional tables, plus a **combine-and-project** planner that
//! drives junction-tree-style variable elimination over it.
//!
//! Everything here is deliberately narrow. The library this crate is
//! extracted from also does network/factor parsing, parameter learning, and
//! CLI frontends; none of that lives here. What does live here is the part
//! that's actually hard to get right: building a plan before any numeric
//! work happens, deduplicating tables and their producing operations,
//! tracking which handles a deleting operation has invalidated, and
//! comparing two plans for equality.
//!
//! ## Quick start
//!
//! ```
//! use cliquesched::{Schedule, ScheduleMultiDim, ScheduleOperator};
//! use cliquesched::testing::{mock_combine, mock_var, MockTable};
//! use std::sync::Arc;
//!
//! let mut schedule = Schedule::new();
//! let a = mock_var("A", 2);
//! let b = mock_var("B", 2);
//! let ha = ScheduleMultiDim::new_concrete(MockTable::constant(vec![a], 1.0), false);
//! let hb = ScheduleMultiDim::new_concrete(MockTable::constant(vec![b], 2.0), false);
//! schedule.insert_schedule_multidim(&ha).unwrap();
//! schedule.insert_schedule_multidim(&hb).unwrap();
//!
//! let op = ScheduleOperator::new_combine(ha, hb, Arc::new(mock_combine));
//! let node = schedule.insert_operation(op, false).unwrap();
//!
//! schedule.operation_mut(node).unwrap().execute().unwrap();
//! schedule.update_after_execution(node, true).unwrap();
//! assert!(schedule.available_operations().is_empty());
//! ```
//!
//! ## Core concepts
//!
//! - [`ScheduleMultiDim`] — a symbolic handle to a table that may not be
//!   computed yet.
//! - [`ScheduleOperator`] — a combine, project, or delete over handles.
//! - [`Schedule`] — the DAG of operators, with insertion, execution-driven
//!   updates, available-operation enumeration, equality, and cloning.
//! - [`combine_planner::CombinationPlanner`] — collapses a set of handles
//!   into one via greedy minimum-size pairing.
//! - [`project_planner::ProjectionPlanner`] — projects a set of variables
//!   out of one handle.
//! - [`combine_and_project::CombineAndProjectPlanner`] — the top-level
//!   variable-elimination planner that drives both of the above.
//! - [`executor::Executor`] — an optional convenience driver over
//!   `Schedule`'s own polling contract; sequential or `rayon`-parallel.
//!
//! None of the planning or scheduling logic looks inside a table's values.
//! Planning only ever consults variable sets and domain sizes; the actual
//! numeric work is delegated to caller-supplied combine/project functors.

pub mod combine_and_project;
pub mod combine_planner;
pub mod error;
pub mod executor;
pub mod handle;
pub mod ids;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod operator;
pub mod project_planner;
pub mod schedule;
pub mod table;
pub mod testing;
pub mod variable;

pub use combine_and_project::CombineAndProjectPlanner;
pub use combine_planner::CombinationPlanner;
pub use error::ScheduleError;
pub use executor::{ExecMode, Executor};
pub use handle::ScheduleMultiDim;
pub use ids::{HandleId, NodeId};
pub use operator::ScheduleOperator;
pub use project_planner::ProjectionPlanner;
pub use schedule::Schedule;
pub use table::{CombineFn, MultiDimTable, ProjectFn};
pub use variable::{domain_product, VarHandle, VarSet, Variable};
