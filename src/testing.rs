//! Test-only building blocks: id-generator reset, minimal `Variable`/
//! `MultiDimTable` implementations, reference combine/project kernels, and
//! collection-style assertions, in the idiom of the teacher crate's own
//! `testing` module.
//!
//! Everything here is exported (not `#[cfg(test)]`-gated) so downstream
//! crates writing their own regression tests against this scheduler can
//! reuse it, exactly as the spec's testing-support component calls for.

use crate::error::Result;
use crate::ids;
use crate::variable::{VarHandle, VarSet, Variable, domain_product};
use std::any::Any;
use std::sync::Arc;

/// Reset the global handle-id and node-id counters to zero.
///
/// Not safe to call while any `Schedule` or `ScheduleMultiDim` from a
/// previous test is still alive in another thread of the same test binary;
/// intended for single-threaded `#[test]` functions that build fresh state
/// at the top, mirroring [`ids::reset_id_generators`].
pub fn reset_id_generator() {
    ids::reset_id_generators();
}

/// A minimal named, finite discrete domain for tests.
#[derive(Debug)]
pub struct MockVariable {
    name: String,
    domain: u32,
}

impl MockVariable {
    pub fn new(name: impl Into<String>, domain: u32) -> Self {
        Self {
            name: name.into(),
            domain,
        }
    }
}

impl Variable for MockVariable {
    fn domain_size(&self) -> u32 {
        self.domain
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build a [`VarHandle`] from a fresh [`MockVariable`]. Convenience for
/// tests that don't need to hold onto the `Arc<MockVariable>` themselves.
pub fn mock_var(name: impl Into<String>, domain: u32) -> VarHandle {
    VarHandle::new(Arc::new(MockVariable::new(name, domain)))
}

/// A dense `f64` array over an explicit variable ordering.
///
/// `MultiDimTable::variables()` exposes these unordered (as the trait
/// requires), but internally `MockTable` keeps the construction order so its
/// reference combine/project kernels can do row-major indexing.
#[derive(Debug, Clone)]
pub struct MockTable {
    order: Vec<VarHandle>,
    varset: VarSet,
    values: Vec<f64>,
}

fn strides(domains: &[u32]) -> Vec<u64> {
    let mut strides = vec![1u64; domains.len()];
    for i in (0..domains.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * u64::from(domains[i + 1]);
    }
    strides
}

fn odometer_increment(assignment: &mut [u32], domains: &[u32]) {
    for i in (0..domains.len()).rev() {
        assignment[i] += 1;
        if assignment[i] < domains[i] {
            return;
        }
        assignment[i] = 0;
    }
}

impl MockTable {
    /// Build a table over `vars` (in the given order) by evaluating `f` at
    /// every joint assignment. `f` receives one index per variable, aligned
    /// with `vars`.
    pub fn new(vars: Vec<VarHandle>, f: impl Fn(&[u32]) -> f64) -> Self {
        let domains: Vec<u32> = vars.iter().map(VarHandle::domain_size).collect();
        let total: u64 = domains.iter().map(|d| u64::from(*d)).product::<u64>().max(1);
        let mut values = Vec::with_capacity(total as usize);
        let mut assignment = vec![0u32; domains.len()];
        for _ in 0..total {
            values.push(f(&assignment));
            odometer_increment(&mut assignment, &domains);
        }
        let varset = vars.iter().cloned().collect();
        Self {
            order: vars,
            varset,
            values,
        }
    }

    /// A table whose every entry is `value`.
    pub fn constant(vars: Vec<VarHandle>, value: f64) -> Self {
        Self::new(vars, |_| value)
    }

    pub fn order(&self) -> &[VarHandle] {
        &self.order
    }

    pub fn value_at(&self, assignment: &[u32]) -> f64 {
        let domains: Vec<u32> = self.order.iter().map(VarHandle::domain_size).collect();
        let strides = strides(&domains);
        let idx: u64 = assignment
            .iter()
            .zip(strides.iter())
            .map(|(a, s)| u64::from(*a) * s)
            .sum();
        self.values[idx as usize]
    }
}

impl crate::table::MultiDimTable for MockTable {
    fn variables(&self) -> &VarSet {
        &self.varset
    }

    fn domain_size(&self) -> u64 {
        domain_product(&self.varset)
    }

    fn content_eq(&self, other: &dyn crate::table::MultiDimTable) -> bool {
        let Some(other) = other.as_any().downcast_ref::<MockTable>() else {
            return false;
        };
        if self.varset != other.varset {
            return false;
        }
        let domains: Vec<u32> = self.order.iter().map(VarHandle::domain_size).collect();
        let total: u64 = domains.iter().map(|d| u64::from(*d)).product::<u64>().max(1);
        let mut assignment = vec![0u32; domains.len()];
        for _ in 0..total {
            let mut mapped = vec![0u32; other.order.len()];
            for (i, v) in self.order.iter().enumerate() {
                let j = other.order.iter().position(|ov| ov == v).unwrap();
                mapped[j] = assignment[i];
            }
            let a = self.value_at(&assignment);
            let b = other.value_at(&mapped);
            if (a - b).abs() > 1e-9 {
                return false;
            }
            odometer_increment(&mut assignment, &domains);
        }
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Reference combine kernel: pointwise product, `V(result) = V(a) ∪ V(b)`.
///
/// Registered in tests as the `CombineFn` every `ScheduleOperator::new_combine`
/// call is built with; production callers supply their own numeric kernel.
pub fn mock_combine(
    a: &dyn crate::table::MultiDimTable,
    b: &dyn crate::table::MultiDimTable,
) -> anyhow::Result<Box<dyn crate::table::MultiDimTable>> {
    let a = a
        .as_any()
        .downcast_ref::<MockTable>()
        .ok_or_else(|| anyhow::anyhow!("mock_combine: not a MockTable"))?;
    let b = b
        .as_any()
        .downcast_ref::<MockTable>()
        .ok_or_else(|| anyhow::anyhow!("mock_combine: not a MockTable"))?;

    let mut order: Vec<VarHandle> = a.order.clone();
    for v in &b.order {
        if !order.contains(v) {
            order.push(v.clone());
        }
    }
    let a_idx: Vec<usize> = a
        .order
        .iter()
        .map(|v| order.iter().position(|ov| ov == v).unwrap())
        .collect();
    let b_idx: Vec<usize> = b
        .order
        .iter()
        .map(|v| order.iter().position(|ov| ov == v).unwrap())
        .collect();

    let result = MockTable::new(order, |assignment| {
        let a_assignment: Vec<u32> = a_idx.iter().map(|&i| assignment[i]).collect();
        let b_assignment: Vec<u32> = b_idx.iter().map(|&i| assignment[i]).collect();
        a.value_at(&a_assignment) * b.value_at(&b_assignment)
    });
    Ok(Box::new(result))
}

/// Reference project kernel: sum out every variable in `del_vars`,
/// `V(result) = V(a) ∖ del_vars`.
pub fn mock_project(
    a: &dyn crate::table::MultiDimTable,
    del_vars: &VarSet,
) -> anyhow::Result<Box<dyn crate::table::MultiDimTable>> {
    let a = a
        .as_any()
        .downcast_ref::<MockTable>()
        .ok_or_else(|| anyhow::anyhow!("mock_project: not a MockTable"))?;

    let kept: Vec<VarHandle> = a
        .order
        .iter()
        .filter(|v| !del_vars.contains(*v))
        .cloned()
        .collect();
    let summed: Vec<VarHandle> = a
        .order
        .iter()
        .filter(|v| del_vars.contains(*v))
        .cloned()
        .collect();
    let summed_domains: Vec<u32> = summed.iter().map(VarHandle::domain_size).collect();
    let summed_total: u64 = summed_domains
        .iter()
        .map(|d| u64::from(*d))
        .product::<u64>()
        .max(1);

    let result = MockTable::new(kept.clone(), |kept_assignment| {
        let mut total = 0.0;
        let mut sum_assignment = vec![0u32; summed.len()];
        for _ in 0..summed_total {
            let mut full = vec![0u32; a.order.len()];
            for (i, v) in kept.iter().enumerate() {
                let j = a.order.iter().position(|ov| ov == v).unwrap();
                full[j] = kept_assignment[i];
            }
            for (i, v) in summed.iter().enumerate() {
                let j = a.order.iter().position(|ov| ov == v).unwrap();
                full[j] = sum_assignment[i];
            }
            total += a.value_at(&full);
            odometer_increment(&mut sum_assignment, &summed_domains);
        }
        total
    });
    Ok(Box::new(result))
}

/// Assert that two schedules compare equal via [`PartialEq`], with a
/// human-readable panic message naming the mismatch.
pub fn assert_schedules_equal(
    actual: &crate::schedule::Schedule,
    expected: &crate::schedule::Schedule,
) {
    assert!(
        actual == expected,
        "schedules differ:\n  actual version:   {}\n  expected version: {}\n  (structural equality failed; see Schedule::eq)",
        actual.version(),
        expected.version()
    );
}

/// Assert that two variable sets contain exactly the same variables (by
/// handle identity).
pub fn assert_variable_sets_equal(actual: &VarSet, expected: &VarSet) {
    assert_eq!(
        actual, expected,
        "variable set mismatch:\n  expected: {expected:?}\n  actual:   {actual:?}"
    );
}

/// Convenience wrapper: run a fallible block and assert it returns `Ok`,
/// panicking with the error's `Display` otherwise.
pub fn expect_ok<T>(result: Result<T>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("expected Ok, got error: {e}"),
    }
}
