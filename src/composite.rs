//! Collapsing per-target requests into composite-target requests.
//!
//! A batch is the set of targets that asked for the same method in one
//! debounce window, each with whatever settles its caller. When every member
//! of a composite is in the batch (and the composite itself is not), the
//! members are replaced by one entry for the composite whose settlement
//! carries all of theirs.

use crate::config::ReductionMode;
use crate::types::{CompositeMapping, TargetId};
use std::collections::HashSet;

/// Ordered `(target, settlement)` pairs for one method
pub type Batch<T> = Vec<(TargetId, T)>;

/// A settlement that can take over the callers of another
pub trait Absorb {
    fn absorb(&mut self, member: Self);
}

/// Reduce a batch against `mapping`
///
/// Composites are considered in mapping order; a composite appended by the
/// reduction is placed at the end of the batch. Under
/// [`ReductionMode::FixedPoint`] passes repeat until nothing collapses or the
/// batch returns to a set of targets it already had, which is how a cyclic
/// mapping shows up.
pub fn reduce<T>(mapping: &CompositeMapping, mut batch: Batch<T>, mode: ReductionMode) -> Batch<T>
where
    T: Absorb + Default,
{
    match mode {
        ReductionMode::SinglePass => {
            reduce_pass(mapping, &mut batch);
        }
        ReductionMode::FixedPoint => {
            let mut seen = HashSet::new();
            seen.insert(target_set(&batch));
            while reduce_pass(mapping, &mut batch) {
                if !seen.insert(target_set(&batch)) {
                    tracing::warn!("Composite mapping cycles; stopping reduction");
                    break;
                }
            }
        }
    }

    batch
}

/// One scan over the mapping; returns whether anything collapsed
fn reduce_pass<T>(mapping: &CompositeMapping, batch: &mut Batch<T>) -> bool
where
    T: Absorb + Default,
{
    let mut collapsed = false;

    for (composite, members) in mapping.composites() {
        if position(batch, composite).is_some() {
            continue;
        }
        if members.iter().any(|m| position(batch, m).is_none()) {
            continue;
        }

        let mut settlement = T::default();
        for member in members {
            // Duplicate member names are only removed once.
            if let Some(index) = position(batch, member) {
                let (_, member_settlement) = batch.remove(index);
                settlement.absorb(member_settlement);
            }
        }

        tracing::debug!("Collapsed {:?} into {}", members, composite);
        batch.push((composite.to_string(), settlement));
        collapsed = true;
    }

    collapsed
}

fn position<T>(batch: &Batch<T>, target: &str) -> Option<usize> {
    batch.iter().position(|(t, _)| t == target)
}

fn target_set<T>(batch: &Batch<T>) -> Vec<TargetId> {
    let mut targets: Vec<TargetId> = batch.iter().map(|(t, _)| t.clone()).collect();
    targets.sort_unstable();
    targets
}
