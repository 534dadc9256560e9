/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The multi-indexed container of block states.
//!
//! One set of shared block-state handles, three simultaneous lookup orders:
//! 1. `by_id`: unique lookup by block id.
//! 2. `by_prev`: ordered on the parent id, so all children of a block can be range-scanned in
//!    logarithmic-plus-output time. Without this view, removing a descendant subtree would be
//!    quadratic.
//! 3. `by_fork_choice`: ordered on `(is_valid, irreversible_blocknum, block_num, id)`,
//!    descending on the first three components and ascending on id. The first element is the
//!    globally most-preferred block, and valid blocks precede invalid ones.
//!
//! Validity is the leading fork-choice key component, so flipping a state's flag re-keys its
//! entry; [`ForkMultiIndex::set_validity`] is the only mutation path.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::types::basic::{BlockId, BlockNum};
use crate::types::state::{BlockState, IrreversibilityRule};

/// Whether `a` is strictly preferred to `b` under the fork-choice rule: the block whose last
/// irreversible ancestor is furthest forward wins; within the same irreversibility level, the
/// higher block wins. Ties are broken elsewhere by ascending id.
pub(crate) fn prefer<R: IrreversibilityRule>(a: &BlockState<R>, b: &BlockState<R>) -> bool {
    (a.irreversible_blocknum(), a.block_num()) > (b.irreversible_blocknum(), b.block_num())
}

/// Composite key of the fork-choice ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ForkChoiceKey {
    pub valid: bool,
    pub irreversible_blocknum: BlockNum,
    pub block_num: BlockNum,
    pub id: BlockId,
}

impl ForkChoiceKey {
    fn of<R: IrreversibilityRule>(state: &BlockState<R>) -> Self {
        Self {
            valid: state.is_valid(),
            irreversible_blocknum: state.irreversible_blocknum(),
            block_num: state.block_num(),
            id: state.id(),
        }
    }

    fn with_validity(mut self, valid: bool) -> Self {
        self.valid = valid;
        self
    }

    /// A key that sorts after every valid entry and at-or-before every invalid one: the start
    /// bound of the invalid partition.
    const fn invalid_partition_start() -> Self {
        Self {
            valid: false,
            irreversible_blocknum: BlockNum::MAX,
            block_num: BlockNum::MAX,
            id: BlockId::ZERO,
        }
    }

    /// Whether `a` is strictly preferred to `b`, ignoring validity.
    fn preferred(a: &Self, b: &Self) -> bool {
        (a.irreversible_blocknum, a.block_num) > (b.irreversible_blocknum, b.block_num)
    }
}

impl Ord for ForkChoiceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .valid
            .cmp(&self.valid)
            .then_with(|| other.irreversible_blocknum.cmp(&self.irreversible_blocknum))
            .then_with(|| other.block_num.cmp(&self.block_num))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ForkChoiceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The container itself. Stores every block state strictly descending from the fork database's
/// root; the root is held by the instance and never appears here.
pub(crate) struct ForkMultiIndex<R: IrreversibilityRule> {
    by_id: HashMap<BlockId, Arc<BlockState<R>>>,
    by_prev: BTreeSet<(BlockId, BlockId)>,
    by_fork_choice: BTreeSet<ForkChoiceKey>,
}

impl<R: IrreversibilityRule> ForkMultiIndex<R> {
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_prev: BTreeSet::new(),
            by_fork_choice: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: &BlockId) -> Option<&Arc<BlockState<R>>> {
        self.by_id.get(id)
    }

    /// Insert a state into all three views. Returns `false` (and changes nothing) if a state
    /// with the same id is already present.
    pub fn insert(&mut self, state: Arc<BlockState<R>>) -> bool {
        if self.by_id.contains_key(&state.id()) {
            return false;
        }
        self.by_prev.insert((state.previous(), state.id()));
        self.by_fork_choice.insert(ForkChoiceKey::of(&state));
        self.by_id.insert(state.id(), state);
        true
    }

    /// Remove the state with the given id from all three views, returning its handle.
    pub fn erase(&mut self, id: &BlockId) -> Option<Arc<BlockState<R>>> {
        let state = self.by_id.remove(id)?;
        self.by_prev.remove(&(state.previous(), state.id()));
        self.by_fork_choice.remove(&ForkChoiceKey::of(&state));
        Some(state)
    }

    /// Ids of all direct children of `id`, by range scan over the `by_prev` view.
    pub fn children(&self, id: &BlockId) -> impl Iterator<Item = BlockId> + '_ {
        let parent = *id;
        self.by_prev
            .range((parent, BlockId::ZERO)..)
            .take_while(move |(prev, _)| *prev == parent)
            .map(|(_, child)| *child)
    }

    /// The globally most-preferred state, valid or not. `None` when empty.
    pub fn best(&self) -> Option<&Arc<BlockState<R>>> {
        self.by_fork_choice.iter().next().map(|key| &self.by_id[&key.id])
    }

    /// The most-preferred state among the invalid ones. `None` when every state is valid.
    pub fn best_invalid(&self) -> Option<&Arc<BlockState<R>>> {
        self.by_fork_choice
            .range(ForkChoiceKey::invalid_partition_start()..)
            .next()
            .map(|key| &self.by_id[&key.id])
    }

    /// Flip the validity flag of the state with the given id, re-keying its fork-choice entry.
    /// Returns `false` if the id is not indexed.
    pub fn set_validity(&mut self, id: &BlockId, valid: bool) -> bool {
        let state = match self.by_id.get(id) {
            Some(state) => state,
            None => return false,
        };
        if state.is_valid() == valid {
            return true;
        }
        let old_key = ForkChoiceKey::of(state);
        state.set_valid(valid);
        self.by_fork_choice.remove(&old_key);
        self.by_fork_choice.insert(old_key.with_validity(valid));
        true
    }

    /// Mark every indexed state invalid, rebuilding the fork-choice view.
    pub fn invalidate_all(&mut self) {
        self.by_fork_choice.clear();
        for state in self.by_id.values() {
            state.set_valid(false);
            self.by_fork_choice.insert(ForkChoiceKey::of(state));
        }
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_prev.clear();
        self.by_fork_choice.clear();
    }

    /// Every state, in snapshot emission order: ascending `(irreversible_blocknum, block_num)`
    /// with valid entries before invalid ones on ties. Produced by merging the two reversed
    /// fork-choice partitions, always draining the side whose current element is not preferred.
    ///
    /// Along any branch a parent is lower than its child in both components, so this order
    /// guarantees that every state's predecessor (when indexed) precedes it, which the snapshot
    /// load path depends on.
    pub fn snapshot_order(&self) -> Vec<Arc<BlockState<R>>> {
        let boundary = ForkChoiceKey::invalid_partition_start();
        let mut valid_iter = self.by_fork_choice.range(..boundary).rev().peekable();
        let mut invalid_iter = self.by_fork_choice.range(boundary..).rev().peekable();

        let mut ordered = Vec::with_capacity(self.by_id.len());
        loop {
            let key = match (valid_iter.peek(), invalid_iter.peek()) {
                (None, None) => break,
                (Some(_), None) => valid_iter.next(),
                (None, Some(_)) => invalid_iter.next(),
                (Some(valid), Some(invalid)) => {
                    if ForkChoiceKey::preferred(valid, invalid) {
                        invalid_iter.next()
                    } else {
                        valid_iter.next()
                    }
                }
            };
            // Unwrap is fine: the match above only falls through with an element peeked.
            ordered.push(self.by_id[&key.unwrap().id].clone());
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::basic::Timestamp;
    use crate::types::block::{Block, BlockHeader};
    use crate::types::state::{BlockHeaderState, DposIrreversibility};
    use std::collections::BTreeSet as FeatureSet;

    type State = BlockState<DposIrreversibility>;

    fn id(byte: u8) -> BlockId {
        BlockId::new([byte; 32])
    }

    fn state(id_byte: u8, prev_byte: u8, num: u32, irreversible: u32) -> Arc<State> {
        let header_state = BlockHeaderState {
            id: id(id_byte),
            header: BlockHeader {
                previous: id(prev_byte),
                timestamp: Timestamp::new(num as u64),
                extensions: Vec::new(),
            },
            block_num: BlockNum::new(num),
            irreversible_blocknum: BlockNum::new(irreversible),
            activated_features: FeatureSet::new(),
        };
        Arc::new(State::new(header_state, Block::default()).unwrap())
    }

    fn key(valid: bool, irreversible: u32, num: u32, id_byte: u8) -> ForkChoiceKey {
        ForkChoiceKey {
            valid,
            irreversible_blocknum: BlockNum::new(irreversible),
            block_num: BlockNum::new(num),
            id: id(id_byte),
        }
    }

    #[test]
    fn fork_choice_key_orders_valid_before_invalid() {
        assert!(key(true, 0, 0, 9) < key(false, 99, 99, 1));
    }

    #[test]
    fn fork_choice_key_orders_by_irreversibility_then_height() {
        assert!(key(true, 5, 1, 1) < key(true, 4, 9, 1));
        assert!(key(true, 5, 9, 1) < key(true, 5, 8, 1));
    }

    #[test]
    fn fork_choice_key_breaks_ties_by_ascending_id() {
        assert!(key(true, 5, 9, 1) < key(true, 5, 9, 2));
    }

    #[test]
    fn fork_choice_key_is_a_strict_total_order() {
        let keys = [
            key(true, 5, 9, 1),
            key(true, 5, 9, 2),
            key(true, 4, 9, 1),
            key(false, 5, 9, 1),
            key(false, 9, 9, 1),
        ];
        for a in &keys {
            assert_eq!(a.cmp(a), Ordering::Equal);
            for b in &keys {
                if a != b {
                    assert_ne!(a.cmp(b), Ordering::Equal);
                    assert_eq!(a.cmp(b), b.cmp(a).reverse());
                }
                for c in &keys {
                    if a < b && b < c {
                        assert!(a < c);
                    }
                }
            }
        }
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let mut index = ForkMultiIndex::new();
        assert!(index.insert(state(1, 0, 11, 10)));
        assert!(!index.insert(state(1, 0, 11, 10)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn children_scans_only_the_requested_parent() {
        let mut index = ForkMultiIndex::new();
        index.insert(state(1, 0, 11, 10));
        index.insert(state(2, 0, 11, 10));
        index.insert(state(3, 1, 12, 10));
        let children: Vec<_> = index.children(&id(0)).collect();
        assert_eq!(children, vec![id(1), id(2)]);
        let children: Vec<_> = index.children(&id(1)).collect();
        assert_eq!(children, vec![id(3)]);
        assert_eq!(index.children(&id(3)).count(), 0);
    }

    #[test]
    fn best_prefers_valid_over_higher_invalid() {
        let mut index = ForkMultiIndex::new();
        index.insert(state(1, 0, 11, 10));
        index.insert(state(2, 1, 12, 10));
        index.set_validity(&id(1), true);
        assert_eq!(index.best().unwrap().id(), id(1));
        assert_eq!(index.best_invalid().unwrap().id(), id(2));
    }

    #[test]
    fn set_validity_rekeys_the_fork_choice_entry() {
        let mut index = ForkMultiIndex::new();
        index.insert(state(1, 0, 11, 10));
        index.insert(state(2, 1, 12, 10));
        assert_eq!(index.best().unwrap().id(), id(2));
        index.set_validity(&id(1), true);
        assert_eq!(index.best().unwrap().id(), id(1));
        index.set_validity(&id(2), true);
        assert_eq!(index.best().unwrap().id(), id(2));
        assert!(index.best_invalid().is_none());
    }

    #[test]
    fn snapshot_order_puts_parents_before_children() {
        let mut index = ForkMultiIndex::new();
        index.insert(state(1, 0, 11, 10));
        index.insert(state(2, 1, 12, 10));
        index.insert(state(3, 2, 13, 10));
        index.insert(state(4, 1, 12, 10));
        index.set_validity(&id(1), true);
        index.set_validity(&id(2), true);
        index.set_validity(&id(3), true);

        let ordered = index.snapshot_order();
        assert_eq!(ordered.len(), 4);
        for (pos, state) in ordered.iter().enumerate() {
            let parent_pos = ordered.iter().position(|s| s.id() == state.previous());
            if let Some(parent_pos) = parent_pos {
                assert!(parent_pos < pos, "parent of {:?} emitted after it", state.id());
            }
        }
    }
}
