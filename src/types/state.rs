/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Block-header states, block states, and the two irreversibility flavors of the fork database.
//!
//! A [`BlockHeaderState`] is the header-derived part of a block's state: its id, height, the
//! height of its last irreversible ancestor, and the set of protocol features activated on its
//! branch. A [`BlockState`] augments that with the full block and a validity flag, and is the
//! unit the fork database indexes.
//!
//! The two flavors share one layout and differ only in the irreversibility *measure* the
//! fork-choice comparator sees, so the flavor is a zero-sized type parameter implementing
//! [`IrreversibilityRule`] rather than a second struct.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest as Sha2Digest, Sha256};

use crate::types::basic::{BlockId, BlockNum, Digest, Timestamp};
use crate::types::block::{Block, BlockHeader, ExtensionError, HeaderExtensions};

/// The header-derived state of a block.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BlockHeaderState {
    /// Id of the block. Carries `block_num` in its first four bytes; see
    /// [`compute_id`](Self::compute_id).
    pub id: BlockId,

    /// The header itself.
    pub header: BlockHeader,

    /// Height of the block. `block_num` of a child is always `block_num` of its parent plus 1.
    pub block_num: BlockNum,

    /// Height of the last irreversible ancestor, as measured by the DPoS rule. The
    /// instant-finality flavor ignores this field and saturates instead.
    pub irreversible_blocknum: BlockNum,

    /// Every protocol feature activated on this block's branch, up to and including this block.
    pub activated_features: BTreeSet<Digest>,
}

impl BlockHeaderState {
    /// Compute the id of a header at the given height: Sha256 over the borsh-serialized header,
    /// with the first four bytes of the digest replaced by the big-endian block number so the
    /// height is recoverable from the id.
    pub fn compute_id(header: &BlockHeader, block_num: BlockNum) -> BlockId {
        let mut hasher = Sha256::new();
        hasher.update(
            header
                .try_to_vec()
                .expect("serializing a header into a Vec cannot fail"),
        );
        let mut bytes: [u8; 32] = hasher.finalize().into();
        bytes[0..4].copy_from_slice(&block_num.int().to_be_bytes());
        BlockId::new(bytes)
    }

    /// Id of the parent block.
    pub fn previous(&self) -> BlockId {
        self.header.previous
    }

    /// Slot timestamp of the block.
    pub fn timestamp(&self) -> Timestamp {
        self.header.timestamp
    }
}

/// Selects the irreversibility measure a fork database flavor feeds into its fork-choice
/// comparator, and the magic totem that identifies the flavor's snapshots on disk.
///
/// Implemented by the two zero-sized markers [`DposIrreversibility`] and [`InstantFinality`].
pub trait IrreversibilityRule: Send + Sync + 'static {
    /// Magic totem written at the head of this flavor's snapshot files.
    const MAGIC: u32;

    /// The irreversible block number the fork-choice comparator sees for `state`.
    fn irreversible_blocknum(state: &BlockHeaderState) -> BlockNum;
}

/// The legacy flavor: irreversibility advances block by block under the DPoS rule, and the
/// fork-choice comparator prefers the branch whose last irreversible ancestor is furthest
/// forward.
#[derive(Debug)]
pub enum DposIrreversibility {}

impl IrreversibilityRule for DposIrreversibility {
    const MAGIC: u32 = 0x30510FCF;

    fn irreversible_blocknum(state: &BlockHeaderState) -> BlockNum {
        state.irreversible_blocknum
    }
}

/// The next-generation flavor: every block reports the saturated irreversible block number, so
/// the comparator degenerates to height ordering. Natural for a finality regime where any
/// finalized block is globally preferred regardless of height difference below finality.
#[derive(Debug)]
pub enum InstantFinality {}

impl IrreversibilityRule for InstantFinality {
    const MAGIC: u32 = 0x4242FDFD;

    fn irreversible_blocknum(_state: &BlockHeaderState) -> BlockNum {
        BlockNum::MAX
    }
}

/// A block state: a [`BlockHeaderState`] augmented with the full block, the parsed header
/// extensions, and a validity flag.
///
/// Handles to block states are shared (`Arc`) between the index and any caller that looked one
/// up, and a state outlives its removal from the index while a holder retains it. The validity
/// flag is the one mutable part; it is only ever written through the fork database, which has to
/// re-key its fork-choice index on every flip. Holders outside the lock read a point-in-time
/// value.
#[derive(Debug)]
pub struct BlockState<R: IrreversibilityRule> {
    header_state: BlockHeaderState,
    block: Block,
    header_exts: HeaderExtensions,
    validated: AtomicBool,
    _rule: PhantomData<R>,
}

impl<R: IrreversibilityRule> BlockState<R> {
    /// Create a block state from its header state and block, reconstructing the parsed header
    /// extensions from the raw block. The state starts out not valid.
    pub fn new(header_state: BlockHeaderState, block: Block) -> Result<Self, ExtensionError> {
        let header_exts = block.extract_header_extensions()?;
        Ok(Self {
            header_state,
            block,
            header_exts,
            validated: AtomicBool::new(false),
            _rule: PhantomData,
        })
    }

    /// Create a block state carrying only a header state. Used for the root of the tree, which
    /// only its header-state portion is ever read from.
    pub(crate) fn from_header_state(header_state: BlockHeaderState) -> Self {
        Self {
            header_state,
            block: Block::default(),
            header_exts: HeaderExtensions::default(),
            validated: AtomicBool::new(false),
            _rule: PhantomData,
        }
    }

    /// Rebuild this state under another flavor, preserving the validity flag. Used by the
    /// one-way legacy transition.
    pub(crate) fn to_flavor<R2: IrreversibilityRule>(&self) -> BlockState<R2> {
        BlockState {
            header_state: self.header_state.clone(),
            block: self.block.clone(),
            header_exts: self.header_exts.clone(),
            validated: AtomicBool::new(self.is_valid()),
            _rule: PhantomData,
        }
    }

    /// Id of the block.
    pub fn id(&self) -> BlockId {
        self.header_state.id
    }

    /// Id of the parent block.
    pub fn previous(&self) -> BlockId {
        self.header_state.previous()
    }

    /// Height of the block.
    pub fn block_num(&self) -> BlockNum {
        self.header_state.block_num
    }

    /// Slot timestamp of the block.
    pub fn timestamp(&self) -> Timestamp {
        self.header_state.timestamp()
    }

    /// The irreversible block number under this state's flavor.
    pub fn irreversible_blocknum(&self) -> BlockNum {
        R::irreversible_blocknum(&self.header_state)
    }

    /// Whether the block has been fully validated.
    pub fn is_valid(&self) -> bool {
        self.validated.load(Ordering::Acquire)
    }

    /// Flip the validity flag. Only the fork database may call this, because the flag is a key
    /// component of the fork-choice index.
    pub(crate) fn set_valid(&self, valid: bool) {
        self.validated.store(valid, Ordering::Release)
    }

    /// The header-derived state.
    pub fn header_state(&self) -> &BlockHeaderState {
        &self.header_state
    }

    /// The full block.
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// The parsed header extensions.
    pub fn header_exts(&self) -> &HeaderExtensions {
        &self.header_exts
    }

    /// Every protocol feature activated on this block's branch.
    pub fn activated_features(&self) -> &BTreeSet<Digest> {
        &self.header_state.activated_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_id_embeds_the_block_number() {
        let header = BlockHeader::default();
        let id = BlockHeaderState::compute_id(&header, BlockNum::new(0x0102_0304));
        assert_eq!(&id.bytes()[0..4], &[1, 2, 3, 4]);
        assert_eq!(id.block_num(), BlockNum::new(0x0102_0304));
        assert_eq!(id, BlockHeaderState::compute_id(&header, BlockNum::new(0x0102_0304)));
    }

    #[test]
    fn compute_id_depends_on_the_header_contents() {
        let base = BlockHeader::default();
        let mut shifted = BlockHeader::default();
        shifted.timestamp = Timestamp::new(1);
        assert_ne!(
            BlockHeaderState::compute_id(&base, BlockNum::new(5)),
            BlockHeaderState::compute_id(&shifted, BlockNum::new(5))
        );
    }

    #[test]
    fn flavor_conversion_preserves_identity_and_validity() {
        let header_state = BlockHeaderState {
            id: BlockHeaderState::compute_id(&BlockHeader::default(), BlockNum::new(7)),
            header: BlockHeader::default(),
            block_num: BlockNum::new(7),
            irreversible_blocknum: BlockNum::new(3),
            activated_features: BTreeSet::new(),
        };
        let legacy: BlockState<DposIrreversibility> =
            BlockState::new(header_state, Block::default()).unwrap();
        legacy.set_valid(true);

        let finality: BlockState<InstantFinality> = legacy.to_flavor();
        assert_eq!(finality.id(), legacy.id());
        assert!(finality.is_valid());
        assert_eq!(legacy.irreversible_blocknum(), BlockNum::new(3));
        assert_eq!(finality.irreversible_blocknum(), BlockNum::MAX);
    }
}
