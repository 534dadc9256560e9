/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes and small integers, and do not have any major "active"
//! behavior.

use std::fmt::{self, Debug, Display, Formatter};
use std::ops::Add;

use borsh::{BorshDeserialize, BorshSerialize};

/// 256-bit content hash identifying a block.
///
/// # Ordering
///
/// `Ord` compares the big-endian byte string lexicographically. This is the fixed total order
/// used to break ties deterministically in the fork-choice comparator, so it must be identical
/// on every node.
///
/// # Embedded block number
///
/// The first four bytes of an id carry the block number in big-endian, so the number of a block
/// can be recovered from its id alone.
/// [`BlockHeaderState::compute_id`](crate::types::state::BlockHeaderState::compute_id) folds the
/// number in when it hashes a header.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct BlockId([u8; 32]);

impl BlockId {
    /// The all-zeroes id. Used as the `previous` link of a chain's first retained block.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a new `BlockId` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `BlockId`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Block number embedded in the first four bytes of the id.
    pub fn block_num(&self) -> BlockNum {
        BlockNum::new(u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]))
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockId({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// 32-byte digest of a protocol feature.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Create a new `Digest` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `Digest`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Height of a block. Increases by exactly 1 along every parent-to-child link.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct BlockNum(u32);

impl BlockNum {
    /// The saturation value. The instant-finality flavor reports this as the irreversible block
    /// number of every block, which degenerates fork choice to plain height ordering.
    pub const MAX: Self = Self(u32::MAX);

    /// Create a new `BlockNum` with an `int` inner value.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the inner `u32` value of this `BlockNum`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for BlockNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u32> for BlockNum {
    type Output = BlockNum;
    fn add(self, rhs: u32) -> Self::Output {
        BlockNum::new(self.0 + rhs)
    }
}

/// Timestamp of a block, an opaque slot value that increases toward tips.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new `Timestamp` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Timestamp`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
