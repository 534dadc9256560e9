/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Shared builders for the fork database integration tests.
//!
//! Tests construct block states with explicit ids instead of hashed ones, so that tie-break
//! order (ascending id) is under direct control.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use borsh::BorshSerialize;
use fork_db::{
    Block, BlockHeader, BlockHeaderState, BlockId, BlockNum, BlockState, Digest,
    IrreversibilityRule, ProtocolFeatureActivation, Timestamp,
};

/// An id whose 32 bytes are all `byte`.
pub fn id(byte: u8) -> BlockId {
    BlockId::new([byte; 32])
}

/// A feature digest whose 32 bytes are all `byte`.
pub fn digest(byte: u8) -> Digest {
    Digest::new([byte; 32])
}

/// A header state with an explicit id.
pub fn header_state(
    id: BlockId,
    previous: BlockId,
    num: u32,
    irreversible: u32,
) -> BlockHeaderState {
    BlockHeaderState {
        id,
        header: BlockHeader {
            previous,
            timestamp: Timestamp::new(num as u64),
            extensions: Vec::new(),
        },
        block_num: BlockNum::new(num),
        irreversible_blocknum: BlockNum::new(irreversible),
        activated_features: BTreeSet::new(),
    }
}

/// A block state with an explicit id and no header extensions.
pub fn make_state<R: IrreversibilityRule>(
    id: BlockId,
    previous: BlockId,
    num: u32,
    irreversible: u32,
) -> Arc<BlockState<R>> {
    let header_state = header_state(id, previous, num, irreversible);
    let block = Block {
        header: header_state.header.clone(),
        payload: vec![num as u8],
    };
    Arc::new(BlockState::new(header_state, block).unwrap())
}

/// A block state whose header carries a protocol-feature-activation extension for `features`.
pub fn make_state_with_activation<R: IrreversibilityRule>(
    id: BlockId,
    previous: BlockId,
    num: u32,
    irreversible: u32,
    features: Vec<Digest>,
) -> Arc<BlockState<R>> {
    let activation = ProtocolFeatureActivation {
        protocol_features: features,
    };
    let mut header_state = header_state(id, previous, num, irreversible);
    header_state.header.extensions.push((
        ProtocolFeatureActivation::extension_id(),
        activation.try_to_vec().unwrap(),
    ));
    let block = Block {
        header: header_state.header.clone(),
        payload: vec![num as u8],
    };
    Arc::new(BlockState::new(header_state, block).unwrap())
}

/// A validator that accepts every feature activation.
pub fn accept_all() -> impl FnMut(
    Timestamp,
    &BTreeSet<Digest>,
    &[Digest],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    |_, _, _| Ok(())
}

/// A fresh directory under the system temp dir, unique per test tag and process.
pub fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fork_db_test_{}_{}", tag, std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
