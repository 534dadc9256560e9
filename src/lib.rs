/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A multi-indexed, thread-safe fork database.
//!
//! The fork database is the part of a blockchain node that tracks every candidate chain
//! extending a committed root block, selects the canonical head under a fork-choice rule,
//! advances irreversibility by pruning, and computes the common-ancestor branch pair two tips
//! hang off, which is the structure a chain controller consults when it switches forks. It
//! survives restarts through a versioned binary snapshot written on shutdown and consumed (then
//! deleted) on startup.
//!
//! # Pieces
//!
//! - [`types`]: block ids, headers, header extensions, and the [`BlockState`] the database
//!   indexes, generic over the two [irreversibility flavors](types::state::IrreversibilityRule).
//! - [`fork_db`]: the single-flavor instance, one coarse mutex around a container indexed
//!   simultaneously by id, by parent id, and by fork-choice preference.
//! - [`database`]: the facade owning one instance per flavor, auto-selecting on open by the
//!   snapshot's magic totem and offering the one-way legacy-to-finality switch.
//!
//! # What it is not
//!
//! The block validator is a host-supplied callback; block payloads are opaque bytes; there is no
//! networking, no replay from block logs, and no persistence beyond the snapshot file.

pub mod types;

pub(crate) mod index;

pub(crate) mod codec;

pub(crate) mod logging;

pub mod fork_db;

pub mod database;

// Re-exports
pub use codec::{MAX_SUPPORTED_VERSION, MIN_SUPPORTED_VERSION};
pub use database::{ForkDatabase, FORK_DB_FILENAME};
pub use fork_db::{
    Branch, BranchPair, DposForkDb, FeatureValidator, FinalityForkDb, ForkDb, ForkDbError,
};
pub use types::basic::{BlockId, BlockNum, Digest, Timestamp};
pub use types::block::{
    Block, BlockHeader, ExtensionError, HeaderExtensions, ProtocolFeatureActivation,
    PROTOCOL_FEATURE_ACTIVATION_EXTENSION_ID,
};
pub use types::state::{
    BlockHeaderState, BlockState, DposIrreversibility, InstantFinality, IrreversibilityRule,
};
