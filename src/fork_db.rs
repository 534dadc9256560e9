/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The fork database instance: an in-memory tree of every candidate chain extending a committed
//! root block, with canonical head selection, irreversibility advancement, branch queries, and a
//! durable snapshot.
//!
//! # Shape
//!
//! A [`ForkDb`] holds three things under one coarse mutex: the [multi-index](crate::index) over
//! all block states strictly descending from the root, the `root` handle itself (never in the
//! index, always valid), and the `head` handle, the most-preferred valid tip. Every public
//! operation locks, completes, and unlocks before returning; returned handles are `Arc`s that
//! remain usable after the lock is released, and even after their state leaves the index.
//!
//! # Head invariant
//!
//! Outside a locked critical section, `head` is either the root or a valid indexed state that no
//! valid state is strictly preferred to. [`add`](ForkDb::add) and [`mark_valid`](ForkDb::mark_valid)
//! re-evaluate the head; [`remove`](ForkDb::remove) refuses to remove it.
//!
//! # Flavors
//!
//! `ForkDb` is generic over an [`IrreversibilityRule`]. [`DposForkDb`] orders forks by the DPoS
//! last-irreversible height; [`FinalityForkDb`] saturates that measure so ordering degenerates
//! to block height. The [`database`](crate::database) facade owns one of each and dispatches.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::codec::{self, MAX_SUPPORTED_VERSION, MIN_SUPPORTED_VERSION};
use crate::index::{prefer, ForkMultiIndex};
use crate::logging::short_id;
use crate::types::basic::{BlockId, BlockNum, Digest, Timestamp};
use crate::types::block::ExtensionError;
use crate::types::state::{
    BlockHeaderState, BlockState, DposIrreversibility, InstantFinality, IrreversibilityRule,
};

/// Callback that vets a protocol-feature transition when a block carrying a feature-activation
/// extension is (re)added during snapshot load. Receives the block's timestamp, the feature set
/// already activated on the parent's branch, and the digests the block activates.
pub type FeatureValidator<'a> = dyn FnMut(Timestamp, &BTreeSet<Digest>, &[Digest]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    + 'a;

/// An ordered sequence of block states from a tip toward (and excluding) a common ancestor,
/// head first.
pub type Branch<R> = Vec<Arc<BlockState<R>>>;

/// The two branches computed by [`ForkDb::fetch_branch_from`].
pub type BranchPair<R> = (Branch<R>, Branch<R>);

/// The legacy-flavor fork database.
pub type DposForkDb = ForkDb<DposIrreversibility>;

/// The next-generation-flavor fork database.
pub type FinalityForkDb = ForkDb<InstantFinality>;

/// Errors surfaced by the fork database.
///
/// Hosts distinguish the recoverable kinds by variant: [`UnlinkableBlock`](Self::UnlinkableBlock)
/// can be retried once the parent is obtained, [`DuplicateBlock`](Self::DuplicateBlock) is benign
/// when duplicates are expected, and [`BlockNotFound`](Self::BlockNotFound) on a branch query
/// means a bad argument rather than internal corruption. Everything else is corruption or an
/// invariant violation and is fatal to the caller.
#[derive(Debug)]
pub enum ForkDbError {
    /// An operation that requires a root ran before `reset` or `open` installed one.
    RootNotSet,
    /// The block's `previous` id resolves to neither the root nor an indexed state.
    UnlinkableBlock { id: BlockId, previous: BlockId },
    /// A state with this id is already indexed and `ignore_duplicate` was not set.
    DuplicateBlock { id: BlockId },
    /// The operation's target id is not in the index.
    BlockNotInIndex { id: BlockId },
    /// `advance_root` targeted a block that has not been validated.
    NotValidated { id: BlockId },
    /// Removing this id would remove the current head; the caller must move the head first.
    WouldRemoveHead { id: BlockId },
    /// An ancestry walk met a `previous` id that is neither indexed nor the root: an orphaned
    /// branch is present in the tree.
    OrphanedBranch { id: BlockId },
    /// The snapshot's magic totem matches none of the accepted values.
    InvalidMagic { actual: u32, expected: Vec<u32> },
    /// The snapshot's version is outside the supported range.
    UnsupportedVersion { version: u32 },
    /// The snapshot's head id resolves to nothing.
    HeadNotFound { id: BlockId },
    /// A restored state is strictly preferred to the restored head.
    HeadNotBest { head: BlockId, best: BlockId },
    /// The snapshot has no preferable candidate, yet its head is not its root.
    HeadNotRoot { head: BlockId },
    /// The validator rejected a protocol-feature activation carried by a restored block.
    InvalidFeatureActivation { source: Box<dyn std::error::Error + Send + Sync> },
    /// A restored block's header extensions failed to parse.
    Extension(ExtensionError),
    /// The snapshot's bytes could not be decoded.
    Corrupt(io::Error),
    /// Reading, writing, or removing the snapshot file failed.
    Io(io::Error),
    /// The id on a branch query resolves to nothing.
    BlockNotFound { id: BlockId },
}

impl Display for ForkDbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ForkDbError::RootNotSet => write!(f, "root not yet set"),
            ForkDbError::UnlinkableBlock { id, previous } => {
                write!(f, "unlinkable block {}: previous {} not found", id, previous)
            }
            ForkDbError::DuplicateBlock { id } => write!(f, "duplicate block {} added", id),
            ForkDbError::BlockNotInIndex { id } => {
                write!(f, "block {} is not in the fork database", id)
            }
            ForkDbError::NotValidated { id } => {
                write!(f, "cannot advance root to block {}: it has not been validated", id)
            }
            ForkDbError::WouldRemoveHead { id } => write!(
                f,
                "removing block {} and its descendants would remove the current head",
                id
            ),
            ForkDbError::OrphanedBranch { id } => write!(
                f,
                "invariant violation: orphaned branch at {} was present in the fork database",
                id
            ),
            ForkDbError::InvalidMagic { actual, expected } => {
                write!(f, "unexpected magic number {:#010x}, expected one of", actual)?;
                for totem in expected {
                    write!(f, " {:#010x}", totem)?;
                }
                Ok(())
            }
            ForkDbError::UnsupportedVersion { version } => write!(
                f,
                "unsupported snapshot version {}, supported versions are [{}, {}]",
                version, MIN_SUPPORTED_VERSION, MAX_SUPPORTED_VERSION
            ),
            ForkDbError::HeadNotFound { id } => write!(
                f,
                "could not find head {} while reconstructing the fork database; the snapshot is likely corrupted",
                id
            ),
            ForkDbError::HeadNotBest { head, best } => write!(
                f,
                "head {} not set to best available option {}; the snapshot is likely corrupted",
                head, best
            ),
            ForkDbError::HeadNotRoot { head } => write!(
                f,
                "head {} not set to root despite no better option available; the snapshot is likely corrupted",
                head
            ),
            ForkDbError::InvalidFeatureActivation { source } => write!(
                f,
                "serialized fork database is incompatible with configured protocol features: {}",
                source
            ),
            ForkDbError::Extension(source) => {
                write!(f, "restored block carries bad header extensions: {}", source)
            }
            ForkDbError::Corrupt(source) => write!(f, "snapshot is corrupted: {}", source),
            ForkDbError::Io(source) => write!(f, "snapshot file i/o failed: {}", source),
            ForkDbError::BlockNotFound { id } => write!(f, "block {} does not exist", id),
        }
    }
}

impl std::error::Error for ForkDbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ForkDbError::InvalidFeatureActivation { source } => Some(source.as_ref()),
            ForkDbError::Extension(source) => Some(source),
            ForkDbError::Corrupt(source) | ForkDbError::Io(source) => Some(source),
            _ => None,
        }
    }
}

impl From<ExtensionError> for ForkDbError {
    fn from(source: ExtensionError) -> Self {
        ForkDbError::Extension(source)
    }
}

/// A single-flavor fork database instance. See the [module documentation](self).
pub struct ForkDb<R: IrreversibilityRule> {
    inner: Mutex<ForkDbInner<R>>,
}

struct ForkDbInner<R: IrreversibilityRule> {
    index: ForkMultiIndex<R>,
    root: Option<Arc<BlockState<R>>>,
    head: Option<Arc<BlockState<R>>>,
}

impl<R: IrreversibilityRule> Default for ForkDb<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: IrreversibilityRule> ForkDb<R> {
    /// Create an empty instance with neither root nor head. `reset` or `open` installs a root.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ForkDbInner {
                index: ForkMultiIndex::new(),
                root: None,
                head: None,
            }),
        }
    }

    /// The magic totem identifying this instance's flavor on disk.
    pub fn magic_number(&self) -> u32 {
        R::MAGIC
    }

    // A poisoned lock means a panic mid-operation already broke the process; keep going with
    // whatever state is there rather than poisoning every later call.
    fn locked(&self) -> MutexGuard<'_, ForkDbInner<R>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Restore the instance from the snapshot file at `path`, then delete the file so a crash
    /// before the next `close` cannot double-load it. An absent file leaves the instance empty
    /// and is not an error.
    ///
    /// Restored blocks that carry a feature-activation extension are re-vetted through
    /// `validator`; a rejection surfaces as
    /// [`InvalidFeatureActivation`](ForkDbError::InvalidFeatureActivation) and leaves the file
    /// intact for forensics.
    pub fn open(&self, path: &Path, validator: &mut FeatureValidator<'_>) -> Result<(), ForkDbError> {
        self.locked().open_impl(path, validator)
    }

    /// Serialize the instance to the snapshot file at `path` and clear the index.
    ///
    /// With an unset root and a non-empty index the instance is in a bad state; nothing is
    /// written and the condition is only logged.
    pub fn close(&self, path: &Path) -> Result<(), ForkDbError> {
        self.locked().close_impl(path)
    }

    /// Clear the index and install a new root (always valid); head becomes the root.
    pub fn reset(&self, root_header_state: BlockHeaderState) {
        self.locked().reset_impl(root_header_state)
    }

    /// Mark every indexed state invalid and move head back to the root. The tree is preserved;
    /// nothing is preferred to the root until blocks are re-validated.
    pub fn rollback_head_to_root(&self) {
        let mut inner = self.locked();
        inner.index.invalidate_all();
        inner.head = inner.root.clone();
    }

    /// Insert a block state whose parent is the root or an indexed state.
    ///
    /// A duplicate id is ignored when `ignore_duplicate` is set and is
    /// [`DuplicateBlock`](ForkDbError::DuplicateBlock) otherwise. After insertion the head is
    /// re-evaluated: if the fork-choice best is valid it becomes the head.
    pub fn add(&self, state: Arc<BlockState<R>>, ignore_duplicate: bool) -> Result<(), ForkDbError> {
        self.locked().add_impl(state, ignore_duplicate, false, &mut |_, _, _| Ok(()))
    }

    /// Flip an indexed state to valid and adopt it as head if it is now preferred.
    ///
    /// No-op when the state is already valid; [`BlockNotInIndex`](ForkDbError::BlockNotInIndex)
    /// when it is not indexed.
    pub fn mark_valid(&self, state: &Arc<BlockState<R>>) -> Result<(), ForkDbError> {
        self.locked().mark_valid_impl(state)
    }

    /// Promote an indexed, validated block to root: everything strictly older and every branch
    /// not passing through it is discarded; blocks branching off the new root remain.
    pub fn advance_root(&self, id: &BlockId) -> Result<(), ForkDbError> {
        self.locked().advance_root_impl(id)
    }

    /// Remove a block and its entire descendant subtree from the index. Fails without mutation
    /// if the subtree contains the current head.
    pub fn remove(&self, id: &BlockId) -> Result<(), ForkDbError> {
        self.locked().remove_impl(id)
    }

    /// The oldest retained block. `None` until `reset` or `open`.
    pub fn root(&self) -> Option<Arc<BlockState<R>>> {
        self.locked().root.clone()
    }

    /// The currently preferred valid tip. `None` until `reset` or `open`.
    pub fn head(&self) -> Option<Arc<BlockState<R>>> {
        self.locked().head.clone()
    }

    /// The best candidate tip, validated or not: the best valid state if it beats the head,
    /// else the best invalid state if it beats the head, else the head itself. Surfaces
    /// candidate tips before their validation completes.
    pub fn pending_head(&self) -> Option<Arc<BlockState<R>>> {
        let inner = self.locked();
        let head = inner.head.clone()?;
        if let Some(best) = inner.index.best() {
            if best.is_valid() && prefer(best, &head) {
                return Some(best.clone());
            }
        }
        if let Some(candidate) = inner.index.best_invalid() {
            if prefer(candidate, &head) {
                return Some(candidate.clone());
            }
        }
        Some(head)
    }

    /// Look up a block state by id. The root is returned for its own id; a missing id is `None`.
    pub fn get_block(&self, id: &BlockId) -> Option<Arc<BlockState<R>>> {
        let inner = self.locked();
        inner.resolve(id).cloned()
    }

    /// Look up the header-derived state of a block by id. The root is returned for its own id.
    pub fn get_block_header(&self, id: &BlockId) -> Option<BlockHeaderState> {
        let inner = self.locked();
        inner.resolve(id).map(|state| state.header_state().clone())
    }

    /// The branch from `h` toward the root (root excluded), head first, keeping only states with
    /// `block_num <= trim_after_block_num`. Pass [`BlockNum::MAX`] for the whole branch.
    pub fn fetch_branch(&self, h: &BlockId, trim_after_block_num: BlockNum) -> Branch<R> {
        let inner = self.locked();
        let mut branch = Vec::new();
        let mut cursor = inner.index.get(h).cloned();
        while let Some(state) = cursor {
            if state.block_num() <= trim_after_block_num {
                branch.push(state.clone());
            }
            cursor = inner.index.get(&state.previous()).cloned();
        }
        branch
    }

    /// Walk from `h` toward the root and return the state at exactly `block_num`, if any.
    pub fn search_on_branch(&self, h: &BlockId, block_num: BlockNum) -> Option<Arc<BlockState<R>>> {
        let inner = self.locked();
        let mut cursor = inner.index.get(h).cloned();
        while let Some(state) = cursor {
            if state.block_num() == block_num {
                return Some(state);
            }
            cursor = inner.index.get(&state.previous()).cloned();
        }
        None
    }

    /// Given two tips, return the two branches of the fork graph that end with a common
    /// ancestor: the last state of each branch shares its `previous` with the other's. Equal
    /// inputs yield two empty branches. The root id is accepted for either input.
    pub fn fetch_branch_from(
        &self,
        first: &BlockId,
        second: &BlockId,
    ) -> Result<BranchPair<R>, ForkDbError> {
        self.locked().fetch_branch_from_impl(first, second)
    }
}

impl<R: IrreversibilityRule> ForkDbInner<R> {
    /// Root-inclusive lookup: used by the public getters and for resolving parents on `add`.
    fn resolve(&self, id: &BlockId) -> Option<&Arc<BlockState<R>>> {
        if let Some(root) = &self.root {
            if root.id() == *id {
                return Some(root);
            }
        }
        self.index.get(id)
    }

    fn reset_impl(&mut self, root_header_state: BlockHeaderState) {
        self.index.clear();
        let root = Arc::new(BlockState::from_header_state(root_header_state));
        root.set_valid(true);
        self.head = Some(root.clone());
        self.root = Some(root);
    }

    fn add_impl(
        &mut self,
        state: Arc<BlockState<R>>,
        ignore_duplicate: bool,
        validate: bool,
        validator: &mut FeatureValidator<'_>,
    ) -> Result<(), ForkDbError> {
        if self.root.is_none() {
            return Err(ForkDbError::RootNotSet);
        }
        let id = state.id();
        let previous = state.previous();

        let parent = self
            .resolve(&previous)
            .ok_or(ForkDbError::UnlinkableBlock { id, previous })?;

        if validate {
            if let Some(activation) = state.header_exts().feature_activation() {
                validator(
                    state.timestamp(),
                    parent.activated_features(),
                    &activation.protocol_features,
                )
                .map_err(|source| ForkDbError::InvalidFeatureActivation { source })?;
            }
        }

        if !self.index.insert(state) {
            if ignore_duplicate {
                return Ok(());
            }
            return Err(ForkDbError::DuplicateBlock { id });
        }

        let new_head = match self.index.best() {
            Some(best) if best.is_valid() => Some(best.clone()),
            _ => None,
        };
        if new_head.is_some() {
            self.head = new_head;
        }
        Ok(())
    }

    fn mark_valid_impl(&mut self, state: &Arc<BlockState<R>>) -> Result<(), ForkDbError> {
        if state.is_valid() {
            return Ok(());
        }
        let id = state.id();
        if !self.index.set_validity(&id, true) {
            return Err(ForkDbError::BlockNotInIndex { id });
        }
        let new_head = match (self.index.best(), self.head.as_ref()) {
            (Some(best), Some(head)) if prefer(best, head) => Some(best.clone()),
            _ => None,
        };
        if new_head.is_some() {
            self.head = new_head;
        }
        Ok(())
    }

    fn advance_root_impl(&mut self, id: &BlockId) -> Result<(), ForkDbError> {
        let root = self.root.clone().ok_or(ForkDbError::RootNotSet)?;
        let new_root = self
            .index
            .get(id)
            .cloned()
            .ok_or(ForkDbError::BlockNotInIndex { id: *id })?;
        if !new_root.is_valid() {
            return Err(ForkDbError::NotValidated { id: *id });
        }

        // Collect the path from the new root up to (and including) the current root's id. A
        // link that resolves to neither is an orphaned branch.
        let mut blocks_to_remove = Vec::new();
        let mut cursor = new_root.clone();
        loop {
            let previous = cursor.previous();
            blocks_to_remove.push(previous);
            match self.index.get(&previous) {
                Some(state) => cursor = state.clone(),
                None if previous == root.id() => break,
                None => return Err(ForkDbError::OrphanedBranch { id: previous }),
            }
        }

        // The new root is erased from the index individually rather than with remove_impl,
        // because the blocks branching off of it must stay in the fork database.
        self.index.erase(id);

        // The path blocks are removed with remove_impl so their sibling subtrees (orphaned
        // branches not passing through the new root) go with them.
        for block_id in &blocks_to_remove {
            self.remove_impl(block_id)?;
        }

        // The state object itself is left untouched; other parts of the host may be reading
        // its block asynchronously.
        self.root = Some(new_root);
        Ok(())
    }

    fn remove_impl(&mut self, id: &BlockId) -> Result<(), ForkDbError> {
        let head_id = self.head.as_ref().map(|head| head.id());

        // Breadth-first closure over by_prev. The head check covers the starting id too, and
        // runs before any erasure so a refusal leaves the index untouched.
        let mut remove_queue = vec![*id];
        let mut at = 0;
        while at < remove_queue.len() {
            if Some(remove_queue[at]) == head_id {
                return Err(ForkDbError::WouldRemoveHead { id: remove_queue[at] });
            }
            let children: Vec<BlockId> = self.index.children(&remove_queue[at]).collect();
            remove_queue.extend(children);
            at += 1;
        }

        for block_id in &remove_queue {
            self.index.erase(block_id);
        }
        Ok(())
    }

    fn fetch_branch_from_impl(
        &self,
        first: &BlockId,
        second: &BlockId,
    ) -> Result<BranchPair<R>, ForkDbError> {
        let mut first_cursor = self
            .resolve(first)
            .cloned()
            .ok_or(ForkDbError::BlockNotFound { id: *first })?;
        let mut second_cursor = self
            .resolve(second)
            .cloned()
            .ok_or(ForkDbError::BlockNotFound { id: *second })?;
        let mut result: BranchPair<R> = (Vec::new(), Vec::new());

        // Walk the higher side down until the heights match.
        while first_cursor.block_num() > second_cursor.block_num() {
            result.0.push(first_cursor.clone());
            let previous = first_cursor.previous();
            first_cursor = self
                .resolve(&previous)
                .cloned()
                .ok_or(ForkDbError::BlockNotFound { id: previous })?;
        }
        while second_cursor.block_num() > first_cursor.block_num() {
            result.1.push(second_cursor.clone());
            let previous = second_cursor.previous();
            second_cursor = self
                .resolve(&previous)
                .cloned()
                .ok_or(ForkDbError::BlockNotFound { id: previous })?;
        }

        if first_cursor.id() == second_cursor.id() {
            return Ok(result);
        }

        // Lockstep until both sides point at the same parent, then append both: they share it.
        while first_cursor.previous() != second_cursor.previous() {
            result.0.push(first_cursor.clone());
            result.1.push(second_cursor.clone());
            let first_previous = first_cursor.previous();
            let second_previous = second_cursor.previous();
            first_cursor = self
                .index
                .get(&first_previous)
                .cloned()
                .ok_or(ForkDbError::BlockNotFound { id: first_previous })?;
            second_cursor = self
                .index
                .get(&second_previous)
                .cloned()
                .ok_or(ForkDbError::BlockNotFound { id: second_previous })?;
        }
        result.0.push(first_cursor);
        result.1.push(second_cursor);
        Ok(result)
    }

    fn open_impl(
        &mut self,
        path: &Path,
        validator: &mut FeatureValidator<'_>,
    ) -> Result<(), ForkDbError> {
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read(path).map_err(ForkDbError::Io)?;
        let mut cursor = content.as_slice();

        let totem = codec::read_u32(&mut cursor).map_err(ForkDbError::Corrupt)?;
        if totem != R::MAGIC {
            return Err(ForkDbError::InvalidMagic {
                actual: totem,
                expected: vec![R::MAGIC],
            });
        }
        let version = codec::read_u32(&mut cursor).map_err(ForkDbError::Corrupt)?;
        if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version) {
            return Err(ForkDbError::UnsupportedVersion { version });
        }

        let root_header_state: BlockHeaderState =
            codec::read_borsh(&mut cursor).map_err(ForkDbError::Corrupt)?;
        self.reset_impl(root_header_state);

        let count = codec::read_varuint(&mut cursor).map_err(ForkDbError::Corrupt)?;
        for _ in 0..count {
            let (header_state, block, valid) =
                codec::read_block_state(&mut cursor).map_err(ForkDbError::Corrupt)?;
            // Header extensions are reconstructed from the raw block inside BlockState::new.
            // Transaction metadata is not: the host recreates it as needed when it applies
            // blocks.
            let state = BlockState::new(header_state, block)?;
            state.set_valid(valid);
            self.add_impl(Arc::new(state), false, true, validator)?;
        }

        let head_id: BlockId = codec::read_borsh(&mut cursor).map_err(ForkDbError::Corrupt)?;
        let root = self.root.clone().ok_or(ForkDbError::RootNotSet)?;
        let head = if root.id() == head_id {
            root.clone()
        } else {
            self.index
                .get(&head_id)
                .cloned()
                .ok_or(ForkDbError::HeadNotFound { id: head_id })?
        };
        self.head = Some(head.clone());

        match self.index.best() {
            Some(best) if best.is_valid() => {
                if prefer(best, &head) {
                    return Err(ForkDbError::HeadNotBest {
                        head: head.id(),
                        best: best.id(),
                    });
                }
            }
            // An empty index, or one whose best candidate is still invalid, is tolerated,
            // but then the head must be the root.
            _ => {
                if head.id() != root.id() {
                    return Err(ForkDbError::HeadNotRoot { head: head.id() });
                }
            }
        }

        fs::remove_file(path).map_err(ForkDbError::Io)?;
        log::info!(
            "restored fork database from {}: {} block states, head {}",
            path.display(),
            count,
            short_id(&head.id())
        );
        Ok(())
    }

    fn close_impl(&mut self, path: &Path) -> Result<(), ForkDbError> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => {
                if !self.index.is_empty() {
                    log::error!(
                        "fork database is in a bad state when closing; not writing out {}",
                        path.display()
                    );
                }
                return Ok(());
            }
        };

        let mut out = Vec::new();
        codec::write_u32(&mut out, R::MAGIC);
        // Always written at the current version, which is max_supported.
        codec::write_u32(&mut out, MAX_SUPPORTED_VERSION);
        codec::write_borsh(&mut out, root.header_state()).map_err(ForkDbError::Io)?;
        codec::write_varuint(&mut out, self.index.len() as u64);
        for state in self.index.snapshot_order() {
            codec::write_block_state(&mut out, &state).map_err(ForkDbError::Io)?;
        }
        match &self.head {
            Some(head) => codec::write_borsh(&mut out, &head.id()).map_err(ForkDbError::Io)?,
            None => log::error!(
                "head not set in fork database; {} will be corrupted",
                path.display()
            ),
        }

        fs::write(path, out).map_err(ForkDbError::Io)?;
        self.index.clear();
        Ok(())
    }
}
