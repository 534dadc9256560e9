/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The flavor-dispatching facade over the two fork database instances.
//!
//! A node runs the legacy (DPoS) flavor until the chain transitions to the finality regime, and
//! the finality flavor afterwards. [`ForkDatabase`] owns up to one instance of each and a
//! `legacy` flag, and dispatches by the flag:
//! - [`open`](ForkDatabase::open) peeks the snapshot's magic totem and selects the flavor the
//!   file was written by;
//! - [`switch_from_legacy`](ForkDatabase::switch_from_legacy) performs the one-way transition at
//!   runtime, carrying the legacy head over as the finality root.
//!
//! The legacy instance is kept alive for the facade's whole lifetime even after the switch,
//! because other threads may still be blocked on (or about to take) its mutex.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::fork_db::{DposForkDb, FeatureValidator, FinalityForkDb, ForkDb, ForkDbError};
use crate::logging::short_id;
use crate::types::basic::BlockNum;
use crate::types::block::Block;
use crate::types::state::{
    BlockState, DposIrreversibility, InstantFinality, IrreversibilityRule,
};

/// Name of the snapshot file under the data directory.
pub const FORK_DB_FILENAME: &str = "fork_db.dat";

/// See the [module documentation](self).
pub struct ForkDatabase {
    data_dir: PathBuf,
    legacy: AtomicBool,
    dpos: Arc<DposForkDb>,
    finality: OnceLock<Arc<FinalityForkDb>>,
}

impl ForkDatabase {
    /// Create a facade over `data_dir`. Starts in legacy mode with an empty legacy instance;
    /// [`open`](Self::open) may flip the mode if the on-disk snapshot is finality-flavored.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            legacy: AtomicBool::new(true),
            dpos: Arc::new(DposForkDb::new()),
            finality: OnceLock::new(),
        }
    }

    /// Path of the snapshot file this facade reads and writes.
    pub fn file_path(&self) -> PathBuf {
        self.data_dir.join(FORK_DB_FILENAME)
    }

    /// Whether the facade currently dispatches to the legacy instance.
    pub fn in_legacy_mode(&self) -> bool {
        self.legacy.load(Ordering::Acquire)
    }

    /// The legacy instance. Alive for the facade's whole lifetime, even after the switch.
    pub fn legacy_db(&self) -> Arc<DposForkDb> {
        self.dpos.clone()
    }

    /// The finality instance, once a finality snapshot load or the one-way switch installed it.
    pub fn finality_db(&self) -> Option<Arc<FinalityForkDb>> {
        self.finality.get().cloned()
    }

    /// Restore from the snapshot file if one exists, selecting the flavor by its magic totem.
    /// Creates the data directory if it is missing. An absent file leaves the facade empty, in
    /// legacy mode.
    pub fn open(&self, validator: &mut FeatureValidator<'_>) -> Result<(), ForkDbError> {
        if !self.data_dir.is_dir() {
            fs::create_dir_all(&self.data_dir).map_err(ForkDbError::Io)?;
        }
        let path = self.file_path();
        if !path.exists() {
            return Ok(());
        }

        let mut totem_bytes = [0u8; 4];
        let mut file = fs::File::open(&path).map_err(ForkDbError::Io)?;
        file.read_exact(&mut totem_bytes).map_err(ForkDbError::Corrupt)?;
        drop(file);

        let totem = u32::from_le_bytes(totem_bytes);
        if totem == DposIrreversibility::MAGIC {
            self.dpos.open(&path, validator)
        } else if totem == InstantFinality::MAGIC {
            // The file holds finality data, so the facade leaves legacy mode before loading.
            let finality = self.install_finality();
            finality.open(&path, validator)
        } else {
            Err(ForkDbError::InvalidMagic {
                actual: totem,
                expected: vec![DposIrreversibility::MAGIC, InstantFinality::MAGIC],
            })
        }
    }

    /// Serialize the active instance to the snapshot file under the data directory.
    pub fn close(&self) -> Result<(), ForkDbError> {
        let path = self.file_path();
        if self.in_legacy_mode() {
            self.dpos.close(&path)
        } else {
            match self.finality.get() {
                Some(finality) => finality.close(&path),
                None => Ok(()),
            }
        }
    }

    /// One-way transition out of legacy mode: copy the current legacy head into a freshly
    /// constructed finality state and install it as the root of a new finality instance.
    ///
    /// The legacy instance is not torn down; it is retained, unused, until the facade is
    /// dropped. Nothing is written out either, since the snapshot file was already removed on
    /// open.
    ///
    /// # Panics
    ///
    /// Panics if the facade already left legacy mode.
    pub fn switch_from_legacy(&self) -> Result<(), ForkDbError> {
        assert!(self.in_legacy_mode(), "fork database already switched from legacy");
        let head = self.dpos.head().ok_or(ForkDbError::RootNotSet)?;
        let new_head: BlockState<InstantFinality> = head.to_flavor();
        let finality = self.install_finality();
        finality.reset(new_head.header_state().clone());
        log::info!(
            "fork database switched from legacy at head {}",
            short_id(&new_head.id())
        );
        Ok(())
    }

    /// The raw block sequence from the active instance's head back to (but excluding) its root,
    /// for replay or export.
    pub fn fetch_branch_from_head(&self) -> Vec<Block> {
        if self.in_legacy_mode() {
            branch_blocks(&self.dpos)
        } else {
            match self.finality.get() {
                Some(finality) => branch_blocks(finality),
                None => Vec::new(),
            }
        }
    }

    fn install_finality(&self) -> Arc<FinalityForkDb> {
        let finality = self
            .finality
            .get_or_init(|| Arc::new(FinalityForkDb::new()))
            .clone();
        self.legacy.store(false, Ordering::Release);
        finality
    }
}

fn branch_blocks<R: IrreversibilityRule>(db: &ForkDb<R>) -> Vec<Block> {
    match db.head() {
        Some(head) => db
            .fetch_branch(&head.id(), BlockNum::MAX)
            .iter()
            .map(|state| state.block().clone())
            .collect(),
        None => Vec::new(),
    }
}
