/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Integration tests for the snapshot codec and the flavor-dispatching facade: round-trips,
//! corruption rejection, totem-based flavor selection, and the one-way legacy switch.

mod common;

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use common::*;
use fork_db::{
    BlockState, Digest, DposForkDb, DposIrreversibility, FinalityForkDb, ForkDatabase,
    ForkDbError, Timestamp,
};

const ROOT: u8 = 0xA0;

type State = Arc<BlockState<DposIrreversibility>>;

fn db_with_root() -> DposForkDb {
    let db = DposForkDb::new();
    db.reset(header_state(id(ROOT), id(0x00), 10, 10));
    db
}

fn state(id_byte: u8, prev_byte: u8, num: u32) -> State {
    make_state::<DposIrreversibility>(id(id_byte), id(prev_byte), num, 10)
}

/// Root R; valid B and C at 11; valid D at 12 on C (the head); invalid E at 13 on D.
fn populated_db() -> (DposForkDb, Vec<State>) {
    let db = db_with_root();
    let b = state(0x01, ROOT, 11);
    let c = state(0x02, ROOT, 11);
    let d = state(0x03, 0x02, 12);
    let e = state(0x04, 0x03, 13);
    for s in [&b, &c, &d, &e] {
        db.add(s.clone(), false).unwrap();
    }
    for s in [&b, &c, &d] {
        db.mark_valid(s).unwrap();
    }
    (db, vec![b, c, d, e])
}

#[test]
fn snapshot_round_trips_and_removes_the_file() {
    let dir = temp_dir("round_trip");
    let path = dir.join("fork_db.dat");
    let (db, states) = populated_db();
    let head_id = db.head().unwrap().id();
    db.close(&path).unwrap();
    assert!(path.exists());

    let restored = DposForkDb::new();
    restored.open(&path, &mut accept_all()).unwrap();
    assert!(!path.exists(), "a loaded snapshot must be deleted");

    assert_eq!(restored.root().unwrap().id(), id(ROOT));
    assert_eq!(restored.head().unwrap().id(), head_id);
    for original in &states {
        let loaded = restored.get_block(&original.id()).unwrap();
        assert_eq!(loaded.previous(), original.previous());
        assert_eq!(loaded.is_valid(), original.is_valid());
        assert_eq!(loaded.block(), original.block());
    }
}

#[test]
fn snapshot_with_no_valid_blocks_restores_head_at_root() {
    let dir = temp_dir("all_invalid");
    let path = dir.join("fork_db.dat");
    let db = db_with_root();
    let a = state(0x01, ROOT, 11);
    let b = state(0x02, 0x01, 12);
    db.add(a.clone(), false).unwrap();
    db.add(b.clone(), false).unwrap();
    db.close(&path).unwrap();

    let restored = DposForkDb::new();
    restored.open(&path, &mut accept_all()).unwrap();
    assert_eq!(restored.head().unwrap().id(), id(ROOT));
    assert!(!restored.get_block(&a.id()).unwrap().is_valid());
    assert!(!restored.get_block(&b.id()).unwrap().is_valid());
}

#[test]
fn open_rejects_a_snapshot_of_the_other_flavor() {
    let dir = temp_dir("wrong_flavor");
    let path = dir.join("fork_db.dat");
    let (db, _) = populated_db();
    db.close(&path).unwrap();

    let finality = FinalityForkDb::new();
    let err = finality.open(&path, &mut accept_all()).unwrap_err();
    assert!(matches!(err, ForkDbError::InvalidMagic { .. }));
    assert!(path.exists(), "a rejected snapshot must be left for forensics");
}

#[test]
fn open_rejects_an_unsupported_version() {
    let dir = temp_dir("bad_version");
    let path = dir.join("fork_db.dat");
    let (db, _) = populated_db();
    db.close(&path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
    fs::write(&path, bytes).unwrap();

    let restored = DposForkDb::new();
    let err = restored.open(&path, &mut accept_all()).unwrap_err();
    assert!(matches!(err, ForkDbError::UnsupportedVersion { version: 99 }));
    assert!(path.exists());
}

#[test]
fn open_rejects_a_truncated_snapshot() {
    let dir = temp_dir("truncated");
    let path = dir.join("fork_db.dat");
    let (db, _) = populated_db();
    db.close(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

    let restored = DposForkDb::new();
    let err = restored.open(&path, &mut accept_all()).unwrap_err();
    assert!(matches!(err, ForkDbError::Corrupt(_)));
}

#[test]
fn open_rejects_a_head_that_is_not_the_best_candidate() {
    let dir = temp_dir("head_not_best");
    let path = dir.join("fork_db.dat");
    let db = db_with_root();
    let a = state(0x01, ROOT, 11);
    db.add(a.clone(), false).unwrap();
    db.mark_valid(&a).unwrap();
    db.close(&path).unwrap();

    // Point the trailing head id back at the root: the valid tip now beats the head.
    let mut bytes = fs::read(&path).unwrap();
    let len = bytes.len();
    bytes[len - 32..].copy_from_slice(&id(ROOT).bytes());
    fs::write(&path, bytes).unwrap();

    let restored = DposForkDb::new();
    let err = restored.open(&path, &mut accept_all()).unwrap_err();
    assert!(matches!(err, ForkDbError::HeadNotBest { .. }));
}

#[test]
fn open_rejects_a_dangling_head_id() {
    let dir = temp_dir("dangling_head");
    let path = dir.join("fork_db.dat");
    let (db, _) = populated_db();
    db.close(&path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let len = bytes.len();
    bytes[len - 32..].copy_from_slice(&id(0x77).bytes());
    fs::write(&path, bytes).unwrap();

    let restored = DposForkDb::new();
    let err = restored.open(&path, &mut accept_all()).unwrap_err();
    assert!(matches!(err, ForkDbError::HeadNotFound { .. }));
}

#[test]
fn load_revalidates_feature_activations_through_the_callback() {
    let dir = temp_dir("validator_args");
    let path = dir.join("fork_db.dat");
    let db = db_with_root();
    let activating = make_state_with_activation::<DposIrreversibility>(
        id(0x01),
        id(ROOT),
        11,
        10,
        vec![digest(0x07)],
    );
    db.add(activating, false).unwrap();
    db.close(&path).unwrap();

    let mut calls: Vec<(Timestamp, BTreeSet<Digest>, Vec<Digest>)> = Vec::new();
    let restored = DposForkDb::new();
    restored
        .open(&path, &mut |timestamp, activated, fresh| {
            calls.push((timestamp, activated.clone(), fresh.to_vec()));
            Ok(())
        })
        .unwrap();

    assert_eq!(calls.len(), 1, "only the activating block consults the validator");
    let (timestamp, activated, fresh) = &calls[0];
    assert_eq!(*timestamp, Timestamp::new(11));
    assert!(activated.is_empty());
    assert_eq!(fresh, &vec![digest(0x07)]);
}

#[test]
fn a_validator_rejection_fails_the_load_and_keeps_the_file() {
    let dir = temp_dir("validator_rejects");
    let path = dir.join("fork_db.dat");
    let db = db_with_root();
    let activating = make_state_with_activation::<DposIrreversibility>(
        id(0x01),
        id(ROOT),
        11,
        10,
        vec![digest(0x07)],
    );
    db.add(activating, false).unwrap();
    db.close(&path).unwrap();

    let restored = DposForkDb::new();
    let err = restored
        .open(&path, &mut |_, _, _| Err("unknown feature digest".into()))
        .unwrap_err();
    assert!(matches!(err, ForkDbError::InvalidFeatureActivation { .. }));
    assert!(path.exists());
}

#[test]
fn the_facade_selects_the_flavor_by_totem_and_switches_one_way() {
    let dir = temp_dir("facade");
    let facade = ForkDatabase::new(&dir);
    facade.legacy_db().reset(header_state(id(ROOT), id(0x00), 10, 10));
    let a = state(0x01, ROOT, 11);
    facade.legacy_db().add(a.clone(), false).unwrap();
    facade.legacy_db().mark_valid(&a).unwrap();
    facade.close().unwrap();
    assert!(facade.file_path().exists());

    let reopened = ForkDatabase::new(&dir);
    reopened.open(&mut accept_all()).unwrap();
    assert!(reopened.in_legacy_mode());
    assert_eq!(reopened.legacy_db().head().unwrap().id(), a.id());

    reopened.switch_from_legacy().unwrap();
    assert!(!reopened.in_legacy_mode());
    let finality = reopened.finality_db().unwrap();
    assert_eq!(finality.root().unwrap().id(), a.id());
    assert_eq!(finality.head().unwrap().id(), a.id());

    // A snapshot written after the switch reopens straight into finality mode.
    reopened.close().unwrap();
    let after_switch = ForkDatabase::new(&dir);
    after_switch.open(&mut accept_all()).unwrap();
    assert!(!after_switch.in_legacy_mode());
    assert_eq!(after_switch.finality_db().unwrap().root().unwrap().id(), a.id());
}

#[test]
fn the_facade_rejects_an_unknown_totem() {
    let dir = temp_dir("facade_bad_totem");
    let facade = ForkDatabase::new(&dir);
    fs::write(facade.file_path(), 0xDEAD_BEEFu32.to_le_bytes()).unwrap();

    let err = facade.open(&mut accept_all()).unwrap_err();
    match err {
        ForkDbError::InvalidMagic { actual, expected } => {
            assert_eq!(actual, 0xDEAD_BEEF);
            assert_eq!(expected.len(), 2);
        }
        other => panic!("expected InvalidMagic, got {:?}", other),
    }
}

#[test]
fn fetch_branch_from_head_exports_raw_blocks_tip_first() {
    let dir = temp_dir("branch_export");
    let facade = ForkDatabase::new(&dir);
    facade.legacy_db().reset(header_state(id(ROOT), id(0x00), 10, 10));
    let a = state(0x01, ROOT, 11);
    let b = state(0x02, 0x01, 12);
    facade.legacy_db().add(a.clone(), false).unwrap();
    facade.legacy_db().add(b.clone(), false).unwrap();
    facade.legacy_db().mark_valid(&a).unwrap();
    facade.legacy_db().mark_valid(&b).unwrap();

    let blocks = facade.fetch_branch_from_head();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0], *b.block());
    assert_eq!(blocks[1], *a.block());
}
