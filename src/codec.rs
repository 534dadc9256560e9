/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Framing helpers for the snapshot file.
//!
//! The envelope is little-endian and versioned:
//!
//! ```text
//! u32      magic totem                  ; flavor-specific, see IrreversibilityRule::MAGIC
//! u32      version                      ; in [MIN_SUPPORTED_VERSION, MAX_SUPPORTED_VERSION]
//! BHS      root header state            ; borsh
//! varuint  count                        ; LEB128
//! BS       block states, count times    ; borsh (header state, block, valid flag)
//! BlockId  head id                      ; 32 raw bytes
//! ```
//!
//! Individual records are borsh-framed; the envelope around them is written by hand so the
//! totem and version can be peeked without deserializing anything else.

use std::io;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::block::Block;
use crate::types::state::{BlockHeaderState, BlockState, IrreversibilityRule};

/// History:
/// Version 1: initial version of the portable snapshot format.
pub const MIN_SUPPORTED_VERSION: u32 = 1;
pub const MAX_SUPPORTED_VERSION: u32 = 1;

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "snapshot ends mid-record")
}

pub(crate) fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u32(cursor: &mut &[u8]) -> io::Result<u32> {
    if cursor.len() < 4 {
        return Err(truncated());
    }
    let (bytes, rest) = cursor.split_at(4);
    *cursor = rest;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Append `value` as an LEB128 variable-length unsigned integer.
pub(crate) fn write_varuint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Read an LEB128 variable-length unsigned integer.
pub(crate) fn read_varuint(cursor: &mut &[u8]) -> io::Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        if shift >= 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "varuint does not fit in 64 bits",
            ));
        }
        let byte = match cursor.split_first() {
            Some((byte, rest)) => {
                *cursor = rest;
                *byte
            }
            None => return Err(truncated()),
        };
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

pub(crate) fn write_borsh<T: BorshSerialize>(out: &mut Vec<u8>, value: &T) -> io::Result<()> {
    value.serialize(out)
}

pub(crate) fn read_borsh<T: BorshDeserialize>(cursor: &mut &[u8]) -> io::Result<T> {
    T::deserialize(cursor)
}

/// Append one block-state record: header state, block, validity flag.
pub(crate) fn write_block_state<R: IrreversibilityRule>(
    out: &mut Vec<u8>,
    state: &BlockState<R>,
) -> io::Result<()> {
    write_borsh(out, state.header_state())?;
    write_borsh(out, state.block())?;
    write_borsh(out, &state.is_valid())
}

/// Read the parts of one block-state record. The caller rebuilds the state so that header
/// extensions are reconstructed from the raw block rather than trusted from disk.
pub(crate) fn read_block_state(cursor: &mut &[u8]) -> io::Result<(BlockHeaderState, Block, bool)> {
    let header_state = read_borsh(cursor)?;
    let block = read_borsh(cursor)?;
    let valid = read_borsh(cursor)?;
    Ok((header_state, block, valid))
}
