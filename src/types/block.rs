/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the block and block-header types, and for the header extensions the fork
//! database understands.
//!
//! The fork database never interprets a block's payload. The one part of a block it does read is
//! the header extension list, because a block that activates protocol features has to be checked
//! against the feature set of its parent when a snapshot is reloaded.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::{BlockId, Digest, Timestamp};

/// Extension id of the [`ProtocolFeatureActivation`] header extension.
pub const PROTOCOL_FEATURE_ACTIVATION_EXTENSION_ID: u16 = 0;

/// Header of a block, as far as the fork database needs to see it.
///
/// Extensions are kept raw as `(extension id, payload)` pairs; the payloads this library
/// understands are parsed on demand with [`Block::extract_header_extensions`].
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BlockHeader {
    /// Id of the parent block.
    pub previous: BlockId,

    /// Slot timestamp of the block.
    pub timestamp: Timestamp,

    /// Raw header extensions.
    pub extensions: Vec<(u16, Vec<u8>)>,
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            previous: BlockId::ZERO,
            timestamp: Timestamp::new(0),
            extensions: Vec::new(),
        }
    }
}

/// A complete block: its header plus an opaque payload.
///
/// The payload is whatever the host's block type serializes to. The fork database stores and
/// round-trips it untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Block {
    pub header: BlockHeader,
    pub payload: Vec<u8>,
}

impl Block {
    /// Parse the known header extensions of this block.
    ///
    /// Called when a block state is constructed, and again for every block state reloaded from a
    /// snapshot, so that the parsed view always derives from the raw block rather than from
    /// stored bytes.
    pub fn extract_header_extensions(&self) -> Result<HeaderExtensions, ExtensionError> {
        HeaderExtensions::parse(&self.header.extensions)
    }
}

/// The list of protocol features a block activates, carried in the header extension with id
/// [`PROTOCOL_FEATURE_ACTIVATION_EXTENSION_ID`].
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ProtocolFeatureActivation {
    pub protocol_features: Vec<Digest>,
}

impl ProtocolFeatureActivation {
    /// The extension id under which this record appears in a header.
    pub const fn extension_id() -> u16 {
        PROTOCOL_FEATURE_ACTIVATION_EXTENSION_ID
    }
}

/// Parsed view of the header extensions the fork database understands.
///
/// Extension ids this library does not know are skipped: the fork database only consumes the
/// feature-activation extension, and newer components may understand more.
#[derive(Clone, Debug, Default)]
pub struct HeaderExtensions {
    feature_activation: Option<ProtocolFeatureActivation>,
}

impl HeaderExtensions {
    /// Parse raw `(id, payload)` pairs. A known id appearing twice is corruption.
    pub fn parse(raw: &[(u16, Vec<u8>)]) -> Result<Self, ExtensionError> {
        let mut extensions = HeaderExtensions::default();
        for (id, payload) in raw {
            if *id == PROTOCOL_FEATURE_ACTIVATION_EXTENSION_ID {
                if extensions.feature_activation.is_some() {
                    return Err(ExtensionError::Duplicate { id: *id });
                }
                let activation = ProtocolFeatureActivation::try_from_slice(payload)
                    .map_err(|source| ExtensionError::Malformed { id: *id, source })?;
                extensions.feature_activation = Some(activation);
            }
        }
        Ok(extensions)
    }

    /// The feature-activation record, if the block carries one.
    pub fn feature_activation(&self) -> Option<&ProtocolFeatureActivation> {
        self.feature_activation.as_ref()
    }
}

/// Error when parsing the header extensions of a block.
#[derive(Debug)]
pub enum ExtensionError {
    /// A known extension id appeared more than once in the header.
    Duplicate { id: u16 },
    /// The payload of a known extension failed to deserialize.
    Malformed { id: u16, source: std::io::Error },
}

impl Display for ExtensionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionError::Duplicate { id } => {
                write!(f, "header extension {} appears more than once", id)
            }
            ExtensionError::Malformed { id, source } => {
                write!(f, "header extension {} has a malformed payload: {}", id, source)
            }
        }
    }
}

impl std::error::Error for ExtensionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtensionError::Duplicate { .. } => None,
            ExtensionError::Malformed { source, .. } => Some(source),
        }
    }
}
