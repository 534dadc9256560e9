/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Helpers for rendering ids in log lines.
//!
//! The fork database logs through the [log](https://docs.rs/log/latest/log/) crate. To get its
//! messages printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::types::basic::BlockId;

/// A readable representation of a block id: the first seven characters of its Base64 encoding.
pub(crate) fn short_id(id: &BlockId) -> String {
    let encoded = STANDARD_NO_PAD.encode(id.bytes());
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}
