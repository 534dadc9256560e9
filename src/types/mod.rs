/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the types stored and indexed by the fork database.

pub mod basic;

pub mod block;

pub mod state;
