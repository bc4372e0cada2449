// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gig-storage: the bucketed job store and its on-disk terminal mirror.

pub mod cache;
pub mod error;
pub mod store;

pub use cache::JobCache;
pub use error::StoreError;
pub use store::{JobStore, StoreCounts};
