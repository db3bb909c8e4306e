/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Synchronization layer of a federated link aggregator.
//!
//! Accounts, items, votes, follows and moderation actions live on a remote
//! collection API. [`repository::Repository`] reads them by crawling paged
//! collections and writes them by submitting addressed activities.

pub mod account;
pub mod addressing;
pub mod cache;
pub mod client;
pub mod config;
pub mod convert;
pub mod crawler;
pub mod cursor;
pub mod error;
pub mod filters;
pub mod flags;
pub mod follow;
pub mod hash;
pub mod http_retry;
pub mod http_sig;
pub mod iri;
pub mod item;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod metrics;
pub mod moderation;
pub mod render;
pub mod renderable;
pub mod repository;
pub mod tag;
pub mod threading;
pub mod transport;
pub mod vote;
pub mod votes;

pub use account::{Account, Credential};
pub use config::SyncConfig;
pub use cursor::Cursor;
pub use error::{SyncError, SyncResult};
pub use filters::Filters;
pub use item::Item;
pub use renderable::Renderable;
pub use repository::{Deps, Repository};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
