//! # Lobby Directory
//!
//! Access to the upstream lobby directory: the capable region list, per
//! region and platform listings, and single server detail reads.

pub mod client;
pub mod details;
pub mod lua;
pub mod types;

use crate::error::Result;
pub use client::LobbyClient;
pub use details::{
    ModInfo,
    Player,
    ServerDetails,
};
use std::{
    future::Future,
    pin::Pin,
};
pub use types::*;

pub type DirectoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The upstream directory as the collector sees it.
pub trait Directory: Send + Sync {
    /// Regions currently serving listings.
    fn capable_regions(&self) -> DirectoryFuture<'_, Vec<String>>;

    /// Every listing for one region and platform.
    fn list_servers<'a>(&'a self, region: &'a str, platform: Platform) -> DirectoryFuture<'a, Vec<LobbyServer>>;

    /// Detail read for a single row id, `None` when the directory does not
    /// know it.
    fn server_details<'a>(&'a self, region: &'a str, row_id: &'a str)
        -> DirectoryFuture<'a, Option<LobbyServerDetails>>;
}
