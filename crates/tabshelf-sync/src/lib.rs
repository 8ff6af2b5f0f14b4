//! Effectful half of the tabshelf reconciliation engine: the abstract
//! browser API, the tab and bookmark appliers, the window↔workspace link
//! store, and the sync orchestrator that debounces and serializes passes.

pub mod bookmarks;
pub mod browser;
pub mod link;
pub mod orchestrator;
pub mod tabs;

#[cfg(test)]
pub(crate) mod mock;

pub use bookmarks::BookmarkApplier;
pub use browser::{
    BrowserApi, BrowserError, CreateBookmark, CreateTab, UpdateTab, UpdateTabGroup,
};
pub use link::{LinkStore, MemoryLinkStore};
pub use orchestrator::{SyncConfig, SyncError, SyncOrchestrator};
pub use tabs::TabApplier;
