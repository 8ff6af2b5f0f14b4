//! The browser platform surface the engine consumes.
//!
//! Every call is asynchronous and individually fallible; callers are expected
//! to degrade failures to logged skips rather than abort whole passes. The
//! trait is object-safe so orchestrator internals can hold it behind an `Arc`.

use async_trait::async_trait;
use thiserror::Error;

use tabshelf_core::{BookmarkId, BookmarkNode, GroupColor, Tab, TabGroup, TabGroupId, TabId, Window, WindowId};

/// Failure taxonomy for browser calls. `NotFound` is expected under
/// concurrent user action (the referenced tab/group/bookmark/window is
/// already gone); `OperationFailed` means the platform rejected the call;
/// `InvalidData` marks records the platform returned in an unusable shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrowserError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTab {
    pub window_id: WindowId,
    pub url: String,
    pub index: Option<u32>,
    pub pinned: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateTab {
    pub url: Option<String>,
    pub pinned: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateTabGroup {
    pub title: Option<String>,
    pub color: Option<GroupColor>,
    pub collapsed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateBookmark {
    pub parent_id: BookmarkId,
    pub title: String,
    /// `None` creates a folder.
    pub url: Option<String>,
    pub index: Option<u32>,
}

#[async_trait]
pub trait BrowserApi: Send + Sync {
    async fn tabs_query(&self, window_id: Option<WindowId>) -> Result<Vec<Tab>, BrowserError>;

    async fn tab_get(&self, id: TabId) -> Result<Tab, BrowserError>;

    async fn tab_create(&self, params: CreateTab) -> Result<Tab, BrowserError>;

    async fn tab_update(&self, id: TabId, params: UpdateTab) -> Result<(), BrowserError>;

    async fn tab_remove(&self, id: TabId) -> Result<(), BrowserError>;

    async fn tab_move(&self, id: TabId, index: u32) -> Result<(), BrowserError>;

    /// Groups tabs into `group`, or into a freshly created group when `None`.
    /// Returns the id of the group the tabs ended up in.
    async fn tabs_group(
        &self,
        ids: &[TabId],
        group: Option<TabGroupId>,
    ) -> Result<TabGroupId, BrowserError>;

    async fn tabs_ungroup(&self, ids: &[TabId]) -> Result<(), BrowserError>;

    async fn tab_discard(&self, id: TabId) -> Result<(), BrowserError>;

    async fn tab_groups_query(&self, window_id: WindowId) -> Result<Vec<TabGroup>, BrowserError>;

    async fn tab_group_update(
        &self,
        id: TabGroupId,
        params: UpdateTabGroup,
    ) -> Result<(), BrowserError>;

    async fn windows_get_all(&self) -> Result<Vec<Window>, BrowserError>;

    async fn window_get(&self, id: WindowId) -> Result<Window, BrowserError>;

    async fn window_create(&self) -> Result<Window, BrowserError>;

    async fn bookmarks_get_tree(&self) -> Result<BookmarkNode, BrowserError>;

    async fn bookmarks_get_children(
        &self,
        id: &BookmarkId,
    ) -> Result<Vec<BookmarkNode>, BrowserError>;

    async fn bookmarks_get_subtree(&self, id: &BookmarkId) -> Result<BookmarkNode, BrowserError>;

    async fn bookmark_create(&self, params: CreateBookmark) -> Result<BookmarkNode, BrowserError>;

    async fn bookmark_update(
        &self,
        id: &BookmarkId,
        title: Option<&str>,
        url: Option<&str>,
    ) -> Result<(), BrowserError>;

    async fn bookmark_remove(&self, id: &BookmarkId) -> Result<(), BrowserError>;

    async fn bookmark_remove_tree(&self, id: &BookmarkId) -> Result<(), BrowserError>;

    async fn bookmark_move(
        &self,
        id: &BookmarkId,
        parent_id: &BookmarkId,
        index: Option<u32>,
    ) -> Result<(), BrowserError>;
}
