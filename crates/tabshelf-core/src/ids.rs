use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl Display for TabId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "tab:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabGroupId(pub u64);

impl Display for TabGroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "tab-group:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl Display for WindowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "window:{}", self.0)
    }
}

/// Bookmark-store identifiers are opaque strings, unlike the numeric live-side ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkId(pub String);

impl BookmarkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BookmarkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "bookmark:{}", self.0)
    }
}

/// Identifier of a normalized item in whichever representation it came from.
///
/// Tab ids and bookmark ids live in disjoint, non-stable ID spaces; the id is
/// only meaningful against the representation the state was normalized from.
/// Cross-representation matching goes through semantic keys instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemId {
    Tab(TabId),
    Bookmark(BookmarkId),
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Tab(id) => write!(f, "{id}"),
            Self::Bookmark(id) => write!(f, "{id}"),
        }
    }
}

/// Identifier of a normalized group: a live tab-group or a bookmark folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupId {
    Tab(TabGroupId),
    Folder(BookmarkId),
}

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Tab(id) => write!(f, "{id}"),
            Self::Folder(id) => write!(f, "folder:{}", id.0),
        }
    }
}
