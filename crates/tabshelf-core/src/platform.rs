//! Raw records as the browser platform reports them.
//!
//! These mirror the WebExtension wire shapes (camelCase JSON) and are what the
//! binding layer hands to the engine. Fields the platform may omit or that can
//! be missing on half-initialized records are optional; the normalizer decides
//! what to do with partial data.

use serde::{Deserialize, Serialize};

use crate::ids::{BookmarkId, TabGroupId, TabId, WindowId};

/// The closed set of tab-group colors the platform supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupColor {
    #[default]
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

impl GroupColor {
    pub const ALL: [GroupColor; 9] = [
        Self::Grey,
        Self::Blue,
        Self::Red,
        Self::Yellow,
        Self::Green,
        Self::Pink,
        Self::Purple,
        Self::Cyan,
        Self::Orange,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grey => "grey",
            Self::Blue => "blue",
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Pink => "pink",
            Self::Purple => "purple",
            Self::Cyan => "cyan",
            Self::Orange => "orange",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|color| color.as_str() == value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: Option<TabId>,
    pub window_id: WindowId,
    pub url: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    pub index: u32,
    pub group_id: Option<TabGroupId>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub discarded: bool,
    pub fav_icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroup {
    pub id: TabGroupId,
    pub window_id: WindowId,
    pub title: Option<String>,
    #[serde(default)]
    pub color: GroupColor,
    #[serde(default)]
    pub collapsed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub id: WindowId,
    #[serde(default)]
    pub focused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkNode {
    pub id: BookmarkId,
    pub parent_id: Option<BookmarkId>,
    pub index: Option<u32>,
    pub title: String,
    /// Present on bookmarks, absent on folders.
    pub url: Option<String>,
    #[serde(default)]
    pub children: Vec<BookmarkNode>,
}

impl BookmarkNode {
    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }
}
