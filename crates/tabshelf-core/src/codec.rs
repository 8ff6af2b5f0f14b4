//! Round-trips group and pin metadata through plain bookmark titles.
//!
//! The bookmark store only gives us one string per node, so auxiliary
//! attributes ride along as bracketed prefix tokens. The formats are persisted
//! in user bookmark trees and must stay byte-for-byte stable:
//!
//! - group folder: `"[<color>][collapsed] <title>"`, the `[collapsed]` token
//!   present only when the group is collapsed
//! - bookmark: `"[pinned] <title>"` when pinned, the bare title otherwise
//! - the pinned-items container is a folder with the reserved literal title

use crate::platform::GroupColor;

/// Reserved title of the folder holding pinned-tab bookmarks, matched exactly.
pub const PINNED_FOLDER_TITLE: &str = "[pinned]";

/// Fixed root folder that holds every workspace folder in the bookmark store.
pub const WORKSPACES_FOLDER_TITLE: &str = "Tabshelf Workspaces";

/// Stand-in title for groups the user never named. Also what the normalizer
/// assigns untitled live groups, so the two sides agree on the semantic key.
pub const UNNAMED_GROUP_TITLE: &str = "Unnamed Group";

const COLLAPSED_TOKEN: &str = "collapsed";
const PINNED_PREFIX: &str = "[pinned] ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFolderTitle {
    pub title: String,
    pub color: GroupColor,
    pub collapsed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkTitle {
    pub title: String,
    pub pinned: bool,
}

pub fn encode_group_folder_title(title: &str, color: GroupColor, collapsed: bool) -> String {
    let title = if title.is_empty() {
        UNNAMED_GROUP_TITLE
    } else {
        title
    };
    let collapsed_token = if collapsed { "[collapsed]" } else { "" };
    format!("[{}]{} {}", color.as_str(), collapsed_token, title)
}

/// Tolerant inverse of [`encode_group_folder_title`]. Unknown or missing color
/// tokens fall back to grey; a missing `[collapsed]` token means expanded. A
/// leading bracketed token that is neither a color nor `collapsed` stays part
/// of the title, so user folders that merely look bracketed survive untouched.
pub fn decode_group_folder_title(encoded: &str) -> GroupFolderTitle {
    let mut rest = encoded;
    let mut color = GroupColor::Grey;
    let mut collapsed = false;

    if let Some((token, after)) = take_bracket_token(rest) {
        if let Some(parsed) = GroupColor::parse(token) {
            color = parsed;
            rest = after;
            if let Some((token, after)) = take_bracket_token(rest) {
                if token == COLLAPSED_TOKEN {
                    collapsed = true;
                    rest = after;
                }
            }
        } else if token == COLLAPSED_TOKEN {
            collapsed = true;
            rest = after;
        }
    }

    let title = rest.strip_prefix(' ').unwrap_or(rest);
    let title = if title.is_empty() {
        UNNAMED_GROUP_TITLE.to_owned()
    } else {
        title.to_owned()
    };

    GroupFolderTitle {
        title,
        color,
        collapsed,
    }
}

pub fn encode_bookmark_title(title: &str, pinned: bool) -> String {
    if pinned {
        format!("{PINNED_PREFIX}{title}")
    } else {
        title.to_owned()
    }
}

/// Strips the pinned prefix. The `renamed` flag is not derivable from title
/// text; callers supply it from prior diff state.
pub fn decode_bookmark_title(encoded: &str) -> BookmarkTitle {
    match encoded.strip_prefix(PINNED_PREFIX) {
        Some(title) => BookmarkTitle {
            title: title.to_owned(),
            pinned: true,
        },
        None => BookmarkTitle {
            title: encoded.to_owned(),
            pinned: false,
        },
    }
}

fn take_bracket_token(value: &str) -> Option<(&str, &str)> {
    let inner = value.strip_prefix('[')?;
    let end = inner.find(']')?;
    Some((&inner[..end], &inner[end + 1..]))
}
