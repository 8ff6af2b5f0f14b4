//! Projects raw platform records into [`NormalizedState`].
//!
//! Both normalizers share one policy for bad input: skip the record, log a
//! warning, keep going. Browser events race against user action, so partial
//! or half-torn records are expected and must never abort a pass.

use std::collections::HashMap;

use tracing::warn;

use crate::codec::{
    decode_bookmark_title, decode_group_folder_title, PINNED_FOLDER_TITLE, UNNAMED_GROUP_TITLE,
};
use crate::ids::{GroupId, ItemId, TabGroupId};
use crate::platform::{BookmarkNode, Tab, TabGroup};
use crate::state::{GroupKey, NormalizedGroup, NormalizedItem, NormalizedState};

/// Normalizes a window's live tabs and tab-groups.
///
/// Tab-groups with the same `(title, color)` key are merged onto one
/// representative group, and member tabs of every duplicate are remapped to
/// the representative's id. Without the merge, the differencer would see
/// phantom adds and deletes on every pass.
pub fn from_live_state(tabs: &[Tab], groups: &[TabGroup]) -> NormalizedState {
    let mut representatives: HashMap<GroupKey, TabGroupId> = HashMap::new();
    let mut remap: HashMap<TabGroupId, TabGroupId> = HashMap::new();
    let mut normalized_groups = Vec::new();

    for group in groups {
        let title = group
            .title
            .clone()
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNNAMED_GROUP_TITLE.to_owned());
        let key = GroupKey {
            title,
            color: group.color,
        };
        match representatives.get(&key) {
            Some(representative) => {
                warn!(
                    duplicate = %group.id,
                    representative = %representative,
                    title = %key.title,
                    color = key.color.as_str(),
                    "merging duplicate tab group"
                );
                remap.insert(group.id, *representative);
            }
            None => {
                representatives.insert(key.clone(), group.id);
                normalized_groups.push(NormalizedGroup {
                    id: GroupId::Tab(group.id),
                    title: key.title,
                    color: group.color,
                    collapsed: group.collapsed,
                    index: normalized_groups.len() as u32,
                });
            }
        }
    }

    let mut ordered: Vec<&Tab> = tabs.iter().collect();
    ordered.sort_by_key(|tab| tab.index);

    let mut items = Vec::new();
    for tab in ordered {
        let Some(id) = tab.id else {
            warn!(index = tab.index, "skipping tab without an id");
            continue;
        };
        let Some(url) = tab.url.as_deref().filter(|url| !url.is_empty()) else {
            warn!(tab = %id, "skipping tab without a url");
            continue;
        };

        let group = tab
            .group_id
            .map(|group_id| GroupId::Tab(remap.get(&group_id).copied().unwrap_or(group_id)));

        items.push(NormalizedItem {
            id: ItemId::Tab(id),
            url: url.to_owned(),
            title: tab.title.clone().unwrap_or_default(),
            pinned: tab.pinned,
            renamed: false,
            index: items.len() as u32,
            group,
        });
    }

    NormalizedState {
        items,
        groups: normalized_groups,
    }
}

/// Normalizes a workspace's bookmark subtree.
///
/// Walks the root's direct children only: a child with a url is an ungrouped
/// item, the reserved pinned folder contributes its children as pinned items,
/// and any other folder is decoded into a group whose children become its
/// items. Deeper nesting has no meaning in a workspace and is skipped.
pub fn from_bookmark_tree(root: &BookmarkNode) -> NormalizedState {
    let mut items = Vec::new();
    let mut groups = Vec::new();

    for child in &root.children {
        if child.is_folder() {
            if child.title == PINNED_FOLDER_TITLE {
                push_folder_items(child, None, true, &mut items);
            } else {
                let decoded = decode_group_folder_title(&child.title);
                let group_id = GroupId::Folder(child.id.clone());
                groups.push(NormalizedGroup {
                    id: group_id.clone(),
                    title: decoded.title,
                    color: decoded.color,
                    collapsed: decoded.collapsed,
                    index: groups.len() as u32,
                });
                push_folder_items(child, Some(group_id), false, &mut items);
            }
        } else {
            push_item(child, None, false, &mut items);
        }
    }

    NormalizedState { items, groups }
}

fn push_folder_items(
    folder: &BookmarkNode,
    group: Option<GroupId>,
    pinned: bool,
    items: &mut Vec<NormalizedItem>,
) {
    for child in &folder.children {
        if child.is_folder() {
            warn!(folder = %folder.id, child = %child.id, "skipping folder nested below workspace depth");
            continue;
        }
        push_item(child, group.clone(), pinned, items);
    }
}

fn push_item(
    node: &BookmarkNode,
    group: Option<GroupId>,
    force_pinned: bool,
    items: &mut Vec<NormalizedItem>,
) {
    let Some(url) = node.url.as_deref().filter(|url| !url.is_empty()) else {
        warn!(bookmark = %node.id, "skipping bookmark without a url");
        return;
    };

    let decoded = decode_bookmark_title(&node.title);
    items.push(NormalizedItem {
        id: ItemId::Bookmark(node.id.clone()),
        url: url.to_owned(),
        title: decoded.title,
        pinned: force_pinned || decoded.pinned,
        renamed: false,
        index: items.len() as u32,
        group,
    });
}
