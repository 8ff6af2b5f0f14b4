//! Compares two normalized snapshots and emits the operations that would
//! transform the target into the source.
//!
//! Items match by URL and groups match by `(title, color)`; raw ids are never
//! compared across representations. The differencer is pure; the appliers own
//! execution order via [`Operation::apply_order`].

use std::collections::HashMap;

use tracing::debug;

use crate::ids::{GroupId, ItemId};
use crate::state::{GroupKey, NormalizedGroup, NormalizedItem, NormalizedState};

/// One mutation against the target representation. Created by [`diff`],
/// consumed once by an applier, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    AddItem {
        item: NormalizedItem,
        /// Semantic key of the source-side group the item belongs to, already
        /// resolved so the applier never needs the source state.
        group: Option<GroupKey>,
    },
    DeleteItem {
        id: ItemId,
    },
    UpdateItem {
        id: ItemId,
        changes: ItemChanges,
    },
    MoveItem {
        id: ItemId,
        index: u32,
    },
    AddGroup {
        group: NormalizedGroup,
    },
    DeleteGroup {
        id: GroupId,
    },
    UpdateGroup {
        id: GroupId,
        changes: GroupChanges,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemChanges {
    pub title: Option<String>,
    pub renamed: Option<bool>,
    pub pinned: Option<bool>,
    /// `Some(None)` moves the item out of any group; `Some(Some(key))` moves
    /// it into the group matching `key` on the target side.
    pub group: Option<Option<GroupKey>>,
    pub index: Option<u32>,
}

impl ItemChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.renamed.is_none()
            && self.pinned.is_none()
            && self.group.is_none()
            && self.index.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupChanges {
    pub collapsed: Option<bool>,
    pub index: Option<u32>,
}

impl GroupChanges {
    pub fn is_empty(&self) -> bool {
        self.collapsed.is_none() && self.index.is_none()
    }
}

impl Operation {
    /// Fixed type-priority the appliers sort by before execution: group
    /// containers must exist before items that reference them, and deletions
    /// run last so in-flight adds can still resolve group keys.
    pub fn apply_order(&self) -> u8 {
        match self {
            Self::AddGroup { .. } => 0,
            Self::AddItem { .. } => 1,
            Self::UpdateGroup { .. } => 2,
            Self::UpdateItem { .. } => 3,
            Self::MoveItem { .. } => 4,
            Self::DeleteItem { .. } => 5,
            Self::DeleteGroup { .. } => 6,
        }
    }
}

/// Stable-sorts a batch into execution order.
pub fn sort_for_apply(ops: &mut [Operation]) {
    ops.sort_by_key(Operation::apply_order);
}

pub fn has_changes(ops: &[Operation]) -> bool {
    !ops.is_empty()
}

/// Computes the ordered operation list that brings `target` in line with
/// `source`. Item operations come first, then group operations.
pub fn diff(source: &NormalizedState, target: &NormalizedState) -> Vec<Operation> {
    let mut ops = diff_items(source, target);
    ops.extend(diff_groups(source, target));
    ops
}

fn diff_items(source: &NormalizedState, target: &NormalizedState) -> Vec<Operation> {
    let source_by_url = index_items(&source.items, "source");
    let target_by_url = index_items(&target.items, "target");

    let mut ops = Vec::new();

    for item in &target.items {
        if !source_by_url.contains_key(item.url.as_str()) {
            ops.push(Operation::DeleteItem {
                id: item.id.clone(),
            });
        }
    }

    let mut matched: Vec<(&NormalizedItem, &NormalizedItem)> = Vec::new();
    for item in &source.items {
        // Only the first-wins entry for a duplicate URL participates.
        if !source_by_url
            .get(item.url.as_str())
            .is_some_and(|first| std::ptr::eq(*first, item))
        {
            continue;
        }
        match target_by_url.get(item.url.as_str()) {
            Some(counterpart) => matched.push((item, counterpart)),
            None => ops.push(Operation::AddItem {
                item: item.clone(),
                group: source.group_key(item.group.as_ref()),
            }),
        }
    }

    for (source_item, target_item) in &matched {
        let changes = item_changes(source, target, source_item, target_item);
        if !changes.is_empty() {
            ops.push(Operation::UpdateItem {
                id: target_item.id.clone(),
                changes,
            });
        }
    }

    // Reordering: matched items in source order define the ranks. Only emit
    // moves when something is actually displaced, and then one move per
    // displaced item.
    let displaced = matched
        .iter()
        .enumerate()
        .any(|(rank, (_, target_item))| target_item.index != rank as u32);
    if displaced {
        for (rank, (_, target_item)) in matched.iter().enumerate() {
            if target_item.index != rank as u32 {
                ops.push(Operation::MoveItem {
                    id: target_item.id.clone(),
                    index: rank as u32,
                });
            }
        }
    }

    ops
}

fn item_changes(
    source: &NormalizedState,
    target: &NormalizedState,
    source_item: &NormalizedItem,
    target_item: &NormalizedItem,
) -> ItemChanges {
    let mut changes = ItemChanges::default();

    if source_item.title != target_item.title {
        // A divergence noticed before any rename is assumed to be a
        // deliberate rename and must stick. Once the target is renamed,
        // titles stop flowing and its edits win.
        if !target_item.renamed {
            changes.title = Some(source_item.title.clone());
            changes.renamed = Some(true);
        }
    } else if source_item.renamed != target_item.renamed {
        changes.renamed = Some(source_item.renamed);
    }

    if source_item.pinned != target_item.pinned {
        changes.pinned = Some(source_item.pinned);
    }

    let source_key = source.group_key(source_item.group.as_ref());
    let target_key = target.group_key(target_item.group.as_ref());
    if source_key != target_key {
        changes.group = Some(source_key);
    }

    if source_item.index != target_item.index {
        changes.index = Some(source_item.index);
    }

    changes
}

fn diff_groups(source: &NormalizedState, target: &NormalizedState) -> Vec<Operation> {
    let source_by_key = index_groups(&source.groups, "source");
    let target_by_key = index_groups(&target.groups, "target");

    let mut ops = Vec::new();

    for group in &target.groups {
        if !source_by_key.contains_key(&group.key()) {
            ops.push(Operation::DeleteGroup {
                id: group.id.clone(),
            });
        }
    }

    for group in &source.groups {
        if !source_by_key
            .get(&group.key())
            .is_some_and(|first| std::ptr::eq(*first, group))
        {
            continue;
        }
        match target_by_key.get(&group.key()) {
            Some(counterpart) => {
                // Title and color are the matching key; only collapsed state
                // and position can change for a surviving group.
                let mut changes = GroupChanges::default();
                if group.collapsed != counterpart.collapsed {
                    changes.collapsed = Some(group.collapsed);
                }
                if group.index != counterpart.index {
                    changes.index = Some(group.index);
                }
                if !changes.is_empty() {
                    ops.push(Operation::UpdateGroup {
                        id: counterpart.id.clone(),
                        changes,
                    });
                }
            }
            None => ops.push(Operation::AddGroup {
                group: group.clone(),
            }),
        }
    }

    ops
}

fn index_items<'a>(
    items: &'a [NormalizedItem],
    side: &'static str,
) -> HashMap<&'a str, &'a NormalizedItem> {
    let mut by_url: HashMap<&str, &NormalizedItem> = HashMap::new();
    for item in items {
        if by_url.contains_key(item.url.as_str()) {
            debug!(url = %item.url, side, "duplicate item url; first occurrence wins");
            continue;
        }
        by_url.insert(item.url.as_str(), item);
    }
    by_url
}

fn index_groups<'a>(
    groups: &'a [NormalizedGroup],
    side: &'static str,
) -> HashMap<GroupKey, &'a NormalizedGroup> {
    let mut by_key: HashMap<GroupKey, &NormalizedGroup> = HashMap::new();
    for group in groups {
        if by_key.contains_key(&group.key()) {
            debug!(title = %group.title, side, "duplicate group key; first occurrence wins");
            continue;
        }
        by_key.insert(group.key(), group);
    }
    by_key
}
