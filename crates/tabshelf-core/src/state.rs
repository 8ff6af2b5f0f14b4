use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{GroupId, ItemId};
use crate::platform::GroupColor;

/// One browsing entry, agnostic to whether it is presently a tab or a bookmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub id: ItemId,
    pub url: String,
    pub title: String,
    pub pinned: bool,
    /// True once the user has overridden the auto-derived title. A renamed
    /// title never gets clobbered by the other side on later syncs.
    pub renamed: bool,
    pub index: u32,
    pub group: Option<GroupId>,
}

/// One live tab-group or one bookmark folder standing in for a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedGroup {
    pub id: GroupId,
    pub title: String,
    pub color: GroupColor,
    pub collapsed: bool,
    pub index: u32,
}

impl NormalizedGroup {
    pub fn key(&self) -> GroupKey {
        GroupKey {
            title: self.title.clone(),
            color: self.color,
        }
    }
}

/// Semantic group identity. Raw group/folder ids are not stable across
/// representations, so all cross-representation matching uses this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub title: String,
    pub color: GroupColor,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedState {
    pub items: Vec<NormalizedItem>,
    pub groups: Vec<NormalizedGroup>,
}

/// Reported by [`NormalizedState::validate`] and logged, never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateViolation {
    #[error("item {item} references missing group {group}")]
    DanglingGroupRef { item: ItemId, group: GroupId },
}

impl NormalizedState {
    pub fn group(&self, id: &GroupId) -> Option<&NormalizedGroup> {
        self.groups.iter().find(|group| &group.id == id)
    }

    /// Resolves an item's group reference to its semantic key, if any.
    pub fn group_key(&self, id: Option<&GroupId>) -> Option<GroupKey> {
        id.and_then(|id| self.group(id)).map(NormalizedGroup::key)
    }

    /// Checks that every non-null item group reference resolves within this
    /// state. Violations are reported, not fatal: browser events can race and
    /// leave a tab pointing at a group that is already gone.
    pub fn validate(&self) -> Vec<StateViolation> {
        let group_ids: HashSet<&GroupId> = self.groups.iter().map(|group| &group.id).collect();
        self.items
            .iter()
            .filter_map(|item| {
                let group = item.group.as_ref()?;
                if group_ids.contains(group) {
                    None
                } else {
                    Some(StateViolation::DanglingGroupRef {
                        item: item.id.clone(),
                        group: group.clone(),
                    })
                }
            })
            .collect()
    }

    /// Seeds the `renamed` flag from remembered rename state. Neither
    /// representation encodes the flag durably; the orchestrator carries the
    /// url → chosen-title map across passes and re-applies it here after
    /// normalization.
    pub fn mark_renamed(&mut self, renames: &HashMap<String, String>) {
        for item in &mut self.items {
            if renames.contains_key(&item.url) {
                item.renamed = true;
            }
        }
    }

    /// Like [`mark_renamed`](Self::mark_renamed), but also overrides the
    /// item title with the remembered one. Used on live-tab states, whose
    /// titles are page-derived: without the override, a full rebuild of the
    /// bookmark side would clobber the user's chosen title with whatever the
    /// page currently reports.
    pub fn apply_renames(&mut self, renames: &HashMap<String, String>) {
        for item in &mut self.items {
            if let Some(title) = renames.get(&item.url) {
                item.renamed = true;
                item.title = title.clone();
            }
        }
    }
}
