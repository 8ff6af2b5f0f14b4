//! Replays a diff batch against a live window's tabs.
//!
//! Group containers are resolved by semantic key through a pass-local map
//! seeded from the window's existing groups. `AddGroup` is a placeholder on
//! this side: tab groups cannot exist empty, so a group materializes with the
//! first grouped tab and then receives its title/color/collapsed state.

use std::collections::HashMap;

use tracing::{debug, warn};

use tabshelf_core::{
    sort_for_apply, GroupId, GroupKey, ItemId, NormalizedGroup, Operation, TabGroupId, TabId,
    WindowId, UNNAMED_GROUP_TITLE,
};

use crate::browser::{BrowserApi, BrowserError, CreateTab, UpdateTab, UpdateTabGroup};

pub struct TabApplier<'a, B: BrowserApi + ?Sized> {
    browser: &'a B,
    window_id: WindowId,
}

impl<'a, B: BrowserApi + ?Sized> TabApplier<'a, B> {
    pub fn new(browser: &'a B, window_id: WindowId) -> Self {
        Self { browser, window_id }
    }

    /// Applies the batch in priority order. Individual failures are logged
    /// and skipped; returns how many operations succeeded.
    pub async fn apply(&self, mut ops: Vec<Operation>) -> usize {
        sort_for_apply(&mut ops);

        let mut groups = self.existing_groups().await;
        let pending: HashMap<GroupKey, NormalizedGroup> = ops
            .iter()
            .filter_map(|op| match op {
                Operation::AddGroup { group } => Some((group.key(), group.clone())),
                _ => None,
            })
            .collect();

        let mut applied = 0;
        for op in &ops {
            match self.apply_op(op, &mut groups, &pending).await {
                Ok(()) => applied += 1,
                Err(error) => {
                    warn!(%error, operation = ?op, "skipping failed tab operation");
                }
            }
        }
        applied
    }

    async fn existing_groups(&self) -> HashMap<GroupKey, TabGroupId> {
        match self.browser.tab_groups_query(self.window_id).await {
            Ok(groups) => groups
                .into_iter()
                .map(|group| {
                    // Untitled groups key the same way the normalizer keys
                    // them, so lookups agree across representations.
                    let title = group
                        .title
                        .filter(|title| !title.is_empty())
                        .unwrap_or_else(|| UNNAMED_GROUP_TITLE.to_owned());
                    (
                        GroupKey {
                            title,
                            color: group.color,
                        },
                        group.id,
                    )
                })
                .collect(),
            Err(error) => {
                warn!(%error, window = %self.window_id, "failed to query tab groups; starting empty");
                HashMap::new()
            }
        }
    }

    async fn apply_op(
        &self,
        op: &Operation,
        groups: &mut HashMap<GroupKey, TabGroupId>,
        pending: &HashMap<GroupKey, NormalizedGroup>,
    ) -> Result<(), BrowserError> {
        match op {
            Operation::AddItem { item, group } => {
                let tab = self
                    .browser
                    .tab_create(CreateTab {
                        window_id: self.window_id,
                        url: item.url.clone(),
                        index: Some(item.index),
                        pinned: item.pinned,
                        active: false,
                    })
                    .await?;
                if let (Some(key), Some(tab_id)) = (group, tab.id) {
                    self.join_group(tab_id, key, groups, pending).await?;
                }
                Ok(())
            }
            Operation::DeleteItem { id } => {
                let tab_id = as_tab(id)?;
                self.browser.tab_remove(tab_id).await
            }
            Operation::UpdateItem { id, changes } => {
                let tab_id = as_tab(id)?;
                if changes.title.is_some() || changes.renamed.is_some() {
                    // The platform owns live tab titles; renames only exist in
                    // the engine's bookkeeping on this side.
                    debug!(tab = %tab_id, "title change has no live-tab counterpart");
                }
                if let Some(pinned) = changes.pinned {
                    self.browser
                        .tab_update(
                            tab_id,
                            UpdateTab {
                                url: None,
                                pinned: Some(pinned),
                            },
                        )
                        .await?;
                }
                match &changes.group {
                    Some(Some(key)) => self.join_group(tab_id, key, groups, pending).await?,
                    Some(None) => self.browser.tabs_ungroup(&[tab_id]).await?,
                    None => {}
                }
                if let Some(index) = changes.index {
                    self.browser.tab_move(tab_id, index).await?;
                }
                Ok(())
            }
            Operation::MoveItem { id, index } => {
                let tab_id = as_tab(id)?;
                self.browser.tab_move(tab_id, *index).await
            }
            // Placeholder: the group comes into existence with its first
            // grouped tab.
            Operation::AddGroup { .. } => Ok(()),
            Operation::DeleteGroup { id } => {
                let group_id = as_tab_group(id)?;
                let members: Vec<TabId> = self
                    .browser
                    .tabs_query(Some(self.window_id))
                    .await?
                    .into_iter()
                    .filter(|tab| tab.group_id == Some(group_id))
                    .filter_map(|tab| tab.id)
                    .collect();
                if members.is_empty() {
                    return Ok(());
                }
                self.browser.tabs_ungroup(&members).await
            }
            Operation::UpdateGroup { id, changes } => {
                let group_id = as_tab_group(id)?;
                if changes.index.is_some() {
                    debug!(group = %group_id, "group position change has no live counterpart");
                }
                if changes.collapsed.is_none() {
                    return Ok(());
                }
                self.browser
                    .tab_group_update(
                        group_id,
                        UpdateTabGroup {
                            title: None,
                            color: None,
                            collapsed: changes.collapsed,
                        },
                    )
                    .await
            }
        }
    }

    /// Puts a tab into the group matching `key`, creating the group (and
    /// styling it from the batch's `AddGroup` payload) when it does not exist
    /// in the window yet.
    async fn join_group(
        &self,
        tab_id: TabId,
        key: &GroupKey,
        groups: &mut HashMap<GroupKey, TabGroupId>,
        pending: &HashMap<GroupKey, NormalizedGroup>,
    ) -> Result<(), BrowserError> {
        if let Some(group_id) = groups.get(key) {
            self.browser.tabs_group(&[tab_id], Some(*group_id)).await?;
            return Ok(());
        }

        let group_id = self.browser.tabs_group(&[tab_id], None).await?;
        groups.insert(key.clone(), group_id);
        let style = UpdateTabGroup {
            title: Some(key.title.clone()),
            color: Some(key.color),
            collapsed: pending.get(key).map(|group| group.collapsed),
        };
        if let Err(error) = self.browser.tab_group_update(group_id, style).await {
            warn!(%error, group = %group_id, "created group could not be styled");
        }
        Ok(())
    }
}

fn as_tab(id: &ItemId) -> Result<TabId, BrowserError> {
    match id {
        ItemId::Tab(id) => Ok(*id),
        ItemId::Bookmark(id) => Err(BrowserError::InvalidData(format!(
            "{id} cannot be applied to a live window"
        ))),
    }
}

fn as_tab_group(id: &GroupId) -> Result<TabGroupId, BrowserError> {
    match id {
        GroupId::Tab(id) => Ok(*id),
        GroupId::Folder(id) => Err(BrowserError::InvalidData(format!(
            "folder {id} cannot be applied to a live window"
        ))),
    }
}
