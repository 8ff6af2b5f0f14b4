//! Replays a diff batch against a workspace's bookmark subtree.
//!
//! The applier snapshots the subtree once at pass start and keeps the cache
//! current as it mutates, so node lookups never re-query the store mid-pass.
//! Folder resolution goes through the semantic `(title, color)` key: existing
//! children first, then the batch's ordered-ahead `AddGroup` payloads, then a
//! fresh folder.

use std::collections::HashMap;

use tracing::{debug, warn};

use tabshelf_core::{
    decode_bookmark_title, decode_group_folder_title, encode_bookmark_title,
    encode_group_folder_title, sort_for_apply, BookmarkId, BookmarkNode, GroupId, GroupKey,
    ItemId, NormalizedGroup, Operation, PINNED_FOLDER_TITLE,
};

use crate::browser::{BrowserApi, BrowserError, CreateBookmark};

/// Workspaces are one folder level deep; anything beyond this is ignored by
/// the traversal helpers rather than walked into.
const MAX_TREE_DEPTH: usize = 16;

pub struct BookmarkApplier<'a, B: BrowserApi + ?Sized> {
    browser: &'a B,
    root: BookmarkId,
    subtree: BookmarkNode,
    pinned_folder: Option<BookmarkId>,
}

impl<'a, B: BrowserApi + ?Sized> BookmarkApplier<'a, B> {
    /// Snapshots the workspace subtree and cleans up duplicate pinned
    /// folders. A missing subtree aborts the whole pass: the workspace no
    /// longer exists and there is nothing to apply against.
    pub async fn new(browser: &'a B, root: BookmarkId) -> Result<Self, BrowserError> {
        let subtree = browser.bookmarks_get_subtree(&root).await?;
        let mut applier = Self {
            browser,
            root,
            subtree,
            pinned_folder: None,
        };
        applier.dedup_pinned_folders().await;
        Ok(applier)
    }

    /// Applies the batch in priority order. Individual failures are logged
    /// and skipped; returns how many operations succeeded.
    pub async fn apply(&mut self, mut ops: Vec<Operation>) -> usize {
        sort_for_apply(&mut ops);

        let pending: HashMap<GroupKey, NormalizedGroup> = ops
            .iter()
            .filter_map(|op| match op {
                Operation::AddGroup { group } => Some((group.key(), group.clone())),
                _ => None,
            })
            .collect();

        let mut applied = 0;
        for op in &ops {
            match self.apply_op(op, &pending).await {
                Ok(()) => applied += 1,
                Err(error) => {
                    warn!(%error, operation = ?op, "skipping failed bookmark operation");
                }
            }
        }
        applied
    }

    /// Keeps exactly one pinned folder: the first populated one, or the first
    /// one at all when every duplicate is empty.
    async fn dedup_pinned_folders(&mut self) {
        let candidates: Vec<(BookmarkId, bool)> = self
            .subtree
            .children
            .iter()
            .filter(|child| child.is_folder() && child.title == PINNED_FOLDER_TITLE)
            .map(|child| (child.id.clone(), !child.children.is_empty()))
            .collect();
        let Some(keeper) = candidates
            .iter()
            .find(|(_, populated)| *populated)
            .or_else(|| candidates.first())
            .map(|(id, _)| id.clone())
        else {
            return;
        };

        for (id, _) in &candidates {
            if *id == keeper {
                continue;
            }
            warn!(folder = %id, keeper = %keeper, "removing duplicate pinned folder");
            match self.browser.bookmark_remove_tree(id).await {
                Ok(()) => {
                    self.cache_detach(id);
                }
                Err(error) => {
                    warn!(%error, folder = %id, "failed to remove duplicate pinned folder");
                }
            }
        }
        self.pinned_folder = Some(keeper);
    }

    async fn apply_op(
        &mut self,
        op: &Operation,
        pending: &HashMap<GroupKey, NormalizedGroup>,
    ) -> Result<(), BrowserError> {
        match op {
            Operation::AddItem { item, group } => {
                let parent = if item.pinned {
                    self.ensure_pinned_folder().await?
                } else if let Some(key) = group {
                    self.resolve_group_folder(key, pending).await?
                } else {
                    self.root.clone()
                };
                let title = encode_bookmark_title(&item.title, item.pinned);
                let node = self
                    .browser
                    .bookmark_create(CreateBookmark {
                        parent_id: parent.clone(),
                        title,
                        url: Some(item.url.clone()),
                        index: None,
                    })
                    .await?;
                self.cache_insert(&parent, node);
                Ok(())
            }
            Operation::DeleteItem { id } => {
                let id = as_bookmark(id)?.clone();
                self.browser.bookmark_remove(&id).await?;
                self.cache_detach(&id);
                Ok(())
            }
            Operation::UpdateItem { id, changes } => {
                let id = as_bookmark(id)?.clone();
                let node = self
                    .find(&id)
                    .cloned()
                    .ok_or_else(|| BrowserError::NotFound(id.to_string()))?;
                let decoded = decode_bookmark_title(&node.title);
                let in_pinned_folder = match (&node.parent_id, &self.pinned_folder) {
                    (Some(parent), Some(pinned)) => parent == pinned,
                    _ => false,
                };
                let pinned_now = changes.pinned.unwrap_or(decoded.pinned || in_pinned_folder);
                let title_now = changes.title.clone().unwrap_or(decoded.title);

                let encoded = encode_bookmark_title(&title_now, pinned_now);
                if encoded != node.title {
                    self.browser
                        .bookmark_update(&id, Some(&encoded), None)
                        .await?;
                    self.cache_set_title(&id, &encoded);
                }

                // Pin and group changes relocate the node, not just its text.
                let new_parent = if changes.pinned == Some(true) {
                    Some(self.ensure_pinned_folder().await?)
                } else if changes.pinned == Some(false) || changes.group.is_some() {
                    match &changes.group {
                        Some(Some(key)) => Some(self.resolve_group_folder(key, pending).await?),
                        _ => Some(self.root.clone()),
                    }
                } else {
                    None
                };
                if let Some(parent) = new_parent {
                    if node.parent_id.as_ref() != Some(&parent) {
                        self.browser.bookmark_move(&id, &parent, None).await?;
                        self.cache_move(&id, &parent, None);
                    }
                }

                if let Some(index) = changes.index {
                    let parent = self
                        .find(&id)
                        .and_then(|node| node.parent_id.clone())
                        .unwrap_or_else(|| self.root.clone());
                    self.browser.bookmark_move(&id, &parent, Some(index)).await?;
                    self.cache_move(&id, &parent, Some(index));
                }
                Ok(())
            }
            Operation::MoveItem { id, index } => {
                let id = as_bookmark(id)?.clone();
                let parent = self
                    .find(&id)
                    .and_then(|node| node.parent_id.clone())
                    .unwrap_or_else(|| self.root.clone());
                self.browser.bookmark_move(&id, &parent, Some(*index)).await?;
                self.cache_move(&id, &parent, Some(*index));
                Ok(())
            }
            Operation::AddGroup { group } => {
                if self.find_folder_by_key(&group.key()).is_some() {
                    return Ok(());
                }
                let title = encode_group_folder_title(&group.title, group.color, group.collapsed);
                let node = self
                    .browser
                    .bookmark_create(CreateBookmark {
                        parent_id: self.root.clone(),
                        title,
                        url: None,
                        index: None,
                    })
                    .await?;
                let root = self.root.clone();
                self.cache_insert(&root, node);
                Ok(())
            }
            Operation::DeleteGroup { id } => {
                let id = as_folder(id)?.clone();
                self.browser.bookmark_remove_tree(&id).await?;
                self.cache_detach(&id);
                Ok(())
            }
            Operation::UpdateGroup { id, changes } => {
                let id = as_folder(id)?.clone();
                if changes.index.is_some() {
                    debug!(folder = %id, "group position is not tracked on the bookmark side");
                }
                let Some(collapsed) = changes.collapsed else {
                    return Ok(());
                };
                let node = self
                    .find(&id)
                    .ok_or_else(|| BrowserError::NotFound(id.to_string()))?;
                let decoded = decode_group_folder_title(&node.title);
                // Title and color are the matching key and stay verbatim.
                let encoded = encode_group_folder_title(&decoded.title, decoded.color, collapsed);
                if encoded != node.title {
                    self.browser
                        .bookmark_update(&id, Some(&encoded), None)
                        .await?;
                    self.cache_set_title(&id, &encoded);
                }
                Ok(())
            }
        }
    }

    async fn ensure_pinned_folder(&mut self) -> Result<BookmarkId, BrowserError> {
        if let Some(id) = &self.pinned_folder {
            return Ok(id.clone());
        }
        if let Some(existing) = self
            .subtree
            .children
            .iter()
            .find(|child| child.is_folder() && child.title == PINNED_FOLDER_TITLE)
        {
            let id = existing.id.clone();
            self.pinned_folder = Some(id.clone());
            return Ok(id);
        }
        let node = self
            .browser
            .bookmark_create(CreateBookmark {
                parent_id: self.root.clone(),
                title: PINNED_FOLDER_TITLE.to_owned(),
                url: None,
                index: Some(0),
            })
            .await?;
        let id = node.id.clone();
        let root = self.root.clone();
        self.cache_insert(&root, node);
        self.pinned_folder = Some(id.clone());
        Ok(id)
    }

    /// Resolves the folder for a group key: existing children first, then a
    /// new folder styled from the batch's `AddGroup` payload when one is
    /// ordered ahead for the same key.
    async fn resolve_group_folder(
        &mut self,
        key: &GroupKey,
        pending: &HashMap<GroupKey, NormalizedGroup>,
    ) -> Result<BookmarkId, BrowserError> {
        if let Some(id) = self.find_folder_by_key(key) {
            return Ok(id);
        }
        let collapsed = pending.get(key).map(|group| group.collapsed).unwrap_or(false);
        let title = encode_group_folder_title(&key.title, key.color, collapsed);
        let node = self
            .browser
            .bookmark_create(CreateBookmark {
                parent_id: self.root.clone(),
                title,
                url: None,
                index: None,
            })
            .await?;
        let id = node.id.clone();
        let root = self.root.clone();
        self.cache_insert(&root, node);
        Ok(id)
    }

    fn find_folder_by_key(&self, key: &GroupKey) -> Option<BookmarkId> {
        self.subtree
            .children
            .iter()
            .filter(|child| child.is_folder() && child.title != PINNED_FOLDER_TITLE)
            .find(|child| {
                let decoded = decode_group_folder_title(&child.title);
                decoded.title == key.title && decoded.color == key.color
            })
            .map(|child| child.id.clone())
    }

    fn find(&self, id: &BookmarkId) -> Option<&BookmarkNode> {
        let path = path_to(&self.subtree, id)?;
        node_at(&self.subtree, &path)
    }

    fn cache_set_title(&mut self, id: &BookmarkId, title: &str) {
        if let Some(path) = path_to(&self.subtree, id) {
            if let Some(node) = node_at_mut(&mut self.subtree, &path) {
                node.title = title.to_owned();
            }
        }
    }

    fn cache_detach(&mut self, id: &BookmarkId) -> Option<BookmarkNode> {
        let path = path_to(&self.subtree, id)?;
        let (last, parent_path) = path.split_last()?;
        let parent = node_at_mut(&mut self.subtree, parent_path)?;
        Some(parent.children.remove(*last))
    }

    fn cache_insert(&mut self, parent: &BookmarkId, mut node: BookmarkNode) {
        node.parent_id = Some(parent.clone());
        if let Some(path) = path_to(&self.subtree, parent) {
            if let Some(parent_node) = node_at_mut(&mut self.subtree, &path) {
                parent_node.children.push(node);
            }
        }
    }

    fn cache_move(&mut self, id: &BookmarkId, parent: &BookmarkId, index: Option<u32>) {
        let Some(mut node) = self.cache_detach(id) else {
            return;
        };
        node.parent_id = Some(parent.clone());
        if let Some(path) = path_to(&self.subtree, parent) {
            if let Some(parent_node) = node_at_mut(&mut self.subtree, &path) {
                let position = index
                    .map(|index| (index as usize).min(parent_node.children.len()))
                    .unwrap_or(parent_node.children.len());
                parent_node.children.insert(position, node);
            }
        }
    }
}

fn as_bookmark(id: &ItemId) -> Result<&BookmarkId, BrowserError> {
    match id {
        ItemId::Bookmark(id) => Ok(id),
        ItemId::Tab(id) => Err(BrowserError::InvalidData(format!(
            "{id} cannot be applied to a bookmark subtree"
        ))),
    }
}

fn as_folder(id: &GroupId) -> Result<&BookmarkId, BrowserError> {
    match id {
        GroupId::Folder(id) => Ok(id),
        GroupId::Tab(id) => Err(BrowserError::InvalidData(format!(
            "{id} cannot be applied to a bookmark subtree"
        ))),
    }
}

/// Iterative lookup of the index path leading to `id`, depth-bounded so a
/// pathological tree cannot grow the stack.
fn path_to(root: &BookmarkNode, id: &BookmarkId) -> Option<Vec<usize>> {
    let mut stack: Vec<Vec<usize>> = vec![Vec::new()];
    while let Some(path) = stack.pop() {
        let Some(node) = node_at(root, &path) else {
            continue;
        };
        if &node.id == id {
            return Some(path);
        }
        if path.len() >= MAX_TREE_DEPTH {
            continue;
        }
        for child_index in 0..node.children.len() {
            let mut child_path = path.clone();
            child_path.push(child_index);
            stack.push(child_path);
        }
    }
    None
}

fn node_at<'t>(root: &'t BookmarkNode, path: &[usize]) -> Option<&'t BookmarkNode> {
    let mut node = root;
    for index in path {
        node = node.children.get(*index)?;
    }
    Some(node)
}

fn node_at_mut<'t>(root: &'t mut BookmarkNode, path: &[usize]) -> Option<&'t mut BookmarkNode> {
    let mut node = root;
    for index in path {
        node = node.children.get_mut(*index)?;
    }
    Some(node)
}
