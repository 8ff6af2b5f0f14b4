//! The stateful coordinator that drives reconciliation passes.
//!
//! Per-workspace state machine: `Idle → Debouncing → Syncing → Idle`. A
//! request that arrives while debouncing resets the timer; a request that
//! arrives while syncing is dropped outright (the next organic event
//! re-triggers a pass, so nothing is permanently lost). Workspaces never
//! serialize against each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use tabshelf_core::{
    diff, from_bookmark_tree, from_live_state, has_changes, BookmarkId, BookmarkNode,
    NormalizedState, Operation, TabId, WindowId, WORKSPACES_FOLDER_TITLE,
};

use crate::bookmarks::BookmarkApplier;
use crate::browser::{BrowserApi, BrowserError, CreateBookmark, CreateTab, UpdateTabGroup};
use crate::link::LinkStore;
use crate::tabs::TabApplier;

const MAX_TREE_DEPTH: usize = 16;

/// Tunables of the observable contract; tests assert on the defaults under
/// paused time.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Window over which rapid sync requests coalesce into one pass.
    pub debounce: Duration,
    /// Tabs created per chunk during a workspace restore.
    pub batch_size: usize,
    /// Pause between restore chunks, to stay under platform rate limits.
    pub batch_delay: Duration,
    /// How long to wait for a restored tab to report metadata before
    /// discarding it anyway.
    pub tab_ready_timeout: Duration,
    /// Poll interval while waiting for tab metadata.
    pub tab_ready_poll: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            batch_size: 10,
            batch_delay: Duration::from_millis(200),
            tab_ready_timeout: Duration::from_millis(3000),
            tab_ready_poll: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(BookmarkId),

    #[error("no window linked to workspace {0}")]
    WindowNotLinked(BookmarkId),

    #[error("a workspace load is already in progress")]
    LoadInProgress,

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

#[derive(Default)]
struct WorkspaceSyncState {
    syncing: bool,
    pending: Option<JoinHandle<()>>,
    /// url → title the user chose. Neither representation encodes the
    /// renamed flag, so it lives here for the lifetime of the orchestrator.
    renames: HashMap<String, String>,
}

struct Inner<B: BrowserApi> {
    browser: B,
    links: Arc<dyn LinkStore>,
    config: SyncConfig,
    workspaces: Mutex<HashMap<BookmarkId, WorkspaceSyncState>>,
    /// Re-entrancy guard: while a restore is writing tabs, the tab events it
    /// causes must not bounce back into another sync pass.
    loading: AtomicBool,
}

pub struct SyncOrchestrator<B: BrowserApi + 'static> {
    inner: Arc<Inner<B>>,
}

impl<B: BrowserApi + 'static> Clone for SyncOrchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BrowserApi + 'static> SyncOrchestrator<B> {
    pub fn new(browser: B, links: Arc<dyn LinkStore>, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                browser,
                links,
                config,
                workspaces: Mutex::new(HashMap::new()),
                loading: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::SeqCst)
    }

    pub fn link_window(&self, window: WindowId, workspace: BookmarkId) {
        self.inner.links.link(window, workspace);
    }

    pub fn unlink_window(&self, window: WindowId) {
        self.inner.links.unlink_window(window);
    }

    /// Debounced request for a window → workspace pass. Must be called from
    /// within a tokio runtime; the timer task owns the actual pass.
    pub fn request_sync(&self, workspace: BookmarkId) {
        if self.is_loading() {
            debug!(workspace = %workspace, "restore in progress; dropping sync request");
            return;
        }

        let inner = Arc::clone(&self.inner);
        let fired_for = workspace.clone();
        let handle = tokio::spawn(async move {
            sleep(inner.config.debounce).await;
            Inner::debounce_fired(&inner, &fired_for).await;
        });

        let mut workspaces = self
            .inner
            .workspaces
            .lock()
            .expect("workspace state lock poisoned");
        let state = workspaces.entry(workspace).or_default();
        if let Some(previous) = state.pending.take() {
            previous.abort();
        }
        state.pending = Some(handle);
    }

    /// Runs a window → workspace pass immediately, skipping the debounce but
    /// honoring the one-pass-per-workspace guarantee: if a pass is already in
    /// flight the request is dropped, same as a timer firing mid-sync.
    pub async fn sync_now(&self, workspace: &BookmarkId) -> Result<(), SyncError> {
        if !Inner::begin_sync(&self.inner, workspace) {
            return Ok(());
        }
        let result = Inner::window_to_workspace(&self.inner, workspace).await;
        Inner::end_sync(&self.inner, workspace);
        result
    }

    /// The reverse-direction pass: bookmarks are the source, the linked
    /// window's tabs are the target, applied incrementally.
    pub async fn sync_to_window(&self, workspace: &BookmarkId) -> Result<(), SyncError> {
        if !Inner::begin_sync(&self.inner, workspace) {
            return Ok(());
        }
        let result = Inner::workspace_to_window(&self.inner, workspace).await;
        Inner::end_sync(&self.inner, workspace);
        result
    }

    /// Creates a workspace folder from the window's current live state and
    /// links the window to it for continuous sync.
    pub async fn create_workspace(
        &self,
        window: WindowId,
        name: &str,
    ) -> Result<BookmarkId, SyncError> {
        let root = Inner::ensure_workspaces_root(&self.inner).await?;
        let folder = self
            .inner
            .browser
            .bookmark_create(CreateBookmark {
                parent_id: root,
                title: name.to_owned(),
                url: None,
                index: None,
            })
            .await?;
        self.inner.links.link(window, folder.id.clone());
        self.sync_now(&folder.id).await?;
        info!(workspace = %folder.id, name, "created workspace");
        Ok(folder.id)
    }

    pub async fn list_workspaces(&self) -> Result<Vec<(BookmarkId, String)>, SyncError> {
        let tree = self.inner.browser.bookmarks_get_tree().await?;
        let Some(root) = find_folder_titled(&tree, WORKSPACES_FOLDER_TITLE) else {
            return Ok(Vec::new());
        };
        let children = self.inner.browser.bookmarks_get_children(&root.id).await?;
        Ok(children
            .into_iter()
            .filter(|child| child.is_folder())
            .map(|child| (child.id, child.title))
            .collect())
    }

    pub async fn delete_workspace(&self, workspace: &BookmarkId) -> Result<(), SyncError> {
        {
            let mut workspaces = self
                .inner
                .workspaces
                .lock()
                .expect("workspace state lock poisoned");
            if let Some(state) = workspaces.remove(workspace) {
                if let Some(pending) = state.pending {
                    pending.abort();
                }
            }
        }
        self.inner.links.unlink_workspace(workspace);
        self.inner.browser.bookmark_remove_tree(workspace).await?;
        info!(workspace = %workspace, "deleted workspace");
        Ok(())
    }

    /// Restores a workspace into a window (the given one, or a fresh one).
    /// Tabs are created in chunks with a pause between them, groups are
    /// formed once every member tab exists, and background tabs are only
    /// discarded after their metadata arrived or the bounded wait elapsed.
    pub async fn load_workspace(
        &self,
        workspace: &BookmarkId,
        window: Option<WindowId>,
    ) -> Result<WindowId, SyncError> {
        if self.inner.loading.swap(true, Ordering::SeqCst) {
            return Err(SyncError::LoadInProgress);
        }
        let result = Inner::load_workspace(&self.inner, workspace, window).await;
        self.inner.loading.store(false, Ordering::SeqCst);
        result
    }
}

impl<B: BrowserApi + 'static> Inner<B> {
    /// Atomically claims the per-workspace busy flag. Returns false when a
    /// pass is already in flight or a restore holds the re-entrancy guard.
    fn begin_sync(inner: &Arc<Self>, workspace: &BookmarkId) -> bool {
        if inner.loading.load(Ordering::SeqCst) {
            debug!(workspace = %workspace, "restore in progress; dropping sync");
            return false;
        }
        let mut workspaces = inner
            .workspaces
            .lock()
            .expect("workspace state lock poisoned");
        let state = workspaces.entry(workspace.clone()).or_default();
        if state.syncing {
            debug!(workspace = %workspace, "sync already in flight; dropping request");
            return false;
        }
        state.syncing = true;
        true
    }

    fn end_sync(inner: &Arc<Self>, workspace: &BookmarkId) {
        let mut workspaces = inner
            .workspaces
            .lock()
            .expect("workspace state lock poisoned");
        if let Some(state) = workspaces.get_mut(workspace) {
            state.syncing = false;
        }
    }

    async fn debounce_fired(inner: &Arc<Self>, workspace: &BookmarkId) {
        {
            let mut workspaces = inner
                .workspaces
                .lock()
                .expect("workspace state lock poisoned");
            if let Some(state) = workspaces.get_mut(workspace) {
                state.pending = None;
            }
        }
        if !Self::begin_sync(inner, workspace) {
            return;
        }
        // The pass runs detached from the abortable timer task: once a
        // workspace enters Syncing there is no cancelling it, only
        // per-operation failure tolerance.
        let inner = Arc::clone(inner);
        let workspace = workspace.clone();
        tokio::spawn(async move {
            if let Err(error) = Self::window_to_workspace(&inner, &workspace).await {
                warn!(%error, workspace = %workspace, "failed to sync workspace");
            }
            Self::end_sync(&inner, &workspace);
        });
    }

    fn renames_snapshot(inner: &Arc<Self>, workspace: &BookmarkId) -> HashMap<String, String> {
        inner
            .workspaces
            .lock()
            .expect("workspace state lock poisoned")
            .get(workspace)
            .map(|state| state.renames.clone())
            .unwrap_or_default()
    }

    fn record_renames(
        inner: &Arc<Self>,
        workspace: &BookmarkId,
        new_renames: Vec<(String, String)>,
    ) -> HashMap<String, String> {
        let mut workspaces = inner
            .workspaces
            .lock()
            .expect("workspace state lock poisoned");
        let state = workspaces.entry(workspace.clone()).or_default();
        for (url, title) in new_renames {
            state.renames.insert(url, title);
        }
        state.renames.clone()
    }

    async fn load_live_state(
        inner: &Arc<Self>,
        window: WindowId,
    ) -> NormalizedState {
        let tabs = match inner.browser.tabs_query(Some(window)).await {
            Ok(tabs) => tabs,
            Err(error) => {
                warn!(%error, window = %window, "failed to query tabs; treating window as empty");
                Vec::new()
            }
        };
        let groups = match inner.browser.tab_groups_query(window).await {
            Ok(groups) => groups,
            Err(error) => {
                warn!(%error, window = %window, "failed to query tab groups; treating window as ungrouped");
                Vec::new()
            }
        };
        from_live_state(&tabs, &groups)
    }

    async fn load_workspace_state(
        inner: &Arc<Self>,
        workspace: &BookmarkId,
    ) -> Result<(BookmarkNode, NormalizedState), SyncError> {
        let subtree = match inner.browser.bookmarks_get_subtree(workspace).await {
            Ok(subtree) => subtree,
            Err(BrowserError::NotFound(_)) => {
                return Err(SyncError::WorkspaceNotFound(workspace.clone()))
            }
            Err(error) => return Err(error.into()),
        };
        let state = from_bookmark_tree(&subtree);
        Ok((subtree, state))
    }

    fn log_violations(state: &NormalizedState, side: &'static str) {
        for violation in state.validate() {
            warn!(%violation, side, "normalized state violation");
        }
    }

    /// One full window → workspace pass. The bookmark side is rebuilt with a
    /// full replace rather than patched incrementally: that keeps the pinned
    /// and group folder lifecycle simple, and nothing depends on bookmark ids
    /// surviving across syncs.
    async fn window_to_workspace(
        inner: &Arc<Self>,
        workspace: &BookmarkId,
    ) -> Result<(), SyncError> {
        let window = inner
            .links
            .window_for_workspace(workspace)
            .ok_or_else(|| SyncError::WindowNotLinked(workspace.clone()))?;

        let mut live = Self::load_live_state(inner, window).await;
        let (subtree, mut target) = Self::load_workspace_state(inner, workspace).await?;

        let renames = Self::renames_snapshot(inner, workspace);
        live.apply_renames(&renames);
        target.mark_renamed(&renames);
        Self::log_violations(&live, "live");
        Self::log_violations(&target, "workspace");

        let ops = diff(&live, &target);
        if !has_changes(&ops) {
            debug!(workspace = %workspace, "no changes; skipping write pass");
            return Ok(());
        }

        // In this direction the bookmark side carries the user's deliberate
        // titles: a divergence noticed for the first time records the target
        // title so it survives the rebuild below and every later sync.
        let mut new_renames = Vec::new();
        for op in &ops {
            if let Operation::UpdateItem { id, changes } = op {
                if changes.renamed == Some(true) {
                    if let Some(item) = target.items.iter().find(|item| &item.id == id) {
                        new_renames.push((item.url.clone(), item.title.clone()));
                    }
                }
            }
        }
        let renames = Self::record_renames(inner, workspace, new_renames);
        live.apply_renames(&renames);

        for child in &subtree.children {
            let removed = if child.is_folder() {
                inner.browser.bookmark_remove_tree(&child.id).await
            } else {
                inner.browser.bookmark_remove(&child.id).await
            };
            if let Err(error) = removed {
                warn!(%error, node = %child.id, "failed to clear workspace child");
            }
        }

        let rebuild = diff(&live, &NormalizedState::default());
        let mut applier = BookmarkApplier::new(&inner.browser, workspace.clone()).await?;
        let applied = applier.apply(rebuild).await;
        info!(workspace = %workspace, applied, "workspace rebuilt from live state");
        Ok(())
    }

    /// One workspace → window pass, applied incrementally through the tab
    /// applier. This is where bookmark-side edits (renames included) flow
    /// back toward the live window.
    async fn workspace_to_window(
        inner: &Arc<Self>,
        workspace: &BookmarkId,
    ) -> Result<(), SyncError> {
        let window = inner
            .links
            .window_for_workspace(workspace)
            .ok_or_else(|| SyncError::WindowNotLinked(workspace.clone()))?;

        let (_, mut source) = Self::load_workspace_state(inner, workspace).await?;
        let mut target = Self::load_live_state(inner, window).await;

        let renames = Self::renames_snapshot(inner, workspace);
        source.mark_renamed(&renames);
        target.apply_renames(&renames);
        Self::log_violations(&source, "workspace");
        Self::log_violations(&target, "live");

        let ops = diff(&source, &target);
        if !has_changes(&ops) {
            debug!(workspace = %workspace, "no changes; skipping write pass");
            return Ok(());
        }

        // The bookmark side is the source here, so a freshly noticed rename
        // carries the user title in the staged change itself.
        let mut new_renames = Vec::new();
        for op in &ops {
            if let Operation::UpdateItem { id, changes } = op {
                if changes.renamed == Some(true) {
                    if let (Some(title), Some(item)) = (
                        changes.title.as_ref(),
                        target.items.iter().find(|item| &item.id == id),
                    ) {
                        new_renames.push((item.url.clone(), title.clone()));
                    }
                }
            }
        }
        Self::record_renames(inner, workspace, new_renames);

        let applied = TabApplier::new(&inner.browser, window).apply(ops).await;
        info!(workspace = %workspace, applied, "window updated from workspace");
        Ok(())
    }

    async fn ensure_workspaces_root(inner: &Arc<Self>) -> Result<BookmarkId, SyncError> {
        let tree = inner.browser.bookmarks_get_tree().await?;
        if let Some(existing) = find_folder_titled(&tree, WORKSPACES_FOLDER_TITLE) {
            return Ok(existing.id.clone());
        }
        let created = inner
            .browser
            .bookmark_create(CreateBookmark {
                parent_id: tree.id.clone(),
                title: WORKSPACES_FOLDER_TITLE.to_owned(),
                url: None,
                index: None,
            })
            .await?;
        Ok(created.id)
    }

    async fn load_workspace(
        inner: &Arc<Self>,
        workspace: &BookmarkId,
        window: Option<WindowId>,
    ) -> Result<WindowId, SyncError> {
        let (_, state) = Self::load_workspace_state(inner, workspace).await?;

        let window_id = match window {
            Some(id) => {
                inner.browser.window_get(id).await?;
                id
            }
            None => inner.browser.window_create().await?.id,
        };

        let mut created: Vec<(TabId, Option<tabshelf_core::GroupId>)> = Vec::new();
        for (chunk_index, chunk) in state.items.chunks(inner.config.batch_size).enumerate() {
            if chunk_index > 0 {
                sleep(inner.config.batch_delay).await;
            }
            for item in chunk {
                let result = inner
                    .browser
                    .tab_create(CreateTab {
                        window_id,
                        url: item.url.clone(),
                        index: None,
                        pinned: item.pinned,
                        active: created.is_empty(),
                    })
                    .await;
                match result {
                    Ok(tab) => {
                        if let Some(id) = tab.id {
                            created.push((id, item.group.clone()));
                        }
                    }
                    Err(error) => {
                        warn!(%error, url = %item.url, "failed to create tab during restore");
                    }
                }
            }
        }

        // Group creation is deferred until every member exists, so one
        // group() call encloses the whole set.
        for group in &state.groups {
            let members: Vec<TabId> = created
                .iter()
                .filter(|(_, item_group)| item_group.as_ref() == Some(&group.id))
                .map(|(id, _)| *id)
                .collect();
            if members.is_empty() {
                continue;
            }
            match inner.browser.tabs_group(&members, None).await {
                Ok(group_id) => {
                    let style = UpdateTabGroup {
                        title: Some(group.title.clone()),
                        color: Some(group.color),
                        collapsed: Some(group.collapsed),
                    };
                    if let Err(error) = inner.browser.tab_group_update(group_id, style).await {
                        warn!(%error, group = %group_id, "restored group could not be styled");
                    }
                }
                Err(error) => {
                    warn!(%error, title = %group.title, "failed to group restored tabs");
                }
            }
        }

        // Discarding before metadata arrives leaves permanently blank tabs;
        // wait for each background tab, bounded, then suspend it.
        for (tab_id, _) in created.iter().skip(1) {
            Self::wait_for_tab_metadata(inner, *tab_id).await;
            if let Err(error) = inner.browser.tab_discard(*tab_id).await {
                warn!(%error, tab = %tab_id, "failed to discard restored tab");
            }
        }

        inner.links.link(window_id, workspace.clone());
        info!(workspace = %workspace, window = %window_id, tabs = created.len(), "workspace restored");
        Ok(window_id)
    }

    async fn wait_for_tab_metadata(inner: &Arc<Self>, tab_id: TabId) {
        let deadline = Instant::now() + inner.config.tab_ready_timeout;
        loop {
            match inner.browser.tab_get(tab_id).await {
                Ok(tab) => {
                    if tab.title.as_deref().is_some_and(|title| !title.is_empty()) {
                        return;
                    }
                }
                // The tab is already gone; nothing to wait for.
                Err(_) => return,
            }
            if Instant::now() >= deadline {
                warn!(tab = %tab_id, "tab metadata never arrived; discarding anyway");
                return;
            }
            sleep(inner.config.tab_ready_poll).await;
        }
    }
}

/// Iterative, depth-bounded search for the first folder with an exact title.
fn find_folder_titled<'t>(root: &'t BookmarkNode, title: &str) -> Option<&'t BookmarkNode> {
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        if node.is_folder() && node.title == title {
            return Some(node);
        }
        if depth < MAX_TREE_DEPTH {
            for child in &node.children {
                stack.push((child, depth + 1));
            }
        }
    }
    None
}
