//! In-memory browser used by the crate's tests: a small window/tab/group
//! model plus a bookmark arena, with an event log for asserting on the exact
//! calls a pass made.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use tabshelf_core::{
    BookmarkId, BookmarkNode, GroupColor, Tab, TabGroup, TabGroupId, TabId, Window, WindowId,
};

use crate::browser::{
    BrowserApi, BrowserError, CreateBookmark, CreateTab, UpdateTab, UpdateTabGroup,
};

#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    WindowCreated(WindowId),
    TabCreated { id: TabId, url: String, pinned: bool },
    TabUpdated(TabId),
    TabRemoved(TabId),
    TabMoved { id: TabId, index: u32 },
    TabsGrouped { ids: Vec<TabId>, group: TabGroupId },
    TabsUngrouped(Vec<TabId>),
    TabDiscarded(TabId),
    GroupUpdated(TabGroupId),
    BookmarkCreated { id: BookmarkId, parent: BookmarkId, title: String, url: Option<String> },
    BookmarkUpdated { id: BookmarkId, title: Option<String> },
    BookmarkRemoved(BookmarkId),
    BookmarkTreeRemoved(BookmarkId),
    BookmarkMoved { id: BookmarkId, parent: BookmarkId },
}

#[derive(Debug, Clone)]
struct StoredBookmark {
    parent: Option<BookmarkId>,
    title: String,
    url: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    next_window_id: u64,
    next_tab_id: u64,
    next_group_id: u64,
    next_bookmark_id: u64,
    windows: Vec<Window>,
    tabs: Vec<Tab>,
    groups: Vec<TabGroup>,
    bookmarks: HashMap<BookmarkId, StoredBookmark>,
    children: HashMap<BookmarkId, Vec<BookmarkId>>,
    events: Vec<MockEvent>,
    fail: HashSet<&'static str>,
    withhold_titles: bool,
}

pub struct MockBrowser {
    root: BookmarkId,
    state: Mutex<MockState>,
}

impl Default for MockBrowser {
    fn default() -> Self {
        let root = BookmarkId::new("root");
        let mut state = MockState::default();
        state.bookmarks.insert(
            root.clone(),
            StoredBookmark {
                parent: None,
                title: String::new(),
                url: None,
            },
        );
        state.children.insert(root.clone(), Vec::new());
        Self {
            root,
            state: Mutex::new(state),
        }
    }
}

impl MockBrowser {
    pub fn root_id(&self) -> BookmarkId {
        self.root.clone()
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().expect("mock state poisoned").events.clone()
    }

    /// Makes every call of the named trait method fail.
    pub fn fail_on(&self, method: &'static str) {
        self.state
            .lock()
            .expect("mock state poisoned")
            .fail
            .insert(method);
    }

    /// Created tabs keep an empty title, simulating pages that never report
    /// metadata.
    pub fn withhold_titles(&self, withhold: bool) {
        self.state.lock().expect("mock state poisoned").withhold_titles = withhold;
    }

    pub fn add_window(&self) -> WindowId {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.next_window_id += 1;
        let id = WindowId(state.next_window_id);
        state.windows.push(Window { id, focused: false });
        id
    }

    pub fn add_tab(
        &self,
        window_id: WindowId,
        url: &str,
        title: Option<&str>,
        pinned: bool,
        group: Option<TabGroupId>,
    ) -> TabId {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.next_tab_id += 1;
        let id = TabId(state.next_tab_id);
        let index = state
            .tabs
            .iter()
            .filter(|tab| tab.window_id == window_id)
            .count() as u32;
        state.tabs.push(Tab {
            id: Some(id),
            window_id,
            url: Some(url.to_owned()),
            title: title.map(str::to_owned),
            pinned,
            index,
            group_id: group,
            active: false,
            discarded: false,
            fav_icon_url: None,
        });
        id
    }

    pub fn add_group(
        &self,
        window_id: WindowId,
        title: &str,
        color: GroupColor,
        collapsed: bool,
    ) -> TabGroupId {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.next_group_id += 1;
        let id = TabGroupId(state.next_group_id);
        state.groups.push(TabGroup {
            id,
            window_id,
            title: Some(title.to_owned()),
            color,
            collapsed,
        });
        id
    }

    pub fn add_folder(&self, parent: &BookmarkId, title: &str) -> BookmarkId {
        self.insert_bookmark(parent, title, None)
    }

    pub fn add_bookmark(&self, parent: &BookmarkId, title: &str, url: &str) -> BookmarkId {
        self.insert_bookmark(parent, title, Some(url.to_owned()))
    }

    pub fn tabs_snapshot(&self, window_id: WindowId) -> Vec<Tab> {
        let state = self.state.lock().expect("mock state poisoned");
        let mut tabs: Vec<Tab> = state
            .tabs
            .iter()
            .filter(|tab| tab.window_id == window_id)
            .cloned()
            .collect();
        tabs.sort_by_key(|tab| tab.index);
        tabs
    }

    pub fn groups_snapshot(&self, window_id: WindowId) -> Vec<TabGroup> {
        let state = self.state.lock().expect("mock state poisoned");
        state
            .groups
            .iter()
            .filter(|group| group.window_id == window_id)
            .cloned()
            .collect()
    }

    pub fn node(&self, id: &BookmarkId) -> Option<BookmarkNode> {
        let state = self.state.lock().expect("mock state poisoned");
        state.subtree(id)
    }

    fn insert_bookmark(&self, parent: &BookmarkId, title: &str, url: Option<String>) -> BookmarkId {
        let mut state = self.state.lock().expect("mock state poisoned");
        let id = state.allocate_bookmark_id();
        state.bookmarks.insert(
            id.clone(),
            StoredBookmark {
                parent: Some(parent.clone()),
                title: title.to_owned(),
                url: url.clone(),
            },
        );
        if url.is_none() {
            state.children.insert(id.clone(), Vec::new());
        }
        state
            .children
            .entry(parent.clone())
            .or_default()
            .push(id.clone());
        id
    }
}

impl MockState {
    fn allocate_bookmark_id(&mut self) -> BookmarkId {
        self.next_bookmark_id += 1;
        BookmarkId::new(format!("bm{}", self.next_bookmark_id))
    }

    fn check(&self, method: &'static str) -> Result<(), BrowserError> {
        if self.fail.contains(method) {
            Err(BrowserError::OperationFailed(format!(
                "mock failure injected for {method}"
            )))
        } else {
            Ok(())
        }
    }

    fn subtree(&self, id: &BookmarkId) -> Option<BookmarkNode> {
        let stored = self.bookmarks.get(id)?;
        let children = self
            .children
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|child| self.subtree(child))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let index = stored.parent.as_ref().and_then(|parent| {
            self.children
                .get(parent)
                .and_then(|siblings| siblings.iter().position(|sibling| sibling == id))
                .map(|position| position as u32)
        });
        Some(BookmarkNode {
            id: id.clone(),
            parent_id: stored.parent.clone(),
            index,
            title: stored.title.clone(),
            url: stored.url.clone(),
            children,
        })
    }

    fn renumber_window(&mut self, window_id: WindowId) {
        let mut ids: Vec<TabId> = {
            let mut tabs: Vec<&Tab> = self
                .tabs
                .iter()
                .filter(|tab| tab.window_id == window_id)
                .collect();
            tabs.sort_by_key(|tab| tab.index);
            tabs.iter().filter_map(|tab| tab.id).collect()
        };
        let mut index = 0u32;
        for id in ids.drain(..) {
            if let Some(tab) = self.tabs.iter_mut().find(|tab| tab.id == Some(id)) {
                tab.index = index;
                index += 1;
            }
        }
    }

    fn remove_subtree(&mut self, id: &BookmarkId) {
        if let Some(children) = self.children.remove(id) {
            for child in children {
                self.remove_subtree(&child);
            }
        }
        self.bookmarks.remove(id);
    }

    fn detach_from_parent(&mut self, id: &BookmarkId) {
        let parent = self.bookmarks.get(id).and_then(|stored| stored.parent.clone());
        if let Some(parent) = parent {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|sibling| sibling != id);
            }
        }
    }
}

#[async_trait]
impl BrowserApi for MockBrowser {
    async fn tabs_query(&self, window_id: Option<WindowId>) -> Result<Vec<Tab>, BrowserError> {
        let state = self.state.lock().expect("mock state poisoned");
        state.check("tabs_query")?;
        let mut tabs: Vec<Tab> = state
            .tabs
            .iter()
            .filter(|tab| window_id.is_none_or(|id| tab.window_id == id))
            .cloned()
            .collect();
        tabs.sort_by_key(|tab| tab.index);
        Ok(tabs)
    }

    async fn tab_get(&self, id: TabId) -> Result<Tab, BrowserError> {
        let state = self.state.lock().expect("mock state poisoned");
        state.check("tab_get")?;
        state
            .tabs
            .iter()
            .find(|tab| tab.id == Some(id))
            .cloned()
            .ok_or_else(|| BrowserError::NotFound(id.to_string()))
    }

    async fn tab_create(&self, params: CreateTab) -> Result<Tab, BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("tab_create")?;
        state.next_tab_id += 1;
        let id = TabId(state.next_tab_id);
        let window_tabs = state
            .tabs
            .iter()
            .filter(|tab| tab.window_id == params.window_id)
            .count() as u32;
        let index = params.index.unwrap_or(window_tabs).min(window_tabs);
        let title = if state.withhold_titles {
            None
        } else {
            Some(params.url.clone())
        };
        // Shift existing tabs at or after the insertion point.
        for tab in state
            .tabs
            .iter_mut()
            .filter(|tab| tab.window_id == params.window_id && tab.index >= index)
        {
            tab.index += 1;
        }
        let tab = Tab {
            id: Some(id),
            window_id: params.window_id,
            url: Some(params.url.clone()),
            title,
            pinned: params.pinned,
            index,
            group_id: None,
            active: params.active,
            discarded: false,
            fav_icon_url: None,
        };
        state.tabs.push(tab.clone());
        state.events.push(MockEvent::TabCreated {
            id,
            url: params.url,
            pinned: params.pinned,
        });
        Ok(tab)
    }

    async fn tab_update(&self, id: TabId, params: UpdateTab) -> Result<(), BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("tab_update")?;
        let tab = state
            .tabs
            .iter_mut()
            .find(|tab| tab.id == Some(id))
            .ok_or_else(|| BrowserError::NotFound(id.to_string()))?;
        if let Some(url) = params.url {
            tab.url = Some(url);
        }
        if let Some(pinned) = params.pinned {
            tab.pinned = pinned;
        }
        state.events.push(MockEvent::TabUpdated(id));
        Ok(())
    }

    async fn tab_remove(&self, id: TabId) -> Result<(), BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("tab_remove")?;
        let window_id = state
            .tabs
            .iter()
            .find(|tab| tab.id == Some(id))
            .map(|tab| tab.window_id)
            .ok_or_else(|| BrowserError::NotFound(id.to_string()))?;
        state.tabs.retain(|tab| tab.id != Some(id));
        state.renumber_window(window_id);
        state.events.push(MockEvent::TabRemoved(id));
        Ok(())
    }

    async fn tab_move(&self, id: TabId, index: u32) -> Result<(), BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("tab_move")?;
        let window_id = state
            .tabs
            .iter()
            .find(|tab| tab.id == Some(id))
            .map(|tab| tab.window_id)
            .ok_or_else(|| BrowserError::NotFound(id.to_string()))?;
        let mut ordered: Vec<TabId> = {
            let mut tabs: Vec<&Tab> = state
                .tabs
                .iter()
                .filter(|tab| tab.window_id == window_id)
                .collect();
            tabs.sort_by_key(|tab| tab.index);
            tabs.iter().filter_map(|tab| tab.id).collect()
        };
        ordered.retain(|tab_id| *tab_id != id);
        let position = (index as usize).min(ordered.len());
        ordered.insert(position, id);
        for (new_index, tab_id) in ordered.iter().enumerate() {
            if let Some(tab) = state.tabs.iter_mut().find(|tab| tab.id == Some(*tab_id)) {
                tab.index = new_index as u32;
            }
        }
        state.events.push(MockEvent::TabMoved { id, index });
        Ok(())
    }

    async fn tabs_group(
        &self,
        ids: &[TabId],
        group: Option<TabGroupId>,
    ) -> Result<TabGroupId, BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("tabs_group")?;
        let window_id = ids
            .first()
            .and_then(|first| {
                state
                    .tabs
                    .iter()
                    .find(|tab| tab.id == Some(*first))
                    .map(|tab| tab.window_id)
            })
            .ok_or_else(|| BrowserError::InvalidData("tabs_group requires tab ids".to_owned()))?;
        let group_id = match group {
            Some(existing) => existing,
            None => {
                state.next_group_id += 1;
                let id = TabGroupId(state.next_group_id);
                state.groups.push(TabGroup {
                    id,
                    window_id,
                    title: None,
                    color: GroupColor::Grey,
                    collapsed: false,
                });
                id
            }
        };
        for id in ids {
            if let Some(tab) = state.tabs.iter_mut().find(|tab| tab.id == Some(*id)) {
                tab.group_id = Some(group_id);
            }
        }
        state.events.push(MockEvent::TabsGrouped {
            ids: ids.to_vec(),
            group: group_id,
        });
        Ok(group_id)
    }

    async fn tabs_ungroup(&self, ids: &[TabId]) -> Result<(), BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("tabs_ungroup")?;
        for id in ids {
            if let Some(tab) = state.tabs.iter_mut().find(|tab| tab.id == Some(*id)) {
                tab.group_id = None;
            }
        }
        let live: HashSet<TabGroupId> = state.tabs.iter().filter_map(|tab| tab.group_id).collect();
        state.groups.retain(|group| live.contains(&group.id));
        state.events.push(MockEvent::TabsUngrouped(ids.to_vec()));
        Ok(())
    }

    async fn tab_discard(&self, id: TabId) -> Result<(), BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("tab_discard")?;
        let tab = state
            .tabs
            .iter_mut()
            .find(|tab| tab.id == Some(id))
            .ok_or_else(|| BrowserError::NotFound(id.to_string()))?;
        tab.discarded = true;
        state.events.push(MockEvent::TabDiscarded(id));
        Ok(())
    }

    async fn tab_groups_query(&self, window_id: WindowId) -> Result<Vec<TabGroup>, BrowserError> {
        let state = self.state.lock().expect("mock state poisoned");
        state.check("tab_groups_query")?;
        Ok(state
            .groups
            .iter()
            .filter(|group| group.window_id == window_id)
            .cloned()
            .collect())
    }

    async fn tab_group_update(
        &self,
        id: TabGroupId,
        params: UpdateTabGroup,
    ) -> Result<(), BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("tab_group_update")?;
        let group = state
            .groups
            .iter_mut()
            .find(|group| group.id == id)
            .ok_or_else(|| BrowserError::NotFound(id.to_string()))?;
        if let Some(title) = params.title {
            group.title = Some(title);
        }
        if let Some(color) = params.color {
            group.color = color;
        }
        if let Some(collapsed) = params.collapsed {
            group.collapsed = collapsed;
        }
        state.events.push(MockEvent::GroupUpdated(id));
        Ok(())
    }

    async fn windows_get_all(&self) -> Result<Vec<Window>, BrowserError> {
        let state = self.state.lock().expect("mock state poisoned");
        state.check("windows_get_all")?;
        Ok(state.windows.clone())
    }

    async fn window_get(&self, id: WindowId) -> Result<Window, BrowserError> {
        let state = self.state.lock().expect("mock state poisoned");
        state.check("window_get")?;
        state
            .windows
            .iter()
            .find(|window| window.id == id)
            .copied()
            .ok_or_else(|| BrowserError::NotFound(id.to_string()))
    }

    async fn window_create(&self) -> Result<Window, BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("window_create")?;
        state.next_window_id += 1;
        let window = Window {
            id: WindowId(state.next_window_id),
            focused: true,
        };
        state.windows.push(window);
        state.events.push(MockEvent::WindowCreated(window.id));
        Ok(window)
    }

    async fn bookmarks_get_tree(&self) -> Result<BookmarkNode, BrowserError> {
        let state = self.state.lock().expect("mock state poisoned");
        state.check("bookmarks_get_tree")?;
        state
            .subtree(&self.root)
            .ok_or_else(|| BrowserError::NotFound("bookmark root".to_owned()))
    }

    async fn bookmarks_get_children(
        &self,
        id: &BookmarkId,
    ) -> Result<Vec<BookmarkNode>, BrowserError> {
        let state = self.state.lock().expect("mock state poisoned");
        state.check("bookmarks_get_children")?;
        let node = state
            .subtree(id)
            .ok_or_else(|| BrowserError::NotFound(id.to_string()))?;
        Ok(node.children)
    }

    async fn bookmarks_get_subtree(&self, id: &BookmarkId) -> Result<BookmarkNode, BrowserError> {
        let state = self.state.lock().expect("mock state poisoned");
        state.check("bookmarks_get_subtree")?;
        state
            .subtree(id)
            .ok_or_else(|| BrowserError::NotFound(id.to_string()))
    }

    async fn bookmark_create(&self, params: CreateBookmark) -> Result<BookmarkNode, BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("bookmark_create")?;
        if !state.bookmarks.contains_key(&params.parent_id) {
            return Err(BrowserError::NotFound(params.parent_id.to_string()));
        }
        let id = state.allocate_bookmark_id();
        state.bookmarks.insert(
            id.clone(),
            StoredBookmark {
                parent: Some(params.parent_id.clone()),
                title: params.title.clone(),
                url: params.url.clone(),
            },
        );
        if params.url.is_none() {
            state.children.insert(id.clone(), Vec::new());
        }
        let siblings = state.children.entry(params.parent_id.clone()).or_default();
        let position = params
            .index
            .map(|index| (index as usize).min(siblings.len()))
            .unwrap_or(siblings.len());
        siblings.insert(position, id.clone());
        state.events.push(MockEvent::BookmarkCreated {
            id: id.clone(),
            parent: params.parent_id.clone(),
            title: params.title.clone(),
            url: params.url.clone(),
        });
        let node = state.subtree(&id).expect("created node should exist");
        Ok(node)
    }

    async fn bookmark_update(
        &self,
        id: &BookmarkId,
        title: Option<&str>,
        url: Option<&str>,
    ) -> Result<(), BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("bookmark_update")?;
        let stored = state
            .bookmarks
            .get_mut(id)
            .ok_or_else(|| BrowserError::NotFound(id.to_string()))?;
        if let Some(title) = title {
            stored.title = title.to_owned();
        }
        if let Some(url) = url {
            stored.url = Some(url.to_owned());
        }
        state.events.push(MockEvent::BookmarkUpdated {
            id: id.clone(),
            title: title.map(str::to_owned),
        });
        Ok(())
    }

    async fn bookmark_remove(&self, id: &BookmarkId) -> Result<(), BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("bookmark_remove")?;
        if !state.bookmarks.contains_key(id) {
            return Err(BrowserError::NotFound(id.to_string()));
        }
        if state.children.get(id).is_some_and(|children| !children.is_empty()) {
            return Err(BrowserError::OperationFailed(
                "cannot remove a non-empty folder".to_owned(),
            ));
        }
        state.detach_from_parent(id);
        state.children.remove(id);
        state.bookmarks.remove(id);
        state.events.push(MockEvent::BookmarkRemoved(id.clone()));
        Ok(())
    }

    async fn bookmark_remove_tree(&self, id: &BookmarkId) -> Result<(), BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("bookmark_remove_tree")?;
        if !state.bookmarks.contains_key(id) {
            return Err(BrowserError::NotFound(id.to_string()));
        }
        state.detach_from_parent(id);
        state.remove_subtree(id);
        state.events.push(MockEvent::BookmarkTreeRemoved(id.clone()));
        Ok(())
    }

    async fn bookmark_move(
        &self,
        id: &BookmarkId,
        parent_id: &BookmarkId,
        index: Option<u32>,
    ) -> Result<(), BrowserError> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.check("bookmark_move")?;
        if !state.bookmarks.contains_key(id) {
            return Err(BrowserError::NotFound(id.to_string()));
        }
        if !state.bookmarks.contains_key(parent_id) {
            return Err(BrowserError::NotFound(parent_id.to_string()));
        }
        state.detach_from_parent(id);
        if let Some(stored) = state.bookmarks.get_mut(id) {
            stored.parent = Some(parent_id.clone());
        }
        let siblings = state.children.entry(parent_id.clone()).or_default();
        let position = index
            .map(|index| (index as usize).min(siblings.len()))
            .unwrap_or(siblings.len());
        siblings.insert(position, id.clone());
        state.events.push(MockEvent::BookmarkMoved {
            id: id.clone(),
            parent: parent_id.clone(),
        });
        Ok(())
    }
}
