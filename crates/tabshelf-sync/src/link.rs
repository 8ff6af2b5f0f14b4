//! The window → workspace link map.
//!
//! The engine only needs a key/value view; how the map is persisted is the
//! host's concern. The in-memory store covers tests and any host that keeps
//! links in its own storage layer.

use std::collections::HashMap;
use std::sync::Mutex;

use tabshelf_core::{BookmarkId, WindowId};

pub trait LinkStore: Send + Sync {
    fn workspace_for_window(&self, window: WindowId) -> Option<BookmarkId>;

    fn window_for_workspace(&self, workspace: &BookmarkId) -> Option<WindowId>;

    fn link(&self, window: WindowId, workspace: BookmarkId);

    fn unlink_window(&self, window: WindowId);

    fn unlink_workspace(&self, workspace: &BookmarkId);
}

#[derive(Default)]
pub struct MemoryLinkStore {
    entries: Mutex<HashMap<WindowId, BookmarkId>>,
}

impl LinkStore for MemoryLinkStore {
    fn workspace_for_window(&self, window: WindowId) -> Option<BookmarkId> {
        self.entries
            .lock()
            .expect("link store lock poisoned")
            .get(&window)
            .cloned()
    }

    fn window_for_workspace(&self, workspace: &BookmarkId) -> Option<WindowId> {
        self.entries
            .lock()
            .expect("link store lock poisoned")
            .iter()
            .find(|(_, linked)| *linked == workspace)
            .map(|(window, _)| *window)
    }

    fn link(&self, window: WindowId, workspace: BookmarkId) {
        self.entries
            .lock()
            .expect("link store lock poisoned")
            .insert(window, workspace);
    }

    fn unlink_window(&self, window: WindowId) {
        self.entries
            .lock()
            .expect("link store lock poisoned")
            .remove(&window);
    }

    fn unlink_workspace(&self, workspace: &BookmarkId) {
        self.entries
            .lock()
            .expect("link store lock poisoned")
            .retain(|_, linked| linked != workspace);
    }
}
