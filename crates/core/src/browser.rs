//! Folder browser: breadcrumb navigation over the remote tree.
//!
//! `BrowserState` is the pure state machine. Each transition hands back a
//! `FetchTicket`; a listing is only applied if its ticket is still the newest,
//! so a slow response for a folder the user already left is dropped.

use crate::folders;
use crate::models::{Breadcrumb, BreadcrumbTrail};
use anyhow::Context;
use providers::{RemoteDirectory, RemoteNode, UploadRequest};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub folder_id: String,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct BrowserState {
    breadcrumbs: BreadcrumbTrail,
    items: Vec<RemoteNode>,
    generation: u64,
    loading: bool,
}

impl BrowserState {
    pub fn new(root_id: impl Into<String>, root_name: impl Into<String>) -> Self {
        Self {
            breadcrumbs: BreadcrumbTrail::new(Breadcrumb::new(root_id, root_name)),
            items: Vec::new(),
            generation: 0,
            loading: false,
        }
    }

    pub fn current_folder_id(&self) -> &str {
        &self.breadcrumbs.current().id
    }

    pub fn breadcrumbs(&self) -> &BreadcrumbTrail {
        &self.breadcrumbs
    }

    pub fn items(&self) -> &[RemoteNode] {
        &self.items
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn ticket(&mut self) -> FetchTicket {
        self.generation += 1;
        self.loading = true;
        FetchTicket {
            folder_id: self.current_folder_id().to_string(),
            generation: self.generation,
        }
    }

    pub fn reset(&mut self, root_id: impl Into<String>, root_name: impl Into<String>) -> FetchTicket {
        self.breadcrumbs = BreadcrumbTrail::new(Breadcrumb::new(root_id, root_name));
        self.items.clear();
        self.ticket()
    }

    pub fn navigate_into(&mut self, folder_id: impl Into<String>, name: impl Into<String>) -> FetchTicket {
        self.breadcrumbs.push(Breadcrumb::new(folder_id, name));
        self.ticket()
    }

    /// `None` at the root.
    pub fn navigate_up(&mut self) -> Option<FetchTicket> {
        self.breadcrumbs.pop()?;
        Some(self.ticket())
    }

    /// `None` when `index` is already the current crumb or out of range.
    pub fn navigate_to_breadcrumb(&mut self, index: usize) -> Option<FetchTicket> {
        if !self.breadcrumbs.truncate_to(index) {
            return None;
        }
        Some(self.ticket())
    }

    pub fn refresh(&mut self) -> FetchTicket {
        self.ticket()
    }

    /// Replaces the listing if `ticket` is the latest. Returns whether it was applied.
    pub fn apply(&mut self, ticket: &FetchTicket, items: Vec<RemoteNode>) -> bool {
        if ticket.generation != self.generation {
            debug!(
                folder = %ticket.folder_id,
                stale = ticket.generation,
                latest = self.generation,
                "discarding stale listing"
            );
            return false;
        }
        self.items = items;
        self.loading = false;
        true
    }

    pub fn find_item(&self, name: &str) -> Option<&RemoteNode> {
        self.items.iter().find(|n| n.name == name)
    }
}

/// Drives a `BrowserState` against a remote directory.
pub struct Browser {
    dir: Arc<dyn RemoteDirectory>,
    state: BrowserState,
}

impl Browser {
    pub fn new(dir: Arc<dyn RemoteDirectory>, root_id: &str, root_name: &str) -> Self {
        Self {
            dir,
            state: BrowserState::new(root_id, root_name),
        }
    }

    pub fn state(&self) -> &BrowserState {
        &self.state
    }

    pub fn directory(&self) -> &dyn RemoteDirectory {
        self.dir.as_ref()
    }

    /// Lists the ticket's folder; a failed listing shows as empty.
    pub async fn load(&mut self, ticket: FetchTicket) -> bool {
        debug!(folder = %ticket.folder_id, "loading items");
        let items = match self.dir.list_children(&ticket.folder_id).await {
            Ok(items) => items,
            Err(e) => {
                error!(folder = %ticket.folder_id, "error loading items: {}", e);
                Vec::new()
            }
        };
        self.state.apply(&ticket, items)
    }

    pub async fn open(&mut self) {
        let ticket = self.state.refresh();
        self.load(ticket).await;
    }

    pub async fn enter(&mut self, folder_id: &str, name: &str) {
        let ticket = self.state.navigate_into(folder_id, name);
        self.load(ticket).await;
    }

    /// Enters a folder by name from the current listing.
    pub async fn enter_named(&mut self, name: &str) -> anyhow::Result<()> {
        let node = self
            .state
            .find_item(name)
            .filter(|n| n.is_folder())
            .cloned()
            .with_context(|| format!("no folder named {name} here"))?;
        self.enter(&node.id, &node.name).await;
        Ok(())
    }

    pub async fn up(&mut self) -> bool {
        match self.state.navigate_up() {
            Some(ticket) => {
                self.load(ticket).await;
                true
            }
            None => false,
        }
    }

    pub async fn jump(&mut self, index: usize) -> bool {
        match self.state.navigate_to_breadcrumb(index) {
            Some(ticket) => {
                self.load(ticket).await;
                true
            }
            None => false,
        }
    }

    pub async fn refresh(&mut self) {
        self.open().await;
    }

    pub async fn create_folder(&mut self, name: &str) -> anyhow::Result<String> {
        let parent = self.state.current_folder_id().to_string();
        let id = self
            .dir
            .create_folder(name, &parent)
            .await
            .with_context(|| format!("creating folder {name}"))?;
        self.refresh().await;
        Ok(id)
    }

    pub async fn upload(&mut self, mut request: UploadRequest) -> anyhow::Result<RemoteNode> {
        request.parent_id = self.state.current_folder_id().to_string();
        let name = request.name.clone();
        let node = self
            .dir
            .upload_file(request)
            .await
            .with_context(|| format!("uploading {name}"))?;
        self.refresh().await;
        Ok(node)
    }

    pub async fn exclude(&mut self, file_id: &str) -> anyhow::Result<()> {
        let parent = self.state.current_folder_id().to_string();
        folders::exclude_file(self.dir.as_ref(), file_id, &parent).await?;
        self.refresh().await;
        Ok(())
    }

    pub async fn delete(&mut self, file_id: &str) -> anyhow::Result<()> {
        let parent = self.state.current_folder_id().to_string();
        folders::delete_file(self.dir.as_ref(), file_id, &parent).await?;
        self.refresh().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::memory::MemoryDirectory;

    #[test]
    fn breadcrumb_zero_returns_to_root_after_any_descent() {
        let mut state = BrowserState::new("root", "Hopper");
        for depth in 0..5 {
            state.navigate_into(format!("f{depth}"), format!("F{depth}"));
        }
        let ticket = state.navigate_to_breadcrumb(0).unwrap();
        assert_eq!(ticket.folder_id, "root");
        assert_eq!(state.current_folder_id(), "root");
        assert_eq!(state.breadcrumbs().len(), 1);
    }

    #[test]
    fn navigate_up_at_root_is_a_no_op() {
        let mut state = BrowserState::new("root", "Hopper");
        let before = state.generation();
        assert!(state.navigate_up().is_none());
        assert_eq!(state.current_folder_id(), "root");
        assert_eq!(state.breadcrumbs().len(), 1);
        assert_eq!(state.generation(), before);
    }

    #[test]
    fn breadcrumb_to_current_is_a_no_op() {
        let mut state = BrowserState::new("root", "Hopper");
        state.navigate_into("a", "Amazon");
        assert!(state.navigate_to_breadcrumb(1).is_none());
        assert_eq!(state.current_folder_id(), "a");
        let up = state.navigate_up().unwrap();
        assert_eq!(up.folder_id, "root");
    }

    #[test]
    fn stale_listing_is_discarded() {
        let mut state = BrowserState::new("root", "Hopper");
        let slow = state.navigate_into("a", "Amazon");
        let fast = state.navigate_up().unwrap();
        let node = |id: &str| RemoteNode {
            id: id.into(),
            name: id.into(),
            mime_type: "text/plain".into(),
            web_view_link: None,
            parents: vec![],
        };

        assert!(state.apply(&fast, vec![node("in-root")]));
        assert!(!state.apply(&slow, vec![node("in-amazon")]));
        assert_eq!(state.items()[0].id, "in-root");
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn driver_navigates_and_acts_in_current_folder() {
        let dir = Arc::new(MemoryDirectory::new());
        let hopper = dir.add_folder("Hopper", "root");
        let amazon = dir.add_folder("Amazon", &hopper);
        let order = dir.add_file("order.json", "application/json", &amazon, "{}");

        let mut browser = Browser::new(dir.clone(), &hopper, "Hopper");
        browser.open().await;
        assert_eq!(browser.state().items().len(), 1);

        browser.enter_named("Amazon").await.unwrap();
        assert_eq!(browser.state().breadcrumbs().display_path(), "Hopper / Amazon");
        assert_eq!(browser.state().items()[0].id, order);

        browser.exclude(&order).await.unwrap();
        let names: Vec<_> = browser.state().items().iter().map(|n| n.name.clone()).collect();
        assert_eq!(names, vec!["_excluded"]);

        assert!(browser.enter_named("missing").await.is_err());
        assert!(browser.up().await);
        assert!(!browser.up().await);
        assert_eq!(browser.state().current_folder_id(), hopper);
    }

    #[tokio::test]
    async fn failed_listing_shows_empty_folder() {
        let dir = Arc::new(MemoryDirectory::new());
        let hopper = dir.add_folder("Hopper", "root");
        dir.add_file("a.json", "application/json", &hopper, "{}");
        dir.fail_listing(&hopper);
        let mut browser = Browser::new(dir, &hopper, "Hopper");
        browser.open().await;
        assert!(browser.state().items().is_empty());
        assert!(!browser.state().is_loading());
    }
}
