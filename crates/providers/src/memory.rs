//! In-memory directory used as a stand-in for the storage provider.

use crate::{ProviderError, RemoteDirectory, RemoteNode, UploadRequest, FOLDER_MIME};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct Entry {
    node: RemoteNode,
    content: Option<String>,
}

/// Tree of nodes keyed by id. `root` always exists.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: Mutex<BTreeMap<String, Entry>>,
    next_id: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    pub creates: AtomicUsize,
    pub lists: AtomicUsize,
    pub moves: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn insert(&self, name: &str, mime: &str, parent: &str, content: Option<String>) -> String {
        let id = self.allocate(if mime == FOLDER_MIME { "dir" } else { "file" });
        let node = RemoteNode {
            id: id.clone(),
            name: name.to_string(),
            mime_type: mime.to_string(),
            web_view_link: Some(format!("https://drive.example/{id}")),
            parents: vec![parent.to_string()],
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(id.clone(), Entry { node, content });
        }
        id
    }

    /// Seeds a folder without counting it as a client-side creation.
    pub fn add_folder(&self, name: &str, parent: &str) -> String {
        self.insert(name, FOLDER_MIME, parent, None)
    }

    pub fn add_file(&self, name: &str, mime: &str, parent: &str, content: &str) -> String {
        self.insert(name, mime, parent, Some(content.to_string()))
    }

    /// Makes every subsequent `list_children(folder_id)` fail.
    pub fn fail_listing(&self, folder_id: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(folder_id.to_string());
        }
    }

    pub fn node(&self, id: &str) -> Option<RemoteNode> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(id).map(|e| e.node.clone()))
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::Relaxed)
    }

    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::Relaxed)
    }
}

fn sort_key(node: &RemoteNode) -> (bool, String) {
    (!node.is_folder(), node.name.clone())
}

#[async_trait::async_trait]
impl RemoteDirectory for MemoryDirectory {
    async fn find_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: Option<&str>,
    ) -> Result<Option<String>, ProviderError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ProviderError::RequestFailed("lock poisoned".into()))?;
        Ok(entries
            .values()
            .map(|e| &e.node)
            .find(|n| {
                n.name == name
                    && n.parents.iter().any(|p| p == parent_id)
                    && mime_type.map_or(true, |m| n.mime_type == m)
            })
            .map(|n| n.id.clone()))
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, ProviderError> {
        self.creates.fetch_add(1, Ordering::Relaxed);
        Ok(self.add_folder(name, parent_id))
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteNode>, ProviderError> {
        self.lists.fetch_add(1, Ordering::Relaxed);
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(folder_id))
            .unwrap_or(false);
        if failing {
            return Err(ProviderError::Status {
                status: 500,
                body: format!("listing {folder_id} failed"),
            });
        }
        let entries = self
            .entries
            .lock()
            .map_err(|_| ProviderError::RequestFailed("lock poisoned".into()))?;
        let mut children: Vec<RemoteNode> = entries
            .values()
            .filter(|e| e.node.parents.iter().any(|p| p == folder_id))
            .map(|e| e.node.clone())
            .collect();
        children.sort_by_key(sort_key);
        Ok(children)
    }

    async fn upload_file(&self, request: UploadRequest) -> Result<RemoteNode, ProviderError> {
        let content = String::from_utf8_lossy(&request.bytes).into_owned();
        let id = self.add_file(&request.name, &request.mime_type, &request.parent_id, &content);
        self.node(&id)
            .ok_or_else(|| ProviderError::RequestFailed("upload vanished".into()))
    }

    async fn fetch_content(&self, file_id: &str) -> Result<String, ProviderError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ProviderError::RequestFailed("lock poisoned".into()))?;
        entries
            .get(file_id)
            .and_then(|e| e.content.clone())
            .ok_or_else(|| ProviderError::NotFound(file_id.to_string()))
    }

    async fn move_file(
        &self,
        file_id: &str,
        from_parent: &str,
        to_parent: &str,
    ) -> Result<(), ProviderError> {
        self.moves.fetch_add(1, Ordering::Relaxed);
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ProviderError::RequestFailed("lock poisoned".into()))?;
        let entry = entries
            .get_mut(file_id)
            .ok_or_else(|| ProviderError::NotFound(file_id.to_string()))?;
        entry.node.parents.retain(|p| p != from_parent);
        entry.node.parents.push(to_parent.to_string());
        Ok(())
    }
}
