//! Walks the hopper tree and collects files tagged with their parent folder's name.

use crate::folders::is_marker_folder;
use crate::models::ScannedFile;
use providers::RemoteDirectory;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_DEPTH: usize = 4;
pub const ARCHIVE_SUFFIX: &str = ".zip";

struct Pending {
    folder_id: String,
    folder_name: String,
    /// Depth of this folder's children; the root's children are depth 1.
    child_depth: usize,
}

/// Depth-first walk from `root_id`. No node deeper than `max_depth` is listed or returned.
pub async fn scan(
    dir: &dyn RemoteDirectory,
    root_id: &str,
    root_name: &str,
    max_depth: usize,
) -> Vec<ScannedFile> {
    let mut files = Vec::new();
    if max_depth == 0 {
        return files;
    }
    let mut stack = vec![Pending {
        folder_id: root_id.to_string(),
        folder_name: root_name.to_string(),
        child_depth: 1,
    }];

    while let Some(folder) = stack.pop() {
        let children = match dir.list_children(&folder.folder_id).await {
            Ok(children) => children,
            Err(e) => {
                warn!(folder = %folder.folder_name, "skipping folder, listing failed: {}", e);
                continue;
            }
        };

        let mut subfolders = Vec::new();
        for node in children {
            if node.is_folder() {
                if is_marker_folder(&node.name) {
                    debug!(folder = %node.name, "not descending into marker folder");
                } else if folder.child_depth < max_depth {
                    subfolders.push(Pending {
                        folder_id: node.id,
                        folder_name: node.name,
                        child_depth: folder.child_depth + 1,
                    });
                }
            } else {
                files.push(ScannedFile {
                    node,
                    category: folder.folder_name.clone(),
                    depth: folder.child_depth,
                });
            }
        }
        // reversed so the stack pops them in listing order
        stack.extend(subfolders.into_iter().rev());
    }

    info!(count = files.len(), "hopper scan finished");
    files
}

/// Whether a file should be sent for analysis: unseen, or an archive.
pub fn needs_refinement(file: &ScannedFile, known: &HashSet<String>) -> bool {
    !known.contains(&file.shard_id()) || file.node.name.ends_with(ARCHIVE_SUFFIX)
}

pub fn select_for_refinement<'a>(
    files: &'a [ScannedFile],
    known: &HashSet<String>,
) -> Vec<&'a ScannedFile> {
    files.iter().filter(|f| needs_refinement(f, known)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::memory::MemoryDirectory;

    /// hopper/L1/L2/.../L6, one file at every level.
    fn deep_tree(dir: &MemoryDirectory) -> String {
        let hopper = dir.add_folder("Hopper", "root");
        let mut parent = hopper.clone();
        dir.add_file("top.json", "application/json", &parent, "{}");
        for level in 1..=6 {
            parent = dir.add_folder(&format!("L{level}"), &parent);
            dir.add_file(&format!("f{level}.json"), "application/json", &parent, "{}");
        }
        hopper
    }

    #[tokio::test]
    async fn never_recurses_past_max_depth() {
        let dir = MemoryDirectory::new();
        let hopper = deep_tree(&dir);
        let files = scan(&dir, &hopper, "Hopper", DEFAULT_MAX_DEPTH).await;

        let names: Vec<_> = files.iter().map(|f| f.node.name.as_str()).collect();
        assert_eq!(names, vec!["top.json", "f1.json", "f2.json", "f3.json"]);
        assert!(files.iter().all(|f| f.depth <= DEFAULT_MAX_DEPTH));
        // root + L1..L3 listed; L4 is seen but never opened
        assert_eq!(dir.list_count(), 4);
    }

    #[tokio::test]
    async fn category_is_the_nearest_folder() {
        let dir = MemoryDirectory::new();
        let hopper = dir.add_folder("Hopper", "root");
        let amazon = dir.add_folder("Amazon", &hopper);
        let year = dir.add_folder("2023", &amazon);
        dir.add_file("order.json", "application/json", &year, "{}");
        dir.add_file("loose.pdf", "application/pdf", &hopper, "");

        let files = scan(&dir, &hopper, "Hopper", DEFAULT_MAX_DEPTH).await;
        let order = files.iter().find(|f| f.node.name == "order.json").unwrap();
        assert_eq!(order.category, "2023");
        let loose = files.iter().find(|f| f.node.name == "loose.pdf").unwrap();
        assert_eq!(loose.category, "Hopper");
    }

    #[tokio::test]
    async fn marker_folders_and_failing_listings_are_skipped() {
        let dir = MemoryDirectory::new();
        let hopper = dir.add_folder("Hopper", "root");
        let gmail = dir.add_folder("Gmail", &hopper);
        let excluded = dir.add_folder("_excluded", &gmail);
        dir.add_file("hidden.json", "application/json", &excluded, "{}");
        let broken = dir.add_folder("Banking", &hopper);
        dir.add_file("stmt.pdf", "application/pdf", &broken, "");
        dir.fail_listing(&broken);
        dir.add_file("mail.json", "application/json", &gmail, "{}");

        let files = scan(&dir, &hopper, "Hopper", DEFAULT_MAX_DEPTH).await;
        let names: Vec<_> = files.iter().map(|f| f.node.name.as_str()).collect();
        assert_eq!(names, vec!["mail.json"]);
    }

    #[tokio::test]
    async fn archives_are_always_reselected() {
        let dir = MemoryDirectory::new();
        let hopper = dir.add_folder("Hopper", "root");
        let gmail = dir.add_folder("Gmail", &hopper);
        dir.add_file("export.zip", "application/zip", &gmail, "");
        dir.add_file("export.json", "application/json", &gmail, "{}");

        let mut known = HashSet::new();
        let files = scan(&dir, &hopper, "Hopper", DEFAULT_MAX_DEPTH).await;
        let first: Vec<_> = select_for_refinement(&files, &known)
            .into_iter()
            .map(|f| f.node.name.clone())
            .collect();
        assert_eq!(first, vec!["export.json", "export.zip"]);
        known.extend(files.iter().map(|f| f.shard_id()));

        let files = scan(&dir, &hopper, "Hopper", DEFAULT_MAX_DEPTH).await;
        let second: Vec<_> = select_for_refinement(&files, &known)
            .into_iter()
            .map(|f| f.node.name.clone())
            .collect();
        assert_eq!(second, vec!["export.zip"]);
    }
}
