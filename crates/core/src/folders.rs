//! Well-known folder layout and the move-based file actions built on it.

use crate::config::HopperSettings;
use anyhow::Context;
use providers::{RemoteDirectory, FOLDER_MIME};
use tracing::{error, info};

pub const PROVIDER_ROOT: &str = "root";
pub const EXCLUDED_FOLDER: &str = "_excluded";
pub const DELETED_FOLDER: &str = "_deleted";

pub fn is_marker_folder(name: &str) -> bool {
    name == EXCLUDED_FOLDER || name == DELETED_FOLDER
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkeletonIds {
    pub root_id: String,
    pub hopper_id: String,
    pub containers: Vec<(String, String)>,
}

/// Folder lookup where a failed call counts as "not found".
pub async fn locate_folder(dir: &dyn RemoteDirectory, name: &str, parent_id: &str) -> Option<String> {
    match dir.find_file(name, parent_id, Some(FOLDER_MIME)).await {
        Ok(found) => found,
        Err(e) => {
            error!(name, parent_id, "error finding folder: {}", e);
            None
        }
    }
}

/// Returns the existing folder's id or creates it.
pub async fn ensure_folder(
    dir: &dyn RemoteDirectory,
    name: &str,
    parent_id: &str,
) -> anyhow::Result<String> {
    if let Some(id) = dir
        .find_file(name, parent_id, Some(FOLDER_MIME))
        .await
        .with_context(|| format!("looking up folder {name}"))?
    {
        return Ok(id);
    }
    info!(name, parent_id, "creating folder");
    Ok(dir
        .create_folder(name, parent_id)
        .await
        .with_context(|| format!("creating folder {name}"))?)
}

/// Makes sure root → hopper → containers exist, creating only what is missing.
pub async fn ensure_skeleton(
    dir: &dyn RemoteDirectory,
    settings: &HopperSettings,
) -> anyhow::Result<SkeletonIds> {
    let root_id = ensure_folder(dir, &settings.root_name, PROVIDER_ROOT).await?;
    let hopper_id = ensure_folder(dir, &settings.hopper_name, &root_id).await?;
    let mut containers = Vec::with_capacity(settings.containers.len());
    for name in &settings.containers {
        let id = ensure_folder(dir, name, &hopper_id).await?;
        containers.push((name.clone(), id));
    }
    info!("hopper structure verified");
    Ok(SkeletonIds {
        root_id,
        hopper_id,
        containers,
    })
}

/// Finds the hopper folder without creating anything.
pub async fn locate_hopper(dir: &dyn RemoteDirectory, settings: &HopperSettings) -> Option<String> {
    let Some(root_id) = locate_folder(dir, &settings.root_name, PROVIDER_ROOT).await else {
        tracing::warn!(root = %settings.root_name, "root folder not found");
        return None;
    };
    let hopper = locate_folder(dir, &settings.hopper_name, &root_id).await;
    if hopper.is_none() {
        tracing::warn!(hopper = %settings.hopper_name, "hopper folder not found");
    }
    hopper
}

async fn move_into_marker(
    dir: &dyn RemoteDirectory,
    file_id: &str,
    current_parent: &str,
    marker: &str,
) -> anyhow::Result<String> {
    let marker_id = ensure_folder(dir, marker, current_parent).await?;
    dir.move_file(file_id, current_parent, &marker_id)
        .await
        .with_context(|| format!("moving {file_id} into {marker}"))?;
    Ok(marker_id)
}

/// Moves a file into a sibling `_excluded` folder.
pub async fn exclude_file(
    dir: &dyn RemoteDirectory,
    file_id: &str,
    current_parent: &str,
) -> anyhow::Result<String> {
    move_into_marker(dir, file_id, current_parent, EXCLUDED_FOLDER).await
}

/// Moves a file into a sibling `_deleted` folder. Nothing is trashed.
pub async fn delete_file(
    dir: &dyn RemoteDirectory,
    file_id: &str,
    current_parent: &str,
) -> anyhow::Result<String> {
    move_into_marker(dir, file_id, current_parent, DELETED_FOLDER).await
}
