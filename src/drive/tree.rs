//! Worklist traversals over the folder tree. None of them recurse, and each
//! keeps a visited set so a corrupted parent link cannot loop forever.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use redb::WriteTransaction;

use super::DriveError;
use crate::storage::models::FolderRecord;
use crate::storage::{folders, DatabaseError, Reader};

/// Materialized path of a folder named `name` under `parent`.
pub(crate) fn join_path(parent: Option<&FolderRecord>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{}/{}", parent.path, name),
        None => format!("/{name}"),
    }
}

/// `root` and all of its descendants, each folder before its children.
pub(crate) fn subtree<R: Reader>(
    reader: &R,
    root: &FolderRecord,
) -> Result<Vec<FolderRecord>, DatabaseError> {
    let mut visited = HashSet::from([root.id.clone()]);
    let mut order = Vec::new();
    let mut stack = vec![root.clone()];

    while let Some(folder) = stack.pop() {
        let children = folders::children(reader, &folder.owner_id, Some(&folder.id))?;
        order.push(folder);
        for child in children.into_iter().rev() {
            if visited.insert(child.id.clone()) {
                stack.push(child);
            } else {
                tracing::warn!(folder_id = %child.id, "Folder reached twice while walking tree");
            }
        }
    }
    Ok(order)
}

/// Recompute the path of every descendant of `root` from its parent's path.
/// `root` itself must already carry its new path. Returns the number of
/// folders rewritten.
pub(crate) fn rewrite_descendant_paths(
    txn: &WriteTransaction,
    root: &FolderRecord,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let mut visited = HashSet::from([root.id.clone()]);
    let mut stack = vec![root.clone()];
    let mut rewritten = 0;

    while let Some(parent) = stack.pop() {
        for child in folders::children(txn, &parent.owner_id, Some(&parent.id))? {
            if !visited.insert(child.id.clone()) {
                tracing::warn!(folder_id = %child.id, "Folder reached twice while rewriting paths");
                continue;
            }
            let mut updated = child.clone();
            updated.path = join_path(Some(&parent), &child.name);
            updated.updated_at = now;
            folders::update(txn, &child, &updated)?;
            rewritten += 1;
            stack.push(updated);
        }
    }
    Ok(rewritten)
}

/// Whether `candidate_id` is `ancestor_id` or lies below it.
pub(crate) fn is_within<R: Reader>(
    reader: &R,
    candidate_id: &str,
    ancestor_id: &str,
) -> Result<bool, DriveError> {
    let mut visited = HashSet::new();
    let mut current = Some(candidate_id.to_string());

    while let Some(id) = current {
        if id == ancestor_id {
            return Ok(true);
        }
        if !visited.insert(id.clone()) {
            return Err(DriveError::InvalidHierarchy(
                "folder tree contains a cycle".to_string(),
            ));
        }
        current = folders::get(reader, &id)?.and_then(|f| f.parent_id);
    }
    Ok(false)
}

/// Chain from the top-level ancestor down to `folder` itself.
pub(crate) fn ancestry<R: Reader>(
    reader: &R,
    folder: &FolderRecord,
) -> Result<Vec<FolderRecord>, DatabaseError> {
    let mut visited = HashSet::from([folder.id.clone()]);
    let mut chain = vec![folder.clone()];
    let mut next = folder.parent_id.clone();

    while let Some(id) = next {
        if !visited.insert(id.clone()) {
            tracing::warn!(folder_id = %id, "Cycle in parent chain");
            break;
        }
        match folders::get(reader, &id)? {
            Some(parent) => {
                next = parent.parent_id.clone();
                chain.push(parent);
            }
            None => break,
        }
    }
    chain.reverse();
    Ok(chain)
}
