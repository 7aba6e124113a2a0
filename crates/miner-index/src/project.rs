//! Project registration

use miner_core::{MinerError, Project};
use miner_db::Store;
use std::path::Path;

use crate::Result;

/// Registers the repository at `root` (idempotent) and returns its project.
///
/// The name defaults to the repository directory name.
pub fn register_project(store: &Store, root: &Path, name: Option<&str>) -> Result<Project> {
    let root = root
        .canonicalize()
        .map_err(|e| MinerError::backend(format!("cannot resolve {:?}: {}", root, e)))?;
    let name = match name {
        Some(name) => name.to_string(),
        None => default_name(&root),
    };

    let id = store.ensure_project(&name, &root.to_string_lossy())?;
    log::debug!("Project {} ({:?}) has id {}", name, root, id);
    Ok(Project { id, name, root })
}

fn default_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().trim_end_matches(".git").to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "project".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name() {
        assert_eq!(default_name(Path::new("/src/vcs-miner")), "vcs-miner");
        assert_eq!(default_name(Path::new("/src/mirror.git")), "mirror");
        assert_eq!(default_name(Path::new("/")), "project");
    }
}
