//! Identity interning cache
//!
//! Maps author emails and file paths to their surrogate ids for one
//! pipeline run. The store's unique keys stay authoritative: a miss reads
//! the store, inserts-or-ignores when absent and caches whatever id won.

use dashmap::DashMap;
use miner_db::Store;

use crate::Result;

pub struct Interner {
    project_id: i64,
    authors: DashMap<String, i64>,
    paths: DashMap<String, i64>,
}

impl Interner {
    pub fn new(project_id: i64) -> Self {
        Self {
            project_id,
            authors: DashMap::new(),
            paths: DashMap::new(),
        }
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    /// Returns the id for `email`, registering the author under `name` on first sight
    pub fn resolve_author(&self, store: &Store, email: &str, name: &str) -> Result<i64> {
        if let Some(id) = self.authors.get(email) {
            return Ok(*id);
        }

        let id = match store.author_id(self.project_id, email)? {
            Some(id) => id,
            None => store.insert_author(self.project_id, name, email)?,
        };
        Ok(*self.authors.entry(email.to_string()).or_insert(id))
    }

    pub fn resolve_file_path(&self, store: &Store, path: &str) -> Result<i64> {
        if let Some(id) = self.paths.get(path) {
            return Ok(*id);
        }

        let id = match store.file_path_id(self.project_id, path)? {
            Some(id) => id,
            None => store.insert_file_path(self.project_id, path)?,
        };
        Ok(*self.paths.entry(path.to_string()).or_insert(id))
    }

    /// Seeds the path map with every path already stored for the project
    pub fn preload_file_paths(&self, store: &Store) -> Result<usize> {
        let known = store.file_paths(self.project_id)?;
        let count = known.len();
        for (path, id) in known {
            self.paths.entry(path).or_insert(id);
        }
        Ok(count)
    }

    pub fn author_count(&self) -> usize {
        self.authors.len()
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miner_db::StoreOptions;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_concurrent_resolution_yields_one_id() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("miner.db");
        let project = Store::open(&db_path, StoreOptions::default())
            .unwrap()
            .ensure_project("demo", "/demo")
            .unwrap();
        let interner = Arc::new(Interner::new(project));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let interner = Arc::clone(&interner);
                let db_path = db_path.clone();
                std::thread::spawn(move || {
                    let store = Store::open(&db_path, StoreOptions::default()).unwrap();
                    (0..50)
                        .map(|i| {
                            let email = format!("dev{}@example.com", i % 3);
                            let author = interner.resolve_author(&store, &email, "Dev").unwrap();
                            let path = format!("src/{}.rs", i % 4);
                            let file = interner.resolve_file_path(&store, &path).unwrap();
                            (email, author, path, file)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut author_ids = std::collections::HashMap::new();
        let mut path_ids = std::collections::HashMap::new();
        for handle in handles {
            for (email, author, path, file) in handle.join().unwrap() {
                assert_eq!(*author_ids.entry(email).or_insert(author), author);
                assert_eq!(*path_ids.entry(path).or_insert(file), file);
            }
        }

        let store = Store::open(&db_path, StoreOptions::default()).unwrap();
        let counts = store.table_counts().unwrap();
        assert_eq!(counts.authors, 3);
        assert_eq!(counts.file_paths, 4);
        assert_eq!(interner.author_count(), 3);
        assert_eq!(interner.path_count(), 4);
    }

    #[test]
    fn test_fresh_interner_reads_existing_ids() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path().join("miner.db"), StoreOptions::default()).unwrap();
        let project = store.ensure_project("demo", "/demo").unwrap();
        let ada = store.insert_author(project, "Ada", "ada@example.com").unwrap();
        let lib = store.insert_file_path(project, "src/lib.rs").unwrap();

        let interner = Interner::new(project);
        assert_eq!(interner.preload_file_paths(&store).unwrap(), 1);
        assert_eq!(interner.resolve_file_path(&store, "src/lib.rs").unwrap(), lib);
        assert_eq!(interner.resolve_author(&store, "ada@example.com", "A.").unwrap(), ada);
    }
}
