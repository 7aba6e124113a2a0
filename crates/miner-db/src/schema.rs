//! Table definitions
//!
//! Unique keys are the authoritative de-duplication mechanism: every writer
//! uses `INSERT OR IGNORE` and reads back the surviving row.

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    root TEXT NOT NULL,
    UNIQUE (name, root)
);

CREATE TABLE IF NOT EXISTS authors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    UNIQUE (project_id, email)
);

CREATE TABLE IF NOT EXISTS commits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    hash TEXT NOT NULL,
    author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
    date INTEGER NOT NULL,
    project_size INTEGER NOT NULL,
    stability REAL NOT NULL,
    files_added INTEGER NOT NULL,
    files_deleted INTEGER NOT NULL,
    files_modified INTEGER NOT NULL,
    lines_added INTEGER NOT NULL,
    lines_deleted INTEGER NOT NULL,
    lines_modified INTEGER NOT NULL,
    changes INTEGER NOT NULL,
    changes_size INTEGER NOT NULL,
    UNIQUE (project_id, hash)
);

CREATE TABLE IF NOT EXISTS commit_messages (
    project_id INTEGER NOT NULL,
    hash TEXT NOT NULL,
    summary TEXT NOT NULL,
    message TEXT NOT NULL,
    PRIMARY KEY (project_id, hash),
    FOREIGN KEY (project_id, hash) REFERENCES commits(project_id, hash) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS file_paths (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    UNIQUE (project_id, path)
);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    file_path_id INTEGER NOT NULL REFERENCES file_paths(id) ON DELETE CASCADE,
    commit_hash TEXT NOT NULL,
    date INTEGER NOT NULL,
    UNIQUE (project_id, file_path_id, commit_hash),
    FOREIGN KEY (project_id, commit_hash) REFERENCES commits(project_id, hash) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_files_commit ON files (project_id, commit_hash);

-- revision is not a foreign key: HEAD may be a merge commit, which is never ingested
CREATE TABLE IF NOT EXISTS blame_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    file_path_id INTEGER NOT NULL REFERENCES file_paths(id) ON DELETE CASCADE,
    revision TEXT NOT NULL,
    line_size INTEGER NOT NULL,
    UNIQUE (project_id, file_path_id, revision)
);

CREATE TABLE IF NOT EXISTS blames (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
    blame_file_id INTEGER NOT NULL REFERENCES blame_files(id) ON DELETE CASCADE,
    line_count INTEGER NOT NULL,
    line_size INTEGER NOT NULL,
    line_ids BLOB NOT NULL,
    UNIQUE (project_id, author_id, blame_file_id)
);

CREATE TABLE IF NOT EXISTS branches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    UNIQUE (project_id, name)
);

CREATE TABLE IF NOT EXISTS branch_commit_map (
    project_id INTEGER NOT NULL,
    branch_id INTEGER NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    commit_hash TEXT NOT NULL,
    PRIMARY KEY (branch_id, commit_hash),
    FOREIGN KEY (project_id, commit_hash) REFERENCES commits(project_id, hash) ON DELETE CASCADE
);
"#;
