//! Output formatting structures for CLI display

use tabled::Tabled;

/// Table row for one developer
#[derive(Tabled)]
pub struct DeveloperRow {
    #[tabled(rename = "Developer")]
    pub developer: String,
    #[tabled(rename = "Commits")]
    pub commits: String,
    #[tabled(rename = "Added")]
    pub added: String,
    #[tabled(rename = "Deleted")]
    pub deleted: String,
    #[tabled(rename = "Modified")]
    pub modified: String,
    #[tabled(rename = "Lines owned")]
    pub lines_owned: String,
    #[tabled(rename = "Share")]
    pub share: String,
    #[tabled(rename = "Files owned")]
    pub files_owned: usize,
}

/// Table row for one file in the snapshot
#[derive(Tabled)]
pub struct FileRow {
    #[tabled(rename = "File")]
    pub path: String,
    #[tabled(rename = "Owner")]
    pub owner: String,
    #[tabled(rename = "Owner lines")]
    pub owner_lines: String,
    #[tabled(rename = "Lines")]
    pub total_lines: String,
    #[tabled(rename = "Size")]
    pub size: String,
}

/// Table row for one store table
#[derive(Tabled)]
pub struct CountRow {
    #[tabled(rename = "Table")]
    pub table: &'static str,
    #[tabled(rename = "Rows")]
    pub rows: String,
}

/// Table row for one commit in the size history
#[derive(Tabled)]
pub struct HistoryRow {
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(rename = "Commit")]
    pub commit: String,
    #[tabled(rename = "Author")]
    pub author: String,
    #[tabled(rename = "Size")]
    pub size: String,
    #[tabled(rename = "Stability")]
    pub stability: String,
    #[tabled(rename = "Lines")]
    pub lines: String,
}
