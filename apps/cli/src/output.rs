//! Output formatting utilities

use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

/// Print a value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "#")]
    index: usize,
    entry: String,
    location: String,
}

/// Render directory entries as a table
pub fn entries_table(entries: &[String], dir: &Path) -> String {
    let rows = entries.iter().enumerate().map(|(i, entry)| EntryRow {
        index: i + 1,
        entry: entry.clone(),
        location: dir.join(entry).display().to_string(),
    });
    Table::new(rows).to_string()
}

/// Print directory entries as an indented list
pub fn print_entries(entries: &[String]) {
    for entry in entries {
        println!("  {} {}", style("·").dim(), entry);
    }
}

/// Print paths as an indented list
pub fn print_paths(paths: &[PathBuf]) {
    for path in paths {
        println!("  {} {}", style("·").dim(), path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_each_entry_with_location() {
        let table = entries_table(&["a.txt".to_string(), "nested".to_string()], Path::new("/lib/Emulators"));
        assert!(table.contains("a.txt"));
        assert!(table.contains("nested"));
        assert!(table.contains("Emulators"));
    }
}
