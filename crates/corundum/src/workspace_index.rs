//
// workspace_index.rs
//
// Workspace-wide symbol index: reverse maps from names and files to
// definition sites, with a full initial scan and per-file replacement
//

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use walkdir::WalkDir;

use crate::extractor::{self, SymbolEntry};

/// Directory base names pruned from the workspace walk.
const SKIP_DIRS: &[&str] = &[
    "vendor",
    "node_modules",
    ".git",
    "tmp",
    "log",
    ".bundle",
    "coverage",
    "public",
    "storage",
];

#[derive(Default)]
struct IndexMaps {
    /// Identifier → definition sites. Every entry is inserted under its
    /// short name and, when distinct, its fully qualified name.
    by_name: HashMap<String, Vec<SymbolEntry>>,
    /// File path → definition sites extracted from that file.
    by_file: HashMap<PathBuf, Vec<SymbolEntry>>,
}

/// Symbol index over the workspace.
///
/// Both maps live behind a single reader-writer lock: queries take the
/// shared guard, the initial build and per-file updates take the exclusive
/// guard, and an observer sees all or none of one file's entries. `ready`
/// is an unsynchronized hint that the initial scan finished; queries are
/// valid before that, they simply see a prefix of the eventual result.
pub struct WorkspaceIndex {
    inner: RwLock<IndexMaps>,
    ready: AtomicBool,
    workspace_root: PathBuf,
}

impl WorkspaceIndex {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(IndexMaps::default()),
            ready: AtomicBool::new(false),
            workspace_root: workspace_root.into(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Walk the workspace and index every `.rb` file.
    ///
    /// Skipped directories are pruned by base name. Unreadable files are
    /// logged and skipped; the build always runs to completion and then
    /// flips the ready flag.
    pub fn build(&self) {
        log::info!(
            "Starting workspace indexing: {}",
            self.workspace_root.display()
        );

        let mut file_count = 0usize;
        let mut symbol_count = 0usize;

        let walker = WalkDir::new(&self.workspace_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| SKIP_DIRS.contains(&name)))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Skipping unreadable path during indexing: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("rb") {
                continue;
            }

            match extractor::extract_file(path) {
                Ok(entries) if !entries.is_empty() => {
                    symbol_count += entries.len();
                    file_count += 1;
                    if let Ok(mut maps) = self.inner.write() {
                        insert_entries(&mut maps, path, entries);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    log::warn!("Failed to index {}: {err}", path.display());
                }
            }
        }

        self.ready.store(true, Ordering::Release);
        log::info!("Indexing complete: {file_count} files, {symbol_count} symbols");
    }

    /// Replace a single file's entries.
    ///
    /// Extraction runs outside the lock; the removal of stale entries and
    /// the insertion of fresh ones then happen under one exclusive guard, so
    /// readers never observe a half-updated file.
    pub fn update_file(&self, path: &Path) {
        let new_entries = match extractor::extract_file(path) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("Failed to re-index {}: {err}", path.display());
                Vec::new()
            }
        };
        let count = new_entries.len();

        if let Ok(mut maps) = self.inner.write() {
            remove_file_entries(&mut maps, path);
            if !new_entries.is_empty() {
                insert_entries(&mut maps, path, new_entries);
            }
        }

        log::debug!("Re-indexed file: {} ({count} symbols)", path.display());
    }

    /// Exact-name lookup.
    pub fn lookup(&self, name: &str) -> Vec<SymbolEntry> {
        self.inner
            .read()
            .ok()
            .and_then(|maps| maps.by_name.get(name).cloned())
            .unwrap_or_default()
    }

    /// Case-insensitive search over every indexed name, deduplicated by
    /// definition site.
    ///
    /// A key matches when it contains the query anywhere, so interior
    /// CamelCase segments stay searchable: "Cont" finds both
    /// `UsersController` and `ApplicationController`. Narrowing the query
    /// never widens the result set.
    pub fn prefix_search(&self, prefix: &str) -> Vec<SymbolEntry> {
        let needle = prefix.to_lowercase();
        let mut results = Vec::new();

        if let Ok(maps) = self.inner.read() {
            for (name, entries) in maps.by_name.iter() {
                if name.to_lowercase().contains(&needle) {
                    results.extend(entries.iter().cloned());
                }
            }
        }

        deduplicate_entries(results)
    }

    /// All entries extracted from one file.
    pub fn file_symbols(&self, path: &Path) -> Vec<SymbolEntry> {
        self.inner
            .read()
            .ok()
            .and_then(|maps| maps.by_file.get(path).cloned())
            .unwrap_or_default()
    }
}

fn insert_entries(maps: &mut IndexMaps, path: &Path, entries: Vec<SymbolEntry>) {
    for entry in &entries {
        maps.by_name
            .entry(entry.name.clone())
            .or_default()
            .push(entry.clone());
        if entry.fully_qualified_name != entry.name {
            maps.by_name
                .entry(entry.fully_qualified_name.clone())
                .or_default()
                .push(entry.clone());
        }
    }
    maps.by_file.insert(path.to_path_buf(), entries);
}

fn remove_file_entries(maps: &mut IndexMaps, path: &Path) {
    let Some(old_entries) = maps.by_file.remove(path) else {
        return;
    };

    for entry in &old_entries {
        remove_named(&mut maps.by_name, &entry.name, path);
        if entry.fully_qualified_name != entry.name {
            remove_named(&mut maps.by_name, &entry.fully_qualified_name, path);
        }
    }
}

/// Drop every entry under `name` that came from `path`, deleting the key
/// when it empties.
fn remove_named(by_name: &mut HashMap<String, Vec<SymbolEntry>>, name: &str, path: &Path) {
    if let Some(entries) = by_name.get_mut(name) {
        entries.retain(|entry| entry.file_path != path);
        if entries.is_empty() {
            by_name.remove(name);
        }
    }
}

fn deduplicate_entries(entries: Vec<SymbolEntry>) -> Vec<SymbolEntry> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::with_capacity(entries.len());

    for entry in entries {
        let key = format!("{}:{}:{}", entry.file_path.display(), entry.line, entry.name);
        if seen.insert(key) {
            result.push(entry);
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
