//
// rails.rs
//
// Maps identifiers to candidate source files under Rails directory
// conventions, for definitions the index does not know about
//

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::extractor::{RubySymbolKind, SymbolEntry, Visibility};
use crate::workspace_index::WorkspaceIndex;

/// Conventional directories probed for `<snake_name>.rb`, in resolution
/// order.
const CONVENTION_DIRS: &[&str] = &[
    "app/models",
    "app/controllers",
    "app/services",
    "app/serializers",
    "app/jobs",
    "app/mailers",
    "app/helpers",
    "app/workers",
    "app/policies",
    "app/forms",
    "app/decorators",
    "app/validators",
    "app/interactors",
    "app/operations",
    "lib",
    "app/models/concerns",
    "app/controllers/concerns",
];

/// Resolve a word to definition sites, falling back to Rails conventions.
///
/// Tries the index first. On a miss the word is converted to its snake-case
/// file form and probed against the conventional directories; any path that
/// exists yields a synthetic class entry at line 1. As a last resort the
/// whole `app/` tree is searched for a matching file name.
pub fn lookup_by_convention(index: &WorkspaceIndex, word: &str) -> Vec<SymbolEntry> {
    let entries = index.lookup(word);
    if !entries.is_empty() {
        return entries;
    }

    let snake = camel_to_snake(word);
    let file_name = format!("{snake}.rb");
    let root = index.workspace_root();

    let mut results: Vec<SymbolEntry> = CONVENTION_DIRS
        .iter()
        .map(|dir| root.join(dir).join(&file_name))
        .filter(|path| path.is_file())
        .map(|path| synthetic_entry(word, path))
        .collect();

    if results.is_empty() {
        results = glob_app_tree(root, &file_name)
            .into_iter()
            .map(|path| synthetic_entry(word, path))
            .collect();
    }

    results
}

/// Recursive search of `app/` for files whose path ends with the snake-cased
/// name (which may itself carry directory components from a `::` namespace).
fn glob_app_tree(root: &Path, file_name: &str) -> Vec<PathBuf> {
    let suffix = Path::new(file_name);
    let app_dir = root.join("app");

    WalkDir::new(app_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.ends_with(suffix))
        .collect()
}

fn synthetic_entry(word: &str, path: PathBuf) -> SymbolEntry {
    SymbolEntry {
        name: word.to_string(),
        fully_qualified_name: word.to_string(),
        kind: RubySymbolKind::Class,
        file_path: path,
        line: 1,
        character: 0,
        parent: String::new(),
        visibility: Visibility::Public,
        detail: String::new(),
    }
}

/// Rails file-name form of an identifier: `::` becomes `/`, an underscore is
/// inserted before each interior uppercase letter that follows a lowercase
/// letter or that starts the lowercase tail of an acronym, and the result is
/// lowercased. `HTMLParser` → `html_parser`, `Foo::Bar` → `foo/bar`.
pub fn camel_to_snake(word: &str) -> String {
    let word = word.replace("::", "/");
    let chars: Vec<char> = word.chars().collect();
    let mut result = String::with_capacity(word.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            if i > 0 && chars[i - 1] != '/' {
                let prev_upper = chars[i - 1].is_uppercase();
                let next_lower = chars.get(i + 1).is_some_and(|next| next.is_lowercase());
                if (next_lower && prev_upper) || !prev_upper {
                    result.push('_');
                }
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
