//
// property_tests.rs
//
// Property-based tests for edit application and index maintenance
//

#![cfg(test)]

use std::fs;
use std::path::Path;

use lsp_types::{Position, Range};
use proptest::prelude::*;
use tempfile::TempDir;

use crate::document::{ContentChange, Document};
use crate::rails::camel_to_snake;
use crate::workspace_index::WorkspaceIndex;

// ============================================================================
// Generators
// ============================================================================

/// Small multi-line ASCII buffers; enough shape to exercise line math.
fn buffer() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z ]{0,8}", 1..6).prop_map(|lines| lines.join("\n"))
}

fn ruby_identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{2,8}"
}

fn ruby_constant() -> impl Strategy<Value = String> {
    "[A-Z][a-zA-Z0-9]{2,8}"
}

/// Reference implementation of a single edit over a char vector, mirroring
/// the documented semantics directly.
fn apply_reference(text: &str, range: Range, new_text: &str) -> String {
    let doc = Document::new("file:///ref.rb", text, 0, "ruby");
    let start = doc.position_to_offset(range.start);
    let end = doc.position_to_offset(range.end).max(start);

    let chars: Vec<char> = text.chars().collect();
    let mut out: Vec<char> = Vec::new();
    out.extend(&chars[..start]);
    out.extend(new_text.chars());
    out.extend(&chars[end..]);
    out.into_iter().collect()
}

fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

// ============================================================================
// Property: edit application
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A single ranged edit matches the straightforward splice of the code
    /// point interval, wherever the range lands.
    #[test]
    fn prop_single_edit_matches_reference(
        text in buffer(),
        sl in 0u32..6,
        sc in 0u32..10,
        el in 0u32..6,
        ec in 0u32..10,
        insert in "[a-z\n]{0,6}",
    ) {
        let range = Range {
            start: Position { line: sl.min(el), character: if sl <= el { sc } else { ec } },
            end: Position { line: sl.max(el), character: if sl <= el { ec } else { sc } },
        };
        let doc0 = Document::new("file:///p.rb", &text, 0, "ruby");
        let (a, b) = (doc0.position_to_offset(range.start), doc0.position_to_offset(range.end));
        prop_assume!(a <= b);

        let mut doc = Document::new("file:///p.rb", &text, 0, "ruby");
        doc.update(&[ContentChange { range: Some(range), new_text: insert.clone() }]);

        prop_assert_eq!(doc.text(), apply_reference(&text, range, &insert));
        prop_assert_eq!(doc.version, 1);
    }

    /// A batch equals applying its edits one by one from the last to the
    /// first, and bumps the version once.
    #[test]
    fn prop_batch_equals_reverse_singles(
        text in buffer(),
        edits in prop::collection::vec(
            (0u32..4, 0u32..8, 0u32..4, 0u32..8, "[a-z]{0,4}"),
            1..4,
        ),
    ) {
        let changes: Vec<ContentChange> = edits
            .into_iter()
            .map(|(sl, sc, el, ec, new_text)| ContentChange {
                range: Some(Range {
                    start: Position { line: sl.min(el), character: if sl <= el { sc } else { ec } },
                    end: Position { line: sl.max(el), character: if sl <= el { ec } else { sc } },
                }),
                new_text,
            })
            .collect();

        let mut batched = Document::new("file:///p.rb", &text, 0, "ruby");
        batched.update(&changes);

        let mut stepped = Document::new("file:///p.rb", &text, 0, "ruby");
        for change in changes.iter().rev() {
            stepped.update(std::slice::from_ref(change));
        }

        prop_assert_eq!(batched.text(), stepped.text());
        prop_assert_eq!(batched.version, 1);
    }
}

// ============================================================================
// Property: index maintenance
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Re-indexing one file neither disturbs names defined elsewhere nor
    /// leaves stale entries behind.
    #[test]
    fn prop_update_file_is_isolated(
        kept in ruby_constant(),
        before in ruby_identifier(),
        after in ruby_identifier(),
    ) {
        prop_assume!(before != after);
        prop_assume!(kept != "Volatile");

        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "app/models/kept.rb", &format!("class {kept}\nend\n"));
        write_file(
            dir.path(),
            "app/models/volatile.rb",
            &format!("class Volatile\n  def {before}\n  end\nend\n"),
        );

        let index = WorkspaceIndex::new(dir.path());
        index.build();

        let kept_before = index.lookup(&kept);
        prop_assert_eq!(kept_before.len(), 1);

        write_file(
            dir.path(),
            "app/models/volatile.rb",
            &format!("class Volatile\n  def {after}\n  end\nend\n"),
        );
        index.update_file(&dir.path().join("app/models/volatile.rb"));

        prop_assert_eq!(index.lookup(&kept), kept_before);
        prop_assert!(index.lookup(&before).is_empty());
        prop_assert_eq!(index.lookup(&after).len(), 1);
    }

    /// Narrowing a query never widens the result set.
    #[test]
    fn prop_search_is_monotonic(
        names in prop::collection::hash_set("[A-Z][a-zA-Z]{3,8}", 1..6),
        query in "[a-zA-Z]{1,4}",
    ) {
        let dir = TempDir::new().unwrap();
        let body: String = names
            .iter()
            .map(|name| format!("class {name}\nend\n"))
            .collect();
        write_file(dir.path(), "app/models/all.rb", &body);

        let index = WorkspaceIndex::new(dir.path());
        index.build();

        let wide = index.prefix_search(&query);
        let narrow = index.prefix_search(&format!("{query}a"));

        for entry in &narrow {
            prop_assert!(
                wide.iter().any(|candidate| {
                    candidate.file_path == entry.file_path
                        && candidate.line == entry.line
                        && candidate.name == entry.name
                }),
                "{} matched the narrower query only",
                entry.name
            );
        }
    }
}

// ============================================================================
// Property: name conversion
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Snake forms are stable: converting a converted name changes nothing,
    /// and the output never carries uppercase.
    #[test]
    fn prop_camel_to_snake_is_idempotent(word in "[A-Z][a-zA-Z]{0,10}(::[A-Z][a-zA-Z]{0,10}){0,2}") {
        let snake = camel_to_snake(&word);
        prop_assert!(!snake.chars().any(|c| c.is_uppercase()));
        prop_assert_eq!(camel_to_snake(&snake), snake.clone());
    }
}
