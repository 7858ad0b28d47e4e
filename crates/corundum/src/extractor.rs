//
// extractor.rs
//
// Heuristic, line-oriented recognition of Ruby definition forms
//

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

/// The closed set of definition kinds the extractor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RubySymbolKind {
    Class,
    Module,
    InstanceMethod,
    SingletonMethod,
    Constant,
    Scope,
    Association,
    AttrAccessor,
}

impl RubySymbolKind {
    /// Human-readable kind label, as shown in hover headers and completion
    /// details.
    pub fn describe(self) -> &'static str {
        match self {
            RubySymbolKind::Class => "class",
            RubySymbolKind::Module => "module",
            RubySymbolKind::InstanceMethod => "method",
            RubySymbolKind::SingletonMethod => "class method",
            RubySymbolKind::Constant => "constant",
            RubySymbolKind::Scope => "scope",
            RubySymbolKind::Association => "association",
            RubySymbolKind::AttrAccessor => "attribute",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Protected,
}

/// One definition site found in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    /// Short identifier as written.
    pub name: String,
    /// Scoped form: `::` for types and constants, `#` for instance methods,
    /// `.` for singleton methods and scopes.
    pub fully_qualified_name: String,
    pub kind: RubySymbolKind,
    pub file_path: PathBuf,
    /// 1-based, as reported to clients after the `-1` shift.
    pub line: u32,
    /// 0-based column of the defining identifier.
    pub character: u32,
    /// Enclosing class/module scope joined by `::`; empty at top level.
    pub parent: String,
    pub visibility: Visibility,
    /// Kind-specific extra: superclass, association form, or accessor form.
    pub detail: String,
}

static CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*class\s+([A-Z][\w:]*)\s*(?:<\s*([A-Z][\w:]*))?").unwrap());
static MODULE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*module\s+([A-Z][\w:]*)").unwrap());
static METHOD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*def\s+(self\.)?(\w+[!?=]?)").unwrap());
static CONSTANT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([A-Z][A-Z0-9_]*)\s*=").unwrap());
static SCOPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*scope\s+:(\w+)").unwrap());
static ASSOCIATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(belongs_to|has_many|has_one|has_and_belongs_to_many)\s+:(\w+)").unwrap()
});
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(attr_accessor|attr_reader|attr_writer)\s+(.+)").unwrap());
static SYMBOL_LIST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r":(\w+)").unwrap());
static END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*end\b").unwrap());
static VISIBILITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(private|protected|public)\s*$").unwrap());
static INCLUDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(include|extend|prepend)\s+[A-Z][\w:]*").unwrap());

/// Read a file and extract its definitions. I/O errors bubble up so the
/// caller can log and move on.
pub fn extract_file(path: &Path) -> io::Result<Vec<SymbolEntry>> {
    let source = fs::read_to_string(path)?;
    Ok(extract_symbols(&source, path))
}

/// Single pass over a source buffer, emitting one entry per recognized
/// definition.
///
/// The recognizer is intentionally line-oriented: no multi-line
/// continuations, heredocs, or string-literal awareness. Scope tracking uses
/// a nesting stack of enclosing class/module short names paired with the
/// indentation column each scope opened at; an `end` pops one level only
/// when its own indentation is at or left of the innermost open scope, which
/// tolerates block `end`s at deeper columns. Ill-formed input never fails:
/// unrecognized lines are skipped.
pub fn extract_symbols(source: &str, file_path: &Path) -> Vec<SymbolEntry> {
    let mut entries = Vec::new();

    let mut nesting_stack: Vec<String> = Vec::new();
    let mut indent_stack: Vec<usize> = Vec::new();
    let mut visibility = Visibility::Public;

    for (index, line) in source.lines().enumerate() {
        let line_number = (index + 1) as u32;

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let indent = count_indent(line);

        if END_RE.is_match(line) {
            if let Some(&top) = indent_stack.last() {
                if indent <= top {
                    nesting_stack.pop();
                    indent_stack.pop();
                    visibility = Visibility::Public;
                }
            }
            continue;
        }

        if let Some(captures) = VISIBILITY_RE.captures(line) {
            visibility = match &captures[1] {
                "private" => Visibility::Private,
                "protected" => Visibility::Protected,
                _ => Visibility::Public,
            };
            continue;
        }

        let parent = nesting_stack.join("::");

        if let Some(captures) = CLASS_RE.captures(line) {
            let name = captures[1].to_string();
            let superclass = captures.get(2).map_or("", |m| m.as_str()).to_string();

            entries.push(SymbolEntry {
                fully_qualified_name: qualify_type(&parent, &name),
                name: name.clone(),
                kind: RubySymbolKind::Class,
                file_path: file_path.to_path_buf(),
                line: line_number,
                character: column_after_keyword(line, "class"),
                parent,
                visibility: Visibility::Public,
                detail: superclass,
            });

            nesting_stack.push(short_name(&name).to_string());
            indent_stack.push(indent);
            visibility = Visibility::Public;
            continue;
        }

        if let Some(captures) = MODULE_RE.captures(line) {
            let name = captures[1].to_string();

            entries.push(SymbolEntry {
                fully_qualified_name: qualify_type(&parent, &name),
                name: name.clone(),
                kind: RubySymbolKind::Module,
                file_path: file_path.to_path_buf(),
                line: line_number,
                character: column_after_keyword(line, "module"),
                parent,
                visibility: Visibility::Public,
                detail: String::new(),
            });

            nesting_stack.push(short_name(&name).to_string());
            indent_stack.push(indent);
            visibility = Visibility::Public;
            continue;
        }

        if let Some(captures) = METHOD_RE.captures(line) {
            let singleton = captures.get(1).is_some();
            let name = captures[2].to_string();

            let kind = if singleton {
                RubySymbolKind::SingletonMethod
            } else {
                RubySymbolKind::InstanceMethod
            };
            let fully_qualified_name = if parent.is_empty() {
                name.clone()
            } else {
                let separator = if singleton { "." } else { "#" };
                format!("{parent}{separator}{name}")
            };

            entries.push(SymbolEntry {
                name,
                fully_qualified_name,
                kind,
                file_path: file_path.to_path_buf(),
                line: line_number,
                character: column_after_keyword(line, "def"),
                parent,
                visibility,
                detail: String::new(),
            });
            continue;
        }

        if let Some(captures) = CONSTANT_RE.captures(line) {
            let name = captures[1].to_string();

            entries.push(SymbolEntry {
                fully_qualified_name: qualify_type(&parent, &name),
                character: column_of(line, &name),
                name,
                kind: RubySymbolKind::Constant,
                file_path: file_path.to_path_buf(),
                line: line_number,
                parent,
                visibility: Visibility::Public,
                detail: String::new(),
            });
            continue;
        }

        if let Some(captures) = SCOPE_RE.captures(line) {
            let name = captures[1].to_string();

            entries.push(SymbolEntry {
                fully_qualified_name: format!("{parent}.{name}"),
                character: column_of(line, &format!(":{name}")) + 1,
                name,
                kind: RubySymbolKind::Scope,
                file_path: file_path.to_path_buf(),
                line: line_number,
                parent,
                visibility: Visibility::Public,
                detail: "scope".to_string(),
            });
            continue;
        }

        if let Some(captures) = ASSOCIATION_RE.captures(line) {
            let form = captures[1].to_string();
            let name = captures[2].to_string();

            entries.push(SymbolEntry {
                fully_qualified_name: format!("{parent}#{name}"),
                character: column_of(line, &format!(":{name}")) + 1,
                name,
                kind: RubySymbolKind::Association,
                file_path: file_path.to_path_buf(),
                line: line_number,
                parent,
                visibility: Visibility::Public,
                detail: form,
            });
            continue;
        }

        if let Some(captures) = ATTR_RE.captures(line) {
            let form = captures[1].to_string();
            let list = captures.get(2).map_or("", |m| m.as_str());

            for symbol in SYMBOL_LIST_RE.captures_iter(list) {
                let name = symbol[1].to_string();
                entries.push(SymbolEntry {
                    fully_qualified_name: format!("{parent}#{name}"),
                    character: column_of(line, &format!(":{name}")) + 1,
                    name,
                    kind: RubySymbolKind::AttrAccessor,
                    file_path: file_path.to_path_buf(),
                    line: line_number,
                    parent: parent.clone(),
                    visibility,
                    detail: form.clone(),
                });
            }
            continue;
        }

        if INCLUDE_RE.is_match(line) {
            // Mixin references are recognized but are not definitions.
            continue;
        }
    }

    entries
}

/// Indentation in columns, tabs counted as two.
fn count_indent(line: &str) -> usize {
    let mut columns = 0;
    for ch in line.chars() {
        match ch {
            ' ' => columns += 1,
            '\t' => columns += 2,
            _ => break,
        }
    }
    columns
}

/// `parent::name`, unless the name is already qualified or there is no
/// parent.
fn qualify_type(parent: &str, name: &str) -> String {
    if parent.is_empty() || name.contains("::") {
        name.to_string()
    } else {
        format!("{parent}::{name}")
    }
}

/// Last `::` segment of a possibly-qualified name.
fn short_name(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

/// Column just past `keyword ` on the line.
fn column_after_keyword(line: &str, keyword: &str) -> u32 {
    match line.find(keyword) {
        Some(at) => (at + keyword.len() + 1) as u32,
        None => 0,
    }
}

fn column_of(line: &str, needle: &str) -> u32 {
    line.find(needle).unwrap_or(0) as u32
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> Vec<SymbolEntry> {
        extract_symbols(source, Path::new("/workspace/app/models/user.rb"))
    }

    fn names(entries: &[SymbolEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_class_with_superclass() {
        let entries = extract("class User < ApplicationRecord\nend\n");

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.name, "User");
        assert_eq!(entry.fully_qualified_name, "User");
        assert_eq!(entry.kind, RubySymbolKind::Class);
        assert_eq!(entry.detail, "ApplicationRecord");
        assert_eq!(entry.line, 1);
        assert_eq!(entry.character, 6);
        assert_eq!(entry.parent, "");
    }

    #[test]
    fn test_nested_module_and_class() {
        let entries = extract(
            "module Admin\n  class UsersController < ApplicationController\n    def index\n    end\n  end\nend\n",
        );

        assert_eq!(names(&entries), vec!["Admin", "UsersController", "index"]);
        assert_eq!(entries[1].parent, "Admin");
        assert_eq!(entries[1].fully_qualified_name, "Admin::UsersController");
        assert_eq!(entries[2].parent, "Admin::UsersController");
        assert_eq!(
            entries[2].fully_qualified_name,
            "Admin::UsersController#index"
        );
    }

    #[test]
    fn test_qualified_class_name_is_not_requalified() {
        let entries = extract("module Admin\n  class Api::Client\n  end\nend\n");
        assert_eq!(entries[1].fully_qualified_name, "Api::Client");
        // Nesting tracks the short name only.
        assert_eq!(entries[1].parent, "Admin");
    }

    #[test]
    fn test_instance_and_singleton_methods() {
        let entries = extract(
            "class User\n  def full_name\n  end\n\n  def self.find_by_login(login)\n  end\nend\n",
        );

        assert_eq!(entries[1].kind, RubySymbolKind::InstanceMethod);
        assert_eq!(entries[1].fully_qualified_name, "User#full_name");
        assert_eq!(entries[2].kind, RubySymbolKind::SingletonMethod);
        assert_eq!(entries[2].fully_qualified_name, "User.find_by_login");
        assert_eq!(entries[2].name, "find_by_login");
    }

    #[test]
    fn test_method_suffix_characters() {
        let entries = extract("class User\n  def admin?\n  end\n  def save!\n  end\n  def name=(v)\n  end\nend\n");
        assert_eq!(names(&entries), vec!["User", "admin?", "save!", "name="]);
    }

    #[test]
    fn test_constants() {
        let entries = extract("class User\n  MAX_LOGIN_ATTEMPTS = 3\nend\n");

        let constant = &entries[1];
        assert_eq!(constant.kind, RubySymbolKind::Constant);
        assert_eq!(constant.name, "MAX_LOGIN_ATTEMPTS");
        assert_eq!(constant.fully_qualified_name, "User::MAX_LOGIN_ATTEMPTS");
        assert_eq!(constant.character, 2);
    }

    #[test]
    fn test_mixed_case_assignment_is_not_a_constant() {
        let entries = extract("Foo = Struct.new(:a)\nbar = 1\n");
        assert!(entries.is_empty());
    }

    #[test]
    fn test_scope() {
        let entries = extract("class User\n  scope :active, -> { where(active: true) }\nend\n");

        let scope = &entries[1];
        assert_eq!(scope.kind, RubySymbolKind::Scope);
        assert_eq!(scope.name, "active");
        assert_eq!(scope.fully_qualified_name, "User.active");
        assert_eq!(scope.detail, "scope");
        // Column of the identifier after the colon.
        assert_eq!(scope.character, 9);
    }

    #[test]
    fn test_associations() {
        let entries = extract(
            "class User\n  has_many :posts\n  belongs_to :organization\n  has_one :profile\n  has_and_belongs_to_many :roles\nend\n",
        );

        let forms: Vec<(&str, &str)> = entries[1..]
            .iter()
            .map(|e| (e.name.as_str(), e.detail.as_str()))
            .collect();
        assert_eq!(
            forms,
            vec![
                ("posts", "has_many"),
                ("organization", "belongs_to"),
                ("profile", "has_one"),
                ("roles", "has_and_belongs_to_many"),
            ]
        );
        assert!(entries[1..]
            .iter()
            .all(|e| e.kind == RubySymbolKind::Association));
        assert_eq!(entries[1].fully_qualified_name, "User#posts");
    }

    #[test]
    fn test_attr_list_emits_one_entry_per_symbol() {
        let entries = extract("class User\n  attr_accessor :first_name, :last_name\n  attr_reader :id\nend\n");

        assert_eq!(names(&entries), vec!["User", "first_name", "last_name", "id"]);
        assert_eq!(entries[1].detail, "attr_accessor");
        assert_eq!(entries[3].detail, "attr_reader");
        assert_eq!(entries[1].fully_qualified_name, "User#first_name");
        assert!(entries[1..]
            .iter()
            .all(|e| e.kind == RubySymbolKind::AttrAccessor));
    }

    #[test]
    fn test_visibility_tracking() {
        let entries = extract(
            "class User\n  def visible\n  end\n  private\n  def hidden\n  end\n  protected\n  def guarded\n  end\nend\n",
        );

        assert_eq!(entries[1].visibility, Visibility::Public);
        assert_eq!(entries[2].visibility, Visibility::Private);
        assert_eq!(entries[3].visibility, Visibility::Protected);
    }

    #[test]
    fn test_visibility_resets_when_scope_closes() {
        let entries = extract(
            "class A\n  private\n  def hidden\n  end\nend\nclass B\n  def open\n  end\nend\n",
        );

        assert_eq!(entries[1].name, "hidden");
        assert_eq!(entries[1].visibility, Visibility::Private);
        assert_eq!(entries[3].name, "open");
        assert_eq!(entries[3].visibility, Visibility::Public);
    }

    #[test]
    fn test_deeper_end_does_not_pop_scope() {
        // The block's `end` sits right of the class's indent column and must
        // not close the class scope.
        let entries = extract(
            "class User\n  CALLBACK = lambda do\n    1\n    end\n  def still_inside\n  end\nend\n",
        );

        let method = entries.iter().find(|e| e.name == "still_inside").unwrap();
        assert_eq!(method.parent, "User");
    }

    #[test]
    fn test_end_at_scope_column_pops() {
        let entries = extract("module A\n  class B\n  end\n  class C\n  end\nend\n");
        assert_eq!(entries[1].parent, "A");
        assert_eq!(entries[2].parent, "A");
    }

    #[test]
    fn test_tabs_count_as_two_columns() {
        let entries = extract("class A\n\tdef tabbed\n\tend\nend\n");
        // Tab indent (2 columns) keeps the method inside the class, and the
        // tabbed `end` pops nothing until the final column-0 `end`.
        assert_eq!(entries[1].parent, "A");
    }

    #[test]
    fn test_comments_and_blanks_ignored() {
        let entries = extract("# class Commented\n\nclass Real\n  # def ghost\nend\n");
        assert_eq!(names(&entries), vec!["Real"]);
    }

    #[test]
    fn test_includes_recognized_but_not_emitted() {
        let entries = extract("class User\n  include Searchable\n  extend ClassMethods\n  prepend Auditing\nend\n");
        assert_eq!(names(&entries), vec!["User"]);
    }

    #[test]
    fn test_ill_formed_input_never_fails() {
        let source = "class \u{1F600}\n  def\nend end end\n\tclass lower\nMAX =\n  scope :\n";
        let entries = extract(source);
        // Nothing recognizable; the point is that nothing panics.
        assert!(entries.iter().all(|e| !e.name.is_empty()));
    }

    #[test]
    fn test_keyword_columns() {
        let entries = extract("  class Indented\n    def deep\n    end\n  end\n");
        assert_eq!(entries[0].character, 8);
        assert_eq!(entries[1].character, 8);
    }

    #[test]
    fn test_line_numbers_are_one_based() {
        let entries = extract("\n\nclass Late\nend\n");
        assert_eq!(entries[0].line, 3);
    }

    #[test]
    fn test_extract_file_missing_path_errors() {
        assert!(extract_file(Path::new("/nonexistent/definitely/missing.rb")).is_err());
    }
}
