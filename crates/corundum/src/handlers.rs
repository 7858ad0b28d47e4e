//
// handlers.rs
//
// Semantic contracts of the LSP methods, expressed over the document store,
// the workspace index, and the convention resolver
//

use lsp_types::{
    CodeActionKind, CodeActionOptions, CodeActionProviderCapability, CompletionItem,
    CompletionItemKind, CompletionList, CompletionOptions, DocumentSymbol,
    FoldingRangeProviderCapability, Hover, HoverContents, HoverProviderCapability,
    InitializeResult, Location, MarkedString, MarkupContent, MarkupKind, OneOf, Position, Range,
    SaveOptions, ServerCapabilities, ServerInfo, SymbolInformation, SymbolKind as LspSymbolKind,
    TextDocumentSyncCapability, TextDocumentSyncKind, TextDocumentSyncOptions,
    TextDocumentSyncSaveOptions, TextEdit, Url,
};

use crate::document_store::DocumentStore;
use crate::extractor::{self, RubySymbolKind, SymbolEntry};
use crate::rails;
use crate::state::{path_to_uri, uri_to_path, GlobalState};
use crate::workspace_index::WorkspaceIndex;

// ============================================================================
// Initialize
// ============================================================================

/// Capabilities advertised to the client.
///
/// Several advertised providers (formatting, references, rename, highlight,
/// folding, code actions) are backed by empty-result handlers; the
/// advertisement is part of the wire contract and is not upgraded silently.
pub fn initialize_result() -> InitializeResult {
    InitializeResult {
        capabilities: ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Options(
                TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::INCREMENTAL),
                    save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                        include_text: Some(false),
                    })),
                    ..Default::default()
                },
            )),
            completion_provider: Some(CompletionOptions {
                trigger_characters: Some(vec![
                    ".".to_string(),
                    ":".to_string(),
                    "@".to_string(),
                ]),
                ..Default::default()
            }),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            definition_provider: Some(OneOf::Left(true)),
            references_provider: Some(OneOf::Left(true)),
            rename_provider: Some(OneOf::Left(true)),
            document_symbol_provider: Some(OneOf::Left(true)),
            workspace_symbol_provider: Some(OneOf::Left(true)),
            document_formatting_provider: Some(OneOf::Left(true)),
            document_highlight_provider: Some(OneOf::Left(true)),
            folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
            code_action_provider: Some(CodeActionProviderCapability::Options(CodeActionOptions {
                code_action_kinds: Some(vec![CodeActionKind::QUICKFIX, CodeActionKind::REFACTOR]),
                ..Default::default()
            })),
            ..Default::default()
        },
        server_info: Some(ServerInfo {
            name: "Ruby LSP Go".to_string(),
            version: Some("1.2.0".to_string()),
        }),
    }
}

// ============================================================================
// Definition
// ============================================================================

pub fn definition(
    store: &DocumentStore,
    index: &WorkspaceIndex,
    uri: &str,
    position: Position,
) -> Vec<Location> {
    if !index.is_ready() {
        return Vec::new();
    }
    let Some(document) = store.get(uri) else {
        return Vec::new();
    };

    let text = document.text();
    let word = word_at_position(&text, position.line as usize, position.character as usize);
    if word.is_empty() {
        return Vec::new();
    }

    log::debug!("Definition lookup for: {word}");

    let entries = resolve_word(index, &word);
    if entries.is_empty() {
        log::debug!("No definition found for: {word}");
    }

    entries.iter().filter_map(entry_location).collect()
}

/// Resolution sequence shared by definition and hover: strip one leading
/// colon, exact lookup, capitalized retry for lowercase words, then the
/// convention resolver.
fn resolve_word(index: &WorkspaceIndex, word: &str) -> Vec<SymbolEntry> {
    let clean = word.strip_prefix(':').unwrap_or(word);

    let mut entries = index.lookup(clean);

    if entries.is_empty() && !is_capitalized(clean) {
        entries = index.lookup(&capitalize(clean));
    }

    if entries.is_empty() {
        let lookup_word = if is_capitalized(clean) {
            clean.to_string()
        } else {
            capitalize(clean)
        };
        entries = rails::lookup_by_convention(index, &lookup_word);
    }

    entries
}

fn entry_location(entry: &SymbolEntry) -> Option<Location> {
    let uri = Url::parse(&path_to_uri(&entry.file_path)).ok()?;
    Some(Location {
        uri,
        range: entry_range(entry),
    })
}

/// Single-line span around the defining identifier, shifted to 0-based
/// lines.
fn entry_range(entry: &SymbolEntry) -> Range {
    Range {
        start: Position {
            line: entry.line.saturating_sub(1),
            character: entry.character,
        },
        end: Position {
            line: entry.line.saturating_sub(1),
            character: entry.character + entry.name.len() as u32,
        },
    }
}

// ============================================================================
// Hover
// ============================================================================

pub fn hover(
    state: &GlobalState,
    store: &DocumentStore,
    index: &WorkspaceIndex,
    uri: &str,
    position: Position,
) -> Hover {
    if !index.is_ready() {
        return empty_hover();
    }
    let Some(document) = store.get(uri) else {
        return empty_hover();
    };

    let text = document.text();
    let word = word_at_position(&text, position.line as usize, position.character as usize);
    if word.is_empty() {
        return empty_hover();
    }

    let entries = resolve_word(index, &word);
    if entries.is_empty() {
        return empty_hover();
    }

    let parts: Vec<String> = entries
        .iter()
        .map(|entry| hover_block(state, entry))
        .collect();

    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: parts.join("\n\n---\n\n"),
        }),
        range: None,
    }
}

fn hover_block(state: &GlobalState, entry: &SymbolEntry) -> String {
    let header = format!(
        "```ruby\n{} {}\n```",
        entry.kind.describe(),
        entry.fully_qualified_name
    );
    let defined_in = format!(
        "**Defined in:** `{}:{}`",
        state.relative_path(&entry.file_path),
        entry.line
    );

    let extra = match entry.kind {
        RubySymbolKind::Class if !entry.detail.is_empty() => {
            format!("\n\n**Inherits from:** `{}`", entry.detail)
        }
        RubySymbolKind::Association if !entry.detail.is_empty() => {
            format!("\n\n**Association type:** `{}`", entry.detail)
        }
        RubySymbolKind::AttrAccessor if !entry.detail.is_empty() => {
            format!("\n\n**Accessor type:** `{}`", entry.detail)
        }
        RubySymbolKind::Scope => "\n\n**Type:** ActiveRecord scope".to_string(),
        _ => String::new(),
    };

    format!("{header}\n\n{defined_in}{extra}")
}

/// The "no result" hover shape: empty string contents, not null.
fn empty_hover() -> Hover {
    Hover {
        contents: HoverContents::Scalar(MarkedString::String(String::new())),
        range: None,
    }
}

// ============================================================================
// Completion
// ============================================================================

const MAX_RESULTS: usize = 50;

pub fn completion(
    store: &DocumentStore,
    index: &WorkspaceIndex,
    uri: &str,
    position: Position,
) -> CompletionList {
    let empty = CompletionList {
        is_incomplete: false,
        items: Vec::new(),
    };

    if !index.is_ready() {
        return empty;
    }
    let Some(document) = store.get(uri) else {
        return empty;
    };

    let text = document.text();
    let word = word_at_position(&text, position.line as usize, position.character as usize);
    if word.chars().count() < 2 {
        return empty;
    }

    let entries = index.prefix_search(&word);

    let mut items = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for entry in &entries {
        if !seen.insert(entry.name.clone()) {
            continue;
        }

        let mut detail = entry.kind.describe().to_string();
        if !entry.parent.is_empty() {
            detail.push_str(" in ");
            detail.push_str(&entry.parent);
        }

        items.push(CompletionItem {
            label: entry.name.clone(),
            kind: Some(completion_kind(entry.kind)),
            detail: Some(detail),
            ..Default::default()
        });

        if items.len() >= MAX_RESULTS {
            break;
        }
    }

    CompletionList {
        is_incomplete: items.len() >= MAX_RESULTS,
        items,
    }
}

fn completion_kind(kind: RubySymbolKind) -> CompletionItemKind {
    match kind {
        RubySymbolKind::Class => CompletionItemKind::CLASS,
        RubySymbolKind::Module => CompletionItemKind::MODULE,
        RubySymbolKind::InstanceMethod | RubySymbolKind::SingletonMethod => {
            CompletionItemKind::METHOD
        }
        RubySymbolKind::Constant => CompletionItemKind::CONSTANT,
        RubySymbolKind::Scope => CompletionItemKind::METHOD,
        RubySymbolKind::Association => CompletionItemKind::FIELD,
        RubySymbolKind::AttrAccessor => CompletionItemKind::PROPERTY,
    }
}

// ============================================================================
// Document Symbols
// ============================================================================

#[allow(deprecated)]
pub fn document_symbol(
    store: &DocumentStore,
    index: Option<&WorkspaceIndex>,
    uri: &str,
) -> Vec<DocumentSymbol> {
    let path = uri_to_path(uri);

    let entries = index
        .map(|index| index.file_symbols(&path))
        .unwrap_or_default();

    if !entries.is_empty() {
        return entries
            .iter()
            .map(|entry| DocumentSymbol {
                name: entry.name.clone(),
                detail: (!entry.detail.is_empty()).then(|| entry.detail.clone()),
                kind: symbol_kind(entry.kind),
                tags: None,
                deprecated: None,
                range: Range {
                    start: Position {
                        line: entry.line.saturating_sub(1),
                        character: 0,
                    },
                    end: Position {
                        line: entry.line.saturating_sub(1),
                        character: entry.character + entry.name.len() as u32,
                    },
                },
                selection_range: entry_range(entry),
                children: None,
            })
            .collect();
    }

    // The index has nothing for this file (not indexed yet, or outside the
    // workspace); extract from the live buffer instead, keeping only the
    // structural nodes.
    let Some(document) = store.get(uri) else {
        return Vec::new();
    };
    let text = document.text();

    extractor::extract_symbols(&text, &path)
        .into_iter()
        .filter(|entry| {
            matches!(
                entry.kind,
                RubySymbolKind::Class
                    | RubySymbolKind::Module
                    | RubySymbolKind::InstanceMethod
                    | RubySymbolKind::SingletonMethod
            )
        })
        .map(|entry| DocumentSymbol {
            name: entry.name.clone(),
            detail: None,
            kind: symbol_kind(entry.kind),
            tags: None,
            deprecated: None,
            range: entry_range(&entry),
            selection_range: entry_range(&entry),
            children: None,
        })
        .collect()
}

fn symbol_kind(kind: RubySymbolKind) -> LspSymbolKind {
    match kind {
        RubySymbolKind::Class => LspSymbolKind::CLASS,
        RubySymbolKind::Module => LspSymbolKind::MODULE,
        RubySymbolKind::InstanceMethod | RubySymbolKind::SingletonMethod => LspSymbolKind::METHOD,
        RubySymbolKind::Constant => LspSymbolKind::CONSTANT,
        RubySymbolKind::Scope => LspSymbolKind::METHOD,
        RubySymbolKind::Association => LspSymbolKind::PROPERTY,
        RubySymbolKind::AttrAccessor => LspSymbolKind::PROPERTY,
    }
}

// ============================================================================
// Workspace Symbols
// ============================================================================

#[allow(deprecated)]
pub fn workspace_symbol(
    state: &GlobalState,
    index: &WorkspaceIndex,
    query: &str,
) -> Vec<SymbolInformation> {
    if !index.is_ready() || query.chars().count() < 2 {
        return Vec::new();
    }

    index
        .prefix_search(query)
        .iter()
        .take(MAX_RESULTS)
        .filter_map(|entry| {
            let location = entry_location(entry)?;
            Some(SymbolInformation {
                name: entry.fully_qualified_name.clone(),
                kind: symbol_kind(entry.kind),
                tags: None,
                deprecated: None,
                location,
                container_name: Some(state.relative_path(&entry.file_path)),
            })
        })
        .collect()
}

// ============================================================================
// Formatting
// ============================================================================

/// Formatter integration is out of scope; the provider is advertised and
/// answers with no edits.
pub fn formatting() -> Vec<TextEdit> {
    Vec::new()
}

// ============================================================================
// Word helpers
// ============================================================================

/// The word under the cursor: the maximal run of word characters around the
/// `character`-th code point of the line. Word characters are letters,
/// digits, and `_ : ! ? =`, which keeps symbols (`:name`), setters
/// (`name=`), and predicates (`admin?`) whole.
pub fn word_at_position(source: &str, line: usize, character: usize) -> String {
    let Some(line_text) = source.split('\n').nth(line) else {
        return String::new();
    };
    let chars: Vec<char> = line_text.chars().collect();

    if character >= chars.len() {
        return String::new();
    }

    let mut start = character;
    while start > 0 && is_word_char(chars[start - 1]) {
        start -= 1;
    }

    let mut end = character;
    while end < chars.len() && is_word_char(chars[end]) {
        end += 1;
    }

    chars[start..end].iter().collect()
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | ':' | '!' | '?' | '=')
}

fn is_capitalized(word: &str) -> bool {
    word.as_bytes().first().is_some_and(u8::is_ascii_uppercase)
}

/// snake_case → CamelCase: capitalize the first character of each
/// underscore-separated part and concatenate.
fn capitalize(word: &str) -> String {
    word.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
