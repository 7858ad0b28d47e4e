//
// state.rs
//
// Per-process server state and initialization options
//

// Configuration values are stored whether or not a feature consults them.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

/// Feature switches recognized under `enabledFeatures` in the
/// initialization options. Stored, and consulted only where a feature has a
/// handler; everything defaults on except inlay hints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnabledFeatures {
    pub code_actions: bool,
    pub diagnostics: bool,
    pub document_highlights: bool,
    pub document_symbols: bool,
    pub folding_ranges: bool,
    pub formatting: bool,
    pub hover: bool,
    pub inlay_hint: bool,
    pub on_type_formatting: bool,
    pub selection_ranges: bool,
    pub semantic_highlighting: bool,
    pub completion: bool,
    pub definition: bool,
    pub references: bool,
    pub signatures_help: bool,
    pub workspace_symbol: bool,
}

impl Default for EnabledFeatures {
    fn default() -> Self {
        Self {
            code_actions: true,
            diagnostics: true,
            document_highlights: true,
            document_symbols: true,
            folding_ranges: true,
            formatting: true,
            hover: true,
            inlay_hint: false,
            on_type_formatting: true,
            selection_ranges: true,
            semantic_highlighting: true,
            completion: true,
            definition: true,
            references: true,
            signatures_help: true,
            workspace_symbol: true,
        }
    }
}

/// Recognized `initializationOptions`. Unknown fields are ignored; absent
/// fields keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializationOptions {
    pub formatter: Option<String>,
    pub linters: Vec<String>,
    pub enabled_features: EnabledFeatures,
}

/// Workspace identity, configuration, and client capability bag.
///
/// Initialized once while handling `initialize` and read-only afterwards;
/// the single reader task plus value snapshots make a lock unnecessary.
#[derive(Debug, Clone)]
pub struct GlobalState {
    pub workspace_uri: String,
    pub workspace_path: PathBuf,
    pub formatter: String,
    pub linters: Vec<String>,
    pub enabled_features: EnabledFeatures,
    pub client_capabilities: serde_json::Value,
}

impl GlobalState {
    /// State before `initialize`: the workspace defaults to the process
    /// working directory.
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            workspace_uri: format!("file://{}", cwd.display()),
            workspace_path: cwd,
            formatter: "auto".to_string(),
            linters: Vec::new(),
            enabled_features: EnabledFeatures::default(),
            client_capabilities: serde_json::Value::Null,
        }
    }

    pub fn apply_initialization_options(&mut self, options: &serde_json::Value) {
        let parsed: InitializationOptions =
            serde_json::from_value(options.clone()).unwrap_or_default();
        if let Some(formatter) = parsed.formatter {
            self.formatter = formatter;
        }
        self.linters = parsed.linters;
        self.enabled_features = parsed.enabled_features;
    }

    /// Workspace-relative rendering of a path, used in hover bodies and
    /// workspace symbol containers. Paths outside the workspace come back
    /// unchanged.
    pub fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.workspace_path)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

/// Filesystem path of a `file://` URI; other strings pass through as paths,
/// matching how editors hand over bare `rootPath` values.
pub fn uri_to_path(uri: &str) -> PathBuf {
    if let Some(rest) = uri.strip_prefix("file://") {
        if let Ok(parsed) = Url::parse(uri) {
            if let Ok(path) = parsed.to_file_path() {
                return path;
            }
            return PathBuf::from(parsed.path());
        }
        return PathBuf::from(rest);
    }
    PathBuf::from(uri)
}

/// `file://` form of a filesystem path: absolute paths get the two-slash
/// prefix, anything else three.
pub fn path_to_uri(path: &Path) -> String {
    if path.is_absolute() {
        format!("file://{}", path.display())
    } else {
        format!("file:///{}", path.display())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_defaults() {
        let features = EnabledFeatures::default();
        assert!(features.hover);
        assert!(features.completion);
        assert!(features.workspace_symbol);
        assert!(!features.inlay_hint);
    }

    #[test]
    fn test_apply_initialization_options() {
        let mut state = GlobalState::new();
        state.apply_initialization_options(&json!({
            "formatter": "rubocop",
            "linters": ["rubocop", "standard"],
            "enabledFeatures": {
                "hover": false,
                "inlayHint": true
            }
        }));

        assert_eq!(state.formatter, "rubocop");
        assert_eq!(state.linters, vec!["rubocop", "standard"]);
        assert!(!state.enabled_features.hover);
        assert!(state.enabled_features.inlay_hint);
        // Absent keys keep their defaults.
        assert!(state.enabled_features.completion);
    }

    #[test]
    fn test_unusable_options_keep_defaults() {
        let mut state = GlobalState::new();
        state.apply_initialization_options(&json!("not an object"));
        assert_eq!(state.formatter, "auto");
        assert!(state.enabled_features.hover);
    }

    #[test]
    fn test_uri_to_path() {
        assert_eq!(uri_to_path("file:///t/u.rb"), PathBuf::from("/t/u.rb"));
        assert_eq!(uri_to_path("/plain/path.rb"), PathBuf::from("/plain/path.rb"));
        assert_eq!(
            uri_to_path("file:///dir%20with%20space/a.rb"),
            PathBuf::from("/dir with space/a.rb")
        );
    }

    #[test]
    fn test_path_to_uri() {
        assert_eq!(path_to_uri(Path::new("/t/u.rb")), "file:///t/u.rb");
        assert_eq!(path_to_uri(Path::new("rel/u.rb")), "file:///rel/u.rb");
    }

    #[test]
    fn test_relative_path() {
        let mut state = GlobalState::new();
        state.workspace_path = PathBuf::from("/workspace");
        assert_eq!(
            state.relative_path(Path::new("/workspace/app/models/user.rb")),
            "app/models/user.rb"
        );
        assert_eq!(state.relative_path(Path::new("/elsewhere/x.rb")), "/elsewhere/x.rb");
    }
}
