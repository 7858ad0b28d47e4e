//
// backend.rs
//
// Request router: frames in, dispatch by method, responses out under a
// writer lock; background tasks for indexing work
//

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;

use crate::document::ContentChange;
use crate::document_store::DocumentStore;
use crate::framing::{self, FrameError};
use crate::handlers;
use crate::state::{uri_to_path, GlobalState};
use crate::workspace_index::WorkspaceIndex;

/// JSON-RPC request id: a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// Decoded inbound message. Requests carry an id; notifications do not.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
}

#[derive(Serialize)]
struct Response<'a> {
    jsonrpc: &'static str,
    id: &'a RequestId,
    result: Value,
}

/// Capacity of the queue that absorbs unrecognized methods.
const BACKGROUND_QUEUE_SIZE: usize = 100;

enum Flow {
    Continue,
    Exit(i32),
}

/// Start the server on stdin/stdout and terminate the process when the
/// session ends.
pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let backend = Backend::new(stdout);
    let code = backend.run(stdin).await;
    std::process::exit(code);
}

/// The server: shared state plus the outbound writer.
///
/// One task reads and dispatches frames; request handlers run inline on
/// that task, while the initial index build and per-save re-indexing run as
/// detached blocking tasks. All outbound frames go through `writer`, whose
/// lock keeps whole messages atomic.
pub struct Backend<W> {
    state: GlobalState,
    store: Arc<DocumentStore>,
    index: Option<Arc<WorkspaceIndex>>,
    cancelled: Arc<Mutex<HashSet<RequestId>>>,
    writer: Arc<tokio::sync::Mutex<W>>,
    background_tx: Option<mpsc::Sender<Message>>,
    /// Detached indexing tasks, joined on shutdown so none outlive the
    /// session.
    tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_requested: bool,
}

impl<W> Backend<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self {
            state: GlobalState::new(),
            store: Arc::new(DocumentStore::new()),
            index: None,
            cancelled: Arc::new(Mutex::new(HashSet::new())),
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            background_tx: None,
            tasks: Vec::new(),
            shutdown_requested: false,
        }
    }

    /// Consume frames until the stream ends or the client sends `exit`.
    ///
    /// Returns the process exit code: 0 after an orderly shutdown, 1
    /// otherwise. Transport errors short of EOF are logged and the loop
    /// resynchronizes at the next frame.
    pub async fn run<R>(mut self, mut reader: R) -> i32
    where
        R: AsyncBufRead + Unpin,
    {
        self.spawn_background_drain();

        loop {
            let payload = match framing::read_message(&mut reader).await {
                Ok(payload) => payload,
                Err(FrameError::EndOfStream) => break,
                Err(err) => {
                    log::warn!("Error reading message: {err}");
                    continue;
                }
            };

            let message: Message = match serde_json::from_value(payload) {
                Ok(message) => message,
                Err(err) => {
                    log::warn!("Discarding undecodable message: {err}");
                    continue;
                }
            };

            match self.dispatch(message).await {
                Flow::Continue => {}
                Flow::Exit(code) => return code,
            }
        }

        if self.shutdown_requested {
            0
        } else {
            1
        }
    }

    async fn dispatch(&mut self, message: Message) -> Flow {
        let method = message.method.clone().unwrap_or_default();

        if self.shutdown_requested && method != "exit" {
            log::debug!("Refusing message after shutdown: {method}");
            return Flow::Continue;
        }

        match method.as_str() {
            "initialize" => {
                self.handle_initialize(&message.params);
                self.respond(&message, result_value(handlers::initialize_result()))
                    .await;
            }
            "initialized" => {
                log::info!("Initialization complete");
            }
            "shutdown" => {
                log::info!("Shutting down");
                self.shutdown_requested = true;
                // Closing the queue lets the drain task finish; outstanding
                // index work is joined rather than leaked.
                self.background_tx = None;
                for task in self.tasks.drain(..) {
                    let _ = task.await;
                }
                self.respond(&message, Value::Null).await;
            }
            "exit" => {
                let code = if self.shutdown_requested { 0 } else { 1 };
                return Flow::Exit(code);
            }
            "$/cancelRequest" => self.handle_cancel(&message.params),
            "textDocument/didOpen" => self.handle_did_open(&message.params),
            "textDocument/didChange" => self.handle_did_change(&message.params),
            "textDocument/didClose" => self.handle_did_close(&message.params),
            "textDocument/didSave" => self.handle_did_save(&message.params),
            "textDocument/definition" => {
                let result = self.with_position(&message.params, |this, uri, position| {
                    result_value(handlers::definition(
                        &this.store,
                        this.index_or_empty(),
                        &uri,
                        position,
                    ))
                });
                self.respond(&message, result.unwrap_or_else(empty_array))
                    .await;
            }
            "textDocument/hover" => {
                let result = self.with_position(&message.params, |this, uri, position| {
                    result_value(handlers::hover(
                        &this.state,
                        &this.store,
                        this.index_or_empty(),
                        &uri,
                        position,
                    ))
                });
                self.respond(&message, result.unwrap_or_else(empty_hover))
                    .await;
            }
            "textDocument/completion" => {
                let result = self.with_position(&message.params, |this, uri, position| {
                    result_value(handlers::completion(
                        &this.store,
                        this.index_or_empty(),
                        &uri,
                        position,
                    ))
                });
                self.respond(&message, result.unwrap_or_else(empty_completion))
                    .await;
            }
            "textDocument/documentSymbol" => {
                let result = match parse_params::<lsp_types::DocumentSymbolParams>(&message.params)
                {
                    Some(params) => result_value(handlers::document_symbol(
                        &self.store,
                        self.index.as_deref(),
                        params.text_document.uri.as_str(),
                    )),
                    None => empty_array(),
                };
                self.respond(&message, result).await;
            }
            "textDocument/formatting" => {
                self.respond(&message, result_value(handlers::formatting()))
                    .await;
            }
            // Advertised but no-op backed: these answer with empty arrays
            // rather than being silently dropped.
            "textDocument/references"
            | "textDocument/rename"
            | "textDocument/documentHighlight"
            | "textDocument/foldingRange"
            | "textDocument/codeAction" => {
                self.respond(&message, empty_array()).await;
            }
            "workspace/symbol" => {
                let result = match parse_params::<lsp_types::WorkspaceSymbolParams>(&message.params)
                {
                    Some(params) => result_value(handlers::workspace_symbol(
                        &self.state,
                        self.index_or_empty(),
                        &params.query,
                    )),
                    None => empty_array(),
                };
                self.respond(&message, result).await;
            }
            _ => {
                // Unrecognized (or method-less) messages go to the
                // background queue; requests among them get no response.
                if let Some(tx) = &self.background_tx {
                    if tx.try_send(message).is_err() {
                        log::warn!("Background queue full, dropping message");
                    }
                }
            }
        }

        Flow::Continue
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    fn handle_initialize(&mut self, params: &Value) {
        log::info!("Processing initialize request");

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct InitializeParams {
            root_uri: Option<String>,
            root_path: Option<String>,
            #[serde(default)]
            initialization_options: Value,
            #[serde(default)]
            capabilities: Value,
        }

        if let Some(params) = parse_params::<InitializeParams>(params) {
            if let Some(root_uri) = params.root_uri {
                self.state.workspace_path = uri_to_path(&root_uri);
                self.state.workspace_uri = root_uri;
            } else if let Some(root_path) = params.root_path {
                self.state.workspace_uri = format!("file://{root_path}");
                self.state.workspace_path = PathBuf::from(root_path);
            }
            self.state.client_capabilities = params.capabilities;
            self.state
                .apply_initialization_options(&params.initialization_options);
        }

        if self.state.workspace_path.as_os_str().is_empty() {
            return;
        }

        let index = Arc::new(WorkspaceIndex::new(self.state.workspace_path.clone()));
        self.index = Some(Arc::clone(&index));
        self.tasks
            .push(tokio::task::spawn_blocking(move || index.build()));
    }

    fn handle_cancel(&self, params: &Value) {
        #[derive(Deserialize)]
        struct CancelParams {
            id: RequestId,
        }

        if let Some(params) = parse_params::<CancelParams>(params) {
            if let Ok(mut cancelled) = self.cancelled.lock() {
                cancelled.insert(params.id);
            }
        }
    }

    // ========================================================================
    // Document synchronization
    // ========================================================================

    fn handle_did_open(&self, params: &Value) {
        let Some(params) = parse_params::<lsp_types::DidOpenTextDocumentParams>(params) else {
            return;
        };
        let doc = params.text_document;

        log::debug!("Opened document: {}", doc.uri);
        self.store.set(crate::document::Document::new(
            doc.uri.to_string(),
            &doc.text,
            doc.version,
            doc.language_id,
        ));
    }

    fn handle_did_change(&self, params: &Value) {
        let Some(params) = parse_params::<lsp_types::DidChangeTextDocumentParams>(params) else {
            return;
        };

        let uri = params.text_document.uri.to_string();
        let edits: Vec<ContentChange> = params
            .content_changes
            .into_iter()
            .map(ContentChange::from)
            .collect();

        if self.store.update(&uri, &edits) {
            log::debug!("Changed document: {uri}");
        }
    }

    fn handle_did_close(&self, params: &Value) {
        let Some(params) = parse_params::<lsp_types::DidCloseTextDocumentParams>(params) else {
            return;
        };
        let uri = params.text_document.uri.to_string();

        log::debug!("Closed document: {uri}");
        self.store.delete(&uri);
    }

    fn handle_did_save(&mut self, params: &Value) {
        let Some(params) = parse_params::<lsp_types::DidSaveTextDocumentParams>(params) else {
            return;
        };
        let Some(index) = &self.index else {
            return;
        };

        let path = uri_to_path(params.text_document.uri.as_str());
        let index = Arc::clone(index);
        self.tasks
            .push(tokio::task::spawn_blocking(move || index.update_file(&path)));
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    /// Run a positional handler once the params parse; `None` means the
    /// caller supplied nothing usable and the empty shape goes out instead.
    fn with_position<F>(&self, params: &Value, handler: F) -> Option<Value>
    where
        F: FnOnce(&Self, String, lsp_types::Position) -> Value,
    {
        let params = parse_params::<lsp_types::TextDocumentPositionParams>(params)?;
        Some(handler(
            self,
            params.text_document.uri.to_string(),
            params.position,
        ))
    }

    /// The index, or a never-ready placeholder before `initialize` arrives.
    fn index_or_empty(&self) -> &WorkspaceIndex {
        use once_cell::sync::Lazy;
        static EMPTY: Lazy<WorkspaceIndex> = Lazy::new(|| WorkspaceIndex::new(""));

        self.index.as_deref().unwrap_or(&EMPTY)
    }

    /// Write a response for a request, unless it was cancelled or the
    /// server is draining. Notifications fall through silently.
    async fn respond(&self, message: &Message, result: Value) {
        let Some(id) = &message.id else {
            return;
        };

        if self.take_cancelled(id) {
            log::debug!("Suppressing response for cancelled request");
            return;
        }

        let response = Response {
            jsonrpc: "2.0",
            id,
            result,
        };

        let mut writer = self.writer.lock().await;
        if let Err(err) = framing::write_message(&mut *writer, &response).await {
            log::warn!("Error writing response: {err}");
        }
    }

    fn take_cancelled(&self, id: &RequestId) -> bool {
        self.cancelled
            .lock()
            .map(|mut cancelled| cancelled.remove(id))
            .unwrap_or(false)
    }

    /// Absorb unrecognized methods off the router without blocking it.
    fn spawn_background_drain(&mut self) {
        let (tx, mut rx) = mpsc::channel::<Message>(BACKGROUND_QUEUE_SIZE);
        self.background_tx = Some(tx);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                log::debug!(
                    "Ignoring unsupported method: {}",
                    message.method.as_deref().unwrap_or("<none>")
                );
            }
        });
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: &Value) -> Option<T> {
    serde_json::from_value(params.clone()).ok()
}

fn result_value<T: Serialize>(result: T) -> Value {
    serde_json::to_value(result).unwrap_or(Value::Null)
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

fn empty_completion() -> Value {
    serde_json::json!({ "isIncomplete": false, "items": [] })
}

fn empty_hover() -> Value {
    serde_json::json!({ "contents": "" })
}

// ============================================================================
// Tests
// ============================================================================
