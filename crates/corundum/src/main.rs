//
// main.rs
//

mod backend;
mod document;
mod document_store;
mod extractor;
mod framing;
mod handlers;
mod rails;
mod state;
mod workspace_index;

#[cfg(test)]
mod property_tests;

/// The server takes no options: it speaks the protocol on stdin/stdout and
/// exits when the client tells it to (0 after an orderly shutdown, 1
/// otherwise). Diagnostics go to stderr via the logger.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    backend::start_lsp().await
}
