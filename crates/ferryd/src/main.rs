//! ferryd — ferry transfer server.
//!
//! Started on the remote host by the client's SSH bootstrap. Prints exactly
//! one line on stdout (the control port) for the bootstrap to read, then
//! serves the control API until the session is torn down. All diagnostics go
//! to stderr.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

use ferryd::api::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity; stdout is reserved for the port line.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let root = home_dir();
    std::env::set_current_dir(&root)
        .with_context(|| format!("chdir to {}", root.display()))?;

    let state = AppState::new(root.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind control port")?;
    let port = listener.local_addr()?.port();

    println!("{port}");
    std::io::stdout().flush().ok();

    tracing::info!(port, root = %root.display(), "ferryd listening");
    api::serve(listener, state).await
}

/// The invoking user's home; relative server paths are rooted here.
fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
