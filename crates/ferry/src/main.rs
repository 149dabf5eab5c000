//! ferry — resumable parallel file-transfer client.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use ferry::{ControlClient, TransferDriver};
use ferry_core::config::{self, TransferOptions};

/// Move files to a remote host with per-file resume and verification.
///
/// The control channel is expected at `host:control_port`, typically the
/// local end of an SSH port forward established by the caller; data
/// channels dial the host directly on ports the server hands out.
#[derive(Parser, Debug)]
#[command(name = "ferry", version)]
struct Cli {
    /// Remote endpoint as user@host[:ssh_port]
    remote_host: String,

    /// Local source file (or directory with --recursive)
    file_src: PathBuf,

    /// Destination path on the server; relative paths land under the
    /// remote user's home
    file_dest: String,

    /// Use plain TCP data channels instead of the datagram transport
    #[arg(short = 't', long = "tcp")]
    tcp_mode: bool,

    /// Transfer a directory tree
    #[arg(short, long)]
    recursive: bool,

    /// Skip post-transfer hash verification
    #[arg(short = 'w', long = "no-verify")]
    disable_verify: bool,

    /// Follow symbolic links while walking the source
    #[arg(short = 'L', long)]
    follow_links: bool,

    /// Copy permissions and timestamps to the server
    #[arg(short = 's', long)]
    copy_status: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Log total transfer time
    #[arg(short = 'T', long)]
    timer: bool,

    /// Concurrent file transfers
    #[arg(short, long, default_value_t = config::default_parallelism())]
    parallelism: usize,

    /// Local port of the established control tunnel
    #[arg(long)]
    control_port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let start = Instant::now();

    let (user, host, ssh_port) = match unpack_remote_host(&cli.remote_host) {
        Ok(parts) => parts,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };
    // The SSH bootstrap (external) consumes user and ssh_port; the transfer
    // engine only dials the host.
    tracing::debug!(%user, %host, ssh_port, "remote endpoint");

    let options = TransferOptions {
        recursive: cli.recursive,
        tcp_mode: cli.tcp_mode,
        verify: !cli.disable_verify,
        follow_links: cli.follow_links,
        copy_status: cli.copy_status,
        parallelism: cli.parallelism,
    };

    let control = ControlClient::new(&host, cli.control_port);
    let driver = TransferDriver::new(control, host, cli.file_src, cli.file_dest, options);

    tracing::debug!("starting transfer");
    let success = match driver.start().await {
        Ok(pool) => {
            pool.await.ok();
            driver.close().await;
            driver.is_transfer_success()
        }
        Err(e) => {
            eprintln!("{e}");
            false
        }
    };

    if cli.timer {
        tracing::info!(elapsed = ?start.elapsed(), "total time");
    }

    if success {
        println!("Successfully transfered");
        ExitCode::SUCCESS
    } else {
        println!("Failed to transfer");
        ExitCode::FAILURE
    }
}

/// Split `user@host[:port]` into its parts. The SSH port defaults to 22.
fn unpack_remote_host(remote: &str) -> Result<(String, String, u16), String> {
    let (user, rest) = remote
        .split_once('@')
        .ok_or_else(|| format!("{remote}: expected user@host[:port]"))?;
    if user.is_empty() {
        return Err(format!("{remote}: username required"));
    }
    let (host, port) = match rest.split_once(':') {
        Some((host, port_str)) => {
            let port = port_str
                .parse()
                .map_err(|_| format!("{remote}: bad port {port_str:?}"))?;
            (host, port)
        }
        None => (rest, 22),
    };
    if host.is_empty() {
        return Err(format!("{remote}: hostname required"));
    }
    Ok((user.to_string(), host.to_string(), port))
}
