//! Control service — the RPC surface the client drives transfers through.
//!
//! JSON over HTTP on a loopback port (the local end of the caller's tunnel).
//! Receivers opened here persist across calls and are addressed by integer
//! id. Handlers may run for many clients at once; the transaction log is the
//! only serialized resource.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path as RoutePath, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use filetime::FileTime;

use ferry_core::config::TRANSACTION_LOG_FILENAME;
use ferry_core::hash::partial_hash;
use ferry_core::proto::{
    Ack, BlocksRequest, BlocksResponse, HashRequest, HashResponse, MkdirRequest,
    OpenReceiverRequest, OpenReceiverResponse, OverwriteRequest, ProbeRequest, ProbeResponse,
    ReceiverStatusResponse, StartReceiveRequest, StatusRequest, ValidateRequest, ValidateResponse,
};

use crate::fsops;
use crate::receiver::FileReceiver;
use crate::txlog::{SharedLog, TransactionLog};

#[derive(Clone)]
pub struct AppState {
    /// All relative paths arriving over the control channel resolve here.
    pub root: PathBuf,
    pub log: SharedLog,
    pub receivers: Arc<DashMap<u64, Arc<FileReceiver>>>,
    next_receiver_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(root: PathBuf) -> Self {
        let log = TransactionLog::shared(root.join(TRANSACTION_LOG_FILENAME));
        Self {
            root,
            log,
            receivers: Arc::new(DashMap::new()),
            next_receiver_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/fs/mkdir", post(handle_mkdir))
        .route("/fs/validate", post(handle_validate))
        .route("/fs/probe", post(handle_probe))
        .route("/fs/hash", post(handle_hash))
        .route("/fs/overwrite", post(handle_overwrite))
        .route("/fs/blocks", post(handle_blocks))
        .route("/fs/status", post(handle_status))
        .route("/receivers", post(handle_open_receiver))
        .route("/receivers/{id}/start", post(handle_start_receive))
        .route("/receivers/{id}/status", get(handle_receiver_status))
        .route("/receivers/{id}/close", post(handle_close_receiver))
        .with_state(state);

    Router::new().nest("/api", api)
}

pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

type HandlerError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> HandlerError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ── Filesystem handlers ──────────────────────────────────────────────────────

async fn handle_mkdir(
    State(state): State<AppState>,
    Json(req): Json<MkdirRequest>,
) -> Result<Json<Ack>, HandlerError> {
    fsops::create_dir(&state.resolve(&req.path)).map_err(internal)?;
    Ok(Json(Ack {}))
}

async fn handle_validate(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Json<ValidateResponse> {
    let dest = state.resolve(&req.dest);
    match fsops::validate_path(&dest, &req.src, req.create_parents) {
        Ok(resolved) => Json(ValidateResponse {
            ok: true,
            resolved: Some(resolved),
            message: None,
        }),
        Err(message) => {
            tracing::debug!(dest = %dest.display(), %message, "destination rejected");
            Json(ValidateResponse {
                ok: false,
                resolved: None,
                message: Some(message),
            })
        }
    }
}

async fn handle_probe(
    State(state): State<AppState>,
    Json(req): Json<ProbeRequest>,
) -> Result<Json<ProbeResponse>, HandlerError> {
    let size = fsops::probe_file(&state.resolve(&req.path)).map_err(internal)?;
    Ok(Json(ProbeResponse { size }))
}

async fn handle_hash(
    State(state): State<AppState>,
    Json(req): Json<HashRequest>,
) -> Result<Json<HashResponse>, HandlerError> {
    let path = state.resolve(&req.path);
    let digest = tokio::task::spawn_blocking(move || partial_hash(&path, req.blocks))
        .await
        .map_err(internal)?
        .map_err(internal)?;
    Ok(Json(HashResponse { digest }))
}

async fn handle_overwrite(
    State(state): State<AppState>,
    Json(req): Json<OverwriteRequest>,
) -> Result<Json<Ack>, HandlerError> {
    fsops::overwrite_file(&state.resolve(&req.path)).map_err(internal)?;
    Ok(Json(Ack {}))
}

async fn handle_blocks(
    State(state): State<AppState>,
    Json(req): Json<BlocksRequest>,
) -> Result<Json<BlocksResponse>, HandlerError> {
    let blocks = fsops::block_count(&state.resolve(&req.path)).map_err(internal)?;
    Ok(Json(BlocksResponse { blocks }))
}

async fn handle_status(
    State(state): State<AppState>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Ack>, HandlerError> {
    fsops::apply_status(
        &state.resolve(&req.path),
        req.mode,
        FileTime::from_unix_time(req.mtime_secs, req.mtime_nanos),
        FileTime::from_unix_time(req.atime_secs, req.atime_nanos),
    )
    .map_err(internal)?;
    Ok(Json(Ack {}))
}

// ── Receiver handlers ────────────────────────────────────────────────────────

async fn handle_open_receiver(
    State(state): State<AppState>,
    Json(req): Json<OpenReceiverRequest>,
) -> Result<Json<OpenReceiverResponse>, HandlerError> {
    let receiver = FileReceiver::open(req.tcp_mode).await.map_err(internal)?;
    let receiver_id = state.next_receiver_id.fetch_add(1, Ordering::Relaxed);
    let response = OpenReceiverResponse {
        receiver_id,
        port: receiver.port(),
        nonce: receiver.nonce().to_string(),
    };
    state.receivers.insert(receiver_id, Arc::new(receiver));
    Ok(Json(response))
}

fn lookup_receiver(state: &AppState, id: u64) -> Result<Arc<FileReceiver>, HandlerError> {
    state
        .receivers
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or((StatusCode::NOT_FOUND, format!("no receiver {id}")))
}

async fn handle_start_receive(
    State(state): State<AppState>,
    RoutePath(id): RoutePath<u64>,
    Json(req): Json<StartReceiveRequest>,
) -> Result<Json<Ack>, HandlerError> {
    let receiver = lookup_receiver(&state, id)?;
    let path = state.resolve(&req.path);
    receiver
        .start(path, req.blocks, req.file_size, req.source_hash, state.log.clone())
        .await
        .map_err(internal)?;
    Ok(Json(Ack {}))
}

async fn handle_receiver_status(
    State(state): State<AppState>,
    RoutePath(id): RoutePath<u64>,
) -> Result<Json<ReceiverStatusResponse>, HandlerError> {
    let receiver = lookup_receiver(&state, id)?;
    Ok(Json(ReceiverStatusResponse {
        bytes: receiver.bytes_received(),
        state: receiver.state(),
    }))
}

async fn handle_close_receiver(
    State(state): State<AppState>,
    RoutePath(id): RoutePath<u64>,
) -> Result<Json<Ack>, HandlerError> {
    if let Some((_, receiver)) = state.receivers.remove(&id) {
        receiver.close();
    }
    Ok(Json(Ack {}))
}
