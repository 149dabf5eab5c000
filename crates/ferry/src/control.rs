//! Typed client for the server's control API.
//!
//! One method per remote operation; connection failures surface as Connect
//! errors, anything unexpected in a response as Protocol errors.

use serde::de::DeserializeOwned;
use serde::Serialize;

use ferry_core::error::TransferError;
use ferry_core::proto::{
    Ack, BlocksRequest, BlocksResponse, HashRequest, HashResponse, MkdirRequest,
    OpenReceiverRequest, OpenReceiverResponse, OverwriteRequest, ProbeRequest, ProbeResponse,
    ReceiverStatusResponse, StartReceiveRequest, StatusRequest, ValidateRequest, ValidateResponse,
};

#[derive(Clone)]
pub struct ControlClient {
    http: reqwest::Client,
    base: String,
}

impl ControlClient {
    /// `host:port` is the local end of the control tunnel.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://{host}:{port}/api"),
        }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, TransferError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransferError::Connect(format!("{url}: {e}")))?;
        Self::decode(path, response).await
    }

    async fn get<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp, TransferError> {
        let url = format!("{}{path}", self.base);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TransferError::Connect(format!("{url}: {e}")))?;
        Self::decode(path, response).await
    }

    async fn decode<Resp: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<Resp, TransferError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::Protocol(format!("{path}: {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| TransferError::Protocol(format!("{path}: bad response: {e}")))
    }

    // ── Filesystem operations ────────────────────────────────────────────────

    pub async fn create_dir(&self, path: &str) -> Result<(), TransferError> {
        let _: Ack = self
            .post("/fs/mkdir", &MkdirRequest { path: path.to_string() })
            .await?;
        Ok(())
    }

    pub async fn validate_path(
        &self,
        dest: &str,
        src: &str,
        create_parents: bool,
    ) -> Result<ValidateResponse, TransferError> {
        self.post(
            "/fs/validate",
            &ValidateRequest {
                dest: dest.to_string(),
                src: src.to_string(),
                create_parents,
            },
        )
        .await
    }

    pub async fn probe_file(&self, path: &str) -> Result<u64, TransferError> {
        let resp: ProbeResponse = self
            .post("/fs/probe", &ProbeRequest { path: path.to_string() })
            .await?;
        Ok(resp.size)
    }

    pub async fn partial_hash(&self, path: &str, blocks: u64) -> Result<String, TransferError> {
        let resp: HashResponse = self
            .post(
                "/fs/hash",
                &HashRequest {
                    path: path.to_string(),
                    blocks,
                },
            )
            .await?;
        Ok(resp.digest)
    }

    pub async fn overwrite_file(&self, path: &str) -> Result<(), TransferError> {
        let _: Ack = self
            .post("/fs/overwrite", &OverwriteRequest { path: path.to_string() })
            .await?;
        Ok(())
    }

    pub async fn block_count(&self, path: &str) -> Result<u64, TransferError> {
        let resp: BlocksResponse = self
            .post("/fs/blocks", &BlocksRequest { path: path.to_string() })
            .await?;
        Ok(resp.blocks)
    }

    pub async fn apply_status(&self, request: &StatusRequest) -> Result<(), TransferError> {
        let _: Ack = self.post("/fs/status", request).await?;
        Ok(())
    }

    // ── Receiver operations ──────────────────────────────────────────────────

    pub async fn open_receiver(
        &self,
        tcp_mode: bool,
    ) -> Result<OpenReceiverResponse, TransferError> {
        self.post("/receivers", &OpenReceiverRequest { tcp_mode }).await
    }

    pub async fn start_receive(
        &self,
        receiver_id: u64,
        request: &StartReceiveRequest,
    ) -> Result<(), TransferError> {
        let _: Ack = self
            .post(&format!("/receivers/{receiver_id}/start"), request)
            .await?;
        Ok(())
    }

    pub async fn receiver_status(
        &self,
        receiver_id: u64,
    ) -> Result<ReceiverStatusResponse, TransferError> {
        self.get(&format!("/receivers/{receiver_id}/status")).await
    }

    pub async fn close_receiver(&self, receiver_id: u64) -> Result<(), TransferError> {
        let _: Ack = self
            .post(&format!("/receivers/{receiver_id}/close"), &Ack {})
            .await?;
        Ok(())
    }
}
