//! HTTP client side of the control protocol

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;
use warden_core::WorkerDescriptor;

use crate::error::{IpcError, IpcResult};
use crate::protocol::{ControlOperation, ControlProtocol, InitializeMetadataRequest};

/// Remote handle to one worker, addressed by the port in its descriptor.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ControlClient {
    http: Client,
    address: SocketAddr,
}

impl ControlClient {
    pub fn new(http: Client, host: IpAddr, port: u16) -> Self {
        Self {
            http,
            address: SocketAddr::new(host, port),
        }
    }

    /// Build an HTTP client suited to loopback control calls
    pub fn http_client(timeout: Duration) -> IpcResult<Client> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| IpcError::Request(e.to_string()))
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    /// POST a JSON body and decode a JSON answer.
    ///
    /// Used by worker types that extend the protocol with domain routes.
    pub async fn post_json<B, R>(&self, operation: &'static str, path: &str, body: &B) -> IpcResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.send(operation, self.http.post(self.url(path)).json(body)).await?;
        Ok(response.json().await?)
    }

    /// GET and decode a JSON answer
    pub async fn get_json<R>(&self, operation: &'static str, path: &str) -> IpcResult<R>
    where
        R: DeserializeOwned,
    {
        let response = self.send(operation, self.http.get(self.url(path))).await?;
        Ok(response.json().await?)
    }

    async fn send(&self, operation: &'static str, request: RequestBuilder) -> IpcResult<Response> {
        debug!("{} -> {}", operation, self.address);
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IpcError::Status {
                operation,
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    fn control_url(&self, operation: ControlOperation) -> String {
        self.url(operation.path())
    }
}

#[async_trait]
impl ControlProtocol for ControlClient {
    async fn initialize_metadata(&self, request: InitializeMetadataRequest) -> IpcResult<()> {
        let op = ControlOperation::InitializeMetadata;
        let builder = self.http.post(self.control_url(op)).json(&request);
        self.send(op.name(), builder).await?;
        Ok(())
    }

    async fn kill(&self) -> IpcResult<()> {
        let op = ControlOperation::Kill;
        self.send(op.name(), self.http.post(self.control_url(op))).await?;
        Ok(())
    }

    async fn info(&self) -> IpcResult<String> {
        let op = ControlOperation::Info;
        let response = self.send(op.name(), self.http.get(self.control_url(op))).await?;
        Ok(response.text().await?)
    }

    async fn is_healthy(&self, candidate: &WorkerDescriptor) -> IpcResult<bool> {
        let op = ControlOperation::IsHealthy;
        self.post_json(op.name(), op.path(), candidate).await
    }

    async fn has_up_to_date_version(&self, candidate: &WorkerDescriptor) -> IpcResult<bool> {
        let op = ControlOperation::HasUpToDateVersion;
        self.post_json(op.name(), op.path(), candidate).await
    }
}
