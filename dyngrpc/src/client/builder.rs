//! Fluent construction of [`DynamicClient`] instances.

use super::DynamicClient;
use crate::BoxError;
use crate::descriptor::{FileDescriptor, ServiceDescriptor};
use crate::grpc::client::GrpcClient;
use crate::retry::RetryPolicy;
use crate::schema::{SchemaCache, SchemaProvider};
use http_body::Body as HttpBody;
use std::sync::Arc;
use std::time::Duration;
use tonic::{
    client::GrpcService,
    codec::CompressionEncoding,
    transport::{Channel, Endpoint},
};

/// Errors that can occur when connecting to a gRPC server.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("no server address was configured")]
    MissingAddress,
    #[error("invalid URL '{0}': {1}")]
    InvalidUrl(String, #[source] tonic::transport::Error),
    #[error("failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
}

/// Builder for [`DynamicClient`].
///
/// Defaults: no deadline, no extra metadata, no compression, the default
/// [`RetryPolicy`], and reflection enabled (the configured schema provider,
/// if any, is consulted on cache misses).
pub struct DynamicClientBuilder {
    address: Option<String>,
    timeout: Option<Duration>,
    headers: Vec<(String, String)>,
    compression: Option<String>,
    retry: Option<RetryPolicy>,
    reflection: bool,
    provider: Option<Arc<dyn SchemaProvider>>,
    services: Vec<ServiceDescriptor>,
    files: Vec<FileDescriptor>,
}

impl Default for DynamicClientBuilder {
    fn default() -> Self {
        Self {
            address: None,
            timeout: None,
            headers: Vec::new(),
            compression: None,
            retry: Some(RetryPolicy::default()),
            reflection: true,
            provider: None,
            services: Vec::new(),
            files: Vec::new(),
        }
    }
}

impl DynamicClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The server URI to connect to (e.g. `http://localhost:50051`).
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Deadline applied to every call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches a metadata entry to every call.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Attaches an `authorization: Bearer <token>` header to every call.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header("authorization", format!("Bearer {}", token.as_ref()))
    }

    /// Request compression encoding by name. `gzip` is supported; `identity`
    /// or an unrecognized name leaves requests uncompressed.
    pub fn compression(mut self, encoding: impl Into<String>) -> Self {
        self.compression = Some(encoding.into());
        self
    }

    /// Replaces the default retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Disables retries entirely; every call gets exactly one attempt.
    pub fn disable_retry(mut self) -> Self {
        self.retry = None;
        self
    }

    /// Enables or disables provider-backed resolution. When disabled, only
    /// explicitly registered descriptors are available and the configured
    /// provider is never consulted.
    pub fn reflection(mut self, enabled: bool) -> Self {
        self.reflection = enabled;
        self
    }

    /// Installs the descriptor source consulted on schema cache misses.
    pub fn schema_provider(mut self, provider: Arc<dyn SchemaProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Pre-registers a service descriptor, making it resolvable without the
    /// provider.
    pub fn register_service(mut self, service: ServiceDescriptor) -> Self {
        self.services.push(service);
        self
    }

    /// Pre-registers a file descriptor and everything it declares.
    pub fn register_file(mut self, file: FileDescriptor) -> Self {
        self.files.push(file);
        self
    }

    /// Connects to the configured address and builds the client.
    pub async fn connect(self) -> Result<DynamicClient<Channel>, ConnectError> {
        let address = self.address.clone().ok_or(ConnectError::MissingAddress)?;

        let endpoint = Endpoint::new(address.clone())
            .map_err(|e| ConnectError::InvalidUrl(address.clone(), e))?;

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ConnectError::ConnectionFailed(address, e))?;

        Ok(self.build_with_service(channel))
    }

    /// Builds the client on top of an existing Tonic service or channel.
    pub fn build_with_service<S>(self, service: S) -> DynamicClient<S>
    where
        S: GrpcService<tonic::body::Body>,
        S::Error: Into<BoxError>,
        S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
        <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    {
        let mut grpc = GrpcClient::new(service);
        match self.compression.as_deref() {
            Some("gzip") => {
                grpc = grpc
                    .send_compressed(CompressionEncoding::Gzip)
                    .accept_compressed(CompressionEncoding::Gzip);
            }
            Some("identity") | None => {}
            Some(other) => {
                tracing::warn!(
                    encoding = %other,
                    "unsupported compression encoding, sending uncompressed"
                );
            }
        }

        let provider = if self.reflection { self.provider } else { None };
        let cache = SchemaCache::new(provider);
        for file in self.files {
            cache.register_file(file);
        }
        for service_desc in self.services {
            cache.register_service(service_desc);
        }

        DynamicClient::new(grpc, cache, self.headers, self.timeout, self.retry)
    }
}
