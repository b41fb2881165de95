//! # Dynamic Client
//!
//! The high-level entry point: a client that calls any gRPC method by name,
//! with descriptors coming from explicit registration or a schema provider.
//!
//! [`DynamicClient`] ties the pieces together: the [`SchemaCache`] resolves
//! service and method descriptors, the transport layer moves
//! [`DynamicMessage`] values over the wire, and an optional [`RetryPolicy`]
//! re-runs failed attempts for the call shapes where that is safe (unary and
//! client streaming). Clients are built with [`DynamicClientBuilder`].
//!
//! ```rust,no_run
//! use dyngrpc::client::DynamicClientBuilder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = DynamicClientBuilder::new()
//!     .address("http://localhost:50051")
//!     .bearer_token("s3cr3t")
//!     .connect()
//!     .await?;
//!
//! let mut request = client.create_message("greet.HelloRequest").await?;
//! request.set_field("name", "World")?;
//! let reply = client.call_unary("greet.Greeter", "SayHello", request).await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;

pub use builder::{ConnectError, DynamicClientBuilder};

use crate::BoxError;
use crate::descriptor::{MethodDescriptor, MethodShape, ServiceDescriptor};
use crate::grpc::client::{CallOptions, DynamicStreaming, GrpcClient, GrpcRequestError};
use crate::message::{DynamicMessage, MessageError};
use crate::retry::{self, RetryPolicy};
use crate::schema::{SchemaCache, SchemaError};
use futures_util::{Stream, StreamExt, stream};
use http_body::Body as HttpBody;
use std::time::Duration;
use tonic::{Code, client::GrpcService, transport::Channel};

/// Errors raised while executing a dynamic call.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("method '{method}' not found on service '{service}'")]
    MethodNotFound { service: String, method: String },
    #[error("method '{method}' is declared {declared}, but was invoked as {requested}")]
    InvalidShape {
        method: String,
        declared: MethodShape,
        requested: MethodShape,
    },
    #[error(transparent)]
    Request(#[from] GrpcRequestError),
    #[error("rpc failed: {0}")]
    Transport(tonic::Status),
    #[error(transparent)]
    Message(#[from] MessageError),
}

fn retry_code(err: &CallError) -> Option<Code> {
    match err {
        CallError::Transport(status) => Some(status.code()),
        _ => None,
    }
}

/// A gRPC client that dispatches calls by service and method name.
#[derive(Clone)]
pub struct DynamicClient<S = Channel> {
    grpc: GrpcClient<S>,
    cache: SchemaCache,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
}

impl<S> std::fmt::Debug for DynamicClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicClient")
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<S> DynamicClient<S> {
    pub(crate) fn new(
        grpc: GrpcClient<S>,
        cache: SchemaCache,
        headers: Vec<(String, String)>,
        timeout: Option<Duration>,
        retry: Option<RetryPolicy>,
    ) -> Self {
        Self {
            grpc,
            cache,
            headers,
            timeout,
            retry,
        }
    }

    /// Resolves a service descriptor by fully qualified name, consulting the
    /// schema provider on a cache miss.
    pub async fn get_service_descriptor(
        &self,
        service: &str,
    ) -> Result<ServiceDescriptor, SchemaError> {
        self.cache.resolve_service(service).await
    }

    /// The method names declared by a service.
    pub async fn list_service_methods(&self, service: &str) -> Result<Vec<String>, SchemaError> {
        let descriptor = self.cache.resolve_service(service).await?;
        Ok(descriptor
            .methods()
            .map(|method| method.name().to_string())
            .collect())
    }

    /// The service names advertised by the remote end. Requires a schema
    /// provider.
    pub async fn list_available_services(&self) -> Result<Vec<String>, SchemaError> {
        self.cache.list_remote_services().await
    }

    /// Creates an empty message of the named type, resolving its descriptor
    /// through the cache or provider.
    pub async fn create_message(&self, full_name: &str) -> Result<DynamicMessage, SchemaError> {
        let descriptor = self.cache.resolve_message(full_name).await?;
        Ok(DynamicMessage::new(descriptor))
    }

    async fn resolve_method(
        &self,
        service: &str,
        method: &str,
        requested: MethodShape,
    ) -> Result<(ServiceDescriptor, MethodDescriptor), CallError> {
        let service_desc = self.cache.resolve_service(service).await?;
        let method_desc = service_desc
            .get_method_by_name(method)
            .cloned()
            .ok_or_else(|| CallError::MethodNotFound {
                service: service.to_string(),
                method: method.to_string(),
            })?;
        if method_desc.shape() != requested {
            return Err(CallError::InvalidShape {
                method: method.to_string(),
                declared: method_desc.shape(),
                requested,
            });
        }
        Ok((service_desc, method_desc))
    }

    fn call_options(&self) -> CallOptions {
        CallOptions {
            metadata: self.headers.clone(),
            timeout: self.timeout,
        }
    }
}

impl<S> DynamicClient<S>
where
    S: GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Calls a unary method. Retries under the configured policy; the
    /// request is cloned per attempt.
    pub async fn call_unary(
        &self,
        service: &str,
        method: &str,
        request: DynamicMessage,
    ) -> Result<DynamicMessage, CallError> {
        let (service_desc, method_desc) = self
            .resolve_method(service, method, MethodShape::Unary)
            .await?;

        let attempt = || {
            let mut grpc = self.grpc.clone();
            let service_desc = service_desc.clone();
            let method_desc = method_desc.clone();
            let request = request.clone();
            let options = self.call_options();
            async move {
                grpc.unary(&service_desc, &method_desc, request, options)
                    .await
                    .map_err(CallError::from)?
                    .map_err(CallError::Transport)
            }
        };

        match &self.retry {
            Some(policy) => retry::execute(policy, retry_code, attempt).await,
            None => attempt().await,
        }
    }

    /// Calls a unary method with a JSON request body and returns the
    /// response as JSON text. The body is validated against the method's
    /// input type before anything is sent.
    pub async fn call_unary_json(
        &self,
        service: &str,
        method: &str,
        json: &str,
    ) -> Result<String, CallError> {
        let (_, method_desc) = self
            .resolve_method(service, method, MethodShape::Unary)
            .await?;
        let request = DynamicMessage::from_json(method_desc.input().clone(), json)?;
        let response = self.call_unary(service, method, request).await?;
        Ok(response.to_json())
    }

    /// Calls a server streaming method. Streams are never retried; a broken
    /// stream surfaces as an item-level error on the returned stream.
    pub async fn call_server_streaming(
        &self,
        service: &str,
        method: &str,
        request: DynamicMessage,
    ) -> Result<DynamicStreaming, CallError> {
        let (service_desc, method_desc) = self
            .resolve_method(service, method, MethodShape::ServerStreaming)
            .await?;

        let mut grpc = self.grpc.clone();
        grpc.server_streaming(&service_desc, &method_desc, request, self.call_options())
            .await
            .map_err(CallError::from)?
            .map_err(CallError::Transport)
    }

    /// Calls a client streaming method. The request stream is drained up
    /// front so attempts can be replayed under the retry policy; half-close
    /// happens after the last buffered message.
    pub async fn call_client_streaming(
        &self,
        service: &str,
        method: &str,
        requests: impl Stream<Item = DynamicMessage> + Send + 'static,
    ) -> Result<DynamicMessage, CallError> {
        let (service_desc, method_desc) = self
            .resolve_method(service, method, MethodShape::ClientStreaming)
            .await?;

        let items: Vec<DynamicMessage> = requests.collect().await;

        let attempt = || {
            let mut grpc = self.grpc.clone();
            let service_desc = service_desc.clone();
            let method_desc = method_desc.clone();
            let items = items.clone();
            let options = self.call_options();
            async move {
                grpc.client_streaming(&service_desc, &method_desc, stream::iter(items), options)
                    .await
                    .map_err(CallError::from)?
                    .map_err(CallError::Transport)
            }
        };

        match &self.retry {
            Some(policy) => retry::execute(policy, retry_code, attempt).await,
            None => attempt().await,
        }
    }

    /// Calls a bidirectional streaming method. Requests are forwarded
    /// concurrently with response consumption and are never retried.
    pub async fn call_bidirectional(
        &self,
        service: &str,
        method: &str,
        requests: impl Stream<Item = DynamicMessage> + Send + 'static,
    ) -> Result<DynamicStreaming, CallError> {
        let (service_desc, method_desc) = self
            .resolve_method(service, method, MethodShape::Bidirectional)
            .await?;

        let mut grpc = self.grpc.clone();
        grpc.bidirectional_streaming(&service_desc, &method_desc, requests, self.call_options())
            .await
            .map_err(CallError::from)?
            .map_err(CallError::Transport)
    }
}
