//! # Generic gRPC Client
//!
//! Wraps a standard `tonic` client to provide a shape-aware interface over
//! any gRPC service. It is agnostic to the specific Protobuf messages being
//! exchanged: the [`DynamicCodec`] serializes against the method's
//! descriptors at call time.
//!
//! ## Features
//!
//! * **Dynamic Pathing**: Constructs the HTTP/2 path (e.g.
//!   `/package.Service/Method`) at runtime from the descriptors.
//! * **Metadata and Deadlines**: Converts string tuples into Tonic's
//!   `MetadataMap` and maps per-call timeouts to the `grpc-timeout` header.
//! * **Call Shapes**: Provides one method per shape: Unary, Server
//!   Streaming, Client Streaming and Bidirectional Streaming.

use super::codec::DynamicCodec;
use crate::BoxError;
use crate::descriptor::{MethodDescriptor, ServiceDescriptor};
use crate::message::DynamicMessage;
use futures_util::{Stream, StreamExt, stream};
use http_body::Body as HttpBody;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{
    client::GrpcService,
    codec::CompressionEncoding,
    metadata::{
        MetadataKey, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
}

/// Boxed response stream produced by the streaming call shapes.
pub type DynamicStreaming =
    Pin<Box<dyn Stream<Item = Result<DynamicMessage, tonic::Status>> + Send>>;

/// Per-call options applied to the outgoing request.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// ASCII metadata entries attached to the request.
    pub metadata: Vec<(String, String)>,
    /// Deadline for the whole call, sent as the `grpc-timeout` header.
    pub timeout: Option<Duration>,
}

/// A shape-aware gRPC client over any descriptor-described service.
#[derive(Clone)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Compresses outgoing request payloads with `encoding`.
    pub fn send_compressed(mut self, encoding: CompressionEncoding) -> Self {
        self.client = self.client.send_compressed(encoding);
        self
    }

    /// Advertises `encoding` as acceptable for response payloads.
    pub fn accept_compressed(mut self, encoding: CompressionEncoding) -> Self {
        self.client = self.client.accept_compressed(encoding);
        self
    }

    /// Performs a Unary gRPC call (Single Request -> Single Response).
    ///
    /// # Returns
    /// * `Ok(Ok(DynamicMessage))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - Failed to send request or connect.
    pub async fn unary(
        &mut self,
        service: &ServiceDescriptor,
        method: &MethodDescriptor,
        message: DynamicMessage,
        options: CallOptions,
    ) -> Result<Result<DynamicMessage, tonic::Status>, GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let codec = DynamicCodec::new(method.input().clone(), method.output().clone());
        let path = http_path(service, method);
        let request = build_request(message, options)?;

        match self.client.unary(request, path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Server Streaming gRPC call (Single Request -> Stream of
    /// Responses).
    pub async fn server_streaming(
        &mut self,
        service: &ServiceDescriptor,
        method: &MethodDescriptor,
        message: DynamicMessage,
        options: CallOptions,
    ) -> Result<Result<DynamicStreaming, tonic::Status>, GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let codec = DynamicCodec::new(method.input().clone(), method.output().clone());
        let path = http_path(service, method);
        let request = build_request(message, options)?;

        match self.client.server_streaming(request, path, codec).await {
            Ok(response) => Ok(Ok(Box::pin(response.into_inner()))),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Client Streaming gRPC call (Stream of Requests -> Single
    /// Response). The request half-closes when `messages` ends.
    pub async fn client_streaming(
        &mut self,
        service: &ServiceDescriptor,
        method: &MethodDescriptor,
        messages: impl Stream<Item = DynamicMessage> + Send + 'static,
        options: CallOptions,
    ) -> Result<Result<DynamicMessage, tonic::Status>, GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let codec = DynamicCodec::new(method.input().clone(), method.output().clone());
        let path = http_path(service, method);
        let request = build_request(messages, options)?;

        match self.client.client_streaming(request, path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Bidirectional Streaming gRPC call (Stream of Requests ->
    /// Stream of Responses).
    ///
    /// Requests are forwarded by a background writer task so the caller can
    /// consume responses while requests are still being produced. The request
    /// half-closes exactly once, when `messages` ends. The returned stream
    /// joins the writer task after the last response, so writer failures are
    /// observed before the stream completes.
    pub async fn bidirectional_streaming(
        &mut self,
        service: &ServiceDescriptor,
        method: &MethodDescriptor,
        messages: impl Stream<Item = DynamicMessage> + Send + 'static,
        options: CallOptions,
    ) -> Result<Result<DynamicStreaming, tonic::Status>, GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let codec = DynamicCodec::new(method.input().clone(), method.output().clone());
        let path = http_path(service, method);

        let (tx, rx) = mpsc::channel(16);
        let writer = tokio::spawn(async move {
            let mut messages = std::pin::pin!(messages);
            while let Some(message) = messages.next().await {
                // A closed receiver means the call ended; stop forwarding.
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            // Dropping the sender half-closes the request stream.
        });

        let request = build_request(ReceiverStream::new(rx), options)?;
        match self.client.streaming(request, path, codec).await {
            Ok(response) => {
                let responses = response.into_inner();
                let join_writer = stream::once(async move {
                    if let Err(err) = writer.await {
                        tracing::error!(error = %err, "bidirectional request writer task failed");
                    }
                })
                .flat_map(|()| stream::empty());
                Ok(Ok(Box::pin(responses.chain(join_writer)) as DynamicStreaming))
            }
            Err(status) => {
                writer.abort();
                Ok(Err(status))
            }
        }
    }
}

fn http_path(service: &ServiceDescriptor, method: &MethodDescriptor) -> http::uri::PathAndQuery {
    // ServiceDescriptor::new only accepts names made of path-safe identifiers.
    let path = format!("/{}/{}", service.full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).expect("valid gRPC path")
}

fn build_request<T>(
    payload: T,
    options: CallOptions,
) -> Result<tonic::Request<T>, GrpcRequestError> {
    let mut request = tonic::Request::new(payload);
    if let Some(timeout) = options.timeout {
        request.set_timeout(timeout);
    }
    for (k, v) in options.metadata {
        let key =
            MetadataKey::from_str(&k).map_err(|source| GrpcRequestError::InvalidMetadataKey {
                key: k.clone(),
                source,
            })?;
        let val = MetadataValue::from_str(&v)
            .map_err(|source| GrpcRequestError::InvalidMetadataValue { key: k, source })?;
        request.metadata_mut().insert(key, val);
    }
    Ok(request)
}
