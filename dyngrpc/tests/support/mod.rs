//! In-process echo service used by the integration tests.
//!
//! The client under test accepts any tonic service as its transport, so the
//! tests skip the network entirely: [`EchoServer`] implements the same
//! `tower::Service` surface a tonic-generated server does, routing on the
//! request path and answering through the dynamic codec.

use dyngrpc::descriptor::{
    FieldDescriptor, FileDescriptor, MessageDescriptor, MethodDescriptor, MethodShape, ScalarType,
    ServiceDescriptor,
};
use dyngrpc::grpc::codec::DynamicCodec;
use dyngrpc::message::DynamicMessage;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tonic::codegen::{BoxFuture, Service};
use tonic::codec::{CompressionEncoding, EnabledCompressionEncodings};
use tonic::{Request, Response, Status, Streaming};

pub const SERVICE_NAME: &str = "test.EchoService";
pub const REQUEST_TYPE: &str = "test.EchoRequest";
pub const RESPONSE_TYPE: &str = "test.EchoResponse";

type ResponseStream = Pin<Box<dyn futures_util::Stream<Item = Result<DynamicMessage, Status>> + Send>>;

fn echo_message(full_name: &str) -> MessageDescriptor {
    MessageDescriptor::new(
        full_name,
        vec![FieldDescriptor::new("message", 1, ScalarType::String)],
    )
    .unwrap()
}

/// The echo schema as the client sees it: one service with a method per call
/// shape, grouped in a file together with its message types.
pub fn echo_file() -> FileDescriptor {
    let request = echo_message(REQUEST_TYPE);
    let response = echo_message(RESPONSE_TYPE);
    let service = ServiceDescriptor::new(
        SERVICE_NAME,
        vec![
            MethodDescriptor::new(
                "UnaryEcho",
                request.clone(),
                response.clone(),
                MethodShape::Unary,
            ),
            MethodDescriptor::new(
                "ServerStreamingEcho",
                request.clone(),
                response.clone(),
                MethodShape::ServerStreaming,
            ),
            MethodDescriptor::new(
                "ClientStreamingEcho",
                request.clone(),
                response.clone(),
                MethodShape::ClientStreaming,
            ),
            MethodDescriptor::new(
                "BidirectionalEcho",
                request.clone(),
                response.clone(),
                MethodShape::Bidirectional,
            ),
        ],
    )
    .unwrap();
    FileDescriptor::new("test/echo.proto", vec![service], vec![request, response])
}

fn text_of(message: &DynamicMessage) -> String {
    message
        .get_field("message")
        .ok()
        .flatten()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn reply(descriptor: &MessageDescriptor, text: impl Into<String>) -> Result<DynamicMessage, Status> {
    let mut message = DynamicMessage::new(descriptor.clone());
    message
        .set_field("message", text.into())
        .map_err(|e| Status::internal(e.to_string()))?;
    Ok(message)
}

fn unimplemented_response() -> http::Response<tonic::body::Body> {
    let mut response = http::Response::new(tonic::body::Body::default());
    response.headers_mut().insert(
        "grpc-status",
        http::HeaderValue::from_static("12"),
    );
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/grpc"),
    );
    response
}

/// An in-process echo service covering all four call shapes.
#[derive(Clone)]
pub struct EchoServer {
    request_desc: MessageDescriptor,
    response_desc: MessageDescriptor,
}

impl EchoServer {
    pub fn new() -> Self {
        Self {
            request_desc: echo_message(REQUEST_TYPE),
            response_desc: echo_message(RESPONSE_TYPE),
        }
    }

    fn codec(&self) -> DynamicCodec {
        DynamicCodec::new(self.response_desc.clone(), self.request_desc.clone())
    }
}

fn grpc_with(codec: DynamicCodec) -> tonic::server::Grpc<DynamicCodec> {
    let mut accept = EnabledCompressionEncodings::default();
    accept.enable(CompressionEncoding::Gzip);
    tonic::server::Grpc::new(codec)
        .apply_compression_config(accept, EnabledCompressionEncodings::default())
}

struct UnaryEchoSvc(MessageDescriptor);

impl tonic::server::UnaryService<DynamicMessage> for UnaryEchoSvc {
    type Response = DynamicMessage;
    type Future = BoxFuture<Response<Self::Response>, Status>;

    fn call(&mut self, request: Request<DynamicMessage>) -> Self::Future {
        let response_desc = self.0.clone();
        Box::pin(async move {
            let text = text_of(&request.into_inner());
            Ok(Response::new(reply(&response_desc, text)?))
        })
    }
}

struct ServerStreamingEchoSvc(MessageDescriptor);

impl tonic::server::ServerStreamingService<DynamicMessage> for ServerStreamingEchoSvc {
    type Response = DynamicMessage;
    type ResponseStream = ResponseStream;
    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: Request<DynamicMessage>) -> Self::Future {
        let response_desc = self.0.clone();
        Box::pin(async move {
            let text = text_of(&request.into_inner());
            let items: Vec<Result<DynamicMessage, Status>> = (0..3)
                .map(|seq| reply(&response_desc, format!("{text} - seq {seq}")))
                .collect();
            let stream: ResponseStream = Box::pin(futures_util::stream::iter(items));
            Ok(Response::new(stream))
        })
    }
}

struct ClientStreamingEchoSvc(MessageDescriptor);

impl tonic::server::ClientStreamingService<DynamicMessage> for ClientStreamingEchoSvc {
    type Response = DynamicMessage;
    type Future = BoxFuture<Response<Self::Response>, Status>;

    fn call(&mut self, request: Request<Streaming<DynamicMessage>>) -> Self::Future {
        let response_desc = self.0.clone();
        Box::pin(async move {
            let mut inbound = request.into_inner();
            let mut parts = Vec::new();
            while let Some(message) = inbound.message().await? {
                parts.push(text_of(&message));
            }
            Ok(Response::new(reply(&response_desc, parts.join(","))?))
        })
    }
}

struct BidirectionalEchoSvc(MessageDescriptor);

impl tonic::server::StreamingService<DynamicMessage> for BidirectionalEchoSvc {
    type Response = DynamicMessage;
    type ResponseStream = ResponseStream;
    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: Request<Streaming<DynamicMessage>>) -> Self::Future {
        let response_desc = self.0.clone();
        Box::pin(async move {
            let mut inbound = request.into_inner();
            let (tx, rx) = tokio::sync::mpsc::channel(4);
            tokio::spawn(async move {
                while let Ok(Some(message)) = inbound.message().await {
                    let item = reply(&response_desc, format!("echo: {}", text_of(&message)));
                    if tx.send(item).await.is_err() {
                        break;
                    }
                }
            });
            let stream: ResponseStream =
                Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx));
            Ok(Response::new(stream))
        })
    }
}

impl Service<http::Request<tonic::body::Body>> for EchoServer {
    type Response = http::Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<tonic::body::Body>) -> Self::Future {
        let codec = self.codec();
        let response_desc = self.response_desc.clone();
        match req.uri().path() {
            "/test.EchoService/UnaryEcho" => Box::pin(async move {
                let mut grpc = grpc_with(codec);
                Ok(grpc.unary(UnaryEchoSvc(response_desc), req).await)
            }),
            "/test.EchoService/ServerStreamingEcho" => Box::pin(async move {
                let mut grpc = grpc_with(codec);
                Ok(grpc
                    .server_streaming(ServerStreamingEchoSvc(response_desc), req)
                    .await)
            }),
            "/test.EchoService/ClientStreamingEcho" => Box::pin(async move {
                let mut grpc = grpc_with(codec);
                Ok(grpc
                    .client_streaming(ClientStreamingEchoSvc(response_desc), req)
                    .await)
            }),
            "/test.EchoService/BidirectionalEcho" => Box::pin(async move {
                let mut grpc = grpc_with(codec);
                Ok(grpc
                    .streaming(BidirectionalEchoSvc(response_desc), req)
                    .await)
            }),
            _ => Box::pin(async move { Ok(unimplemented_response()) }),
        }
    }
}

/// An echo service whose unary method fails with `UNAVAILABLE` for the first
/// `failures` calls, then behaves like [`EchoServer`].
#[derive(Clone)]
pub struct FlakyEchoServer {
    inner: EchoServer,
    failures: usize,
    calls: Arc<AtomicUsize>,
}

impl FlakyEchoServer {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: EchoServer::new(),
            failures,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct FailingSvc;

impl tonic::server::UnaryService<DynamicMessage> for FailingSvc {
    type Response = DynamicMessage;
    type Future = BoxFuture<Response<Self::Response>, Status>;

    fn call(&mut self, _request: Request<DynamicMessage>) -> Self::Future {
        Box::pin(async move { Err(Status::unavailable("try again later")) })
    }
}

impl Service<http::Request<tonic::body::Body>> for FlakyEchoServer {
    type Response = http::Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<tonic::body::Body>) -> Self::Future {
        if req.uri().path() == "/test.EchoService/UnaryEcho"
            && self.calls.fetch_add(1, Ordering::SeqCst) < self.failures
        {
            let codec = self.inner.codec();
            return Box::pin(async move {
                let mut grpc = tonic::server::Grpc::new(codec);
                Ok(grpc.unary(FailingSvc, req).await)
            });
        }
        self.inner.call(req)
    }
}
