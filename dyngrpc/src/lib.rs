//! # Dyngrpc
//!
//! `dyngrpc` is a dynamic gRPC client capable of calling any gRPC server
//! without compile-time knowledge of the Protobuf schema. Messages are
//! described by runtime descriptors and serialized on the fly; methods are
//! dispatched by service and method name across all four call shapes.
//!
//! ## Key Components
//!
//! * **[`DynamicClient`]:** The main entry point. It resolves descriptors
//!   through its schema cache, dispatches calls by shape, and applies the
//!   configured retry policy where replay is safe.
//! * **[`DynamicMessage`]:** A schema-bound field container that encodes to
//!   and from the Protobuf binary wire format and flat JSON objects.
//! * **[`SchemaCache`] & [`SchemaProvider`]:** Concurrent descriptor storage
//!   plus a pluggable source (typically server reflection) consulted lazily
//!   on cache misses, with answers memoized.
//! * **[`RetryPolicy`]:** Exponential-backoff retry for unary and client
//!   streaming calls, classified by gRPC status code.
//!
//! ## Internal clients
//!
//! The lower-level transport is exposed as well: [`GrpcClient`] performs
//! shape-aware calls over any descriptor-described service using a custom
//! codec that bridges [`DynamicMessage`] and Protobuf bytes.
//!
//! ## Limitations
//!
//! Only scalar fields are representable: nested messages, repeated fields,
//! maps and enums are out of scope.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost` and `tonic` to ensure that consumers use
//! compatible versions of these underlying dependencies.
//!
//! [`DynamicClient`]: client::DynamicClient
//! [`DynamicMessage`]: message::DynamicMessage
//! [`SchemaCache`]: schema::SchemaCache
//! [`SchemaProvider`]: schema::SchemaProvider
//! [`RetryPolicy`]: retry::RetryPolicy
//! [`GrpcClient`]: grpc::client::GrpcClient
pub mod client;
pub mod descriptor;
pub mod grpc;
pub mod message;
pub mod retry;
pub mod schema;

// Re-exports
pub use prost;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
