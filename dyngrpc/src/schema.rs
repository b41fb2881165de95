//! # Schema Registry
//!
//! Descriptor storage and lookup for the dynamic client. Descriptors arrive
//! from two sources: explicit registration at build time, and an optional
//! [`SchemaProvider`] consulted on cache misses (typically backed by gRPC
//! server reflection). Both feed the same [`SchemaCache`], so a symbol is
//! resolved remotely at most once.

pub mod cache;
pub mod provider;

pub use cache::SchemaCache;
pub use provider::{Descriptor, SchemaProvider};

use crate::BoxError;

/// Errors raised while resolving services or message types.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("service '{0}' is not registered and could not be resolved")]
    ServiceNotFound(String),
    #[error("message type '{0}' is not registered and could not be resolved")]
    MessageTypeNotFound(String),
    #[error("no schema provider is configured; register descriptors explicitly or enable reflection")]
    ReflectionDisabled,
    #[error("schema provider error: {0}")]
    Provider(#[source] BoxError),
}
