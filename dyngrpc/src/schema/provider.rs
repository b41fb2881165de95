//! The pluggable descriptor source consulted on schema cache misses.

use crate::descriptor::{MessageDescriptor, ServiceDescriptor};
use crate::schema::SchemaError;

/// A descriptor resolved by fully qualified name.
#[derive(Debug, Clone)]
pub enum Descriptor {
    Service(ServiceDescriptor),
    Message(MessageDescriptor),
}

impl Descriptor {
    pub fn full_name(&self) -> &str {
        match self {
            Descriptor::Service(service) => service.full_name(),
            Descriptor::Message(message) => message.full_name(),
        }
    }
}

/// A source of descriptors for symbols that are not in the local cache.
///
/// Implementations typically wrap the gRPC server reflection protocol, but
/// anything that can map a fully qualified symbol name to a descriptor works:
/// a descriptor-set file on disk, a schema registry service, a test stub.
///
/// Providers are consulted lazily and their answers are memoized by
/// [`SchemaCache`](crate::schema::SchemaCache), so `resolve_by_name` is
/// called at most once per symbol for the lifetime of a client.
#[tonic::async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Resolves a fully qualified symbol name (`package.Service` or
    /// `package.Message`) to its descriptor. `Ok(None)` means the provider
    /// answered authoritatively that the symbol does not exist.
    async fn resolve_by_name(&self, symbol: &str) -> Result<Option<Descriptor>, SchemaError>;

    /// Lists the fully qualified names of all services the remote end
    /// advertises.
    async fn list_services(&self) -> Result<Vec<String>, SchemaError>;
}
