//! Concurrent descriptor cache with first-wins registration and lazy
//! provider-backed resolution.

use crate::descriptor::{FileDescriptor, MessageDescriptor, ServiceDescriptor};
use crate::schema::provider::{Descriptor, SchemaProvider};
use crate::schema::SchemaError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Shared descriptor storage for a client.
///
/// Registration is first-wins: once a service or file name is cached, later
/// registrations under the same name are ignored, so concurrent resolvers
/// racing on the same symbol all observe one descriptor. Entries are never
/// evicted; the cache lives as long as the client.
#[derive(Clone)]
pub struct SchemaCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    services: RwLock<HashMap<String, ServiceDescriptor>>,
    files: RwLock<HashMap<String, FileDescriptor>>,
    provider: Option<Arc<dyn SchemaProvider>>,
}

impl SchemaCache {
    pub fn new(provider: Option<Arc<dyn SchemaProvider>>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                services: RwLock::new(HashMap::new()),
                files: RwLock::new(HashMap::new()),
                provider,
            }),
        }
    }

    pub fn has_provider(&self) -> bool {
        self.inner.provider.is_some()
    }

    /// Caches a service descriptor under its full name. First registration
    /// wins; a repeat under the same name is ignored.
    pub fn register_service(&self, service: ServiceDescriptor) {
        let mut services = self
            .inner
            .services
            .write()
            .expect("schema cache lock poisoned");
        let name = service.full_name().to_string();
        if services.contains_key(&name) {
            tracing::debug!(service = %name, "service already cached, keeping first registration");
            return;
        }
        services.insert(name, service);
    }

    /// Caches a file descriptor under its name, along with every service it
    /// declares. First registration wins at both levels.
    pub fn register_file(&self, file: FileDescriptor) {
        for service in file.services() {
            self.register_service(service.clone());
        }
        let mut files = self.inner.files.write().expect("schema cache lock poisoned");
        let name = file.name().to_string();
        if files.contains_key(&name) {
            tracing::debug!(file = %name, "file already cached, keeping first registration");
            return;
        }
        files.insert(name, file);
    }

    /// Looks up a cached service without consulting the provider.
    pub fn get_service(&self, full_name: &str) -> Option<ServiceDescriptor> {
        self.inner
            .services
            .read()
            .expect("schema cache lock poisoned")
            .get(full_name)
            .cloned()
    }

    /// Looks up a cached message type without consulting the provider.
    /// Message types declared by cached files are searched first, then the
    /// input/output types of every cached service method.
    pub fn find_message(&self, full_name: &str) -> Option<MessageDescriptor> {
        {
            let files = self.inner.files.read().expect("schema cache lock poisoned");
            for file in files.values() {
                if let Some(message) = file.messages().find(|m| m.full_name() == full_name) {
                    return Some(message.clone());
                }
            }
        }
        let services = self
            .inner
            .services
            .read()
            .expect("schema cache lock poisoned");
        for service in services.values() {
            for method in service.methods() {
                if method.input().full_name() == full_name {
                    return Some(method.input().clone());
                }
                if method.output().full_name() == full_name {
                    return Some(method.output().clone());
                }
            }
        }
        None
    }

    /// Resolves a service: cache first, then the provider. A provider answer
    /// is registered before returning, so the remote is asked at most once
    /// per service name.
    pub async fn resolve_service(&self, full_name: &str) -> Result<ServiceDescriptor, SchemaError> {
        if let Some(service) = self.get_service(full_name) {
            return Ok(service);
        }
        let Some(provider) = &self.inner.provider else {
            return Err(SchemaError::ServiceNotFound(full_name.to_string()));
        };
        tracing::debug!(service = %full_name, "resolving service through schema provider");
        match provider.resolve_by_name(full_name).await? {
            Some(Descriptor::Service(service)) => {
                self.register_service(service);
                // Re-read instead of returning the fresh descriptor so a
                // racing resolver and this one hand out the same instance.
                self.get_service(full_name)
                    .ok_or_else(|| SchemaError::ServiceNotFound(full_name.to_string()))
            }
            Some(Descriptor::Message(_)) | None => {
                Err(SchemaError::ServiceNotFound(full_name.to_string()))
            }
        }
    }

    /// Resolves a message type: cache first, then the provider. A resolved
    /// message is memoized under a synthetic single-message file.
    pub async fn resolve_message(&self, full_name: &str) -> Result<MessageDescriptor, SchemaError> {
        if let Some(message) = self.find_message(full_name) {
            return Ok(message);
        }
        let Some(provider) = &self.inner.provider else {
            return Err(SchemaError::MessageTypeNotFound(full_name.to_string()));
        };
        tracing::debug!(message = %full_name, "resolving message type through schema provider");
        match provider.resolve_by_name(full_name).await? {
            Some(Descriptor::Message(message)) => {
                let file = FileDescriptor::new(
                    format!("dynamic/{full_name}.proto"),
                    vec![],
                    vec![message.clone()],
                );
                self.register_file(file);
                Ok(message)
            }
            Some(Descriptor::Service(_)) | None => {
                Err(SchemaError::MessageTypeNotFound(full_name.to_string()))
            }
        }
    }

    /// Lists the service names advertised by the provider. Fails with
    /// [`SchemaError::ReflectionDisabled`] when no provider is configured.
    pub async fn list_remote_services(&self) -> Result<Vec<String>, SchemaError> {
        match &self.inner.provider {
            Some(provider) => provider.list_services().await,
            None => {
                tracing::warn!("service listing requested but no schema provider is configured");
                Err(SchemaError::ReflectionDisabled)
            }
        }
    }

    /// The full names of locally cached services.
    pub fn cached_services(&self) -> Vec<String> {
        self.inner
            .services
            .read()
            .expect("schema cache lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        FieldDescriptor, MessageDescriptor, MethodDescriptor, MethodShape, ScalarType,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(full_name: &str) -> MessageDescriptor {
        MessageDescriptor::new(
            full_name,
            vec![FieldDescriptor::new("value", 1, ScalarType::String)],
        )
        .unwrap()
    }

    fn service(full_name: &str, method: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(
            full_name,
            vec![MethodDescriptor::new(
                method,
                message(&format!("{full_name}.Input")),
                message(&format!("{full_name}.Output")),
                MethodShape::Unary,
            )],
        )
        .unwrap()
    }

    struct CountingProvider {
        calls: AtomicUsize,
        answer: Option<Descriptor>,
    }

    #[tonic::async_trait]
    impl SchemaProvider for CountingProvider {
        async fn resolve_by_name(&self, _: &str) -> Result<Option<Descriptor>, SchemaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }

        async fn list_services(&self) -> Result<Vec<String>, SchemaError> {
            Ok(vec!["remote.Service".to_string()])
        }
    }

    #[test]
    fn first_registration_wins() {
        let cache = SchemaCache::new(None);
        cache.register_service(service("test.Svc", "First"));
        cache.register_service(service("test.Svc", "Second"));

        let cached = cache.get_service("test.Svc").unwrap();
        assert!(cached.get_method_by_name("First").is_some());
        assert!(cached.get_method_by_name("Second").is_none());
    }

    #[test]
    fn find_message_searches_files_then_method_types() {
        let cache = SchemaCache::new(None);
        cache.register_file(FileDescriptor::new(
            "test/a.proto",
            vec![],
            vec![message("test.FromFile")],
        ));
        cache.register_service(service("test.Svc", "Call"));

        assert!(cache.find_message("test.FromFile").is_some());
        assert!(cache.find_message("test.Svc.Input").is_some());
        assert!(cache.find_message("test.Svc.Output").is_some());
        assert!(cache.find_message("test.Missing").is_none());
    }

    #[tokio::test]
    async fn resolve_without_provider_fails_on_cache_miss() {
        let cache = SchemaCache::new(None);
        let err = cache.resolve_service("test.Missing").await.unwrap_err();
        assert!(matches!(err, SchemaError::ServiceNotFound(_)));

        let err = cache.resolve_message("test.Missing").await.unwrap_err();
        assert!(matches!(err, SchemaError::MessageTypeNotFound(_)));

        let err = cache.list_remote_services().await.unwrap_err();
        assert!(matches!(err, SchemaError::ReflectionDisabled));
    }

    #[tokio::test]
    async fn provider_answers_are_memoized() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            answer: Some(Descriptor::Service(service("test.Remote", "Call"))),
        });
        let cache = SchemaCache::new(Some(provider.clone()));

        cache.resolve_service("test.Remote").await.unwrap();
        cache.resolve_service("test.Remote").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolved_messages_are_memoized_under_a_synthetic_file() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            answer: Some(Descriptor::Message(message("test.Remote"))),
        });
        let cache = SchemaCache::new(Some(provider.clone()));

        cache.resolve_message("test.Remote").await.unwrap();
        cache.resolve_message("test.Remote").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(cache.find_message("test.Remote").is_some());
    }

    #[tokio::test]
    async fn a_message_answer_does_not_satisfy_a_service_lookup() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            answer: Some(Descriptor::Message(message("test.Remote"))),
        });
        let cache = SchemaCache::new(Some(provider));

        let err = cache.resolve_service("test.Remote").await.unwrap_err();
        assert!(matches!(err, SchemaError::ServiceNotFound(_)));
    }
}
