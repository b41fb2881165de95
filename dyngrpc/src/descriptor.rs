//! # Schema Descriptors
//!
//! The descriptor model consumed by the dynamic client. Descriptors are an
//! already-parsed field/type model: they are either built by the caller and
//! pre-registered on the client, or handed over by a schema provider at
//! runtime. The client never parses raw descriptor bytes itself.
//!
//! All descriptor handles are cheap to clone (`Arc`-backed) and immutable
//! once constructed, so they can be shared freely across concurrent calls.
//!
//! Only scalar fields are representable. Nested messages, repeated fields,
//! maps and enums are deliberately out of scope for this client.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Errors raised while constructing descriptors.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("field '{field}' in message '{message}' has field number 0")]
    InvalidFieldNumber { message: String, field: String },
    #[error("duplicate field name '{field}' in message '{message}'")]
    DuplicateFieldName { message: String, field: String },
    #[error("duplicate field number {number} in message '{message}'")]
    DuplicateFieldNumber { message: String, number: u32 },
    #[error("duplicate method name '{method}' in service '{service}'")]
    DuplicateMethodName { service: String, method: String },
    #[error("service name '{service}' is not a valid fully qualified name")]
    InvalidServiceName { service: String },
    #[error("method name '{method}' in service '{service}' is not a valid identifier")]
    InvalidMethodName { service: String, method: String },
}

/// The closed set of protobuf scalar field types supported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Uint32 => "uint32",
            ScalarType::Uint64 => "uint64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A single scalar field declaration within a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    number: u32,
    scalar: ScalarType,
    json_name: String,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, number: u32, scalar: ScalarType) -> Self {
        let name = name.into();
        let json_name = to_json_name(&name);
        Self {
            name,
            number,
            scalar,
            json_name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn scalar(&self) -> ScalarType {
        self.scalar
    }

    /// The camelCase name used for JSON interchange (e.g. `user_id` -> `userId`).
    pub fn json_name(&self) -> &str {
        &self.json_name
    }
}

#[derive(Debug, PartialEq, Eq)]
struct MessageInner {
    full_name: String,
    fields: Vec<FieldDescriptor>,
}

/// The schema of a single message type: a globally unique full name plus an
/// ordered list of scalar fields with unique names and numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    inner: Arc<MessageInner>,
}

impl MessageDescriptor {
    pub fn new(
        full_name: impl Into<String>,
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self, DescriptorError> {
        let full_name = full_name.into();
        let mut names = HashSet::new();
        let mut numbers = HashSet::new();
        for field in &fields {
            if field.number == 0 {
                return Err(DescriptorError::InvalidFieldNumber {
                    message: full_name,
                    field: field.name.clone(),
                });
            }
            if !names.insert(field.name.as_str()) {
                return Err(DescriptorError::DuplicateFieldName {
                    message: full_name,
                    field: field.name.clone(),
                });
            }
            if !numbers.insert(field.number) {
                return Err(DescriptorError::DuplicateFieldNumber {
                    message: full_name,
                    number: field.number,
                });
            }
        }
        Ok(Self {
            inner: Arc::new(MessageInner { full_name, fields }),
        })
    }

    pub fn full_name(&self) -> &str {
        &self.inner.full_name
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.inner.fields.iter()
    }

    pub fn get_field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.inner.fields.iter().find(|f| f.name == name)
    }

    pub fn get_field_by_json_name(&self, json_name: &str) -> Option<&FieldDescriptor> {
        self.inner.fields.iter().find(|f| f.json_name == json_name)
    }

    pub fn get_field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.inner.fields.iter().find(|f| f.number == number)
    }
}

/// One of the four RPC call patterns, determined by a method's pair of
/// streaming flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    Bidirectional,
}

impl MethodShape {
    /// Maps the `(client_streaming, server_streaming)` flag pair to its shape.
    pub fn from_flags(client_streaming: bool, server_streaming: bool) -> Self {
        match (client_streaming, server_streaming) {
            (false, false) => MethodShape::Unary,
            (true, false) => MethodShape::ClientStreaming,
            (false, true) => MethodShape::ServerStreaming,
            (true, true) => MethodShape::Bidirectional,
        }
    }

    pub fn is_client_streaming(&self) -> bool {
        matches!(self, MethodShape::ClientStreaming | MethodShape::Bidirectional)
    }

    pub fn is_server_streaming(&self) -> bool {
        matches!(self, MethodShape::ServerStreaming | MethodShape::Bidirectional)
    }
}

impl fmt::Display for MethodShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MethodShape::Unary => "unary",
            MethodShape::ClientStreaming => "client streaming",
            MethodShape::ServerStreaming => "server streaming",
            MethodShape::Bidirectional => "bidirectional streaming",
        };
        f.write_str(name)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct MethodInner {
    name: String,
    input: MessageDescriptor,
    output: MessageDescriptor,
    shape: MethodShape,
}

/// The schema of a single RPC method: input/output message types plus the
/// call shape derived from the method's streaming flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    inner: Arc<MethodInner>,
}

impl MethodDescriptor {
    pub fn new(
        name: impl Into<String>,
        input: MessageDescriptor,
        output: MessageDescriptor,
        shape: MethodShape,
    ) -> Self {
        Self {
            inner: Arc::new(MethodInner {
                name: name.into(),
                input,
                output,
                shape,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn input(&self) -> &MessageDescriptor {
        &self.inner.input
    }

    pub fn output(&self) -> &MessageDescriptor {
        &self.inner.output
    }

    pub fn shape(&self) -> MethodShape {
        self.inner.shape
    }

    pub fn is_client_streaming(&self) -> bool {
        self.inner.shape.is_client_streaming()
    }

    pub fn is_server_streaming(&self) -> bool {
        self.inner.shape.is_server_streaming()
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ServiceInner {
    full_name: String,
    methods: Vec<MethodDescriptor>,
}

/// The schema of a gRPC service: a fully qualified name plus its methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    inner: Arc<ServiceInner>,
}

impl ServiceDescriptor {
    /// Builds a service descriptor. The service name must be a dot-separated
    /// sequence of identifiers and every method name a single identifier;
    /// both end up verbatim in the `/{service}/{method}` request path.
    pub fn new(
        full_name: impl Into<String>,
        methods: Vec<MethodDescriptor>,
    ) -> Result<Self, DescriptorError> {
        let full_name = full_name.into();
        if !is_full_name(&full_name) {
            return Err(DescriptorError::InvalidServiceName { service: full_name });
        }
        let mut names = HashSet::new();
        for method in &methods {
            if !is_identifier(method.name()) {
                return Err(DescriptorError::InvalidMethodName {
                    service: full_name,
                    method: method.name().to_string(),
                });
            }
            if !names.insert(method.name()) {
                return Err(DescriptorError::DuplicateMethodName {
                    service: full_name,
                    method: method.name().to_string(),
                });
            }
        }
        Ok(Self {
            inner: Arc::new(ServiceInner { full_name, methods }),
        })
    }

    pub fn full_name(&self) -> &str {
        &self.inner.full_name
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.inner.methods.iter()
    }

    pub fn get_method_by_name(&self, name: &str) -> Option<&MethodDescriptor> {
        self.inner.methods.iter().find(|m| m.name() == name)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct FileInner {
    name: String,
    services: Vec<ServiceDescriptor>,
    messages: Vec<MessageDescriptor>,
}

/// A schema group: services and message types that were registered or
/// discovered together, keyed by a file-like name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    inner: Arc<FileInner>,
}

impl FileDescriptor {
    pub fn new(
        name: impl Into<String>,
        services: Vec<ServiceDescriptor>,
        messages: Vec<MessageDescriptor>,
    ) -> Self {
        Self {
            inner: Arc::new(FileInner {
                name: name.into(),
                services,
                messages,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.inner.services.iter()
    }

    pub fn messages(&self) -> impl Iterator<Item = &MessageDescriptor> {
        self.inner.messages.iter()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_full_name(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}

fn to_json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut capitalize = false;
    for ch in name.chars() {
        if ch == '_' {
            capitalize = true;
        } else if capitalize {
            out.extend(ch.to_uppercase());
            capitalize = false;
        } else {
            out.push(ch);
        }
    }
    out
}
