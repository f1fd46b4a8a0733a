//! # Schema Registry
//!
//! Holds the descriptors a session discovered through server reflection and answers
//! lookups by name.
//!
//! Methods are looked up by their wire name (`/package.Service/Method`), which is normalized
//! into the dotted form (`package.Service.Method`) before resolution.
use crate::BoxError;
use crate::reflection::client::{ReflectionClient, ReflectionResolveError};
use http_body::Body as HttpBody;
use prost_reflect::{DescriptorError, DescriptorPool, MethodDescriptor};
use prost_types::FileDescriptorSet;
use serde::Serialize;
use tonic::client::GrpcService;

mod descriptor;

pub use descriptor::Descriptor;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Descriptor '{0}' not found")]
    DescriptorNotFound(String),
    #[error("Descriptor '{name}' is a {kind}, not a method")]
    NotAMethod { name: String, kind: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Reflection resolution failed: '{0}'")]
    ReflectionResolve(#[from] ReflectionResolveError),
    #[error("Failed to decode file descriptor set: '{0}'")]
    DescriptorError(#[from] DescriptorError),
}

/// A service and its methods, as listed to the presentation layer.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ServiceEntry {
    pub full_name: String,
    pub methods: Vec<MethodEntry>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MethodEntry {
    pub name: String,
    /// Wire name, e.g. `/pkg.Greeter/SayHello`.
    pub full_name: String,
}

#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    pool: DescriptorPool,
}

impl SchemaRegistry {
    pub fn new(pool: DescriptorPool) -> Self {
        Self { pool }
    }

    pub fn from_file_descriptor_set(fd_set: FileDescriptorSet) -> Result<Self, DescriptorError> {
        Ok(Self::new(DescriptorPool::from_file_descriptor_set(fd_set)?))
    }

    /// Builds a registry from every service the server exposes through reflection.
    pub async fn discover<S>(client: &mut ReflectionClient<S>) -> Result<Self, DiscoveryError>
    where
        S: GrpcService<tonic::body::Body>,
        S::Error: Into<BoxError>,
        S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
        <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    {
        let fd_set = client.all_services_file_descriptor_set().await?;
        Ok(Self::from_file_descriptor_set(fd_set)?)
    }

    pub fn is_empty(&self) -> bool {
        self.pool.services().len() == 0
    }

    /// Resolves a method by wire name (`/package.Service/Method`).
    pub fn find_method(&self, full_name: &str) -> Result<MethodDescriptor, LookupError> {
        let symbol = dotted_name(full_name);

        if let Some((service, method)) = symbol.rsplit_once('.')
            && let Some(service) = self.pool.get_service_by_name(service)
            && let Some(method) = service.methods().find(|m| m.name() == method)
        {
            return Ok(method);
        }

        match self.symbol_kind(&symbol) {
            Some(kind) => Err(LookupError::NotAMethod {
                name: full_name.to_string(),
                kind,
            }),
            None => Err(LookupError::DescriptorNotFound(full_name.to_string())),
        }
    }

    /// Resolves a service, message or enum by its full name.
    pub fn get_descriptor_by_symbol(&self, symbol: &str) -> Option<Descriptor> {
        let pool = &self.pool;

        if let Some(descriptor) = pool.get_service_by_name(symbol) {
            return Some(Descriptor::ServiceDescriptor(descriptor));
        }

        if let Some(descriptor) = pool.get_message_by_name(symbol) {
            return Some(Descriptor::MessageDescriptor(descriptor));
        }

        if let Some(descriptor) = pool.get_enum_by_name(symbol) {
            return Some(Descriptor::EnumDescriptor(descriptor));
        }

        None
    }

    /// Services sorted by full name, each with its methods sorted by name.
    pub fn services(&self) -> Vec<ServiceEntry> {
        let mut services: Vec<ServiceEntry> = self
            .pool
            .services()
            .map(|service| {
                let mut methods: Vec<MethodEntry> = service
                    .methods()
                    .map(|method| MethodEntry {
                        name: method.name().to_string(),
                        full_name: format!("/{}/{}", service.full_name(), method.name()),
                    })
                    .collect();
                methods.sort_by(|a, b| a.name.cmp(&b.name));

                ServiceEntry {
                    full_name: service.full_name().to_string(),
                    methods,
                }
            })
            .collect();

        services.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        services
    }

    fn symbol_kind(&self, symbol: &str) -> Option<&'static str> {
        if let Some(descriptor) = self.get_descriptor_by_symbol(symbol) {
            return Some(descriptor.kind());
        }

        let (parent, child) = symbol.rsplit_once('.')?;

        if let Some(message) = self.pool.get_message_by_name(parent) {
            if message.get_field_by_name(child).is_some() {
                return Some("field");
            }
            if message.oneofs().any(|oneof| oneof.name() == child) {
                return Some("oneof");
            }
        }

        if let Some(enum_desc) = self.pool.get_enum_by_name(parent)
            && enum_desc.get_value_by_name(child).is_some()
        {
            return Some("enum value");
        }

        None
    }
}

/// `/package.Service/Method` -> `package.Service.Method`
fn dotted_name(full_name: &str) -> String {
    full_name
        .strip_prefix('/')
        .unwrap_or(full_name)
        .replacen('/', ".", 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(testing::pool())
    }

    #[test]
    fn test_find_method_by_wire_name() {
        let method = registry().find_method("/pkg.Greeter/SayHello").unwrap();

        assert_eq!(method.full_name(), "pkg.Greeter.SayHello");
        assert_eq!(method.input().full_name(), "pkg.HelloRequest");
        assert!(!method.is_client_streaming());
    }

    #[test]
    fn test_find_method_tolerates_missing_leading_slash() {
        let method = registry().find_method("pkg.Greeter/Collect").unwrap();

        assert!(method.is_client_streaming());
    }

    #[test]
    fn test_find_method_unknown_names() {
        let registry = registry();

        assert_eq!(
            registry.find_method("/pkg.Greeter/Ghost").unwrap_err(),
            LookupError::DescriptorNotFound("/pkg.Greeter/Ghost".to_string())
        );
        assert_eq!(
            registry.find_method("/ghost.Service/Method").unwrap_err(),
            LookupError::DescriptorNotFound("/ghost.Service/Method".to_string())
        );
        assert_eq!(
            SchemaRegistry::default()
                .find_method("/pkg.Greeter/SayHello")
                .unwrap_err(),
            LookupError::DescriptorNotFound("/pkg.Greeter/SayHello".to_string())
        );
    }

    #[test]
    fn test_find_method_non_method_descriptors() {
        let registry = registry();

        assert_eq!(
            registry.find_method("/pkg.HelloRequest").unwrap_err(),
            LookupError::NotAMethod {
                name: "/pkg.HelloRequest".to_string(),
                kind: "message"
            }
        );
        assert_eq!(
            registry.find_method("/pkg/Greeter").unwrap_err(),
            LookupError::NotAMethod {
                name: "/pkg/Greeter".to_string(),
                kind: "service"
            }
        );
        assert_eq!(
            registry.find_method("/pkg.HelloRequest/name").unwrap_err(),
            LookupError::NotAMethod {
                name: "/pkg.HelloRequest/name".to_string(),
                kind: "field"
            }
        );
    }

    #[test]
    fn test_services_are_sorted() {
        let services = registry().services();

        let names: Vec<_> = services.iter().map(|s| s.full_name.as_str()).collect();
        assert_eq!(names, vec!["pkg.Admin", "pkg.Greeter"]);

        assert_eq!(
            services[0].methods,
            vec![
                MethodEntry {
                    name: "Audit".to_string(),
                    full_name: "/pkg.Admin/Audit".to_string(),
                },
                MethodEntry {
                    name: "Reset".to_string(),
                    full_name: "/pkg.Admin/Reset".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_empty_registry() {
        assert!(SchemaRegistry::default().is_empty());
        assert!(SchemaRegistry::default().services().is_empty());
        assert!(!registry().is_empty());
    }
}
