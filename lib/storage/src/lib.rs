//! Storage backends for mediax.
//!
//! Three backends implement the persistence contracts of `mediax-core`:
//!
//! - [`memory`]: an in-process store, used for tests and ephemeral schemas
//! - [`grpc`]: a vector-native store reached over the `mediax.store` gRPC protocol
//! - [`pgvector`]: PostgreSQL with the pgvector extension
//!
//! Backends are looked up by name through a [`ConnectionRegistry`].

pub mod grpc;
pub mod memory;
pub mod pgvector;
pub mod registry;

pub use grpc::{GrpcConnection, GrpcConnectionProvider};
pub use memory::{MemoryConnection, MemoryConnectionProvider};
pub use pgvector::{PgVectorConnection, PgVectorConnectionProvider};
pub use registry::{ConnectionProvider, ConnectionRegistry};

use mediax_core::{Descriptor, Error, Layout, Result};

/// Checks that a descriptor can be persisted under `layout`.
///
/// Descriptors are stored per retrievable, so one without a retrievable id is
/// rejected along with any layout violation.
pub fn check_writable(layout: &Layout, descriptor: &Descriptor) -> Result<()> {
    layout.check(descriptor)?;
    if descriptor.retrievable_id().is_none() {
        return Err(Error::InvalidArgument(format!(
            "descriptor {} is not attached to a retrievable",
            descriptor.id()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediax_core::{Type, Value};
    use uuid::Uuid;

    #[test]
    fn test_check_writable_requires_retrievable() {
        let layout = Layout::scalar(Type::Long).unwrap();
        let loose = Descriptor::scalar(Uuid::new_v4(), None, Value::Long(1), None);
        assert!(matches!(check_writable(&layout, &loose), Err(Error::InvalidArgument(_))));
        let bound = loose.with_retrievable_id(Uuid::new_v4());
        assert!(check_writable(&layout, &bound).is_ok());
        let wrong = Descriptor::scalar(Uuid::new_v4(), Some(Uuid::new_v4()), Value::Int(1), None);
        assert!(check_writable(&layout, &wrong).is_err());
    }
}
