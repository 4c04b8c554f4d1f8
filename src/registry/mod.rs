pub mod error;
pub mod registry;
pub mod types;

pub use error::{RegistryError, RegistryErrorKind};
pub use registry::TaskRegistry;
pub use types::{FailureKind, TaskFailure, TaskId, TaskSnapshot, TaskStatus};
