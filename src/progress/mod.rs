pub mod error;
pub mod stream;
pub mod types;

pub use error::{ProgressError, ProgressErrorKind};
pub use stream::{ProgressEventStream, ProgressStream, ProgressSubscription};
pub use types::{EventStatus, ProgressEvent, Step};
