//! ECS-compliant JSON logging for `tracing`.
//!
//! [`EcsFormatter`] turns a [`LogEntry`] into a single line of JSON following
//! the Elastic Common Schema; [`EcsLayer`] plugs it into a
//! `tracing_subscriber` registry.

pub mod record;
pub mod error;
pub mod encoder;
pub mod formatter;
pub mod layer;

pub mod init;
pub mod env;

pub use error::FormatError;
pub use formatter::{EcsFormatter, ECS_VERSION};
pub use layer::EcsLayer;
pub use record::{CallSite, FieldValue, LogEntry};
