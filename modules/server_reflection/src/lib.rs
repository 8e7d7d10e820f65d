//! gRPC Server Reflection
//!
//! Answers `grpc.reflection.v1` (and `v1alpha`) queries against a fixed set of
//! protobuf file descriptors:
//!
//! * `file_by_filename` and `file_containing_symbol` return the requested file plus
//!   its transitive dependencies, each serialized as a `FileDescriptorProto`;
//! * `list_services` returns every service name in load order;
//! * every other request kind gets an `UNIMPLEMENTED` error response.
//!
//! Each stream is served by one task that answers queries strictly in order. Errors
//! are reported in-band and never end the stream.

pub mod builder;
pub mod closure;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod index;
pub mod module;
pub mod response;
pub mod service;
pub mod source;

pub use builder::{ReflectionBuilder, ReflectionState};
pub use config::ServerReflectionConfig;
pub use dispatcher::{Dispatcher, Query, ReflectionExchange};
pub use error::{IndexError, ReflectionError};
pub use index::DescriptorIndex;
pub use module::ServerReflectionModule;
pub use response::Reply;
pub use service::{ServerReflectionV1, ServerReflectionV1Alpha};
pub use source::{DescriptorSetFile, DescriptorSource, EncodedDescriptorSet};
