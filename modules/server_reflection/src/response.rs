//! Outgoing reflection payloads.

use std::collections::HashSet;
use std::sync::Arc;

use prost::Message;
use prost_types::FileDescriptorProto;
use tonic::Code;

use crate::closure::dedup_key;
use crate::index::strip_leading_dot;

pub const FILE_NOT_FOUND: &str = "File not found.";
pub const SYMBOL_NOT_FOUND: &str = "Symbol not found.";

/// One reply per inbound query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Serialized `FileDescriptorProto`s, requested file first.
    FileDescriptors(Vec<Vec<u8>>),
    /// Fully-qualified service names without a leading `.`.
    Services(Vec<String>),
    Error { code: Code, message: String },
}

impl Reply {
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

/// Encode every descriptor of a resolved closure, skipping names already emitted.
pub fn file_descriptor_response(files: &[Arc<FileDescriptorProto>]) -> Reply {
    let mut seen = HashSet::with_capacity(files.len());
    let encoded = files
        .iter()
        .filter(|file| seen.insert(dedup_key(file.name())))
        .map(|file| file.encode_to_vec())
        .collect();

    Reply::FileDescriptors(encoded)
}

pub fn list_services_response(services: &[String]) -> Reply {
    Reply::Services(
        services
            .iter()
            .map(|name| strip_leading_dot(name).to_string())
            .collect(),
    )
}

pub fn error_response(code: Code, message: impl Into<String>) -> Reply {
    Reply::Error {
        code,
        message: message.into(),
    }
}
