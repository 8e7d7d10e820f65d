//! Where file descriptors come from.
//!
//! The reflection core does not derive descriptors from service definitions itself.
//! Anything that can produce `FileDescriptorProto`s (a code generator, a schema
//! compiler, a file on disk) plugs in through [`DescriptorSource`].

use std::path::{Path, PathBuf};

use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};

use crate::error::ReflectionError;

/// Produces the file descriptors of one schema unit.
pub trait DescriptorSource: Send + Sync {
    /// Human-readable origin, used in error messages and logs.
    fn source_name(&self) -> String;

    fn file_descriptors(&self) -> Result<Vec<FileDescriptorProto>, ReflectionError>;
}

impl DescriptorSource for FileDescriptorSet {
    fn source_name(&self) -> String {
        "file descriptor set".to_string()
    }

    fn file_descriptors(&self) -> Result<Vec<FileDescriptorProto>, ReflectionError> {
        Ok(self.file.clone())
    }
}

impl DescriptorSource for Vec<FileDescriptorProto> {
    fn source_name(&self) -> String {
        "file descriptors".to_string()
    }

    fn file_descriptors(&self) -> Result<Vec<FileDescriptorProto>, ReflectionError> {
        Ok(self.clone())
    }
}

/// An encoded `FileDescriptorSet`, as emitted by `protoc --descriptor_set_out` or
/// embedded with `tonic::include_file_descriptor_set!`.
#[derive(Debug, Clone, Copy)]
pub struct EncodedDescriptorSet<'a> {
    name: &'a str,
    bytes: &'a [u8],
}

impl<'a> EncodedDescriptorSet<'a> {
    pub fn new(name: &'a str, bytes: &'a [u8]) -> Self {
        Self { name, bytes }
    }
}

impl DescriptorSource for EncodedDescriptorSet<'_> {
    fn source_name(&self) -> String {
        self.name.to_string()
    }

    fn file_descriptors(&self) -> Result<Vec<FileDescriptorProto>, ReflectionError> {
        decode_set(self.name, self.bytes)
    }
}

/// An encoded `FileDescriptorSet` stored on disk.
#[derive(Debug, Clone)]
pub struct DescriptorSetFile {
    path: PathBuf,
}

impl DescriptorSetFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DescriptorSource for DescriptorSetFile {
    fn source_name(&self) -> String {
        self.path.display().to_string()
    }

    fn file_descriptors(&self) -> Result<Vec<FileDescriptorProto>, ReflectionError> {
        let bytes = std::fs::read(&self.path).map_err(|source| ReflectionError::Io {
            path: self.path.clone(),
            source,
        })?;
        decode_set(&self.source_name(), &bytes)
    }
}

fn decode_set(name: &str, bytes: &[u8]) -> Result<Vec<FileDescriptorProto>, ReflectionError> {
    FileDescriptorSet::decode(bytes)
        .map(|set| set.file)
        .map_err(|source| ReflectionError::Decode {
            source_name: name.to_string(),
            source,
        })
}
