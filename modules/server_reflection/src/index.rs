//! Read-only lookup structures over a fixed set of file descriptors.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use prost_types::{DescriptorProto, FileDescriptorProto};
use tracing::debug;

use crate::error::IndexError;

/// Lookup maps built once from a complete descriptor set.
///
/// Holds file name → descriptor, fully-qualified symbol → owning descriptor and the
/// list of services in load order. Nothing is mutated after [`DescriptorIndex::new`]
/// returns, so the index can be shared freely between streams.
#[derive(Debug, Default)]
pub struct DescriptorIndex {
    files: HashMap<String, Arc<FileDescriptorProto>>,
    symbols: HashMap<String, Arc<FileDescriptorProto>>,
    services: Vec<String>,
}

impl DescriptorIndex {
    /// Build the index, failing on empty or duplicate file names, duplicate symbols
    /// and dependencies that point outside the set.
    pub fn new<I>(files: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = FileDescriptorProto>,
    {
        let mut index = Self::default();

        for file in files {
            let name = file.name().to_string();
            if name.is_empty() {
                return Err(IndexError::EmptyFileName);
            }

            let file = Arc::new(file);
            match index.files.entry(name.clone()) {
                Entry::Occupied(_) => return Err(IndexError::DuplicateFile(name)),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&file));
                }
            }

            for symbol in defined_symbols(&file) {
                match index.symbols.entry(symbol) {
                    Entry::Occupied(existing) => {
                        return Err(IndexError::DuplicateSymbol {
                            symbol: existing.key().clone(),
                            first: existing.get().name().to_string(),
                            second: name,
                        });
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(Arc::clone(&file));
                    }
                }
            }

            let package = strip_leading_dot(file.package());
            index
                .services
                .extend(file.service.iter().map(|svc| qualify(package, svc.name())));
        }

        // Dependencies may appear in any order in the input, so check them once every
        // file is known.
        for file in index.files.values() {
            if let Some(missing) = file
                .dependency
                .iter()
                .find(|dep| !index.files.contains_key(dep.as_str()))
            {
                return Err(IndexError::UnresolvedDependency {
                    file: file.name().to_string(),
                    dependency: missing.clone(),
                });
            }
        }

        debug!(
            files = index.files.len(),
            symbols = index.symbols.len(),
            services = index.services.len(),
            "descriptor index built"
        );

        Ok(index)
    }

    /// Exact, case-sensitive lookup by file name.
    pub fn file_by_name(&self, name: &str) -> Option<&Arc<FileDescriptorProto>> {
        self.files.get(name)
    }

    /// Lookup by fully-qualified symbol name. `pkg.Type` and `.pkg.Type` are equivalent.
    pub fn file_containing_symbol(&self, symbol: &str) -> Option<&Arc<FileDescriptorProto>> {
        self.symbols.get(strip_leading_dot(symbol))
    }

    /// Fully-qualified service names in the order they were loaded.
    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

pub(crate) fn strip_leading_dot(name: &str) -> &str {
    name.strip_prefix('.').unwrap_or(name)
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

/// Every symbol a file declares: services and their methods, messages and enums at
/// any nesting depth.
fn defined_symbols(file: &FileDescriptorProto) -> Vec<String> {
    let package = strip_leading_dot(file.package());
    let mut symbols = Vec::new();

    for svc in &file.service {
        let svc_name = qualify(package, svc.name());
        symbols.extend(svc.method.iter().map(|m| qualify(&svc_name, m.name())));
        symbols.push(svc_name);
    }

    symbols.extend(file.enum_type.iter().map(|e| qualify(package, e.name())));

    let mut pending: Vec<(String, &DescriptorProto)> = file
        .message_type
        .iter()
        .map(|msg| (package.to_string(), msg))
        .collect();

    while let Some((scope, msg)) = pending.pop() {
        let msg_name = qualify(&scope, msg.name());
        symbols.extend(msg.enum_type.iter().map(|e| qualify(&msg_name, e.name())));
        pending.extend(msg.nested_type.iter().map(|n| (msg_name.clone(), n)));
        symbols.push(msg_name);
    }

    symbols
}
