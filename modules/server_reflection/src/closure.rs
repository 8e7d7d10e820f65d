//! Transitive dependency closure of a file descriptor.

use std::collections::HashSet;
use std::sync::Arc;

use prost_types::FileDescriptorProto;

use crate::index::DescriptorIndex;

/// Key used to decide whether two descriptors are the same file.
///
/// Names that differ only in ASCII case collapse to one entry.
pub(crate) fn dedup_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Collect `root` and every descriptor reachable from it through `dependency` edges.
///
/// Walks depth-first with an explicit stack, so arbitrarily deep import chains do not
/// grow the call stack. The result starts with `root`, followed by dependencies in
/// pre-order (declaration order within each file). No two entries share a name under
/// [`dedup_key`]. The order of files that do not depend on each other is not part of
/// the contract.
///
/// Dependency names that the index cannot resolve are skipped; an index built by
/// [`DescriptorIndex::new`] never contains such names.
pub fn closure(
    index: &DescriptorIndex,
    root: &Arc<FileDescriptorProto>,
) -> Vec<Arc<FileDescriptorProto>> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut files = Vec::new();
    let mut stack = vec![Arc::clone(root)];

    while let Some(file) = stack.pop() {
        if !visited.insert(dedup_key(file.name())) {
            continue;
        }

        // Reverse so the first declared dependency is visited first.
        for dep in file.dependency.iter().rev() {
            if visited.contains(&dedup_key(dep)) {
                continue;
            }
            if let Some(resolved) = index.file_by_name(dep) {
                stack.push(Arc::clone(resolved));
            }
        }

        files.push(file);
    }

    files
}
