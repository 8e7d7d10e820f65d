use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use prost_types::{FileDescriptorProto, FileDescriptorSet};
use reflection_grpc_stubs::{v1, v1alpha};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::error::ReflectionError;
use crate::index::DescriptorIndex;
use crate::service::{ServerReflectionV1, ServerReflectionV1Alpha};
use crate::source::{DescriptorSource, EncodedDescriptorSet};

/// State shared by every stream of one reflection endpoint.
pub struct ReflectionState {
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
}

impl ReflectionState {
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn index(&self) -> &DescriptorIndex {
        self.dispatcher.index()
    }

    /// Token observed by every stream; cancelling it ends all of them.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// Collects descriptor sources and builds the reflection endpoint.
///
/// A file registered by several sources is kept once when every copy defines the
/// same schema, which is common when descriptor sets are produced with
/// `--include_imports`. Copies may differ in `source_code_info`; the first one wins.
pub struct ReflectionBuilder<'a> {
    sources: Vec<Box<dyn DescriptorSource + 'a>>,
    include_reflection_service: bool,
    shutdown: CancellationToken,
}

impl Default for ReflectionBuilder<'_> {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            include_reflection_service: true,
            shutdown: CancellationToken::new(),
        }
    }
}

impl<'a> ReflectionBuilder<'a> {
    pub fn configure() -> Self {
        Self::default()
    }

    pub fn register_source(mut self, source: impl DescriptorSource + 'a) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn register_file_descriptor_set(self, set: FileDescriptorSet) -> Self {
        self.register_source(set)
    }

    pub fn register_file_descriptors(self, files: Vec<FileDescriptorProto>) -> Self {
        self.register_source(files)
    }

    pub fn register_encoded_file_descriptor_set(self, bytes: &'a [u8]) -> Self {
        self.register_source(EncodedDescriptorSet::new("encoded descriptor set", bytes))
    }

    /// Also describe the reflection protocol itself (on by default).
    pub fn include_reflection_service(mut self, include: bool) -> Self {
        self.include_reflection_service = include;
        self
    }

    /// Streams end when this token is cancelled, e.g. on server shutdown.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn build(self) -> Result<Arc<ReflectionState>, ReflectionError> {
        let mut sources = self.sources;
        if self.include_reflection_service {
            sources.push(Box::new(EncodedDescriptorSet::new(
                reflection_grpc_stubs::SERVICE_NAME_V1,
                v1::FILE_DESCRIPTOR_SET,
            )));
            sources.push(Box::new(EncodedDescriptorSet::new(
                reflection_grpc_stubs::SERVICE_NAME_V1ALPHA,
                v1alpha::FILE_DESCRIPTOR_SET,
            )));
        }

        let mut files: Vec<FileDescriptorProto> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for source in &sources {
            let loaded = source.file_descriptors()?;
            debug!(source = %source.source_name(), files = loaded.len(), "descriptor source loaded");

            for file in loaded {
                match positions.entry(file.name().to_string()) {
                    Entry::Occupied(existing) => {
                        if !same_definition(&files[*existing.get()], &file) {
                            return Err(ReflectionError::ConflictingFile(existing.key().clone()));
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(files.len());
                        files.push(file);
                    }
                }
            }
        }

        let index = DescriptorIndex::new(files)?;
        info!(
            files = index.file_count(),
            symbols = index.symbol_count(),
            services = index.services().len(),
            "reflection index ready"
        );

        Ok(Arc::new(ReflectionState {
            dispatcher: Dispatcher::new(Arc::new(index)),
            shutdown: self.shutdown,
        }))
    }

    pub fn build_v1(
        self,
    ) -> Result<v1::server_reflection_server::ServerReflectionServer<ServerReflectionV1>, ReflectionError>
    {
        Ok(ServerReflectionV1::new(self.build()?).into_server())
    }

    pub fn build_v1alpha(
        self,
    ) -> Result<
        v1alpha::server_reflection_server::ServerReflectionServer<ServerReflectionV1Alpha>,
        ReflectionError,
    > {
        Ok(ServerReflectionV1Alpha::new(self.build()?).into_server())
    }
}

/// Equal up to `source_code_info`, which only carries comments and spans.
fn same_definition(a: &FileDescriptorProto, b: &FileDescriptorProto) -> bool {
    let strip = |file: &FileDescriptorProto| FileDescriptorProto {
        source_code_info: None,
        ..file.clone()
    };
    a == b || strip(a) == strip(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Query;
    use crate::response::Reply;
    use prost::Message;
    use prost_types::{ServiceDescriptorProto, SourceCodeInfo};

    fn file(name: &str, package: &str, service: Option<&str>) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some(package.to_string()),
            service: service
                .map(|s| ServiceDescriptorProto {
                    name: Some(s.to_string()),
                    ..Default::default()
                })
                .into_iter()
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_reflection_service_describes_itself_by_default() {
        let state = ReflectionBuilder::configure().build().unwrap();

        assert_eq!(
            state.index().services(),
            [
                "grpc.reflection.v1.ServerReflection",
                "grpc.reflection.v1alpha.ServerReflection",
            ]
        );
        assert!(state
            .index()
            .file_containing_symbol("grpc.reflection.v1.ServerReflectionRequest")
            .is_some());
    }

    #[test]
    fn test_reflection_service_can_be_hidden() {
        let state = ReflectionBuilder::configure()
            .include_reflection_service(false)
            .register_file_descriptors(vec![file("svc.proto", "demo", Some("Echo"))])
            .build()
            .unwrap();

        assert_eq!(state.index().services(), ["demo.Echo"]);
    }

    #[test]
    fn test_identical_files_from_several_sources_are_merged() {
        let shared = file("common.proto", "common", None);
        let set = FileDescriptorSet {
            file: vec![shared.clone(), file("a.proto", "a", Some("A"))],
        };
        let encoded = FileDescriptorSet {
            file: vec![shared, file("b.proto", "b", Some("B"))],
        }
        .encode_to_vec();

        let state = ReflectionBuilder::configure()
            .include_reflection_service(false)
            .register_file_descriptor_set(set)
            .register_encoded_file_descriptor_set(&encoded)
            .build()
            .unwrap();

        assert_eq!(state.index().file_count(), 3);
        assert_eq!(state.index().services(), ["a.A", "b.B"]);
    }

    #[test]
    fn test_conflicting_copies_are_rejected() {
        let err = ReflectionBuilder::configure()
            .include_reflection_service(false)
            .register_file_descriptors(vec![file("x.proto", "one", None)])
            .register_file_descriptors(vec![file("x.proto", "two", None)])
            .build()
            .err()
            .expect("conflicting files must fail");

        assert!(matches!(err, ReflectionError::ConflictingFile(name) if name == "x.proto"));
    }

    #[test]
    fn test_copies_differing_only_in_source_info_are_merged() {
        let mut reflection_proto =
            FileDescriptorSet::decode(v1::FILE_DESCRIPTOR_SET).unwrap().file;
        for file in &mut reflection_proto {
            file.source_code_info = match file.source_code_info {
                Some(_) => None,
                None => Some(SourceCodeInfo::default()),
            };
        }
        let user_copy_name = reflection_proto[0].name().to_string();

        let state = ReflectionBuilder::configure()
            .register_file_descriptors(reflection_proto)
            .build()
            .expect("the user copy of the reflection proto must not conflict");

        assert!(state.index().file_by_name(&user_copy_name).is_some());
        assert_eq!(
            state.index().services(),
            [
                "grpc.reflection.v1.ServerReflection",
                "grpc.reflection.v1alpha.ServerReflection",
            ]
        );
    }

    #[test]
    fn test_same_definition_ignores_only_source_info() {
        let plain = file("a.proto", "a", Some("A"));
        let with_info = FileDescriptorProto {
            source_code_info: Some(SourceCodeInfo::default()),
            ..plain.clone()
        };

        assert!(same_definition(&plain, &with_info));
        assert!(!same_definition(&plain, &file("a.proto", "a", Some("B"))));
    }

    struct FailingSource;

    impl DescriptorSource for FailingSource {
        fn source_name(&self) -> String {
            "schema compiler".to_string()
        }

        fn file_descriptors(&self) -> Result<Vec<FileDescriptorProto>, ReflectionError> {
            Err(ReflectionError::Source("schema compiler exited with 1".to_string()))
        }
    }

    #[test]
    fn test_failing_source_aborts_build() {
        let err = ReflectionBuilder::configure()
            .register_file_descriptors(vec![file("a.proto", "a", None)])
            .register_source(FailingSource)
            .build()
            .err()
            .expect("a failing source must fail the build");

        assert!(matches!(err, ReflectionError::Source(ref msg) if msg.contains("exited with 1")));
        assert_eq!(
            err.to_string(),
            "descriptor source failed: schema compiler exited with 1"
        );
    }

    #[test]
    fn test_malformed_set_fails_at_build() {
        let mut broken = file("a.proto", "a", None);
        broken.dependency.push("gone.proto".to_string());

        let err = ReflectionBuilder::configure()
            .register_file_descriptors(vec![broken])
            .build()
            .err()
            .expect("unresolved dependency must fail");

        assert!(matches!(err, ReflectionError::Index(_)));
    }

    #[test]
    fn test_built_state_answers_queries() {
        let state = ReflectionBuilder::configure()
            .include_reflection_service(false)
            .register_file_descriptors(vec![file("svc.proto", "demo", Some("Echo"))])
            .build()
            .unwrap();

        let reply = state
            .dispatcher()
            .resolve(&Query::FileContainingSymbol(".demo.Echo".to_string()));

        let Reply::FileDescriptors(encoded) = reply else {
            panic!("expected descriptors");
        };
        let decoded = FileDescriptorProto::decode(encoded[0].as_slice()).unwrap();
        assert_eq!(decoded, file("svc.proto", "demo", Some("Echo")));
    }
}
