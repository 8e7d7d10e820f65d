use std::path::Path;
use std::sync::Arc;

use grpc_hub::GrpcInstaller;
use reflection_grpc_stubs::{SERVICE_NAME_V1, SERVICE_NAME_V1ALPHA};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::builder::{ReflectionBuilder, ReflectionState};
use crate::config::ServerReflectionConfig;
use crate::error::ReflectionError;
use crate::service::{ServerReflectionV1, ServerReflectionV1Alpha};
use crate::source::DescriptorSetFile;

/// The reflection endpoint as hosted by the gRPC hub.
///
/// The index is built in [`ServerReflectionModule::init`], before any installer is
/// handed out, so no stream can observe a partially loaded descriptor set.
pub struct ServerReflectionModule {
    config: ServerReflectionConfig,
    state: Arc<ReflectionState>,
}

impl ServerReflectionModule {
    /// Load every configured descriptor set and build the index.
    pub fn init(
        config: ServerReflectionConfig,
        base_dir: &Path,
        shutdown: CancellationToken,
    ) -> Result<Self, ReflectionError> {
        let mut builder = ReflectionBuilder::configure()
            .include_reflection_service(config.include_reflection_service)
            .with_shutdown(shutdown);

        for path in config.resolved_descriptor_sets(base_dir) {
            info!(path = %path.display(), "registering descriptor set");
            builder = builder.register_source(DescriptorSetFile::new(path));
        }

        let state = builder.build()?;
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &Arc<ReflectionState> {
        &self.state
    }

    /// Installers for the reflection services this module exports.
    pub fn grpc_services(&self) -> Vec<GrpcInstaller> {
        let v1 = ServerReflectionV1::new(Arc::clone(&self.state)).into_server();
        let mut installers = vec![GrpcInstaller {
            service_name: SERVICE_NAME_V1,
            register: Box::new(move |routes| {
                routes.add_service(v1.clone());
            }),
        }];

        if self.config.enable_v1alpha {
            let v1alpha = ServerReflectionV1Alpha::new(Arc::clone(&self.state)).into_server();
            installers.push(GrpcInstaller {
                service_name: SERVICE_NAME_V1ALPHA,
                register: Box::new(move |routes| {
                    routes.add_service(v1alpha.clone());
                }),
            });
        }

        installers
    }
}
