//! gRPC Hub
//!
//! Builds and hosts the single tonic::Server instance for the process. Services are
//! handed to the hub as [`GrpcInstaller`]s and mounted on one shared router.

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{service::RoutesBuilder, transport::Server};

pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 50051));

/// Registers one named service on the shared router.
pub struct GrpcInstaller {
    pub service_name: &'static str,
    pub register: Box<dyn Fn(&mut RoutesBuilder) + Send + Sync>,
}

/// Hub configuration, read from `modules.grpc_hub.config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrpcHubConfig {
    /// Overrides the `server.host:server.port` listen address when set.
    #[serde(default)]
    pub listen_addr: Option<String>,
}

/// Fires once the listener is bound, carrying the actual local address.
pub struct ReadySignal(oneshot::Sender<SocketAddr>);

impl ReadySignal {
    pub fn from_sender(tx: oneshot::Sender<SocketAddr>) -> Self {
        Self(tx)
    }

    pub fn notify(self, addr: SocketAddr) {
        // Nobody waiting is fine.
        let _ = self.0.send(addr);
    }
}

/// Runtime-owned store for installers, filled once and drained by [`GrpcHub::serve`].
#[derive(Default)]
pub struct GrpcInstallerStore {
    inner: Mutex<Vec<GrpcInstaller>>,
}

impl GrpcInstallerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set installers once. Fails if installers are already non-empty.
    pub fn set(&self, installers: Vec<GrpcInstaller>) -> anyhow::Result<()> {
        let mut guard = self.inner.lock();
        if !guard.is_empty() {
            anyhow::bail!("gRPC installers already initialized");
        }
        *guard = installers;
        Ok(())
    }

    pub fn take(&self) -> Vec<GrpcInstaller> {
        std::mem::take(&mut *self.inner.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Hosts the gRPC server and the services installed into it.
pub struct GrpcHub {
    listen_addr: RwLock<SocketAddr>,
    installer_store: Arc<GrpcInstallerStore>,
}

impl Default for GrpcHub {
    fn default() -> Self {
        Self {
            listen_addr: RwLock::new(DEFAULT_LISTEN_ADDR),
            installer_store: Arc::new(GrpcInstallerStore::new()),
        }
    }
}

impl GrpcHub {
    /// Create a hub listening on `fallback` unless the config names another address.
    pub fn from_config(cfg: &GrpcHubConfig, fallback: SocketAddr) -> anyhow::Result<Self> {
        let hub = Self::default();
        let addr = match cfg.listen_addr.as_deref() {
            Some(raw) => raw
                .parse::<SocketAddr>()
                .with_context(|| format!("invalid listen_addr '{raw}'"))?,
            None => fallback,
        };
        hub.set_listen_addr(addr);
        tracing::info!(%addr, "gRPC hub listen address configured");
        Ok(hub)
    }

    /// Update the listen address (primarily used by tests/config).
    pub fn set_listen_addr(&self, addr: SocketAddr) {
        *self.listen_addr.write() = addr;
    }

    pub fn listen_addr(&self) -> SocketAddr {
        *self.listen_addr.read()
    }

    pub fn installer_store(&self) -> &Arc<GrpcInstallerStore> {
        &self.installer_store
    }

    /// Run the tonic server with the provided installers until `cancel` fires.
    pub async fn run_with_installers(
        &self,
        installers: Vec<GrpcInstaller>,
        addr: SocketAddr,
        cancel: CancellationToken,
        ready: ReadySignal,
    ) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for installer in &installers {
            if !seen.insert(installer.service_name) {
                anyhow::bail!(
                    "Duplicate gRPC service detected: {}",
                    installer.service_name
                );
            }
        }

        if installers.is_empty() {
            tracing::warn!("no gRPC services registered; hub idles until shutdown");
            ready.notify(addr);
            cancel.cancelled().await;
            return Ok(());
        }

        let mut routes_builder = RoutesBuilder::default();
        for installer in installers {
            tracing::debug!(service = installer.service_name, "installing gRPC service");
            (installer.register)(&mut routes_builder);
        }
        let routes = routes_builder.routes();

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind gRPC listener on {addr}"))?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "gRPC hub listening");
        ready.notify(local_addr);

        Server::builder()
            .add_routes(routes)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                cancel.cancelled().await;
            })
            .await
            .context("gRPC server terminated with an error")?;

        tracing::info!("gRPC hub stopped");
        Ok(())
    }

    /// Drain the installer store and serve on the configured address.
    pub async fn serve(
        self: Arc<Self>,
        cancel: CancellationToken,
        ready: ReadySignal,
    ) -> anyhow::Result<()> {
        let installers = self.installer_store.take();
        let addr = self.listen_addr();
        self.run_with_installers(installers, addr, cancel, ready).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response};
    use std::{
        convert::Infallible,
        future,
        task::{Context as TaskContext, Poll},
    };
    use tokio::time::{sleep, Duration};
    use tonic::{body::Body, server::NamedService};
    use tower::Service;

    const SERVICE_A: &str = "grpc_hub.test.ServiceA";
    const SERVICE_B: &str = "grpc_hub.test.ServiceB";

    #[derive(Clone)]
    struct ServiceAImpl;

    #[derive(Clone)]
    struct ServiceBImpl;

    impl NamedService for ServiceAImpl {
        const NAME: &'static str = SERVICE_A;
    }

    impl NamedService for ServiceBImpl {
        const NAME: &'static str = SERVICE_B;
    }

    impl Service<Request<Body>> for ServiceAImpl {
        type Response = Response<Body>;
        type Error = Infallible;
        type Future = future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            future::ready(Ok(Response::new(Body::empty())))
        }
    }

    impl Service<Request<Body>> for ServiceBImpl {
        type Response = Response<Body>;
        type Error = Infallible;
        type Future = future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            future::ready(Ok(Response::new(Body::empty())))
        }
    }

    fn installer_a() -> GrpcInstaller {
        GrpcInstaller {
            service_name: SERVICE_A,
            register: Box::new(|routes| {
                routes.add_service(ServiceAImpl);
            }),
        }
    }

    fn installer_b() -> GrpcInstaller {
        GrpcInstaller {
            service_name: SERVICE_B,
            register: Box::new(|routes| {
                routes.add_service(ServiceBImpl);
            }),
        }
    }

    fn local_any() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_run_with_installers_rejects_duplicates() {
        let hub = GrpcHub::default();
        let cancel = CancellationToken::new();
        let (tx, _rx) = oneshot::channel();

        let result = hub
            .run_with_installers(
                vec![installer_a(), installer_a()],
                local_any(),
                cancel,
                ReadySignal::from_sender(tx),
            )
            .await;

        assert!(result.is_err(), "duplicate services should error");
    }

    #[tokio::test]
    async fn test_run_with_installers_starts_server() {
        let hub = Arc::new(GrpcHub::default());
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let hub_task = {
            let hub = hub.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                hub.run_with_installers(
                    vec![installer_a(), installer_b()],
                    local_any(),
                    cancel,
                    ReadySignal::from_sender(tx),
                )
                .await
            })
        };

        let bound = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("ready signal should fire")
            .expect("ready channel should complete");
        assert_ne!(bound.port(), 0, "ready signal reports the bound port");

        tokio::net::TcpStream::connect(bound)
            .await
            .expect("hub should accept connections");

        cancel.cancel();

        hub_task
            .await
            .expect("task should join successfully")
            .expect("server should exit cleanly");
    }

    #[tokio::test]
    async fn test_serve_drains_installer_store() {
        let hub = Arc::new(GrpcHub::default());
        hub.set_listen_addr(local_any());
        hub.installer_store()
            .set(vec![installer_a()])
            .expect("store should accept installers");
        assert!(hub.installer_store().set(vec![installer_b()]).is_err());

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let (tx, rx) = oneshot::channel();

        let serve_task = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.serve(cancel, ReadySignal::from_sender(tx)).await })
        };

        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("ready signal should fire")
            .expect("ready signal should complete");

        serve_task
            .await
            .expect("task should join")
            .expect("serve should complete without error");

        assert!(
            hub.installer_store().is_empty(),
            "installers should be consumed after serve completes"
        );
    }

    #[tokio::test]
    async fn test_empty_hub_idles_until_cancelled() {
        let hub = GrpcHub::default();
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        cancel.cancel();

        hub.run_with_installers(Vec::new(), local_any(), cancel, ReadySignal::from_sender(tx))
            .await
            .expect("empty hub should exit cleanly");

        assert!(rx.await.is_ok());
    }

    #[test]
    fn test_from_config_parses_listen_addr() {
        let cfg: GrpcHubConfig =
            serde_json::from_value(serde_json::json!({ "listen_addr": "127.0.0.1:10" })).unwrap();

        let hub = GrpcHub::from_config(&cfg, local_any()).expect("config should parse");
        assert_eq!(hub.listen_addr(), "127.0.0.1:10".parse().unwrap());

        let hub = GrpcHub::from_config(&GrpcHubConfig::default(), local_any()).unwrap();
        assert_eq!(hub.listen_addr(), local_any());
    }

    #[test]
    fn test_from_config_rejects_bad_addr() {
        let cfg = GrpcHubConfig {
            listen_addr: Some("not-an-addr".to_string()),
        };
        assert!(GrpcHub::from_config(&cfg, local_any()).is_err());
    }
}
