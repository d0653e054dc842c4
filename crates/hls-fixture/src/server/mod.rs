//! The fixture HTTP server.
//!
//! Every request goes through one fallback handler that looks the path up in
//! the [`RouteRegistry`] and the [`RuleStore`] at request time, so routes and
//! rules can change while the server is running.

mod clone;
mod respond;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::FixtureServerConfig;
use crate::error::{FixtureError, Result};
use crate::loader;
use crate::model::{FixtureFile, FixtureStream};
use crate::paths;
use crate::routes::RouteRegistry;
use crate::rules::{FailRules, RedirectRules, RuleStore, SuccessRules};

/// State shared with request handlers.
#[derive(Debug)]
pub(crate) struct FixtureState {
    pub(crate) routes: RouteRegistry,
    pub(crate) rules: RuleStore,
}

struct RunningServer {
    addr: SocketAddr,
    cancel_token: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

pub struct FixtureServer {
    config: FixtureServerConfig,
    state: Arc<FixtureState>,
    running: Mutex<Option<RunningServer>>,
}

impl FixtureServer {
    /// Create a server with an empty route table.
    pub fn new(config: FixtureServerConfig) -> Self {
        let state = FixtureState {
            routes: RouteRegistry::new(config.base_dir.clone()),
            rules: RuleStore::new(),
        };
        Self {
            config,
            state: Arc::new(state),
            running: Mutex::new(None),
        }
    }

    /// Create a server and register every file under the base directory.
    pub fn load(config: FixtureServerConfig) -> Result<Self> {
        let server = Self::new(config);
        server.state.routes.register_tree()?;
        Ok(server)
    }

    pub fn config(&self) -> &FixtureServerConfig {
        &self.config
    }

    pub fn base_dir(&self) -> &Path {
        self.state.routes.base_dir()
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.state.routes
    }

    pub fn rules(&self) -> &RuleStore {
        &self.state.rules
    }

    /// Build the router serving the current route table.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(respond::serve_fixture)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Parses `<base_dir>/<stream_name>/stream.m3u8` and its playlists.
    /// Files this server already serves get their route filled in.
    pub async fn load_stream(&self, stream_name: &str) -> Result<FixtureStream> {
        let mut stream = loader::load_stream(self.base_dir(), stream_name).await?;
        self.attach_route(&mut stream.playlist_file);
        for variant in &mut stream.variants {
            self.attach_route(&mut variant.playlist_file);
            for segment in &mut variant.segments {
                self.attach_route(&mut segment.segment_file);
            }
        }
        Ok(stream)
    }

    fn attach_route(&self, file: &mut FixtureFile) {
        let route = paths::route_from_path(&file.relative_path);
        if self.state.routes.contains(&route) {
            file.route = Some(route);
        }
    }

    pub fn request_succeeds(&self, route: &str, rules: SuccessRules) -> Result<()> {
        self.state.rules.succeed(route, rules).map(|_| ())
    }

    pub fn request_redirects(&self, route: &str, rules: RedirectRules) -> Result<()> {
        self.state.rules.redirect(route, rules).map(|_| ())
    }

    pub fn request_fails(&self, route: &str, rules: FailRules) -> Result<()> {
        self.state.rules.fail(route, rules).map(|_| ())
    }

    /// Reverts `route` to serving its file verbatim.
    pub fn remove_rules(&self, route: &str) -> bool {
        self.state.rules.remove(route)
    }

    pub fn clear_rules(&self) {
        self.state.rules.clear();
    }

    /// Serves the file at `relative_path` under `new_route` as well.
    pub fn register_route(&self, relative_path: &str, new_route: &str) -> String {
        self.state.routes.register_route(relative_path, new_route)
    }

    /// Address the server is listening on, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|running| running.addr)
    }

    /// Absolute URL of `route` on the running server.
    pub fn url(&self, route: &str) -> Option<String> {
        self.local_addr()
            .map(|addr| format!("http://{addr}{}", paths::route_from_path(route)))
    }

    /// Start listening on `port` (`0` picks a free one). Resolves once the
    /// socket is bound.
    pub async fn start(&self, port: u16) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            return Err(FixtureError::server(format!(
                "fixture server is already listening on {addr}"
            )));
        }

        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, port)
            .parse()
            .map_err(|e| FixtureError::server(format!("invalid address: {e}")))?;
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        let router = self.router();
        let cancel_token = CancellationToken::new();
        let shutdown = cancel_token.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown.cancelled().await;
                    info!("Fixture server shutting down...");
                })
                .await
        });

        info!(
            "Fixture server listening on http://{} serving {}",
            addr,
            self.base_dir().display()
        );

        let mut running = self.running.lock();
        if running.is_some() {
            cancel_token.cancel();
            return Err(FixtureError::server("fixture server was started concurrently"));
        }
        *running = Some(RunningServer {
            addr,
            cancel_token,
            handle,
        });
        Ok(addr)
    }

    /// Stop the server and wait for in-flight responses to drain, up to the
    /// configured shutdown timeout.
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };
        running.cancel_token.cancel();

        let timeout = self.config.shutdown_timeout;
        let mut handle = running.handle;
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => {
                info!(addr = %running.addr, "Fixture server stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(FixtureError::server(format!("server error: {e}"))),
            Ok(Err(e)) => Err(FixtureError::server(format!("server task failed: {e}"))),
            Err(_) => {
                warn!(addr = %running.addr, ?timeout, "Fixture server did not drain in time");
                handle.abort();
                Err(FixtureError::ShutdownTimeout(timeout))
            }
        }
    }

    fn resolve_source(&self, relative_path: &str, route: Option<&str>) -> PathBuf {
        route
            .and_then(|route| self.state.routes.resolve(route))
            .unwrap_or_else(|| self.base_dir().join(relative_path))
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel_token.cancel();
        }
    }
}
