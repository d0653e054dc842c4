//! Route → file table.
//!
//! Startup happens in two phases: [`discover_files`] enumerates what should
//! be served and [`RouteRegistry::register_all`] binds it. Clone operations
//! add aliases later through [`RouteRegistry::register_route`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{FixtureError, Result};
use crate::paths::{self, route_from_path};

/// A file found under the base directory and the route it will be served at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub route: String,
    pub path: PathBuf,
}

/// Lists every regular file below `base_dir`, routed by its forward-slash
/// path relative to `base_dir`.
pub fn discover_files(base_dir: &Path) -> Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(base_dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .unwrap_or(base_dir)
                .display()
                .to_string();
            match e.into_io_error() {
                Some(source) => FixtureError::file_read(path, source),
                None => FixtureError::server(format!("failed to walk `{path}`")),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = paths::relative_to(base_dir, entry.path()) else {
            warn!(
                path = %entry.path().display(),
                "Skipping fixture file whose path is not valid UTF-8"
            );
            continue;
        };
        files.push(DiscoveredFile {
            route: route_from_path(&relative),
            path: entry.into_path(),
        });
    }
    Ok(files)
}

#[derive(Debug)]
pub struct RouteRegistry {
    base_dir: PathBuf,
    routes: RwLock<HashMap<String, PathBuf>>,
}

impl RouteRegistry {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            routes: RwLock::new(HashMap::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Discovers and registers every file under the base directory.
    pub fn register_tree(&self) -> Result<usize> {
        let files = discover_files(&self.base_dir)?;
        let count = files.len();
        self.register_all(files);
        info!(
            base_dir = %self.base_dir.display(),
            routes = count,
            "Registered fixture files"
        );
        Ok(count)
    }

    pub fn register_all(&self, files: impl IntoIterator<Item = DiscoveredFile>) {
        let mut routes = self.routes.write();
        for file in files {
            debug!(route = %file.route, path = %file.path.display(), "Adding route");
            routes.insert(file.route, file.path);
        }
    }

    /// Serves the file at `relative_path` under the additional route
    /// `new_route`. The file's existing routes stay in place.
    pub fn register_route(&self, relative_path: &str, new_route: &str) -> String {
        self.register_file(new_route, self.absolute_path(relative_path))
    }

    /// Serves `path` at `route`, replacing whatever the route pointed at.
    pub fn register_file(&self, route: &str, path: impl Into<PathBuf>) -> String {
        let path = path.into();
        let route = route_from_path(route);
        debug!(route = %route, path = %path.display(), "Adding alias route");
        self.routes.write().insert(route.clone(), path);
        route
    }

    pub fn unregister(&self, route: &str) -> Option<PathBuf> {
        self.routes.write().remove(&route_from_path(route))
    }

    /// File served at `route`, if any.
    pub fn resolve(&self, route: &str) -> Option<PathBuf> {
        self.routes.read().get(route).cloned()
    }

    pub fn contains(&self, route: &str) -> bool {
        self.routes.read().contains_key(route)
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Registered routes, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.routes.read().keys().cloned().collect();
        routes.sort();
        routes
    }

    fn absolute_path(&self, relative_path: &str) -> PathBuf {
        let relative = relative_path.replace('\\', "/");
        self.base_dir.join(relative.trim_start_matches('/'))
    }
}
