// HLS fixture server: serves a directory of playlists and segments with
// per-route success, redirect, failure and throttling behaviors.
pub mod config;
pub mod content_type;
pub mod error;
pub mod loader;
pub mod model;
pub mod paths;
pub mod routes;
pub mod rules;
pub mod server;
pub mod throttle;

// Export common types for ease of use
pub use config::{FixtureServerConfig, RulesFile};
pub use error::{FixtureError, Result};
pub use loader::{load_media_playlist, load_stream};
pub use model::{FixtureFile, FixtureMediaPlaylist, FixtureSegment, FixtureStream};
pub use routes::{DiscoveredFile, RouteRegistry, discover_files};
pub use rules::{FailRules, RedirectRules, RouteBehavior, Rule, RuleStore, SuccessRules};
pub use server::FixtureServer;
pub use throttle::{ChunkSink, ThrottleRate, write_throttled};
