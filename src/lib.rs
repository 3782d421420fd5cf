//! Workspace façade crate.
//!
//! Re-exports the playback session controller and its runtime so a host
//! application can depend on `mediaplay-workspace` alone. The `desktop-shims`
//! feature additionally pulls in the reqwest-backed `HttpClient` and the
//! MediaBrowser REST provider.

pub use bridge_traits;
pub use core_playback;
pub use core_runtime;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
#[cfg(feature = "desktop-shims")]
pub use provider_mediabrowser;
