//! # Host Bridge Traits
//!
//! Capability traits the playback core requires from its host.
//!
//! ## Overview
//!
//! The session controller in `core-playback` never talks to a decoder, a
//! socket or a platform logger directly. Each of those is a trait defined
//! here and implemented per host (desktop, Android TV, Fire TV, iOS).
//!
//! ## Traits
//!
//! - [`PlayerSurface`](surface::PlayerSurface) - The native decoder/renderer
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by media service providers
//! - [`LoggerSink`](logging::LoggerSink) - Mirror structured logs into host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ HttpClient |
//! | Android  | TBD                 | 📋 Planned |
//! | iOS      | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Adapters should
//! convert platform errors and keep messages actionable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; the session actor and its spawned
//! workers share implementations through `Arc`.

pub mod error;
pub mod http;
pub mod logging;
pub mod surface;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use surface::{PlayerSurface, SurfaceEvent, SurfaceEventSender, SurfaceTrack, TrackKind};
