//! # MediaBrowser Provider
//!
//! Implements `MediaService` for Emby/MediaBrowser compatible servers.
//!
//! ## Overview
//!
//! This module provides:
//! - Stream negotiation through `POST /Items/{id}/PlaybackInfo`
//! - Session telemetry (`/Sessions/Playing`, `/Progress`, `/Stopped`)
//! - External subtitles as JSON track events
//! - Bitrate measurement through `/Playback/BitrateTest`

pub mod connector;
pub mod error;
pub mod types;

pub use connector::MediaBrowserConnector;
pub use error::{MediaBrowserError, Result};
