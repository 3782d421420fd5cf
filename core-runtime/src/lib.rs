//! # Core Runtime Module
//!
//! Ambient runtime infrastructure for the playback core:
//! - Logging and tracing initialisation
//! - Playback tuning configuration
//! - Session event bus
//!
//! ## Overview
//!
//! Nothing in this crate knows about streams or decoders. It establishes the
//! logging conventions, the tunable constants (report interval, thresholds,
//! bitrate defaults) and the broadcast channel that `core-playback` publishes
//! session events on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{PlaybackConfig, PlaybackConfigBuilder, SegmentedSubtitlePolicy};
pub use error::{Error, Result};
pub use events::{EventBus, EventSeverity, EventStream, SessionEvent};
