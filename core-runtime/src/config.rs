//! # Playback Configuration
//!
//! Tunable constants for the playback session controller.
//!
//! ## Overview
//!
//! Every value has a default matching the behaviour hosts expect out of the
//! box (3 s progress reports, 800 ms skip debounce, 730 px direct-play width
//! ceiling, ...). Hosts override what they need through one of three paths:
//!
//! - [`PlaybackConfig::builder()`] in code
//! - [`PlaybackConfig::from_json_str()`] for a bundled settings file
//! - [`PlaybackConfig::from_env()`] for `MEDIAPLAY_*` variables
//!
//! All three run [`PlaybackConfig::validate()`] before handing out a config.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::PlaybackConfig;
//!
//! let config = PlaybackConfig::builder()
//!     .max_bitrate_mbps(8.0)
//!     .report_interval_ms(5_000)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable prefix read by [`PlaybackConfig::from_env`].
pub const ENV_PREFIX: &str = "MEDIAPLAY_";

/// What to do when the server offers a subtitle as segmented text (delivered
/// alongside HLS segments).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentedSubtitlePolicy {
    /// Warn the user and keep the current selection.
    #[default]
    Unsupported,
    /// Fetch the track through the external subtitle endpoint instead.
    TreatAsExternal,
}

impl FromStr for SegmentedSubtitlePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unsupported" => Ok(Self::Unsupported),
            "treat_as_external" | "external" => Ok(Self::TreatAsExternal),
            other => Err(Error::InvalidValue {
                key: "segmented_subtitle_policy".to_string(),
                message: format!("unknown policy '{}'", other),
            }),
        }
    }
}

/// Playback session tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Interval between progress reports while playing.
    pub report_interval_ms: u64,

    /// Quiet period after the last skip before the accumulated seek is issued.
    pub skip_quiet_period_ms: u64,

    /// Delay after halting the surface before the stop report is sent.
    pub stop_grace_ms: u64,

    /// Items at or below this runtime never trigger the next-item threshold.
    pub threshold_min_runtime_ms: u64,

    /// Items above this runtime use the long offset.
    pub threshold_long_runtime_ms: u64,

    /// Offset from the end for items between the two break points.
    pub threshold_short_offset_ms: u64,

    /// Offset from the end for items above the long break point.
    pub threshold_long_offset_ms: u64,

    /// Video width above which direct play is refused on regular devices.
    pub max_direct_width: u32,

    /// Video width ceiling on constrained devices.
    pub constrained_max_width: u32,

    /// Whether the lightweight direct-play profile may be used at all.
    pub prefer_direct_profile: bool,

    /// Maximum streaming bitrate in Mbps; `0` selects auto detection.
    pub max_bitrate_mbps: f64,

    /// Bitrate used when auto detection is unavailable or fails.
    pub fallback_bitrate_bps: u64,

    /// Network buffer for live channels.
    pub live_buffer_ms: u32,

    /// Network buffer for everything else.
    pub network_buffer_ms: u32,

    pub segmented_subtitle_policy: SegmentedSubtitlePolicy,

    /// Continue with the next queued item after a decoder error.
    pub advance_on_error: bool,

    /// Capacity of the session event broadcast channel.
    pub event_buffer_size: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            report_interval_ms: 3_000,
            skip_quiet_period_ms: 800,
            stop_grace_ms: 150,
            threshold_min_runtime_ms: 10 * 60 * 1_000,
            threshold_long_runtime_ms: 75 * 60 * 1_000,
            threshold_short_offset_ms: 50 * 1_000,
            threshold_long_offset_ms: 3 * 60 * 1_000,
            max_direct_width: 730,
            constrained_max_width: 730,
            prefer_direct_profile: true,
            max_bitrate_mbps: 0.0,
            fallback_bitrate_bps: 15_000_000,
            live_buffer_ms: 600,
            network_buffer_ms: 30_000,
            segmented_subtitle_policy: SegmentedSubtitlePolicy::Unsupported,
            advance_on_error: true,
            event_buffer_size: 100,
        }
    }
}

impl PlaybackConfig {
    pub fn builder() -> PlaybackConfigBuilder {
        PlaybackConfigBuilder::default()
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn skip_quiet_period(&self) -> Duration {
        Duration::from_millis(self.skip_quiet_period_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Configured bitrate ceiling in bps, `None` when auto detection applies.
    ///
    /// The preference is truncated to tenths of a Mbps before scaling.
    pub fn max_bitrate_bps(&self) -> Option<u64> {
        let tenths = (self.max_bitrate_mbps * 10.0).trunc() as u64;
        if tenths == 0 {
            None
        } else {
            Some(tenths * 100_000)
        }
    }

    /// Validates ranges and cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.report_interval_ms == 0 {
            return Err(Error::Config(
                "Report interval must be greater than 0ms".to_string(),
            ));
        }

        if self.skip_quiet_period_ms == 0 {
            return Err(Error::Config(
                "Skip quiet period must be greater than 0ms".to_string(),
            ));
        }

        if self.stop_grace_ms > 5_000 {
            return Err(Error::Config(
                "Stop grace period exceeds maximum of 5 seconds".to_string(),
            ));
        }

        if self.threshold_long_runtime_ms <= self.threshold_min_runtime_ms {
            return Err(Error::Config(
                "Long runtime break point must be above the minimum runtime break point"
                    .to_string(),
            ));
        }

        if self.threshold_short_offset_ms >= self.threshold_min_runtime_ms
            || self.threshold_long_offset_ms >= self.threshold_long_runtime_ms
        {
            return Err(Error::Config(
                "Threshold offsets must be shorter than their runtime break points".to_string(),
            ));
        }

        if self.max_direct_width == 0 || self.constrained_max_width == 0 {
            return Err(Error::Config(
                "Direct play width ceilings must be greater than 0".to_string(),
            ));
        }

        if !self.max_bitrate_mbps.is_finite() || self.max_bitrate_mbps < 0.0 {
            return Err(Error::Config(
                "Max bitrate must be a non-negative number of Mbps".to_string(),
            ));
        }

        if self.fallback_bitrate_bps == 0 {
            return Err(Error::Config(
                "Fallback bitrate must be greater than 0 bps".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid playback config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load overrides from `MEDIAPLAY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load overrides through an arbitrary key lookup. Keys are the upper-case
    /// field names prefixed with [`ENV_PREFIX`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |field: &str| lookup(&format!("{}{}", ENV_PREFIX, field.to_uppercase()));

        override_parsed(&get, "report_interval_ms", &mut config.report_interval_ms)?;
        override_parsed(&get, "skip_quiet_period_ms", &mut config.skip_quiet_period_ms)?;
        override_parsed(&get, "stop_grace_ms", &mut config.stop_grace_ms)?;
        override_parsed(
            &get,
            "threshold_min_runtime_ms",
            &mut config.threshold_min_runtime_ms,
        )?;
        override_parsed(
            &get,
            "threshold_long_runtime_ms",
            &mut config.threshold_long_runtime_ms,
        )?;
        override_parsed(
            &get,
            "threshold_short_offset_ms",
            &mut config.threshold_short_offset_ms,
        )?;
        override_parsed(
            &get,
            "threshold_long_offset_ms",
            &mut config.threshold_long_offset_ms,
        )?;
        override_parsed(&get, "max_direct_width", &mut config.max_direct_width)?;
        override_parsed(&get, "constrained_max_width", &mut config.constrained_max_width)?;
        override_parsed(&get, "prefer_direct_profile", &mut config.prefer_direct_profile)?;
        override_parsed(&get, "max_bitrate_mbps", &mut config.max_bitrate_mbps)?;
        override_parsed(&get, "fallback_bitrate_bps", &mut config.fallback_bitrate_bps)?;
        override_parsed(&get, "live_buffer_ms", &mut config.live_buffer_ms)?;
        override_parsed(&get, "network_buffer_ms", &mut config.network_buffer_ms)?;
        override_parsed(
            &get,
            "segmented_subtitle_policy",
            &mut config.segmented_subtitle_policy,
        )?;
        override_parsed(&get, "advance_on_error", &mut config.advance_on_error)?;
        override_parsed(&get, "event_buffer_size", &mut config.event_buffer_size)?;

        config.validate()?;
        Ok(config)
    }
}

fn override_parsed<T, G>(get: &G, field: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(field) {
        *slot = raw.trim().parse().map_err(|e: T::Err| Error::InvalidValue {
            key: format!("{}{}", ENV_PREFIX, field.to_uppercase()),
            message: e.to_string(),
        })?;
    }
    Ok(())
}

/// Builder for [`PlaybackConfig`].
///
/// Unset fields keep their defaults; [`build()`](PlaybackConfigBuilder::build)
/// validates the result.
#[derive(Debug, Default)]
pub struct PlaybackConfigBuilder {
    config: PlaybackConfig,
}

impl PlaybackConfigBuilder {
    pub fn report_interval_ms(mut self, ms: u64) -> Self {
        self.config.report_interval_ms = ms;
        self
    }

    pub fn skip_quiet_period_ms(mut self, ms: u64) -> Self {
        self.config.skip_quiet_period_ms = ms;
        self
    }

    pub fn stop_grace_ms(mut self, ms: u64) -> Self {
        self.config.stop_grace_ms = ms;
        self
    }

    /// Sets both runtime break points of the next-item threshold.
    pub fn threshold_break_points_ms(mut self, min_runtime: u64, long_runtime: u64) -> Self {
        self.config.threshold_min_runtime_ms = min_runtime;
        self.config.threshold_long_runtime_ms = long_runtime;
        self
    }

    /// Sets the short and long end offsets of the next-item threshold.
    pub fn threshold_offsets_ms(mut self, short_offset: u64, long_offset: u64) -> Self {
        self.config.threshold_short_offset_ms = short_offset;
        self.config.threshold_long_offset_ms = long_offset;
        self
    }

    pub fn max_direct_width(mut self, width: u32) -> Self {
        self.config.max_direct_width = width;
        self
    }

    pub fn constrained_max_width(mut self, width: u32) -> Self {
        self.config.constrained_max_width = width;
        self
    }

    pub fn prefer_direct_profile(mut self, enabled: bool) -> Self {
        self.config.prefer_direct_profile = enabled;
        self
    }

    pub fn max_bitrate_mbps(mut self, mbps: f64) -> Self {
        self.config.max_bitrate_mbps = mbps;
        self
    }

    pub fn fallback_bitrate_bps(mut self, bps: u64) -> Self {
        self.config.fallback_bitrate_bps = bps;
        self
    }

    pub fn live_buffer_ms(mut self, ms: u32) -> Self {
        self.config.live_buffer_ms = ms;
        self
    }

    pub fn network_buffer_ms(mut self, ms: u32) -> Self {
        self.config.network_buffer_ms = ms;
        self
    }

    pub fn segmented_subtitle_policy(mut self, policy: SegmentedSubtitlePolicy) -> Self {
        self.config.segmented_subtitle_policy = policy;
        self
    }

    pub fn advance_on_error(mut self, enabled: bool) -> Self {
        self.config.advance_on_error = enabled;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<PlaybackConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlaybackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.report_interval(), Duration::from_secs(3));
        assert_eq!(config.skip_quiet_period(), Duration::from_millis(800));
        assert_eq!(config.stop_grace(), Duration::from_millis(150));
        assert_eq!(config.max_direct_width, 730);
        assert!(config.prefer_direct_profile);
    }

    #[test]
    fn test_max_bitrate_conversion() {
        let auto = PlaybackConfig::default();
        assert_eq!(auto.max_bitrate_bps(), None);

        let fixed = PlaybackConfig::builder().max_bitrate_mbps(8.0).build().unwrap();
        assert_eq!(fixed.max_bitrate_bps(), Some(8_000_000));

        let fractional = PlaybackConfig::builder().max_bitrate_mbps(1.55).build().unwrap();
        assert_eq!(fractional.max_bitrate_bps(), Some(1_500_000));

        let tiny = PlaybackConfig::builder().max_bitrate_mbps(0.05).build().unwrap();
        assert_eq!(tiny.max_bitrate_bps(), None);
    }

    #[test]
    fn test_builder_overrides() {
        let config = PlaybackConfig::builder()
            .report_interval_ms(5_000)
            .skip_quiet_period_ms(500)
            .constrained_max_width(640)
            .segmented_subtitle_policy(SegmentedSubtitlePolicy::TreatAsExternal)
            .advance_on_error(false)
            .build()
            .unwrap();

        assert_eq!(config.report_interval_ms, 5_000);
        assert_eq!(config.skip_quiet_period_ms, 500);
        assert_eq!(config.constrained_max_width, 640);
        assert_eq!(
            config.segmented_subtitle_policy,
            SegmentedSubtitlePolicy::TreatAsExternal
        );
        assert!(!config.advance_on_error);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let result = PlaybackConfig::builder().report_interval_ms(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_break_points() {
        let result = PlaybackConfig::builder()
            .threshold_break_points_ms(60 * 60_000, 30 * 60_000)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_offset_longer_than_runtime() {
        let result = PlaybackConfig::builder()
            .threshold_offsets_ms(11 * 60_000, 3 * 60_000)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_negative_bitrate() {
        let result = PlaybackConfig::builder().max_bitrate_mbps(-1.0).build();
        assert!(result.is_err());

        let result = PlaybackConfig::builder().max_bitrate_mbps(f64::NAN).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_partial_document() {
        let config = PlaybackConfig::from_json_str(
            r#"{ "report_interval_ms": 10000, "segmented_subtitle_policy": "treat_as_external" }"#,
        )
        .unwrap();

        assert_eq!(config.report_interval_ms, 10_000);
        assert_eq!(
            config.segmented_subtitle_policy,
            SegmentedSubtitlePolicy::TreatAsExternal
        );
        assert_eq!(config.skip_quiet_period_ms, 800);
    }

    #[test]
    fn test_from_json_rejects_invalid_values() {
        assert!(PlaybackConfig::from_json_str(r#"{ "event_buffer_size": 0 }"#).is_err());
        assert!(PlaybackConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MEDIAPLAY_MAX_BITRATE_MBPS", "12.5"),
            ("MEDIAPLAY_PREFER_DIRECT_PROFILE", "false"),
            ("MEDIAPLAY_SEGMENTED_SUBTITLE_POLICY", "external"),
        ]
        .into_iter()
        .collect();

        let config =
            PlaybackConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.max_bitrate_bps(), Some(12_500_000));
        assert!(!config.prefer_direct_profile);
        assert_eq!(
            config.segmented_subtitle_policy,
            SegmentedSubtitlePolicy::TreatAsExternal
        );
        assert_eq!(config.report_interval_ms, 3_000);
    }

    #[test]
    fn test_from_lookup_reports_bad_key() {
        let result = PlaybackConfig::from_lookup(|key| {
            (key == "MEDIAPLAY_REPORT_INTERVAL_MS").then(|| "soon".to_string())
        });

        match result {
            Err(Error::InvalidValue { key, .. }) => {
                assert_eq!(key, "MEDIAPLAY_REPORT_INTERVAL_MS")
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = PlaybackConfig::default();
        assert_eq!(config.clone(), config);
    }
}
