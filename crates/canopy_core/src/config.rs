//! Pipeline configuration.
//!
//! Loaded once at startup, either from TOML or from [`Default`]:
//!
//! ```toml
//! ring_depth = 3
//! backpressure_timeout_ms = 100
//! vertex_buffer_capacity = 10000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Tunables for the update/draw pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of frame snapshots in flight. Draw may lag update by `ring_depth - 1`.
    pub ring_depth: usize,
    /// Bound on a single backpressure wait, in milliseconds.
    pub backpressure_timeout_ms: u64,
    /// Vertices per GPU buffer. Multiple of 6 so quads never straddle buffers.
    pub vertex_buffer_capacity: usize,
    /// Buffers in the vertex pool before wrapping.
    pub max_vertex_buffers: usize,
    /// Update ticks per second.
    pub update_rate_hz: u32,
    /// Draw frames per second; 0 draws as fast as generations arrive.
    pub draw_rate_hz: u32,
    /// Timed tasks above this count are re-armed from "now" instead of catching up.
    pub scheduler_timed_task_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_depth: 3,
            backpressure_timeout_ms: 100,
            vertex_buffer_capacity: 10_000 - 10_000 % 6,
            max_vertex_buffers: 8,
            update_rate_hz: 1000,
            draw_rate_hz: 0,
            scheduler_timed_task_limit: 1000,
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a TOML document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML and
    /// [`ConfigError::Invalid`] on out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// See [`Self::from_toml_str`]; also [`ConfigError::Io`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_depth < 2 {
            return Err(ConfigError::Invalid {
                field: "ring_depth",
                reason: "must be at least 2",
            });
        }
        if self.backpressure_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "backpressure_timeout_ms",
                reason: "must be non-zero",
            });
        }
        if self.vertex_buffer_capacity == 0 || self.vertex_buffer_capacity % 6 != 0 {
            return Err(ConfigError::Invalid {
                field: "vertex_buffer_capacity",
                reason: "must be a non-zero multiple of 6",
            });
        }
        if self.max_vertex_buffers == 0 {
            return Err(ConfigError::Invalid {
                field: "max_vertex_buffers",
                reason: "must be non-zero",
            });
        }
        if self.update_rate_hz == 0 {
            return Err(ConfigError::Invalid {
                field: "update_rate_hz",
                reason: "must be non-zero",
            });
        }
        if self.scheduler_timed_task_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler_timed_task_limit",
                reason: "must be non-zero",
            });
        }
        Ok(())
    }

    /// Bounded wait for one backpressure attempt.
    #[must_use]
    pub fn backpressure_timeout(&self) -> Duration {
        Duration::from_millis(self.backpressure_timeout_ms)
    }

    /// Target duration of one update tick.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.update_rate_hz.max(1)))
    }

    /// Target duration of one draw frame, `None` when unlimited.
    #[must_use]
    pub fn draw_interval(&self) -> Option<Duration> {
        (self.draw_rate_hz > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(self.draw_rate_hz)))
    }
}
