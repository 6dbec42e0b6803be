//! Configuration loading and parsing.
//!
//! `pacer.toml` is discovered in the working directory first, then the
//! platform config dir. Unknown fields are ignored (TOML deserialization
//! tolerance) so the file can evolve ahead of older binaries, and a file
//! that fails to parse falls back to defaults rather than refusing to run a
//! workout.
//!
//! The `[runtime]` section carries the execution bounds (turn iteration
//! guard, stack depth) and the tick cadence of the headless driver;
//! `[output]` decides whether the consumer-side printer shows `system`
//! outputs.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default = "RuntimeConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "RuntimeConfig::default_max_turn_iterations")]
    pub max_turn_iterations: usize,
    #[serde(default = "RuntimeConfig::default_max_stack_depth")]
    pub max_stack_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: Self::default_tick_interval_ms(),
            max_turn_iterations: Self::default_max_turn_iterations(),
            max_stack_depth: Self::default_max_stack_depth(),
        }
    }
}

impl RuntimeConfig {
    const fn default_tick_interval_ms() -> u64 {
        250
    }
    const fn default_max_turn_iterations() -> usize {
        20
    }
    const fn default_max_stack_depth() -> usize {
        10
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Show `system` outputs in the printer. The stream always carries
    /// them; this is purely consumer-side filtering.
    #[serde(default)]
    pub show_system: bool,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Original file text, when one was read.
    pub raw: Option<String>,
    pub file: ConfigFile,
}

impl Config {
    /// Effective tick interval, clamped to a sane floor so a typo cannot
    /// spin the driver.
    pub fn effective_tick_interval_ms(&self) -> u64 {
        self.file.runtime.tick_interval_ms.max(10)
    }
}

/// Best-effort config path: prefer a local `pacer.toml`, then the platform
/// config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("pacer.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("pacer").join("pacer.toml");
    }
    PathBuf::from("pacer.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "config", path = %path.display(), "config loaded");
                Ok(Config {
                    raw: Some(content),
                    file,
                })
            }
            Err(error) => {
                // A broken file must not block a workout; fall back.
                tracing::warn!(
                    target: "config",
                    path = %path.display(),
                    %error,
                    "config parse failed; using defaults"
                );
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}
