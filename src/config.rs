//! Render manager configuration.
//!
//! `RenderConfig` controls how the [`RenderManager`](crate::manager::RenderManager)
//! builds the scenes of new render units and how large the buffers of the
//! async event bridges are.
//!
//! `RenderConfig` provides sensible defaults via [`Default`] and a fluent
//! [`RenderConfig::builder()`] for customization with validation.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use unit_render::config::RenderConfig;
//! let cfg = RenderConfig::default();
//! assert_eq!(cfg.default_scene_size.width, 100);
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use unit_render::config::RenderConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = RenderConfig::builder()
//!     .scene_namespace("__sheet_scene__")
//!     .default_scene_size(800, 600)
//!     .event_channel_capacity(128)
//!     .build()?;
//! # Ok(()) }
//! ```
//!
//! # Errors
//!
//! Builder validation can return [`RenderConfigError`] if values are invalid
//! (an empty namespace, a zero-sized scene or a zero channel capacity).

use crate::render::SceneSize;
use serde::{Deserialize, Serialize};
use std::fmt;

const DEFAULT_SCENE_NAMESPACE: &str = "__render_scene__";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Prefix of every scene key. The scene key of a unit is this prefix followed by the unit id.
    pub scene_namespace: String,
    /// Logical canvas size given to every new scene
    pub default_scene_size: SceneSize,
    /// Buffer size of the async event receivers
    pub event_channel_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scene_namespace: DEFAULT_SCENE_NAMESPACE.to_string(),
            default_scene_size: SceneSize { width: 100, height: 100 },
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl RenderConfig {
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder::default()
    }

    /// Reads a config from JSON. Missing fields fall back to their defaults.
    pub fn from_json(json: &str) -> Result<RenderConfig, RenderConfigError> {
        let cfg: RenderConfig =
            serde_json::from_str(json).map_err(|e| RenderConfigError::Parse(e.to_string()))?;
        validate(&cfg)?;
        Ok(cfg)
    }

    /// Key of the scene that belongs to the given unit
    pub fn scene_key(&self, unit_id: &str) -> String {
        format!("{}{}", self.scene_namespace, unit_id)
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug, Clone, Default)]
pub struct RenderConfigBuilder {
    inner: RenderConfig,
}

impl RenderConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut RenderConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn scene_namespace<S: Into<String>>(self, ns: S) -> Self { self.map(|c| c.scene_namespace = ns.into()) }
    pub fn default_scene_size(self, width: u32, height: u32) -> Self { self.map(|c| c.default_scene_size = SceneSize { width, height }) }
    pub fn event_channel_capacity(self, n: usize) -> Self { self.map(|c| c.event_channel_capacity = n) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut RenderConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<RenderConfig, RenderConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq)]
pub enum RenderConfigError {
    EmptyNamespace,
    ZeroSceneSize { width: u32, height: u32 },
    ZeroChannelCapacity,
    Parse(String),
}

impl fmt::Display for RenderConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderConfigError::EmptyNamespace =>
                write!(f, "scene_namespace must not be empty"),
            RenderConfigError::ZeroSceneSize { width, height } =>
                write!(f, "default_scene_size {width}x{height} has a zero dimension"),
            RenderConfigError::ZeroChannelCapacity =>
                write!(f, "event_channel_capacity must be at least 1"),
            RenderConfigError::Parse(msg) =>
                write!(f, "cannot parse config: {msg}"),
        }
    }
}
impl std::error::Error for RenderConfigError {}

fn validate(c: &RenderConfig) -> Result<(), RenderConfigError> {
    if c.scene_namespace.is_empty() {
        return Err(RenderConfigError::EmptyNamespace);
    }
    if c.default_scene_size.width == 0 || c.default_scene_size.height == 0 {
        return Err(RenderConfigError::ZeroSceneSize {
            width: c.default_scene_size.width,
            height: c.default_scene_size.height,
        });
    }
    if c.event_channel_capacity == 0 {
        return Err(RenderConfigError::ZeroChannelCapacity);
    }
    Ok(())
}
