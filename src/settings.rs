use std::{
    path::Path,
    time::Duration
};

use serde::{
    Deserialize,
    Serialize
};

use crate::{
    ui::{
        math::{
            Rect2F,
            Vector2F
        },
        touch::TouchSettings
    },
    DEFAULT_SERVER_ADDRESS
};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IoError, reason='{0}'")]
    IoError(#[from] std::io::Error),

    #[error("JsonError, reason='{0}'")]
    JsonError(#[from] serde_json::Error),
}

/// Engine configuration. Every key is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Part of the world this process shows, a.k.a. local rect.
    #[serde(alias = "local_rect")]
    pub src_rect: Rect2F,
    /// Output viewport.
    pub dst_rect: Rect2F,
    pub world_dimensions: Vector2F,
    /// Seconds without touch before the engine idles.
    pub idle_time: f64,
    pub min_touch_distance: f32,
    pub min_tap_distance: f32,
    pub swipe_queue_size: usize,
    pub double_tap_time: f64,
    pub swipe_min_velocity: f32,
    pub frame_rate: f32,
    pub server_address: String,
    pub client_addresses: Vec<String>,
    /// Seconds between unsolicited full world sends.
    pub world_resync_interval: Option<f64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            src_rect: Rect2F::new(0.0, 0.0, 640.0, 400.0),
            dst_rect: Rect2F::new(0.0, 0.0, 640.0, 400.0),
            world_dimensions: Vector2F::new(640.0, 400.0),
            idle_time: 300.0,
            min_touch_distance: 10.0,
            min_tap_distance: 10.0,
            swipe_queue_size: 4,
            double_tap_time: 0.1,
            swipe_min_velocity: 800.0,
            frame_rate: 60.0,
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            client_addresses: vec![],
            world_resync_interval: None,
        }
    }
}

impl EngineSettings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_json_str(&content)?;
        log::info!("Loaded settings from {:?}", path.as_ref());
        Ok(settings)
    }

    pub fn from_json_str(content: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn frame_duration(&self) -> Duration {
        if self.frame_rate > 0.0 {
            Duration::from_secs_f64(1.0 / f64::from(self.frame_rate))
        } else {
            log::warn!("Invalid frame rate {}, using 60", self.frame_rate);
            Duration::from_secs_f64(1.0 / 60.0)
        }
    }

    pub fn touch_settings(&self) -> TouchSettings {
        TouchSettings {
            min_touch_distance: self.min_touch_distance,
            min_tap_distance: self.min_tap_distance,
            swipe_queue_size: self.swipe_queue_size,
            double_tap_time: self.double_tap_time,
            swipe_min_velocity: self.swipe_min_velocity,
        }
    }
}
