use anyhow::{anyhow, Result};
use ::config::{Config, ConfigError, Environment};
use edge_relay::{
    ClassifierSettings, ClassifierStrategy, EdgeRelayConfig, GateThresholds, RelaySettings,
};
use field_devices::{AlarmListenerConfig, CameraFeedConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Edge relay configuration
    /// Region this edge node publishes for
    #[serde(default = "default_region")]
    pub region: String,

    /// Areas to subscribe (comma-separated)
    #[serde(default = "default_areas")]
    pub areas: String,

    /// Width every frame is resized to before scoring
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,

    /// Height every frame is resized to before scoring
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,

    /// JPEG quality of forwarded frames (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Frames handled concurrently
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Upper bound on one classification in milliseconds
    #[serde(default = "default_classify_timeout_ms")]
    pub classify_timeout_ms: u64,

    // Classifier configuration
    /// Scoring strategy: heuristic or remote
    #[serde(default = "default_classifier_strategy")]
    pub classifier_strategy: String,

    #[serde(default = "default_heuristic_smoke_threshold")]
    pub heuristic_smoke_threshold: f64,

    #[serde(default = "default_heuristic_fire_threshold")]
    pub heuristic_fire_threshold: f64,

    /// Disable to gate heuristic scores on fire alone
    #[serde(default = "default_heuristic_smoke_gate_enabled")]
    pub heuristic_smoke_gate_enabled: bool,

    /// Base URL of the inference service
    #[serde(default = "default_remote_url")]
    pub remote_url: String,

    #[serde(default = "default_remote_fire_threshold")]
    pub remote_fire_threshold: f64,

    /// HTTP timeout for the inference service in milliseconds
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,

    // Camera feed configuration
    /// Run a simulated camera in this process
    #[serde(default)]
    pub camera_enabled: bool,

    /// Area the simulated camera publishes for
    #[serde(default = "default_camera_area")]
    pub camera_area: String,

    /// Directory of .jpg/.jpeg/.png frames to replay
    #[serde(default = "default_camera_frames_dir")]
    pub camera_frames_dir: String,

    #[serde(default = "default_camera_fps")]
    pub camera_fps: u32,

    // Alarm listener configuration
    /// Run an alarm listener in this process
    #[serde(default)]
    pub alarm_enabled: bool,

    /// Areas to listen for alerts on (comma-separated, defaults to `areas`)
    #[serde(default)]
    pub alarm_areas: String,

    /// Append-only JSON Lines trace log
    #[serde(default = "default_alarm_trace_log")]
    pub alarm_trace_log: String,

    // OpenTelemetry configuration
    /// Enable OpenTelemetry export
    #[serde(default)]
    pub otel_enabled: bool,

    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_region() -> String {
    "region1".to_string()
}

fn default_areas() -> String {
    "areaA".to_string()
}

fn default_frame_width() -> u32 {
    320
}

fn default_frame_height() -> u32 {
    240
}

fn default_jpeg_quality() -> u8 {
    95
}

fn default_max_in_flight() -> usize {
    64
}

fn default_classify_timeout_ms() -> u64 {
    2000
}

fn default_classifier_strategy() -> String {
    "heuristic".to_string()
}

fn default_heuristic_smoke_threshold() -> f64 {
    0.014
}

fn default_heuristic_fire_threshold() -> f64 {
    0.00001
}

fn default_heuristic_smoke_gate_enabled() -> bool {
    true
}

fn default_remote_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_remote_fire_threshold() -> f64 {
    0.5
}

fn default_remote_timeout_ms() -> u64 {
    1500
}

fn default_camera_area() -> String {
    "areaA".to_string()
}

fn default_camera_frames_dir() -> String {
    "frames".to_string()
}

fn default_camera_fps() -> u32 {
    1
}

fn default_alarm_trace_log() -> String {
    "alarm_traces.jsonl".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "ember-all-in-one".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("EMBER"))
            .build()?
            .try_deserialize()
    }

    pub fn area_list(&self) -> Vec<String> {
        split_list(&self.areas)
    }

    pub fn alarm_area_list(&self) -> Vec<String> {
        let areas = split_list(&self.alarm_areas);
        if areas.is_empty() {
            self.area_list()
        } else {
            areas
        }
    }

    pub fn strategy(&self) -> Result<ClassifierStrategy> {
        self.classifier_strategy
            .parse()
            .map_err(|e: String| anyhow!(e))
    }

    pub fn gate_thresholds(&self) -> Result<GateThresholds> {
        Ok(match self.strategy()? {
            ClassifierStrategy::Heuristic => GateThresholds {
                smoke: self
                    .heuristic_smoke_gate_enabled
                    .then_some(self.heuristic_smoke_threshold),
                fire: Some(self.heuristic_fire_threshold),
            },
            ClassifierStrategy::Remote => GateThresholds {
                smoke: None,
                fire: Some(self.remote_fire_threshold),
            },
        })
    }

    pub fn edge_relay_config(&self) -> Result<EdgeRelayConfig> {
        Ok(EdgeRelayConfig {
            relay: RelaySettings {
                region: self.region.clone(),
                frame_width: self.frame_width,
                frame_height: self.frame_height,
                jpeg_quality: self.jpeg_quality,
                classify_timeout: Duration::from_millis(self.classify_timeout_ms),
            },
            areas: self.area_list(),
            max_in_flight: self.max_in_flight,
            classifier: ClassifierSettings {
                strategy: self.strategy()?,
                remote_url: self.remote_url.clone(),
                remote_timeout: Duration::from_millis(self.remote_timeout_ms),
                jpeg_quality: self.jpeg_quality,
            },
            thresholds: self.gate_thresholds()?,
        })
    }

    pub fn camera_feed_config(&self) -> Option<CameraFeedConfig> {
        self.camera_enabled.then(|| CameraFeedConfig {
            area: self.camera_area.clone(),
            frames_dir: PathBuf::from(&self.camera_frames_dir),
            fps: self.camera_fps,
        })
    }

    pub fn alarm_listener_config(&self) -> Option<AlarmListenerConfig> {
        self.alarm_enabled.then(|| AlarmListenerConfig {
            areas: self.alarm_area_list(),
            trace_log: PathBuf::from(&self.alarm_trace_log),
            max_in_flight: self.max_in_flight,
        })
    }
}

/// Split a comma-separated list, dropping blanks
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
