use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PunchclockConfig {
    pub camera: CameraConfig,
    pub identification: IdentificationConfig,
    pub lockout: LockoutConfig,
    pub breaks: BreakConfig,
    pub presence: PresenceConfig,
    pub session: SessionConfig,
    pub kiosk: KioskConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Capture backend ("mock" or "gstreamer")
    #[serde(default = "default_camera_backend")]
    pub backend: String,

    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Camera resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Frames discarded after opening a stream while exposure settles
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IdentificationConfig {
    /// Interval between biometric frame samples
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Ceiling after which a biometric scan is abandoned
    #[serde(default = "default_scan_timeout_seconds")]
    pub scan_timeout_seconds: u64,

    /// Maximum Euclidean distance accepted as a match
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// Minimum query length before a directory search is issued
    #[serde(default = "default_search_min_chars")]
    pub search_min_chars: usize,

    /// Maximum number of search results shown
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LockoutConfig {
    /// Failed PIN attempts that engage the lock
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u8,

    /// Lock duration in seconds
    #[serde(default = "default_lockout_seconds")]
    pub lockout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BreakConfig {
    /// Minimum break length before BreakEnd is offered
    #[serde(default = "default_minimum_break_minutes")]
    pub minimum_break_minutes: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PresenceConfig {
    /// Heartbeat interval in seconds
    #[serde(default = "default_heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Inactivity timeout used when the registry does not provide one
    #[serde(default = "default_inactivity_timeout_seconds")]
    pub default_inactivity_timeout_seconds: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KioskConfig {
    /// File holding this device's kiosk UUID
    #[serde(default = "default_identity_path")]
    pub identity_path: String,
}

impl IdentificationConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_seconds)
    }
}

impl LockoutConfig {
    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(self.lockout_seconds)
    }
}

impl BreakConfig {
    pub fn minimum_break(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.minimum_break_minutes as i64)
    }
}

impl PresenceConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }
}

impl PunchclockConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("punchclock.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.backend", default_camera_backend())?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.warmup_frames", default_warmup_frames())?
            .set_default(
                "identification.scan_interval_ms",
                default_scan_interval_ms(),
            )?
            .set_default(
                "identification.scan_timeout_seconds",
                default_scan_timeout_seconds(),
            )?
            .set_default(
                "identification.match_threshold",
                default_match_threshold() as f64,
            )?
            .set_default(
                "identification.search_min_chars",
                default_search_min_chars() as i64,
            )?
            .set_default(
                "identification.search_limit",
                default_search_limit() as i64,
            )?
            .set_default("lockout.max_attempts", default_max_attempts() as i64)?
            .set_default("lockout.lockout_seconds", default_lockout_seconds())?
            .set_default(
                "breaks.minimum_break_minutes",
                default_minimum_break_minutes(),
            )?
            .set_default(
                "presence.heartbeat_interval_seconds",
                default_heartbeat_interval_seconds(),
            )?
            .set_default(
                "session.default_inactivity_timeout_seconds",
                default_inactivity_timeout_seconds(),
            )?
            .set_default("kiosk.identity_path", default_identity_path())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with PUNCHCLOCK_ prefix
            .add_source(Environment::with_prefix("PUNCHCLOCK").separator("__"))
            .build()?;

        let config: PunchclockConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.camera.backend.as_str() {
            "mock" | "gstreamer" => {}
            other => {
                return Err(ConfigError::Message(format!(
                    "Unknown camera backend '{}'",
                    other
                )))
            }
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.identification.scan_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Biometric scan interval must be greater than 0".to_string(),
            ));
        }

        if self.identification.scan_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Biometric scan timeout must be greater than 0".to_string(),
            ));
        }

        let threshold = self.identification.match_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::Message(
                "Match threshold must be a positive distance".to_string(),
            ));
        }

        if self.identification.search_limit == 0 {
            return Err(ConfigError::Message(
                "Search limit must be greater than 0".to_string(),
            ));
        }

        if self.lockout.max_attempts == 0 {
            return Err(ConfigError::Message(
                "Lockout max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.lockout.lockout_seconds == 0 {
            return Err(ConfigError::Message(
                "Lockout duration must be greater than 0".to_string(),
            ));
        }

        if self.presence.heartbeat_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Heartbeat interval must be greater than 0".to_string(),
            ));
        }

        if self.session.default_inactivity_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Default inactivity timeout must be greater than 0".to_string(),
            ));
        }

        if self.kiosk.identity_path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Kiosk identity path must be set".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for PunchclockConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                backend: default_camera_backend(),
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                warmup_frames: default_warmup_frames(),
            },
            identification: IdentificationConfig {
                scan_interval_ms: default_scan_interval_ms(),
                scan_timeout_seconds: default_scan_timeout_seconds(),
                match_threshold: default_match_threshold(),
                search_min_chars: default_search_min_chars(),
                search_limit: default_search_limit(),
            },
            lockout: LockoutConfig {
                max_attempts: default_max_attempts(),
                lockout_seconds: default_lockout_seconds(),
            },
            breaks: BreakConfig {
                minimum_break_minutes: default_minimum_break_minutes(),
            },
            presence: PresenceConfig {
                heartbeat_interval_seconds: default_heartbeat_interval_seconds(),
            },
            session: SessionConfig {
                default_inactivity_timeout_seconds: default_inactivity_timeout_seconds(),
            },
            kiosk: KioskConfig {
                identity_path: default_identity_path(),
            },
        }
    }
}

// Default value functions
fn default_camera_backend() -> String {
    "mock".to_string()
}
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    15
}
fn default_warmup_frames() -> u32 {
    3
}

fn default_scan_interval_ms() -> u64 {
    2000
}
fn default_scan_timeout_seconds() -> u64 {
    15
}
fn default_match_threshold() -> f32 {
    0.6
}
fn default_search_min_chars() -> usize {
    1
}
fn default_search_limit() -> usize {
    20
}

fn default_max_attempts() -> u8 {
    3
}
fn default_lockout_seconds() -> u64 {
    30
}

fn default_minimum_break_minutes() -> u32 {
    30
}

fn default_heartbeat_interval_seconds() -> u64 {
    30
}

fn default_inactivity_timeout_seconds() -> u32 {
    60
}

fn default_identity_path() -> String {
    "/var/lib/punchclock/kiosk-id".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PunchclockConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.identification.scan_interval(), Duration::from_secs(2));
        assert_eq!(config.identification.scan_timeout(), Duration::from_secs(15));
        assert_eq!(config.lockout.max_attempts, 3);
        assert_eq!(config.lockout.lockout_duration(), Duration::from_secs(30));
        assert_eq!(config.breaks.minimum_break(), chrono::Duration::minutes(30));
        assert_eq!(config.presence.heartbeat_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_validation() {
        let mut config = PunchclockConfig::default();
        config.camera.resolution = (0, 0);
        assert!(config.validate().is_err());

        config.camera.resolution = (640, 480);
        assert!(config.validate().is_ok());

        config.identification.match_threshold = 0.0;
        assert!(config.validate().is_err());

        config.identification.match_threshold = 0.5;
        config.camera.backend = "webcam".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[lockout]\nmax_attempts = 5\nlockout_seconds = 45\n\n[kiosk]\nidentity_path = \"/tmp/kiosk-id\"\n"
        )
        .unwrap();

        let config = PunchclockConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.lockout.max_attempts, 5);
        assert_eq!(config.lockout.lockout_seconds, 45);
        assert_eq!(config.kiosk.identity_path, "/tmp/kiosk-id");
        // Untouched sections keep their defaults
        assert_eq!(config.identification.scan_timeout_seconds, 15);
    }

    #[test]
    fn test_default_config_renders_as_toml() {
        let rendered = PunchclockConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[identification]"));
        assert!(rendered.contains("minimum_break_minutes = 30"));
    }
}
