use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::media::{AudioConstraints, MediaConstraints, VideoConstraints};
use crate::session::{SessionConfig, VoiceSettings};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub restart_delay_ms: u64,
    pub max_restart_attempts: u32,
    pub error_display_secs: u64,
    pub recognition_lang: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            restart_delay_ms: defaults.restart_delay.as_millis() as u64,
            max_restart_attempts: defaults.max_restart_attempts,
            error_display_secs: defaults.error_display_window.as_secs(),
            recognition_lang: defaults.recognition_lang,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        let voice = VoiceSettings::default();
        Self {
            lang: voice.lang,
            rate: voice.rate,
            pitch: voice.pitch,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub video_width: u32,
    pub video_height: u32,
    pub facing_mode: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        let constraints = MediaConstraints::default();
        Self {
            echo_cancellation: constraints.audio.echo_cancellation,
            noise_suppression: constraints.audio.noise_suppression,
            auto_gain_control: constraints.audio.auto_gain_control,
            video_width: constraints.video.ideal_width,
            video_height: constraints.video.ideal_height,
            facing_mode: constraints.video.facing_mode,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordingConfig {
    /// Directory for a local copy of each finished recording (supports `~`)
    pub output_dir: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("INTERVIEW").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    /// Session controller settings derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            session_id: format!("interview-{}", uuid::Uuid::new_v4()),
            restart_delay: Duration::from_millis(self.session.restart_delay_ms),
            max_restart_attempts: self.session.max_restart_attempts,
            error_display_window: Duration::from_secs(self.session.error_display_secs),
            recognition_lang: self.session.recognition_lang.clone(),
            voice: VoiceSettings {
                lang: self.synthesis.lang.clone(),
                rate: self.synthesis.rate,
                pitch: self.synthesis.pitch,
            },
            constraints: self.media_constraints(),
            recording_dir: self.recording_dir(),
        }
    }

    pub fn media_constraints(&self) -> MediaConstraints {
        MediaConstraints {
            audio: AudioConstraints {
                echo_cancellation: self.media.echo_cancellation,
                noise_suppression: self.media.noise_suppression,
                auto_gain_control: self.media.auto_gain_control,
            },
            video: VideoConstraints {
                ideal_width: self.media.video_width,
                ideal_height: self.media.video_height,
                facing_mode: self.media.facing_mode.clone(),
            },
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Expanded recording directory, if one is configured
    pub fn recording_dir(&self) -> Option<PathBuf> {
        self.recording
            .output_dir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_minimal_file_with_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("interview.toml");
        let mut file = std::fs::File::create(&path)?;
        writeln!(
            file,
            r#"
[service]
name = "interview-session"

[service.http]
bind = "127.0.0.1"
port = 8090

[api]
base_url = "http://localhost:8000/api/v1"
"#
        )?;

        let cfg = Config::load(path.to_str().unwrap())?;
        assert_eq!(cfg.service.http.port, 8090);
        assert_eq!(cfg.api.timeout_secs, 30);

        let session = cfg.session_config();
        assert_eq!(session.restart_delay, Duration::from_millis(1000));
        assert_eq!(session.max_restart_attempts, 3);
        assert_eq!(session.error_display_window, Duration::from_secs(5));
        assert_eq!(session.voice.lang, "ja-JP");
        assert!(session.recording_dir.is_none());
        Ok(())
    }

    #[test]
    fn recording_dir_expands_home() {
        let cfg = Config {
            service: ServiceConfig {
                name: "test".to_string(),
                http: HttpConfig {
                    bind: "127.0.0.1".to_string(),
                    port: 0,
                },
            },
            api: ApiConfig {
                base_url: "http://localhost".to_string(),
                timeout_secs: 5,
            },
            session: SessionSettings::default(),
            synthesis: SynthesisConfig::default(),
            media: MediaConfig::default(),
            recording: RecordingConfig {
                output_dir: Some("~/interviews".to_string()),
            },
        };

        let dir = cfg.recording_dir().unwrap();
        assert!(dir.ends_with("interviews"));
        if std::env::var_os("HOME").is_some() {
            assert!(!dir.to_string_lossy().starts_with('~'));
        }
    }
}
