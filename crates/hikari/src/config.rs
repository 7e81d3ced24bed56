//! Agent configuration from environment
//!
//! ```bash
//! # Defaults: prosody:5222, admin endpoint on 3001
//! hikari-agent
//!
//! # Different server and device, no hardware needed
//! HIKARI_SERVER=chat.example HIKARI_CAMERA_DEVICE=/dev/video0 hikari-agent --test-source
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::agent::AgentSettings;
use crate::camera::StillCaptureConfig;
use crate::identity::Identity;
use crate::message::RedactedString;
use crate::throttle::ThrottleConfig;

/// Default message server host
pub const DEFAULT_SERVER: &str = "prosody";

/// Default message server port
pub const DEFAULT_SERVER_PORT: u16 = 5222;

/// Everything the agent binary needs to start.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Message server host, also the domain of the agent's identity
    pub server: String,
    /// TCP address of the message server
    pub server_addr: String,
    pub username: String,
    pub password: RedactedString,
    /// Admin endpoint port
    pub http_port: u16,
    pub camera: StillCaptureConfig,
    /// Use the synthetic camera instead of a device
    pub test_source: bool,
    pub settings: AgentSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None, std::iter::empty::<String>())
    }
}

impl AgentConfig {
    /// Read `HIKARI_*` variables and command line flags.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), std::env::args().skip(1))
    }

    /// Build from an arbitrary variable lookup and argument list.
    pub fn from_lookup<F, I, S>(lookup: F, args: I) -> Self
    where
        F: Fn(&str) -> Option<String>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let server = lookup("HIKARI_SERVER").unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let server_addr = lookup("HIKARI_SERVER_ADDR")
            .unwrap_or_else(|| format!("{}:{}", server, DEFAULT_SERVER_PORT));
        let username = lookup("HIKARI_USERNAME").unwrap_or_else(|| "camera_agent".to_string());
        let password =
            RedactedString(lookup("HIKARI_PASSWORD").unwrap_or_else(|| "top_secret".to_string()));

        let http_port: u16 = parse_or(&lookup, "HIKARI_HTTP_PORT", 3001);

        let throttle = ThrottleConfig {
            request_cooldown_ms: parse_or(&lookup, "HIKARI_REQUEST_COOLDOWN_MS", 500),
            ban_duration_ms: parse_or(&lookup, "HIKARI_BAN_DURATION_MS", 10_000),
        };

        let mut camera = StillCaptureConfig::default();
        if let Some(device) = lookup("HIKARI_CAMERA_DEVICE") {
            camera.device = PathBuf::from(device);
        }
        camera.warmup = Duration::from_millis(parse_or(
            &lookup,
            "HIKARI_CAMERA_WARMUP_MS",
            camera.warmup.as_millis() as u64,
        ));

        let defaults = AgentSettings::default();
        let settings = AgentSettings {
            throttle,
            receive_timeout: Duration::from_secs(parse_or(
                &lookup,
                "HIKARI_RECEIVE_TIMEOUT_SECS",
                defaults.receive_timeout.as_secs(),
            )),
            sweep_interval: Duration::from_secs(
                parse_or(
                    &lookup,
                    "HIKARI_SWEEP_INTERVAL_SECS",
                    defaults.sweep_interval.as_secs(),
                )
                .max(1),
            ),
            ..defaults
        };

        let test_source = args.into_iter().any(|a| a.as_ref() == "--test-source");

        Self {
            server,
            server_addr,
            username,
            password,
            http_port,
            camera,
            test_source,
            settings,
        }
    }

    /// The agent's own address, `username@server`.
    pub fn identity(&self) -> Option<Identity> {
        Identity::from_parts(&self.username, &self.server)
    }
}

/// Parse `key` or fall back to `default`, warning when the value is malformed.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring malformed {}={:?}, using {}", key, raw, default);
                default
            }
        },
        None => default,
    }
}
