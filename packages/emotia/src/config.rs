use anyhow::{Context, Result, bail};
use emotia_link::{FrameEncoder, Role, SessionContext, UserId, WireFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [session]
//                    user_id = 12
//
//   env var:         EMOTIA_SESSION__USER_ID=12   (double underscore = nesting)
//
//   (single underscore stays within field names: EMOTIA_CAPTURE__INTERVAL_MS)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub chat: ChatFileConfig,
    #[serde(default)]
    pub capture: CaptureFileConfig,
}

/// Backend location (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

/// Who is logged in. Normally set through the env exports `emotia login` prints.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatFileConfig {
    /// Outbound chat framing: `legacy` (raw text) or `tagged` (JSON envelope).
    #[serde(default)]
    pub wire_format: WireFormat,
}

/// Room capture knobs (lives under `[capture]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptureFileConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for CaptureFileConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            width: default_width(),
            height: default_height(),
            quality: default_quality(),
        }
    }
}

fn default_interval_ms() -> u64 {
    800
}

fn default_width() -> u32 {
    emotia_link::capture::DEFAULT_WIDTH
}

fn default_height() -> u32 {
    emotia_link::capture::DEFAULT_HEIGHT
}

fn default_quality() -> u8 {
    emotia_link::capture::DEFAULT_QUALITY
}

/// Build the figment: struct defaults, then `<data_dir>/config.toml`, then
/// `EMOTIA_*` environment variables.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::providers::Env;

    file_layers(data_dir).merge(Env::prefixed("EMOTIA_").split("__"))
}

/// Struct defaults and `config.toml` only, without the environment.
pub fn file_layers(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
}

/// Validated capture settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureConfig {
    pub interval: Duration,
    pub encoder: FrameEncoder,
}

impl CaptureConfig {
    pub fn from_file(fc: &CaptureFileConfig) -> Result<Self> {
        if fc.interval_ms == 0 {
            bail!("capture.interval_ms must be greater than zero");
        }
        if fc.width == 0 || fc.height == 0 {
            bail!("capture raster must be non-empty, got {}x{}", fc.width, fc.height);
        }
        if !(1..=100).contains(&fc.quality) {
            bail!("capture.quality must be within 1..=100, got {}", fc.quality);
        }
        Ok(Self {
            interval: Duration::from_millis(fc.interval_ms),
            encoder: FrameEncoder {
                width: fc.width,
                height: fc.height,
                quality: fc.quality,
            },
        })
    }
}

/// Resolve the data directory (default `~/.emotia`) and make sure it exists.
pub fn prepare_data_dir(custom_dir: Option<PathBuf>) -> Result<PathBuf> {
    let data_dir = match custom_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
            .context("Could not find home directory")?
            .join(".emotia"),
    };

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;
    Ok(data_dir)
}

/// Command-line values that win over the file/env layers.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub user_id: Option<i64>,
    pub token: Option<String>,
}

/// Resolved client configuration.
#[derive(Clone, Debug)]
pub struct EmotiaConfig {
    pub data_dir: PathBuf,
    pub file: FileConfig,
}

impl EmotiaConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = prepare_data_dir(custom_dir)?;
        let figment = load_config(&data_dir);
        Self::from_figment(data_dir, figment)
    }

    pub fn from_figment(data_dir: PathBuf, figment: figment::Figment) -> Result<Self> {
        let file: FileConfig = figment
            .extract()
            .with_context(|| format!("Invalid configuration in {:?}", data_dir))?;

        debug!("Data directory: {}", data_dir.display());
        Ok(Self { data_dir, file })
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(base_url) = overrides.base_url {
            self.file.server.base_url = base_url;
        }
        if overrides.user_id.is_some() {
            self.file.session.user_id = overrides.user_id;
        }
        if overrides.token.is_some() {
            self.file.session.token = overrides.token;
        }
        self
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn base_url(&self) -> &str {
        &self.file.server.base_url
    }

    pub fn wire_format(&self) -> WireFormat {
        self.file.chat.wire_format
    }

    pub fn capture(&self) -> Result<CaptureConfig> {
        CaptureConfig::from_file(&self.file.capture)
    }

    /// Session for the logged-in user. Fails when no user id is configured.
    pub fn session(&self) -> Result<Arc<SessionContext>> {
        let Some(user_id) = self.file.session.user_id else {
            bail!(
                "No user configured. Run `emotia login` and export the printed variables, \
                 or set [session] user_id in {}",
                self.config_toml_path().display()
            );
        };
        Ok(Arc::new(self.build_session(UserId(user_id))))
    }

    /// Session for flows that do not need a user id, such as the room stream.
    pub fn session_or_anonymous(&self) -> Arc<SessionContext> {
        let user_id = UserId(self.file.session.user_id.unwrap_or_default());
        Arc::new(self.build_session(user_id))
    }

    fn build_session(&self, user_id: UserId) -> SessionContext {
        let mut session = SessionContext::new(self.base_url(), user_id);
        if let Some(token) = &self.file.session.token {
            session = session.with_token(token.clone());
        }
        if let Some(role) = self.file.session.role {
            session = session.with_role(role);
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── CaptureConfig::from_file ────────────────────────────────────────

    #[test]
    fn test_capture_config_defaults() {
        let cc = CaptureConfig::from_file(&CaptureFileConfig::default()).unwrap();
        assert_eq!(cc.interval, Duration::from_millis(800));
        assert_eq!(cc.encoder, FrameEncoder::default());
    }

    #[test]
    fn test_capture_config_rejects_zero_interval() {
        let fc = CaptureFileConfig {
            interval_ms: 0,
            ..Default::default()
        };
        assert!(CaptureConfig::from_file(&fc).is_err());
    }

    #[test]
    fn test_capture_config_rejects_bad_quality() {
        for quality in [0, 101] {
            let fc = CaptureFileConfig {
                quality,
                ..Default::default()
            };
            assert!(CaptureConfig::from_file(&fc).is_err());
        }
    }

    // ── EmotiaConfig ────────────────────────────────────────────────────

    /// Config from defaults and `config.toml`, unaffected by `EMOTIA_*`
    /// variables in the test environment.
    fn config_in(dir: &Path) -> EmotiaConfig {
        let data_dir = prepare_data_dir(Some(dir.to_path_buf())).unwrap();
        EmotiaConfig::from_figment(data_dir.clone(), file_layers(&data_dir)).unwrap()
    }

    #[test]
    fn test_emotia_config_with_custom_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = tmp.path().join("nested");
        let config = config_in(&data_dir);

        assert!(data_dir.exists());
        assert_eq!(config.config_toml_path(), data_dir.join("config.toml"));
        assert_eq!(config.base_url(), "http://127.0.0.1:8000");
        assert_eq!(config.wire_format(), WireFormat::Legacy);
    }

    #[test]
    fn test_session_requires_user() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());

        assert_eq!(config.file.session.user_id, None);
        let err = config.session().unwrap_err();
        assert!(err.to_string().contains("emotia login"));

        let anonymous = config.session_or_anonymous();
        assert_eq!(anonymous.user_id, UserId(0));
        assert_eq!(anonymous.base_url(), config.base_url());
    }

    #[test]
    fn test_overrides_win() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\nbase_url = \"http://clinic.local:9000\"\n[session]\nuser_id = 4\ntoken = \"file\"\n",
        )
        .unwrap();
        let config = config_in(tmp.path()).with_overrides(Overrides {
            base_url: Some("https://emotia.example".into()),
            user_id: None,
            token: Some("cli".into()),
        });

        let session = config.session().unwrap();
        assert_eq!(session.user_id, UserId(4));
        assert_eq!(session.base_url(), "https://emotia.example");
        assert_eq!(session.token.as_deref(), Some("cli"));
        assert_eq!(session.ws_base(), "wss://emotia.example");
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = file_layers(tmp.path()).extract().unwrap();
        assert_eq!(fc.capture.interval_ms, 800);
        assert_eq!(fc.capture.quality, 60);
        assert_eq!((fc.capture.width, fc.capture.height), (320, 240));
    }

    #[test]
    fn test_load_config_toml_sections() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[session]\nuser_id = 12\nrole = \"psychologist\"\n\n[chat]\nwire_format = \"tagged\"\n\n[capture]\ninterval_ms = 250\n",
        )
        .unwrap();
        let fc: FileConfig = file_layers(tmp.path()).extract().unwrap();
        assert_eq!(fc.session.user_id, Some(12));
        assert_eq!(fc.session.role, Some(Role::Psychologist));
        assert_eq!(fc.chat.wire_format, WireFormat::Tagged);
        assert_eq!(fc.capture.interval_ms, 250);
        // Untouched fields keep their defaults.
        assert_eq!(fc.capture.quality, 60);
        assert_eq!(fc.server.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_load_config_rejects_unknown_wire_format() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[chat]\nwire_format = \"smoke-signals\"\n",
        )
        .unwrap();
        assert!(file_layers(tmp.path()).extract::<FileConfig>().is_err());
    }
}
