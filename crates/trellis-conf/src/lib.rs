use std::path::Path;

use config::Config;
use config::ConfigError as ExternalConfigError;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;
use trellis_source::Encoding;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
    #[error("Unsupported default markup encoding '{0}'")]
    UnsupportedEncoding(String),
    #[error("Control namespace must not be empty")]
    EmptyNamespace,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Log at debug level when no `-v`/`-q` flag is given.
    pub debug: bool,
    pub markup: MarkupSettings,
    pub watcher: WatcherSettings,
}

/// How markup sources are decoded and assembled.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MarkupSettings {
    pub strip_comments: bool,
    pub compress_whitespace: bool,
    pub default_encoding: String,
    /// Prefix of the control namespace, `wicket` in `<wicket:extend>`.
    pub namespace: String,
    /// Fail markup without a leading `<?xml ...?>` declaration instead of
    /// only noting it in the debug log.
    pub require_xml_declaration: bool,
    /// Treat every document as if it were wrapped in a link region.
    pub auto_link: bool,
}

impl Default for MarkupSettings {
    fn default() -> Self {
        Self {
            strip_comments: false,
            compress_whitespace: false,
            default_encoding: Encoding::Utf8.name().to_string(),
            namespace: "wicket".to_string(),
            require_xml_declaration: false,
            auto_link: false,
        }
    }
}

impl MarkupSettings {
    /// The configured default encoding; settings loaded through
    /// [`Settings::new`] are validated so the fallback never triggers there.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        Encoding::from_label(&self.default_encoding).unwrap_or(Encoding::Utf8)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WatcherSettings {
    pub enabled: bool,
    pub debounce_ms: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 250,
        }
    }
}

impl Settings {
    pub fn new(project_root: &Path) -> Result<Self, ConfigError> {
        let user_config_file = ProjectDirs::from("org", "trellis", "trellis")
            .map(|proj_dirs| proj_dirs.config_dir().join("trellis.toml"));

        Self::load_from_paths(project_root, user_config_file.as_deref())
    }

    fn load_from_paths(
        project_root: &Path,
        user_config_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            File::from(project_root.join(".trellis.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("trellis.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        tracing::debug!(?settings, root = %project_root.display(), "Loaded settings");
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if Encoding::from_label(&self.markup.default_encoding).is_none() {
            return Err(ConfigError::UnsupportedEncoding(
                self.markup.default_encoding.clone(),
            ));
        }
        if self.markup.namespace.trim().is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        Ok(())
    }
}
