use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "minimax-voice";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Credentials {
    #[serde(rename = "minimax_secret")]
    pub secret: String,
    #[serde(rename = "minimax_group_id")]
    pub group_id: String,
}

impl Credentials {
    pub fn new(secret: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            group_id: group_id.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.secret.trim().is_empty() && !self.group_id.trim().is_empty()
    }

    /// Reads the credential file. A missing or blank file yields empty credentials.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        restrict_permissions(path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| {
        ConfigError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_: &Path) -> Result<(), ConfigError> {
    Ok(())
}

/// On-disk layout, all under one per-user root.
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub logs_dir: PathBuf,
    pub log_file: PathBuf,
    pub exports_dir: PathBuf,
}

impl Paths {
    pub fn resolve() -> Result<Self, ConfigError> {
        if let Ok(root) = env::var("MINIMAX_VOICE_HOME") {
            if !root.trim().is_empty() {
                return Ok(Self::under(PathBuf::from(root)));
            }
        }
        if let Some(dir) = dirs::data_dir() {
            return Ok(Self::under(dir.join(APP_DIR)));
        }
        if let Some(home) = dirs::home_dir() {
            return Ok(Self::under(home.join(format!(".{APP_DIR}"))));
        }
        Err(ConfigError::NoDataRoot)
    }

    pub fn under(root: PathBuf) -> Self {
        let logs_dir = root.join("logs");
        Self {
            config_file: root.join("config.toml"),
            log_file: logs_dir.join("app.log"),
            exports_dir: root.join("exports"),
            logs_dir,
            root,
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.root, &self.logs_dir, &self.exports_dir] {
            fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine a per-user data directory")]
    NoDataRoot,
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("toml parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("toml encode error: {0}")]
    Encode(#[from] toml::ser::Error),
}
