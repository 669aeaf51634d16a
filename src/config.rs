use anyhow::{Context, Result, anyhow};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::SettingError;
use crate::prompt::Confirm;

pub const DEFAULT_SERVER: &str = "https://erddap.bio-oracle.org/erddap/";

pub const DATA_DIRECTORY: &str = "data_directory";
pub const ERDDAP_SERVER: &str = "erddap_server";
pub const SKIP_CONFIRMATION: &str = "skip_confirmation";

const SECTION: &str = "DEFAULT";

/// Everything a [`Client`](crate::Client) needs to know about its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// ERDDAP base URL, typically `https://erddap.bio-oracle.org/erddap/`.
    pub server: String,
    /// Where downloads land when no output directory is given.
    pub data_directory: PathBuf,
    /// Skip the pre-download prompt when same-prefix files already exist.
    pub skip_confirmation: bool,
}

impl ClientConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingError> {
        Ok(Self {
            server: settings.erddap_server()?.to_string(),
            data_directory: settings.data_directory()?,
            skip_confirmation: settings.skip_confirmation()?,
        })
    }
}

/// Key/value settings of the `[DEFAULT]` section. Keys are lower-case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn defaults() -> Self {
        let mut s = Self::default();
        s.set(DATA_DIRECTORY, default_data_directory().display().to_string());
        s.set(ERDDAP_SERVER, DEFAULT_SERVER);
        s.set(SKIP_CONFIRMATION, "False");
        s
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.trim().to_lowercase(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn erddap_server(&self) -> Result<&str, SettingError> {
        self.required(ERDDAP_SERVER)
    }

    pub fn data_directory(&self) -> Result<PathBuf, SettingError> {
        self.required(DATA_DIRECTORY).map(PathBuf::from)
    }

    pub fn skip_confirmation(&self) -> Result<bool, SettingError> {
        parse_bool(SKIP_CONFIRMATION, self.required(SKIP_CONFIRMATION)?)
    }

    fn required(&self, key: &str) -> Result<&str, SettingError> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SettingError::Missing(key.to_string()))
    }
}

/// Boolean spellings accepted by INI files: `1/yes/true/on`, `0/no/false/off`.
pub fn parse_bool(key: &str, value: &str) -> Result<bool, SettingError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(SettingError::InvalidBoolean {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn default_data_directory() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("biooracle").join("data"))
        .unwrap_or_else(|| PathBuf::from("biooracle-data"))
}

/// The INI file holding [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `BIOORACLE_CONFIG` if set, else `<config dir>/biooracle/config.ini`.
    pub fn locate() -> Result<Self> {
        if let Ok(p) = std::env::var("BIOORACLE_CONFIG") {
            return Ok(Self::new(p));
        }
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("no configuration directory on this platform; set BIOORACLE_CONFIG"))?;
        Ok(Self::new(dir.join("biooracle").join("config.ini")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn read(&self) -> Result<Settings> {
        let text = std::fs::read_to_string(&self.path).with_context(|| {
            format!("failed to read configuration file {}", self.path.display())
        })?;
        Ok(parse_ini(&text))
    }

    /// Reads the store, creating it with defaults first when it is missing.
    /// Falls back to in-memory defaults when the file cannot be created.
    pub fn load(&self) -> Result<Settings> {
        if self.exists() {
            return self.read();
        }

        println!("Config file doesn't exist, creating it.");
        let defaults = Settings::defaults();
        if let Err(e) = self.write(&defaults) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "could not create configuration file; using default values"
            );
            println!("Error: could not load or create configuration file. Loading default values.");
        }
        Ok(defaults)
    }

    /// Rewrites the whole store.
    pub fn write(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory {}", parent.display()))?;
            }
        }
        std::fs::write(&self.path, render_ini(settings))
            .with_context(|| format!("failed to write configuration file {}", self.path.display()))
    }

    /// Writes `defaults`, asking before overwriting an existing file.
    /// Returns whether the file was written.
    pub fn create(&self, defaults: &Settings, confirm: &dyn Confirm) -> Result<bool> {
        if self.exists() {
            let msg = format!("Config file '{}' already exists, overwrite it?", self.path.display());
            if !confirm.confirm(&msg)? {
                println!("Operation cancelled.");
                return Ok(false);
            }
        }
        self.write(defaults)?;
        println!("Created configuration at '{}'.", self.path.display());
        Ok(true)
    }

    pub fn update_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut settings = self.load()?;
        settings.set(key, value);
        self.write(&settings)?;
        println!("Successfully updated config file at '{}'.", self.path.display());
        Ok(())
    }

    pub fn print_values(&self) -> Result<()> {
        let settings = self.load()?;
        println!(
            "Configuration values in '{}' are as following:\n",
            self.path.display()
        );
        for (key, value) in settings.iter() {
            println!("{}\t{}", key, value);
        }
        println!();
        println!(
            "Edit the configuration file '{}' or use `biooracle config set` to edit them.",
            self.path.display()
        );
        Ok(())
    }
}

pub(crate) fn parse_ini(text: &str) -> Settings {
    let mut settings = Settings::default();
    let mut in_default = true;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            in_default = line[1..line.len() - 1].trim() == SECTION;
            continue;
        }
        if !in_default {
            continue;
        }

        let sep = line.find(['=', ':']);
        if let Some(idx) = sep {
            let (k, v) = (&line[..idx], &line[idx + 1..]);
            settings.set(k, strip_quotes(v.trim()));
        }
    }

    settings
}

pub(crate) fn render_ini(settings: &Settings) -> String {
    let mut out = format!("[{}]\n", SECTION);
    for (key, value) in settings.iter() {
        out.push_str(&format!("{} = {}\n", key, value));
    }
    out.push('\n');
    out
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Resolves the client configuration. Precedence: explicit arguments, then
/// `BIOORACLE_SERVER` / `BIOORACLE_DATA_DIR` / `BIOORACLE_SKIP_CONFIRMATION`,
/// then the configuration store.
pub(crate) fn load_config(
    server: Option<String>,
    data_directory: Option<PathBuf>,
    skip_confirmation: Option<bool>,
) -> Result<ClientConfig> {
    resolve_config(
        server,
        data_directory,
        skip_confirmation,
        |name| std::env::var(name).ok(),
        || ConfigStore::locate()?.load(),
    )
}

fn resolve_config<E, S>(
    server: Option<String>,
    data_directory: Option<PathBuf>,
    skip_confirmation: Option<bool>,
    env: E,
    store: S,
) -> Result<ClientConfig>
where
    E: Fn(&str) -> Option<String>,
    S: FnOnce() -> Result<Settings>,
{
    let server = server.or_else(|| env("BIOORACLE_SERVER"));
    let data_directory = data_directory.or_else(|| env("BIOORACLE_DATA_DIR").map(PathBuf::from));
    let skip_confirmation = match skip_confirmation {
        Some(v) => Some(v),
        None => env("BIOORACLE_SKIP_CONFIRMATION")
            .map(|v| parse_bool("BIOORACLE_SKIP_CONFIRMATION", &v))
            .transpose()?,
    };

    if let (Some(server), Some(data_directory), Some(skip_confirmation)) =
        (&server, &data_directory, skip_confirmation)
    {
        return Ok(ClientConfig {
            server: server.clone(),
            data_directory: data_directory.clone(),
            skip_confirmation,
        });
    }

    let settings = store()?;
    Ok(ClientConfig {
        server: match server {
            Some(v) => v,
            None => settings.erddap_server()?.to_string(),
        },
        data_directory: match data_directory {
            Some(v) => v,
            None => settings.data_directory()?,
        },
        skip_confirmation: match skip_confirmation {
            Some(v) => v,
            None => settings.skip_confirmation()?,
        },
    })
}
