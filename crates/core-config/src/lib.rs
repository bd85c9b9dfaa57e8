//! Configuration loading and parsing.
//!
//! Parses `ember.toml` from an explicit path, the working directory, or
//! the platform config dir. Unknown fields are ignored so the file format
//! can grow without breaking older binaries; a file that fails to parse
//! falls back to defaults rather than aborting startup.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone)]
pub struct EchoConfig {
    /// Seconds of mid-sequence idleness before the keys typed so far are
    /// echoed in the echo area.
    #[serde(default = "EchoConfig::default_keystrokes")]
    pub keystrokes: f64,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            keystrokes: Self::default_keystrokes(),
        }
    }
}

impl EchoConfig {
    const fn default_keystrokes() -> f64 {
        1.0
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UndoConfig {
    /// Byte size below which undo history is never truncated.
    #[serde(default = "UndoConfig::default_soft_limit")]
    pub soft_limit: usize,
    /// Byte size above which truncation cuts at the next boundary.
    #[serde(default = "UndoConfig::default_hard_limit")]
    pub hard_limit: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            soft_limit: Self::default_soft_limit(),
            hard_limit: Self::default_hard_limit(),
        }
    }
}

impl UndoConfig {
    const fn default_soft_limit() -> usize {
        20_000
    }
    const fn default_hard_limit() -> usize {
        30_000
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AutosaveConfig {
    /// Input characters between autosaves.
    #[serde(default = "AutosaveConfig::default_interval")]
    pub interval: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            interval: Self::default_interval(),
        }
    }
}

impl AutosaveConfig {
    const fn default_interval() -> u64 {
        300
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// When false, the high-bit form of the quit character also quits.
    #[serde(default = "InputConfig::default_meta_sends_escape")]
    pub meta_sends_escape: bool,
    /// Character code whose arrival interrupts, C-g by default.
    #[serde(default = "InputConfig::default_quit_char")]
    pub quit_char: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            meta_sends_escape: Self::default_meta_sends_escape(),
            quit_char: Self::default_quit_char(),
        }
    }
}

impl InputConfig {
    const fn default_meta_sends_escape() -> bool {
        true
    }
    const fn default_quit_char() -> u32 {
        0x07
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub echo: EchoConfig,
    #[serde(default)]
    pub undo: UndoConfig,
    #[serde(default)]
    pub autosave: AutosaveConfig,
    #[serde(default)]
    pub input: InputConfig,
}

/// Config path following platform conventions: a local `ember.toml`
/// first, then the user config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("ember.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("ember").join("ember.toml");
    }
    PathBuf::from("ember.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<Config>(&content) {
            Ok(config) => {
                info!(target: "config", path = %path.display(), "config_loaded");
                Ok(config)
            }
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
                Ok(Config::default())
            }
        },
        Err(_) => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let cfg = load_from(Some(PathBuf::from("__no_such_ember_config__.toml"))).unwrap();
        assert_eq!(cfg.echo.keystrokes, 1.0);
        assert_eq!(cfg.undo.soft_limit, 20_000);
        assert_eq!(cfg.undo.hard_limit, 30_000);
        assert_eq!(cfg.autosave.interval, 300);
        assert_eq!(cfg.input.quit_char, 0x07);
        assert!(cfg.input.meta_sends_escape);
    }

    #[test]
    fn parses_all_sections() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[echo]\nkeystrokes = 0.5\n\
             [undo]\nsoft_limit = 100\nhard_limit = 200\n\
             [autosave]\ninterval = 50\n\
             [input]\nmeta_sends_escape = false\nquit_char = 3\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.echo.keystrokes, 0.5);
        assert_eq!((cfg.undo.soft_limit, cfg.undo.hard_limit), (100, 200));
        assert_eq!(cfg.autosave.interval, 50);
        assert_eq!(cfg.input.quit_char, 3);
        assert!(!cfg.input.meta_sends_escape);
    }

    #[test]
    fn unknown_fields_and_garbage_are_tolerated() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[echo]\nkeystrokes = 2.0\nfuture_field = 1\n").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.echo.keystrokes, 2.0);

        std::fs::write(tmp.path(), "this is not toml [[[").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.echo.keystrokes, 1.0);
    }
}
