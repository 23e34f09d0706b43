//! Interceptor settings and their persistence.
//!
//! Settings are owned by the host application. The interceptor reads them on
//! every relevant operation through a [`SettingsStore`] and writes them back
//! after every user mutation.
//!
//! ## Example settings file
//!
//! ```toml
//! enabled = true
//! use_identity_headers = true
//! remove_trailing_assistant_messages = false
//! include_ambient_credentials = false
//! diagnostics_enabled = true
//! chat_version = "0.26.4"
//! editor_version = "1.100.0"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chat extension version declared when none is configured.
pub const DEFAULT_CHAT_VERSION: &str = "0.26.4";

/// Editor version declared when none is configured.
pub const DEFAULT_EDITOR_VERSION: &str = "1.100.0";

/// Errors raised while persisting settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// I/O error reading or writing the settings file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid TOML for [`InterceptorSettings`].
    #[error("TOML decode error: {0}")]
    Decode(#[from] toml::de::Error),

    /// The settings could not be encoded as TOML.
    #[error("TOML encode error: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// User-facing configuration of the interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct InterceptorSettings {
    /// Master switch. When off every call passes through untouched.
    pub enabled: bool,

    /// Exchange the credential for a session token and send the full
    /// first-party client identity header set.
    pub use_identity_headers: bool,

    /// Drop trailing assistant-authored messages (prefill) before forwarding.
    pub remove_trailing_assistant_messages: bool,

    /// Send ambient host credentials (cookies) with the forwarded call.
    pub include_ambient_credentials: bool,

    /// Retain records in the diagnostics ring.
    pub diagnostics_enabled: bool,

    /// Declared chat extension version.
    pub chat_version: String,

    /// Declared editor version.
    pub editor_version: String,
}

impl Default for InterceptorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            use_identity_headers: true,
            remove_trailing_assistant_messages: false,
            include_ambient_credentials: false,
            diagnostics_enabled: true,
            chat_version: DEFAULT_CHAT_VERSION.to_string(),
            editor_version: DEFAULT_EDITOR_VERSION.to_string(),
        }
    }
}

impl InterceptorSettings {
    /// Chat version to declare, falling back to the default when blank.
    #[must_use]
    pub fn effective_chat_version(&self) -> &str {
        non_blank_or(&self.chat_version, DEFAULT_CHAT_VERSION)
    }

    /// Editor version to declare, falling back to the default when blank.
    #[must_use]
    pub fn effective_editor_version(&self) -> &str {
        non_blank_or(&self.editor_version, DEFAULT_EDITOR_VERSION)
    }

    /// Normalises a user-entered version string.
    ///
    /// The value is trimmed; an empty result becomes `default`.
    #[must_use]
    pub fn normalize_version(value: &str, default: &str) -> String {
        non_blank_or(value, default).to_string()
    }
}

fn non_blank_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() { default } else { trimmed }
}

/// Key-value persistence for [`InterceptorSettings`].
///
/// Debouncing of writes, if any, is the store's concern.
pub trait SettingsStore: Send + Sync {
    /// Returns the current settings.
    fn load(&self) -> InterceptorSettings;

    /// Persists `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&self, settings: &InterceptorSettings) -> Result<(), SettingsError>;
}

/// Settings held in memory only.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: RwLock<InterceptorSettings>,
}

impl MemorySettingsStore {
    /// Creates a store seeded with `settings`.
    #[must_use]
    pub const fn new(settings: InterceptorSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> InterceptorSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, settings: &InterceptorSettings) -> Result<(), SettingsError> {
        *self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings.clone();
        Ok(())
    }
}

/// Settings persisted as a TOML file.
///
/// The file is re-read on every [`load`](SettingsStore::load) so edits made by
/// other processes are picked up. A missing or unreadable file yields the
/// defaults.
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    /// Creates a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file, distinguishing "absent" from "broken".
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn try_load(&self) -> Result<InterceptorSettings, SettingsError> {
        if !self.path.exists() {
            return Ok(InterceptorSettings::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&contents)?)
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load(&self) -> InterceptorSettings {
        self.try_load().unwrap_or_else(|e| {
            log::warn!(
                "Failed to load settings from {}: {e}. Using defaults.",
                self.path.display()
            );
            InterceptorSettings::default()
        })
    }

    fn save(&self, settings: &InterceptorSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string(settings)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_defaults() {
        let settings = InterceptorSettings::default();
        assert!(settings.enabled);
        assert!(settings.use_identity_headers);
        assert!(!settings.remove_trailing_assistant_messages);
        assert!(!settings.include_ambient_credentials);
        assert!(settings.diagnostics_enabled);
        assert_eq!(settings.chat_version, "0.26.4");
        assert_eq!(settings.editor_version, "1.100.0");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: InterceptorSettings = toml::from_str("enabled = false").unwrap();
        assert!(!settings.enabled);
        assert!(settings.use_identity_headers);
        assert_eq!(settings.chat_version, DEFAULT_CHAT_VERSION);
    }

    #[test]
    fn test_effective_versions_fall_back_when_blank() {
        let settings = InterceptorSettings {
            chat_version: "   ".to_string(),
            editor_version: String::new(),
            ..InterceptorSettings::default()
        };
        assert_eq!(settings.effective_chat_version(), "0.26.4");
        assert_eq!(settings.effective_editor_version(), "1.100.0");
    }

    #[test]
    fn test_normalize_version_trims() {
        assert_eq!(
            InterceptorSettings::normalize_version("  0.27.0 ", DEFAULT_CHAT_VERSION),
            "0.27.0"
        );
        assert_eq!(
            InterceptorSettings::normalize_version("", DEFAULT_EDITOR_VERSION),
            "1.100.0"
        );
    }

    #[test]
    fn test_memory_store_save_then_load() {
        let store = MemorySettingsStore::default();
        let mut settings = store.load();
        settings.remove_trailing_assistant_messages = true;
        store.save(&settings).unwrap();
        assert!(store.load().remove_trailing_assistant_messages);
    }

    #[test]
    fn test_toml_store_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlSettingsStore::new(dir.path().join("absent.toml"));
        assert_eq!(store.load(), InterceptorSettings::default());
    }

    #[test]
    fn test_toml_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cpi").join("settings.toml");
        let store = TomlSettingsStore::new(&path);

        let settings = InterceptorSettings {
            enabled: false,
            chat_version: "0.30.0".to_string(),
            ..InterceptorSettings::default()
        };
        store.save(&settings).unwrap();

        assert!(path.exists());
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn test_toml_store_broken_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "enabled = \"maybe\"").unwrap();

        let store = TomlSettingsStore::new(&path);
        assert!(store.try_load().is_err());
        assert_eq!(store.load(), InterceptorSettings::default());
    }
}
