//! First-party client identity headers.
//!
//! The provider expects chat requests to carry the header set its own editor
//! integration sends. The device identity (machine id and session id) is
//! generated lazily and kept until [`IdentityHeaderBuilder::reset`]; the
//! correlation ids are fresh on every build.

use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

use cpi_common::InterceptorSettings;

use crate::error::ClientError;
use crate::session::Clock;

/// Integration id the provider requires.
pub const INTEGRATION_ID: &str = "vscode-chat";
/// Declared API version.
pub const GITHUB_API_VERSION: &str = "2025-10-01";
/// Declared initiator of the request.
pub const INITIATOR: &str = "user";
/// Declared interaction type.
pub const INTERACTION_TYPE: &str = "conversation-panel";
/// Declared HTTP library of the editor.
pub const USER_AGENT_LIBRARY: &str = "electron-fetch";

/// Header carrying [`INTEGRATION_ID`].
pub const COPILOT_INTEGRATION_ID: HeaderName = HeaderName::from_static("copilot-integration-id");
const EDITOR_PLUGIN_VERSION: HeaderName = HeaderName::from_static("editor-plugin-version");
const EDITOR_VERSION: HeaderName = HeaderName::from_static("editor-version");
/// Header carrying the machine id.
pub const VSCODE_MACHINE_ID: HeaderName = HeaderName::from_static("vscode-machineid");
/// Header carrying the session id.
pub const VSCODE_SESSION_ID: HeaderName = HeaderName::from_static("vscode-sessionid");
const X_GITHUB_API_VERSION: HeaderName = HeaderName::from_static("x-github-api-version");
const X_INITIATOR: HeaderName = HeaderName::from_static("x-initiator");
/// Per-call interaction correlation id.
pub const X_INTERACTION_ID: HeaderName = HeaderName::from_static("x-interaction-id");
const X_INTERACTION_TYPE: HeaderName = HeaderName::from_static("x-interaction-type");
/// Per-call request correlation id.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const X_VSCODE_USER_AGENT_LIBRARY_VERSION: HeaderName =
    HeaderName::from_static("x-vscode-user-agent-library-version");

const MACHINE_ID_LEN: usize = 64;
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Identity of this install for the lifetime of a reset epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// 64 lowercase hex characters.
    pub machine_id: String,
    /// Unique per reset epoch.
    pub session_id: String,
}

fn generate_machine_id() -> String {
    let mut rng = rand::thread_rng();
    (0..MACHINE_ID_LEN)
        .map(|_| char::from(HEX_DIGITS[rng.gen_range(0..HEX_DIGITS.len())]))
        .collect()
}

/// A random v4 UUID from the OS source, or the current epoch millis if the
/// OS source is unavailable.
fn correlation_id(clock: &dyn Clock) -> String {
    let mut bytes = [0u8; 16];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string(),
        Err(e) => {
            log::warn!("OS randomness unavailable, using timestamp id: {e}");
            clock.now_millis().to_string()
        }
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), ClientError> {
    let header_value = HeaderValue::from_str(value).map_err(|e| ClientError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    headers.insert(name, header_value);
    Ok(())
}

/// Builds the identity header set.
pub struct IdentityHeaderBuilder {
    clock: Arc<dyn Clock>,
    identity: Mutex<Option<DeviceIdentity>>,
}

impl std::fmt::Debug for IdentityHeaderBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityHeaderBuilder")
            .field(
                "identity",
                &*self.identity.lock().unwrap_or_else(PoisonError::into_inner),
            )
            .finish_non_exhaustive()
    }
}

impl IdentityHeaderBuilder {
    /// Creates a builder with no identity yet.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            identity: Mutex::new(None),
        }
    }

    /// Returns the device identity, generating it on first use.
    pub fn device_identity(&self) -> DeviceIdentity {
        self.identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(|| DeviceIdentity {
                machine_id: generate_machine_id(),
                session_id: format!(
                    "{}{}",
                    correlation_id(self.clock.as_ref()),
                    self.clock.now_millis()
                ),
            })
            .clone()
    }

    /// Discards the device identity; the next build generates a new one.
    pub fn reset(&self) {
        *self.identity.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Builds the full identity header set.
    ///
    /// Version headers come from `settings`, falling back to the defaults
    /// when blank.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured version string is not a valid
    /// header value.
    pub fn build(&self, settings: &InterceptorSettings) -> Result<HeaderMap, ClientError> {
        let chat_version = settings.effective_chat_version();
        let editor_version = settings.effective_editor_version();
        let identity = self.device_identity();
        let clock = self.clock.as_ref();

        let mut headers = HeaderMap::new();
        insert(&mut headers, COPILOT_INTEGRATION_ID, INTEGRATION_ID)?;
        insert(
            &mut headers,
            EDITOR_PLUGIN_VERSION,
            &format!("copilot-chat/{chat_version}"),
        )?;
        insert(
            &mut headers,
            EDITOR_VERSION,
            &format!("vscode/{editor_version}"),
        )?;
        insert(
            &mut headers,
            USER_AGENT,
            &format!("GitHubCopilotChat/{chat_version}"),
        )?;
        insert(&mut headers, VSCODE_MACHINE_ID, &identity.machine_id)?;
        insert(&mut headers, VSCODE_SESSION_ID, &identity.session_id)?;
        insert(&mut headers, X_GITHUB_API_VERSION, GITHUB_API_VERSION)?;
        insert(&mut headers, X_INITIATOR, INITIATOR)?;
        insert(&mut headers, X_INTERACTION_ID, &correlation_id(clock))?;
        insert(&mut headers, X_INTERACTION_TYPE, INTERACTION_TYPE)?;
        insert(&mut headers, X_REQUEST_ID, &correlation_id(clock))?;
        insert(
            &mut headers,
            X_VSCODE_USER_AGENT_LIBRARY_VERSION,
            USER_AGENT_LIBRARY,
        )?;
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::session::SystemClock;

    fn builder() -> IdentityHeaderBuilder {
        IdentityHeaderBuilder::new(Arc::new(SystemClock))
    }

    fn value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
        headers.get(name).unwrap().to_str().unwrap()
    }

    #[test]
    fn test_machine_id_shape() {
        let identity = builder().device_identity();
        assert_eq!(identity.machine_id.len(), 64);
        assert!(
            identity
                .machine_id
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        );
        assert!(!identity.session_id.is_empty());
    }

    #[test]
    fn test_identity_stable_correlation_ids_fresh() {
        let builder = builder();
        let settings = InterceptorSettings::default();

        let first = builder.build(&settings).unwrap();
        let second = builder.build(&settings).unwrap();

        assert_eq!(
            value(&first, "vscode-machineid"),
            value(&second, "vscode-machineid")
        );
        assert_eq!(
            value(&first, "vscode-sessionid"),
            value(&second, "vscode-sessionid")
        );
        assert_ne!(
            value(&first, "x-interaction-id"),
            value(&second, "x-interaction-id")
        );
        assert_ne!(value(&first, "x-request-id"), value(&second, "x-request-id"));
        assert_ne!(
            value(&first, "x-interaction-id"),
            value(&first, "x-request-id")
        );
    }

    #[test]
    fn test_reset_starts_new_epoch() {
        let builder = builder();
        let before = builder.device_identity();
        builder.reset();
        let after = builder.device_identity();
        assert_ne!(before.machine_id, after.machine_id);
        assert_ne!(before.session_id, after.session_id);
    }

    #[test]
    fn test_fixed_and_versioned_values() {
        let settings = InterceptorSettings {
            chat_version: "0.27.1".to_string(),
            editor_version: String::new(),
            ..InterceptorSettings::default()
        };
        let headers = builder().build(&settings).unwrap();

        assert_eq!(headers.len(), 12);
        assert_eq!(value(&headers, "copilot-integration-id"), "vscode-chat");
        assert_eq!(value(&headers, "editor-plugin-version"), "copilot-chat/0.27.1");
        assert_eq!(value(&headers, "editor-version"), "vscode/1.100.0");
        assert_eq!(value(&headers, "user-agent"), "GitHubCopilotChat/0.27.1");
        assert_eq!(value(&headers, "x-github-api-version"), "2025-10-01");
        assert_eq!(value(&headers, "x-initiator"), "user");
        assert_eq!(value(&headers, "x-interaction-type"), "conversation-panel");
        assert_eq!(
            value(&headers, "x-vscode-user-agent-library-version"),
            "electron-fetch"
        );
    }

    #[test]
    fn test_invalid_version_is_rejected() {
        let settings = InterceptorSettings {
            chat_version: "0.26\n4".to_string(),
            ..InterceptorSettings::default()
        };
        let err = builder().build(&settings).unwrap_err();
        assert!(matches!(err, ClientError::InvalidHeader { .. }));
    }
}
