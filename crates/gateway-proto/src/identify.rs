//! Identify handshake payload.
//!
//! The identify frame carries the credential token plus a block of
//! client-identification metadata. The metadata defaults describe a desktop
//! browser client; every field can be overridden from configuration.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Capability bitmask advertised by default.
pub const DEFAULT_CAPABILITIES: u64 = 16_381;

/// Client properties reported during identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientProperties {
    /// Operating system name.
    pub os: String,
    /// Browser name.
    pub browser: String,
    /// Device name.
    pub device: String,
    /// Locale, e.g. `en-US`.
    pub system_locale: String,
    /// Full user agent string.
    pub browser_user_agent: String,
    /// Browser version.
    pub browser_version: String,
    /// Operating system version.
    pub os_version: String,
    /// Referrer URL.
    pub referrer: String,
    /// Referring domain.
    pub referring_domain: String,
    /// Current referrer URL.
    pub referrer_current: String,
    /// Current referring domain.
    pub referring_domain_current: String,
    /// Release channel.
    pub release_channel: String,
    /// Client build number.
    pub client_build_number: u64,
    /// Event source, usually `null`.
    pub client_event_source: Option<String>,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            os: "Linux".to_string(),
            browser: "Firefox".to_string(),
            device: String::new(),
            system_locale: "en-US".to_string(),
            browser_user_agent:
                "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/118.0"
                    .to_string(),
            browser_version: "118.0".to_string(),
            os_version: String::new(),
            referrer: String::new(),
            referring_domain: String::new(),
            referrer_current: String::new(),
            referring_domain_current: String::new(),
            release_channel: "stable".to_string(),
            client_build_number: 235_912,
            client_event_source: None,
        }
    }
}

/// Initial presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Presence {
    /// Status string, e.g. `online`.
    pub status: String,
    /// Unix millis since the client went idle, 0 if not idle.
    pub since: u64,
    /// Activity objects.
    pub activities: Vec<Value>,
    /// Whether the client is away from keyboard.
    pub afk: bool,
}

impl Default for Presence {
    fn default() -> Self {
        Self {
            status: "online".to_string(),
            since: 0,
            activities: Vec::new(),
            afk: false,
        }
    }
}

/// Cached client state versions; all defaults mean "nothing cached".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientState {
    /// Per-guild cache versions.
    pub guild_versions: Map<String, Value>,
    /// Highest message id already seen.
    pub highest_last_message_id: String,
    /// Read state version.
    pub read_state_version: i64,
    /// Guild settings version.
    pub user_guild_settings_version: i64,
    /// User settings version.
    pub user_settings_version: i64,
    /// Private channels version.
    pub private_channels_version: String,
    /// API code version.
    pub api_code_version: i64,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            guild_versions: Map::new(),
            highest_last_message_id: "0".to_string(),
            read_state_version: 0,
            user_guild_settings_version: -1,
            user_settings_version: -1,
            private_channels_version: "0".to_string(),
            api_code_version: 0,
        }
    }
}

/// Everything in the identify payload except the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientMetadata {
    /// Capability bitmask.
    pub capabilities: u64,
    /// Client properties.
    pub properties: ClientProperties,
    /// Initial presence.
    pub presence: Presence,
    /// Whether the server should compress payloads.
    pub compress: bool,
    /// Cached client state.
    pub client_state: ClientState,
}

impl Default for ClientMetadata {
    fn default() -> Self {
        Self {
            capabilities: DEFAULT_CAPABILITIES,
            properties: ClientProperties::default(),
            presence: Presence::default(),
            compress: false,
            client_state: ClientState::default(),
        }
    }
}

/// The `d` field of an identify frame. Built once per connection attempt.
#[derive(Clone, PartialEq, Serialize)]
pub struct IdentifyPayload {
    token: String,
    #[serde(flatten)]
    metadata: ClientMetadata,
}

impl IdentifyPayload {
    /// Create a payload from a token and client metadata.
    #[must_use]
    pub fn new(token: impl Into<String>, metadata: ClientMetadata) -> Self {
        Self {
            token: token.into(),
            metadata,
        }
    }

    /// Client metadata sent alongside the token.
    #[must_use]
    pub const fn metadata(&self) -> &ClientMetadata {
        &self.metadata
    }
}

// The token never appears in logs.
impl fmt::Debug for IdentifyPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifyPayload")
            .field("token", &"<redacted>")
            .field("metadata", &self.metadata)
            .finish()
    }
}
