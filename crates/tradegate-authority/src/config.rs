//! Authority connection settings.
//!
//! Everything the client needs to talk to one realm of the policy authority:
//! the base URL, the resource-server client credentials (used for the
//! Protection API and as UMA audience), and the admin account used for the
//! Admin REST API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Default admin CLI client id on the authority's master realm.
pub const DEFAULT_ADMIN_CLIENT_ID: &str = "admin-cli";

/// Connection settings for the external policy authority.
///
/// # Example
///
/// ```ignore
/// use tradegate_authority::AuthoritySettings;
/// use url::Url;
///
/// let settings = AuthoritySettings::new(
///     Url::parse("https://authority.example.com")?,
///     "dataspace",
///     "provider-connector",
///     "secret",
/// )
/// .with_admin_credentials("admin", "admin-password");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthoritySettings {
    /// Root URL of the authority (no realm path).
    pub base_url: Url,

    /// Realm that holds the resource server and its policy graph.
    pub realm: String,

    /// Client id of the resource server. Used for the client-credentials
    /// grant producing the Protection API Token and as the UMA audience.
    pub client_id: String,

    /// Client secret of the resource server.
    pub client_secret: String,

    /// Admin client id on the master realm (default: `admin-cli`).
    #[serde(default = "default_admin_client_id")]
    pub admin_client_id: String,

    /// Admin username for the password grant on the master realm.
    #[serde(default)]
    pub admin_username: String,

    /// Admin password for the password grant on the master realm.
    #[serde(default)]
    pub admin_password: String,

    /// Connect/read timeout applied to every outbound call (default: 30 s).
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,

    /// Permits a plain-HTTP base URL. Tokens travel in clear over such a
    /// connection, so this is for tests and local setups only.
    #[serde(default)]
    pub allow_http: bool,
}

fn default_admin_client_id() -> String {
    DEFAULT_ADMIN_CLIENT_ID.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Serde adapter storing the timeout as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

impl AuthoritySettings {
    /// Creates settings for one realm with the resource-server credentials.
    #[must_use]
    pub fn new(
        base_url: Url,
        realm: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url,
            realm: realm.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            admin_client_id: default_admin_client_id(),
            admin_username: String::new(),
            admin_password: String::new(),
            request_timeout: default_request_timeout(),
            allow_http: false,
        }
    }

    /// Sets the admin account used for the Admin REST API.
    #[must_use]
    pub fn with_admin_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.admin_username = username.into();
        self.admin_password = password.into();
        self
    }

    /// Overrides the admin client id (default: `admin-cli`).
    #[must_use]
    pub fn with_admin_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.admin_client_id = client_id.into();
        self
    }

    /// Sets the outbound request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Permits a plain-HTTP base URL (tests and local setups only).
    #[must_use]
    pub fn with_allow_http(mut self, allow_http: bool) -> Self {
        self.allow_http = allow_http;
        self
    }

    /// Base URL without a trailing slash, for path assembly.
    #[must_use]
    pub fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }
}
