//! Core request and identity types

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

/// Header carrying basic-auth credentials
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Header a caller uses to pick one of its groups
pub const CURRENT_GROUP_HEADER: &str = "x-acl-current-group";

/// Description of an incoming request, as extracted by the host
///
/// Header names are stored lowercased so lookups are case-insensitive;
/// header values keep their case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclRequest {
    /// Request identifier used in logs and audit entries
    pub id: String,

    /// Action name (e.g., "indices:data/read/search")
    pub action: String,

    /// HTTP method, uppercased
    pub method: String,

    /// Request URI (path and query)
    pub uri: String,

    /// Address of the connecting peer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,

    /// Indices or other named resources the request targets
    #[serde(default)]
    pub indices: BTreeSet<String>,

    /// Whether the request touches indices at all
    #[serde(default)]
    pub involves_indices: bool,

    /// Whether the request only reads data
    #[serde(default = "default_true")]
    pub read_request: bool,

    /// Body length in bytes
    #[serde(default)]
    pub content_length: usize,

    #[serde(default)]
    headers: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl AclRequest {
    /// Create a new request for an action
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action: action.into(),
            method: "GET".to_string(),
            uri: "/".to_string(),
            remote_address: None,
            indices: BTreeSet::new(),
            involves_indices: false,
            read_request: true,
            content_length: 0,
            headers: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_uppercase();
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    /// Add a header; the name is lowercased
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_lowercase(), value.into());
        self
    }

    /// Add basic-auth credentials as an `Authorization` header
    pub fn with_basic_auth(self, user: &str, secret: &str) -> Self {
        let encoded = STANDARD.encode(format!("{}:{}", user, secret));
        self.with_header(AUTHORIZATION_HEADER, format!("Basic {}", encoded))
    }

    /// Target the given indices
    pub fn with_indices<I, S>(mut self, indices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices = indices.into_iter().map(Into::into).collect();
        self.involves_indices = true;
        self
    }

    /// Mark the request as a write
    pub fn writing(mut self) -> Self {
        self.read_request = false;
        self
    }

    pub fn with_content_length(mut self, length: usize) -> Self {
        self.content_length = length;
        self
    }

    /// All headers, keyed by lowercased name
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Basic-auth credentials carried by the request, if any
    pub fn credentials(&self) -> Option<Credentials> {
        self.header(AUTHORIZATION_HEADER)
            .and_then(Credentials::from_basic_header)
    }
}

/// Identity established by an authentication rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoggedUser {
    /// User identifier
    pub id: String,

    /// Groups resolved for the user, when an authenticating rule knows them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeSet<String>>,

    /// Group the user selected for this request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_group: Option<String>,
}

impl LoggedUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            groups: None,
            current_group: None,
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_current_group(mut self, group: impl Into<String>) -> Self {
        self.current_group = Some(group.into());
        self
    }
}

/// Username and secret presented by the caller
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    secret: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }

    /// Parse an `Authorization: Basic <base64(user:secret)>` header value
    pub fn from_basic_header(value: &str) -> Option<Self> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, secret) = decoded.split_once(':')?;
        if user.is_empty() {
            return None;
        }
        Some(Self::new(user, secret))
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// `user:secret`, the form auth keys are configured in
    pub fn joined(&self) -> String {
        format!("{}:{}", self.user, self.secret)
    }

    /// BLAKE3 digest of the secret, used as a cache comparison value
    pub fn hashed_secret(&self) -> [u8; 32] {
        *blake3::hash(self.secret.as_bytes()).as_bytes()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}
