use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Set of permission strings granted with a credential.
///
/// Rendered in the OAuth space-separated form on the wire and in storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope(BTreeSet<String>);

impl Scope {
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(permissions.into_iter().map(Into::into).collect())
    }

    /// Parse a space-separated scope string. Extra whitespace is ignored.
    pub fn parse(raw: &str) -> Self {
        Self(raw.split_whitespace().map(str::to_string).collect())
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(" "))
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Token as handed back by the identity provider, before the store stamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Scope,
}

/// A bearer credential with its issuance time and declared lifetime.
///
/// Persisted as `{access_token, expires_in, created_at, scope}` with `created_at`
/// in epoch milliseconds. Constructors truncate `issued_at` to whole
/// milliseconds so a stored credential reads back identical.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(rename = "created_at", with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "expires_in")]
    pub lifetime_secs: u64,
    #[serde(default)]
    pub scope: Scope,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime_secs: u64,
        scope: Scope,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            issued_at: issued_at.trunc_subsecs(3),
            lifetime_secs,
            scope,
        }
    }

    /// Build a credential from a provider grant, issued at `issued_at`.
    pub fn from_grant(grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: grant.access_token,
            issued_at: issued_at.trunc_subsecs(3),
            lifetime_secs: grant.expires_in,
            scope: grant.scope,
        }
    }

    /// The grant form handed back to the provider client.
    pub fn to_grant(&self) -> TokenGrant {
        TokenGrant {
            access_token: self.access_token.clone(),
            expires_in: self.lifetime_secs,
            scope: self.scope.clone(),
        }
    }

    /// A credential with no token or no lifetime cannot be used for anything.
    pub fn is_well_formed(&self) -> bool {
        !self.access_token.is_empty() && self.lifetime_secs > 0
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.lifetime_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| self.issued_at.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

// Keeps the bearer token out of logs and panic messages.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .field("issued_at", &self.issued_at)
            .field("lifetime_secs", &self.lifetime_secs)
            .field("scope", &self.scope)
            .finish()
    }
}
