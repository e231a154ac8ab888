use std::{
    borrow::Borrow,
    fmt::{self, Display},
};

use url::Url;
use uuid::Uuid;

use crate::Error;

/// Subscription id used on the wire for one REQ
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelayReqId(pub String);

impl RelayReqId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RelayReqId {
    fn default() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl From<String> for RelayReqId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<RelayReqId> for String {
    fn from(value: RelayReqId) -> Self {
        value.0
    }
}

impl From<&str> for RelayReqId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Display for RelayReqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Borrow<str> for RelayReqId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Canonical relay identity. Two spellings of the same relay (with or
/// without the root slash, different host case) compare equal.
#[derive(Eq, PartialEq, Hash, Clone, Debug, PartialOrd, Ord)]
pub struct NormRelayUrl(String);

impl NormRelayUrl {
    pub fn new(url: &str) -> Result<Self, Error> {
        let parsed = Url::parse(url.trim()).map_err(|_| Error::InvalidRelayUrl(url.to_owned()))?;

        match parsed.scheme() {
            "ws" | "wss" => {}
            _ => return Err(Error::InvalidRelayUrl(url.to_owned())),
        }

        if parsed.host_str().is_none() {
            return Err(Error::InvalidRelayUrl(url.to_owned()));
        }

        Ok(Self(canonicalize_url(&parsed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NormRelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for NormRelayUrl {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for NormRelayUrl {
    type Error = Error;

    fn try_from(url: &str) -> Result<Self, Error> {
        NormRelayUrl::new(url)
    }
}

// standardize the format (ie, trailing slashes)
fn canonicalize_url(url: &Url) -> String {
    let s = url.to_string();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        s.trim_end_matches('/').to_owned()
    } else {
        s
    }
}
