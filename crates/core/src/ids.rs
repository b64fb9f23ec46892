//! App, depot and manifest identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A repository application id (e.g. `440`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub u32);

/// A depot id within an application.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepotId(pub u32);

/// A manifest id identifying one content revision of a depot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub u64);

macro_rules! numeric_id {
    ($name:ident, $inner:ty, $label:literal) => {
        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> crate::Result<Self> {
                parse_decimal::<$inner>(s, $label).map(Self)
            }
        }
    };
}

numeric_id!(AppId, u32, "app id");
numeric_id!(DepotId, u32, "depot id");
numeric_id!(ManifestId, u64, "manifest id");

/// Parse a strictly decimal component (no sign, no whitespace).
fn parse_decimal<T: FromStr>(s: &str, what: &str) -> crate::Result<T> {
    if s.is_empty() {
        return Err(crate::Error::InvalidIdentifier(format!("empty {what}")));
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(crate::Error::InvalidIdentifier(format!(
            "{what} must be decimal digits, got {s:?}"
        )));
    }
    s.parse::<T>()
        .map_err(|_| crate::Error::InvalidIdentifier(format!("{what} out of range: {s}")))
}

/// Store key: one local record exists per (app, depot).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct DepotKey {
    pub app_id: AppId,
    pub depot_id: DepotId,
}

impl DepotKey {
    pub fn new(app_id: AppId, depot_id: DepotId) -> Self {
        Self { app_id, depot_id }
    }
}

impl fmt::Display for DepotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_id, self.depot_id)
    }
}

/// Unique key of a manifest entry: (app, depot, manifest).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct ManifestKey {
    pub app_id: AppId,
    pub depot_id: DepotId,
    pub manifest_id: ManifestId,
}

impl ManifestKey {
    pub fn depot_key(&self) -> DepotKey {
        DepotKey::new(self.app_id, self.depot_id)
    }
}

impl fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.app_id, self.depot_id, self.manifest_id)
    }
}

/// A user request: every depot of an app (`"440"`) or a single depot (`"440/441"`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Identifier {
    pub app_id: AppId,
    pub depot_id: Option<DepotId>,
}

impl Identifier {
    pub fn app(app_id: AppId) -> Self {
        Self {
            app_id,
            depot_id: None,
        }
    }

    pub fn depot(app_id: AppId, depot_id: DepotId) -> Self {
        Self {
            app_id,
            depot_id: Some(depot_id),
        }
    }

    /// Parse `"<app>"` or `"<app>/<depot>"`. Surrounding whitespace is ignored.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let s = s.trim();
        let mut parts = s.split('/');
        let app = parts.next().unwrap_or_default();
        let depot = parts.next();
        if parts.next().is_some() {
            return Err(crate::Error::InvalidIdentifier(format!(
                "expected <app> or <app>/<depot>, got {s:?}"
            )));
        }

        let app_id = app.parse::<AppId>()?;
        match depot {
            None => Ok(Self::app(app_id)),
            Some(depot) => Ok(Self::depot(app_id, depot.parse::<DepotId>()?)),
        }
    }
}

impl FromStr for Identifier {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.depot_id {
            Some(depot) => write!(f, "{}/{}", self.app_id, depot),
            None => write!(f, "{}", self.app_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_app_only() {
        let id = Identifier::parse("440").unwrap();
        assert_eq!(id.app_id, AppId(440));
        assert_eq!(id.depot_id, None);
        assert_eq!(id.to_string(), "440");
    }

    #[test]
    fn test_parse_app_and_depot() {
        let id = Identifier::parse(" 440/1 ").unwrap();
        assert_eq!(id, Identifier::depot(AppId(440), DepotId(1)));
        assert_eq!(id.to_string(), "440/1");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "abc", "440/", "/1", "440/1/2", "-1", "+440", "440/x", "99999999999"] {
            assert!(
                matches!(Identifier::parse(bad), Err(crate::Error::InvalidIdentifier(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_manifest_key_display() {
        let key = ManifestKey {
            app_id: AppId(440),
            depot_id: DepotId(441),
            manifest_id: ManifestId(7280959080077824592),
        };
        assert_eq!(key.to_string(), "440/441@7280959080077824592");
        assert_eq!(key.depot_key(), DepotKey::new(AppId(440), DepotId(441)));
    }
}
