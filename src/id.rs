//! Identifier types.
//!
//! An [`ObjectId`] names an entity across every version it has ever had; a
//! [`UniqueId`] either pins one of those versions or, when the version is
//! absent, means "whatever is current at the requested version-correction".
//! [`ExternalId`]s are the identifiers other systems use (tickers, ISINs) and
//! travel inside security links as an [`ExternalIdBundle`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

const SEPARATOR: char = '~';
const ESCAPE: char = '\\';

/// Writes an id component with separators and escapes backslash-escaped.
struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            if c == SEPARATOR || c == ESCAPE {
                write!(f, "{ESCAPE}")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Splits on unescaped separators and unescapes each component.
fn split_components(s: &str) -> Result<Vec<String>, &'static str> {
    let mut parts = vec![String::new()];
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(next @ (SEPARATOR | ESCAPE)) => {
                    if let Some(last) = parts.last_mut() {
                        last.push(next);
                    }
                }
                _ => return Err("dangling escape"),
            },
            SEPARATOR => parts.push(String::new()),
            c => {
                if let Some(last) = parts.last_mut() {
                    last.push(c);
                }
            }
        }
    }
    Ok(parts)
}

/// Identifies an entity independently of its versions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    scheme: String,
    value: String,
}

impl ObjectId {
    /// Creates an object id from a scheme and a scheme-local value.
    #[must_use]
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Pins this object to a specific version.
    #[must_use]
    pub fn at_version(&self, version: impl Into<String>) -> UniqueId {
        UniqueId {
            scheme: self.scheme.clone(),
            value: self.value.clone(),
            version: Some(version.into()),
        }
    }

    /// The unversioned ("latest") unique id for this object.
    #[must_use]
    pub fn at_latest(&self) -> UniqueId {
        UniqueId {
            scheme: self.scheme.clone(),
            value: self.value.clone(),
            version: None,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", Escaped(&self.scheme), Escaped(&self.value))
    }
}

/// Identifies one version of an entity, or its latest version when unversioned.
///
/// Displays as `scheme~value~version`, with `~` and `\` inside a component
/// escaped by a backslash.
///
/// # Examples
///
/// ```
/// use lazytarget::UniqueId;
///
/// let latest = UniqueId::latest("Pos", "101");
/// assert!(!latest.is_versioned());
///
/// let pinned: UniqueId = "Pos~101~3".parse().unwrap();
/// assert_eq!(pinned.version(), Some("3"));
/// assert_eq!(pinned.object_id(), latest.object_id());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueId {
    scheme: String,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl UniqueId {
    /// Creates a unique id pinned to `version`.
    #[must_use]
    pub fn of(scheme: impl Into<String>, value: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
            version: Some(version.into()),
        }
    }

    /// Creates an unversioned unique id.
    #[must_use]
    pub fn latest(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
            version: None,
        }
    }

    /// Creates a fresh, randomly valued unique id at version "1".
    #[must_use]
    pub fn generate(scheme: impl Into<String>) -> Self {
        Self::of(scheme, Uuid::new_v4().to_string(), "1")
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    #[must_use]
    pub const fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    /// Returns the version-independent identity.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        ObjectId::new(self.scheme.clone(), self.value.clone())
    }

    /// Returns this id with the version removed.
    #[must_use]
    pub fn to_latest(&self) -> Self {
        Self::latest(self.scheme.clone(), self.value.clone())
    }

    /// True when both ids name the same object, ignoring version.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.value == other.value
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(
                f,
                "{}{SEPARATOR}{}{SEPARATOR}{}",
                Escaped(&self.scheme),
                Escaped(&self.value),
                Escaped(version)
            ),
            None => write!(f, "{}{SEPARATOR}{}", Escaped(&self.scheme), Escaped(&self.value)),
        }
    }
}

impl FromStr for UniqueId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| ValidationError::MalformedIdentifier {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let components = split_components(s).map_err(malformed)?;
        let mut parts = components.into_iter();
        let scheme = parts.next().unwrap_or_default();
        let value = parts.next().ok_or_else(|| malformed("missing value"))?;
        let version = parts.next();
        if parts.next().is_some() {
            return Err(malformed("too many components"));
        }
        if scheme.is_empty() {
            return Err(malformed("scheme cannot be empty"));
        }
        if value.is_empty() {
            return Err(malformed("value cannot be empty"));
        }

        match version {
            Some(version) if version.is_empty() => Err(malformed("version cannot be empty")),
            Some(version) => Ok(Self::of(scheme, value, version)),
            None => Ok(Self::latest(scheme, value)),
        }
    }
}

/// An identifier issued by an external system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalId {
    pub scheme: String,
    pub value: String,
}

impl ExternalId {
    #[must_use]
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.scheme, self.value)
    }
}

/// A set of external identifiers that all denote the same thing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalIdBundle(BTreeSet<ExternalId>);

impl ExternalIdBundle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn of(id: ExternalId) -> Self {
        Self(BTreeSet::from([id]))
    }

    /// Returns a bundle with `id` added.
    #[must_use]
    pub fn with(mut self, id: ExternalId) -> Self {
        self.0.insert(id);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExternalId> {
        self.0.iter()
    }

    /// True when the two bundles share at least one identifier.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.0.iter().any(|id| other.0.contains(id))
    }
}

impl FromIterator<ExternalId> for ExternalIdBundle {
    fn from_iter<I: IntoIterator<Item = ExternalId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ExternalIdBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}")?;
        }
        f.write_str("]")
    }
}
