use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::id::{ExternalId, ExternalIdBundle, ObjectId, UniqueId};

/// A tradable instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub unique_id: UniqueId,
    pub name: String,
    pub security_type: String,
    #[serde(default)]
    pub external_ids: ExternalIdBundle,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Security {
    #[must_use]
    pub fn new(unique_id: UniqueId, name: impl Into<String>, security_type: impl Into<String>) -> Self {
        Self {
            unique_id,
            name: name.into(),
            security_type: security_type.into(),
            external_ids: ExternalIdBundle::new(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_external_id(mut self, id: ExternalId) -> Self {
        self.external_ids = self.external_ids.with(id);
        self
    }
}

/// A reference from a position or trade to its security.
///
/// The link either carries the security itself or the identifiers needed to
/// look it up. Looking it up is the resolve context's job, not the link's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<ObjectId>,
    #[serde(default)]
    pub external_ids: ExternalIdBundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Arc<Security>>,
}

impl SecurityLink {
    /// A link that must be resolved through the external identifiers.
    #[must_use]
    pub fn by_external_ids(external_ids: ExternalIdBundle) -> Self {
        Self {
            object_id: None,
            external_ids,
            target: None,
        }
    }

    /// A link that must be resolved through the security's object id.
    #[must_use]
    pub fn by_object_id(object_id: ObjectId) -> Self {
        Self {
            object_id: Some(object_id),
            external_ids: ExternalIdBundle::new(),
            target: None,
        }
    }

    /// A link with the security already attached.
    #[must_use]
    pub fn resolved(security: Arc<Security>) -> Self {
        Self {
            object_id: Some(security.unique_id.object_id()),
            external_ids: security.external_ids.clone(),
            target: Some(security),
        }
    }

    /// Returns a copy of this link with `security` attached.
    #[must_use]
    pub fn with_target(&self, security: Arc<Security>) -> Self {
        Self {
            object_id: self.object_id.clone(),
            external_ids: self.external_ids.clone(),
            target: Some(security),
        }
    }

    /// Returns a copy of this link without the attached security.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            object_id: self.object_id.clone(),
            external_ids: self.external_ids.clone(),
            target: None,
        }
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.target.is_some()
    }
}

impl fmt::Display for SecurityLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecurityLink[")?;
        if let Some(object_id) = &self.object_id {
            write!(f, "object_id={object_id}, ")?;
        }
        write!(f, "external_ids={}", self.external_ids)?;
        if let Some(target) = &self.target {
            write!(f, ", target={}", target.unique_id)?;
        }
        f.write_str("]")
    }
}

/// The other side of a trade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counterparty {
    pub external_id: ExternalId,
}

impl Counterparty {
    #[must_use]
    pub const fn new(external_id: ExternalId) -> Self {
        Self { external_id }
    }
}

impl Default for Counterparty {
    fn default() -> Self {
        Self::new(ExternalId::new("CPARTY", "DEFAULT"))
    }
}
