//! In-memory storage backend.
//!
//! This module provides a thread-safe, append-only, versioned entity store
//! implementing [`ObjectResolver`] and [`SecuritySource`]. It is intended for
//! embedded usage, tests, and as a reference implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::domain::{
    PortfolioNode, Position, Security, SimplePortfolio, SimplePortfolioNode, SimplePosition, SimpleTrade,
    Trade,
};
use crate::error::ValidationError;
use crate::id::{ExternalIdBundle, ObjectId, UniqueId};
use crate::storage::traits::{ObjectResolver, SecuritySource, StorageError};
use crate::target::Target;
use crate::version::VersionCorrection;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug, Clone)]
struct StoredVersion {
    version_from: DateTime<Utc>,
    unique_id: UniqueId,
    target: Target,
}

#[derive(Debug, Default)]
struct StoreState {
    /// Versions per object, ascending by `version_from`.
    versions: HashMap<ObjectId, Vec<StoredVersion>>,
    /// Object ids of stored securities, in first-insertion order.
    securities: Vec<ObjectId>,
}

impl StoreState {
    fn exact(&self, unique_id: &UniqueId) -> Option<&StoredVersion> {
        self.versions
            .get(&unique_id.object_id())?
            .iter()
            .find(|v| &v.unique_id == unique_id)
    }

    fn current(&self, object_id: &ObjectId, vc: &VersionCorrection) -> Option<&StoredVersion> {
        self.versions
            .get(object_id)?
            .iter()
            .rev()
            .find(|v| vc.admits(v.version_from))
    }

    fn lookup(&self, unique_id: &UniqueId, vc: &VersionCorrection) -> Option<&StoredVersion> {
        if unique_id.is_versioned() {
            self.exact(unique_id)
        } else {
            self.current(&unique_id.object_id(), vc)
        }
    }

    fn security_by_external_ids(
        &self,
        external_ids: &ExternalIdBundle,
        vc: &VersionCorrection,
    ) -> Option<Arc<Security>> {
        self.securities.iter().find_map(|object_id| {
            let version = self.current(object_id, vc)?;
            match &version.target {
                Target::Security(security) if security.external_ids.intersects(external_ids) => {
                    Some(Arc::clone(security))
                }
                _ => None,
            }
        })
    }

    /// Rejects a version that could not be appended to its object's history.
    fn check(&self, unique_id: &UniqueId, version_from: DateTime<Utc>) -> Result<(), StorageError> {
        if !unique_id.is_versioned() {
            return Err(ValidationError::UnversionedIdentifier {
                id: unique_id.to_string(),
            }
            .into());
        }
        let object_id = unique_id.object_id();
        let Some(versions) = self.versions.get(&object_id) else {
            return Ok(());
        };
        if versions.iter().any(|v| &v.unique_id == unique_id) {
            return Err(StorageError::DuplicateKey(unique_id.to_string()));
        }
        if let Some(last) = versions.last() {
            if version_from < last.version_from {
                return Err(StorageError::Backend(format!(
                    "versions of {object_id} must be appended in time order: {version_from} < {}",
                    last.version_from
                )));
            }
        }
        Ok(())
    }

    /// Checks every staged version, then appends all of them.
    ///
    /// Nothing is written unless the whole batch is accepted.
    fn commit(&mut self, batch: Batch, version_from: DateTime<Utc>) -> Result<(), StorageError> {
        let mut staged = HashSet::new();
        for (unique_id, _) in &batch.entries {
            self.check(unique_id, version_from)?;
            if !staged.insert(unique_id) {
                return Err(StorageError::DuplicateKey(unique_id.to_string()));
            }
        }
        for (unique_id, target) in batch.entries {
            self.append(unique_id, target, version_from);
        }
        Ok(())
    }

    fn append(&mut self, unique_id: UniqueId, target: Target, version_from: DateTime<Utc>) {
        let object_id = unique_id.object_id();
        let is_security = matches!(target, Target::Security(_));
        let versions = self.versions.entry(object_id.clone()).or_default();
        let first_version = versions.is_empty();
        versions.push(StoredVersion {
            version_from,
            unique_id,
            target,
        });
        if is_security && first_version {
            self.securities.push(object_id);
        }
    }

    fn stage_node(&self, batch: &mut Batch, node: &Arc<SimplePortfolioNode>) {
        batch.push(&node.unique_id, Target::PortfolioNode(Arc::clone(node) as Arc<dyn PortfolioNode>));
        for child in &node.child_nodes {
            self.stage_node(batch, child);
        }
        for position in &node.positions {
            self.stage_position(batch, position);
        }
    }

    fn stage_position(&self, batch: &mut Batch, position: &Arc<SimplePosition>) {
        batch.push(&position.unique_id, Target::Position(Arc::clone(position) as Arc<dyn Position>));
        self.stage_attached_security(batch, position.security_link.target.as_ref());
        for trade in &position.trades {
            self.stage_trade(batch, trade);
        }
    }

    fn stage_trade(&self, batch: &mut Batch, trade: &Arc<SimpleTrade>) {
        batch.push(&trade.unique_id, Target::Trade(Arc::clone(trade) as Arc<dyn Trade>));
        self.stage_attached_security(batch, trade.security_link.target.as_ref());
    }

    /// Attached securities are shared between entities; each is stored once.
    fn stage_attached_security(&self, batch: &mut Batch, security: Option<&Arc<Security>>) {
        if let Some(security) = security {
            if self.exact(&security.unique_id).is_none() && !batch.contains(&security.unique_id) {
                batch.push(&security.unique_id, Target::Security(Arc::clone(security)));
            }
        }
    }
}

/// Versions written by one call.
#[derive(Default)]
struct Batch {
    entries: Vec<(UniqueId, Target)>,
}

impl Batch {
    fn push(&mut self, unique_id: &UniqueId, target: Target) {
        self.entries.push((unique_id.clone(), target));
    }

    fn contains(&self, unique_id: &UniqueId) -> bool {
        self.entries.iter().any(|(id, _)| id == unique_id)
    }
}

/// Thread-safe in-memory object store.
///
/// Every stored entity must carry a versioned `UniqueId`. Storing a new
/// version of an existing object appends to its history; nothing is ever
/// overwritten.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    state: RwLock<StoreState>,
}

impl InMemoryObjectStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a portfolio and every node, position, trade and attached security
    /// beneath it, all visible from `at`.
    ///
    /// The tree is written as a whole: if any entity is rejected, nothing is stored.
    pub fn add_portfolio_tree(&self, portfolio: &SimplePortfolio, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.add_portfolio_tree"))?;
        let mut batch = Batch::default();
        batch.push(&portfolio.unique_id, Target::Portfolio(Arc::new(portfolio.clone())));
        state.stage_node(&mut batch, &portfolio.root_node);
        state.commit(batch, at)
    }

    /// Store a single node (and the subtree beneath it).
    pub fn add_node(&self, node: SimplePortfolioNode, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.add_node"))?;
        let mut batch = Batch::default();
        state.stage_node(&mut batch, &Arc::new(node));
        state.commit(batch, at)
    }

    /// Store a single position and its trades.
    pub fn add_position(&self, position: SimplePosition, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.add_position"))?;
        let mut batch = Batch::default();
        state.stage_position(&mut batch, &Arc::new(position));
        state.commit(batch, at)
    }

    pub fn add_trade(&self, trade: SimpleTrade, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.add_trade"))?;
        let mut batch = Batch::default();
        state.stage_trade(&mut batch, &Arc::new(trade));
        state.commit(batch, at)
    }

    pub fn add_security(&self, security: Security, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.add_security"))?;
        let mut batch = Batch::default();
        let unique_id = security.unique_id.clone();
        batch.push(&unique_id, Target::Security(Arc::new(security)));
        state.commit(batch, at)
    }

    /// Number of stored versions across all objects.
    pub fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("store.len"))?;
        Ok(state.versions.values().map(Vec::len).sum())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl ObjectResolver for InMemoryObjectStore {
    fn resolve_object(
        &self,
        unique_id: &UniqueId,
        version_correction: &VersionCorrection,
    ) -> Result<Option<Target>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("store.resolve_object"))?;
        Ok(state
            .lookup(unique_id, version_correction)
            .map(|v| v.target.clone()))
    }

    fn resolve_external_id(
        &self,
        external_ids: &ExternalIdBundle,
        version_correction: &VersionCorrection,
    ) -> Result<Option<UniqueId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("store.resolve_external_id"))?;
        Ok(state
            .security_by_external_ids(external_ids, version_correction)
            .map(|security| security.unique_id.clone()))
    }
}

impl SecuritySource for InMemoryObjectStore {
    fn get_by_external_ids(
        &self,
        external_ids: &ExternalIdBundle,
        version_correction: &VersionCorrection,
    ) -> Result<Arc<Security>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("security.get_by_external_ids"))?;
        state
            .security_by_external_ids(external_ids, version_correction)
            .ok_or_else(|| StorageError::NotFound(format!("security {external_ids}")))
    }

    fn get_by_object_id(
        &self,
        object_id: &ObjectId,
        version_correction: &VersionCorrection,
    ) -> Result<Arc<Security>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("security.get_by_object_id"))?;
        match state.current(object_id, version_correction).map(|v| &v.target) {
            Some(Target::Security(security)) => Ok(Arc::clone(security)),
            _ => Err(StorageError::NotFound(format!("security {object_id}"))),
        }
    }
}
