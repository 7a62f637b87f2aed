//! Cluster metadata kept by an instance: bootstrap state, stores, regions
//! and the id allocator.
//!
//! Every mutation is written through to a bincode snapshot inside the data
//! directory so a restarted instance sees the same cluster.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::error;

use crate::proto::metapb::Peer;
use crate::proto::metapb::Region;
use crate::proto::metapb::Store;
use crate::proto::pdpb::ErrorType;
use crate::Result;
use crate::ServerError;
use crate::ALLOC_ID_BASE;

/// A region together with the peer that last reported itself as its leader
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub region: Region,
    pub leader: Option<Peer>,
}

impl RegionInfo {
    pub fn new(
        region: Region,
        leader: Option<Peer>,
    ) -> Self {
        Self { region, leader }
    }
}

/// Rejection reported back inside a response header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoError {
    pub error_type: ErrorType,
    pub message: String,
}

impl ProtoError {
    pub fn new(
        error_type: ErrorType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            message: message.into(),
        }
    }

    fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Unknown, message)
    }
}

pub type ProtoResult<T> = std::result::Result<T, ProtoError>;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ClusterMeta {
    bootstrapped: bool,
    stores: BTreeMap<u64, Store>,
    regions: BTreeMap<u64, RegionInfo>,
    next_id: u64,
}

pub(crate) struct ClusterStore {
    path: PathBuf,
    meta: RwLock<ClusterMeta>,
}

impl ClusterStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            meta: RwLock::new(ClusterMeta {
                next_id: ALLOC_ID_BASE,
                ..Default::default()
            }),
        }
    }

    /// Loads the snapshot if one exists; a fresh data directory keeps the
    /// empty state.
    pub(crate) fn load(&self) -> Result<()> {
        if !self.path.exists() {
            debug!(path = ?self.path, "no cluster snapshot, starting empty");
            return Ok(());
        }
        let bytes = std::fs::read(&self.path)?;
        let meta: ClusterMeta = bincode::deserialize(&bytes).map_err(ServerError::from)?;
        debug!(
            path = ?self.path,
            stores = meta.stores.len(),
            regions = meta.regions.len(),
            "cluster snapshot loaded"
        );
        *self.meta.write() = meta;
        Ok(())
    }

    pub(crate) fn is_bootstrapped(&self) -> bool {
        self.meta.read().bootstrapped
    }

    /// Seeds the cluster with its first store and region.
    pub(crate) fn bootstrap(
        &self,
        store: Option<Store>,
        region: Option<Region>,
    ) -> ProtoResult<()> {
        let store = store.ok_or_else(|| ProtoError::unknown("missing store meta for bootstrap"))?;
        let region = region.ok_or_else(|| ProtoError::unknown("missing region meta for bootstrap"))?;
        check_bootstrap_request(&store, &region)?;

        let mut meta = self.meta.write();
        if meta.bootstrapped {
            return Err(ProtoError::new(ErrorType::AlreadyBootstrapped, "cluster is already bootstrapped"));
        }

        let mut next = meta.clone();
        next.bootstrapped = true;
        next.stores.insert(store.id, store);
        next.regions.insert(region.id, RegionInfo::new(region, None));
        self.commit(&mut meta, next)
    }

    pub(crate) fn put_store(
        &self,
        store: Option<Store>,
    ) -> ProtoResult<()> {
        let store = store.ok_or_else(|| ProtoError::unknown("missing store"))?;
        if store.id == 0 {
            return Err(ProtoError::unknown("invalid zero store id"));
        }

        let mut meta = self.meta.write();
        ensure_bootstrapped(&meta)?;
        if let Some(existing) = meta.stores.get(&store.id) {
            if existing.state() == crate::proto::metapb::StoreState::Tombstone {
                return Err(ProtoError::new(
                    ErrorType::StoreTombstone,
                    format!("store {} is tombstone", store.id),
                ));
            }
        }

        let mut next = meta.clone();
        next.stores.insert(store.id, store);
        self.commit(&mut meta, next)
    }

    /// Applies one region heartbeat. A missing leader is accepted; a region
    /// whose epoch is older than the known one is rejected as stale.
    pub(crate) fn region_heartbeat(
        &self,
        region: Option<Region>,
        leader: Option<Peer>,
    ) -> ProtoResult<()> {
        let region = region.ok_or_else(|| ProtoError::unknown("missing region"))?;
        if region.id == 0 {
            return Err(ProtoError::unknown("invalid zero region id"));
        }

        let mut meta = self.meta.write();
        ensure_bootstrapped(&meta)?;
        if let Some(known) = meta.regions.get(&region.id) {
            if region.epoch().is_stale_against(&known.region.epoch()) {
                return Err(ProtoError::new(
                    ErrorType::StaleRegion,
                    format!(
                        "region {} epoch {:?} is older than {:?}",
                        region.id,
                        region.epoch(),
                        known.region.epoch()
                    ),
                ));
            }
        }

        let mut next = meta.clone();
        next.regions.insert(region.id, RegionInfo::new(region, leader));
        self.commit(&mut meta, next)
    }

    pub(crate) fn alloc_id(&self) -> ProtoResult<u64> {
        let mut meta = self.meta.write();
        let id = meta.next_id;
        let mut next = meta.clone();
        next.next_id = id + 1;
        self.commit(&mut meta, next)?;
        Ok(id)
    }

    pub(crate) fn get_store(
        &self,
        store_id: u64,
    ) -> Option<Store> {
        self.meta.read().stores.get(&store_id).cloned()
    }

    pub(crate) fn stores(&self) -> Vec<Store> {
        self.meta.read().stores.values().cloned().collect()
    }

    pub(crate) fn get_region(
        &self,
        region_id: u64,
    ) -> Option<RegionInfo> {
        self.meta.read().regions.get(&region_id).cloned()
    }

    pub(crate) fn regions(&self) -> Vec<RegionInfo> {
        self.meta.read().regions.values().cloned().collect()
    }

    /// Persists `next` and only then makes it visible.
    ///
    /// The snapshot is written synchronously while the caller holds the
    /// write lock, so a write blocks the calling runtime worker. Snapshots
    /// stay small (one test cluster's stores and regions) and writers are
    /// serialized by the lock, so no two renames race on the same path.
    fn commit(
        &self,
        current: &mut ClusterMeta,
        next: ClusterMeta,
    ) -> ProtoResult<()> {
        if let Err(e) = persist(&self.path, &next) {
            error!(path = ?self.path, "failed to persist cluster metadata: {:?}", e);
            return Err(ProtoError::unknown(format!("persist cluster metadata: {e}")));
        }
        *current = next;
        Ok(())
    }
}

fn ensure_bootstrapped(meta: &ClusterMeta) -> ProtoResult<()> {
    if !meta.bootstrapped {
        return Err(ProtoError::new(ErrorType::NotBootstrapped, "cluster is not bootstrapped"));
    }
    Ok(())
}

fn check_bootstrap_request(
    store: &Store,
    region: &Region,
) -> ProtoResult<()> {
    if store.id == 0 {
        return Err(ProtoError::unknown("invalid zero store id"));
    }
    if region.id == 0 {
        return Err(ProtoError::unknown("invalid zero region id"));
    }
    if !region.start_key.is_empty() || !region.end_key.is_empty() {
        return Err(ProtoError::unknown(format!(
            "first region {} must cover the whole key range",
            region.id
        )));
    }
    if region.peers.len() != 1 {
        return Err(ProtoError::unknown(format!(
            "first region must have exactly one peer, got {}",
            region.peers.len()
        )));
    }
    let peer = &region.peers[0];
    if peer.store_id != store.id {
        return Err(ProtoError::unknown(format!(
            "peer {} is on store {}, expected store {}",
            peer.id, peer.store_id, store.id
        )));
    }
    if peer.id == 0 {
        return Err(ProtoError::unknown("invalid zero peer id"));
    }
    Ok(())
}

/// Writes to a sibling temp file then renames it over `path`.
fn persist(
    path: &Path,
    meta: &ClusterMeta,
) -> Result<()> {
    let bytes = bincode::serialize(meta).map_err(ServerError::from)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
