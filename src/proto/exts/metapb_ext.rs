use crate::proto::metapb::Peer;
use crate::proto::metapb::Region;
use crate::proto::metapb::RegionEpoch;
use crate::proto::metapb::Store;

impl Store {
    pub fn new(
        id: u64,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id,
            address: address.into(),
            ..Default::default()
        }
    }
}

impl Peer {
    pub fn new(
        id: u64,
        store_id: u64,
    ) -> Self {
        Self { id, store_id }
    }
}

impl RegionEpoch {
    pub fn new(
        conf_ver: u64,
        version: u64,
    ) -> Self {
        Self { conf_ver, version }
    }

    /// True if `self` is older than `other` in either dimension.
    pub fn is_stale_against(
        &self,
        other: &RegionEpoch,
    ) -> bool {
        self.conf_ver < other.conf_ver || self.version < other.version
    }
}

impl Region {
    pub fn new(
        id: u64,
        epoch: RegionEpoch,
        peers: Vec<Peer>,
    ) -> Self {
        Self {
            id,
            region_epoch: Some(epoch),
            peers,
            ..Default::default()
        }
    }

    /// Epoch of the region, zeroed when absent
    pub fn epoch(&self) -> RegionEpoch {
        self.region_epoch.clone().unwrap_or_default()
    }

    pub fn peer_on_store(
        &self,
        store_id: u64,
    ) -> Option<&Peer> {
        self.peers.iter().find(|p| p.store_id == store_id)
    }
}
