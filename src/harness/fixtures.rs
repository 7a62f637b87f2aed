use crate::proto::metapb::Peer;
use crate::proto::metapb::Region;
use crate::proto::metapb::RegionEpoch;
use crate::proto::metapb::Store;
use crate::RegionInfo;

/// Store, peer and region descriptors for one test.
///
/// Built fresh by every test so parallel tests never share them.
#[derive(Debug, Clone, PartialEq)]
pub struct Fixtures {
    pub cluster_id: u64,
    pub store: Store,
    pub peers: Vec<Peer>,
    pub region: Region,
}

impl Fixtures {
    /// Store 1 at `localhost` and region 8 (epoch 1/1) with peer 2 on it.
    pub fn new(cluster_id: u64) -> Self {
        let peers = vec![Peer::new(2, 1)];
        Self {
            cluster_id,
            store: Store::new(1, "localhost"),
            region: Region::new(8, RegionEpoch::new(1, 1), peers.clone()),
            peers,
        }
    }

    /// Heartbeat payload for the bootstrap region, without a leader.
    pub fn region_info(&self) -> RegionInfo {
        RegionInfo::new(self.region.clone(), None)
    }

    /// A store distinct from the bootstrap store.
    pub fn extra_store(
        &self,
        id: u64,
    ) -> Store {
        Store::new(id, format!("127.0.0.1:{}", 20160 + id))
    }
}
