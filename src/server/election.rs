//! Leader election among the members of `initial_cluster`.
//!
//! Members are ranked by their position in the initial cluster. On every tick
//! an instance probes the other members over their peer sockets and leads iff
//! it can see a majority (itself included), no live member ranks lower, and
//! no live member already claims leadership. An instance that leads keeps
//! leading until a lower ranked member shows up or it loses its majority.

use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
#[cfg(test)]
use mockall::automock;
use tonic::async_trait;
use tonic::transport::Channel;
use tracing::debug;
use tracing::trace;

use crate::proto::peerpb::peer_client::PeerClient;
use crate::proto::peerpb::PingRequest;
use crate::transport::unix_channel;
use crate::ClusterMember;

/// What a live peer reported about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerStatus {
    pub is_leader: bool,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PeerProber: Send + Sync + 'static {
    /// Probes the member listening on `peer_url`; `None` when unreachable.
    async fn probe(
        &self,
        peer_url: &str,
    ) -> Option<PeerStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AlivePeer {
    pub rank: usize,
    pub is_leader: bool,
}

/// Leadership decision for the member at `rank` given the live peers it sees.
pub(crate) fn should_lead(
    rank: usize,
    member_count: usize,
    alive: &[AlivePeer],
    currently_leader: bool,
) -> bool {
    let has_quorum = (alive.len() + 1) * 2 > member_count;
    if !has_quorum {
        return false;
    }
    if alive.iter().any(|p| p.rank < rank) {
        return false;
    }
    currently_leader || !alive.iter().any(|p| p.is_leader)
}

pub(crate) struct Elector<P: PeerProber> {
    rank: usize,
    members: Vec<ClusterMember>,
    prober: P,
}

impl<P: PeerProber> Elector<P> {
    pub(crate) fn new(
        rank: usize,
        members: Vec<ClusterMember>,
        prober: P,
    ) -> Self {
        Self { rank, members, prober }
    }

    /// One election round.
    pub(crate) async fn tick(
        &self,
        currently_leader: bool,
    ) -> bool {
        let probes = self
            .members
            .iter()
            .enumerate()
            .filter(|(rank, _)| *rank != self.rank)
            .map(|(rank, member)| async move {
                self.prober
                    .probe(&member.peer_url)
                    .await
                    .map(|status| AlivePeer {
                        rank,
                        is_leader: status.is_leader,
                    })
            });
        let alive: Vec<AlivePeer> = join_all(probes).await.into_iter().flatten().collect();
        trace!(rank = self.rank, ?alive, "election round");

        should_lead(self.rank, self.members.len(), &alive, currently_leader)
    }
}

/// Probes peers with the `peerpb.Peer/Ping` call, caching one channel per url.
pub(crate) struct GrpcPeerProber {
    from: String,
    cluster_id: u64,
    timeout: Duration,
    pub(crate) channels: DashMap<String, PeerClient<Channel>>,
}

impl GrpcPeerProber {
    pub(crate) fn new(
        from: String,
        cluster_id: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            from,
            cluster_id,
            timeout,
            channels: DashMap::new(),
        }
    }

    async fn client(
        &self,
        peer_url: &str,
    ) -> Option<PeerClient<Channel>> {
        if let Some(client) = self.channels.get(peer_url) {
            return Some(client.clone());
        }
        let channel = match tokio::time::timeout(self.timeout, unix_channel(peer_url)).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                trace!(peer_url, "peer unreachable: {:?}", e);
                return None;
            }
            Err(_) => return None,
        };
        let client = PeerClient::new(channel);
        self.channels.insert(peer_url.to_string(), client.clone());
        Some(client)
    }
}

#[async_trait]
impl PeerProber for GrpcPeerProber {
    async fn probe(
        &self,
        peer_url: &str,
    ) -> Option<PeerStatus> {
        let mut client = self.client(peer_url).await?;
        let request = PingRequest {
            from: self.from.clone(),
            cluster_id: self.cluster_id,
        };
        match tokio::time::timeout(self.timeout, client.ping(request)).await {
            Ok(Ok(resp)) => Some(PeerStatus {
                is_leader: resp.into_inner().is_leader,
            }),
            Ok(Err(status)) => {
                debug!(peer_url, "ping rejected: {}", status);
                self.channels.remove(peer_url);
                None
            }
            Err(_) => {
                self.channels.remove(peer_url);
                None
            }
        }
    }
}
