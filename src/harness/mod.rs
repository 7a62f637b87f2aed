//! Test harness driving placement driver clusters.
//!
//! [`TestCluster`] composes the pieces below: the [`launcher`] starts every
//! configured instance concurrently, the [`leader`] poller waits until one of
//! them leads, and the [`client`] drivers issue `Bootstrap`, `PutStore` and
//! `RegionHeartbeat` against it. Dropping the cluster tears it down.
//!
//! ```rust,ignore
//! let cluster = must_new_cluster(3).await;
//! let mut client = must_new_pd_client(cluster.leader().addr()).await;
//! let fixtures = Fixtures::new(cluster.cluster_id());
//! must_bootstrap_cluster(&mut client, fixtures.cluster_id, fixtures.store.clone(), fixtures.region.clone()).await;
//! ```
//!
//! Every fallible helper has a `must_` twin that panics, for test bodies
//! where any failure should abort the test.

mod client;
mod cluster;
mod fixtures;
pub mod launcher;
pub mod leader;

pub use client::*;
pub use cluster::*;
pub use fixtures::*;
pub use launcher::launch_instances;
pub use launcher::LaunchOutcome;
pub use leader::must_wait_leader;
pub use leader::wait_leader;
