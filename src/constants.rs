//! Addressing and protocol constants shared by the harness and the
//! reference server.

/// Plain local socket scheme
pub const UNIX_SCHEME: &str = "unix://";
/// Secure variant of the local socket scheme; dialed the same way
pub const UNIX_SECURE_SCHEME: &str = "unixs://";

/// Placeholder authority for channels whose connector ignores the uri
pub(crate) const UNIX_CHANNEL_ENDPOINT: &str = "http://[::]:50051";

/// Route prefix of the JSON api served next to the gRPC services
pub const API_PREFIX: &str = "/pd/api/v1";

/// File holding the persisted cluster metadata inside a data directory
pub(crate) const CLUSTER_META_FILE: &str = "cluster.meta";

/// First id handed out by `AllocId`
pub(crate) const ALLOC_ID_BASE: u64 = 1000;
