pub mod config;
pub mod error;
pub mod fingerprint;
pub mod messages;
pub mod neighbor;
pub mod path_vector;
pub mod routing_table;

pub use config::{FingerprintConfig, ProtocolConfig, RetentionPolicy};
pub use error::ConfigError;
pub use fingerprint::Fingerprint;
pub use path_vector::{NextHop, PathVectorSet};
pub use routing_table::{RoutingEntry, RoutingManager};

/// Identifier of an outgoing face (interface/neighbor adjacency).
pub type FaceId = u64;

/// Router identifier, a name URI such as `/net/routerA`.
pub type RouterId = String;

/// Reserved cost marking an unreachable or withdrawn route.
pub const INFINITY_COST: u32 = u32::MAX;

/// Face id reserved for locally originated (direct) routes.
pub const LOCAL_FACE: FaceId = 0;
