use thiserror::Error;

use crate::network::{Component, CoreId, Destination};

/// Construction-time failures. A model is never built from a partially valid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required config section `{0}` not found")]
    MissingSection(&'static str),
    #[error("cannot deserialize config section `{section}`: {source}")]
    Parse {
        section: &'static str,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("cluster size ({0}) must be a perfect square")]
    ClusterSizeNotSquare(u32),
    #[error("mesh width ({width}) must be a multiple of sqrt cluster size ({sqrt_cluster_size})")]
    MeshWidthNotMultiple { width: u32, sqrt_cluster_size: u32 },
    #[error("mesh width ({width}), mesh height ({height}): height must be width + 1")]
    MeshHeightMismatch { width: u32, height: u32 },
    #[error("mesh width ({width}) x mesh height ({height}) does not match core count ({total_cores})")]
    MeshCoreCountMismatch {
        width: u32,
        height: u32,
        total_cores: u32,
    },
    #[error("gather ({gather} GHz) and scatter ({scatter} GHz) networks must have the same frequency")]
    FrequencyMismatch { gather: f64, scatter: f64 },
    #[error("unrecognized link type `{0}`")]
    UnknownLinkType(String),
    #[error("link model parameters for `{0}` not found in [link_model]")]
    MissingLinkParams(&'static str),
    #[error("power parameters for link type `{0}` not found in [link_model]")]
    MissingLinkPowerParams(&'static str),
    #[error("unrecognized queue model `{0}`")]
    UnknownQueueModel(String),
    #[error("unrecognized network model `{0}`")]
    UnknownNetworkModel(String),
    #[error("num memory controllers ({requested}) exceeds number of complete clusters ({available})")]
    TooManyMemoryControllers { requested: usize, available: usize },
}

/// Protocol and consistency violations detected while routing. These are never recovered from.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("core {core}: unhandled network component {specific:?}")]
    UnhandledComponent {
        core: CoreId,
        specific: Option<Component>,
    },
    #[error("core {core}: packet receiver {receiver:?} does not match this core")]
    ReceiverMismatch { core: CoreId, receiver: Destination },
    #[error(
        "core {core}: routing function not defined: sender({sender}), receiver({receiver:?}), specific({specific:?}), time({time})"
    )]
    UndefinedRoute {
        core: CoreId,
        sender: CoreId,
        receiver: Destination,
        specific: Option<Component>,
        time: u64,
    },
    #[error("core {core}: packet sender {sender} must originate on this core")]
    SenderMismatch { core: CoreId, sender: CoreId },
    #[error(
        "receiver hub {core} (cluster {hub_cluster}) got packet for receiver {receiver} (cluster {receiver_cluster})"
    )]
    HubClusterMismatch {
        core: CoreId,
        hub_cluster: usize,
        receiver: CoreId,
        receiver_cluster: usize,
    },
    #[error("sender hub {core}: sender cluster ({sender_cluster}) differs from hub cluster ({hub_cluster})")]
    SenderClusterMismatch {
        core: CoreId,
        sender_cluster: usize,
        hub_cluster: usize,
    },
    #[error("got invalid receiver id {0}")]
    InvalidReceiver(CoreId),
    #[error("got invalid sender id {0}")]
    InvalidSender(CoreId),
    #[error("requester {0} out of range")]
    InvalidRequester(CoreId),
    #[error("core {0} does not own an optical hub")]
    NotAHub(CoreId),
    #[error("no model registered for hub core {0}")]
    HubNotRegistered(CoreId),
}
