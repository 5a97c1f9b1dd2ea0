pub mod metrics;
pub mod tracer;

use clap::Args;
use std::net::SocketAddr;
use tracing::level_filters::LevelFilter;

/// Raw value of the flat amplitude and time arrays, as stored by the digitiser.
pub type Sample = f32;
/// Type used for every quantity derived from the raw samples.
pub type Real = f64;

pub type RunId = i32;
pub type EventId = i32;
pub type TriggerId = i32;

pub const SAMPLES_PER_CHANNEL: usize = 1024;
pub const CHANNELS_PER_MODULE: usize = 18;
pub const CHANNELS_PER_GROUP: usize = 9;
pub const NUM_MODULES: usize = 2;

/// Nominal DRS sampling interval in ns (5 GS/s).
pub const SAMPLE_TIME_NS: Real = 0.2;

/// Options shared by every binary in the workspace.
#[derive(Clone, Debug, Args)]
pub struct CommonOpts {
    /// If set, a prometheus exporter is bound to this address.
    #[clap(long, env)]
    pub observability_address: Option<SocketAddr>,

    /// Level used by the stdout tracer when `RUST_LOG` is not set.
    #[clap(long, default_value = "info")]
    pub log_level: LevelFilter,
}
