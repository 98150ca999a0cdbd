//! Topologies of VMs connected by channels.
//!
//! - [`chain`]: pipelines and feedback cycles of VMs running one program
//! - [`driver`]: a single VM steered by a controller that sees its output
//!   records and answers its input requests
//! - [`explore`]: a single VM probed move by move until a policy is done,
//!   then cancelled

pub mod chain;
pub mod driver;
pub mod explore;

use thiserror::Error;
use tokio::task::JoinError;

use crate::runtime::runtime_error::{PortError, RuntimeError};

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("vm {index}: {source}")]
    Vm {
        index: usize,
        #[source]
        source: RuntimeError,
    },

    #[error("driver channel failed: {0}")]
    Port(#[from] PortError),

    #[error("vm task did not complete: {0}")]
    Join(#[from] JoinError),

    #[error("topology has no vms")]
    EmptyTopology,

    #[error("no value left the topology")]
    NoOutput,

    #[error("output ended inside a record ({0} trailing values)")]
    TruncatedRecord(usize),

    #[error("unexpected status {0}")]
    UnexpectedStatus(i64),

    #[error("vm stopped before exploration finished")]
    Disconnected,
}

pub use chain::{Wiring, best_phase_setting, run_chain};
pub use driver::{Controller, DriveSummary, Record, drive};
pub use explore::{Direction, ExplorationPolicy, MazeExplorer, Tile, explore};
