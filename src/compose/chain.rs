use itertools::Itertools;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bytecode::Program;
use crate::compose::ComposeError;
use crate::runtime::channel::{self, Receiver, Sender};
use crate::runtime::runtime_error::{ErrorKind, PortError, RuntimeError};
use crate::runtime::vm::{Vm, VmConfig};

/// How the last VM of a chain is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wiring {
    /// The last VM's output only goes to the driver.
    Open,
    /// The driver forwards every value leaving the last VM back into the
    /// first one.
    Feedback,
}

type ChainTask = JoinHandle<Result<Vm<Receiver, Sender>, RuntimeError>>;

/// Runs one VM per phase value, each feeding the next, and returns the last
/// value that left the final VM.
///
/// Every VM first reads its phase, then the first VM reads `initial`. All
/// channels are wired before any VM starts.
pub async fn run_chain(
    program: &Program,
    phases: &[i64],
    initial: i64,
    wiring: Wiring,
) -> Result<i64, ComposeError> {
    run_chain_with_config(program, phases, initial, wiring, VmConfig::default()).await
}

pub async fn run_chain_with_config(
    program: &Program,
    phases: &[i64],
    initial: i64,
    wiring: Wiring,
    config: VmConfig,
) -> Result<i64, ComposeError> {
    if phases.is_empty() {
        return Err(ComposeError::EmptyTopology);
    }

    // Edge i feeds VM i; the exit edge carries the last VM's output.
    let (senders, receivers): (Vec<Sender>, Vec<Receiver>) =
        phases.iter().map(|_| channel::channel()).unzip();
    let (exit_tx, mut exit) = channel::channel();

    // Phases go in while every edge is still empty, so none of these waits.
    for (tx, &phase) in senders.iter().zip(phases) {
        tx.send(phase).await?;
    }

    let downstream = senders.iter().skip(1).cloned().chain(std::iter::once(exit_tx));
    let tasks: Vec<ChainTask> = receivers
        .into_iter()
        .zip(downstream)
        .map(|(input, output)| {
            Vm::with_io(program.clone(), input, output)
                .with_config(config.clone())
                .spawn()
        })
        .collect();

    // Only the entry edge stays with the driver.
    let mut entry = senders.into_iter().next().ok_or(ComposeError::EmptyTopology)?;
    if entry.send(initial).await.is_err() {
        warn!(initial, "first vm halted before reading the initial value");
    }
    if wiring == Wiring::Open {
        entry.close();
    }

    let mut last = None;
    while let Some(value) = exit.receive().await {
        debug!(value, "chain output");
        last = Some(value);

        if wiring == Wiring::Feedback && entry.send(value).await.is_err() {
            warn!(value, "first vm has halted, feedback value dropped");
        }
    }
    entry.close();

    join_all(tasks).await?;

    let result = last.ok_or(ComposeError::NoOutput)?;
    info!(vms = phases.len(), ?wiring, result, "chain finished");
    Ok(result)
}

/// Waits for every VM. When several failed, the reported error is the first
/// one that is not just a consequence of a neighbour closing its channel.
async fn join_all(tasks: Vec<ChainTask>) -> Result<(), ComposeError> {
    let mut failures = Vec::new();
    for (index, task) in tasks.into_iter().enumerate() {
        if let Err(source) = task.await? {
            failures.push(ComposeError::Vm { index, source });
        }
    }

    let root = failures
        .iter()
        .position(|f| {
            !matches!(
                f,
                ComposeError::Vm {
                    source: RuntimeError { kind: ErrorKind::Port(PortError::Closed), .. },
                    ..
                }
            )
        })
        .unwrap_or(0);

    match failures.into_iter().nth(root) {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

/// Tries every ordering of `phases` and returns the highest signal together
/// with the ordering that produced it.
pub async fn best_phase_setting(
    program: &Program,
    phases: &[i64],
    initial: i64,
    wiring: Wiring,
) -> Result<(i64, Vec<i64>), ComposeError> {
    let mut best: Option<(i64, Vec<i64>)> = None;

    for ordering in phases.iter().copied().permutations(phases.len()) {
        let signal = run_chain(program, &ordering, initial, wiring).await?;
        debug!(?ordering, signal, "phase setting tried");

        if best.as_ref().is_none_or(|(top, _)| signal > *top) {
            best = Some((signal, ordering));
        }
    }

    best.ok_or(ComposeError::EmptyTopology)
}
