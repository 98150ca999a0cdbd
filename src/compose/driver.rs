use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bytecode::Program;
use crate::compose::ComposeError;
use crate::runtime::channel::{self, Receiver, Sender};
use crate::runtime::io::InputDemand;
use crate::runtime::vm::Vm;

/// Values a driven program emits per record.
pub const RECORD_WIDTH: usize = 3;

/// One `(x, y, payload)` triple emitted by a driven program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub x: i64,
    pub y: i64,
    pub payload: i64,
}

impl Record {
    fn from_slice(values: &[i64]) -> Option<Self> {
        match *values {
            [x, y, payload] => Some(Record { x, y, payload }),
            _ => None,
        }
    }
}

/// Host-side logic of an interactive program.
///
/// `observe` sees every record in emission order. `control` is asked for the
/// next input only once every record emitted before the input request has
/// been observed.
pub trait Controller {
    fn observe(&mut self, record: Record);
    fn control(&mut self) -> i64;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveSummary {
    /// Records handed to the controller.
    pub records: usize,
    /// Inputs answered on the program's behalf.
    pub inputs: usize,
    /// Memory of the VM after it halted.
    pub memory: Vec<i64>,
}

/// Runs `program` on its own task, feeding its output to `controller` in
/// records of three values and answering every input request with
/// [`Controller::control`].
pub async fn drive<C: Controller>(
    program: &Program,
    controller: &mut C,
) -> Result<DriveSummary, ComposeError> {
    let (commands, input) = channel::channel();
    let (output, mut values) = channel::channel();
    let (demand, mut requests) = InputDemand::new();

    let task = Vm::with_io(program.clone(), input, output)
        .with_input_hook(demand)
        .spawn();

    let (records, inputs, pending) =
        pump(controller, &commands, &mut values, &mut requests).await?;
    drop(commands);

    let vm = task
        .await?
        .map_err(|source| ComposeError::Vm { index: 0, source })?;

    if !pending.is_empty() {
        return Err(ComposeError::TruncatedRecord(pending.len()));
    }

    info!(records, inputs, "drive finished");
    Ok(DriveSummary {
        records,
        inputs,
        memory: vm.memory().as_slice().to_vec(),
    })
}

/// Moves values between the VM and the controller until the VM closes its
/// output. Returns the record and input counts plus any unfinished record.
async fn pump<C: Controller>(
    controller: &mut C,
    commands: &Sender,
    values: &mut Receiver,
    requests: &mut mpsc::Receiver<()>,
) -> Result<(usize, usize, Vec<i64>), ComposeError> {
    let mut pending = Vec::with_capacity(RECORD_WIDTH);
    let mut records = 0;
    let mut inputs = 0;

    loop {
        tokio::select! {
            // Output first: anything emitted before an input request is
            // already in the channel when the request arrives.
            biased;

            value = values.receive() => {
                let Some(value) = value else { break };
                pending.push(value);

                if let Some(record) = Record::from_slice(&pending) {
                    controller.observe(record);
                    records += 1;
                    pending.clear();
                }
            }

            Some(()) = requests.recv() => {
                let value = controller.control();
                debug!(value, "answering input request");
                inputs += 1;
                commands.send(value).await?;
            }
        }
    }

    Ok((records, inputs, pending))
}
