//! Input/output strategies for the VM.
//!
//! The executor only knows the [`InputPort`] and [`OutputPort`] traits. Reads
//! and writes are the VM's only suspension points: a channel-backed port
//! parks the VM task until the other endpoint acts.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::runtime::channel::{Receiver, Sender};
use crate::runtime::runtime_error::PortError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of values for the Input instruction.
pub trait InputPort: Send {
    fn read(&mut self) -> impl Future<Output = Result<i64, PortError>> + Send;

    /// Called when the VM halts or faults.
    fn close(&mut self) {}
}

/// Sink for the Output instruction.
pub trait OutputPort: Send {
    fn write(&mut self, value: i64) -> impl Future<Output = Result<(), PortError>> + Send;

    /// Called when the VM halts or faults. Ports that have nothing to release
    /// ignore it.
    fn close(&mut self) {}
}

/// Runs immediately before every blocking Input read.
pub trait InputHook: Send {
    fn before_input(&mut self) -> BoxFuture<'_, Result<(), PortError>>;
}

impl<F> InputHook for F
where
    F: FnMut() -> Result<(), PortError> + Send,
{
    fn before_input(&mut self) -> BoxFuture<'_, Result<(), PortError>> {
        let result = self();
        Box::pin(async move { result })
    }
}

// =============================================================================
// Channel-backed ports
// =============================================================================

impl InputPort for Receiver {
    async fn read(&mut self) -> Result<i64, PortError> {
        self.receive().await.ok_or(PortError::Closed)
    }

    fn close(&mut self) {
        Receiver::close(self);
    }
}

impl OutputPort for Sender {
    async fn write(&mut self, value: i64) -> Result<(), PortError> {
        self.send(value).await
    }

    fn close(&mut self) {
        Sender::close(self);
    }
}

/// Pre-input hook that tells a driver task the VM is waiting for input.
///
/// The driver owns all the state the next value depends on, so the VM only
/// signals demand and the driver answers on the input channel.
#[derive(Debug, Clone)]
pub struct InputDemand {
    signal: mpsc::Sender<()>,
}

impl InputDemand {
    pub fn new() -> (Self, mpsc::Receiver<()>) {
        let (signal, requests) = mpsc::channel(1);
        (InputDemand { signal }, requests)
    }
}

impl InputHook for InputDemand {
    fn before_input(&mut self) -> BoxFuture<'_, Result<(), PortError>> {
        Box::pin(async move {
            self.signal
                .send(())
                .await
                .map_err(|_| PortError::Hook("driver stopped listening for input requests".into()))
        })
    }
}

// =============================================================================
// In-memory ports
// =============================================================================

/// Feeds a fixed list of values; reading past the end is `PortError::Closed`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    values: VecDeque<i64>,
}

impl ScriptedInput {
    pub fn new(values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

impl InputPort for ScriptedInput {
    async fn read(&mut self) -> Result<i64, PortError> {
        self.values.pop_front().ok_or(PortError::Closed)
    }
}

/// Accumulates every output value.
#[derive(Debug, Clone, Default)]
pub struct CollectedOutput {
    values: Vec<i64>,
}

impl CollectedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn take(&mut self) -> Vec<i64> {
        std::mem::take(&mut self.values)
    }
}

impl OutputPort for CollectedOutput {
    async fn write(&mut self, value: i64) -> Result<(), PortError> {
        self.values.push(value);
        Ok(())
    }
}

// =============================================================================
// Console ports
// =============================================================================

/// Prompts on stdout and parses one integer per line from stdin, asking again
/// until the line is a valid integer.
pub struct ConsoleInput {
    lines: Lines<BufReader<Stdin>>,
    stdout: Stdout,
}

impl ConsoleInput {
    const PROMPT: &'static str = "input> ";

    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            stdout: tokio::io::stdout(),
        }
    }
}

impl Default for ConsoleInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputPort for ConsoleInput {
    async fn read(&mut self) -> Result<i64, PortError> {
        loop {
            self.stdout.write_all(Self::PROMPT.as_bytes()).await?;
            self.stdout.flush().await?;

            let Some(line) = self.lines.next_line().await? else {
                debug!("stdin reached end of file");
                return Err(PortError::Closed);
            };

            match line.trim().parse::<i64>() {
                Ok(value) => return Ok(value),
                Err(_) => {
                    warn!(entry = %line.trim(), "not an integer");
                    self.stdout.write_all(b"please enter an integer\n").await?;
                }
            }
        }
    }
}

/// Prints each output value on its own line.
pub struct ConsoleOutput {
    stdout: Stdout,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self {
            stdout: tokio::io::stdout(),
        }
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputPort for ConsoleOutput {
    async fn write(&mut self, value: i64) -> Result<(), PortError> {
        self.stdout.write_all(format!("{}\n", value).as_bytes()).await?;
        self.stdout.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::channel::channel;

    #[tokio::test]
    async fn test_scripted_input() {
        let mut input = ScriptedInput::new([5, -2]);
        assert_eq!(input.read().await.unwrap(), 5);
        assert_eq!(input.remaining(), 1);
        assert_eq!(input.read().await.unwrap(), -2);
        assert!(matches!(input.read().await, Err(PortError::Closed)));
    }

    #[tokio::test]
    async fn test_collected_output() {
        let mut output = CollectedOutput::new();
        output.write(1).await.unwrap();
        output.write(2).await.unwrap();
        output.close();
        output.write(3).await.unwrap();
        assert_eq!(output.values(), &[1, 2, 3]);
        assert_eq!(output.take(), vec![1, 2, 3]);
        assert!(output.values().is_empty());
    }

    #[tokio::test]
    async fn test_channel_ports() {
        let (mut tx, mut rx) = channel();
        OutputPort::write(&mut tx, 11).await.unwrap();
        assert_eq!(InputPort::read(&mut rx).await.unwrap(), 11);

        OutputPort::close(&mut tx);
        assert!(matches!(InputPort::read(&mut rx).await, Err(PortError::Closed)));

        let (tx, mut rx) = channel();
        InputPort::close(&mut rx);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_input_demand() {
        let (mut hook, mut requests) = InputDemand::new();
        hook.before_input().await.unwrap();
        assert_eq!(requests.recv().await, Some(()));

        drop(requests);
        assert!(matches!(hook.before_input().await, Err(PortError::Hook(_))));
    }

    #[tokio::test]
    async fn test_closure_hook() {
        let mut calls = 0;
        {
            let mut hook = || {
                calls += 1;
                Ok::<(), PortError>(())
            };
            hook.before_input().await.unwrap();
            hook.before_input().await.unwrap();
        }
        assert_eq!(calls, 2);
    }
}
