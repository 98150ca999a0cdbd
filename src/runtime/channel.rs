//! Closable single-slot channels used to wire VMs together.
//!
//! A channel holds at most one value in flight: [`Sender::send`] suspends
//! until the previous value has been taken by the receiver. Values are
//! delivered in send order.

use tokio::sync::mpsc;

use crate::runtime::runtime_error::PortError;

/// Values in flight per edge.
pub const CAPACITY: usize = 1;

/// Creates a connected pair of endpoints.
pub fn channel() -> (Sender, Receiver) {
    let (tx, rx) = mpsc::channel(CAPACITY);
    (Sender { inner: Some(tx) }, Receiver { inner: rx })
}

/// Sending endpoint. Clones feed the same receiver; the channel closes once
/// every clone is closed or dropped.
#[derive(Debug, Clone)]
pub struct Sender {
    inner: Option<mpsc::Sender<i64>>,
}

impl Sender {
    /// Suspends until the value is accepted. Fails if this endpoint was
    /// closed or the receiver is gone.
    pub async fn send(&self, value: i64) -> Result<(), PortError> {
        let tx = self.inner.as_ref().ok_or(PortError::Closed)?;
        tx.send(value).await.map_err(|_| PortError::Closed)
    }

    /// Releases this endpoint. Idempotent.
    pub fn close(&mut self) {
        self.inner = None;
    }

    /// True once this endpoint is closed or nobody is receiving anymore.
    pub fn is_closed(&self) -> bool {
        self.inner.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

/// Receiving endpoint.
#[derive(Debug)]
pub struct Receiver {
    inner: mpsc::Receiver<i64>,
}

impl Receiver {
    /// Suspends until a value is available. `None` once the channel is
    /// closed and drained.
    pub async fn receive(&mut self) -> Option<i64> {
        self.inner.recv().await
    }

    /// Refuses further sends; a value already in flight can still be
    /// received. Idempotent.
    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
