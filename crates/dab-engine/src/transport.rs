use dab_types::ParamValue;
use thiserror::Error;
use tokio::sync::mpsc;

/// Tag constants distinguishing logical channels over the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    RecvFromDriver,
    RecvFromWorker,
    CommSolution,
    ReqSendInput,
    ReqInput,
    EndSim,
}

/// A dispatch from the driver to one worker: the value vector and the
/// origin agent id.
#[derive(Debug, Clone)]
pub struct DriverMessage {
    pub values: Vec<ParamValue>,
    pub origin: i64,
}

/// A result from one worker back to the driver: the evaluated vector,
/// its fitness, and the origin it was dispatched for.
#[derive(Debug, Clone)]
pub struct WorkerMessage {
    pub values: Vec<ParamValue>,
    pub fitness: f64,
    pub origin: i64,
}

/// Transport-transient failures: logged and skipped at the call site,
/// never propagated out of a tick.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("worker rank {0} is not connected")]
    UnknownRank(usize),
    #[error("channel to rank {0} is closed")]
    Disconnected(usize),
}

/// Per-worker request slot as seen by the driver: `REQINPUT` arrives here
/// before the driver may dispatch, and `ENDSIM` arrives here once the
/// worker is winding down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    ReqInput,
    EndSim,
}

/// Driver-side half of the transport: non-blocking dispatch, posted
/// receives, and a completion test over every worker slot.
pub struct DriverTransport {
    to_worker: Vec<mpsc::Sender<DriverMessage>>,
    signal_rx: mpsc::Receiver<(usize, WorkerSignal)>,
    result_rx: mpsc::Receiver<(usize, WorkerMessage)>,
}

/// Worker-side half: exactly two blocking receive points per iteration,
/// plus the small outbound signal/result sends.
pub struct WorkerTransport {
    pub rank: usize,
    from_driver: mpsc::Receiver<DriverMessage>,
    signal_tx: mpsc::Sender<(usize, WorkerSignal)>,
    result_tx: mpsc::Sender<(usize, WorkerMessage)>,
}

/// Build an in-process transport for `worker_count` workers. Each worker
/// slot is backed by bounded mpsc channels, which gives FIFO-per-pair
/// ordering for free.
pub fn build_in_process(worker_count: usize) -> (DriverTransport, Vec<WorkerTransport>) {
    let mut to_worker = Vec::with_capacity(worker_count);
    let (signal_tx_shared, signal_rx) = mpsc::channel(worker_count.max(1) * 4);
    let (result_tx_shared, result_rx) = mpsc::channel(worker_count.max(1) * 4);
    let mut workers = Vec::with_capacity(worker_count);

    for rank in 0..worker_count {
        let (dtx, drx) = mpsc::channel(4);
        to_worker.push(dtx);
        workers.push(WorkerTransport {
            rank,
            from_driver: drx,
            signal_tx: signal_tx_shared.clone(),
            result_tx: result_tx_shared.clone(),
        });
    }

    (
        DriverTransport {
            to_worker,
            signal_rx,
            result_rx,
        },
        workers,
    )
}

impl DriverTransport {
    pub fn worker_count(&self) -> usize {
        self.to_worker.len()
    }

    /// Non-blocking dispatch of a candidate to `rank`.
    pub fn send(&self, rank: usize, msg: DriverMessage) -> Result<(), TransportError> {
        let sender = self
            .to_worker
            .get(rank)
            .ok_or(TransportError::UnknownRank(rank))?;
        sender
            .try_send(msg)
            .map_err(|_| TransportError::Disconnected(rank))
    }

    /// Drain whatever `REQINPUT`/`ENDSIM` signals are ready without
    /// blocking; the driver's tick must never block on a worker slot.
    pub fn poll_signals(&mut self) -> Vec<(usize, WorkerSignal)> {
        let mut out = Vec::new();
        while let Ok(item) = self.signal_rx.try_recv() {
            out.push(item);
        }
        out
    }

    /// Drain whatever evaluated results are ready without blocking.
    pub fn poll_results(&mut self) -> Vec<(usize, WorkerMessage)> {
        let mut out = Vec::new();
        while let Ok(item) = self.result_rx.try_recv() {
            out.push(item);
        }
        out
    }

    /// Block until at least one signal or result is available, or the
    /// channels close. Used by the driver's `tokio::select!` tick so it
    /// doesn't busy-spin when every worker slot is idle.
    pub async fn recv_any(&mut self) {
        tokio::select! {
            _ = self.signal_rx.recv() => {}
            _ = self.result_rx.recv() => {}
        }
    }
}

impl WorkerTransport {
    /// Send the 1-int `REQINPUT` request.
    pub fn request_input(&self) -> Result<(), TransportError> {
        self.signal_tx
            .try_send((self.rank, WorkerSignal::ReqInput))
            .map_err(|_| TransportError::Disconnected(self.rank))
    }

    /// Blocking receive of the dispatched candidate.
    pub async fn recv_input(&mut self) -> Option<DriverMessage> {
        self.from_driver.recv().await
    }

    /// Send the ready probe followed by the evaluated result, all tagged
    /// `COMMSOLUTION`.
    pub fn send_result(&self, msg: WorkerMessage) -> Result<(), TransportError> {
        self.result_tx
            .try_send((self.rank, msg))
            .map_err(|_| TransportError::Disconnected(self.rank))
    }

    /// Send the 1-int `ENDSIM` message.
    pub fn send_end_sim(&self) -> Result<(), TransportError> {
        self.signal_tx
            .try_send((self.rank, WorkerSignal::EndSim))
            .map_err(|_| TransportError::Disconnected(self.rank))
    }
}
