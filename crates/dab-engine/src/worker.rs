use std::sync::Arc;
use std::time::{Duration, Instant};

use dab_types::{Candidate, ParameterSchema};
use tracing::{info, info_span, warn};

use crate::problem::Problem;
use crate::transport::{TransportError, WorkerMessage, WorkerTransport};

const SAFETY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Repeats request/receive/evaluate/reply until its deadline is near,
/// then sends `ENDSIM` and returns.
pub async fn run_worker(
    schema: Arc<ParameterSchema>,
    problem: Arc<dyn Problem>,
    mut transport: WorkerTransport,
    deadline: Instant,
) {
    let rank = transport.rank;
    loop {
        let _span = info_span!("worker_tick", rank).entered();

        if let Err(err) = transport.request_input() {
            log_transport_error(rank, err);
            continue;
        }

        let Some(msg) = transport.recv_input().await else {
            warn!(rank, "driver channel closed; worker exiting");
            return;
        };

        let mut candidate = Candidate::new(Arc::clone(&schema), msg.values);
        problem.solve(&mut candidate);
        let fitness = candidate.fitness().unwrap_or(f64::NAN);

        let result = WorkerMessage {
            values: candidate.values().to_vec(),
            fitness,
            origin: msg.origin,
        };
        if let Err(err) = transport.send_result(result) {
            log_transport_error(rank, err);
        }

        if Instant::now() + SAFETY_MARGIN >= deadline {
            info!(rank, "deadline near, sending ENDSIM");
            if let Err(err) = transport.send_end_sim() {
                log_transport_error(rank, err);
            }
            return;
        }
    }
}

fn log_transport_error(rank: usize, err: TransportError) {
    warn!(rank, %err, "transport error in worker tick, continuing");
}
