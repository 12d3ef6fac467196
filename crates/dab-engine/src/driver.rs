use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dab_types::{Candidate, ParameterSchema};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, info_span, warn};

use crate::agents::{scout_draw, Employed, Onlooker};
use crate::objective::Objective;
use crate::prob_matrix::ProbabilityMatrix;
use crate::queue::{QueueMode, SolutionQueue};
use crate::transport::{DriverMessage, DriverTransport, WorkerSignal};

/// How ranks communicate with each other (config key `commModel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommModel {
    DriverWorker,
    All2All,
}

/// Filenames for the three on-disk queues, selected by problem type.
#[derive(Debug, Clone)]
pub struct QueuePaths {
    pub pending: PathBuf,
    pub finished: PathBuf,
    pub top: PathBuf,
}

impl QueuePaths {
    pub fn for_problem(dir: &std::path::Path, problem: &str) -> Self {
        let suffix = if problem.eq_ignore_ascii_case("NONSEPARABLE") {
            "NonSep"
        } else {
            ""
        };
        Self {
            pending: dir.join(format!("pending{suffix}.queue")),
            finished: dir.join(format!("finished{suffix}.queue")),
            top: dir.join("top.queue"),
        }
    }
}

/// Every tunable from the INI config, resolved into typed fields.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub objective: Objective,
    pub comm_model: CommModel,
    pub pending_size: usize,
    pub elite_max: usize,
    pub sources: usize,
    pub n_employed: usize,
    pub n_onlooker: usize,
    pub iter_abandoned: u32,
    pub prob_employed_change: u32,
    pub prob_onlooker_change: u32,
    pub onlooker_mod_factor: f64,
    pub use_prob_matrix: bool,
    pub runtime: Duration,
    pub queue_paths: QueuePaths,
    pub seed: Option<u64>,
}

const SAFETY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Owns the agent population and the three queues; drives the tick loop.
pub struct Driver {
    schema: Arc<ParameterSchema>,
    config: DriverConfig,
    pending: SolutionQueue,
    finished: SolutionQueue,
    elite: SolutionQueue,
    employed: Vec<Employed>,
    onlookers: Vec<Onlooker>,
    prob_matrix: Option<ProbabilityMatrix>,
    best_so_far: Option<Candidate>,
    rng: StdRng,
    start_time: Instant,
    deadline: Instant,
    scout_next_slot: usize,
}

impl Driver {
    pub fn new(schema: Arc<ParameterSchema>, config: DriverConfig) -> Self {
        let pending = SolutionQueue::new(
            Arc::clone(&schema),
            QueueMode::Fifo,
            config.objective,
            config.pending_size,
            Some(config.queue_paths.pending.clone()),
        );
        let finished = SolutionQueue::new(
            Arc::clone(&schema),
            QueueMode::Priority,
            config.objective,
            usize::MAX,
            Some(config.queue_paths.finished.clone()),
        );
        let elite = SolutionQueue::new(
            Arc::clone(&schema),
            QueueMode::Priority,
            config.objective,
            config.elite_max,
            Some(config.queue_paths.top.clone()),
        );
        let employed = (0..config.n_employed as i64).map(Employed::new).collect();
        let onlookers = (0..config.n_onlooker)
            .map(|_| Onlooker {
                mod_factor: config.onlooker_mod_factor,
                prob_onlooker_change: config.prob_onlooker_change,
            })
            .collect();
        let prob_matrix = config.use_prob_matrix.then(|| ProbabilityMatrix::new(&schema));
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let start_time = Instant::now();
        let deadline = start_time + config.runtime;

        Self {
            schema,
            config,
            pending,
            finished,
            elite,
            employed,
            onlookers,
            prob_matrix,
            best_so_far: None,
            rng,
            start_time,
            deadline,
            scout_next_slot: 0,
        }
    }

    /// Run the driver algorithm against an in-process problem, with no
    /// transport involved: each rank in ALL2ALL mode independently
    /// proposes, solves, and ingests on its own.
    pub async fn run_all2all(&mut self, problem: &dyn crate::problem::Problem) -> anyhow::Result<()> {
        loop {
            let now = Instant::now();
            if now >= self.deadline {
                break;
            }

            let (mut candidate, origin) = self.propose_round_robin();
            problem.solve(&mut candidate);
            let fitness = candidate.fitness().unwrap_or(f64::NAN);
            self.ingest(candidate.values().to_vec(), fitness, origin);

            // Evaluators in this mode are in-process and effectively
            // instantaneous; yield so the runtime can service other tasks
            // and the deadline check above stays responsive.
            tokio::task::yield_now().await;
        }

        self.flush_queues();
        info!(elapsed = ?self.start_time.elapsed(), "driver done (ALL2ALL)");
        Ok(())
    }

    /// Load any pre-existing queue state from disk.
    pub fn load_queues(&mut self) {
        for (name, q) in [
            ("pending", &mut self.pending),
            ("finished", &mut self.finished),
            ("elite", &mut self.elite),
        ] {
            if let Err(err) = q.load() {
                warn!(queue = name, %err, "failed to load queue, starting empty");
            }
        }
    }

    pub fn best_so_far(&self) -> Option<&Candidate> {
        self.best_so_far.as_ref()
    }

    /// Rewrite all three on-disk queues in full. Called on normal
    /// completion and on a requested shutdown, so a run that is
    /// interrupted mid-tick still leaves the queues consistent with
    /// whatever has been ingested so far.
    pub fn flush_queues(&mut self) {
        self.finished.flush().ok();
        self.elite.flush().ok();
        self.pending.flush().ok();
    }

    /// Drive the full dispatch core over `transport` until the deadline
    /// is reached and every worker's `ENDSIM` has arrived.
    pub async fn run(&mut self, mut transport: DriverTransport) -> anyhow::Result<()> {
        let worker_count = transport.worker_count();
        let mut ended: HashSet<usize> = HashSet::new();
        let mut ready: HashSet<usize> = HashSet::new();

        loop {
            let _span = info_span!("driver_tick").entered();

            self.replenish();

            for (rank, signal) in transport.poll_signals() {
                match signal {
                    WorkerSignal::ReqInput => {
                        ready.insert(rank);
                    }
                    WorkerSignal::EndSim => {
                        ended.insert(rank);
                        ready.remove(&rank);
                    }
                }
            }
            self.dispatch(&mut transport, &mut ready);

            for (_rank, msg) in transport.poll_results() {
                self.ingest(msg.values, msg.fitness, msg.origin);
            }

            let now = Instant::now();
            let draining = now + SAFETY_MARGIN >= self.deadline;
            let all_ended = worker_count == 0 || ended.len() >= worker_count;
            if draining && all_ended {
                break;
            }
            if now >= self.deadline {
                warn!("deadline reached with outstanding worker slots; abandoning them");
                break;
            }

            if ready.is_empty() {
                tokio::select! {
                    _ = transport.recv_any() => {}
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
            }
        }

        self.flush_queues();
        info!(elapsed = ?self.start_time.elapsed(), "driver done");
        Ok(())
    }

    /// Top up the pending queue to its target size and redraw any
    /// Employed agent that has gone stale past the abandonment threshold.
    fn replenish(&mut self) {
        while self.pending.len() < self.config.pending_size {
            let (candidate, origin) = self.propose_round_robin();
            self.pending.put(candidate.values().to_vec(), -1.0, origin, self.config.sources);
        }
        for agent in self.employed.iter_mut() {
            if agent.staleness as usize > self.config.iter_abandoned as usize {
                let draw = scout_draw(&self.schema, &mut self.rng);
                self.pending
                    .put(draw.values().to_vec(), -1.0, agent.agent_id, self.config.sources);
                agent.local_best = Some(scout_draw(&self.schema, &mut self.rng));
                agent.staleness = 0;
            }
        }
    }

    fn propose_round_robin(&mut self) -> (Candidate, i64) {
        let total_agents = self.employed.len() + self.onlookers.len();
        if total_agents == 0 {
            return (scout_draw(&self.schema, &mut self.rng), -1);
        }
        let slot = self.scout_next_slot % total_agents;
        self.scout_next_slot = self.scout_next_slot.wrapping_add(1);

        if slot < self.employed.len() {
            let matrix = self.prob_matrix.as_ref();
            self.employed[slot].propose(
                &self.schema,
                matrix,
                self.config.use_prob_matrix,
                self.config.prob_employed_change,
                &mut self.rng,
            )
        } else {
            let onlooker = &self.onlookers[slot - self.employed.len()];
            onlooker
                .propose(&self.schema, &self.elite, &mut self.rng)
                .unwrap_or_else(|| (scout_draw(&self.schema, &mut self.rng), -1))
        }
    }

    /// Hand a pending candidate to every worker slot that is ready for one.
    fn dispatch(&mut self, transport: &mut DriverTransport, ready: &mut HashSet<usize>) {
        let ranks: Vec<usize> = ready.iter().copied().collect();
        for rank in ranks {
            let (candidate, origin) = match self.pending.get() {
                Some((c, _fitness, origin)) => (c, origin),
                None => {
                    self.replenish();
                    match self.pending.get() {
                        Some((c, _fitness, origin)) => (c, origin),
                        None => (scout_draw(&self.schema, &mut self.rng), -1),
                    }
                }
            };
            let msg = DriverMessage {
                values: candidate.values().to_vec(),
                origin,
            };
            if transport.send(rank, msg).is_ok() {
                ready.remove(&rank);
            }
        }
    }

    /// Validate and fold one evaluation result into the queues, agent
    /// population, and best-so-far snapshot.
    fn ingest(&mut self, values: Vec<dab_types::ParamValue>, fitness: f64, origin: i64) {
        // Matches the original evaluator's invalid-result sentinel ceiling.
        const INFINITY: f64 = 9.999999e37;
        let valid = fitness.is_finite() && fitness > 0.0 && fitness < INFINITY / 100.0;

        if !valid {
            self.bump_staleness(origin);
            return;
        }

        let mut candidate = Candidate::new(Arc::clone(&self.schema), values.clone());
        candidate.set_fitness(fitness);

        self.finished
            .put(values.clone(), fitness, origin, self.config.sources);
        self.elite.put(values.clone(), fitness, origin, self.config.sources);

        if let Some(matrix) = self.prob_matrix.as_mut() {
            let is_best = self
                .best_so_far
                .as_ref()
                .map(|b| self.config.objective.better(fitness, b.fitness().unwrap_or(f64::NEG_INFINITY)))
                .unwrap_or(true);
            matrix.update(&self.schema, &values, is_best);
        }

        let improves_best = self
            .best_so_far
            .as_ref()
            .map(|b| self.config.objective.better(fitness, b.fitness().unwrap_or(f64::NEG_INFINITY)))
            .unwrap_or(true);
        if improves_best {
            self.best_so_far = Some(candidate.clone());
            self.promote_best();
        }

        if let Some(agent) = self.employed.iter_mut().find(|a| a.agent_id == origin) {
            agent.ingest(&candidate, self.config.objective);
        }
    }

    fn bump_staleness(&mut self, origin: i64) {
        if let Some(agent) = self.employed.iter_mut().find(|a| a.agent_id == origin) {
            agent.staleness += 1;
        }
    }

    /// Write `input.best.<ts>` alongside the queue files. Artifact copying
    /// from a worker's directory is the extension point for a real
    /// evaluator integration; this engine has no such artifacts to copy
    /// for the stub `Problem` adapters.
    ///
    /// Alongside the plain `idx:val` text (the on-disk queue encoding), also
    /// drop a JSON sidecar with the same tmp-then-rename write discipline
    /// `SolutionQueue::flush` uses, so a human or another tool can inspect a
    /// promoted best without the schema in hand.
    fn promote_best(&self) {
        let Some(best) = &self.best_so_far else { return };
        let Some(dir) = self.config.queue_paths.top.parent() else {
            return;
        };
        let ts = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = dir.join(format!("input.best.{ts}"));
        let encoded = crate::queue::encode_candidate(best.values());
        if let Err(err) = std::fs::write(&path, encoded) {
            warn!(%err, path = %path.display(), "failed to write promoted-best snapshot");
        }

        let snapshot = BestSnapshot {
            values: best.values().to_vec(),
            fitness: best.fitness().unwrap_or(f64::NAN),
            timestamp: ts.to_string(),
        };
        let json_path = dir.join(format!("input.best.{ts}.json"));
        if let Err(err) = write_json_atomic(&json_path, &snapshot) {
            warn!(%err, path = %json_path.display(), "failed to write promoted-best json sidecar");
        }
    }
}

/// JSON-friendly mirror of a promoted-best candidate. Not the on-disk
/// queue format — that stays the textual `idx:val` encoding.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct BestSnapshot {
    values: Vec<dab_types::ParamValue>,
    fitness: f64,
    timestamp: String,
}

fn write_json_atomic(path: &std::path::Path, value: &BestSnapshot) -> std::io::Result<()> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dab_types::{ParamKind, ParamValue, Parameter};

    fn schema() -> Arc<ParameterSchema> {
        let params = (0..2)
            .map(|i| Parameter {
                index: i,
                name: format!("x{i}"),
                kind: ParamKind::Real,
                min: -5.0,
                max: 5.0,
                step: 0.01,
                fixed: false,
                display: true,
                initial: ParamValue::Real(0.0),
            })
            .collect();
        Arc::new(ParameterSchema::new(params).unwrap())
    }

    fn config(dir: &std::path::Path) -> DriverConfig {
        DriverConfig {
            objective: Objective::Minimize,
            comm_model: CommModel::All2All,
            pending_size: 4,
            elite_max: 10,
            sources: 3,
            n_employed: 1,
            n_onlooker: 0,
            iter_abandoned: 2,
            prob_employed_change: 2,
            prob_onlooker_change: 2,
            onlooker_mod_factor: 0.1,
            use_prob_matrix: false,
            runtime: Duration::from_secs(60),
            queue_paths: QueuePaths::for_problem(dir, "NONSEPARABLE"),
            seed: Some(1),
        }
    }

    #[test]
    fn replenish_redraws_an_agent_once_its_staleness_passes_the_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let schema = schema();
        let mut driver = Driver::new(Arc::clone(&schema), config(dir.path()));

        driver.employed[0].local_best = Some(scout_draw(&schema, &mut driver.rng));
        let stale_best = driver.employed[0].local_best.clone().unwrap();
        driver.employed[0].staleness = driver.config.iter_abandoned + 1;

        driver.replenish();

        assert_eq!(driver.employed[0].staleness, 0);
        let redrawn = driver.employed[0].local_best.clone().unwrap();
        assert_ne!(redrawn.values(), stale_best.values());
    }
}
