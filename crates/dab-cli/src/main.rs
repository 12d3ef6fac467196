mod cli;
mod config;
mod logging;
mod shutdown;

use std::sync::Arc;

use clap::Parser;
use dab_engine::{build_in_process, CommModel, Driver, DriverConfig, Fusion, NonSeparable, Problem, QueuePaths, Solver};
use dab_types::schema::loader as schema_loader;

use crate::cli::{Cli, ProblemKind, SolverKind};
use crate::config::Config;
use crate::shutdown::{spawn_ctrl_c_handler, ShutdownController, ShutdownEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbosity);

    let solver = match cli.solver {
        SolverKind::Dab => Solver::Dab,
        SolverKind::Sa => Solver::SimulatedAnnealing,
    };
    solver.validate()?;

    let schema = schema_loader::load_file(&cli.schema_path)?;
    let schema = Arc::new(schema);

    let config = Config::load(&cli.config_path)?;

    tracing::info!(
        started_at = %chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        problem = ?cli.problem,
        comm_model = ?config.comm_model,
        params = schema.len(),
        "starting dab run"
    );

    let run_dir = cli.run_dir.clone().unwrap_or_else(|| std::path::PathBuf::from("."));
    std::fs::create_dir_all(&run_dir).ok();
    let problem_name = match cli.problem {
        ProblemKind::Fusion => "FUSION",
        ProblemKind::NonSeparable => "NONSEPARABLE",
    };
    let queue_paths = QueuePaths::for_problem(&run_dir, problem_name);

    let driver_config = DriverConfig {
        objective: config.objective,
        comm_model: config.comm_model,
        pending_size: config.pending_size.max(1),
        elite_max: config.elite_queue.max(1),
        sources: 3,
        n_employed: config.nemployed,
        n_onlooker: config.nonlooker,
        iter_abandoned: config.iterations_abandoned,
        prob_employed_change: config.prob_employed_change,
        prob_onlooker_change: config.prob_onlooker_change,
        onlooker_mod_factor: config.onlooker_mod_factor,
        use_prob_matrix: config.use_prob_matrix,
        runtime: config.runtime,
        queue_paths,
        seed: cli.seed,
    };

    let problem: Arc<dyn Problem> = match cli.problem {
        ProblemKind::Fusion => Arc::new(Fusion),
        ProblemKind::NonSeparable => Arc::new(NonSeparable),
    };

    let mut driver = Driver::new(Arc::clone(&schema), driver_config);
    driver.load_queues();

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(shutdown.clone(), shutdown_tx);

    let run = async {
        match config.comm_model {
            CommModel::All2All => driver.run_all2all(problem.as_ref()).await,
            CommModel::DriverWorker => {
                let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
                let (driver_transport, worker_transports) = build_in_process(worker_count);
                let deadline = std::time::Instant::now() + config.runtime;
                for wt in worker_transports {
                    let schema = Arc::clone(&schema);
                    let problem = Arc::clone(&problem);
                    tokio::spawn(dab_engine::run_worker(schema, problem, wt, deadline));
                }
                driver.run(driver_transport).await
            }
        }
    };

    let interrupted = tokio::select! {
        result = run => { result?; false }
        Some(ShutdownEvent::Graceful | ShutdownEvent::Immediate) = shutdown_rx.recv() => true,
    };

    if interrupted {
        driver.flush_queues();
        eprintln!("shutdown requested; queues flushed, exiting");
    }

    Ok(())
}
