use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context as _};
use dab_engine::{CommModel, Objective};
use ini::Ini;

/// Resolved contents of the `-c` INI configuration file, with the
/// documented defaults applied for every optional key.
#[derive(Debug, Clone)]
pub struct Config {
    pub comm_model: CommModel,
    pub runtime: Duration,
    pub objective: Objective,
    pub pending_size: usize,
    pub elite_queue: usize,
    pub nemployed: usize,
    pub nonlooker: usize,
    pub iterations_abandoned: u32,
    pub prob_employed_change: u32,
    pub prob_onlooker_change: u32,
    pub onlooker_mod_factor: f64,
    pub use_prob_matrix: bool,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let ini = Ini::load_from_file(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let general = ini.section(Some("General"));
        let algorithm = ini.section(Some("Algorithm"));
        let bees = ini.section(Some("Bees"));

        let comm_model = match general.and_then(|s| s.get("commModel")) {
            Some(s) if s.eq_ignore_ascii_case("ALL2ALL") => CommModel::All2All,
            _ => CommModel::DriverWorker,
        };

        let Some(time_str) = algorithm.and_then(|s| s.get("time")) else {
            bail!("missing required Algorithm.time in {}", path.display());
        };
        let runtime_secs: u64 = time_str
            .trim()
            .parse()
            .with_context(|| format!("invalid Algorithm.time {time_str:?}"))?;

        let objective: Objective = algorithm
            .and_then(|s| s.get("objective"))
            .unwrap_or("min")
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let get_usize = |section: Option<&ini::Properties>, key: &str, default: usize| -> usize {
            section
                .and_then(|s| s.get(key))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let get_u32 = |section: Option<&ini::Properties>, key: &str, default: u32| -> u32 {
            section
                .and_then(|s| s.get(key))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let get_f64 = |section: Option<&ini::Properties>, key: &str, default: f64| -> f64 {
            section
                .and_then(|s| s.get(key))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let get_bool = |section: Option<&ini::Properties>, key: &str, default: bool| -> bool {
            section
                .and_then(|s| s.get(key))
                .map(|v| v.trim().eq_ignore_ascii_case("true") || v.trim() == "1")
                .unwrap_or(default)
        };

        Ok(Self {
            comm_model,
            runtime: Duration::from_secs(runtime_secs),
            objective,
            pending_size: get_usize(algorithm, "pendingSize", 32),
            elite_queue: get_usize(algorithm, "eliteQueue", 100),
            nemployed: get_usize(bees, "nemployed", 4),
            nonlooker: get_usize(bees, "nonlooker", 8),
            iterations_abandoned: get_u32(bees, "iterationsAbandoned", 20),
            prob_employed_change: get_u32(bees, "probEmployedChange", 2),
            prob_onlooker_change: get_u32(bees, "probOnlookerChange", 2),
            onlooker_mod_factor: get_f64(bees, "onlookerModFactor", 0.1),
            use_prob_matrix: get_bool(bees, "useProbMatrix", false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn loads_minimal_config_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[Algorithm]\ntime = 60\nobjective = min\n").unwrap();
        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.runtime, Duration::from_secs(60));
        assert_eq!(cfg.objective, Objective::Minimize);
        assert_eq!(cfg.nemployed, 4);
        assert_eq!(cfg.comm_model, CommModel::DriverWorker);
    }

    #[test]
    fn missing_time_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[Algorithm]\nobjective = min\n").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}
