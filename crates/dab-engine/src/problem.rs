use dab_types::{Candidate, ParamValue};
use tracing::warn;

/// Thin indirection to the external evaluator. A real evaluator invokes
/// an external numerical code per candidate; `solve` only needs to return
/// a finite fitness or the `f64::NAN` sentinel for "invalid".
pub trait Problem: Send + Sync {
    fn solve(&self, candidate: &mut Candidate);
}

/// Stellarator-configuration objective. The real plasma solver is an
/// external process this crate does not invoke. Returns a fixed
/// placeholder fitness so the dispatch core remains exercisable end to
/// end.
pub struct Fusion;

impl Problem for Fusion {
    fn solve(&self, candidate: &mut Candidate) {
        warn!("FUSION problem is a stub; the plasma solver is out of process scope");
        candidate.set_fitness(1.0);
    }
}

/// Rosenbrock's function, summed over consecutive coordinate pairs:
/// `Σ 100*(xi^2 - x{i+1})^2 + (xi + 1)^2`.
pub struct NonSeparable;

impl Problem for NonSeparable {
    fn solve(&self, candidate: &mut Candidate) {
        let xs: Vec<f64> = candidate
            .values()
            .iter()
            .filter_map(ParamValue::as_f64)
            .collect();
        if xs.len() < 2 {
            candidate.set_fitness(f64::NAN);
            return;
        }
        let mut total = 0.0;
        for pair in xs.windows(2) {
            let (xi, xnext) = (pair[0], pair[1]);
            total += 100.0 * (xi * xi - xnext).powi(2) + (xi + 1.0).powi(2);
        }
        candidate.set_fitness(total);
    }
}

/// Which metaheuristic the CLI's `-s` flag selected.
pub enum Solver {
    Dab,
    SimulatedAnnealing,
}

impl Solver {
    /// Simulated Annealing is only a stub; validated and rejected at
    /// startup rather than silently behaving like DAB.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            Solver::Dab => Ok(()),
            Solver::SimulatedAnnealing => {
                anyhow::bail!("solver SA is not implemented; pass -s DAB")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dab_types::{ParamKind, ParameterSchema, Parameter};
    use std::sync::Arc;

    fn schema() -> Arc<ParameterSchema> {
        let params = (0..3)
            .map(|i| Parameter {
                index: i,
                name: format!("x{i}"),
                kind: ParamKind::Real,
                min: -5.0,
                max: 5.0,
                step: 0.01,
                fixed: false,
                display: true,
                initial: ParamValue::Real(-1.0),
            })
            .collect();
        Arc::new(ParameterSchema::new(params).unwrap())
    }

    #[test]
    fn rosenbrock_matches_closed_form_for_known_point() {
        let schema = schema();
        let mut c = Candidate::from_initial(schema);
        for i in 0..3 {
            c.set_value(i, ParamValue::Real(0.5));
        }
        NonSeparable.solve(&mut c);
        // xi = 0.5 for all three: 100*(0.25 - 0.5)^2 + (1.5)^2 = 6.25 + 2.25 = 8.5
        // per pair, two consecutive pairs over three coordinates.
        assert!((c.fitness().unwrap() - 17.0).abs() < 1e-9);
    }
}
