use dab_types::{Candidate, ParamKind, ParamValue, ParameterSchema};
use rand::Rng;
use std::sync::Arc;

use crate::prob_matrix::ProbabilityMatrix;
use crate::queue::SolutionQueue;

/// Draw a uniform-random candidate over every mutable parameter, snapped
/// to its step grid.
pub fn scout_draw(schema: &Arc<ParameterSchema>, rng: &mut impl Rng) -> Candidate {
    let mut candidate = Candidate::from_initial(Arc::clone(schema));
    for i in schema.mutable_indices() {
        let param = schema.get(i).expect("mutable index in range");
        let value = match param.kind {
            ParamKind::Real | ParamKind::Integer => {
                let raw = rng.gen_range(param.min..=param.max);
                let snapped = param.snap(raw);
                if param.kind == ParamKind::Integer {
                    ParamValue::Integer(snapped.round() as i64)
                } else {
                    ParamValue::Real(snapped)
                }
            }
            ParamKind::Boolean => ParamValue::Boolean(rng.gen_bool(0.5)),
            ParamKind::String => candidate.value(i).clone(),
        };
        candidate.set_value(i, value);
    }
    candidate
}

/// Lifecycle state of an Employed agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmployedState {
    Uninitialized,
    Exploring,
    Abandoned,
}

/// One Employed bee: a local-best candidate plus a staleness counter.
pub struct Employed {
    pub agent_id: i64,
    pub local_best: Option<Candidate>,
    pub staleness: u32,
    pub state: EmployedState,
}

impl Employed {
    pub fn new(agent_id: i64) -> Self {
        Self {
            agent_id,
            local_best: None,
            staleness: 0,
            state: EmployedState::Uninitialized,
        }
    }

    /// Propose a new candidate: occasionally sample from the probability
    /// matrix, otherwise perturb the agent's local-best.
    pub fn propose(
        &mut self,
        schema: &Arc<ParameterSchema>,
        prob_matrix: Option<&ProbabilityMatrix>,
        use_prob_matrix: bool,
        prob_employed_change: u32,
        rng: &mut impl Rng,
    ) -> (Candidate, i64) {
        if self.local_best.is_none() {
            self.local_best = Some(scout_draw(schema, rng));
        }

        if use_prob_matrix && rng.gen_range(0..11) == 0 {
            if let Some(matrix) = prob_matrix {
                if let Some(c) = sample_from_matrix(schema, matrix, rng) {
                    return (c, self.agent_id);
                }
            }
        }

        let seed = self.local_best.clone().expect("initialized above");
        let clone = perturb_local(
            schema,
            &seed,
            prob_employed_change,
            LocalWindow::Absolute(10),
            rng,
        );
        (clone, self.agent_id)
    }

    /// Replace local-best on improvement, else increment staleness. The
    /// abandonment transition (redrawing a scout once staleness crosses the
    /// threshold) is owned by the driver's replenish step, not here.
    pub fn ingest(&mut self, candidate: &Candidate, objective: crate::objective::Objective) {
        let fitness = candidate.fitness().unwrap_or(f64::NEG_INFINITY);
        let improved = match &self.local_best {
            None => true,
            Some(best) => objective.better(fitness, best.fitness().unwrap_or(f64::NEG_INFINITY)),
        };
        if improved {
            self.local_best = Some(candidate.clone());
            self.staleness = 0;
            self.state = EmployedState::Exploring;
        } else {
            self.staleness += 1;
        }
    }
}

/// An Onlooker bee: stateless beyond its configuration.
pub struct Onlooker {
    pub mod_factor: f64,
    pub prob_onlooker_change: u32,
}

impl Onlooker {
    /// Propose a candidate by perturbing a roulette-picked elite seed.
    /// Returns `None` when the elite queue has no reachable seed.
    pub fn propose(
        &self,
        schema: &Arc<ParameterSchema>,
        elite: &SolutionQueue,
        rng: &mut impl Rng,
    ) -> Option<(Candidate, i64)> {
        let mass = elite.total_fitness_mass();
        if mass <= 0.0 {
            return None;
        }
        let r = rng.gen_range(0.0..mass);
        let (seed, _fitness, origin) = elite.pick_by_roulette(r)?;
        let perturbed = perturb_local(
            schema,
            &seed,
            self.prob_onlooker_change,
            LocalWindow::Fractional(self.mod_factor),
            rng,
        );
        Some((perturbed, origin))
    }
}

enum LocalWindow {
    /// Employed: `[v - n*step, v + n*step]`.
    Absolute(i64),
    /// Onlooker: `[v*(1-f), v*(1+f)]` for reals; integer window is fixed at
    /// `2*step` regardless of `f`.
    Fractional(f64),
}

/// Shared perturbation core for Employed and Onlooker: flip each mutable
/// coordinate independently with probability `1/(prob_change+1)`, retrying
/// until at least one coordinate actually changed.
fn perturb_local(
    schema: &Arc<ParameterSchema>,
    seed: &Candidate,
    prob_change: u32,
    window: LocalWindow,
    rng: &mut impl Rng,
) -> Candidate {
    let denom = prob_change as f64 + 1.0;
    loop {
        let mut candidate = seed.clone();
        let mut changed = false;
        for i in schema.mutable_indices() {
            if !rng.gen_bool((1.0 / denom).min(1.0)) {
                continue;
            }
            let param = schema.get(i).expect("mutable index in range");
            let current = seed.value(i).clone();
            let new_value = match param.kind {
                ParamKind::Real => {
                    let v = current.as_f64().unwrap_or(param.min);
                    let (lo, hi) = match &window {
                        LocalWindow::Absolute(n) => {
                            (v - *n as f64 * param.step, v + *n as f64 * param.step)
                        }
                        LocalWindow::Fractional(f) => (v * (1.0 - f), v * (1.0 + f)),
                    };
                    let (lo, hi) = clamp_window(lo, hi, param.min, param.max);
                    ParamValue::Real(param.snap(rng.gen_range(lo..=hi)))
                }
                ParamKind::Integer => {
                    let v = current.as_f64().unwrap_or(param.min);
                    let (lo, hi) = match &window {
                        LocalWindow::Absolute(n) => {
                            (v - *n as f64 * param.step, v + *n as f64 * param.step)
                        }
                        LocalWindow::Fractional(_) => (v - 2.0 * param.step, v + 2.0 * param.step),
                    };
                    let (lo, hi) = clamp_window(lo, hi, param.min, param.max);
                    let snapped = param.snap(rng.gen_range(lo..=hi));
                    ParamValue::Integer(snapped.round() as i64)
                }
                ParamKind::Boolean => ParamValue::Boolean(!current.as_bool().unwrap_or(false)),
                ParamKind::String => current,
            };
            if new_value != seed.value(i).clone() {
                changed = true;
            }
            candidate.set_value(i, new_value);
        }
        if changed {
            return candidate;
        }
    }
}

/// Clamp a perturbation window to the parameter's bounds, expanding
/// degenerate `lo == hi` windows slightly so `gen_range` stays valid.
fn clamp_window(lo: f64, hi: f64, min: f64, max: f64) -> (f64, f64) {
    let lo = lo.max(min);
    let hi = hi.min(max);
    if lo >= hi {
        let mid = ((lo + hi) / 2.0).clamp(min, max);
        let lo = (mid - (max - min) * 1e-6).max(min);
        let hi = (mid + (max - min) * 1e-6).min(max);
        if lo >= hi {
            return (min, max);
        }
        return (lo, hi);
    }
    (lo, hi)
}

fn sample_from_matrix(
    schema: &Arc<ParameterSchema>,
    matrix: &ProbabilityMatrix,
    rng: &mut impl Rng,
) -> Option<Candidate> {
    let mut candidate = Candidate::from_initial(Arc::clone(schema));
    let mut any = false;
    for i in schema.mutable_indices() {
        if let Some(v) = matrix.sample(schema, i, rng) {
            candidate.set_value(i, v);
            any = true;
        }
    }
    any.then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dab_types::Parameter;
    use rand::SeedableRng;

    fn schema() -> Arc<ParameterSchema> {
        let params = vec![
            Parameter {
                index: 0,
                name: "x0".into(),
                kind: ParamKind::Real,
                min: -5.0,
                max: 5.0,
                step: 0.01,
                fixed: false,
                display: true,
                initial: ParamValue::Real(0.0),
            },
            Parameter {
                index: 1,
                name: "flag".into(),
                kind: ParamKind::Boolean,
                min: 0.0,
                max: 1.0,
                step: 0.0,
                fixed: false,
                display: true,
                initial: ParamValue::Boolean(false),
            },
        ];
        Arc::new(ParameterSchema::new(params).unwrap())
    }

    #[test]
    fn scout_draw_respects_bounds_and_grid() {
        let schema = schema();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let c = scout_draw(&schema, &mut rng);
            assert!(c.is_valid());
        }
    }

    #[test]
    fn employed_proposal_changes_at_least_one_coordinate() {
        let schema = schema();
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let mut agent = Employed::new(0);
        let (first, _) = agent.propose(&schema, None, false, 2, &mut rng);
        let (second, _) = agent.propose(&schema, None, false, 2, &mut rng);
        let differs = (0..schema.len()).any(|i| first.value(i) != second.value(i));
        assert!(differs || first.values() != second.values());
    }

    #[test]
    fn staleness_increments_on_worse_result_and_resets_on_improvement() {
        let schema = schema();
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let mut agent = Employed::new(0);
        agent.local_best = Some(scout_draw(&schema, &mut rng));
        agent.local_best.as_mut().unwrap().set_fitness(100.0);

        for n in 1..=5 {
            let mut worse = scout_draw(&schema, &mut rng);
            worse.set_fitness(1.0);
            agent.ingest(&worse, crate::objective::Objective::Maximize);
            assert_eq!(agent.staleness, n);
        }

        let mut better = scout_draw(&schema, &mut rng);
        better.set_fitness(200.0);
        agent.ingest(&better, crate::objective::Objective::Maximize);
        assert_eq!(agent.staleness, 0);
    }
}
