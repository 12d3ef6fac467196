/// Search direction: flips orderings and the fitness-mass formula
/// throughout the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Maximize,
    Minimize,
}

impl Objective {
    /// `true` if `a` is at least as good as `b` under this objective.
    pub fn better_or_equal(self, a: f64, b: f64) -> bool {
        match self {
            Objective::Maximize => a >= b,
            Objective::Minimize => a <= b,
        }
    }

    /// `true` if `a` is strictly better than `b`.
    pub fn better(self, a: f64, b: f64) -> bool {
        match self {
            Objective::Maximize => a > b,
            Objective::Minimize => a < b,
        }
    }

    /// Per-entry weight for fitness-proportional selection
    /// (`totalFitnessMass`): `fitness` under maximize, `1/fitness` under
    /// minimize.
    pub fn weight(self, fitness: f64) -> f64 {
        match self {
            Objective::Maximize => fitness.max(0.0),
            Objective::Minimize => {
                if fitness > 0.0 {
                    1.0 / fitness
                } else {
                    0.0
                }
            }
        }
    }
}

impl std::str::FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max" | "maximize" => Ok(Objective::Maximize),
            "min" | "minimize" => Ok(Objective::Minimize),
            other => Err(format!("unknown objective {other:?}, expected max|min")),
        }
    }
}
