/// The four value kinds a [`Parameter`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ParamKind {
    Real,
    Integer,
    Boolean,
    String,
}

/// A single parameter value, tagged by kind.
///
/// Coercion between kinds happens once, at schema load time, never on every
/// read — see `ParameterSchema::load` for the conversion points. `Serialize`/
/// `Deserialize` back the JSON promoted-best snapshot; the on-disk queue
/// format stays the textual `idx:val` encoding — this is a separate,
/// human-inspectable artifact.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ParamValue {
    Real(f64),
    Integer(i64),
    Boolean(bool),
    String(String),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Real(_) => ParamKind::Real,
            ParamValue::Integer(_) => ParamKind::Integer,
            ParamValue::Boolean(_) => ParamKind::Boolean,
            ParamValue::String(_) => ParamKind::String,
        }
    }

    /// Numeric view used by mutation/sampling code; `None` for string values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Real(v) => Some(*v),
            ParamValue::Integer(v) => Some(*v as f64),
            ParamValue::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            ParamValue::String(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

/// A single dimension of the search space.
///
/// `index` is stable and dense from 0 across the owning schema. Only
/// `display && !fixed` parameters are mutable by the search; the rest
/// (fixed, or non-display) retain their initialization value forever.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub index: u32,
    pub name: String,
    pub kind: ParamKind,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub fixed: bool,
    pub display: bool,
    pub initial: ParamValue,
}

impl Parameter {
    /// Whether the search is allowed to mutate this dimension.
    pub fn mutable(&self) -> bool {
        self.display && !self.fixed
    }

    /// Number of distinct grid columns on `[min, max]` at `step`, used to
    /// size the `ProbabilityMatrix`. `0` for non-stepped kinds.
    pub fn grid_columns(&self) -> u32 {
        if self.step <= 0.0 || !matches!(self.kind, ParamKind::Real | ParamKind::Integer) {
            return 0;
        }
        (((self.max - self.min) / self.step).round() as i64 + 1).max(1) as u32
    }

    /// Snap `v` onto this parameter's step grid, clipped to `[min, max]`.
    pub fn snap(&self, v: f64) -> f64 {
        if self.step <= 0.0 {
            return v.clamp(self.min, self.max);
        }
        let steps = ((v - self.min) / self.step).round();
        (self.min + steps * self.step).clamp(self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn param_value_round_trips_through_json() {
        for v in [
            ParamValue::Real(3.5),
            ParamValue::Integer(-2),
            ParamValue::Boolean(true),
            ParamValue::String("x".into()),
        ] {
            let json = serde_json::to_string(&v).unwrap();
            let back: ParamValue = serde_json::from_str(&json).unwrap();
            assert_eq!(v, back);
        }
    }

    proptest! {
        /// Snapping onto the step grid always lands in `[min, max]` and
        /// on a multiple of `step` from `min`, for any raw real input.
        #[test]
        fn snap_stays_on_grid_and_in_bounds(raw in -1000.0f64..1000.0) {
            let p = Parameter {
                index: 0,
                name: "x".into(),
                kind: ParamKind::Real,
                min: -5.0,
                max: 5.0,
                step: 0.01,
                fixed: false,
                display: true,
                initial: ParamValue::Real(0.0),
            };
            let snapped = p.snap(raw);
            prop_assert!(snapped >= p.min - 1e-9 && snapped <= p.max + 1e-9);
            let steps = (snapped - p.min) / p.step;
            prop_assert!((steps - steps.round()).abs() < 1e-6);
        }
    }
}
