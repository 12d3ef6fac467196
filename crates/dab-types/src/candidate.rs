use std::sync::Arc;

use crate::param::{ParamKind, ParamValue};
use crate::schema::ParameterSchema;

/// A point in the search space: a schema plus a value for every dimension,
/// plus an optional fitness.
///
/// Cloning a `Candidate` is cheap: the schema is reference-counted and
/// shared across every candidate produced during a run.
#[derive(Debug, Clone)]
pub struct Candidate {
    schema: Arc<ParameterSchema>,
    values: Vec<ParamValue>,
    fitness: Option<f64>,
}

impl Candidate {
    pub fn new(schema: Arc<ParameterSchema>, values: Vec<ParamValue>) -> Self {
        debug_assert_eq!(values.len(), schema.len());
        Self {
            schema,
            values,
            fitness: None,
        }
    }

    /// A candidate carrying every parameter's initial value.
    pub fn from_initial(schema: Arc<ParameterSchema>) -> Self {
        let values = schema.initial_values();
        Self::new(schema, values)
    }

    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    pub fn schema_arc(&self) -> Arc<ParameterSchema> {
        Arc::clone(&self.schema)
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }

    pub fn value(&self, index: usize) -> &ParamValue {
        &self.values[index]
    }

    pub fn set_value(&mut self, index: usize, value: ParamValue) {
        self.values[index] = value;
    }

    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = Some(fitness);
    }

    /// Validate the invariants every candidate must hold: every mutable
    /// real/integer value lies in `[min, max]` and on the step grid;
    /// booleans are `{false, true}`; fixed parameters are unchanged from
    /// their initial value.
    pub fn is_valid(&self) -> bool {
        for (i, p) in self.schema.iter().enumerate() {
            let v = &self.values[i];
            if v.kind() != p.kind {
                return false;
            }
            if !p.mutable() {
                continue;
            }
            match p.kind {
                ParamKind::Real | ParamKind::Integer => {
                    let Some(x) = v.as_f64() else { return false };
                    if x < p.min - 1e-9 || x > p.max + 1e-9 {
                        return false;
                    }
                    if p.step > 0.0 {
                        let steps = (x - p.min) / p.step;
                        if (steps - steps.round()).abs() > 1e-6 {
                            return false;
                        }
                    }
                }
                ParamKind::Boolean => {
                    if v.as_bool().is_none() {
                        return false;
                    }
                }
                ParamKind::String => {}
            }
        }
        true
    }
}
