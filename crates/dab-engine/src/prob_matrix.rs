use dab_types::{ParamValue, ParameterSchema};
use rand::Rng;

/// Dense `P x V` empirical-success table used as a biased sampler by
/// Employed agents. Rows are mutable parameters (in schema order);
/// columns are grid positions on that parameter's step grid.
pub struct ProbabilityMatrix {
    rows: Vec<usize>,
    columns: usize,
    cells: Vec<f64>,
}

const DECAY: f64 = 0.01;
const DECAY_FLOOR: f64 = 1.0;
const BOOST: f64 = 0.5;
const BEST_DECAY: f64 = 0.5;
const BEST_BOOST: f64 = 5.0;

impl ProbabilityMatrix {
    pub fn new(schema: &ParameterSchema) -> Self {
        let rows: Vec<usize> = schema.mutable_indices().collect();
        let columns = schema.max_grid_columns().max(1) as usize;
        let cells = vec![1.0; rows.len() * columns];
        Self {
            rows,
            columns,
            cells,
        }
    }

    fn row_of(&self, param_index: usize) -> Option<usize> {
        self.rows.iter().position(|&r| r == param_index)
    }

    fn cell(&self, row: usize, col: usize) -> f64 {
        self.cells[row * self.columns + col]
    }

    fn cell_mut(&mut self, row: usize, col: usize) -> &mut f64 {
        &mut self.cells[row * self.columns + col]
    }

    /// Draw a value for `param_index` biased by this row's learned
    /// weights; `None` if the row has no learning yet (all cells at the
    /// decay floor) or the parameter isn't tracked.
    pub fn sample(&self, schema: &ParameterSchema, param_index: usize, rng: &mut impl Rng) -> Option<ParamValue> {
        let row = self.row_of(param_index)?;
        let param = schema.get(param_index)?;
        let row_sum: f64 = (0..self.columns).map(|c| self.cell(row, c)).sum();
        if (row_sum - self.columns as f64).abs() < 1e-9 {
            return None;
        }
        let u = rng.gen_range(self.columns as f64..=row_sum.max(self.columns as f64));
        let mut acc = 0.0;
        let mut chosen = self.columns - 1;
        for c in 0..self.columns {
            acc += self.cell(row, c);
            if acc >= u {
                chosen = c;
                break;
            }
        }
        let value = param.min + chosen as f64 * param.step;
        let value = value.clamp(param.min, param.max);
        Some(match param.kind {
            dab_types::ParamKind::Integer => ParamValue::Integer(value.round() as i64),
            _ => ParamValue::Real(value),
        })
    }

    fn column_for(&self, schema: &ParameterSchema, param_index: usize, value: &ParamValue) -> Option<usize> {
        let param = schema.get(param_index)?;
        if param.step <= 0.0 {
            return None;
        }
        let v = value.as_f64()?;
        let col = ((v - param.min) / param.step).round();
        Some((col.max(0.0) as usize).min(self.columns - 1))
    }

    /// Decay every cell (floor `1.0`) and boost the cells matching
    /// `values`' grid-quantized coordinates; stronger update when `is_best`.
    pub fn update(&mut self, schema: &ParameterSchema, values: &[ParamValue], is_best: bool) {
        let (decay, boost) = if is_best {
            (BEST_DECAY, BEST_BOOST)
        } else {
            (DECAY, BOOST)
        };
        for cell in self.cells.iter_mut() {
            *cell = (*cell - decay).max(DECAY_FLOOR);
        }
        for (row_idx, &param_index) in self.rows.clone().iter().enumerate() {
            if let Some(col) = self.column_for(schema, param_index, &values[param_index]) {
                *self.cell_mut(row_idx, col) += boost;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dab_types::{ParamKind, Parameter};

    fn schema() -> ParameterSchema {
        let params = vec![Parameter {
            index: 0,
            name: "x".into(),
            kind: ParamKind::Real,
            min: 0.0,
            max: 1.0,
            step: 0.1,
            fixed: false,
            display: true,
            initial: ParamValue::Real(0.0),
        }];
        ParameterSchema::new(params).unwrap()
    }

    #[test]
    fn fresh_matrix_has_no_learning() {
        let schema = schema();
        let m = ProbabilityMatrix::new(&schema);
        let mut rng = rand::thread_rng();
        assert!(m.sample(&schema, 0, &mut rng).is_none());
    }

    #[test]
    fn update_creates_learnable_bias() {
        let schema = schema();
        let mut m = ProbabilityMatrix::new(&schema);
        m.update(&schema, &[ParamValue::Real(0.5)], false);
        let mut rng = rand::thread_rng();
        assert!(m.sample(&schema, 0, &mut rng).is_some());
    }
}
