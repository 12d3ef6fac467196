use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dab_types::{Candidate, ParamKind, ParamValue, ParameterSchema};
use thiserror::Error;
use tracing::warn;

use crate::objective::Objective;

/// Errors from malformed on-disk queue state.
///
/// These are always recoverable: the offending line (or, on a count
/// mismatch, the whole record) is skipped and logged; the queue remains
/// usable with whatever loaded successfully.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to read queue file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed queue line: {0:?}")]
    MalformedLine(String),
    #[error("encoded candidate has {found} fields, schema has {expected}")]
    ParamCountMismatch { expected: usize, found: usize },
}

/// Ordering discipline a [`SolutionQueue`] enforces on `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Pending queue: insertion order only, bounded by `max_size`.
    Fifo,
    /// Finished / elite queues: ordered better-first under `objective`.
    Priority,
}

/// One `(candidate, fitness, originId)` triple.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub values: Vec<ParamValue>,
    pub fitness: f64,
    pub origin: i64,
}

/// Three cooperating queues — pending, finished, elite — share this type,
/// distinguished only by `mode`, `max_size`, and `persist`.
pub struct SolutionQueue {
    schema: Arc<ParameterSchema>,
    mode: QueueMode,
    objective: Objective,
    max_size: usize,
    persist: bool,
    path: Option<PathBuf>,
    entries: VecDeque<QueueEntry>,
}

impl SolutionQueue {
    pub fn new(
        schema: Arc<ParameterSchema>,
        mode: QueueMode,
        objective: Objective,
        max_size: usize,
        path: Option<PathBuf>,
    ) -> Self {
        Self {
            schema,
            mode,
            objective,
            max_size,
            persist: path.is_some(),
            path,
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// Insert `(candidate, fitness, origin)`. `sources` is the minimum
    /// number of distinct origins the elite-diversity admission policy
    /// tries to preserve; pass `3` to match the documented default.
    pub fn put(&mut self, values: Vec<ParamValue>, fitness: f64, origin: i64, sources: usize) {
        let entry = QueueEntry {
            values,
            fitness,
            origin,
        };
        match self.mode {
            QueueMode::Fifo => {
                if self.entries.len() < self.max_size {
                    self.entries.push_back(entry);
                    self.persist_append(&self.entries.back().unwrap().clone());
                }
            }
            QueueMode::Priority => self.put_priority(entry, sources),
        }
    }

    fn put_priority(&mut self, entry: QueueEntry, sources: usize) {
        // Rule (a): not-yet-evaluated entries never preempt a real entry.
        if entry.fitness < 0.0 {
            let insert_at = self
                .entries
                .iter()
                .rposition(|e| e.fitness >= 0.0)
                .map(|i| i + 1)
                .unwrap_or(0);
            self.entries.insert(insert_at, entry.clone());
            if self.entries.len() > self.max_size {
                self.entries.pop_back();
            }
            self.persist_append(&entry);
            return;
        }

        let objective = self.objective;
        let mut pos = self
            .entries
            .iter()
            .position(|e| !objective.better_or_equal(e.fitness, entry.fitness))
            .unwrap_or(self.entries.len());

        // Rule (b): the first max_size/10 positions resist displacement by
        // an origin already represented there.
        let top_slots = self.max_size / 10;
        if pos < top_slots {
            let window = top_slots.min(self.entries.len());
            let already_in_top = self.entries.iter().take(window).any(|e| e.origin == entry.origin);
            if already_in_top {
                pos = pos.max(window);
            }
        }

        let no_insertion_point = pos >= self.entries.len() && self.entries.len() >= self.max_size;
        if no_insertion_point {
            // Rule (d): welcome a never-before-seen origin by evicting one
            // entry from whichever origin is currently most represented.
            let distinct: HashSet<i64> = self.entries.iter().map(|e| e.origin).collect();
            let origin_is_new = !distinct.contains(&entry.origin);
            if distinct.len() < sources && origin_is_new {
                if let Some(victim) = most_represented_origin(&self.entries) {
                    if let Some(idx) = self.entries.iter().rposition(|e| e.origin == victim) {
                        self.entries.remove(idx);
                    }
                }
                self.entries.push_back(entry.clone());
                self.persist_append(&entry);
            }
            // else: dropped, no-op.
            return;
        }

        self.entries.insert(pos, entry.clone());
        if self.entries.len() > self.max_size {
            self.entries.pop_back();
        }
        self.persist_append(&entry);
    }

    /// Pop the front entry (best, for priority queues; oldest, for FIFO).
    pub fn get(&mut self) -> Option<(Candidate, f64, i64)> {
        let entry = self.entries.pop_front()?;
        Some(self.decode(entry))
    }

    /// `get` without removing.
    pub fn peek(&self) -> Option<(Candidate, f64, i64)> {
        let entry = self.entries.front().cloned()?;
        Some(self.decode(entry))
    }

    fn decode(&self, entry: QueueEntry) -> (Candidate, f64, i64) {
        let candidate = Candidate::new(Arc::clone(&self.schema), entry.values);
        (candidate, entry.fitness, entry.origin)
    }

    /// Σ weight(fitness) over every entry, used by fitness-proportional
    /// selection (the Onlooker's roulette draw).
    pub fn total_fitness_mass(&self) -> f64 {
        self.entries.iter().map(|e| self.objective.weight(e.fitness)).sum()
    }

    /// Walk entries accumulating weight; return the first whose running
    /// sum exceeds `r`. `None` if `r` is not reachable.
    pub fn pick_by_roulette(&self, r: f64) -> Option<(Candidate, f64, i64)> {
        let mut acc = 0.0;
        for entry in self.entries.iter() {
            acc += self.objective.weight(entry.fitness);
            if acc > r {
                return Some(self.decode(entry.clone()));
            }
        }
        None
    }

    /// Reconstruct the queue from its backing file, if any, inserting
    /// each record with the same ordering rules as `put`.
    pub fn load(&mut self) -> Result<(), QueueError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let text = std::fs::read_to_string(&path).map_err(|source| QueueError::Io {
            path: path.display().to_string(),
            source,
        })?;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match decode_line(line, &self.schema) {
                Ok((values, fitness, origin)) => match self.mode {
                    QueueMode::Fifo => {
                        if self.entries.len() < self.max_size {
                            self.entries.push_back(QueueEntry {
                                values,
                                fitness,
                                origin,
                            });
                        }
                    }
                    QueueMode::Priority => {
                        self.put_priority(
                            QueueEntry {
                                values,
                                fitness,
                                origin,
                            },
                            3,
                        );
                    }
                },
                Err(err) => warn!(%err, line, "skipping malformed queue line"),
            }
        }
        Ok(())
    }

    /// Rewrite the backing file with the current in-memory contents.
    pub fn flush(&self) -> Result<(), QueueError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut body = String::new();
        for entry in self.entries.iter() {
            body.push_str(&encode_line(&entry.values, entry.fitness, entry.origin));
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, body).map_err(|source| QueueError::Io {
            path: tmp.display().to_string(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| QueueError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    fn persist_append(&self, entry: &QueueEntry) {
        if !self.persist {
            return;
        }
        let Some(path) = &self.path else { return };
        let line = encode_line(&entry.values, entry.fitness, entry.origin);
        use std::io::Write as _;
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(err) = result {
            warn!(%err, path = %path.display(), "failed to append queue record");
        }
    }
}

fn most_represented_origin(entries: &VecDeque<QueueEntry>) -> Option<i64> {
    let mut counts = std::collections::HashMap::new();
    for e in entries {
        *counts.entry(e.origin).or_insert(0usize) += 1;
    }
    counts.into_iter().max_by_key(|(_, c)| *c).map(|(o, _)| o)
}

/// `idx:val,idx:val,…` on-disk encoding; round-trips real values to at
/// least 6 significant digits.
pub fn encode_candidate(values: &[ParamValue]) -> String {
    values
        .iter()
        .enumerate()
        .map(|(idx, v)| format!("{idx}:{}", encode_value(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn encode_value(v: &ParamValue) -> String {
    match v {
        ParamValue::Real(x) => format!("{x:.9}"),
        ParamValue::Integer(x) => x.to_string(),
        ParamValue::Boolean(x) => if *x { "1" } else { "0" }.to_string(),
        ParamValue::String(s) => s.replace([',', '#', ':'], "_"),
    }
}

fn encode_line(values: &[ParamValue], fitness: f64, origin: i64) -> String {
    format!("{}#{fitness}#{origin}\n", encode_candidate(values))
}

fn decode_line(
    line: &str,
    schema: &ParameterSchema,
) -> Result<(Vec<ParamValue>, f64, i64), QueueError> {
    let mut fields = line.splitn(3, '#');
    let (Some(encoded), Some(fitness), Some(origin)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(QueueError::MalformedLine(line.to_string()));
    };
    let fitness: f64 = fitness
        .trim()
        .parse()
        .map_err(|_| QueueError::MalformedLine(line.to_string()))?;
    let origin: i64 = origin
        .trim()
        .parse()
        .map_err(|_| QueueError::MalformedLine(line.to_string()))?;
    let values = decode_candidate(encoded, schema)?;
    Ok((values, fitness, origin))
}

fn decode_candidate(encoded: &str, schema: &ParameterSchema) -> Result<Vec<ParamValue>, QueueError> {
    let mut values = schema.initial_values();
    for field in encoded.split(',') {
        if field.is_empty() {
            continue;
        }
        let (idx_str, val_str) = field
            .split_once(':')
            .ok_or_else(|| QueueError::MalformedLine(field.to_string()))?;
        let idx: usize = idx_str
            .trim()
            .parse()
            .map_err(|_| QueueError::MalformedLine(field.to_string()))?;
        let param = schema
            .get(idx)
            .ok_or_else(|| QueueError::MalformedLine(field.to_string()))?;
        let value = match param.kind {
            ParamKind::Real => ParamValue::Real(
                val_str
                    .trim()
                    .parse()
                    .map_err(|_| QueueError::MalformedLine(field.to_string()))?,
            ),
            ParamKind::Integer => ParamValue::Integer(
                val_str
                    .trim()
                    .parse()
                    .map_err(|_| QueueError::MalformedLine(field.to_string()))?,
            ),
            ParamKind::Boolean => ParamValue::Boolean(val_str.trim() == "1"),
            ParamKind::String => ParamValue::String(val_str.to_string()),
        };
        // Indices arrive in increasing order but need not be dense:
        // fixed/non-mutable parameters are often omitted from the encoding
        // and keep the schema's initial value.
        values[idx] = value;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dab_types::{ParamKind, Parameter};
    use proptest::prelude::*;

    fn schema() -> Arc<ParameterSchema> {
        let params = vec![Parameter {
            index: 0,
            name: "x".into(),
            kind: ParamKind::Real,
            min: 0.0,
            max: 10.0,
            step: 0.01,
            fixed: false,
            display: true,
            initial: ParamValue::Real(0.0),
        }];
        Arc::new(ParameterSchema::new(params).unwrap())
    }

    #[test]
    fn priority_queue_orders_by_fitness_with_eviction() {
        let mut q = SolutionQueue::new(schema(), QueueMode::Priority, Objective::Maximize, 5, None);
        let put = |q: &mut SolutionQueue, f: f64, origin: i64| {
            q.put(vec![ParamValue::Real(f)], f, origin, 3);
        };
        put(&mut q, 10.0, 1);
        put(&mut q, 20.0, 2);
        put(&mut q, 15.0, 1);
        put(&mut q, 5.0, 3);
        put(&mut q, 25.0, 2);
        put(&mut q, 18.0, 4);

        let fits: Vec<f64> = q.entries().map(|e| e.fitness).collect();
        assert_eq!(fits, vec![25.0, 20.0, 18.0, 15.0, 10.0]);
    }

    #[test]
    fn elite_diversity_admits_new_origin() {
        let mut q = SolutionQueue::new(schema(), QueueMode::Priority, Objective::Maximize, 10, None);
        for _ in 0..20 {
            q.put(vec![ParamValue::Real(1.0)], 1.0, 1, 3);
        }
        q.put(vec![ParamValue::Real(0.5)], 0.5, 2, 3);
        assert!(q.entries().any(|e| e.origin == 2));
    }

    #[test]
    fn round_trip_encode_decode() {
        let s = schema();
        let values = vec![ParamValue::Real(3.14159265)];
        let line = encode_line(&values, 1.0, 7);
        let (decoded, fitness, origin) = decode_line(line.trim_end(), &s).unwrap();
        assert_eq!(fitness, 1.0);
        assert_eq!(origin, 7);
        match decoded[0] {
            ParamValue::Real(v) => assert!((v - 3.14159265).abs() < 5e-5),
            _ => panic!("expected real"),
        }
    }

    #[test]
    fn flush_then_load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finished.queue");
        let mut q = SolutionQueue::new(schema(), QueueMode::Priority, Objective::Maximize, 5, Some(path.clone()));
        q.put(vec![ParamValue::Real(1.0)], 1.0, 1, 3);
        q.put(vec![ParamValue::Real(2.0)], 2.0, 2, 3);
        q.flush().unwrap();

        let mut reloaded = SolutionQueue::new(schema(), QueueMode::Priority, Objective::Maximize, 5, Some(path));
        reloaded.load().unwrap();
        let fits: Vec<f64> = reloaded.entries().map(|e| e.fitness).collect();
        assert_eq!(fits, vec![2.0, 1.0]);
    }

    proptest! {
        /// A real parameter's value survives an encode/decode cycle
        /// through the queue's textual format within `step/2`, for any
        /// value on the step grid.
        #[test]
        fn round_trip_preserves_real_values_within_half_step(raw in -1000.0f64..1000.0) {
            let s = schema();
            let param = s.get(0).unwrap();
            let snapped = param.snap(raw);
            let values = vec![ParamValue::Real(snapped)];
            let line = encode_line(&values, 1.0, 0);
            let (decoded, _, _) = decode_line(line.trim_end(), &s).unwrap();
            let back = decoded[0].as_f64().unwrap();
            prop_assert!((back - snapped).abs() <= param.step / 2.0 + 1e-9);
        }
    }
}
