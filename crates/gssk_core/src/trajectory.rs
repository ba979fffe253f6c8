//! Recording of accepted integration steps.

use serde::Serialize;

/// Observer of accepted steps.
///
/// `values` is the full state vector in node order and is only valid for the
/// duration of the call.
pub trait Recorder {
    fn record(&mut self, t: f64, values: &[f64]);
}

/// One recorded state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub time: f64,
    pub values: Vec<f64>,
}

/// Append-only time series of every node's value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    node_ids: Vec<String>,
    samples: Vec<Sample>,
}

impl Trajectory {
    pub fn new(node_ids: Vec<String>) -> Self {
        Self {
            node_ids,
            samples: Vec::new(),
        }
    }

    pub fn with_capacity(node_ids: Vec<String>, capacity: usize) -> Self {
        Self {
            node_ids,
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn node_ids(&self) -> &[String] {
        &self.node_ids
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|sample| sample.time).collect()
    }

    pub fn final_sample(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Values of one node across all samples, or `None` for an unknown id.
    pub fn series(&self, node_id: &str) -> Option<Vec<f64>> {
        let index = self.column(node_id)?;
        Some(self.samples.iter().map(|sample| sample.values[index]).collect())
    }

    pub fn value_at(&self, step: usize, node_id: &str) -> Option<f64> {
        let index = self.column(node_id)?;
        self.samples.get(step).map(|sample| sample.values[index])
    }

    /// Linear interpolation of one node's value at time `t`.
    ///
    /// Returns `None` for unknown ids or times outside the recorded span.
    pub fn interpolate(&self, node_id: &str, t: f64) -> Option<f64> {
        let index = self.column(node_id)?;
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        if t < first.time || t > last.time {
            return None;
        }

        let upper = self.samples.partition_point(|sample| sample.time < t);
        let right = &self.samples[upper];
        if upper == 0 || right.time == t {
            return Some(right.values[index]);
        }
        let left = &self.samples[upper - 1];
        let fraction = (t - left.time) / (right.time - left.time);
        Some(left.values[index] + fraction * (right.values[index] - left.values[index]))
    }

    fn column(&self, node_id: &str) -> Option<usize> {
        self.node_ids.iter().position(|id| id == node_id)
    }
}

impl Recorder for Trajectory {
    fn record(&mut self, t: f64, values: &[f64]) {
        self.samples.push(Sample {
            time: t,
            values: values.to_vec(),
        });
    }
}

/// Streams every accepted step to a closure instead of storing it.
pub struct FnRecorder<F>(pub F);

impl<F: FnMut(f64, &[f64])> Recorder for FnRecorder<F> {
    fn record(&mut self, t: f64, values: &[f64]) {
        (self.0)(t, values)
    }
}
