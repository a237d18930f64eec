//! Sampling state machine for scale measurements
//!
//! A button press starts a collection run; sample readings are then buffered
//! until the target count is reached, and the run completes with the buffer
//! averages. Averaging over a fixed number of readings damps scale noise.

use crate::domain::types::{AveragedMeasurement, ClassifiedReading};
use tracing::debug;

/// Number of samples accumulated per measurement run
pub const SAMPLE_TARGET: usize = 20;

/// Output of feeding one classified reading through the state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerOutput {
    /// Live reading passed straight through, in any state
    Live { weight: f64, height: f64 },
    /// A collection run started; current display values should reset to zero
    Started,
    /// A sample was accumulated
    Progress { count: usize, target: usize },
    /// The run completed with the averaged measurement
    Completed(AveragedMeasurement),
}

/// Two-state machine: idle until a trigger, collecting until the target count.
///
/// Weight and height buffers are appended in lockstep and always have equal
/// length; both are cleared together when a run starts or completes.
pub struct Sampler {
    collecting: bool,
    weights: Vec<f64>,
    heights: Vec<f64>,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            collecting: false,
            weights: Vec::with_capacity(SAMPLE_TARGET),
            heights: Vec::with_capacity(SAMPLE_TARGET),
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub fn sample_count(&self) -> usize {
        self.weights.len()
    }

    pub fn handle(&mut self, reading: ClassifiedReading) -> Option<SamplerOutput> {
        match reading {
            ClassifiedReading::RealTime { weight, height } => {
                Some(SamplerOutput::Live { weight, height })
            }
            ClassifiedReading::Trigger => {
                if self.collecting {
                    // Duplicate press mid-run; resetting would lose the measurement
                    debug!(count = %self.weights.len(), "sampler_trigger_ignored");
                    return None;
                }
                self.collecting = true;
                self.weights.clear();
                self.heights.clear();
                Some(SamplerOutput::Started)
            }
            ClassifiedReading::Sample { weight, height } => {
                if !self.collecting {
                    return None;
                }
                self.weights.push(weight);
                self.heights.push(height);

                if self.weights.len() >= SAMPLE_TARGET {
                    Some(SamplerOutput::Completed(self.complete()))
                } else {
                    Some(SamplerOutput::Progress {
                        count: self.weights.len(),
                        target: SAMPLE_TARGET,
                    })
                }
            }
        }
    }

    fn complete(&mut self) -> AveragedMeasurement {
        let weight = round_to(mean(&self.weights), 1);
        let height = round_to(mean(&self.heights), 0);

        self.collecting = false;
        self.weights.clear();
        self.heights.clear();

        AveragedMeasurement { weight, height }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
