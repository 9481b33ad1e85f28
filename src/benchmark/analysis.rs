use crate::ipc::Sample;

/// Tracking quality over a history window.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSummary {
    pub samples: usize,
    pub mean_abs_error: f64,
    pub rms_error: f64,
    pub max_abs_error: f64,
    pub final_error: f64,
}

impl TrackingSummary {
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        let last = samples.last()?;
        let n = samples.len() as f64;

        let mut abs_sum = 0.0;
        let mut sq_sum = 0.0;
        let mut max_abs = 0.0_f64;
        for sample in samples {
            let e = sample.error();
            abs_sum += e.abs();
            sq_sum += e * e;
            max_abs = max_abs.max(e.abs());
        }

        Some(Self {
            samples: samples.len(),
            mean_abs_error: abs_sum / n,
            rms_error: (sq_sum / n).sqrt(),
            max_abs_error: max_abs,
            final_error: last.error(),
        })
    }

    pub fn settled_within(&self, tolerance: f64) -> bool {
        self.final_error.abs() <= tolerance
    }
}
