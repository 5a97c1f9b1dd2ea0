//! Extracts the pedestal, the peak and the constant-fraction time of a single
//! channel's waveform. Pulses are negative-going, so the peak is the depth of
//! the waveform minimum below the pedestal.
use crate::parameters::FeatureParameters;
use radical_common::{Real, Sample};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExtractionError {
    #[error("Amplitude and time slices differ in length: {amplitude} vs {time}")]
    LengthMismatch { amplitude: usize, time: usize },
    #[error("Waveform of {len} samples does not cover the {required} leading and pedestal samples")]
    TooShort { len: usize, required: usize },
    #[error("Pedestal window is empty")]
    EmptyPedestal,
    #[error("Every sample after the skipped ones is NaN")]
    NoValidSample,
}

/// Features of one channel in one event.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct FeatureRecord {
    /// Mean of the pre-pulse samples.
    pub pedestal: Real,
    /// Pedestal minus the waveform minimum. Non-positive when there is no pulse.
    pub peak: Real,
    /// Interpolated time of the leading edge crossing, `None` if no crossing was found.
    pub peak_time: Option<Real>,
}

impl FeatureRecord {
    pub fn has_pulse(&self) -> bool {
        self.peak > 0.0
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct PulseFeatureExtractor {
    parameters: FeatureParameters,
}

impl PulseFeatureExtractor {
    pub fn new(parameters: FeatureParameters) -> Self {
        Self { parameters }
    }

    /// Returns a copy of this extractor which times the leading edge at a different fraction.
    pub fn with_fraction(&self, fraction: Real) -> Self {
        Self {
            parameters: FeatureParameters {
                fraction,
                ..self.parameters.clone()
            },
        }
    }

    /// Computes the features of the waveform given by `amplitude`, sampled at `time`.
    /// # Parameters
    /// - amplitude: raw amplitude samples of one channel.
    /// - time: time base of the channel, of the same length.
    pub fn extract(
        &self,
        amplitude: &[Sample],
        time: &[Sample],
    ) -> Result<FeatureRecord, ExtractionError> {
        if amplitude.len() != time.len() {
            return Err(ExtractionError::LengthMismatch {
                amplitude: amplitude.len(),
                time: time.len(),
            });
        }
        let FeatureParameters {
            fraction,
            skip_samples,
            pedestal_samples,
            ..
        } = self.parameters;
        if pedestal_samples == 0 {
            return Err(ExtractionError::EmptyPedestal);
        }

        let required = skip_samples + pedestal_samples;
        let too_short = ExtractionError::TooShort {
            len: amplitude.len(),
            required,
        };
        let pedestal_window = amplitude.get(skip_samples..required).ok_or(too_short)?;
        let pedestal = pedestal_window.iter().copied().map(Real::from).sum::<Real>()
            / pedestal_samples as Real;

        let (imin, ymin) =
            find_minimum(amplitude, skip_samples).ok_or(ExtractionError::NoValidSample)?;
        let peak = pedestal - ymin;

        let threshold = pedestal - fraction * peak;
        let peak_time = self.find_leading_edge(amplitude, time, imin, threshold);

        Ok(FeatureRecord {
            pedestal,
            peak,
            peak_time,
        })
    }

    /// Searches backwards from just before the peak for the closest sample
    /// pair straddling the threshold, and interpolates the crossing time.
    fn find_leading_edge(
        &self,
        amplitude: &[Sample],
        time: &[Sample],
        imin: usize,
        threshold: Real,
    ) -> Option<Real> {
        let floor = self.parameters.search_floor;
        let start = imin.checked_sub(self.parameters.search_gap)?;
        if start < floor {
            return None;
        }
        let amplitude = amplitude.get(floor..=start + 1)?;
        let time = time.get(floor..=start + 1)?;

        amplitude
            .windows(2)
            .zip(time.windows(2))
            .rev()
            .find_map(|pair| match pair {
                (&[a0, a1], &[t0, t1]) => {
                    let (a0, a1) = (Real::from(a0), Real::from(a1));
                    let (t0, t1) = (Real::from(t0), Real::from(t1));
                    (a0 >= threshold && a1 < threshold)
                        .then(|| t0 + (threshold - a0) / (a1 - a0) * (t1 - t0))
                }
                _ => None,
            })
    }
}

/// Index and value of the first global minimum at or after `skip`.
/// NaN samples are never chosen.
fn find_minimum(amplitude: &[Sample], skip: usize) -> Option<(usize, Real)> {
    amplitude
        .iter()
        .copied()
        .map(Real::from)
        .enumerate()
        .skip(skip)
        .filter(|(_, value)| !value.is_nan())
        .fold(None, |min, (i, value)| match min {
            Some((_, y)) if value >= y => min,
            _ => Some((i, value)),
        })
}
