//! Reconstructs the beam position from the wire chamber reference channels.
use crate::{features::FeatureRecord, parameters::TrackParameters};
use radical_common::{Real, metrics::events_rejected::RejectionKind};
use thiserror::Error;

/// The four wire chamber readouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
pub enum Reference {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct ReferenceFeatures {
    pub left: FeatureRecord,
    pub right: FeatureRecord,
    pub up: FeatureRecord,
    pub down: FeatureRecord,
}

impl ReferenceFeatures {
    pub fn iter(&self) -> impl Iterator<Item = (Reference, &FeatureRecord)> {
        [
            (Reference::Left, &self.left),
            (Reference::Right, &self.right),
            (Reference::Up, &self.up),
            (Reference::Down, &self.down),
        ]
        .into_iter()
    }
}

/// Reason for which no track could be reconstructed, naming the first reference to fail.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackRejection {
    #[error("{0} reference pulse does not exceed the amplitude threshold")]
    LowAmplitude(Reference),
    #[error("{0} reference pulse has no positive leading edge time")]
    UndefinedTiming(Reference),
}

impl TrackRejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            TrackRejection::LowAmplitude(_) => RejectionKind::LowAmplitude,
            TrackRejection::UndefinedTiming(_) => RejectionKind::UndefinedTiming,
        }
    }

    pub fn reference(&self) -> Reference {
        match *self {
            TrackRejection::LowAmplitude(reference) => reference,
            TrackRejection::UndefinedTiming(reference) => reference,
        }
    }
}

/// Beam position in mm.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct TrackPosition {
    pub x: Real,
    pub y: Real,
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct TrackReconstructor {
    parameters: TrackParameters,
}

impl TrackReconstructor {
    pub fn new(parameters: TrackParameters) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &TrackParameters {
        &self.parameters
    }

    /// Applies the amplitude gate to every reference, then the timing gate,
    /// and converts the left/right and up/down time differences into a position.
    pub fn reconstruct(
        &self,
        references: &ReferenceFeatures,
    ) -> Result<TrackPosition, TrackRejection> {
        let min_peak = self.parameters.min_peak;
        if let Some((reference, _)) = references
            .iter()
            .find(|(_, record)| record.peak.is_nan() || record.peak <= min_peak)
        {
            return Err(TrackRejection::LowAmplitude(reference));
        }

        let time_of = |reference, record: &FeatureRecord| {
            record
                .peak_time
                .filter(|&time| time > 0.0)
                .ok_or(TrackRejection::UndefinedTiming(reference))
        };
        let left = time_of(Reference::Left, &references.left)?;
        let right = time_of(Reference::Right, &references.right)?;
        let up = time_of(Reference::Up, &references.up)?;
        let down = time_of(Reference::Down, &references.down)?;

        Ok(TrackPosition {
            x: self.parameters.mm_per_ns * (right - left),
            y: self.parameters.mm_per_ns * (down - up),
        })
    }
}
