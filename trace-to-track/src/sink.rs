use crate::{
    channels::ChannelAddress,
    features::FeatureRecord,
    track::{TrackPosition, TrackRejection},
};
use radical_common::{Real, Sample};

/// Per-event observables which are not tied to a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
pub enum ScalarKind {
    TrackX,
    TrackY,
    LowGainSum,
    LeadGlassSum,
    ReferenceTime,
}

/// Receives the features of every accepted event.
///
/// Only `observe` and `observe_scalar` must be implemented, the remaining
/// methods do nothing unless overridden.
#[allow(unused_variables)]
pub trait StatisticsSink {
    /// Called once per monitored channel of an accepted event.
    fn observe(&mut self, address: ChannelAddress, record: &FeatureRecord, track: &TrackPosition);

    fn observe_scalar(&mut self, kind: ScalarKind, value: Real);

    /// Called after `observe` with the raw amplitude slice of the channel.
    fn observe_waveform(
        &mut self,
        address: ChannelAddress,
        record: &FeatureRecord,
        amplitude: &[Sample],
    ) {
    }

    fn observe_rejection(&mut self, rejection: &TrackRejection) {}

    /// Called once per accepted event with both calorimeter sums, after
    /// they were passed to `observe_scalar`.
    fn observe_calorimeter(&mut self, low_gain: Real, lead_glass: Real) {}
}

impl<S: StatisticsSink + ?Sized> StatisticsSink for &mut S {
    fn observe(&mut self, address: ChannelAddress, record: &FeatureRecord, track: &TrackPosition) {
        (**self).observe(address, record, track)
    }

    fn observe_scalar(&mut self, kind: ScalarKind, value: Real) {
        (**self).observe_scalar(kind, value)
    }

    fn observe_waveform(
        &mut self,
        address: ChannelAddress,
        record: &FeatureRecord,
        amplitude: &[Sample],
    ) {
        (**self).observe_waveform(address, record, amplitude)
    }

    fn observe_rejection(&mut self, rejection: &TrackRejection) {
        (**self).observe_rejection(rejection)
    }

    fn observe_calorimeter(&mut self, low_gain: Real, lead_glass: Real) {
        (**self).observe_calorimeter(low_gain, lead_glass)
    }
}

/// Combines partial results accumulated by separate workers.
pub trait Merge {
    fn merge(&mut self, other: Self);
}
