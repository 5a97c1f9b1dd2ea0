//! In-memory accumulator of the run statistics.
use crate::{
    channels::ChannelAddress,
    features::FeatureRecord,
    sink::{Merge, ScalarKind, StatisticsSink},
    track::{TrackPosition, TrackRejection},
};
use radical_common::{Real, Sample};
use std::collections::BTreeMap;

/// Count, mean, variance and range of a stream of values,
/// updated with Welford's algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStats {
    count: usize,
    mean: Real,
    m2: Real,
    min: Real,
    max: Real,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: Real::INFINITY,
            max: Real::NEG_INFINITY,
        }
    }
}

impl RunningStats {
    pub fn push(&mut self, value: Real) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as Real;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<Real> {
        (self.count > 0).then_some(self.mean)
    }

    /// Population variance.
    pub fn variance(&self) -> Option<Real> {
        (self.count > 0).then(|| self.m2 / self.count as Real)
    }

    pub fn std_dev(&self) -> Option<Real> {
        self.variance().map(Real::sqrt)
    }

    pub fn min(&self) -> Option<Real> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<Real> {
        (self.count > 0).then_some(self.max)
    }
}

impl FromIterator<Real> for RunningStats {
    fn from_iter<T: IntoIterator<Item = Real>>(iter: T) -> Self {
        let mut stats = Self::default();
        iter.into_iter().for_each(|value| stats.push(value));
        stats
    }
}

impl Merge for RunningStats {
    fn merge(&mut self, other: Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other;
            return;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let (na, nb, n) = (self.count as Real, other.count as Real, count as Real);
        self.mean += delta * nb / n;
        self.m2 += other.m2 + delta * delta * na * nb / n;
        self.count = count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

/// Joint moments of a stream of value pairs, updated with the paired
/// form of Welford's algorithm.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct RunningCovariance {
    x: RunningStats,
    y: RunningStats,
    co_moment: Real,
}

impl RunningCovariance {
    pub fn push(&mut self, x: Real, y: Real) {
        let delta_x = x - self.x.mean;
        self.x.push(x);
        self.y.push(y);
        self.co_moment += delta_x * (y - self.y.mean);
    }

    pub fn count(&self) -> usize {
        self.x.count
    }

    pub fn x(&self) -> &RunningStats {
        &self.x
    }

    pub fn y(&self) -> &RunningStats {
        &self.y
    }

    /// Population covariance.
    pub fn covariance(&self) -> Option<Real> {
        (self.count() > 0).then(|| self.co_moment / self.count() as Real)
    }

    /// Pearson correlation, `None` while either variance is zero.
    pub fn correlation(&self) -> Option<Real> {
        let (sx, sy) = (self.x.std_dev()?, self.y.std_dev()?);
        (sx > 0.0 && sy > 0.0)
            .then(|| self.covariance().map(|covariance| covariance / (sx * sy)))
            .flatten()
    }
}

impl Merge for RunningCovariance {
    fn merge(&mut self, other: Self) {
        let (na, nb) = (self.count() as Real, other.count() as Real);
        if nb > 0.0 {
            let n = na + nb;
            let (delta_x, delta_y) = (other.x.mean - self.x.mean, other.y.mean - self.y.mean);
            self.co_moment += other.co_moment + delta_x * delta_y * na * nb / n;
        }
        self.x.merge(other.x);
        self.y.merge(other.y);
    }
}

/// Mean pedestal-subtracted waveform, sign flipped so pulses are positive.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct WaveformProfile {
    sums: Vec<Real>,
    count: usize,
}

impl WaveformProfile {
    pub fn push(&mut self, pedestal: Real, amplitude: &[Sample]) {
        if self.sums.len() < amplitude.len() {
            self.sums.resize(amplitude.len(), 0.0);
        }
        for (sum, &sample) in self.sums.iter_mut().zip(amplitude) {
            *sum -= Real::from(sample) - pedestal;
        }
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean value at each sample index.
    pub fn mean(&self) -> Vec<Real> {
        if self.count == 0 {
            return Vec::new();
        }
        self.sums
            .iter()
            .map(|sum| sum / self.count as Real)
            .collect()
    }
}

impl Merge for WaveformProfile {
    fn merge(&mut self, other: Self) {
        if self.sums.len() < other.sums.len() {
            self.sums.resize(other.sums.len(), 0.0);
        }
        for (sum, value) in self.sums.iter_mut().zip(other.sums) {
            *sum += value;
        }
        self.count += other.count;
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct ChannelStatistics {
    pub peak: RunningStats,
    pub pedestal: RunningStats,
    /// Only records with a defined leading edge contribute.
    pub peak_time: RunningStats,
    pub without_timing: usize,
    pub waveform: WaveformProfile,
    weight: Real,
    weighted_x: Real,
    weighted_y: Real,
}

impl ChannelStatistics {
    fn push(&mut self, record: &FeatureRecord, track: &TrackPosition) {
        self.peak.push(record.peak);
        self.pedestal.push(record.pedestal);
        match record.peak_time {
            Some(time) => self.peak_time.push(time),
            None => self.without_timing += 1,
        }
        let weight = record.peak.max(0.0);
        self.weight += weight;
        self.weighted_x += weight * track.x;
        self.weighted_y += weight * track.y;
    }

    /// Beam position weighted by the peak seen on this channel.
    /// `None` until a positive peak has been observed.
    pub fn centroid(&self) -> Option<TrackPosition> {
        (self.weight > 0.0).then(|| TrackPosition {
            x: self.weighted_x / self.weight,
            y: self.weighted_y / self.weight,
        })
    }
}

impl Merge for ChannelStatistics {
    fn merge(&mut self, other: Self) {
        self.peak.merge(other.peak);
        self.pedestal.merge(other.pedestal);
        self.peak_time.merge(other.peak_time);
        self.without_timing += other.without_timing;
        self.waveform.merge(other.waveform);
        self.weight += other.weight;
        self.weighted_x += other.weighted_x;
        self.weighted_y += other.weighted_y;
    }
}

/// Statistics of a whole run, keyed by channel, observable and rejection.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub channels: BTreeMap<ChannelAddress, ChannelStatistics>,
    pub scalars: BTreeMap<ScalarKind, RunningStats>,
    pub rejections: BTreeMap<TrackRejection, usize>,
    /// Low-gain sum against lead-glass sum.
    pub calorimeter: RunningCovariance,
}

impl RunStatistics {
    pub fn accepted(&self) -> usize {
        self.scalar(ScalarKind::TrackX)
            .map(RunningStats::count)
            .unwrap_or_default()
    }

    pub fn rejected(&self) -> usize {
        self.rejections.values().sum()
    }

    pub fn channel(&self, address: ChannelAddress) -> Option<&ChannelStatistics> {
        self.channels.get(&address)
    }

    pub fn scalar(&self, kind: ScalarKind) -> Option<&RunningStats> {
        self.scalars.get(&kind)
    }
}

impl StatisticsSink for RunStatistics {
    fn observe(&mut self, address: ChannelAddress, record: &FeatureRecord, track: &TrackPosition) {
        self.channels
            .entry(address)
            .or_default()
            .push(record, track);
    }

    fn observe_scalar(&mut self, kind: ScalarKind, value: Real) {
        self.scalars.entry(kind).or_default().push(value);
    }

    fn observe_waveform(
        &mut self,
        address: ChannelAddress,
        record: &FeatureRecord,
        amplitude: &[Sample],
    ) {
        self.channels
            .entry(address)
            .or_default()
            .waveform
            .push(record.pedestal, amplitude);
    }

    fn observe_rejection(&mut self, rejection: &TrackRejection) {
        *self.rejections.entry(*rejection).or_default() += 1;
    }

    fn observe_calorimeter(&mut self, low_gain: Real, lead_glass: Real) {
        self.calorimeter.push(low_gain, lead_glass);
    }
}

impl Merge for RunStatistics {
    fn merge(&mut self, other: Self) {
        for (address, channel) in other.channels {
            self.channels.entry(address).or_default().merge(channel);
        }
        for (kind, stats) in other.scalars {
            self.scalars.entry(kind).or_default().merge(stats);
        }
        for (rejection, count) in other.rejections {
            *self.rejections.entry(rejection).or_default() += count;
        }
        self.calorimeter.merge(other.calorimeter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Reference;
    use assert_approx_eq::assert_approx_eq;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    #[test]
    fn empty_stats() {
        let stats = RunningStats::default();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.variance(), None);
        assert_eq!(stats.min(), None);
    }

    #[test]
    fn running_stats() {
        let stats: RunningStats = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().collect();
        assert_eq!(stats.count(), 8);
        assert_approx_eq!(stats.mean().expect("not empty"), 5.0);
        assert_approx_eq!(stats.variance().expect("not empty"), 4.0);
        assert_approx_eq!(stats.std_dev().expect("not empty"), 2.0);
        assert_eq!(stats.min(), Some(2.0));
        assert_eq!(stats.max(), Some(9.0));
    }

    #[test]
    fn merged_stats_equal_sequential() {
        let mut rng = StdRng::seed_from_u64(7);
        let values: Vec<Real> = (0..500).map(|_| rng.random_range(-50.0..150.0)).collect();
        let sequential: RunningStats = values.iter().copied().collect();

        let (left, right) = values.split_at(123);
        let mut merged: RunningStats = left.iter().copied().collect();
        merged.merge(right.iter().copied().collect());
        merged.merge(RunningStats::default());

        assert_eq!(merged.count(), sequential.count());
        assert_approx_eq!(
            merged.mean().expect("not empty"),
            sequential.mean().expect("not empty"),
            1e-9
        );
        assert_approx_eq!(
            merged.variance().expect("not empty"),
            sequential.variance().expect("not empty"),
            1e-6
        );
        assert_eq!(merged.min(), sequential.min());
        assert_eq!(merged.max(), sequential.max());
    }

    #[test]
    fn covariance_of_linear_pairs() {
        let mut joint = RunningCovariance::default();
        assert_eq!(joint.covariance(), None);
        assert_eq!(joint.correlation(), None);
        for x in [1.0, 2.0, 3.0] {
            joint.push(x, 2.0 * x);
        }
        assert_approx_eq!(joint.covariance().expect("not empty"), 4.0 / 3.0);
        assert_approx_eq!(joint.correlation().expect("both vary"), 1.0);
        assert_approx_eq!(joint.y().mean().expect("not empty"), 4.0);

        let mut anti = RunningCovariance::default();
        for x in [1.0, 2.0, 3.0] {
            anti.push(x, 10.0 - x);
        }
        assert_approx_eq!(anti.correlation().expect("both vary"), -1.0);

        let mut flat = RunningCovariance::default();
        flat.push(1.0, 5.0);
        flat.push(2.0, 5.0);
        assert_eq!(flat.correlation(), None);
    }

    #[test]
    fn merged_covariance_equals_sequential() {
        let mut rng = StdRng::seed_from_u64(13);
        let pairs: Vec<(Real, Real)> = (0..400)
            .map(|_| {
                let x = rng.random_range(0.0..100.0);
                (x, 0.5 * x + rng.random_range(-20.0..20.0))
            })
            .collect();
        let mut sequential = RunningCovariance::default();
        pairs.iter().for_each(|&(x, y)| sequential.push(x, y));

        let (left, right) = pairs.split_at(157);
        let mut merged = RunningCovariance::default();
        left.iter().for_each(|&(x, y)| merged.push(x, y));
        let mut other = RunningCovariance::default();
        right.iter().for_each(|&(x, y)| other.push(x, y));
        merged.merge(other);
        merged.merge(RunningCovariance::default());

        assert_eq!(merged.count(), 400);
        assert_approx_eq!(
            merged.covariance().expect("not empty"),
            sequential.covariance().expect("not empty"),
            1e-6
        );
        assert_approx_eq!(
            merged.correlation().expect("both vary"),
            sequential.correlation().expect("both vary"),
            1e-9
        );
        assert!(sequential.correlation().expect("both vary") > 0.5);
    }

    #[test]
    fn waveform_profile() {
        let mut profile = WaveformProfile::default();
        profile.push(100.0, &[100.0, 90.0, 80.0]);
        profile.push(50.0, &[50.0, 50.0, 30.0]);
        assert_eq!(profile.count(), 2);
        assert_eq!(profile.mean(), vec![0.0, 5.0, 20.0]);

        let mut other = WaveformProfile::default();
        other.push(10.0, &[10.0, 10.0, 10.0, 0.0]);
        profile.merge(other);
        assert_eq!(profile.count(), 3);
        assert_eq!(profile.mean().len(), 4);
    }

    #[test]
    fn centroid_is_weighted_by_peak() {
        let mut channel = ChannelStatistics::default();
        assert_eq!(channel.centroid(), None);

        let record = |peak| FeatureRecord {
            pedestal: 0.0,
            peak,
            peak_time: None,
        };
        channel.push(&record(30.0), &TrackPosition { x: 1.0, y: -2.0 });
        channel.push(&record(10.0), &TrackPosition { x: 5.0, y: 2.0 });
        channel.push(&record(-4.0), &TrackPosition { x: 100.0, y: 100.0 });

        let centroid = channel.centroid().expect("positive peaks were observed");
        assert_approx_eq!(centroid.x, 2.0);
        assert_approx_eq!(centroid.y, -1.0);
        assert_eq!(channel.without_timing, 3);
        assert_eq!(channel.peak.count(), 3);
    }

    #[test]
    fn run_statistics_as_sink() {
        let address = ChannelAddress::new(0, 0, 4);
        let track = TrackPosition { x: 3.0, y: 4.0 };
        let record = FeatureRecord {
            pedestal: 100.0,
            peak: 40.0,
            peak_time: Some(12.0),
        };

        let mut first = RunStatistics::default();
        first.observe_scalar(ScalarKind::TrackX, track.x);
        first.observe_scalar(ScalarKind::TrackY, track.y);
        first.observe(address, &record, &track);
        first.observe_waveform(address, &record, &[100.0, 60.0]);
        first.observe_rejection(&TrackRejection::LowAmplitude(Reference::Up));

        let mut second = RunStatistics::default();
        second.observe_rejection(&TrackRejection::LowAmplitude(Reference::Up));
        second.observe_rejection(&TrackRejection::UndefinedTiming(Reference::Left));
        first.observe_calorimeter(10.0, 100.0);
        second.observe_calorimeter(20.0, 150.0);

        first.merge(second);
        assert_eq!(first.accepted(), 1);
        assert_eq!(first.rejected(), 3);
        assert_eq!(
            first
                .rejections
                .get(&TrackRejection::LowAmplitude(Reference::Up)),
            Some(&2)
        );

        let channel = first.channel(address).expect("channel was observed");
        assert_eq!(channel.peak_time.mean(), Some(12.0));
        assert_eq!(channel.waveform.mean(), vec![0.0, 40.0]);
        assert_eq!(channel.centroid(), Some(track));

        assert_eq!(first.calorimeter.count(), 2);
        assert_approx_eq!(first.calorimeter.covariance().expect("not empty"), 125.0);
    }
}
