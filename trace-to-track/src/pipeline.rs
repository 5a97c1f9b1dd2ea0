//! Drives the per-event analysis: reference features, track gate, channel
//! features and derived observables, handed to a [`StatisticsSink`].
use crate::{
    channels::{ChannelAddress, ChannelAddressMap, ChannelError, ChannelOffsets},
    event::EventRecord,
    features::{ExtractionError, FeatureRecord, PulseFeatureExtractor},
    parameters::{ChannelSelection, DEFAULT_PROGRESS_INTERVAL, ReferenceChannels},
    sink::{Merge, ScalarKind, StatisticsSink},
    track::{ReferenceFeatures, TrackPosition, TrackReconstructor, TrackRejection},
};
use metrics::counter;
use radical_common::{
    Real, Sample,
    metrics::{
        events_rejected,
        failures::{self, FailureKind},
        names::{CHANNELS_WITHOUT_TIMING, EVENTS_PROCESSED, EVENTS_REJECTED, FAILURES},
    },
};
use rayon::prelude::*;
use std::{
    borrow::Borrow,
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid channel: {0}")]
    Channel(#[from] ChannelError),
    #[error("Cannot extract features of {address}: {source}")]
    Extraction {
        address: ChannelAddress,
        source: ExtractionError,
    },
    #[error("Amplitude slice of {address} ends at {end}, beyond the {len} samples of the event")]
    AmplitudeOutOfBounds {
        address: ChannelAddress,
        end: usize,
        len: usize,
    },
    #[error("Time slice of {address} ends at {end}, beyond the {len} samples of the event")]
    TimeOutOfBounds {
        address: ChannelAddress,
        end: usize,
        len: usize,
    },
}

impl PipelineError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PipelineError::Channel(_) => FailureKind::InvalidChannelAddress,
            PipelineError::Extraction { .. } => FailureKind::MalformedWaveform,
            PipelineError::AmplitudeOutOfBounds { .. } | PipelineError::TimeOutOfBounds { .. } => {
                FailureKind::EventTooShort
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventOutcome {
    Accepted(TrackPosition),
    Rejected(TrackRejection),
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub accepted: usize,
    pub rejected: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &EventOutcome) {
        match outcome {
            EventOutcome::Accepted(_) => self.accepted += 1,
            EventOutcome::Rejected(_) => self.rejected += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.accepted + self.rejected
    }
}

impl Merge for RunSummary {
    fn merge(&mut self, other: Self) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
    }
}

/// A channel address together with its resolved offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LocatedChannel {
    address: ChannelAddress,
    offsets: ChannelOffsets,
}

impl LocatedChannel {
    fn new(map: &ChannelAddressMap, address: ChannelAddress) -> Result<Self, ChannelError> {
        Ok(Self {
            address,
            offsets: map.locate(address)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LocatedReferences {
    left: LocatedChannel,
    right: LocatedChannel,
    up: LocatedChannel,
    down: LocatedChannel,
}

#[derive(Debug)]
pub struct EventPipeline {
    map: ChannelAddressMap,
    extractor: PulseFeatureExtractor,
    reconstructor: TrackReconstructor,
    references: LocatedReferences,
    monitored: Vec<LocatedChannel>,
    low_gain: Vec<LocatedChannel>,
    lead_glass: Vec<LocatedChannel>,
    timing_reference: LocatedChannel,
    progress_interval: usize,
    processed: AtomicUsize,
}

impl EventPipeline {
    /// Resolves every channel the pipeline reads, so that invalid addresses
    /// are reported before any event is processed.
    pub fn new(
        map: ChannelAddressMap,
        extractor: PulseFeatureExtractor,
        reconstructor: TrackReconstructor,
        references: &ReferenceChannels,
        selection: &ChannelSelection,
    ) -> Result<Self, ChannelError> {
        let locate = |address| LocatedChannel::new(&map, address);
        let locate_all = |addresses: &[ChannelAddress]| {
            addresses
                .iter()
                .copied()
                .map(locate)
                .collect::<Result<Vec<_>, _>>()
        };

        let references = LocatedReferences {
            left: locate(references.left)?,
            right: locate(references.right)?,
            up: locate(references.up)?,
            down: locate(references.down)?,
        };
        let monitored = map.all_channels().map(locate).collect::<Result<_, _>>()?;
        let low_gain = locate_all(&selection.low_gain)?;
        let lead_glass = locate_all(&selection.lead_glass)?;
        let timing_reference = locate(selection.timing_reference)?;

        Ok(Self {
            map,
            extractor,
            reconstructor,
            references,
            monitored,
            low_gain,
            lead_glass,
            timing_reference,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            processed: AtomicUsize::new(0),
        })
    }

    /// Sets the number of events between progress reports, zero disables them.
    pub fn with_progress_interval(self, progress_interval: usize) -> Self {
        Self {
            progress_interval,
            ..self
        }
    }

    pub fn map(&self) -> &ChannelAddressMap {
        &self.map
    }

    /// Number of events passed to `process_event` so far.
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    #[tracing::instrument(skip_all, fields(run = event.run, event = event.event0, trigger = event.trigger))]
    pub fn process_event<S: StatisticsSink>(
        &self,
        event: &EventRecord,
        sink: &mut S,
    ) -> Result<EventOutcome, PipelineError> {
        self.report_progress();
        match self.analyse(event, sink) {
            Ok(outcome) => {
                counter!(EVENTS_PROCESSED).increment(1);
                Ok(outcome)
            }
            Err(e) => {
                warn!("{e}");
                counter!(FAILURES, &[failures::get_label(e.failure_kind())]).increment(1);
                Err(e)
            }
        }
    }

    /// Processes `events` in order, feeding every outcome to `sink`.
    /// Stops at the first failure.
    pub fn run<I, S>(&self, events: I, sink: &mut S) -> Result<RunSummary, PipelineError>
    where
        I: IntoIterator,
        I::Item: Borrow<EventRecord>,
        S: StatisticsSink,
    {
        events.into_iter().try_fold(
            RunSummary::default(),
            |mut summary, event| -> Result<_, PipelineError> {
                summary.record(&self.process_event(event.borrow(), &mut *sink)?);
                Ok(summary)
            },
        )
    }

    /// Processes `events` on the rayon thread pool. Each worker accumulates
    /// into its own sink, and the partial sinks are merged at the end.
    pub fn run_parallel<S>(&self, events: &[EventRecord]) -> Result<(S, RunSummary), PipelineError>
    where
        S: StatisticsSink + Merge + Default + Send,
    {
        events
            .par_iter()
            .try_fold(
                || (S::default(), RunSummary::default()),
                |(mut sink, mut summary), event| -> Result<_, PipelineError> {
                    summary.record(&self.process_event(event, &mut sink)?);
                    Ok((sink, summary))
                },
            )
            .try_reduce(
                || (S::default(), RunSummary::default()),
                |(mut sink, mut summary), (other_sink, other_summary)| {
                    sink.merge(other_sink);
                    summary.merge(other_summary);
                    Ok((sink, summary))
                },
            )
    }

    fn report_progress(&self) {
        let count = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if self.progress_interval != 0 && count % self.progress_interval == 0 {
            info!("Processed {count} events");
        }
    }

    fn analyse<S: StatisticsSink>(
        &self,
        event: &EventRecord,
        sink: &mut S,
    ) -> Result<EventOutcome, PipelineError> {
        let references = ReferenceFeatures {
            left: self.extract(event, &self.references.left)?,
            right: self.extract(event, &self.references.right)?,
            up: self.extract(event, &self.references.up)?,
            down: self.extract(event, &self.references.down)?,
        };

        let track = match self.reconstructor.reconstruct(&references) {
            Ok(track) => track,
            Err(rejection) => {
                debug!("Event rejected: {rejection}");
                counter!(
                    EVENTS_REJECTED,
                    &[events_rejected::get_label(rejection.kind())]
                )
                .increment(1);
                sink.observe_rejection(&rejection);
                return Ok(EventOutcome::Rejected(rejection));
            }
        };
        trace!("Track at ({}, {}) mm", track.x, track.y);
        sink.observe_scalar(ScalarKind::TrackX, track.x);
        sink.observe_scalar(ScalarKind::TrackY, track.y);

        // Keyed by amplitude offset, so aliased addresses share a record.
        let mut features = HashMap::<usize, FeatureRecord>::with_capacity(self.monitored.len());
        for channel in &self.monitored {
            let (amplitude, time) = self.slices(event, channel)?;
            let record = self.extract_slices(channel, amplitude, time)?;
            if record.peak_time.is_none() {
                counter!(CHANNELS_WITHOUT_TIMING).increment(1);
            }
            sink.observe(channel.address, &record, &track);
            sink.observe_waveform(channel.address, &record, amplitude);
            features.insert(channel.offsets.amplitude, record);
        }

        let low_gain = self.sum_peaks(event, &self.low_gain, &features)?;
        sink.observe_scalar(ScalarKind::LowGainSum, low_gain);
        let lead_glass = self.sum_peaks(event, &self.lead_glass, &features)?;
        sink.observe_scalar(ScalarKind::LeadGlassSum, lead_glass);
        sink.observe_calorimeter(low_gain, lead_glass);

        let timing = self.cached_or_extract(event, &self.timing_reference, &features)?;
        if let Some(time) = timing.peak_time {
            sink.observe_scalar(ScalarKind::ReferenceTime, time);
        }

        Ok(EventOutcome::Accepted(track))
    }

    fn sum_peaks(
        &self,
        event: &EventRecord,
        channels: &[LocatedChannel],
        features: &HashMap<usize, FeatureRecord>,
    ) -> Result<Real, PipelineError> {
        channels
            .iter()
            .map(|channel| -> Result<Real, PipelineError> {
                Ok(self.cached_or_extract(event, channel, features)?.peak)
            })
            .sum()
    }

    fn cached_or_extract(
        &self,
        event: &EventRecord,
        channel: &LocatedChannel,
        features: &HashMap<usize, FeatureRecord>,
    ) -> Result<FeatureRecord, PipelineError> {
        match features.get(&channel.offsets.amplitude) {
            Some(record) => Ok(*record),
            None => self.extract(event, channel),
        }
    }

    #[tracing::instrument(skip_all, level = "trace", fields(channel = %channel.address))]
    fn extract(
        &self,
        event: &EventRecord,
        channel: &LocatedChannel,
    ) -> Result<FeatureRecord, PipelineError> {
        let (amplitude, time) = self.slices(event, channel)?;
        self.extract_slices(channel, amplitude, time)
    }

    fn extract_slices(
        &self,
        channel: &LocatedChannel,
        amplitude: &[Sample],
        time: &[Sample],
    ) -> Result<FeatureRecord, PipelineError> {
        self.extractor
            .extract(amplitude, time)
            .map_err(|source| PipelineError::Extraction {
                address: channel.address,
                source,
            })
    }

    fn slices<'a>(
        &self,
        event: &'a EventRecord,
        channel: &LocatedChannel,
    ) -> Result<(&'a [Sample], &'a [Sample]), PipelineError> {
        let len = self.map.samples_per_channel();
        let ChannelOffsets { amplitude, time } = channel.offsets;

        let amplitude = event
            .amplitude
            .get(amplitude..amplitude + len)
            .ok_or(PipelineError::AmplitudeOutOfBounds {
                address: channel.address,
                end: amplitude + len,
                len: event.amplitude.len(),
            })?;
        let time = event
            .time
            .get(time..time + len)
            .ok_or(PipelineError::TimeOutOfBounds {
                address: channel.address,
                end: time + len,
                len: event.time.len(),
            })?;
        Ok((amplitude, time))
    }
}
