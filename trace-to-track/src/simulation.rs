//! Generates synthetic events with a known beam position.
//!
//! Every channel carries a flat baseline with gaussian noise. The four wire
//! chamber channels carry triangular pulses whose half-depth crossings are
//! offset from the trigger time so that the track reconstruction recovers
//! the drawn beam position; the remaining channels carry pulses of
//! exponentially distributed depth at the trigger time.
use crate::{
    channels::{ChannelAddressMap, ChannelError},
    event::EventRecord,
    parameters::{ReferenceChannels, SimulationParameters, TrackParameters},
    track::TrackPosition,
};
use radical_common::{EventId, Real, Sample};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Exp, ExpError, Normal, NormalError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid reference channel: {0}")]
    Channel(#[from] ChannelError),
    #[error("Invalid Normal Distribution: {0}")]
    NormalDistribution(#[from] NormalError),
    #[error("Invalid Exponential Distribution: {0}")]
    ExpDistribution(#[from] ExpError),
    #[error("Parameter {name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: Real },
    #[error("Parameter {name} must not be negative, got {value}")]
    Negative { name: &'static str, value: Real },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedEvent {
    pub record: EventRecord,
    /// Position the event was generated at, `None` if its wire chamber
    /// pulses were made too small to pass the gate.
    pub beam: Option<TrackPosition>,
}

/// Triangular negative-going pulse, starting at `onset` and back at baseline after `rise + fall`.
#[derive(Debug, Clone, Copy)]
struct Pulse {
    onset: Real,
    rise: Real,
    fall: Real,
    depth: Real,
}

impl Pulse {
    fn value(&self, time: Real) -> Real {
        let elapsed = time - self.onset;
        if elapsed < 0.0 {
            0.0
        } else if elapsed < self.rise {
            -self.depth * elapsed / self.rise
        } else if elapsed < self.rise + self.fall {
            -self.depth * (1.0 - (elapsed - self.rise) / self.fall)
        } else {
            0.0
        }
    }
}

pub struct EventSimulator {
    map: ChannelAddressMap,
    /// Wire chamber index (left, right, up, down) of every channel slot, in
    /// amplitude array order. `None` marks a calorimeter channel.
    roles: Vec<Option<usize>>,
    mm_per_ns: Real,
    parameters: SimulationParameters,
    rng: StdRng,
    noise: Normal<Real>,
    beam_x: Normal<Real>,
    beam_y: Normal<Real>,
    pulse_depth: Exp<Real>,
    next_event: EventId,
}

impl EventSimulator {
    pub fn new(
        map: ChannelAddressMap,
        references: ReferenceChannels,
        track: TrackParameters,
        parameters: SimulationParameters,
    ) -> Result<Self, SimulationError> {
        for (name, value) in [
            ("rise_time", parameters.rise_time),
            ("fall_time", parameters.fall_time),
            ("sample_time", parameters.sample_time),
            ("mm_per_ns", track.mm_per_ns),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(SimulationError::NonPositive { name, value });
            }
        }
        // NaN spreads are left to `Normal::new`.
        for (name, value) in [
            ("noise_sd", parameters.noise_sd),
            ("beam_sd", parameters.beam_sd),
        ] {
            if value < 0.0 {
                return Err(SimulationError::Negative { name, value });
            }
        }
        let reference_offsets = [
            map.locate(references.left)?.amplitude,
            map.locate(references.right)?.amplitude,
            map.locate(references.up)?.amplitude,
            map.locate(references.down)?.amplitude,
        ];
        let roles = map
            .all_channels()
            .map(|address| {
                let offset = map.locate(address)?.amplitude;
                Ok(reference_offsets.iter().position(|&r| r == offset))
            })
            .collect::<Result<Vec<_>, ChannelError>>()?;
        let rng = match parameters.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            noise: Normal::new(0.0, parameters.noise_sd)?,
            beam_x: Normal::new(parameters.beam_x_mean, parameters.beam_sd)?,
            beam_y: Normal::new(parameters.beam_y_mean, parameters.beam_sd)?,
            pulse_depth: Exp::new(1.0 / parameters.mean_pulse_amplitude)?,
            map,
            roles,
            mm_per_ns: track.mm_per_ns,
            parameters,
            rng,
            next_event: 0,
        })
    }

    fn pulse(&self, crossing: Real, depth: Real) -> Pulse {
        Pulse {
            onset: crossing - 0.5 * self.parameters.rise_time,
            rise: self.parameters.rise_time,
            fall: self.parameters.fall_time,
            depth,
        }
    }

    pub fn generate(&mut self) -> SimulatedEvent {
        let samples_per_channel = self.map.samples_per_channel();
        let sample_time = self.parameters.sample_time;
        let trigger_time = self.parameters.trigger_time;

        let beam = TrackPosition {
            x: self.beam_x.sample(&mut self.rng),
            y: self.beam_y.sample(&mut self.rng),
        };
        let rejected = self.rng.random::<Real>() < self.parameters.rejected_fraction;
        let reference_depth = if rejected {
            self.parameters.rejected_amplitude
        } else {
            self.parameters.reference_amplitude
        };

        let half_x = beam.x / (2.0 * self.mm_per_ns);
        let half_y = beam.y / (2.0 * self.mm_per_ns);
        let crossings = [
            trigger_time - half_x,
            trigger_time + half_x,
            trigger_time - half_y,
            trigger_time + half_y,
        ];

        let mut amplitude: Vec<Sample> = Vec::with_capacity(self.map.amplitude_len());
        for role in &self.roles {
            let pulse = match role.and_then(|index| crossings.get(index)) {
                Some(&crossing) => self.pulse(crossing, reference_depth),
                None => {
                    let depth = self.pulse_depth.sample(&mut self.rng);
                    self.pulse(trigger_time, depth)
                }
            };
            for i in 0..samples_per_channel {
                let time = i as Real * sample_time;
                let value = self.parameters.baseline
                    + pulse.value(time)
                    + self.noise.sample(&mut self.rng);
                amplitude.push(value as Sample);
            }
        }

        let time = (0..self.map.time_len())
            .map(|i| ((i % samples_per_channel) as Real * sample_time) as Sample)
            .collect();

        let id = self.next_event;
        self.next_event = self.next_event.wrapping_add(1);
        debug!("Simulated event {id} at ({}, {}) mm, rejected: {rejected}", beam.x, beam.y);

        SimulatedEvent {
            record: EventRecord {
                run: 0,
                event0: id,
                event1: id,
                trigger: id,
                amplitude,
                time,
            },
            beam: (!rejected).then_some(beam),
        }
    }
}

impl Iterator for EventSimulator {
    type Item = SimulatedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channels::ChannelAddress,
        features::PulseFeatureExtractor,
        parameters::{ChannelSelection, DigitiserLayout},
        pipeline::{EventOutcome, EventPipeline},
        statistics::RunStatistics,
        track::{Reference, TrackReconstructor, TrackRejection},
    };
    use assert_approx_eq::assert_approx_eq;

    fn map() -> ChannelAddressMap {
        ChannelAddressMap::new(DigitiserLayout::default()).expect("default layout is valid")
    }

    fn simulator(parameters: SimulationParameters) -> EventSimulator {
        EventSimulator::new(
            map(),
            ReferenceChannels::default(),
            TrackParameters::default(),
            parameters,
        )
        .expect("parameters are valid")
    }

    fn pipeline() -> EventPipeline {
        EventPipeline::new(
            map(),
            PulseFeatureExtractor::default(),
            TrackReconstructor::default(),
            &ReferenceChannels::default(),
            &ChannelSelection::default(),
        )
        .expect("default channels are valid")
    }

    #[test]
    fn pulse_shape() {
        let pulse = Pulse {
            onset: 10.0,
            rise: 2.0,
            fall: 4.0,
            depth: 50.0,
        };
        assert_eq!(pulse.value(9.0), 0.0);
        assert_approx_eq!(pulse.value(11.0), -25.0);
        assert_approx_eq!(pulse.value(12.0), -50.0);
        assert_approx_eq!(pulse.value(14.0), -25.0);
        assert_eq!(pulse.value(16.5), 0.0);
    }

    #[test]
    fn event_shape() {
        let event = simulator(SimulationParameters {
            seed: Some(3),
            ..Default::default()
        })
        .generate();
        assert_eq!(event.record.amplitude.len(), 1024 * 36);
        assert_eq!(event.record.time.len(), 1024 * 4);
        assert_approx_eq!(event.record.time[1024 + 10], 2.0, 1e-5);
    }

    #[test]
    fn every_channel_slot_has_a_role() {
        let simulator = simulator(SimulationParameters::default());
        assert_eq!(simulator.roles.len(), 36);
        let mut references: Vec<_> = simulator.roles.iter().flatten().copied().collect();
        references.sort_unstable();
        assert_eq!(references, [0, 1, 2, 3]);
    }

    #[test]
    fn reference_outside_layout_is_refused() {
        let result = EventSimulator::new(
            map(),
            ReferenceChannels {
                left: ChannelAddress::new(7, 0, 0),
                ..Default::default()
            },
            TrackParameters::default(),
            SimulationParameters::default(),
        );
        assert!(matches!(result, Err(SimulationError::Channel(_))));
    }

    #[test]
    fn seeded_simulation_is_reproducible() {
        let parameters = SimulationParameters {
            seed: Some(11),
            ..Default::default()
        };
        let first: Vec<_> = simulator(parameters.clone()).take(3).collect();
        let second: Vec<_> = simulator(parameters).take(3).collect();
        assert_eq!(first, second);
        assert_eq!(first[2].record.event0, 2);
    }

    #[test]
    fn reconstruction_recovers_beam() {
        let events = simulator(SimulationParameters {
            seed: Some(5),
            beam_sd: 2.0,
            noise_sd: 0.0,
            rejected_fraction: 0.0,
            ..Default::default()
        });
        let pipeline = pipeline();
        let mut statistics = RunStatistics::default();
        for event in events.take(50) {
            let beam = event.beam.expect("no event is meant to be rejected");
            let outcome = pipeline
                .process_event(&event.record, &mut statistics)
                .expect("simulated events are well formed");
            let EventOutcome::Accepted(track) = outcome else {
                panic!("event should be accepted, got {outcome:?}");
            };
            assert_approx_eq!(track.x, beam.x, 0.1);
            assert_approx_eq!(track.y, beam.y, 0.1);
        }
        assert_eq!(statistics.accepted(), 50);
    }

    #[test]
    fn small_reference_pulses_are_rejected() {
        let events = simulator(SimulationParameters {
            seed: Some(9),
            rejected_fraction: 1.0,
            ..Default::default()
        });
        let pipeline = pipeline();
        let mut statistics = RunStatistics::default();
        let summary = pipeline
            .run(events.take(10).map(|event| event.record), &mut statistics)
            .expect("simulated events are well formed");
        assert_eq!(summary.rejected, 10);
        assert_eq!(
            statistics
                .rejections
                .get(&TrackRejection::LowAmplitude(Reference::Left)),
            Some(&10)
        );
    }

    fn with_parameters(parameters: SimulationParameters) -> Result<EventSimulator, SimulationError> {
        EventSimulator::new(
            map(),
            ReferenceChannels::default(),
            TrackParameters::default(),
            parameters,
        )
    }

    #[test]
    fn invalid_parameters() {
        let result = with_parameters(SimulationParameters {
            noise_sd: -1.0,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(SimulationError::Negative {
                name: "noise_sd",
                ..
            })
        ));

        let result = with_parameters(SimulationParameters {
            beam_sd: -2.0,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(SimulationError::Negative {
                name: "beam_sd",
                ..
            })
        ));

        let result = with_parameters(SimulationParameters {
            noise_sd: Real::INFINITY,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(SimulationError::NormalDistribution(_))
        ));

        let result = EventSimulator::new(
            map(),
            ReferenceChannels::default(),
            TrackParameters::default(),
            SimulationParameters {
                rise_time: 0.0,
                ..Default::default()
            },
        );
        assert!(matches!(
            result,
            Err(SimulationError::NonPositive {
                name: "rise_time",
                ..
            })
        ));
    }
}
