//! Defines the parameters used by the address map, the feature extractor,
//! the track reconstructor, the event pipeline and the simulator.
use crate::channels::ChannelAddress;
use clap::Args;
use radical_common::{
    CHANNELS_PER_GROUP, CHANNELS_PER_MODULE, NUM_MODULES, Real, SAMPLE_TIME_NS,
    SAMPLES_PER_CHANNEL,
};

pub const DEFAULT_FRACTION: Real = 0.5;
pub const DEFAULT_SKIP_SAMPLES: usize = 3;
pub const DEFAULT_PEDESTAL_SAMPLES: usize = 50;
pub const DEFAULT_SEARCH_FLOOR: usize = 6;
pub const DEFAULT_SEARCH_GAP: usize = 2;

pub const DEFAULT_MIN_PEAK: Real = 20.0;
pub const DEFAULT_MM_PER_NS: Real = 7.0 / 36.0;

pub const DEFAULT_PROGRESS_INTERVAL: usize = 1000;

/// Shape of the flat amplitude and time arrays delivered with each event.
#[derive(Debug, Clone, PartialEq, Args)]
pub struct DigitiserLayout {
    /// Number of samples recorded by each channel in each event.
    #[clap(long, default_value_t = SAMPLES_PER_CHANNEL)]
    pub samples_per_channel: usize,

    /// Number of channels read out by each module.
    #[clap(long, default_value_t = CHANNELS_PER_MODULE)]
    pub channels_per_module: usize,

    /// Number of consecutive channels sharing one time base.
    #[clap(long, default_value_t = CHANNELS_PER_GROUP)]
    pub channels_per_group: usize,

    /// Number of modules in the readout.
    #[clap(long, default_value_t = NUM_MODULES)]
    pub num_modules: usize,
}

impl Default for DigitiserLayout {
    fn default() -> Self {
        Self {
            samples_per_channel: SAMPLES_PER_CHANNEL,
            channels_per_module: CHANNELS_PER_MODULE,
            channels_per_group: CHANNELS_PER_GROUP,
            num_modules: NUM_MODULES,
        }
    }
}

/// Encapsulates the parameters of the pedestal, peak and constant-fraction search.
#[derive(Debug, Clone, PartialEq, Args)]
pub struct FeatureParameters {
    /// The leading edge is timed where it crosses this fraction of the peak.
    #[clap(long, default_value_t = DEFAULT_FRACTION)]
    pub fraction: Real,

    /// Leading samples ignored by every search, as they are noisy on acquisition.
    #[clap(long, default_value_t = DEFAULT_SKIP_SAMPLES)]
    pub skip_samples: usize,

    /// Number of samples, following the skipped ones, averaged into the pedestal.
    #[clap(long, default_value_t = DEFAULT_PEDESTAL_SAMPLES)]
    pub pedestal_samples: usize,

    /// Lowest sample index visited by the backward crossing search.
    #[clap(long, default_value_t = DEFAULT_SEARCH_FLOOR)]
    pub search_floor: usize,

    /// The backward crossing search starts this many samples before the peak.
    #[clap(long, default_value_t = DEFAULT_SEARCH_GAP)]
    pub search_gap: usize,
}

impl Default for FeatureParameters {
    fn default() -> Self {
        Self {
            fraction: DEFAULT_FRACTION,
            skip_samples: DEFAULT_SKIP_SAMPLES,
            pedestal_samples: DEFAULT_PEDESTAL_SAMPLES,
            search_floor: DEFAULT_SEARCH_FLOOR,
            search_gap: DEFAULT_SEARCH_GAP,
        }
    }
}

/// Encapsulates the wire chamber gate and calibration.
#[derive(Debug, Clone, PartialEq, Args)]
pub struct TrackParameters {
    /// Each reference pulse must exceed this peak (raw units) for the track to be valid.
    #[clap(long, default_value_t = DEFAULT_MIN_PEAK)]
    pub min_peak: Real,

    /// Wire chamber calibration, in mm per ns of timing difference.
    #[clap(long, default_value_t = DEFAULT_MM_PER_NS)]
    pub mm_per_ns: Real,
}

impl Default for TrackParameters {
    fn default() -> Self {
        Self {
            min_peak: DEFAULT_MIN_PEAK,
            mm_per_ns: DEFAULT_MM_PER_NS,
        }
    }
}

/// Addresses of the four wire chamber channels, given as `module,group,channel`.
#[derive(Debug, Clone, PartialEq, Args)]
pub struct ReferenceChannels {
    #[clap(long = "left-channel", default_value = "1,1,2")]
    pub left: ChannelAddress,

    #[clap(long = "right-channel", default_value = "1,1,1")]
    pub right: ChannelAddress,

    #[clap(long = "up-channel", default_value = "1,1,5")]
    pub up: ChannelAddress,

    #[clap(long = "down-channel", default_value = "1,1,3")]
    pub down: ChannelAddress,
}

impl Default for ReferenceChannels {
    fn default() -> Self {
        Self {
            left: ChannelAddress::new(1, 1, 2),
            right: ChannelAddress::new(1, 1, 1),
            up: ChannelAddress::new(1, 1, 5),
            down: ChannelAddress::new(1, 1, 3),
        }
    }
}

/// Channels combined into the per-event calorimeter observables.
#[derive(Debug, Clone, PartialEq, Args)]
pub struct ChannelSelection {
    /// Channels whose peaks are summed into the low gain observable.
    #[clap(
        long = "low-gain-channels",
        num_args = 1..,
        default_values = ["1,0,0", "1,0,1", "1,0,2", "1,0,3", "1,0,4", "1,0,5", "1,0,6", "1,0,7"]
    )]
    pub low_gain: Vec<ChannelAddress>,

    /// Channels whose peaks are summed into the lead glass observable.
    #[clap(
        long = "lead-glass-channels",
        num_args = 1..,
        default_values = ["0,0,10", "0,0,11", "0,0,12", "0,0,13"]
    )]
    pub lead_glass: Vec<ChannelAddress>,

    /// Channel whose leading edge time is reported for every accepted event.
    #[clap(long, default_value = "0,0,7")]
    pub timing_reference: ChannelAddress,
}

impl Default for ChannelSelection {
    fn default() -> Self {
        Self {
            low_gain: (0..8).map(|channel| ChannelAddress::new(1, 0, channel)).collect(),
            lead_glass: (10..14)
                .map(|channel| ChannelAddress::new(0, 0, channel))
                .collect(),
            timing_reference: ChannelAddress::new(0, 0, 7),
        }
    }
}

/// Encapsulates the parameters of the synthetic event source.
#[derive(Debug, Clone, PartialEq, Args)]
pub struct SimulationParameters {
    /// Seed for the random number generator. If absent the generator is seeded from the OS.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Mean horizontal beam position (mm).
    #[clap(long, default_value_t = 10.0)]
    pub beam_x_mean: Real,

    /// Mean vertical beam position (mm).
    #[clap(long, default_value_t = 0.0)]
    pub beam_y_mean: Real,

    /// Standard deviation of the beam profile in both directions (mm).
    #[clap(long, default_value_t = 5.0)]
    pub beam_sd: Real,

    /// Baseline of every channel (mV).
    #[clap(long, default_value_t = 100.0)]
    pub baseline: Real,

    /// Standard deviation of the gaussian noise added to every sample (mV).
    #[clap(long, default_value_t = 1.0)]
    pub noise_sd: Real,

    /// Depth of the wire chamber pulses of accepted events (mV).
    #[clap(long, default_value_t = 150.0)]
    pub reference_amplitude: Real,

    /// Depth of the wire chamber pulses of events meant to be rejected (mV).
    #[clap(long, default_value_t = 10.0)]
    pub rejected_amplitude: Real,

    /// Mean depth of the exponentially distributed pulses on the other channels (mV).
    #[clap(long, default_value_t = 120.0)]
    pub mean_pulse_amplitude: Real,

    /// Duration of the leading edge of every pulse (ns).
    #[clap(long, default_value_t = 1.6)]
    pub rise_time: Real,

    /// Duration of the trailing edge of every pulse (ns).
    #[clap(long, default_value_t = 6.0)]
    pub fall_time: Real,

    /// Time at which the pulses of a centred beam cross half their depth (ns).
    #[clap(long, default_value_t = 100.0)]
    pub trigger_time: Real,

    /// Interval between consecutive samples (ns).
    #[clap(long, default_value_t = SAMPLE_TIME_NS)]
    pub sample_time: Real,

    /// Probability that an event carries sub-threshold wire chamber pulses.
    #[clap(long, default_value_t = 0.1)]
    pub rejected_fraction: Real,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            seed: None,
            beam_x_mean: 10.0,
            beam_y_mean: 0.0,
            beam_sd: 5.0,
            baseline: 100.0,
            noise_sd: 1.0,
            reference_amplitude: 150.0,
            rejected_amplitude: 10.0,
            mean_pulse_amplitude: 120.0,
            rise_time: 1.6,
            fall_time: 6.0,
            trigger_time: 100.0,
            sample_time: SAMPLE_TIME_NS,
            rejected_fraction: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        layout: DigitiserLayout,
        #[command(flatten)]
        features: FeatureParameters,
        #[command(flatten)]
        track: TrackParameters,
        #[command(flatten)]
        references: ReferenceChannels,
        #[command(flatten)]
        selection: ChannelSelection,
        #[command(flatten)]
        simulation: SimulationParameters,
    }

    #[test]
    fn command_line_defaults_match_default_impls() {
        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.layout, DigitiserLayout::default());
        assert_eq!(cli.features, FeatureParameters::default());
        assert_eq!(cli.track, TrackParameters::default());
        assert_eq!(cli.references, ReferenceChannels::default());
        assert_eq!(cli.selection, ChannelSelection::default());
        assert_eq!(cli.simulation, SimulationParameters::default());
    }

    #[test]
    fn channels_from_command_line() {
        let cli = TestCli::parse_from([
            "test",
            "--left-channel",
            "0,1,3",
            "--lead-glass-channels",
            "0,0,1",
            "0,0,2",
            "--fraction",
            "0.2",
        ]);
        assert_eq!(cli.references.left, ChannelAddress::new(0, 1, 3));
        assert_eq!(cli.references.right, ChannelAddress::new(1, 1, 1));
        assert_eq!(
            cli.selection.lead_glass,
            vec![ChannelAddress::new(0, 0, 1), ChannelAddress::new(0, 0, 2)]
        );
        assert_eq!(cli.features.fraction, 0.2);
    }

    #[test]
    fn malformed_channel_is_refused() {
        assert!(TestCli::try_parse_from(["test", "--up-channel", "1,1"]).is_err());
    }
}
