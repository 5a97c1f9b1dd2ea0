use metrics::{describe_gauge, gauge};

pub fn component_info_metric(name: &'static str) {
    static NAME: &str = "radical_analysis_component_info";

    describe_gauge!(NAME, "Basic information about the component");

    let git_rev = option_env!("GIT_VERSION").unwrap_or("unknown");
    gauge!(NAME, "component" => name, "git_version" => git_rev).set(1);
}

pub mod names {
    use const_format::concatcp;

    pub const METRIC_NAME_PREFIX: &str = "radical_analysis_";

    pub const EVENTS_PROCESSED: &str = concatcp!(METRIC_NAME_PREFIX, "events_processed");
    pub const EVENTS_REJECTED: &str = concatcp!(METRIC_NAME_PREFIX, "events_rejected");
    pub const FAILURES: &str = concatcp!(METRIC_NAME_PREFIX, "failures");
    pub const CHANNELS_WITHOUT_TIMING: &str =
        concatcp!(METRIC_NAME_PREFIX, "channels_without_timing");
}

pub mod events_rejected {
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, strum::Display)]
    pub enum RejectionKind {
        #[strum(to_string = "low_amplitude")]
        LowAmplitude,
        #[strum(to_string = "undefined_timing")]
        UndefinedTiming,
    }

    // Label building function
    pub fn get_label(rejection_kind: RejectionKind) -> (&'static str, String) {
        ("rejection_kind", rejection_kind.to_string())
    }
}

pub mod failures {
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
    pub enum FailureKind {
        InvalidChannelAddress,
        MalformedWaveform,
        EventTooShort,
        SimulationFailed,
    }

    // Label building function
    pub fn get_label(failure_kind: FailureKind) -> (&'static str, &'static str) {
        (
            "failure_kind",
            match failure_kind {
                FailureKind::InvalidChannelAddress => "invalid_channel_address",
                FailureKind::MalformedWaveform => "malformed_waveform",
                FailureKind::EventTooShort => "event_too_short",
                FailureKind::SimulationFailed => "simulation_failed",
            },
        )
    }
}
