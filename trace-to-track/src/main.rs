use anyhow::Result;
use clap::Parser;
use itertools::Itertools;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use radical_common::{
    CommonOpts, init_tracer,
    metrics::{
        component_info_metric,
        failures::{self, FailureKind},
        names::{CHANNELS_WITHOUT_TIMING, EVENTS_PROCESSED, EVENTS_REJECTED, FAILURES},
    },
};
use trace_to_track::{
    channels::ChannelAddressMap,
    features::PulseFeatureExtractor,
    parameters::{
        ChannelSelection, DEFAULT_PROGRESS_INTERVAL, DigitiserLayout, FeatureParameters,
        ReferenceChannels, SimulationParameters, TrackParameters,
    },
    pipeline::{EventPipeline, RunSummary},
    simulation::EventSimulator,
    sink::ScalarKind,
    statistics::{RunStatistics, RunningStats},
    track::TrackReconstructor,
};
use tracing::{debug, error, info};

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(flatten)]
    common: CommonOpts,

    #[clap(flatten)]
    layout: DigitiserLayout,

    #[clap(flatten)]
    features: FeatureParameters,

    #[clap(flatten)]
    track: TrackParameters,

    #[clap(flatten)]
    references: ReferenceChannels,

    #[clap(flatten)]
    selection: ChannelSelection,

    #[clap(flatten)]
    simulation: SimulationParameters,

    /// Number of events to generate and analyse.
    #[clap(long, default_value = "10000")]
    num_events: usize,

    /// If set, events are analysed on the rayon thread pool.
    #[clap(long)]
    parallel: bool,

    /// Number of events between progress reports, zero disables them.
    #[clap(long, default_value_t = DEFAULT_PROGRESS_INTERVAL)]
    progress_interval: usize,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let tracer = init_tracer!(args.common.log_level);

    if let Some(address) = args.common.observability_address {
        PrometheusBuilder::new()
            .with_http_listener(address)
            .install()?;
    }
    describe_metrics();
    component_info_metric("trace-to-track");

    let map = ChannelAddressMap::new(args.layout.clone()).inspect_err(|e| {
        error!("{e}");
        counter!(
            FAILURES,
            &[failures::get_label(FailureKind::InvalidChannelAddress)]
        )
        .increment(1);
    })?;
    let pipeline = EventPipeline::new(
        map.clone(),
        PulseFeatureExtractor::new(args.features.clone()),
        TrackReconstructor::new(args.track.clone()),
        &args.references,
        &args.selection,
    )
    .inspect_err(|e| {
        error!("{e}");
        counter!(
            FAILURES,
            &[failures::get_label(FailureKind::InvalidChannelAddress)]
        )
        .increment(1);
    })?
    .with_progress_interval(args.progress_interval);

    let simulator = EventSimulator::new(
        map,
        args.references.clone(),
        args.track.clone(),
        args.simulation.clone(),
    )
    .inspect_err(|e| {
        error!("{e}");
        counter!(
            FAILURES,
            &[failures::get_label(FailureKind::SimulationFailed)]
        )
        .increment(1);
    })?;

    info!(
        "{}: analysing {} simulated events{}",
        tracer.service_name(),
        args.num_events,
        if args.parallel { " in parallel" } else { "" }
    );
    let events = simulator.take(args.num_events).map(|event| event.record);
    let (statistics, summary) = if args.parallel {
        let events: Vec<_> = events.collect();
        pipeline.run_parallel::<RunStatistics>(&events)?
    } else {
        let mut statistics = RunStatistics::default();
        let summary = pipeline.run(events, &mut statistics)?;
        (statistics, summary)
    };

    log_summary(&summary, &statistics);
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!(
        EVENTS_PROCESSED,
        metrics::Unit::Count,
        "Number of events processed"
    );
    metrics::describe_counter!(
        EVENTS_REJECTED,
        metrics::Unit::Count,
        "Number of events rejected by the wire chamber gate"
    );
    metrics::describe_counter!(
        FAILURES,
        metrics::Unit::Count,
        "Number of failures encountered"
    );
    metrics::describe_counter!(
        CHANNELS_WITHOUT_TIMING,
        metrics::Unit::Count,
        "Number of accepted channel waveforms without a leading edge"
    );
}

fn format_stats(stats: &RunningStats) -> String {
    match (stats.mean(), stats.std_dev()) {
        (Some(mean), Some(std_dev)) => format!("{mean:.3} ± {std_dev:.3} (n = {})", stats.count()),
        _ => "no entries".to_owned(),
    }
}

fn log_summary(summary: &RunSummary, statistics: &RunStatistics) {
    info!(
        "Events: {} accepted, {} rejected",
        summary.accepted, summary.rejected
    );
    if !statistics.rejections.is_empty() {
        info!(
            "Rejections: {}",
            statistics
                .rejections
                .iter()
                .map(|(rejection, count)| format!("{rejection}: {count}"))
                .join(", ")
        );
    }

    for kind in [
        ScalarKind::TrackX,
        ScalarKind::TrackY,
        ScalarKind::LowGainSum,
        ScalarKind::LeadGlassSum,
        ScalarKind::ReferenceTime,
    ] {
        let line = statistics
            .scalar(kind)
            .map(format_stats)
            .unwrap_or_else(|| "no entries".to_owned());
        info!("{kind}: {line}");
    }
    if let Some(correlation) = statistics.calorimeter.correlation() {
        info!(
            "{} against {}: correlation {correlation:.3}",
            ScalarKind::LowGainSum,
            ScalarKind::LeadGlassSum
        );
    }

    for (address, channel) in &statistics.channels {
        let centroid = channel
            .centroid()
            .map(|centroid| format!("({:.2}, {:.2}) mm", centroid.x, centroid.y))
            .unwrap_or_else(|| "undefined".to_owned());
        debug!(
            "{address}: peak {}, centroid {centroid}, {} without timing",
            format_stats(&channel.peak),
            channel.without_timing
        );
    }
}
