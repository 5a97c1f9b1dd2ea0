use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

pub struct TracerOptions {
    /// Applied to the stdout tracer when `RUST_LOG` is absent.
    pub level: LevelFilter,
}

/// This object initialises the stdout tracer, given a TracerOptions struct.
pub struct TracerEngine {
    service_name: String,
}

impl TracerEngine {
    /// Initialises the stdout tracer for the crate
    /// #Arguments
    /// * `options` - The caller-specified instance of TracerOptions.
    /// * `service_name` - The name of the binary, recorded on startup.
    /// * `module_name` - The name of the current module.
    /// #Returns
    /// An instance of TracerEngine
    pub fn new(options: TracerOptions, service_name: &str, module_name: &str) -> Self {
        let stdout_tracer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

        // This filter is applied to the stdout tracer
        let log_filter = EnvFilter::builder()
            .with_default_directive(options.level.into())
            .from_env_lossy();

        let subscriber =
            tracing_subscriber::Registry::default().with(stdout_tracer.with_filter(log_filter));

        //  This is only called once, so will never panic
        tracing::subscriber::set_global_default(subscriber)
            .expect("tracing::subscriber::set_global_default should only be called once");

        debug!(service_name, module_name, "Tracer initialised");
        Self {
            service_name: service_name.to_owned(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}
