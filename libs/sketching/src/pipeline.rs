use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::Registry;

/// Install the global logging pipeline: a forest layer printing whole span trees,
/// filtered at the configured level. `RUST_LOG` directives are layered on top.
pub fn init_subscriber(log_filter: crate::LogLevel) -> Result<(), String> {
    let mut logging_filter: EnvFilter = log_filter.into();

    if let Ok(extra) = std::env::var("RUST_LOG") {
        for directive in extra.split(',').filter(|d| !d.is_empty()) {
            let directive = directive
                .parse()
                .map_err(|err| format!("Invalid directive during log setup: {}", err))?;
            logging_filter = logging_filter.add_directive(directive);
        }
    }

    let forest_layer = tracing_forest::ForestLayer::default().with_filter(logging_filter);
    Registry::default()
        .with(forest_layer)
        .try_init()
        .map_err(|err| format!("Failed to install logging pipeline: {}", err))
}
