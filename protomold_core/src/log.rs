use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

/// Initializes the `tracing_subscriber` used when the engines run headless.
///
/// Both engines emit `debug!`/`trace!` events while walking a format
/// (candidate acceptance, branch pruning, memory commits), so enabling
/// `verbose` is the quickest way to understand why a parse found no path.
/// Calling this twice is harmless, the second registration is ignored.
pub fn init(verbose: bool) {
    let mut level_filter = LevelFilter::INFO;
    if verbose {
        level_filter = LevelFilter::DEBUG;
    }

    let fmt_logger = tracing_subscriber::fmt::Layer::new().with_filter(level_filter);
    let _ = tracing_subscriber::registry().with(fmt_logger).try_init();
}
