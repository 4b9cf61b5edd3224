use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use crate::args::GlobalArgs;

/// Install a stderr `fmt` subscriber.
///
/// `-q`/`-v` pick the level, then `debug = true` in the settings; without
/// either `RUST_LOG` is honored, falling back to warnings only.
pub fn init_tracing(args: &GlobalArgs, settings_debug: bool) {
    let env_filter = match level_from_flags(args, settings_debug) {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .without_time()
        .with_filter(env_filter);

    // Already installed when commands run in-process, e.g. from tests.
    let _ = Registry::default().with(layer).try_init();
}

fn level_from_flags(args: &GlobalArgs, settings_debug: bool) -> Option<&'static str> {
    if args.quiet {
        return Some("error");
    }
    match args.verbose {
        0 if settings_debug => Some("debug"),
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}
