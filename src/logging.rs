use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when neither `RUST_LOG` nor an explicit directive is given.
pub const DEFAULT_FILTER: &str = "warn";

/// Directive enabling per-instruction tracing of this crate.
pub const TRACE_DIRECTIVE: &str = "intcode=trace";

/// Builds the filter: `directive` wins over `RUST_LOG`, which wins over
/// [`DEFAULT_FILTER`]. `trace` adds [`TRACE_DIRECTIVE`] on top.
pub fn filter(directive: Option<&str>, trace: bool) -> Result<EnvFilter, ParseError> {
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    if trace {
        Ok(filter.add_directive(TRACE_DIRECTIVE.parse()?))
    } else {
        Ok(filter)
    }
}

/// Installs the global subscriber. Logs go to stderr so program output on
/// stdout stays clean. Calling it again after a subscriber is set is a no-op.
pub fn init(directive: Option<&str>, trace: bool) -> Result<(), ParseError> {
    let filter = filter(directive, trace)?;

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    Ok(())
}
