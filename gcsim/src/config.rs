use std::str::FromStr;

use clap::ArgMatches;

use marksweep::GcConfig;

use crate::error::ShellError;

/// Build the collector configuration from command line options, falling back to the
/// collector defaults for anything not given
pub fn gc_config(matches: &ArgMatches) -> Result<GcConfig, ShellError> {
    let mut config = GcConfig::default();

    if let Some(factor) = parse_option::<f64>(matches, "growth-factor")? {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(ShellError::Config(format!(
                "growth factor must be a positive number, got {}",
                factor
            )));
        }
        config = config.with_growth_factor(factor);
    }

    if let Some(size) = parse_option::<usize>(matches, "initial-heap")? {
        config = config.with_initial_heap_size(size);
    }

    if let Some(size) = parse_option::<usize>(matches, "min-heap")? {
        config = config.with_min_heap_size(size);
    }

    Ok(config)
}

fn parse_option<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>, ShellError> {
    match matches.value_of(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ShellError::Config(format!("--{} cannot be '{}'", name, value))),
        None => Ok(None),
    }
}
