use tracing::level_filters::LevelFilter;

/// Map `--verbosity` (1 = errors only, 5 = trace) to the default log level.
pub fn verbosity_parser(s: &str) -> Result<LevelFilter, String> {
    let level = s.parse::<u8>().map_err(|err| err.to_string())?;

    match level {
        1 => Ok(LevelFilter::ERROR),
        2 => Ok(LevelFilter::WARN),
        3 => Ok(LevelFilter::INFO),
        4 => Ok(LevelFilter::DEBUG),
        5 => Ok(LevelFilter::TRACE),
        _ => Err(format!("verbosity must be between 1 and 5, got {level}")),
    }
}
