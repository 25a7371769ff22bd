use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("queue.workers must be at least 1")]
    NoWorkers,

    #[error("queue.capacity must be at least 1")]
    ZeroCapacity,

    #[error("progress band must satisfy 0 <= floor < ceiling <= 100 (floor = {floor}, ceiling = {ceiling})")]
    InvalidProgressBand { floor: f64, ceiling: f64 },

    #[error("downloader.tool_name must not be empty")]
    EmptyToolName,

    #[error("events.client_buffer must be at least 1")]
    ZeroClientBuffer,

    #[error("server.max_payload_bytes must be positive")]
    ZeroPayloadLimit,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_queue(config)?;
    validate_downloader(config)?;
    validate_limits(config)?;
    Ok(())
}

fn validate_queue(config: &Config) -> Result<(), ValidationError> {
    if config.queue.workers == 0 {
        return Err(ValidationError::NoWorkers);
    }
    if config.queue.capacity == 0 {
        return Err(ValidationError::ZeroCapacity);
    }
    Ok(())
}

fn validate_downloader(config: &Config) -> Result<(), ValidationError> {
    let downloader = &config.downloader;
    let (floor, ceiling) = (downloader.progress_floor, downloader.progress_ceiling);

    let in_range = |v: f64| (0.0..=100.0).contains(&v);
    if !in_range(floor) || !in_range(ceiling) || floor >= ceiling {
        return Err(ValidationError::InvalidProgressBand { floor, ceiling });
    }

    if downloader.tool_name.trim().is_empty() {
        return Err(ValidationError::EmptyToolName);
    }

    Ok(())
}

fn validate_limits(config: &Config) -> Result<(), ValidationError> {
    if config.events.client_buffer == 0 {
        return Err(ValidationError::ZeroClientBuffer);
    }
    if config.server.max_payload_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroPayloadLimit);
    }
    Ok(())
}
