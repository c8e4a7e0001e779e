use crate::error::CoordinatorError;
use crate::types::TaskOptions;

pub const MIN_PERIODIC_FREQUENCY_MS: u64 = 15 * 60 * 1000;

/// Check task options against the platform's scheduling rules. Pure and
/// side-effect free, so it is safe to call repeatedly on the same options.
/// Delay, retry cap, and payload shape are enforced by the types themselves.
pub fn validate(options: &TaskOptions) -> Result<(), CoordinatorError> {
    if options.id.trim().is_empty() {
        return Err(CoordinatorError::InvalidOptions(
            "Task id must not be empty".to_string(),
        ));
    }
    if options.periodic {
        let frequency_ms = match options.frequency_ms {
            Some(f) => f,
            None => {
                return Err(CoordinatorError::InvalidOptions(
                    "Periodic tasks must specify a frequency".to_string(),
                ))
            }
        };
        if frequency_ms < MIN_PERIODIC_FREQUENCY_MS {
            return Err(CoordinatorError::FrequencyTooLow { frequency_ms });
        }
    }
    Ok(())
}
