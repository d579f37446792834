//! Custom macros for reducing code repetition in wallfetch

/// Log an error and continue execution (non-fatal error handling)
///
/// # Example
/// ```
/// log_and_continue!(writer.flush().await, "flush client socket");
/// ```
#[macro_export]
macro_rules! log_and_continue {
    ($expr:expr, $context:expr) => {
        if let Err(e) = $expr {
            log::error!("Failed to {}: {}", $context, e);
        }
    };
}

/// Validate that a string value is one of the allowed variants
///
/// # Example
/// ```
/// validate_enum!(level, "trace", "debug", "info", "warn", "error");
/// ```
#[macro_export]
macro_rules! validate_enum {
    ($value:expr, $($variant:expr),+) => {
        match $value {
            $($variant)|+ => Ok(()),
            _ => anyhow::bail!("Invalid value: {} (expected one of: {})", $value, [$($variant),+].join(", ")),
        }
    };
}
