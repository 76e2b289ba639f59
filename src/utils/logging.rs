//! Conditional logging macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```ignore
//! // In your module, define the flag and target first:
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "visual_baseline::lifecycle";
//!
//! // Then use the macros (they're exported at the crate root):
//! use crate::{log_info, log_warn, log_error};
//!
//! log_info!("This will log under LOG_TARGET if ENABLE_LOGS is true");
//! ```

/// Macro for conditional debug logging.
///
/// Each module that uses this macro must define `ENABLE_LOGS` and `LOG_TARGET`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Macro for conditional info logging.
///
/// Each module that uses this macro must define `ENABLE_LOGS` and `LOG_TARGET`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Macro for conditional warn logging.
///
/// Each module that uses this macro must define `ENABLE_LOGS` and `LOG_TARGET`.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Macro for conditional error logging.
///
/// Each module that uses this macro must define `ENABLE_LOGS` and `LOG_TARGET`.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Initialize `env_logger` from `RUST_LOG`, defaulting to `Info`.
///
/// Safe to call repeatedly; only the first call installs the logger.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
