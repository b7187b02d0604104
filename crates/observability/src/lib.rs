//! Process-wide logging setup.

pub mod logging;

pub use logging::{LogFormat, UnknownLogFormat};

/// Initialize process-wide logging in the format named by `CENSUS_LOG_FORMAT`.
///
/// An unknown format is reported once logging is up, in the default format.
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    match LogFormat::from_env() {
        Ok(format) => {
            logging::init(format);
        }
        Err(err) => {
            logging::init(LogFormat::default());
            tracing::warn!(error = %err, "ignoring {}", logging::LOG_FORMAT_VAR);
        }
    }
}
