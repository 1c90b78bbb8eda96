//! Process-wide tracing setup.

pub mod tracing;

pub use self::tracing::LogFormat;

/// Initialize process-wide observability with the format named by `LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
