//! Process-wide logging setup for jobforge binaries.

/// Initialize process-wide tracing with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

/// Subscriber setup (filters, output format).
pub mod tracing;

pub use self::tracing::LogFormat;
