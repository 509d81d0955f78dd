//! Console host functions.
//!
//! Guest programs have two ways to produce text:
//! - `env::log` records a leveled diagnostic message. It is kept in the
//!   [`SandboxContext`] and, when the session runs with debug logging, also
//!   forwarded to `tracing`.
//! - `env::print` appends to the program output that the preview renders.

use playpen_core::store::{LogLevel, SandboxContext};
use tracing::{debug, error, info, warn};

/// Host implementation for the console interface.
pub struct LoggingHost;

impl LoggingHost {
    /// Log a message at the specified level.
    ///
    /// Messages past the context's log budget are dropped, including from `tracing`.
    pub fn log(ctx: &mut SandboxContext, level: LogLevel, message: &str) {
        if !ctx.log(level, message) || !ctx.debug_logging {
            return;
        }

        let session_id = &ctx.session_id;
        let hostname = ctx.hostname.as_ref().map(ToString::to_string);
        match level {
            LogLevel::Debug => debug!(session_id, hostname, guest_log = true, "{}", message),
            LogLevel::Info => info!(session_id, hostname, guest_log = true, "{}", message),
            LogLevel::Warn => warn!(session_id, hostname, guest_log = true, "{}", message),
            LogLevel::Error => error!(session_id, hostname, guest_log = true, "{}", message),
        }
    }

    /// Append text to the program output.
    pub fn print(ctx: &mut SandboxContext, text: &str) {
        ctx.print(text);
    }
}

/// Convert a numeric log level to [`LogLevel`].
///
/// 0=debug, 1=info, 2=warn, 3=error; unknown values map to info.
pub fn level_from_i32(level: i32) -> LogLevel {
    match level {
        0 => LogLevel::Debug,
        2 => LogLevel::Warn,
        3 => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playpen_core::store::MAX_LOG_BYTES;

    #[test]
    fn test_logging_stores_in_context() {
        let mut ctx = SandboxContext::new("test-123".into());

        LoggingHost::log(&mut ctx, LogLevel::Info, "Hello");
        LoggingHost::log(&mut ctx, LogLevel::Error, "World");

        assert_eq!(ctx.logs.len(), 2);
        assert_eq!(ctx.logs[0].message, "Hello");
        assert_eq!(ctx.logs[0].level, LogLevel::Info);
        assert_eq!(ctx.logs[1].level, LogLevel::Error);
    }

    #[test]
    fn test_logging_with_debug_forwarding() {
        let mut ctx = SandboxContext::new("test".into());
        ctx.debug_logging = true;

        LoggingHost::log(&mut ctx, LogLevel::Warn, "forwarded");

        assert_eq!(ctx.logs.len(), 1);
    }

    #[test]
    fn test_logging_stops_at_budget() {
        let mut ctx = SandboxContext::new("test".into());
        ctx.debug_logging = true;
        let chunk = "y".repeat(MAX_LOG_BYTES);

        LoggingHost::log(&mut ctx, LogLevel::Info, &chunk);
        for _ in 0..100 {
            LoggingHost::log(&mut ctx, LogLevel::Info, &chunk);
        }

        assert_eq!(ctx.logs.len(), 2);
        assert_eq!(ctx.log_bytes(), MAX_LOG_BYTES);
        assert_eq!(ctx.logs[1].level, LogLevel::Warn);
    }

    #[test]
    fn test_print_appends_output() {
        let mut ctx = SandboxContext::new("test".into());

        LoggingHost::print(&mut ctx, "a");
        LoggingHost::print(&mut ctx, "b");

        assert_eq!(ctx.output, "ab");
        assert!(ctx.logs.is_empty());
    }

    #[test]
    fn test_level_from_i32() {
        assert_eq!(level_from_i32(0), LogLevel::Debug);
        assert_eq!(level_from_i32(1), LogLevel::Info);
        assert_eq!(level_from_i32(2), LogLevel::Warn);
        assert_eq!(level_from_i32(3), LogLevel::Error);
        assert_eq!(level_from_i32(99), LogLevel::Info);
    }
}
