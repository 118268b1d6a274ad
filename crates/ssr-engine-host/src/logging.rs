//! Logging host functions.
//!
//! Guest log lines are kept on the [`GuestContext`] and forwarded to
//! `tracing` with the render's request id attached.

use ssr_engine_core::store::{GuestContext, LogLevel};
use tracing::{debug, error, info, warn};

/// Host implementation of `env::log`.
pub struct LoggingHost;

impl LoggingHost {
    /// Record `message` and emit it through `tracing`.
    pub fn log(ctx: &mut GuestContext, level: LogLevel, message: &str) {
        ctx.log(level, message.to_string());

        let request_id = &ctx.request_id;
        let url = &ctx.request.url;
        match level {
            LogLevel::Debug => debug!(request_id, url, guest_log = true, "{}", message),
            LogLevel::Info => info!(request_id, url, guest_log = true, "{}", message),
            LogLevel::Warn => warn!(request_id, url, guest_log = true, "{}", message),
            LogLevel::Error => error!(request_id, url, guest_log = true, "{}", message),
        }
    }
}

/// Convert the guest's numeric log level (0=debug, 1=info, 2=warn, 3=error).
///
/// Unknown values map to `Info`.
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
    use std::sync::Arc;

    use ssr_engine_core::{PlatformState, RenderRequest};

    #[test]
    fn test_logging_stores_in_context() {
        let mut ctx = GuestContext::new(
            "test-123".into(),
            Arc::new(RenderRequest::get("/home")),
            Arc::new(PlatformState::default()),
            None,
        );

        LoggingHost::log(&mut ctx, LogLevel::Info, "Hello");
        LoggingHost::log(&mut ctx, LogLevel::Error, "World");

        assert_eq!(ctx.logs.len(), 2);
        assert_eq!(ctx.logs[0].message, "Hello");
        assert_eq!(ctx.logs[0].level, LogLevel::Info);
        assert_eq!(ctx.logs[1].level, LogLevel::Error);
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
