//! Leveled logging capability handed to the shield by its callers.

/// Anything that can take leveled messages.
///
/// The signal listener keeps the logger it was installed with for the life of
/// the process, so implementations must be shareable across threads.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// Default logger: forwards to the `tracing` subscriber installed by the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "holdfast", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "holdfast", "{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!(target: "holdfast", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "holdfast", "{message}");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Level, RecordingLogger};
    use super::*;

    #[test]
    fn test_tracing_logger_accepts_all_levels() {
        let logger = TracingLogger;
        logger.debug("d");
        logger.info("i");
        logger.warning("w");
        logger.error("e");
    }

    #[test]
    fn test_recording_logger_keeps_order_and_level() {
        let logger = RecordingLogger::default();
        logger.warning("first");
        logger.info("second");
        assert_eq!(
            logger.lines(),
            vec![
                (Level::Warning, "first".to_string()),
                (Level::Info, "second".to_string()),
            ]
        );
        assert!(logger.contains(Level::Info, "sec"));
        assert!(!logger.contains(Level::Debug, "first"));
    }
}
