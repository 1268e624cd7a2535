use std::io::Write;

/// Log levels for console messages
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    Success,
}

impl LogLevel {
    fn as_tag(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Success => "success",
        }
    }
}

/// Builder for creating formatted log messages
pub struct LogMessage {
    level: LogLevel,
    context: Option<String>,
    message: String,
}

impl LogMessage {
    /// Create a new log message with the specified level
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            context: None,
            message: message.into(),
        }
    }

    /// Add context to the log message (e.g., "exr", "encode")
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Format the message for console output
    pub fn format_for_console(&self) -> String {
        match &self.context {
            Some(ctx) => format!("[{}][{}] {}", self.level.as_tag(), ctx, self.message),
            None => format!("[{}] {}", self.level.as_tag(), self.message),
        }
    }
}

/// Trait for components that support console logging
pub trait ConsoleLogger {
    /// Send a pre-built log message
    fn send_log(&self, log_message: LogMessage);

    /// Log an error message
    fn log_error(&self, message: impl Into<String>) -> LogMessageBuilder<'_, Self>
    where
        Self: Sized,
    {
        LogMessageBuilder::new(self, LogMessage::new(LogLevel::Error, message))
    }

    /// Log an info message
    fn log_info(&self, message: impl Into<String>) -> LogMessageBuilder<'_, Self>
    where
        Self: Sized,
    {
        LogMessageBuilder::new(self, LogMessage::new(LogLevel::Info, message))
    }

    /// Log a warning message
    fn log_warning(&self, message: impl Into<String>) -> LogMessageBuilder<'_, Self>
    where
        Self: Sized,
    {
        LogMessageBuilder::new(self, LogMessage::new(LogLevel::Warning, message))
    }

    /// Log a success message
    fn log_success(&self, message: impl Into<String>) -> LogMessageBuilder<'_, Self>
    where
        Self: Sized,
    {
        LogMessageBuilder::new(self, LogMessage::new(LogLevel::Success, message))
    }

    /// Log a debug message
    fn log_debug(&self, message: impl Into<String>) -> LogMessageBuilder<'_, Self>
    where
        Self: Sized,
    {
        LogMessageBuilder::new(self, LogMessage::new(LogLevel::Debug, message))
    }
}

/// Builder that allows chaining configuration before sending the log
pub struct LogMessageBuilder<'a, L: ConsoleLogger> {
    logger: &'a L,
    message: LogMessage,
}

impl<'a, L: ConsoleLogger> LogMessageBuilder<'a, L> {
    fn new(logger: &'a L, message: LogMessage) -> Self {
        Self { logger, message }
    }

    /// Add context to the log message
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.message = self.message.with_context(context);
        self
    }

    /// Send the log message to the console
    pub fn send(self) {
        self.logger.send_log(self.message);
    }
}

/// Console on stderr; debug lines only when verbose
pub struct StderrConsole {
    verbose: bool,
}

impl StderrConsole {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn accepts(&self, level: LogLevel) -> bool {
        level != LogLevel::Debug || self.verbose
    }
}

impl ConsoleLogger for StderrConsole {
    fn send_log(&self, log_message: LogMessage) {
        if !self.accepts(log_message.level()) {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", log_message.format_for_console());
    }
}

/// Extension methods for easier logging without builder pattern
pub trait LoggingExt {
    /// Quick error logging with context
    fn log_error_ctx(&self, context: &str, message: impl Into<String>);

    /// Quick info logging with context
    fn log_info_ctx(&self, context: &str, message: impl Into<String>);

    /// Quick success logging with context
    fn log_success_ctx(&self, context: &str, message: impl Into<String>);
}

impl<L: ConsoleLogger> LoggingExt for L {
    fn log_error_ctx(&self, context: &str, message: impl Into<String>) {
        self.log_error(message).with_context(context).send();
    }

    fn log_info_ctx(&self, context: &str, message: impl Into<String>) {
        self.log_info(message).with_context(context).send();
    }

    fn log_success_ctx(&self, context: &str, message: impl Into<String>) {
        self.log_success(message).with_context(context).send();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct MemoryConsole {
        lines: RefCell<Vec<String>>,
    }

    impl ConsoleLogger for MemoryConsole {
        fn send_log(&self, log_message: LogMessage) {
            self.lines.borrow_mut().push(log_message.format_for_console());
        }
    }

    #[test]
    fn test_log_message_formatting() {
        let msg = LogMessage::new(LogLevel::Error, "Test error").with_context("test");
        assert_eq!(msg.format_for_console(), "[error][test] Test error");
    }

    #[test]
    fn test_log_message_no_context() {
        let msg = LogMessage::new(LogLevel::Info, "Test info");
        assert_eq!(msg.format_for_console(), "[info] Test info");
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(LogLevel::Error.as_tag(), "error");
        assert_eq!(LogLevel::Warning.as_tag(), "warn");
        assert_eq!(LogLevel::Info.as_tag(), "info");
        assert_eq!(LogLevel::Debug.as_tag(), "debug");
        assert_eq!(LogLevel::Success.as_tag(), "success");
    }

    #[test]
    fn test_builder_and_shortcuts() {
        let console = MemoryConsole::default();
        console.log_warning("odd size").with_context("layer").send();
        console.log_success_ctx("write", "done");
        console.log_debug("detail").send();
        assert_eq!(
            *console.lines.borrow(),
            vec!["[warn][layer] odd size", "[success][write] done", "[debug] detail"]
        );
    }

    #[test]
    fn test_stderr_console_filters_debug() {
        assert!(!StderrConsole::new(false).accepts(LogLevel::Debug));
        assert!(StderrConsole::new(true).accepts(LogLevel::Debug));
        assert!(StderrConsole::new(false).accepts(LogLevel::Error));
    }
}
