//! Error logging helpers so miette diagnostics survive a trip through tracing

/// Log an error at ERROR level using its Debug form.
///
/// For [`crate::CoreError`] the Debug form is miette's report, which keeps the
/// diagnostic code and help text.
#[macro_export]
macro_rules! log_error {
    ($err:expr) => {{
        let err = &$err;
        tracing::error!("{:?}", err);
    }};
    ($msg:expr, $err:expr) => {{
        let err = &$err;
        tracing::error!("{}: {:?}", $msg, err);
    }};
}

/// Log an error followed by every `source()` below it.
#[macro_export]
macro_rules! log_error_chain {
    ($err:expr) => {{
        use $crate::utils::error_logging::ErrorLogging;
        let err = &$err;
        tracing::error!("{}", err.log_format());
    }};
    ($msg:expr, $err:expr) => {{
        use $crate::utils::error_logging::ErrorLogging;
        let err = &$err;
        tracing::error!("{}: {}", $msg, err.log_format());
    }};
}

pub trait ErrorLogging {
    /// The error's message plus its numbered cause chain.
    fn log_format(&self) -> String;
}

impl<E: std::error::Error> ErrorLogging for E {
    fn log_format(&self) -> String {
        use std::fmt::Write;
        let mut output = self.to_string();

        let mut current = self.source();
        let mut depth = 1;
        if current.is_some() {
            output.push_str("\n\nCaused by:");
        }
        while let Some(cause) = current {
            let _ = write!(output, "\n  {}: {}", depth, cause);
            current = cause.source();
            depth += 1;
        }

        output
    }
}
