use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitStatus {
    Success,
    Error,
}

/// Outcome of a command, with an optional summary line for the user.
#[derive(Debug)]
pub struct Exit {
    status: ExitStatus,
    message: Option<String>,
}

impl Exit {
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: ExitStatus::Success,
            message: None,
        }
    }

    #[must_use]
    pub fn error() -> Self {
        Self {
            status: ExitStatus::Error,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Print the summary and turn the outcome into a process exit code.
    pub fn report(self) -> ExitCode {
        match self.status {
            ExitStatus::Success => {
                if let Some(message) = &self.message {
                    println!("{message}");
                }
                ExitCode::SUCCESS
            }
            ExitStatus::Error => {
                if let Some(message) = &self.message {
                    eprintln!("{message}");
                }
                ExitCode::FAILURE
            }
        }
    }
}
