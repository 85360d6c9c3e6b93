//! Console notifier

use super::Notifier;

/// Prints notifications to the terminal
///
/// Errors and warnings go to stderr, everything else to stdout. With `quiet`
/// set informational messages are dropped.
#[derive(Debug, Clone, Default)]
pub struct ConsoleNotifier {
    quiet: bool,
}

impl ConsoleNotifier {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Notifier for ConsoleNotifier {
    fn error(&self, message: &str) {
        eprintln!("Error: {}", message);
    }

    fn info(&self, message: &str) {
        if !self.quiet {
            println!("{}", message);
        }
    }

    fn warn(&self, message: &str) {
        eprintln!("Warning: {}", message);
    }
}
