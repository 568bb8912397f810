use fieldops_client::{Level, Notification, Notifier};
use tracing::debug;

use crate::OutputFormat;

/// Prints success notifications to stderr. Failures are already reported
/// as the command's `error:` line, so they only go to the debug log.
pub(crate) struct TerminalNotifier {
    output: OutputFormat,
}

impl TerminalNotifier {
    pub(crate) fn new(output: OutputFormat) -> Self {
        TerminalNotifier { output }
    }
}

impl Notifier for TerminalNotifier {
    fn notify(&self, n: Notification) {
        match (n.level, self.output) {
            (Level::Success, OutputFormat::Text) => {
                if n.message.is_empty() {
                    eprintln!("{}", n.title);
                } else {
                    eprintln!("{}: {}", n.title, n.message);
                }
            }
            _ => debug!(title = %n.title, message = %n.message, "notification"),
        }
    }
}
