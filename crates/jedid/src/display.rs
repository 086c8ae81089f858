//! Presentation collaborator.
//!
//! The server core never renders anything itself. It reports chat lines and
//! roster changes through [`ChatDisplay`]; whatever front-end is attached
//! (log output, a TUI, a GUI) decides how to show them. Callbacks run on
//! server tasks and must not block.

use tracing::info;

/// Receives notifications from the server core.
pub trait ChatDisplay: Send + Sync {
    /// A line was broadcast (chat text or a join/leave notice).
    fn on_message(&self, text: &str);

    /// The roster changed. `names` is in roster order.
    fn on_roster_changed(&self, names: &[String], count: usize);
}

/// Display that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDisplay;

impl ChatDisplay for LogDisplay {
    fn on_message(&self, text: &str) {
        info!(target: "jedid::chat", "{text}");
    }

    fn on_roster_changed(&self, names: &[String], count: usize) {
        info!(connections = count, users = ?names, "Roster changed");
    }
}

/// Display that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl ChatDisplay for NullDisplay {
    fn on_message(&self, _text: &str) {}

    fn on_roster_changed(&self, _names: &[String], _count: usize) {}
}
