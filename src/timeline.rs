//! Per-line record of process events, printed as a table once the line has
//! finished running.

use crate::command::ExitCode;
use crate::resolve::Redirect;
use std::fmt;
use std::io::{self, Write};
use std::time::Instant;

/// Events beyond this count are dropped for the current line.
pub const MAX_EVENTS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Forked,
    Exited(ExitCode),
    Signaled(i32),
    /// Output of the first process feeds the second.
    Piped(i32, i32),
    Redirected(Redirect),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Forked => f.write_str("forked"),
            EventKind::Exited(code) => write!(f, "exited({code})"),
            EventKind::Signaled(signal) => write!(f, "signaled({signal})"),
            EventKind::Piped(from, to) => write!(f, "piped({from}→{to})"),
            EventKind::Redirected(redirect) => write!(f, "redirected({redirect})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub pid: i32,
    pub kind: EventKind,
    pub elapsed_ms: f64,
}

#[derive(Debug)]
pub struct Timeline {
    enabled: bool,
    start: Instant,
    events: Vec<Event>,
}

impl Timeline {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            start: Instant::now(),
            events: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Forget previous events and restart the clock.
    pub fn reset(&mut self) {
        self.events.clear();
        self.start = Instant::now();
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn record(&mut self, pid: i32, kind: EventKind) {
        if !self.enabled || self.events.len() >= MAX_EVENTS {
            return;
        }
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.events.push(Event {
            pid,
            kind,
            elapsed_ms,
        });
    }

    /// Write the events sorted by time. Nothing is written when the timeline
    /// is disabled or empty.
    pub fn print(&mut self, out: &mut dyn Write) -> io::Result<()> {
        if !self.enabled || self.events.is_empty() {
            return Ok(());
        }
        self.events.sort_by(|a, b| a.elapsed_ms.total_cmp(&b.elapsed_ms));

        writeln!(out)?;
        writeln!(out, "{:<6} {:<20} TIME(ms)", "PID", "EVENT")?;
        writeln!(out, "------ -------------------- --------")?;
        for event in &self.events {
            writeln!(
                out,
                "{:<6} {:<20} {:.0}",
                event.pid,
                event.kind.to_string(),
                event.elapsed_ms
            )?;
        }
        writeln!(out)
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(false)
    }
}
