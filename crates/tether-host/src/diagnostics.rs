//! Guest panic reports.
//!
//! The panic imports never abort anything: they log and record, and the
//! guest decides what happens next (usually a trap).

use std::collections::VecDeque;
use std::fmt;

use tracing::error;

/// One report received from the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A panic began.
    Panic,
    Message(String),
    Location { file: String, line: u32 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Panic => write!(f, "guest panicked"),
            Diagnostic::Message(message) => write!(f, "panic message: {message}"),
            Diagnostic::Location { file, line } => write!(f, "panic location: {file}:{line}"),
        }
    }
}

/// Bounded log of diagnostics; the oldest entry goes first.
#[derive(Debug)]
pub struct Diagnostics {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        error!(%diagnostic, "guest diagnostic");
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Most recent message, if any.
    pub fn last_message(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|d| match d {
            Diagnostic::Message(message) => Some(message.as_str()),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        self.entries.drain(..).collect()
    }
}
