//! Mail exchanged between agents during the talk phase.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A message addressed by agent name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mail {
    /// Sender name.
    pub from: String,

    /// Recipient name.
    pub to: String,

    /// Free-form payload.
    pub text: String,
}

impl Mail {
    pub fn new(from: impl Into<String>, to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for Mail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.from, self.to, self.text)
    }
}

/// Outgoing mail written during one talk phase.
///
/// Drained into the phase outcome when the phase closes, so it is empty again
/// at the start of the next talk phase.
#[derive(Debug, Clone, Default)]
pub struct MailBuffer {
    mails: Vec<Mail>,
}

impl MailBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mail: Mail) {
        self.mails.push(mail);
    }

    pub fn len(&self) -> usize {
        self.mails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mails.is_empty()
    }

    /// Takes every buffered mail, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Mail> {
        std::mem::take(&mut self.mails)
    }
}
