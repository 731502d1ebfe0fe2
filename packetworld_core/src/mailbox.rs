//! Per-agent private inbox.

use std::collections::VecDeque;

use packetworld_env::Mail;

use crate::error::KernelError;

/// FIFO inbox with a hard capacity.
///
/// Written by the postal service, drained by the owning agent at the start
/// of its talk phase.
#[derive(Debug)]
pub struct MailBox {
    owner: String,
    capacity: usize,
    queue: VecDeque<Mail>,
}

impl MailBox {
    pub fn new(owner: impl Into<String>, capacity: usize) -> Self {
        Self {
            owner: owner.into(),
            capacity,
            queue: VecDeque::new(),
        }
    }

    /// Queues a mail, failing when the inbox is at capacity.
    pub fn push(&mut self, mail: Mail) -> Result<(), KernelError> {
        if self.queue.len() >= self.capacity {
            return Err(KernelError::MailboxFull {
                name: self.owner.clone(),
                capacity: self.capacity,
            });
        }
        self.queue.push_back(mail);
        Ok(())
    }

    /// Takes every queued mail, oldest first.
    pub fn drain(&mut self) -> Vec<Mail> {
        self.queue.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut mb = MailBox::new("b", 4);
        mb.push(Mail::new("a", "b", "1")).unwrap();
        mb.push(Mail::new("c", "b", "2")).unwrap();
        let texts: Vec<_> = mb.drain().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["1", "2"]);
        assert!(mb.is_empty());
    }

    #[test]
    fn test_overflow_fails_loudly() {
        let mut mb = MailBox::new("b", 1);
        mb.push(Mail::new("a", "b", "1")).unwrap();
        let err = mb.push(Mail::new("a", "b", "2")).unwrap_err();
        assert!(matches!(err, KernelError::MailboxFull { capacity: 1, .. }));
        assert_eq!(mb.len(), 1);
    }
}
