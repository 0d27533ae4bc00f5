//! In-memory store of received messages

use std::sync::{Mutex, MutexGuard, PoisonError, mpsc};

use crate::smtp::email::Email;

/// Append-only list of received messages shared by every connection.
///
/// Appends, snapshots and notifications all go through one lock, so
/// subscribers see messages in the order they were stored.
#[derive(Debug, Default)]
pub struct MessageStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<Email>,
    subscribers: Vec<mpsc::Sender<Email>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a message and notify subscribers while the lock is held
    pub fn push(&self, email: Email) {
        let mut inner = self.lock();
        inner.messages.push(email.clone());
        // Errors when the receiver is gone; forget that subscriber.
        inner
            .subscribers
            .retain(|subscriber| subscriber.send(email.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    /// Point-in-time copy of all messages, in receipt order
    pub fn snapshot(&self) -> Vec<Email> {
        self.lock().messages.clone()
    }

    pub fn clear(&self) {
        self.lock().messages.clear();
    }

    /// Receive every message stored from now on
    pub fn subscribe(&self) -> mpsc::Receiver<Email> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }
}
