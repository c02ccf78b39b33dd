//! Conversation state store: an append-only message log with rollback and
//! consolidation.
//!
//! Nothing is ever deleted. Rollback and consolidation only flip the
//! `superseded` flag; `current_history` (non-superseded messages in
//! sequence order) is the one and only definition of visible history fed to
//! the provider gateway.

use std::sync::Mutex;

use crate::error::{Result, TroupeError};
use crate::types::{Message, MessageDraft};

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<Message>,
    next_seq: u64,
}

/// Ordered message log for one session.
///
/// Sequence numbers start at 1 and are strictly increasing and gapless.
/// All mutations are append-only or flag-only, serialized by one internal
/// lock; ordering across components is enforced by the session's
/// one-in-flight-turn rule, not by finer-grained locking here.
#[derive(Debug, Default)]
pub struct ConversationStore {
    inner: Mutex<Inner>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, assigning the next sequence number.
    pub fn append(&self, draft: MessageDraft) -> u64 {
        let mut inner = self.inner.lock().expect("conversation store poisoned");
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.messages.push(Message::from_draft(seq, draft));
        seq
    }

    /// Mark every message with `seq > to_seq` as superseded.
    ///
    /// Validation happens before any state change; an out-of-range target
    /// leaves the log untouched. Rolling back to the latest sequence is a
    /// no-op. Superseded messages stay inspectable via [`all_messages`]
    /// (redo by inspection, not as a built-in).
    ///
    /// [`all_messages`]: Self::all_messages
    pub fn rollback(&self, to_seq: u64) -> Result<()> {
        let mut inner = self.inner.lock().expect("conversation store poisoned");
        let latest = inner.next_seq;
        if to_seq > latest {
            return Err(TroupeError::RollbackOutOfRange {
                requested: to_seq,
                latest,
            });
        }
        let mut marked = 0usize;
        for message in inner.messages.iter_mut() {
            if message.seq > to_seq && !message.superseded {
                message.superseded = true;
                marked += 1;
            }
        }
        tracing::debug!(to_seq, marked, "rollback complete");
        Ok(())
    }

    /// Replace all but the last `preserve_count` visible messages with one
    /// summarizing message.
    ///
    /// The summary text is produced by the caller (the session asks the
    /// active agent for it); the store validates, marks the originals
    /// superseded, and appends the summary with a sequence number greater
    /// than everything it summarizes. Returns the summary's seq.
    ///
    /// # Errors
    ///
    /// [`TroupeError::ConsolidatePreserveInvalid`] when `preserve_count`
    /// covers the whole visible history (nothing to consolidate).
    pub fn consolidate(&self, preserve_count: usize, summary_text: &str) -> Result<u64> {
        let mut inner = self.inner.lock().expect("conversation store poisoned");
        let visible: Vec<u64> = inner
            .messages
            .iter()
            .filter(|m| !m.superseded)
            .map(|m| m.seq)
            .collect();
        if preserve_count >= visible.len() {
            return Err(TroupeError::ConsolidatePreserveInvalid {
                preserve: preserve_count,
                visible: visible.len(),
            });
        }

        let cutoff = visible.len() - preserve_count;
        let to_supersede: &[u64] = &visible[..cutoff];
        for message in inner.messages.iter_mut() {
            if to_supersede.contains(&message.seq) {
                message.superseded = true;
            }
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner
            .messages
            .push(Message::from_draft(seq, MessageDraft::system(summary_text)));
        tracing::debug!(
            consolidated = cutoff,
            preserved = preserve_count,
            summary_seq = seq,
            "consolidation complete"
        );
        Ok(seq)
    }

    /// Non-superseded messages in sequence order.
    pub fn current_history(&self) -> Vec<Message> {
        self.inner
            .lock()
            .expect("conversation store poisoned")
            .messages
            .iter()
            .filter(|m| !m.superseded)
            .cloned()
            .collect()
    }

    /// Every message ever appended, superseded ones included.
    pub fn all_messages(&self) -> Vec<Message> {
        self.inner
            .lock()
            .expect("conversation store poisoned")
            .messages
            .clone()
    }

    /// Highest sequence number assigned so far (0 when empty).
    pub fn latest_seq(&self) -> u64 {
        self.inner.lock().expect("conversation store poisoned").next_seq
    }
}
