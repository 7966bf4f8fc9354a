//! Per-paper chat histories.
//!
//! Histories live for the lifetime of the session. The backend is
//! stateless: every message is sent together with the turns that preceded
//! it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::api::{ApiError, PaperApi};
use crate::lock;
use crate::models::{ChatMessage, PaperId};

/// Assistant turn appended when the backend could not answer.
pub const CHAT_ERROR_REPLY: &str =
    "An error occurred while communicating with the AI. Please try again later.";

pub struct ChatSessions {
    api: Arc<dyn PaperApi>,
    histories: Mutex<HashMap<PaperId, History>>,
    sending: AtomicUsize,
    next_epoch: AtomicU64,
}

/// One conversation. `epoch` changes whenever the history is recreated
/// after a clear, so a reply to an earlier conversation can be recognised.
struct History {
    epoch: u64,
    messages: Vec<ChatMessage>,
}

/// Keeps the in-flight counter accurate even if the send is dropped.
struct SendingGuard<'a>(&'a AtomicUsize);

impl<'a> SendingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChatSessions {
    pub fn new(api: Arc<dyn PaperApi>) -> Self {
        Self {
            api,
            histories: Mutex::new(HashMap::new()),
            sending: AtomicUsize::new(0),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// The conversation so far for `paper_id`, oldest first.
    pub fn messages(&self, paper_id: PaperId) -> Vec<ChatMessage> {
        lock(&self.histories)
            .get(&paper_id)
            .map(|history| history.messages.clone())
            .unwrap_or_default()
    }

    /// Whether any message is waiting for an answer.
    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst) > 0
    }

    /// Send `text` about `paper_id` and record both sides of the exchange.
    ///
    /// Blank input is ignored (`Ok(None)`). The user turn is recorded before
    /// the request goes out. On failure a fixed apology is recorded as the
    /// assistant turn and the error is returned.
    pub async fn send_message(
        &self,
        paper_id: PaperId,
        text: &str,
    ) -> Result<Option<ChatMessage>, ApiError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let (epoch, prior) = {
            let mut histories = lock(&self.histories);
            let history = histories.entry(paper_id).or_insert_with(|| History {
                epoch: self.next_epoch.fetch_add(1, Ordering::Relaxed),
                messages: Vec::new(),
            });
            let prior = history.messages.clone();
            history.messages.push(ChatMessage::user(text));
            (history.epoch, prior)
        };

        let _sending = SendingGuard::new(&self.sending);
        let result = self.api.chat(paper_id, text, &prior).await;

        let reply = match &result {
            Ok(answer) => ChatMessage::assistant(answer.clone()),
            Err(e) => {
                tracing::warn!(paper_id, error = %e, "chat request failed");
                ChatMessage::assistant(CHAT_ERROR_REPLY)
            }
        };
        // A conversation cleared mid-request drops the late reply, even if a
        // new conversation for the same paper has started since.
        match lock(&self.histories).get_mut(&paper_id) {
            Some(history) if history.epoch == epoch => history.messages.push(reply.clone()),
            _ => tracing::debug!(paper_id, "dropping reply to a cleared conversation"),
        }

        result.map(|_| Some(reply))
    }

    pub fn clear_session(&self, paper_id: PaperId) {
        lock(&self.histories).remove(&paper_id);
    }

    pub fn clear_all(&self) {
        lock(&self.histories).clear();
    }
}
