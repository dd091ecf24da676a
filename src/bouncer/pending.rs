use std::collections::{HashMap, VecDeque};

use crate::transport::{ChatMessage, Whisper};

#[derive(Default)]
struct PendingEvents {
    messages: VecDeque<(ChatMessage, f64)>,
    whispers: VecDeque<(Whisper, f64)>,
    lookup_outstanding: bool,
}

/// Events held back until their sender's identity is known.
pub(crate) struct Replay {
    pub messages: Vec<(ChatMessage, f64)>,
    pub whispers: Vec<(Whisper, f64)>,
}

/// Per-sender FIFO queues of messages and whispers from unresolved ids,
/// each kept with its arrival time.
#[derive(Default)]
pub(crate) struct PendingIdentityQueue {
    by_id: HashMap<i64, PendingEvents>,
}

impl PendingIdentityQueue {
    /// Queues a message. Returns true when a lookup for `id` should start.
    pub fn enqueue_message(&mut self, id: i64, message: ChatMessage, time: f64) -> bool {
        let pending = self.by_id.entry(id).or_default();
        pending.messages.push_back((message, time));
        Self::claim_lookup(pending)
    }

    pub fn enqueue_whisper(&mut self, id: i64, whisper: Whisper, time: f64) -> bool {
        let pending = self.by_id.entry(id).or_default();
        pending.whispers.push_back((whisper, time));
        Self::claim_lookup(pending)
    }

    fn claim_lookup(pending: &mut PendingEvents) -> bool {
        if pending.lookup_outstanding {
            false
        } else {
            pending.lookup_outstanding = true;
            true
        }
    }

    /// Keeps the events so the next one for `id` retries the lookup.
    pub fn lookup_failed(&mut self, id: i64) {
        if let Some(pending) = self.by_id.get_mut(&id) {
            pending.lookup_outstanding = false;
        }
    }

    pub fn take(&mut self, id: i64) -> Option<Replay> {
        self.by_id.remove(&id).map(|pending| Replay {
            messages: pending.messages.into(),
            whispers: pending.whispers.into(),
        })
    }

    pub fn is_pending(&self, id: i64) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.values().map(|pending| pending.messages.len() + pending.whispers.len()).sum()
    }
}
