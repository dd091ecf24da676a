use std::collections::VecDeque;

use crate::bouncer::engine::Core;
use crate::transport::{ApiRequest, ApiResponse};

/// Continuation run under the core lock when a call finishes. The response
/// is `None` when the call failed or returned a non-success status.
pub(crate) type ApiHandler = Box<dyn FnOnce(&mut Core, u64, Option<&ApiResponse>) + Send>;

struct QueuedCall {
    request: ApiRequest,
    handler: ApiHandler,
}

struct InFlight {
    id: u64,
    handler: ApiHandler,
}

/// FIFO of outbound API calls with at most one in flight and a fixed
/// cooldown between the completion of one call and the start of the next.
pub(crate) struct ApiScheduler {
    queue: VecDeque<QueuedCall>,
    in_flight: Option<InFlight>,
    next_call_time: f64,
    next_transaction_id: u64,
    cooldown: f64,
}

impl ApiScheduler {
    pub fn new(cooldown: f64) -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: None,
            next_call_time: 0.0,
            next_transaction_id: 1,
            cooldown,
        }
    }

    pub fn post(&mut self, request: ApiRequest, handler: ApiHandler) {
        self.queue.push_back(QueuedCall { request, handler });
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|call| call.id)
    }

    /// When the next queued call may start, if one is waiting and none is running.
    pub fn next_due(&self) -> Option<f64> {
        if self.in_flight.is_none() && !self.queue.is_empty() {
            Some(self.next_call_time)
        } else {
            None
        }
    }

    /// Takes the next call if it may start at `now`, marking it in flight.
    pub fn start_next(&mut self, now: f64) -> Option<(u64, ApiRequest)> {
        if self.in_flight.is_some() || now < self.next_call_time {
            return None;
        }
        let call = self.queue.pop_front()?;
        let id = self.next_transaction_id;
        self.next_transaction_id += 1;
        self.in_flight = Some(InFlight {
            id,
            handler: call.handler,
        });
        Some((id, call.request))
    }

    /// Clears the in-flight call `id` and starts its cooldown. Returns its
    /// handler, or `None` if `id` is not the call in flight.
    pub fn complete(&mut self, id: u64, now: f64) -> Option<ApiHandler> {
        if self.in_flight.as_ref().map(|call| call.id) != Some(id) {
            return None;
        }
        let call = self.in_flight.take()?;
        self.next_call_time = now + self.cooldown;
        Some(call.handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ApiFamily, Method};

    fn call(url: &str) -> ApiRequest {
        ApiRequest {
            method: Method::Get,
            family: ApiFamily::Legacy,
            url: url.into(),
            client_id: String::new(),
            token: String::new(),
            body: None,
        }
    }

    fn noop() -> ApiHandler {
        Box::new(|_, _, _| {})
    }

    #[test]
    fn only_one_call_runs_at_a_time() {
        let mut scheduler = ApiScheduler::new(1.0);
        scheduler.post(call("a"), noop());
        scheduler.post(call("b"), noop());
        let (first, request) = scheduler.start_next(0.0).unwrap();
        assert_eq!(request.url, "a");
        assert!(scheduler.start_next(0.0).is_none());
        assert_eq!(scheduler.next_due(), None);
        assert!(scheduler.complete(first + 1, 0.5).is_none());
        assert!(scheduler.complete(first, 0.5).is_some());
        assert_eq!(scheduler.in_flight(), None);
        assert_eq!(scheduler.next_due(), Some(1.5));
        assert!(scheduler.start_next(1.0).is_none());
        let (second, request) = scheduler.start_next(1.5).unwrap();
        assert_eq!(request.url, "b");
        assert_eq!(second, first + 1);
        assert_eq!(scheduler.queued(), 0);
    }
}
