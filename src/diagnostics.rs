//! Status and diagnostic reporting.
//!
//! Producers post through a cheap [`Diagnostics`] handle which never touches the
//! bouncer's core lock. A dedicated publisher thread drains the queue and hands
//! each message that passes the minimum level to the [`Host`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::Level;
use parking_lot::{Condvar, Mutex};

pub const TRACE: usize = 1;
pub const DEBUG: usize = 2;
pub const STATUS: usize = 3;
pub const WARNING: usize = 5;
pub const ERROR: usize = 10;

/// The interface required for hosting the bouncer in a framework.
pub trait Host: Send + Sync {
    /// `user_id` is 0 for messages not tied to a particular user.
    fn status_message(&self, level: usize, message: &str, user_id: i64);
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub level: usize,
    pub message: String,
    pub user_id: i64,
}

pub fn log_level(level: usize) -> Level {
    match level {
        l if l >= ERROR => Level::Error,
        l if l >= WARNING => Level::Warn,
        l if l >= STATUS => Level::Info,
        DEBUG => Level::Debug,
        _ => Level::Trace,
    }
}

#[derive(Default)]
struct Queue {
    messages: VecDeque<StatusMessage>,
    stop: bool,
}

#[derive(Default)]
struct Inner {
    queue: Mutex<Queue>,
    wake: Condvar,
    min_level: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct Diagnostics {
    inner: Arc<Inner>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_min_level(&self, level: usize) {
        self.inner.min_level.store(level, Ordering::SeqCst);
    }

    pub fn min_level(&self) -> usize {
        self.inner.min_level.load(Ordering::SeqCst)
    }

    pub fn post(&self, level: usize, message: impl Into<String>, user_id: i64) {
        let message = message.into();
        log::log!(target: "bouncer", log_level(level), "{}", message);
        if level < self.min_level() {
            return;
        }
        let mut queue = self.inner.queue.lock();
        queue.messages.push_back(StatusMessage { level, message, user_id });
        self.inner.wake.notify_one();
    }

    pub fn status(&self, message: impl Into<String>) {
        self.post(STATUS, message, 0);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.post(WARNING, message, 0);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.post(ERROR, message, 0);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.post(DEBUG, message, 0);
    }

    /// Removes everything queued so far without delivering it.
    pub fn drain(&self) -> Vec<StatusMessage> {
        self.inner.queue.lock().messages.drain(..).collect()
    }

    /// Starts the thread that delivers queued messages to `host`.
    pub fn start_publisher(&self, host: Arc<dyn Host>) -> DiagnosticsPublisher {
        self.inner.queue.lock().stop = false;
        let inner = Arc::clone(&self.inner);
        let thread = std::thread::Builder::new()
            .name("bouncer-diagnostics".into())
            .spawn(move || publish_loop(&inner, host.as_ref()))
            .ok();
        if thread.is_none() {
            log::error!("Unable to spawn diagnostics publisher thread");
        }
        DiagnosticsPublisher {
            inner: Arc::clone(&self.inner),
            thread,
        }
    }
}

fn publish_loop(inner: &Inner, host: &dyn Host) {
    let mut queue = inner.queue.lock();
    loop {
        let batch: Vec<StatusMessage> = queue.messages.drain(..).collect();
        if !batch.is_empty() {
            drop(queue);
            for message in &batch {
                host.status_message(message.level, &message.message, message.user_id);
            }
            queue = inner.queue.lock();
            continue;
        }
        if queue.stop {
            break;
        }
        inner.wake.wait(&mut queue);
    }
}

/// Owns the publisher thread; stopping it flushes whatever is still queued.
pub struct DiagnosticsPublisher {
    inner: Arc<Inner>,
    thread: Option<JoinHandle<()>>,
}

impl DiagnosticsPublisher {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        {
            let mut queue = self.inner.queue.lock();
            queue.stop = true;
            self.inner.wake.notify_one();
        }
        if thread.join().is_err() {
            log::error!("Diagnostics publisher thread panicked");
        }
    }
}

impl Drop for DiagnosticsPublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
