//! Scripted transports for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::error::TransportError;

use super::transport::{transport_fn, RawResult, TransportFn};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Well-formed envelope around this data.
    Data(Value),
    /// Body returned verbatim.
    Raw(Value),
    Fail(TransportError),
}

/// Counts invocations and answers with a scripted reply after an optional delay.
#[derive(Clone)]
pub(crate) struct CountingTransport {
    calls: Arc<AtomicUsize>,
    reply: Arc<Mutex<Reply>>,
    failing: Arc<AtomicBool>,
    delay: Duration,
}

impl CountingTransport {
    pub(crate) fn new(reply: Reply) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            reply: Arc::new(Mutex::new(reply)),
            failing: Arc::new(AtomicBool::new(false)),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    /// Make every later call fail with a 503 until switched back.
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn transport_fn(&self) -> TransportFn {
        let this = self.clone();
        transport_fn(move |_key| {
            let this = this.clone();
            this.calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if !this.delay.is_zero() {
                    tokio::time::sleep(this.delay).await;
                }
                if this.failing.load(Ordering::SeqCst) {
                    return Err(TransportError::http(503, "service unavailable"));
                }
                let reply = this.reply.lock().unwrap().clone();
                match reply {
                    Reply::Data(data) => Ok(RawResult::ok(data)),
                    Reply::Raw(body) => Ok(RawResult(body)),
                    Reply::Fail(err) => Err(err),
                }
            }
        })
    }
}
