//! Cross-Runtime Flush Requester: the first tier
//!
//! Asks the managed runtime, over a named method channel, to flush its own
//! buffered writes, then blocks the calling thread until the reply arrives or
//! the deadline passes.
//!
//! The wait is a `select` over a one-slot completion channel and a deadline
//! timer. The reply callback owns the sending half, so a reply that shows up
//! after the deadline is dropped on the floor instead of touching state the
//! caller has already abandoned.
//!
//! Outcomes are exclusive:
//! - reply equal to the success marker before the deadline -> `Success`
//! - any other reply, or the callback dropped unanswered   -> `Failed`
//! - deadline first                                        -> `TimedOut`
//!
//! A reply already delivered when the timer fires still counts; the deadline
//! is inclusive.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{at, bounded, select, TryRecvError};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Reply delivered by the managed runtime for a channel call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelReply {
    /// A string result
    Value(String),
    /// A call that completed without a result
    Empty,
    /// The handler reported an error
    Error { code: String, message: Option<String> },
    /// No handler is registered for the method
    NotImplemented,
}

/// Completion callback handed to a channel with each call.
pub type ReplyCallback = Box<dyn FnOnce(ChannelReply) + Send + 'static>;

/// A named, asynchronous call boundary into the managed runtime.
///
/// `invoke` must not block waiting for the reply; it may call `reply`
/// before returning, later from another thread, or never (dropping it).
pub trait MethodChannel: Send + Sync {
    fn name(&self) -> &str;
    fn invoke(&self, method: &str, reply: ReplyCallback);
}

/// Holder for the live managed-runtime handle.
///
/// The host attaches the engine once it is running and detaches it when the
/// engine goes away; the requester reads whatever is current at call time.
#[derive(Default)]
pub struct EngineSlot {
    channel: RwLock<Option<Arc<dyn MethodChannel>>>,
}

impl EngineSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot already holding `channel`.
    pub fn with_channel(channel: Arc<dyn MethodChannel>) -> Self {
        Self { channel: RwLock::new(Some(channel)) }
    }

    /// Install a handle, returning the previous one.
    pub fn attach(&self, channel: Arc<dyn MethodChannel>) -> Option<Arc<dyn MethodChannel>> {
        self.channel.write().replace(channel)
    }

    pub fn detach(&self) -> Option<Arc<dyn MethodChannel>> {
        self.channel.write().take()
    }

    pub fn current(&self) -> Option<Arc<dyn MethodChannel>> {
        self.channel.read().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.channel.read().is_some()
    }
}

impl fmt::Debug for EngineSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.channel.read().as_ref().map(|c| c.name().to_string());
        f.debug_struct("EngineSlot").field("channel", &name).finish()
    }
}

/// Why a first-tier flush did not succeed (timeouts excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushFailure {
    /// No live managed-runtime handle; nothing was sent
    EngineUnavailable,
    /// A string reply other than the success marker
    UnexpectedReply(String),
    /// Reply carried no value
    EmptyReply,
    /// Handler returned an error object
    ErrorReply { code: String, message: Option<String> },
    /// The runtime has no handler for the flush command
    NotImplemented,
    /// The callback was dropped without being called
    ReplyDropped,
}

impl fmt::Display for FlushFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushFailure::EngineUnavailable => write!(f, "managed runtime engine not available"),
            FlushFailure::UnexpectedReply(reply) => write!(f, "unexpected reply {:?}", reply),
            FlushFailure::EmptyReply => write!(f, "empty reply"),
            FlushFailure::ErrorReply { code, message } => match message {
                Some(message) => write!(f, "error reply {}: {}", code, message),
                None => write!(f, "error reply {}", code),
            },
            FlushFailure::NotImplemented => write!(f, "flush method not implemented"),
            FlushFailure::ReplyDropped => write!(f, "reply callback dropped"),
        }
    }
}

/// Result of one `request_flush` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushResponse {
    Success,
    Failed(FlushFailure),
    TimedOut,
}

impl FlushResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, FlushResponse::Success)
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, FlushResponse::TimedOut)
    }
}

enum Arrival {
    Reply(ChannelReply),
    Dropped,
    Deadline,
}

/// Sends the flush command to the managed runtime and waits, bounded.
#[derive(Debug, Clone)]
pub struct CrossRuntimeFlusher {
    slot: Arc<EngineSlot>,
    method: String,
    success_reply: String,
}

impl CrossRuntimeFlusher {
    pub fn new(slot: Arc<EngineSlot>, method: impl Into<String>, success_reply: impl Into<String>) -> Self {
        Self {
            slot,
            method: method.into(),
            success_reply: success_reply.into(),
        }
    }

    pub fn slot(&self) -> &Arc<EngineSlot> {
        &self.slot
    }

    /// Ask the managed runtime to flush and block for at most `timeout`.
    ///
    /// Without an attached engine this returns `Failed(EngineUnavailable)`
    /// immediately, so the caller can fall back without waiting.
    pub fn request_flush(&self, timeout: Duration) -> FlushResponse {
        let Some(channel) = self.slot.current() else {
            warn!(method = %self.method, "managed runtime engine not available, skipping cross-runtime flush");
            return FlushResponse::Failed(FlushFailure::EngineUnavailable);
        };

        let start = Instant::now();
        let deadline = start
            .checked_add(timeout)
            .unwrap_or_else(|| start + Duration::from_secs(86_400));
        let (tx, rx) = bounded::<ChannelReply>(1);

        debug!(
            channel = channel.name(),
            method = %self.method,
            timeout_ms = timeout.as_millis() as u64,
            "requesting managed runtime flush"
        );

        channel.invoke(
            &self.method,
            Box::new(move |reply| {
                // Receiver is gone once the requester gave up.
                let _ = tx.send(reply);
            }),
        );

        let arrival = select! {
            recv(rx) -> msg => match msg {
                Ok(reply) => Arrival::Reply(reply),
                Err(_) => Arrival::Dropped,
            },
            recv(at(deadline)) -> _ => match rx.try_recv() {
                Ok(reply) => Arrival::Reply(reply),
                Err(TryRecvError::Disconnected) => Arrival::Dropped,
                Err(TryRecvError::Empty) => Arrival::Deadline,
            },
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let response = match arrival {
            Arrival::Reply(reply) => self.interpret(reply),
            Arrival::Dropped => FlushResponse::Failed(FlushFailure::ReplyDropped),
            Arrival::Deadline => FlushResponse::TimedOut,
        };

        match &response {
            FlushResponse::Success => {
                info!(channel = channel.name(), elapsed_ms, "managed runtime flush succeeded");
            }
            FlushResponse::Failed(reason) => {
                warn!(channel = channel.name(), elapsed_ms, reason = %reason, "managed runtime flush failed");
            }
            FlushResponse::TimedOut => {
                warn!(
                    channel = channel.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "managed runtime flush timed out"
                );
            }
        }

        response
    }

    /// Only the exact success marker counts as success.
    fn interpret(&self, reply: ChannelReply) -> FlushResponse {
        match reply {
            ChannelReply::Value(value) if value == self.success_reply => FlushResponse::Success,
            ChannelReply::Value(value) => FlushResponse::Failed(FlushFailure::UnexpectedReply(value)),
            ChannelReply::Empty => FlushResponse::Failed(FlushFailure::EmptyReply),
            ChannelReply::Error { code, message } => {
                FlushResponse::Failed(FlushFailure::ErrorReply { code, message })
            }
            ChannelReply::NotImplemented => FlushResponse::Failed(FlushFailure::NotImplemented),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Replies from a helper thread after `delay`; `None` drops the callback.
    struct DelayedChannel {
        delay: Duration,
        reply: Option<ChannelReply>,
        calls: AtomicUsize,
    }

    impl DelayedChannel {
        fn new(delay: Duration, reply: Option<ChannelReply>) -> Arc<Self> {
            Arc::new(Self { delay, reply, calls: AtomicUsize::new(0) })
        }
    }

    impl MethodChannel for DelayedChannel {
        fn name(&self) -> &str {
            "test/lifecycle"
        }

        fn invoke(&self, _method: &str, reply: ReplyCallback) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            let value = self.reply.clone();
            thread::spawn(move || {
                thread::sleep(delay);
                if let Some(value) = value {
                    reply(value);
                }
            });
        }
    }

    /// Replies before `invoke` returns.
    struct InlineChannel(ChannelReply);

    impl MethodChannel for InlineChannel {
        fn name(&self) -> &str {
            "test/inline"
        }

        fn invoke(&self, _method: &str, reply: ReplyCallback) {
            reply(self.0.clone());
        }
    }

    fn flusher_with(channel: Arc<dyn MethodChannel>) -> CrossRuntimeFlusher {
        CrossRuntimeFlusher::new(
            Arc::new(EngineSlot::with_channel(channel)),
            "forceFlushHiveBoxes",
            "success",
        )
    }

    #[test]
    fn test_no_engine_fails_immediately() {
        let flusher = CrossRuntimeFlusher::new(Arc::new(EngineSlot::new()), "forceFlushHiveBoxes", "success");

        let start = Instant::now();
        let response = flusher.request_flush(Duration::from_millis(5000));

        assert_eq!(response, FlushResponse::Failed(FlushFailure::EngineUnavailable));
        assert!(!response.timed_out());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_success_marker() {
        let flusher = flusher_with(Arc::new(InlineChannel(ChannelReply::Value("success".into()))));
        assert!(flusher.request_flush(Duration::from_secs(1)).is_success());
    }

    #[test]
    fn test_other_replies_are_failures() {
        let cases = [
            (ChannelReply::Value("failure".into()), FlushFailure::UnexpectedReply("failure".into())),
            (ChannelReply::Value("SUCCESS".into()), FlushFailure::UnexpectedReply("SUCCESS".into())),
            (ChannelReply::Empty, FlushFailure::EmptyReply),
            (ChannelReply::NotImplemented, FlushFailure::NotImplemented),
            (
                ChannelReply::Error { code: "FLUSH_ERROR".into(), message: Some("box closed".into()) },
                FlushFailure::ErrorReply { code: "FLUSH_ERROR".into(), message: Some("box closed".into()) },
            ),
        ];

        for (reply, expected) in cases {
            let flusher = flusher_with(Arc::new(InlineChannel(reply)));
            assert_eq!(flusher.request_flush(Duration::from_secs(1)), FlushResponse::Failed(expected));
        }
    }

    #[test]
    fn test_dropped_callback_is_failure_not_timeout() {
        let channel = DelayedChannel::new(Duration::from_millis(10), None);
        let flusher = flusher_with(channel);

        let start = Instant::now();
        let response = flusher.request_flush(Duration::from_secs(5));
        assert_eq!(response, FlushResponse::Failed(FlushFailure::ReplyDropped));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_reply_before_deadline_succeeds() {
        let channel = DelayedChannel::new(Duration::from_millis(20), Some(ChannelReply::Value("success".into())));
        let flusher = flusher_with(channel.clone());

        assert_eq!(flusher.request_flush(Duration::from_millis(1000)), FlushResponse::Success);
        assert_eq!(channel.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reply_after_deadline_times_out() {
        let channel = DelayedChannel::new(Duration::from_millis(400), Some(ChannelReply::Value("success".into())));
        let flusher = flusher_with(channel);

        let start = Instant::now();
        let response = flusher.request_flush(Duration::from_millis(50));

        assert_eq!(response, FlushResponse::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_millis(350));

        // The late reply lands on a closed channel without panicking.
        thread::sleep(Duration::from_millis(450));
    }

    #[test]
    fn test_reply_present_at_deadline_counts() {
        // Zero timeout: timer and reply are both ready when the select runs.
        let flusher = flusher_with(Arc::new(InlineChannel(ChannelReply::Value("success".into()))));
        for _ in 0..50 {
            assert_eq!(flusher.request_flush(Duration::ZERO), FlushResponse::Success);
        }
    }

    #[test]
    fn test_detached_engine_is_unavailable() {
        let slot = Arc::new(EngineSlot::with_channel(Arc::new(InlineChannel(ChannelReply::Value(
            "success".into(),
        )))));
        let flusher = CrossRuntimeFlusher::new(Arc::clone(&slot), "forceFlushHiveBoxes", "success");
        assert!(flusher.request_flush(Duration::from_secs(1)).is_success());

        assert!(slot.detach().is_some());
        assert!(!slot.is_attached());
        assert_eq!(
            flusher.request_flush(Duration::from_secs(1)),
            FlushResponse::Failed(FlushFailure::EngineUnavailable)
        );
    }
}
