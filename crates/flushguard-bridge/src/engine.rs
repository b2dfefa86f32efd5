//! Runtime Engine: the managed side of the method channel
//!
//! The engine runs on its own thread and drains a call queue. Each call
//! names a channel and a method; the engine looks up the registered handler,
//! runs it, and hands the result to the caller's reply callback, on the
//! engine thread.
//!
//! - Unknown channel/method pairs reply `NotImplemented`.
//! - A panicking handler replies an error instead of killing the thread.
//! - `shutdown` queues a stop message behind pending calls, so calls already
//!   queued are answered first. Calls sent after the thread exits are dropped
//!   together with their callbacks, which callers observe as an unanswered
//!   call.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use flushguard_core::{ChannelReply, FlushError, FlushResult, ReplyCallback};

use crate::channel::EngineChannel;

/// A method implementation living in the managed runtime.
pub type Handler = Arc<dyn Fn() -> ChannelReply + Send + Sync>;

/// Error code replied when a handler panics
pub const HANDLER_PANIC_CODE: &str = "HANDLER_PANIC";

pub(crate) struct Call {
    pub(crate) channel: String,
    pub(crate) method: String,
    pub(crate) reply: ReplyCallback,
}

pub(crate) enum Message {
    Call(Call),
    Shutdown,
}

/// Handlers keyed by channel name, then method name.
type Registry = RwLock<HashMap<String, HashMap<String, Handler>>>;

/// Handle to a running engine thread.
/// Dropping this handle stops the thread.
pub struct RuntimeEngine {
    name: String,
    handlers: Arc<Registry>,
    queue: Sender<Message>,
    handled: Arc<AtomicU64>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl RuntimeEngine {
    /// Spawn the engine thread. `name` is used as the thread name.
    pub fn start(name: impl Into<String>) -> FlushResult<Self> {
        let name = name.into();
        let handlers: Arc<Registry> = Arc::new(RwLock::new(HashMap::new()));
        let handled = Arc::new(AtomicU64::new(0));
        let (queue, inbox) = unbounded();

        let thread = {
            let handlers = Arc::clone(&handlers);
            let handled = Arc::clone(&handled);
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || engine_loop(inbox, handlers, handled))
                .map_err(|e| FlushError::EngineSpawn {
                    name: name.clone(),
                    message: e.to_string(),
                })?
        };

        debug!(engine = %name, "runtime engine started");

        Ok(Self {
            name,
            handlers,
            queue,
            handled,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register (or replace) the handler for `method` on `channel`.
    pub fn set_handler<F>(&self, channel: &str, method: &str, handler: F)
    where
        F: Fn() -> ChannelReply + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(channel.to_string())
            .or_default()
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Remove the handler for `method` on `channel`. Returns whether one existed.
    pub fn remove_handler(&self, channel: &str, method: &str) -> bool {
        let mut handlers = self.handlers.write();
        handlers
            .get_mut(channel)
            .map_or(false, |methods| methods.remove(method).is_some())
    }

    /// A channel handle onto this engine.
    pub fn channel(&self, name: impl Into<String>) -> Arc<EngineChannel> {
        Arc::new(EngineChannel::new(name.into(), self.queue.clone()))
    }

    /// Number of calls the engine thread has answered.
    pub fn calls_handled(&self) -> u64 {
        self.handled.load(Ordering::Acquire)
    }

    /// Check if the engine thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.lock().as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Stop the engine thread and wait for it. Idempotent.
    pub fn shutdown(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            let _ = self.queue.send(Message::Shutdown);
            let _ = handle.join();
            debug!(engine = %self.name, "runtime engine stopped");
        }
    }
}

impl Drop for RuntimeEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RuntimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeEngine")
            .field("name", &self.name)
            .field("calls_handled", &self.calls_handled())
            .finish()
    }
}

/// Main engine loop, runs on the engine thread.
fn engine_loop(inbox: Receiver<Message>, handlers: Arc<Registry>, handled: Arc<AtomicU64>) {
    while let Ok(message) = inbox.recv() {
        let call = match message {
            Message::Call(call) => call,
            Message::Shutdown => break,
        };

        let handler = handlers
            .read()
            .get(&call.channel)
            .and_then(|methods| methods.get(&call.method))
            .cloned();

        // Registry lock is released before the handler runs.
        let reply = match handler {
            Some(handler) => run_handler(&call, &handler),
            None => {
                debug!(channel = %call.channel, method = %call.method, "no handler registered");
                ChannelReply::NotImplemented
            }
        };

        // Counted before the callback so a caller woken by the reply sees it.
        handled.fetch_add(1, Ordering::Release);
        (call.reply)(reply);
    }
    // Calls queued behind the stop message are dropped with `inbox`.
}

fn run_handler(call: &Call, handler: &Handler) -> ChannelReply {
    match catch_unwind(AssertUnwindSafe(|| handler())) {
        Ok(reply) => reply,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned());
            warn!(
                channel = %call.channel,
                method = %call.method,
                panic = message.as_deref().unwrap_or("<non-string panic>"),
                "handler panicked"
            );
            ChannelReply::Error {
                code: HANDLER_PANIC_CODE.to_string(),
                message,
            }
        }
    }
}
