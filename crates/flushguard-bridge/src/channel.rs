//! Named method channel onto a `RuntimeEngine`

use crossbeam_channel::Sender;
use tracing::debug;

use flushguard_core::{MethodChannel, ReplyCallback};

use crate::engine::{Call, Message};

/// A named channel. Calls are queued to the engine thread; `invoke` never
/// blocks on the reply.
pub struct EngineChannel {
    name: String,
    queue: Sender<Message>,
}

impl EngineChannel {
    pub(crate) fn new(name: String, queue: Sender<Message>) -> Self {
        Self { name, queue }
    }
}

impl MethodChannel for EngineChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, method: &str, reply: ReplyCallback) {
        let call = Call {
            channel: self.name.clone(),
            method: method.to_string(),
            reply,
        };
        if self.queue.send(Message::Call(call)).is_err() {
            // Engine is gone; the call and its callback are dropped here.
            debug!(channel = %self.name, method, "engine stopped, dropping call");
        }
    }
}

impl std::fmt::Debug for EngineChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineChannel").field("name", &self.name).finish()
    }
}
