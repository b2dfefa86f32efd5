//! Handler adapters for the managed runtime's flush command

use flushguard_core::config::DEFAULT_SUCCESS_REPLY;
use flushguard_core::ChannelReply;
use tracing::warn;

/// Error code replied when the runtime's flush routine fails
pub const FLUSH_FAILED_CODE: &str = "FLUSH_FAILED";

/// Adapt a flush routine into a channel handler replying the default
/// success marker.
///
/// `Ok` replies the success marker; `Err` replies an error object, which the
/// requester treats as a failed flush.
pub fn flush_handler<F>(flush: F) -> impl Fn() -> ChannelReply + Send + Sync + 'static
where
    F: Fn() -> Result<(), String> + Send + Sync + 'static,
{
    flush_handler_with(DEFAULT_SUCCESS_REPLY, flush)
}

/// Like `flush_handler`, for a requester configured with a non-default
/// `success_reply`.
pub fn flush_handler_with<F>(success_reply: impl Into<String>, flush: F) -> impl Fn() -> ChannelReply + Send + Sync + 'static
where
    F: Fn() -> Result<(), String> + Send + Sync + 'static,
{
    let success_reply = success_reply.into();
    move || match flush() {
        Ok(()) => ChannelReply::Value(success_reply.clone()),
        Err(message) => {
            warn!(error = %message, "managed runtime flush failed");
            ChannelReply::Error {
                code: FLUSH_FAILED_CODE.to_string(),
                message: Some(message),
            }
        }
    }
}
