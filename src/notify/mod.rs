//! # Outcome notifications.
//!
//! - [`NotificationSink`] - single-attempt transport
//! - [`NotificationDispatcher`] - best-effort delivery with its own backoff
//! - [`JobReport`] - title and body describing a finished job
//! - [`WxPushSink`], [`WxPusherSink`] - HTTP sinks (feature `wxpush`)

mod dispatcher;
mod message;
mod sink;

#[cfg(feature = "wxpush")]
mod wxpush;

pub use dispatcher::{DeliveryReport, NotificationDispatcher};
pub use message::JobReport;
pub use sink::NotificationSink;

#[cfg(feature = "wxpush")]
pub use wxpush::{WXPUSHER_ENDPOINT, WxPushSink, WxPusherSink, sink_from_env};
