//! Best-effort notifications on terminal run status.
//!
//! Delivery failures are logged and swallowed; they never affect the run.

pub mod sender;

pub use sender::{
    LogSender, NotificationPayload, NotificationSink, NotifyError, WebhookSender,
};
