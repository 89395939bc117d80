//! Event log and webhook fan-out.
//!
//! [`EventBus::save`] appends to the event log; [`EventBus::publish`] hands the
//! event to every active webhook of the workspace whose triggers include its
//! type. Each delivery runs on its own task, is signed with the webhook's
//! secret (see [`signature`]) and retried under a [`RetryPolicy`].

pub mod bus;
pub mod error;
pub mod payload;
pub mod retry;
pub mod sender;
pub mod signature;

pub use bus::{prepare, DeliveryReport, EventBus};
pub use error::DeliveryError;
pub use payload::{Delivery, WebhookPayload};
pub use retry::RetryPolicy;
pub use sender::{HttpWebhookSender, RecordingSender, WebhookSender};
pub use signature::{sign, verify, SIGNATURE_HEADER};
