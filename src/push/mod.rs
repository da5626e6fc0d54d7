//! Push notification registry and dispatch.
//!
//! Subscriptions are registered by endpoint, fanned out to concurrently on
//! dispatch, and pruned when the push service reports the endpoint gone.
//! Delivery is best-effort end to end: a failed dispatch never propagates
//! into the operation that triggered it.

pub mod dispatcher;
pub mod registry;
pub mod transport;

pub use dispatcher::{DispatchOutcome, DispatchReport, NotificationPayload, PushDispatcher};
pub use registry::{
    MemorySubscriptionSet, PushError, SqlSubscriptionSet, Subscription, SubscriptionKeys,
    SubscriptionSet,
};
pub use transport::{Delivery, PushTransport, WebPushTransport};
