//! Event queue and dispatch plumbing for Revdoc.
//!
//! Events produced while one document operation runs are buffered in an
//! [`EventQueue`], reduced to their net effect by [`clean_events`], and
//! finally routed to the listeners held in a [`ListenerRegistry`].

pub mod error;
pub mod queue;
pub mod reducer;
pub mod registry;

pub use error::{EventError, EventResult};
pub use queue::{EventQueue, Outgoing, QueuedEvent};
pub use reducer::{clean_events, merge_field_events, ReductionStats};
pub use registry::{
    Delivery, EventCategory, Listener, ListenerId, ListenerRegistry, SyncNotification,
};
