//! Ordered notification channels.
//!
//! [`GlobalSignal`] keeps one slot list for the whole job and
//! [`LocalSignal`] keeps one per schedule. The [`Fifo`]/[`Lifo`] policy
//! decides at registration time where a new slot goes.

pub mod activity;
pub mod global;
pub mod local;
pub mod policy;

pub use activity::{ActivityRegistry, SharedRegistry};
pub use global::GlobalSignal;
pub use local::LocalSignal;
pub use policy::{Fifo, Lifo, SignalResponse, SignalResponseType};
