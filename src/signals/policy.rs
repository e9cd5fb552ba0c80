//! FIFO/LIFO dispatch policies.
//!
//! The policy is a registration-time insertion choice: FIFO appends each
//! new slot, LIFO inserts it at the front. Invocation always walks the list
//! front to back, so FIFO slots fire in registration order and LIFO slots
//! fire most-recent first.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Runtime tag of a dispatch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalResponseType {
    /// Slots fire in registration order.
    Fifo,
    /// Slots fire in reverse registration order.
    Lifo,
}

/// Compile-time dispatch policy of a signal type.
pub trait SignalResponse: Send + Sync + 'static {
    /// Tag of this policy.
    const RESPONSE: SignalResponseType;

    /// Insert a newly registered slot.
    fn connect<S>(slots: &mut VecDeque<S>, slot: S) {
        match Self::RESPONSE {
            SignalResponseType::Fifo => slots.push_back(slot),
            SignalResponseType::Lifo => slots.push_front(slot),
        }
    }

    /// Merge another list's slots, treating them as registered after ours.
    ///
    /// The merged slots keep their relative firing order.
    fn merge<S: Clone>(slots: &mut VecDeque<S>, other: &VecDeque<S>) {
        match Self::RESPONSE {
            SignalResponseType::Fifo => slots.extend(other.iter().cloned()),
            SignalResponseType::Lifo => {
                for slot in other.iter().rev() {
                    slots.push_front(slot.clone());
                }
            }
        }
    }
}

/// First in, first out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fifo;

/// Last in, first out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lifo;

impl SignalResponse for Fifo {
    const RESPONSE: SignalResponseType = SignalResponseType::Fifo;
}

impl SignalResponse for Lifo {
    const RESPONSE: SignalResponseType = SignalResponseType::Lifo;
}
