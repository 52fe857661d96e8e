//! Offline write queue, replay and connectivity tracking.

pub mod action;
mod network;
mod reconciler;

pub use action::PendingAction;
pub use network::{NetworkEvent, NetworkObserver, NetworkSignal};
pub use reconciler::{Reconciler, ReplayFailure, ReplayReport, WriteOutcome};
