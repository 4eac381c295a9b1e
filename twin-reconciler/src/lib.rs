// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconciliation and verification engine for the IXP digital twin.
//!
//! The engine turns a freshly loaded routing snapshot into a minimal set of
//! topology changes against the already-deployed twin and applies them in a
//! fixed stage order with fail-fast semantics. It also verifies a running
//! device by capturing its live RIB and diffing it against a reference dump.
//!
//! The pieces, leaf first:
//!
//! - [`ReconciliationPlan`] computes the add/remove/link delta between a
//!   desired [`twin_types::topology::TopologySnapshot`] and the deployed
//!   scenario.
//! - The executor (see [`Stage`]) applies a plan through the emulation
//!   backend, aborting at the first failing stage and leaving the scenario
//!   in the partial state the committed stages produced.
//! - [`TwinHandle`] is the lifecycle state machine: it gates start / stop /
//!   reload, serializes mutation of the deployed scenario, and runs the
//!   initial full build as a background task.
//! - [`RibComparison`] reports the drift between a device's live routing
//!   table and an uploaded reference dump.
//!
//! Everything that touches files, generates configuration text, or talks to
//! the container backend sits behind the traits in [`facilities`].

mod executor;
mod lifecycle;
mod plan;
mod rib;

pub mod facilities;

pub use executor::ReconcileMode;
pub use executor::Stage;
pub use executor::StageFailure;
pub use lifecycle::LifecycleError;
pub use lifecycle::LifecyclePhase;
pub use lifecycle::TwinHandle;
pub use lifecycle::TwinStatus;
pub use plan::ReconciliationPlan;
pub use rib::RibComparison;
pub use rib::RibError;

#[cfg(test)]
pub(crate) mod fakes;
