// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared data model for the IXP digital twin.
//!
//! These types describe the emulated exchange point from two angles: the
//! *desired* topology produced by loading a routing snapshot
//! ([`topology::TopologySnapshot`]) and the *deployed* topology that is
//! actually running ([`scenario::DeployedScenario`]). The reconciliation
//! engine compares the two and drives the emulation backend until they agree.

pub mod device;
pub mod dumps;
pub mod push;
pub mod routes;
pub mod scenario;
pub mod topology;
