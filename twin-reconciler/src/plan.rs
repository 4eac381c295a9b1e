// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Computes the delta between the desired topology and the deployed one.

use std::collections::BTreeSet;
use twin_types::device::DeviceName;
use twin_types::scenario::DeployedScenario;
use twin_types::topology::Link;
use twin_types::topology::TopologySnapshot;

/// The set of changes that would bring the deployed scenario in line with a
/// desired topology.
///
/// By construction the add and remove sets are disjoint, every added device
/// is absent from the deployed scenario, and every removed device is present
/// in it. Links between two unchanged devices never appear in either link
/// delta. All sets iterate in name order, so diagnostics derived from a plan
/// are reproducible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciliationPlan {
    add: BTreeSet<DeviceName>,
    remove: BTreeSet<DeviceName>,
    unchanged: BTreeSet<DeviceName>,
    links_to_add: BTreeSet<Link>,
    links_to_remove: BTreeSet<Link>,
}

impl ReconciliationPlan {
    /// Plans the changes needed to move `deployed` to `desired`.
    pub fn diff(
        desired: &TopologySnapshot,
        deployed: &DeployedScenario,
    ) -> Self {
        let desired_names: BTreeSet<DeviceName> =
            desired.devices().keys().cloned().collect();
        let deployed_names = deployed.device_names();
        let (add, remove, unchanged) =
            partition(&desired_names, &deployed_names);

        let links_to_add = desired
            .links()
            .iter()
            .filter(|link| {
                let (a, b) = link.endpoints();
                add.contains(a) || add.contains(b)
            })
            .cloned()
            .collect();
        let links_to_remove = deployed
            .links()
            .iter()
            .filter(|link| {
                let (a, b) = link.endpoints();
                remove.contains(a) || remove.contains(b)
            })
            .cloned()
            .collect();

        Self { add, remove, unchanged, links_to_add, links_to_remove }
    }

    /// Plans a first deploy: every desired device and link is added, nothing
    /// is removed.
    pub fn full_build(desired: &TopologySnapshot) -> Self {
        Self {
            add: desired.devices().keys().cloned().collect(),
            remove: BTreeSet::new(),
            unchanged: BTreeSet::new(),
            links_to_add: desired.links().clone(),
            links_to_remove: BTreeSet::new(),
        }
    }

    /// A plan that changes no devices and no links.
    pub fn empty() -> Self {
        Self {
            add: BTreeSet::new(),
            remove: BTreeSet::new(),
            unchanged: BTreeSet::new(),
            links_to_add: BTreeSet::new(),
            links_to_remove: BTreeSet::new(),
        }
    }

    pub fn add(&self) -> &BTreeSet<DeviceName> {
        &self.add
    }

    pub fn remove(&self) -> &BTreeSet<DeviceName> {
        &self.remove
    }

    pub fn unchanged(&self) -> &BTreeSet<DeviceName> {
        &self.unchanged
    }

    pub fn links_to_add(&self) -> &BTreeSet<Link> {
        &self.links_to_add
    }

    pub fn links_to_remove(&self) -> &BTreeSet<Link> {
        &self.links_to_remove
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty()
            && self.remove.is_empty()
            && self.links_to_add.is_empty()
            && self.links_to_remove.is_empty()
    }
}

/// Pure set arithmetic behind [`ReconciliationPlan::diff`].
fn partition(
    desired: &BTreeSet<DeviceName>,
    deployed: &BTreeSet<DeviceName>,
) -> (BTreeSet<DeviceName>, BTreeSet<DeviceName>, BTreeSet<DeviceName>) {
    let add = desired.difference(deployed).cloned().collect();
    let remove = deployed.difference(desired).cloned().collect();
    let unchanged = desired.intersection(deployed).cloned().collect();
    (add, remove, unchanged)
}
