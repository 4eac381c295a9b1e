// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The authoritative record of what is currently deployed.

use crate::device::Device;
use crate::device::DeviceName;
use crate::topology::Link;
use camino::Utf8PathBuf;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// How a device fared in the most recent diff pass.
///
/// Flags are assigned only while a reconciliation is being prepared and
/// applied; a `Del` entry disappears from the scenario once its undeploy
/// stage commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFlag {
    New,
    Del,
    Unchanged,
}

/// A device as tracked by the deployed scenario: the device itself, its flag
/// from the last diff pass, and any startup configuration attached by the
/// configuration generators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScenarioDevice {
    pub device: Device,
    pub flag: DeviceFlag,
    pub config_files: BTreeMap<Utf8PathBuf, String>,
}

/// The set of devices and links currently running in the emulation backend.
///
/// Owned exclusively by the reconciliation engine: mutated only through
/// diff+apply cycles and the stop teardown, never concurrently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeployedScenario {
    devices: BTreeMap<DeviceName, ScenarioDevice>,
    links: BTreeSet<Link>,
    time_created: DateTime<Utc>,
    time_last_reconciled: Option<DateTime<Utc>>,
}

impl DeployedScenario {
    pub fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
            links: BTreeSet::new(),
            time_created: Utc::now(),
            time_last_reconciled: None,
        }
    }

    pub fn devices(&self) -> &BTreeMap<DeviceName, ScenarioDevice> {
        &self.devices
    }

    pub fn device(&self, name: &DeviceName) -> Option<&ScenarioDevice> {
        self.devices.get(name)
    }

    pub fn device_names(&self) -> BTreeSet<DeviceName> {
        self.devices.keys().cloned().collect()
    }

    pub fn links(&self) -> &BTreeSet<Link> {
        &self.links
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn time_created(&self) -> DateTime<Utc> {
        self.time_created
    }

    pub fn time_last_reconciled(&self) -> Option<DateTime<Utc>> {
        self.time_last_reconciled
    }

    /// Inserts or refreshes a device entry.
    ///
    /// An existing entry keeps its attached configuration files; only the
    /// device data and flag are replaced.
    pub fn upsert_device(&mut self, device: Device, flag: DeviceFlag) {
        let name = device.name.clone();
        match self.devices.get_mut(&name) {
            Some(entry) => {
                entry.device = device;
                entry.flag = flag;
            }
            None => {
                self.devices.insert(
                    name,
                    ScenarioDevice {
                        device,
                        flag,
                        config_files: BTreeMap::new(),
                    },
                );
            }
        }
    }

    /// Reflags an existing entry; returns false if there is no such device.
    pub fn set_flag(&mut self, name: &DeviceName, flag: DeviceFlag) -> bool {
        match self.devices.get_mut(name) {
            Some(entry) => {
                entry.flag = flag;
                true
            }
            None => false,
        }
    }

    pub fn remove_device(
        &mut self,
        name: &DeviceName,
    ) -> Option<ScenarioDevice> {
        self.devices.remove(name)
    }

    /// Attaches a generated configuration file to a device entry; returns
    /// false if there is no such device.
    pub fn add_config_file(
        &mut self,
        name: &DeviceName,
        path: Utf8PathBuf,
        contents: String,
    ) -> bool {
        match self.devices.get_mut(name) {
            Some(entry) => {
                entry.config_files.insert(path, contents);
                true
            }
            None => false,
        }
    }

    pub fn apply_link_delta(
        &mut self,
        added: &BTreeSet<Link>,
        removed: &BTreeSet<Link>,
    ) {
        for link in removed {
            self.links.remove(link);
        }
        for link in added {
            self.links.insert(link.clone());
        }
    }

    pub fn mark_reconciled(&mut self, when: DateTime<Utc>) {
        self.time_last_reconciled = Some(when);
    }
}

impl Default for DeployedScenario {
    fn default() -> Self {
        Self::new()
    }
}
