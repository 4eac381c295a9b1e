// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Payloads pushed into running devices and results read back out of them.

use crate::device::DeviceName;
use camino::Utf8PathBuf;
use serde::Serialize;
use std::collections::BTreeMap;

/// The configuration payload and commands needed to bring one running
/// device's configuration in line with the current scenario.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Files to transfer into the device, keyed by in-device path.
    pub files: BTreeMap<Utf8PathBuf, String>,
    /// Commands to execute inside the device after the transfer.
    pub commands: Vec<String>,
}

pub type DeviceInfoMap = BTreeMap<DeviceName, DeviceInfo>;

/// Output of a command executed inside a running device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The useful text of the command: stdout when there is any, stderr
    /// otherwise.
    pub fn text(&self) -> &str {
        if self.stdout.is_empty() { &self.stderr } else { &self.stdout }
    }
}

/// Runtime statistics for one running device, as reported by the emulation
/// backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    pub status: String,
    pub image: String,
    pub cpu_usage: String,
    pub memory_usage: String,
    pub pids: u32,
}
