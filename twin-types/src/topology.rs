// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The desired topology produced by loading a routing snapshot.

use crate::device::Device;
use crate::device::DeviceName;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

/// An undirected interconnection between two devices.
///
/// The constructor canonicalizes endpoint order, so `Link::new(a, b)` and
/// `Link::new(b, a)` compare equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Link {
    a: DeviceName,
    b: DeviceName,
}

impl Link {
    pub fn new(a: DeviceName, b: DeviceName) -> Self {
        if a <= b { Self { a, b } } else { Self { a: b, b: a } }
    }

    pub fn endpoints(&self) -> (&DeviceName, &DeviceName) {
        (&self.a, &self.b)
    }

    pub fn touches(&self, name: &DeviceName) -> bool {
        &self.a == name || &self.b == name
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.a, self.b)
    }
}

/// An immutable view of the devices and links a routing snapshot describes.
///
/// Built fresh on every load; owns no running infrastructure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopologySnapshot {
    devices: BTreeMap<DeviceName, Device>,
    links: BTreeSet<Link>,
}

impl TopologySnapshot {
    pub fn new(
        devices: impl IntoIterator<Item = Device>,
        links: impl IntoIterator<Item = Link>,
    ) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
            links: links.into_iter().collect(),
        }
    }

    pub fn devices(&self) -> &BTreeMap<DeviceName, Device> {
        &self.devices
    }

    pub fn device(&self, name: &DeviceName) -> Option<&Device> {
        self.devices.get(name)
    }

    pub fn links(&self) -> &BTreeSet<Link> {
        &self.links
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Restricts the snapshot to at most `limit` devices, keeping the first
    /// `limit` in name order and discarding links that touch a discarded
    /// device.
    pub fn with_device_limit(mut self, limit: usize) -> Self {
        if self.devices.len() <= limit {
            return self;
        }
        let keep: BTreeSet<DeviceName> =
            self.devices.keys().take(limit).cloned().collect();
        self.devices.retain(|name, _| keep.contains(name));
        self.links.retain(|link| {
            let (a, b) = link.endpoints();
            keep.contains(a) && keep.contains(b)
        });
        self
    }
}
