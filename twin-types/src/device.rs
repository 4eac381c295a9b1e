// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Emulated devices and their identities.

use crate::routes::AddressFamily;
use crate::routes::RouteEntry;
use crate::routes::RouteSignature;
use crate::routes::signature_set;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Unique name of an emulated device within a scenario.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct DeviceName(String);

impl DeviceName {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// What a device does inside the exchange point replica.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    RouteServer,
    PeerRouter,
    RpkiValidator,
}

/// Routing daemon running on a device.
///
/// This is a closed set: configuration naming any other daemon is rejected
/// when the configuration is deserialized, not on first use.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RoutingDaemon {
    Bird,
    OpenBgpd,
}

impl RoutingDaemon {
    /// The command used to capture the full live RIB from a device running
    /// this daemon.
    pub fn status_command(&self) -> &'static str {
        match self {
            RoutingDaemon::Bird => "birdc show route all",
            RoutingDaemon::OpenBgpd => "bgpctl show rib",
        }
    }
}

impl fmt::Display for RoutingDaemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingDaemon::Bird => f.write_str("bird"),
            RoutingDaemon::OpenBgpd => f.write_str("openbgpd"),
        }
    }
}

/// An emulated device materialized from a routing snapshot.
///
/// Devices are immutable once produced; loading a new snapshot produces a
/// whole new set rather than mutating an existing one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: DeviceName,
    pub role: DeviceRole,
    /// Routing daemon running on the device, if any. An RPKI validator runs
    /// none, so its live RIB cannot be captured.
    pub daemon: Option<RoutingDaemon>,
    pub ipv4_routes: Vec<RouteEntry>,
    pub ipv6_routes: Vec<RouteEntry>,
}

impl Device {
    pub fn routes(&self, family: AddressFamily) -> &[RouteEntry] {
        match family {
            AddressFamily::Ipv4 => &self.ipv4_routes,
            AddressFamily::Ipv6 => &self.ipv6_routes,
        }
    }

    /// Deduplicated route signatures for one address family.
    pub fn route_signatures(
        &self,
        family: AddressFamily,
    ) -> BTreeSet<RouteSignature> {
        signature_set(self.routes(family))
    }
}
