// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Route entries and the canonical signatures used to compare route sets.
//!
//! Two routes are "the same" iff their [`RouteSignature`]s are equal; the
//! signature is the (prefix, AS path) pair and nothing else. Every route-set
//! comparison in the system goes through [`signature_set`] so that both sides
//! of a diff are normalized identically.

use ipnet::IpNet;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Address family of a route prefix.
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
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn of(prefix: &IpNet) -> Self {
        match prefix {
            IpNet::V4(_) => AddressFamily::Ipv4,
            IpNet::V6(_) => AddressFamily::Ipv6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => f.write_str("ipv4"),
            AddressFamily::Ipv6 => f.write_str("ipv6"),
        }
    }
}

/// An AS path, most recent hop first, as learned from a routing table.
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
pub struct AsPath(Vec<u32>);

impl AsPath {
    pub fn new(asns: Vec<u32>) -> Self {
        Self(asns)
    }

    pub fn asns(&self) -> &[u32] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, asn) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "AS{asn}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid AS number {0:?} in AS path")]
pub struct AsPathParseError(String);

impl FromStr for AsPath {
    type Err = AsPathParseError;

    /// Parses a whitespace-separated AS path; each hop may carry an `AS`
    /// prefix (`AS1 AS2`) or be a bare number (`1 2`). An empty string is an
    /// empty path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split_whitespace()
            .map(|token| {
                token
                    .strip_prefix("AS")
                    .unwrap_or(token)
                    .parse::<u32>()
                    .map_err(|_| AsPathParseError(token.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// One entry of a routing table: a prefix and the AS path it was learned
/// through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub prefix: IpNet,
    pub as_path: AsPath,
}

impl RouteEntry {
    pub fn new(prefix: IpNet, as_path: AsPath) -> Self {
        Self { prefix, as_path }
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.prefix)
    }

    pub fn signature(&self) -> RouteSignature {
        RouteSignature {
            prefix: self.prefix,
            as_path: self.as_path.clone(),
        }
    }
}

/// Canonical identity of a route, used only for equality and set membership.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RouteSignature {
    prefix: IpNet,
    as_path: AsPath,
}

impl RouteSignature {
    pub fn prefix(&self) -> &IpNet {
        &self.prefix
    }

    pub fn as_path(&self) -> &AsPath {
        &self.as_path
    }
}

impl fmt::Display for RouteSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Network: {} - AS Path: {}", self.prefix, self.as_path)
    }
}

/// Deduplicates route entries into a set of signatures.
///
/// This is the single canonicalization path for route-set comparison: both
/// the reference side and the live side of a RIB diff must be funneled
/// through it.
pub fn signature_set(entries: &[RouteEntry]) -> BTreeSet<RouteSignature> {
    entries.iter().map(RouteEntry::signature).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(prefix: &str, asns: &[u32]) -> RouteEntry {
        RouteEntry::new(prefix.parse().unwrap(), AsPath::new(asns.to_vec()))
    }

    #[test]
    fn signature_display_format() {
        let sig = entry("10.0.1.0/24", &[3]).signature();
        assert_eq!(sig.to_string(), "Network: 10.0.1.0/24 - AS Path: AS3");

        let sig = entry("10.0.0.0/24", &[1, 2]).signature();
        assert_eq!(
            sig.to_string(),
            "Network: 10.0.0.0/24 - AS Path: AS1 AS2"
        );
    }

    #[test]
    fn empty_as_path_display() {
        let sig = entry("192.0.2.0/24", &[]).signature();
        assert_eq!(sig.to_string(), "Network: 192.0.2.0/24 - AS Path: ");
    }

    #[test]
    fn as_path_round_trips_through_display() {
        let path = AsPath::new(vec![64512, 65000]);
        assert_eq!(path.to_string().parse::<AsPath>().unwrap(), path);
        assert_eq!("1 2".parse::<AsPath>().unwrap(), AsPath::new(vec![1, 2]));
        assert_eq!("".parse::<AsPath>().unwrap(), AsPath::new(Vec::new()));
        assert!("ASfoo".parse::<AsPath>().is_err());
    }

    #[test]
    fn signature_set_deduplicates() {
        let entries = vec![
            entry("10.0.0.0/24", &[1, 2]),
            entry("10.0.0.0/24", &[1, 2]),
            entry("10.0.0.0/24", &[1, 3]),
        ];
        let set = signature_set(&entries);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn same_prefix_different_path_differs() {
        let a = entry("10.0.0.0/24", &[1, 2]).signature();
        let b = entry("10.0.0.0/24", &[2, 1]).signature();
        assert_ne!(a, b);
    }

    #[test]
    fn family_follows_prefix() {
        assert_eq!(entry("10.0.0.0/24", &[1]).family(), AddressFamily::Ipv4);
        assert_eq!(
            entry("2001:db8::/32", &[1]).family(),
            AddressFamily::Ipv6
        );
    }
}
