// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Closed tag sets for the dump formats the twin understands.
//!
//! Unknown tags fail configuration deserialization; nothing in the engine
//! discovers an unsupported format at first use.

use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Format of a routing-table (RIB) dump.
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
pub enum TableDumpKind {
    Mrt,
    BirdTable,
}

impl fmt::Display for TableDumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableDumpKind::Mrt => f.write_str("mrt"),
            TableDumpKind::BirdTable => f.write_str("bird_table"),
        }
    }
}

/// Format of an exchange-point member list.
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
pub enum MemberDumpKind {
    EuroIx,
}

impl fmt::Display for MemberDumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberDumpKind::EuroIx => f.write_str("euro_ix"),
        }
    }
}
