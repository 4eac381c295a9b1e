// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-disk settings for the digital twin.
//!
//! The root structure is [`TwinConfig`]. Start and reload re-read the file,
//! so edits take effect on the next lifecycle operation without a process
//! restart. Dump kinds are closed enums: a file naming an unsupported kind
//! fails to load here rather than misbehaving later.

use camino::Utf8Path;
use camino::Utf8PathBuf;
use serde::Deserialize;
use std::collections::BTreeMap;
use twin_types::dumps::MemberDumpKind;
use twin_types::dumps::TableDumpKind;
use twin_types::routes::AddressFamily;

/// Top-level twin settings, deserialized from TOML.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TwinConfig {
    /// Directory holding uploaded dumps and reference files.
    pub resources_dir: Utf8PathBuf,
    pub peering: PeeringDumpConfig,
    pub rib_dumps: RibDumpConfig,
}

/// Where the exchange-point member list comes from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeeringDumpConfig {
    pub kind: MemberDumpKind,
    /// Path relative to the resources directory.
    pub path: Utf8PathBuf,
}

/// Where the routing-table dumps come from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RibDumpConfig {
    pub kind: TableDumpKind,
    /// One dump file per address family, relative to the resources
    /// directory.
    pub dumps: BTreeMap<AddressFamily, Utf8PathBuf>,
}

impl TwinConfig {
    pub fn from_file(path: &Utf8Path) -> Result<Self, LoadError> {
        let contents =
            std::fs::read_to_string(path).map_err(|err| LoadError::Io {
                path: path.to_owned(),
                err,
            })?;
        toml::from_str(&contents).map_err(|err| LoadError::Parse {
            path: path.to_owned(),
            err,
        })
    }

    /// Resolves a file name under the resources directory.
    pub fn resource_path(&self, file: &Utf8Path) -> Utf8PathBuf {
        self.resources_dir.join(file)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read configuration from {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("failed to parse configuration at {path}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}
