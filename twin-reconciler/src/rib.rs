// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compares a device's live routing table against a reference dump.
//!
//! The captured live output is written to a transient file and re-read by
//! the same dump parser that handles uploaded reference files. That detour
//! is deliberate: with a single canonicalization path on both sides, a
//! reported difference is a real difference and not a parsing artifact.

use crate::facilities::DumpParserRegistry;
use crate::facilities::EmulationFacilities;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use camino_tempfile::NamedUtf8TempFile;
use serde::Serialize;
use slog::Logger;
use slog::info;
use std::io::Write;
use twin_config::TwinConfig;
use twin_types::device::DeviceName;
use twin_types::routes::signature_set;
use twin_types::scenario::DeployedScenario;

/// The drift between a device's live RIB and an uploaded reference dump.
///
/// The difference lists hold canonical route signatures rendered as strings,
/// in sorted order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RibComparison {
    pub device: DeviceName,
    pub reference_file: Utf8PathBuf,
    /// Deduplicated route count on the live side.
    pub live_route_count: usize,
    /// Deduplicated route count on the reference side.
    pub uploaded_route_count: usize,
    pub only_in_live: Vec<String>,
    pub only_in_uploaded: Vec<String>,
    pub differences_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum RibError {
    #[error("digital twin is not running")]
    NotRunning,

    #[error(transparent)]
    Config(#[from] twin_config::LoadError),

    #[error("no device named \"{0}\" in the deployed scenario")]
    NoSuchDevice(DeviceName),

    #[error("device \"{0}\" does not run a supported routing daemon")]
    UnsupportedDevice(DeviceName),

    #[error("reference dump \"{0}\" not found")]
    ReferenceFileNotFound(Utf8PathBuf),

    #[error("failed to capture live RIB from \"{device}\": {reason}")]
    CaptureFailed { device: DeviceName, reason: String },

    #[error("failed to stage captured RIB for parsing")]
    Staging(#[source] std::io::Error),

    #[error("failed to parse RIB data: {0:#}")]
    Parse(anyhow::Error),
}

/// Captures the live RIB of `device_name` and diffs it against
/// `reference_file` (resolved under the configured resources directory).
///
/// Read-only: the deployed scenario is never mutated here.
pub(crate) async fn compare<T: EmulationFacilities>(
    log: &Logger,
    facilities: &T,
    scenario: &DeployedScenario,
    parsers: &DumpParserRegistry,
    config: &TwinConfig,
    device_name: &DeviceName,
    reference_file: &Utf8Path,
) -> Result<RibComparison, RibError> {
    let entry = scenario
        .device(device_name)
        .ok_or_else(|| RibError::NoSuchDevice(device_name.clone()))?;
    let daemon = entry
        .device
        .daemon
        .ok_or_else(|| RibError::UnsupportedDevice(device_name.clone()))?;

    let reference_path = config.resource_path(reference_file);
    if !reference_path.is_file() {
        return Err(RibError::ReferenceFileNotFound(reference_path));
    }

    info!(
        log, "capturing live RIB";
        "device" => %device_name,
        "command" => daemon.status_command()
    );
    let output = facilities
        .exec_remote(device_name, daemon.status_command())
        .await
        .map_err(|err| RibError::CaptureFailed {
            device: device_name.clone(),
            reason: format!("{err:#}"),
        })?;
    if !output.success() {
        return Err(RibError::CaptureFailed {
            device: device_name.clone(),
            reason: format!(
                "status command exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            ),
        });
    }

    let parser = parsers.parser_for(config.rib_dumps.kind);

    let mut staged = NamedUtf8TempFile::new().map_err(RibError::Staging)?;
    staged
        .write_all(output.text().as_bytes())
        .map_err(RibError::Staging)?;
    staged.flush().map_err(RibError::Staging)?;
    let live_entries =
        parser.parse_routes(staged.path()).map_err(RibError::Parse)?;
    let uploaded_entries =
        parser.parse_routes(&reference_path).map_err(RibError::Parse)?;

    let live = signature_set(&live_entries);
    let uploaded = signature_set(&uploaded_entries);

    let only_in_live: Vec<String> =
        live.difference(&uploaded).map(ToString::to_string).collect();
    let only_in_uploaded: Vec<String> =
        uploaded.difference(&live).map(ToString::to_string).collect();
    let differences_count = only_in_live.len() + only_in_uploaded.len();

    info!(
        log, "compared live RIB against reference dump";
        "device" => %device_name,
        "reference_file" => %reference_file,
        "differences" => differences_count
    );

    Ok(RibComparison {
        device: device_name.clone(),
        reference_file: reference_file.to_owned(),
        live_route_count: live.len(),
        uploaded_route_count: uploaded.len(),
        only_in_live,
        only_in_uploaded,
        differences_count,
    })
}
