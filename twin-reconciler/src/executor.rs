// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Applies a reconciliation plan through the emulation backend.
//!
//! Stages run in a fixed order and the first failure aborts everything after
//! it: there is no compensation and no automatic retry. The scenario is
//! mutated as stages commit, so after a failure it reflects exactly the
//! stages that succeeded.

use crate::facilities::ConfiguratorSet;
use crate::facilities::EmulationFacilities;
use crate::facilities::ScenarioConfigurator;
use crate::plan::ReconciliationPlan;
use chrono::Utc;
use slog::Logger;
use slog::info;
use std::fmt;
use twin_types::device::DeviceName;
use twin_types::scenario::DeployedScenario;
use twin_types::scenario::DeviceFlag;
use twin_types::topology::TopologySnapshot;

/// The ordered stages of a reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    GenerateConfigs,
    Deploy,
    Undeploy,
    Interconnect,
    PushRouteServer,
    PushRpki,
    PushPeering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::GenerateConfigs => "generate configuration",
            Stage::Deploy => "deploy devices",
            Stage::Undeploy => "undeploy devices",
            Stage::Interconnect => "update interconnection",
            Stage::PushRouteServer => "push route server configuration",
            Stage::PushRpki => "push RPKI configuration",
            Stage::PushPeering => "push peering configuration",
        };
        f.write_str(s)
    }
}

/// A reconciliation stage failed; all later stages were skipped.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub device: Option<DeviceName>,
    pub source: anyhow::Error,
}

impl StageFailure {
    fn new(stage: Stage, device: Option<DeviceName>, source: anyhow::Error) -> Self {
        Self { stage, device, source }
    }

    fn exit_code(stage: Stage, device: DeviceName, code: i32) -> Self {
        Self {
            stage,
            device: Some(device),
            source: anyhow::anyhow!(
                "remote command exited with status {code}"
            ),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reconciliation stage \"{}\" failed", self.stage)?;
        if let Some(device) = &self.device {
            write!(f, " on device \"{device}\"")?;
        }
        write!(f, ": {:#}", self.source)
    }
}

impl std::error::Error for StageFailure {}

/// How a plan is being applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileMode {
    /// First deploy: every configurator generates configuration for the
    /// whole scenario, and the peering push always runs.
    FullBuild,
    /// Reconciliation against a running scenario: only new devices get
    /// startup configuration, and the peering push can be skipped.
    Incremental { skip_peering: bool },
}

impl ReconcileMode {
    fn push_peering(&self) -> bool {
        match self {
            ReconcileMode::FullBuild => true,
            ReconcileMode::Incremental { skip_peering } => !skip_peering,
        }
    }
}

/// Applies `plan` to `scenario`, driving the backend through the ordered
/// stages.
///
/// On failure the scenario is left in the partial state the committed stages
/// produced; the caller is expected to publish that state rather than roll
/// it back.
pub(crate) async fn apply<T: EmulationFacilities>(
    log: &Logger,
    facilities: &T,
    configurators: &ConfiguratorSet,
    snapshot: &TopologySnapshot,
    plan: &ReconciliationPlan,
    scenario: &mut DeployedScenario,
    mode: ReconcileMode,
) -> Result<(), StageFailure> {
    info!(
        log, "applying reconciliation plan";
        "add" => plan.add().len(),
        "remove" => plan.remove().len(),
        "links_to_add" => plan.links_to_add().len(),
        "links_to_remove" => plan.links_to_remove().len(),
        "mode" => ?mode
    );

    // Diff pass over the scenario itself: refresh unchanged devices from the
    // snapshot, insert new ones, and flag the ones about to go away. Entries
    // flagged `Del` stay in place until the undeploy stage commits.
    for name in plan.unchanged() {
        if let Some(device) = snapshot.device(name) {
            scenario.upsert_device(device.clone(), DeviceFlag::Unchanged);
        }
    }
    for name in plan.add() {
        if let Some(device) = snapshot.device(name) {
            scenario.upsert_device(device.clone(), DeviceFlag::New);
        }
    }
    for name in plan.remove() {
        scenario.set_flag(name, DeviceFlag::Del);
    }

    // Stage 1: generate startup configuration. Devices that are already
    // deployed are never reconfigured here; their running config is only
    // touched by the push stages below.
    let stage = Stage::GenerateConfigs;
    match mode {
        ReconcileMode::FullBuild => {
            let all: [&dyn ScenarioConfigurator; 3] = [
                configurators.peering.as_ref(),
                configurators.route_server.as_ref(),
                configurators.rpki.as_ref(),
            ];
            for configurator in all {
                configurator
                    .apply_to_scenario(scenario)
                    .map_err(|err| StageFailure::new(stage, None, err))?;
            }
        }
        ReconcileMode::Incremental { .. } => {
            if !plan.add().is_empty() {
                configurators
                    .peering
                    .apply_to_devices(scenario, plan.add())
                    .map_err(|err| StageFailure::new(stage, None, err))?;
            }
        }
    }

    // Stage 2: start the new devices.
    if !plan.add().is_empty() {
        facilities
            .deploy(scenario, plan.add())
            .await
            .map_err(|err| StageFailure::new(Stage::Deploy, None, err))?;
    }

    // Stage 3: stop the removed devices, then drop them from the scenario.
    if !plan.remove().is_empty() {
        facilities
            .undeploy(scenario, plan.remove())
            .await
            .map_err(|err| StageFailure::new(Stage::Undeploy, None, err))?;
        for name in plan.remove() {
            scenario.remove_device(name);
        }
    }

    // Stage 4: rewire links that touch changed devices. Links between two
    // unchanged devices are never part of the plan's delta.
    if !plan.links_to_add().is_empty() || !plan.links_to_remove().is_empty() {
        facilities
            .update_interconnection(
                snapshot,
                plan.links_to_add(),
                plan.links_to_remove(),
            )
            .await
            .map_err(|err| {
                StageFailure::new(Stage::Interconnect, None, err)
            })?;
        scenario.apply_link_delta(plan.links_to_add(), plan.links_to_remove());
    }

    // Stages 5 and 6 run unconditionally so that route server and RPKI state
    // are never stale after a successful reconciliation, whatever the
    // peering flag says.
    push_device_info(
        log,
        facilities,
        configurators.route_server.as_ref(),
        scenario,
        Stage::PushRouteServer,
    )
    .await?;
    push_device_info(
        log,
        facilities,
        configurators.rpki.as_ref(),
        scenario,
        Stage::PushRpki,
    )
    .await?;

    // Stage 7: peering configuration for devices whose peerings changed.
    if mode.push_peering() {
        push_device_info(
            log,
            facilities,
            configurators.peering.as_ref(),
            scenario,
            Stage::PushPeering,
        )
        .await?;
    } else {
        info!(log, "skipping peering configuration push");
    }

    scenario.mark_reconciled(Utc::now());
    Ok(())
}

/// Generates one configurator's device payloads and pushes them, one device
/// at a time in name order.
async fn push_device_info<T: EmulationFacilities>(
    log: &Logger,
    facilities: &T,
    configurator: &dyn ScenarioConfigurator,
    scenario: &DeployedScenario,
    stage: Stage,
) -> Result<(), StageFailure> {
    let info = configurator
        .device_info(scenario)
        .map_err(|err| StageFailure::new(stage, None, err))?;
    for (device, device_info) in &info {
        let exit_code = facilities
            .copy_and_exec(device, device_info)
            .await
            .map_err(|err| {
                StageFailure::new(stage, Some(device.clone()), err)
            })?;
        if exit_code != 0 {
            return Err(StageFailure::exit_code(
                stage,
                device.clone(),
                exit_code,
            ));
        }
        info!(log, "pushed device configuration"; "device" => %device, "stage" => %stage);
    }
    Ok(())
}
