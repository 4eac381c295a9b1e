// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Traits that let the reconciliation engine drive the emulation backend,
//! the dump loaders, and the configuration generators without depending on
//! their implementations.

use camino::Utf8Path;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use twin_config::TwinConfig;
use twin_types::device::DeviceName;
use twin_types::dumps::TableDumpKind;
use twin_types::push::DeviceInfo;
use twin_types::push::DeviceInfoMap;
use twin_types::push::DeviceStats;
use twin_types::push::RemoteOutput;
use twin_types::routes::RouteEntry;
use twin_types::scenario::DeployedScenario;
use twin_types::topology::Link;
use twin_types::topology::TopologySnapshot;

/// The container/network emulation backend.
///
/// Timeouts are the backend's responsibility: the engine treats an `Err`
/// from any of these methods exactly like a non-zero exit code.
pub trait EmulationFacilities: Send + Sync + 'static {
    /// Start the named devices of the scenario.
    fn deploy(
        &self,
        scenario: &DeployedScenario,
        devices: &BTreeSet<DeviceName>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Stop the named devices of the scenario.
    fn undeploy(
        &self,
        scenario: &DeployedScenario,
        devices: &BTreeSet<DeviceName>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Rewire the emulated network to add and remove the given links.
    fn update_interconnection(
        &self,
        snapshot: &TopologySnapshot,
        added: &BTreeSet<Link>,
        removed: &BTreeSet<Link>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Run a command inside a running device and capture its output.
    fn exec_remote(
        &self,
        device: &DeviceName,
        command: &str,
    ) -> impl Future<Output = anyhow::Result<RemoteOutput>> + Send;

    /// Transfer a device's configuration payload into it and execute the
    /// payload's commands, returning the exit code of the execution.
    fn copy_and_exec(
        &self,
        device: &DeviceName,
        info: &DeviceInfo,
    ) -> impl Future<Output = anyhow::Result<i32>> + Send;

    /// Runtime statistics for every device of the scenario.
    fn device_stats(
        &self,
        scenario: &DeployedScenario,
    ) -> impl Future<Output = anyhow::Result<BTreeMap<DeviceName, DeviceStats>>> + Send;
}

/// Turns the configured dump files into a desired topology.
pub trait TopologyLoader: Send + Sync + 'static {
    fn load_topology(
        &self,
        config: &TwinConfig,
    ) -> anyhow::Result<TopologySnapshot>;
}

/// A configuration generator for one device role (peering, route server,
/// RPKI validator).
pub trait ScenarioConfigurator: Send + Sync + 'static {
    /// Generate and attach startup configuration for every device of the
    /// scenario.
    fn apply_to_scenario(
        &self,
        scenario: &mut DeployedScenario,
    ) -> anyhow::Result<()>;

    /// Generate and attach startup configuration for a subset of devices
    /// only, leaving the rest untouched.
    fn apply_to_devices(
        &self,
        scenario: &mut DeployedScenario,
        subset: &BTreeSet<DeviceName>,
    ) -> anyhow::Result<()>;

    /// The payload and commands to push into the running devices this
    /// generator is responsible for.
    fn device_info(
        &self,
        scenario: &DeployedScenario,
    ) -> anyhow::Result<DeviceInfoMap>;
}

/// The three configuration generators the executor consults, one per role.
#[derive(Clone)]
pub struct ConfiguratorSet {
    pub peering: Arc<dyn ScenarioConfigurator>,
    pub route_server: Arc<dyn ScenarioConfigurator>,
    pub rpki: Arc<dyn ScenarioConfigurator>,
}

/// Parses a routing-table dump file into route entries.
///
/// The same parser instance handles uploaded reference dumps and re-parses
/// captured live output, so both sides of a RIB comparison are normalized
/// identically.
pub trait TableDumpParser: Send + Sync + 'static {
    fn parse_routes(&self, path: &Utf8Path)
    -> anyhow::Result<Vec<RouteEntry>>;
}

/// Static mapping from each supported dump kind to its parser.
///
/// The mapping is total over [`TableDumpKind`]: there is no runtime lookup
/// that can miss.
#[derive(Clone)]
pub struct DumpParserRegistry {
    mrt: Arc<dyn TableDumpParser>,
    bird_table: Arc<dyn TableDumpParser>,
}

impl DumpParserRegistry {
    pub fn new(
        mrt: Arc<dyn TableDumpParser>,
        bird_table: Arc<dyn TableDumpParser>,
    ) -> Self {
        Self { mrt, bird_table }
    }

    pub fn parser_for(&self, kind: TableDumpKind) -> &Arc<dyn TableDumpParser> {
        match kind {
            TableDumpKind::Mrt => &self.mrt,
            TableDumpKind::BirdTable => &self.bird_table,
        }
    }
}
