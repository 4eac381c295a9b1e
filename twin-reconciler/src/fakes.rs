// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fake collaborators for the engine's tests.
//!
//! [`FakeFacilities`] records every backend call so tests can assert on
//! stage ordering, and can be programmed with per-device exit codes and
//! outputs to provoke failures.

use crate::facilities::ConfiguratorSet;
use crate::facilities::DumpParserRegistry;
use crate::facilities::EmulationFacilities;
use crate::facilities::ScenarioConfigurator;
use crate::facilities::TableDumpParser;
use crate::facilities::TopologyLoader;
use anyhow::Context as _;
use anyhow::bail;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use slog::Logger;
use slog::o;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use tokio::sync::Semaphore;
use twin_config::TwinConfig;
use twin_types::device::Device;
use twin_types::device::DeviceName;
use twin_types::device::DeviceRole;
use twin_types::device::RoutingDaemon;
use twin_types::push::DeviceInfo;
use twin_types::push::DeviceInfoMap;
use twin_types::push::DeviceStats;
use twin_types::push::RemoteOutput;
use twin_types::routes::AsPath;
use twin_types::routes::RouteEntry;
use twin_types::scenario::DeployedScenario;
use twin_types::topology::Link;
use twin_types::topology::TopologySnapshot;

pub(crate) fn logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

pub(crate) fn peer_device(name: &str) -> Device {
    Device {
        name: name.into(),
        role: DeviceRole::PeerRouter,
        daemon: None,
        ipv4_routes: Vec::new(),
        ipv6_routes: Vec::new(),
    }
}

pub(crate) fn route_server(name: &str) -> Device {
    Device {
        name: name.into(),
        role: DeviceRole::RouteServer,
        daemon: Some(RoutingDaemon::Bird),
        ipv4_routes: Vec::new(),
        ipv6_routes: Vec::new(),
    }
}

pub(crate) fn rpki_validator(name: &str) -> Device {
    Device {
        name: name.into(),
        role: DeviceRole::RpkiValidator,
        daemon: None,
        ipv4_routes: Vec::new(),
        ipv6_routes: Vec::new(),
    }
}

/// Writes a minimal twin configuration whose resources directory is `dir`
/// itself, and returns its path.
pub(crate) fn write_config(dir: &Utf8Path) -> Utf8PathBuf {
    let path = dir.join("twin.toml");
    let contents = format!(
        "resources_dir = \"{dir}\"\n\
         \n\
         [peering]\n\
         kind = \"euro_ix\"\n\
         path = \"members.json\"\n\
         \n\
         [rib_dumps]\n\
         kind = \"mrt\"\n\
         \n\
         [rib_dumps.dumps]\n\
         ipv4 = \"rib.ipv4.mrt\"\n"
    );
    std::fs::write(&path, contents).expect("wrote twin configuration");
    path
}

/// One recorded call into the fake emulation backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FakeCall {
    Deploy(BTreeSet<DeviceName>),
    Undeploy(BTreeSet<DeviceName>),
    Interconnect { added: BTreeSet<Link>, removed: BTreeSet<Link> },
    CopyAndExec(DeviceName),
    ExecRemote { device: DeviceName, command: String },
}

/// Lets a test hold a push stage open to observe the operations lock.
pub(crate) struct CopyGate {
    entered: Arc<Semaphore>,
    release: Arc<Semaphore>,
}

impl CopyGate {
    /// Waits until some `copy_and_exec` call has entered the gate.
    pub async fn entered(&self) {
        self.entered
            .acquire()
            .await
            .expect("gate semaphore open")
            .forget();
    }

    /// Lets every gated (and future) call proceed.
    pub fn release_all(&self) {
        self.release.add_permits(1024);
    }
}

#[derive(Default)]
struct FakeState {
    calls: Mutex<Vec<FakeCall>>,
    exit_codes: Mutex<BTreeMap<DeviceName, i32>>,
    exec_outputs: Mutex<BTreeMap<DeviceName, RemoteOutput>>,
    stats: Mutex<BTreeMap<DeviceName, DeviceStats>>,
    fail_deploy: AtomicBool,
    copy_gate: Mutex<Option<(Arc<Semaphore>, Arc<Semaphore>)>>,
}

/// An emulation backend that runs nothing and remembers everything.
#[derive(Clone, Default)]
pub(crate) struct FakeFacilities {
    state: Arc<FakeState>,
}

impl FakeFacilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.state.calls.lock().unwrap().clear();
    }

    pub fn set_exit_code(&self, device: &str, code: i32) {
        self.state.exit_codes.lock().unwrap().insert(device.into(), code);
    }

    pub fn set_exec_output(&self, device: &str, output: RemoteOutput) {
        self.state.exec_outputs.lock().unwrap().insert(device.into(), output);
    }

    pub fn set_stats(&self, device: &str, stats: DeviceStats) {
        self.state.stats.lock().unwrap().insert(device.into(), stats);
    }

    pub fn fail_deploy(&self) {
        self.state.fail_deploy.store(true, Ordering::SeqCst);
    }

    pub fn install_copy_gate(&self) -> CopyGate {
        let entered = Arc::new(Semaphore::new(0));
        let release = Arc::new(Semaphore::new(0));
        *self.state.copy_gate.lock().unwrap() =
            Some((Arc::clone(&entered), Arc::clone(&release)));
        CopyGate { entered, release }
    }

    fn record(&self, call: FakeCall) {
        self.state.calls.lock().unwrap().push(call);
    }
}

impl EmulationFacilities for FakeFacilities {
    async fn deploy(
        &self,
        _scenario: &DeployedScenario,
        devices: &BTreeSet<DeviceName>,
    ) -> anyhow::Result<()> {
        self.record(FakeCall::Deploy(devices.clone()));
        if self.state.fail_deploy.load(Ordering::SeqCst) {
            bail!("container backend refused to deploy");
        }
        Ok(())
    }

    async fn undeploy(
        &self,
        _scenario: &DeployedScenario,
        devices: &BTreeSet<DeviceName>,
    ) -> anyhow::Result<()> {
        self.record(FakeCall::Undeploy(devices.clone()));
        Ok(())
    }

    async fn update_interconnection(
        &self,
        _snapshot: &TopologySnapshot,
        added: &BTreeSet<Link>,
        removed: &BTreeSet<Link>,
    ) -> anyhow::Result<()> {
        self.record(FakeCall::Interconnect {
            added: added.clone(),
            removed: removed.clone(),
        });
        Ok(())
    }

    async fn exec_remote(
        &self,
        device: &DeviceName,
        command: &str,
    ) -> anyhow::Result<RemoteOutput> {
        self.record(FakeCall::ExecRemote {
            device: device.clone(),
            command: command.to_string(),
        });
        let output = self.state.exec_outputs.lock().unwrap().get(device).cloned();
        Ok(output.unwrap_or(RemoteOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        }))
    }

    async fn copy_and_exec(
        &self,
        device: &DeviceName,
        _info: &DeviceInfo,
    ) -> anyhow::Result<i32> {
        self.record(FakeCall::CopyAndExec(device.clone()));
        let gate = self.state.copy_gate.lock().unwrap().clone();
        if let Some((entered, release)) = gate {
            entered.add_permits(1);
            release.acquire().await.expect("gate semaphore open").forget();
        }
        let code =
            self.state.exit_codes.lock().unwrap().get(device).copied();
        Ok(code.unwrap_or(0))
    }

    async fn device_stats(
        &self,
        _scenario: &DeployedScenario,
    ) -> anyhow::Result<BTreeMap<DeviceName, DeviceStats>> {
        Ok(self.state.stats.lock().unwrap().clone())
    }
}

/// A loader that hands back a pre-built snapshot.
pub(crate) struct FakeLoader {
    snapshot: Mutex<TopologySnapshot>,
    fail: AtomicBool,
}

impl FakeLoader {
    pub fn new(snapshot: TopologySnapshot) -> Self {
        Self { snapshot: Mutex::new(snapshot), fail: AtomicBool::new(false) }
    }

    pub fn set_snapshot(&self, snapshot: TopologySnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl TopologyLoader for FakeLoader {
    fn load_topology(
        &self,
        _config: &TwinConfig,
    ) -> anyhow::Result<TopologySnapshot> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("malformed member dump");
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

/// Generates placeholder configuration for every device of the roles it is
/// responsible for.
struct RoleConfigurator {
    name: &'static str,
    roles: &'static [DeviceRole],
}

impl RoleConfigurator {
    fn covers(&self, device: &Device) -> bool {
        self.roles.contains(&device.role)
    }

    fn config_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("etc/{}.conf", self.name))
    }
}

impl ScenarioConfigurator for RoleConfigurator {
    fn apply_to_scenario(
        &self,
        scenario: &mut DeployedScenario,
    ) -> anyhow::Result<()> {
        let targets: Vec<DeviceName> = scenario
            .devices()
            .values()
            .filter(|entry| self.covers(&entry.device))
            .map(|entry| entry.device.name.clone())
            .collect();
        for name in targets {
            scenario.add_config_file(
                &name,
                self.config_path(),
                format!("# {} configuration for {name}\n", self.name),
            );
        }
        Ok(())
    }

    fn apply_to_devices(
        &self,
        scenario: &mut DeployedScenario,
        subset: &BTreeSet<DeviceName>,
    ) -> anyhow::Result<()> {
        for name in subset {
            let covered = scenario
                .device(name)
                .is_some_and(|entry| self.covers(&entry.device));
            if covered {
                scenario.add_config_file(
                    name,
                    self.config_path(),
                    format!("# {} configuration for {name}\n", self.name),
                );
            }
        }
        Ok(())
    }

    fn device_info(
        &self,
        scenario: &DeployedScenario,
    ) -> anyhow::Result<DeviceInfoMap> {
        Ok(scenario
            .devices()
            .values()
            .filter(|entry| self.covers(&entry.device))
            .map(|entry| {
                let name = entry.device.name.clone();
                let info = DeviceInfo {
                    files: [(
                        self.config_path(),
                        format!(
                            "# {} configuration for {name}\n",
                            self.name
                        ),
                    )]
                    .into_iter()
                    .collect(),
                    commands: vec![format!(
                        "/usr/lib/twin/apply-{}.sh",
                        self.name
                    )],
                };
                (name, info)
            })
            .collect())
    }
}

pub(crate) fn configurators() -> ConfiguratorSet {
    ConfiguratorSet {
        peering: Arc::new(RoleConfigurator {
            name: "peering",
            roles: &[DeviceRole::PeerRouter, DeviceRole::RouteServer],
        }),
        route_server: Arc::new(RoleConfigurator {
            name: "route-server",
            roles: &[DeviceRole::RouteServer],
        }),
        rpki: Arc::new(RoleConfigurator {
            name: "rpki",
            roles: &[DeviceRole::RpkiValidator],
        }),
    }
}

/// Parses one route per line: a prefix followed by the AS path, e.g.
/// `10.0.0.0/24 AS1 AS2`.
struct FakeParser;

impl TableDumpParser for FakeParser {
    fn parse_routes(
        &self,
        path: &Utf8Path,
    ) -> anyhow::Result<Vec<RouteEntry>> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading dump {path}"))?;
        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (prefix, path_text) =
                line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let prefix = prefix
                .parse()
                .with_context(|| format!("bad prefix in line {line:?}"))?;
            let as_path = path_text
                .parse::<AsPath>()
                .with_context(|| format!("bad AS path in line {line:?}"))?;
            entries.push(RouteEntry::new(prefix, as_path));
        }
        Ok(entries)
    }
}

pub(crate) fn parser_registry() -> DumpParserRegistry {
    DumpParserRegistry::new(Arc::new(FakeParser), Arc::new(FakeParser))
}
