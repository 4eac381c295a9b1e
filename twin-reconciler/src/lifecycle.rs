// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lifecycle state machine gating start, stop, and reload of the twin.
//!
//! The phase lives in a `watch` channel and every transition goes through an
//! atomic closure, so two concurrent start requests can never both observe
//! an idle twin. Mutation of the deployed scenario is serialized by an
//! operations lock; reads (status, stats, remote exec, RIB comparison) go
//! through the published `watch` snapshot and never wait on an operation in
//! flight.

use crate::executor;
use crate::executor::ReconcileMode;
use crate::executor::StageFailure;
use crate::facilities::ConfiguratorSet;
use crate::facilities::DumpParserRegistry;
use crate::facilities::EmulationFacilities;
use crate::facilities::TopologyLoader;
use crate::plan::ReconciliationPlan;
use crate::rib;
use crate::rib::RibComparison;
use crate::rib::RibError;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use slog::Logger;
use slog::info;
use slog::o;
use slog::warn;
use slog_error_chain::InlineErrorChain;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use twin_config::TwinConfig;
use twin_types::device::DeviceName;
use twin_types::push::DeviceStats;
use twin_types::push::RemoteOutput;
use twin_types::scenario::DeployedScenario;

/// Where the twin is in its lifecycle.
///
/// A single enum rather than independent flags: "starting and running at the
/// same time" is unrepresentable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    Idle,
    Starting,
    Running,
    /// A start failed. The message is retained for status reporting; the
    /// phase behaves like `Idle` for the start guard, so the twin can be
    /// restarted.
    Error { message: String },
}

impl LifecyclePhase {
    fn can_start(&self) -> bool {
        matches!(self, LifecyclePhase::Idle | LifecyclePhase::Error { .. })
    }
}

/// Flattened view of the lifecycle for status reporting.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TwinStatus {
    pub running: bool,
    pub starting: bool,
    pub devices_count: Option<usize>,
    pub error: Option<String>,
    pub last_reconciliation: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("digital twin is already starting or running")]
    AlreadyActive,

    #[error("digital twin is not running")]
    NotRunning,

    #[error("digital twin has no deployed scenario")]
    NotInitialized,

    #[error("another lifecycle operation is already in flight")]
    OperationInFlight,

    #[error(transparent)]
    Config(#[from] twin_config::LoadError),

    #[error("failed to load topology snapshot: {0:#}")]
    LoadSnapshot(anyhow::Error),

    #[error("failed to tear down previous deployment: {0:#}")]
    Teardown(anyhow::Error),

    #[error(transparent)]
    Reconcile(#[from] StageFailure),

    #[error("no device named \"{0}\" in the deployed scenario")]
    NoSuchDevice(DeviceName),

    #[error("remote execution on device \"{device}\" failed: {err:#}")]
    Exec { device: DeviceName, err: anyhow::Error },

    #[error("failed to collect device statistics: {0:#}")]
    Stats(anyhow::Error),
}

struct Inner<T> {
    config_path: Utf8PathBuf,
    facilities: T,
    loader: Arc<dyn TopologyLoader>,
    configurators: ConfiguratorSet,
    parsers: DumpParserRegistry,
    phase_tx: watch::Sender<LifecyclePhase>,
    scenario_tx: watch::Sender<Option<Arc<DeployedScenario>>>,
    /// Serializes everything that mutates the deployed scenario: the
    /// background build, reload, and stop.
    ops_lock: tokio::sync::Mutex<()>,
    /// The in-flight background build, if any. Kept for ownership only;
    /// cancellation is intentionally unsupported.
    #[allow(dead_code)]
    build_task: Mutex<Option<JoinHandle<()>>>,
    log: Logger,
}

/// Control-plane surface of the digital twin.
///
/// Cheap to clone; all clones share one lifecycle.
pub struct TwinHandle<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TwinHandle<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: EmulationFacilities> TwinHandle<T> {
    pub fn new(
        config_path: Utf8PathBuf,
        facilities: T,
        loader: Arc<dyn TopologyLoader>,
        configurators: ConfiguratorSet,
        parsers: DumpParserRegistry,
        base_log: &Logger,
    ) -> Self {
        let log = base_log.new(o!("component" => "TwinHandle"));
        let (phase_tx, _) = watch::channel(LifecyclePhase::Idle);
        let (scenario_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                config_path,
                facilities,
                loader,
                configurators,
                parsers,
                phase_tx,
                scenario_tx,
                ops_lock: tokio::sync::Mutex::new(()),
                build_task: Mutex::new(None),
                log,
            }),
        }
    }

    /// Begins the initial full build in the background.
    ///
    /// The idle check and the transition to `Starting` are one atomic step;
    /// of any number of concurrent callers, exactly one begins the build and
    /// the rest get [`LifecycleError::AlreadyActive`]. Progress is observed
    /// through [`TwinHandle::status`] or [`TwinHandle::phase_receiver`].
    pub fn start(
        &self,
        limit: Option<usize>,
    ) -> Result<(), LifecycleError> {
        let mut began = false;
        self.inner.phase_tx.send_if_modified(|phase| {
            if phase.can_start() {
                *phase = LifecyclePhase::Starting;
                began = true;
                true
            } else {
                false
            }
        });
        if !began {
            return Err(LifecycleError::AlreadyActive);
        }

        info!(self.inner.log, "starting digital twin"; "device_limit" => ?limit);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            // Release the operations lock before publishing the terminal
            // phase: once a caller observes `Running` it must be able to
            // reload or stop without tripping over this task's guard.
            let result = {
                let _guard = inner.ops_lock.lock().await;
                run_full_build(&inner, limit).await
            };
            match result {
                Ok(devices_count) => {
                    info!(
                        inner.log, "digital twin started";
                        "devices_count" => devices_count
                    );
                    inner.phase_tx.send_replace(LifecyclePhase::Running);
                }
                Err(err) => {
                    warn!(
                        inner.log, "digital twin start failed";
                        "err" => %InlineErrorChain::new(&err)
                    );
                    inner.phase_tx.send_replace(LifecyclePhase::Error {
                        message: err.to_string(),
                    });
                }
            }
        });
        *self.inner.build_task.lock().unwrap() = Some(task);
        Ok(())
    }

    /// Tears the running twin down and returns to `Idle`.
    ///
    /// Only a `Running` twin can be stopped; in particular a `Starting` twin
    /// cannot, since an in-flight build is not cancellable.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        if !self.is_running() {
            return Err(LifecycleError::NotRunning);
        }
        let _guard = self
            .inner
            .ops_lock
            .try_lock()
            .map_err(|_| LifecycleError::OperationInFlight)?;
        // Recheck under the lock: a concurrent stop may have won the race.
        if !self.is_running() {
            return Err(LifecycleError::NotRunning);
        }

        info!(self.inner.log, "stopping digital twin");
        let scenario =
            self.current_scenario().ok_or(LifecycleError::NotInitialized)?;
        let names = scenario.device_names();
        if !names.is_empty() {
            self.inner
                .facilities
                .undeploy(&scenario, &names)
                .await
                .map_err(LifecycleError::Teardown)?;
        }
        self.inner.scenario_tx.send_replace(None);
        self.inner.phase_tx.send_replace(LifecyclePhase::Idle);
        info!(self.inner.log, "digital twin stopped");
        Ok(())
    }

    /// Reconciles the running twin against freshly loaded dumps.
    ///
    /// With `rs_only` the topology is left alone and only the route server
    /// and RPKI configurations are pushed; peerings are not updated. A
    /// failed reload is reported to the caller and leaves the twin
    /// `Running`, with whatever partial changes the completed stages made.
    pub async fn reload(
        &self,
        rs_only: bool,
        limit: Option<usize>,
    ) -> Result<(), LifecycleError> {
        if !self.is_running() {
            return Err(LifecycleError::NotRunning);
        }
        let _guard = self
            .inner
            .ops_lock
            .try_lock()
            .map_err(|_| LifecycleError::OperationInFlight)?;
        if !self.is_running() {
            return Err(LifecycleError::NotRunning);
        }

        if rs_only {
            warn!(
                self.inner.log,
                "reloading route server configuration only; \
                 peerings will not be updated"
            );
        }

        let config = TwinConfig::from_file(&self.inner.config_path)?;
        let snapshot = self
            .inner
            .loader
            .load_topology(&config)
            .map_err(LifecycleError::LoadSnapshot)?;
        let snapshot = match limit {
            Some(limit) => snapshot.with_device_limit(limit),
            None => snapshot,
        };

        let current =
            self.current_scenario().ok_or(LifecycleError::NotInitialized)?;
        let mut scenario = (*current).clone();
        let plan = if rs_only {
            ReconciliationPlan::empty()
        } else {
            ReconciliationPlan::diff(&snapshot, &scenario)
        };
        info!(
            self.inner.log, "reloading digital twin";
            "new_devices" => plan.add().len(),
            "deleted_devices" => plan.remove().len(),
            "rs_only" => rs_only
        );

        let result = executor::apply(
            &self.inner.log,
            &self.inner.facilities,
            &self.inner.configurators,
            &snapshot,
            &plan,
            &mut scenario,
            ReconcileMode::Incremental { skip_peering: rs_only },
        )
        .await;

        // Publish the scenario whether or not every stage committed; a
        // partial result is still what is actually running.
        self.inner.scenario_tx.send_replace(Some(Arc::new(scenario)));

        match result {
            Ok(()) => {
                info!(self.inner.log, "digital twin reload finished");
                Ok(())
            }
            Err(err) => {
                warn!(
                    self.inner.log, "digital twin reload failed";
                    "err" => %InlineErrorChain::new(&err)
                );
                Err(err.into())
            }
        }
    }

    /// Point-in-time lifecycle status. Never waits on an operation in
    /// flight.
    pub fn status(&self) -> TwinStatus {
        let phase = self.inner.phase_tx.borrow().clone();
        let scenario = self.current_scenario();
        let (running, starting, error) = match phase {
            LifecyclePhase::Idle => (false, false, None),
            LifecyclePhase::Starting => (false, true, None),
            LifecyclePhase::Running => (true, false, None),
            LifecyclePhase::Error { message } => (false, false, Some(message)),
        };
        TwinStatus {
            running,
            starting,
            devices_count: scenario.as_ref().map(|s| s.devices().len()),
            error,
            last_reconciliation: scenario
                .as_ref()
                .and_then(|s| s.time_last_reconciled()),
        }
    }

    /// Watch-side view of the phase, for callers that want change
    /// notifications rather than polling.
    pub fn phase_receiver(&self) -> watch::Receiver<LifecyclePhase> {
        self.inner.phase_tx.subscribe()
    }

    /// The currently published scenario, if any. The snapshot may be swapped
    /// out by a concurrent reconciliation between two calls.
    pub fn current_scenario(&self) -> Option<Arc<DeployedScenario>> {
        self.inner.scenario_tx.borrow().clone()
    }

    /// Runtime statistics for every deployed device.
    pub async fn device_stats(
        &self,
    ) -> Result<BTreeMap<DeviceName, DeviceStats>, LifecycleError> {
        if !self.is_running() {
            return Err(LifecycleError::NotRunning);
        }
        let scenario =
            self.current_scenario().ok_or(LifecycleError::NotInitialized)?;
        self.inner
            .facilities
            .device_stats(&scenario)
            .await
            .map_err(LifecycleError::Stats)
    }

    /// Runs a command inside one deployed device and returns its output.
    pub async fn exec_on_device(
        &self,
        device: &DeviceName,
        command: &str,
    ) -> Result<RemoteOutput, LifecycleError> {
        if !self.is_running() {
            return Err(LifecycleError::NotRunning);
        }
        let scenario =
            self.current_scenario().ok_or(LifecycleError::NotInitialized)?;
        if scenario.device(device).is_none() {
            return Err(LifecycleError::NoSuchDevice(device.clone()));
        }
        info!(
            self.inner.log, "executing command on device";
            "device" => %device,
            "command" => command
        );
        self.inner
            .facilities
            .exec_remote(device, command)
            .await
            .map_err(|err| LifecycleError::Exec {
                device: device.clone(),
                err,
            })
    }

    /// Compares one device's live RIB against an uploaded reference dump.
    pub async fn compare_rib(
        &self,
        device: &DeviceName,
        reference_file: &Utf8Path,
    ) -> Result<RibComparison, RibError> {
        if !self.is_running() {
            return Err(RibError::NotRunning);
        }
        let scenario =
            self.current_scenario().ok_or(RibError::NotRunning)?;
        let config = TwinConfig::from_file(&self.inner.config_path)?;
        rib::compare(
            &self.inner.log,
            &self.inner.facilities,
            &scenario,
            &self.inner.parsers,
            &config,
            device,
            reference_file,
        )
        .await
    }

    fn is_running(&self) -> bool {
        matches!(&*self.inner.phase_tx.borrow(), LifecyclePhase::Running)
    }
}

/// The background build behind [`TwinHandle::start`]: load everything from
/// disk, tear down any leftover deployment, then deploy the full desired
/// topology.
async fn run_full_build<T: EmulationFacilities>(
    inner: &Inner<T>,
    limit: Option<usize>,
) -> Result<usize, LifecycleError> {
    let config = TwinConfig::from_file(&inner.config_path)?;
    let snapshot = inner
        .loader
        .load_topology(&config)
        .map_err(LifecycleError::LoadSnapshot)?;
    let snapshot = match limit {
        Some(limit) => {
            info!(inner.log, "limiting devices"; "limit" => limit);
            snapshot.with_device_limit(limit)
        }
        None => snapshot,
    };

    // A previous failed start may have left devices behind; clean them up
    // before deploying anew.
    let leftover = inner.scenario_tx.borrow().clone();
    if let Some(previous) = leftover {
        let names = previous.device_names();
        info!(
            inner.log, "tearing down leftover deployment";
            "devices_count" => names.len()
        );
        if !names.is_empty() {
            inner
                .facilities
                .undeploy(&previous, &names)
                .await
                .map_err(LifecycleError::Teardown)?;
        }
        inner.scenario_tx.send_replace(None);
    }

    let plan = ReconciliationPlan::full_build(&snapshot);
    let mut scenario = DeployedScenario::new();
    let result = executor::apply(
        &inner.log,
        &inner.facilities,
        &inner.configurators,
        &snapshot,
        &plan,
        &mut scenario,
        ReconcileMode::FullBuild,
    )
    .await;

    let devices_count = scenario.devices().len();
    inner.scenario_tx.send_replace(Some(Arc::new(scenario)));
    result?;
    Ok(devices_count)
}
