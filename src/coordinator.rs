use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

use crate::client::NeoHubClient;
use crate::normalize;
use crate::types::{DeviceRecord, HcMode, HoldDuration, HvacMode, NtpStatus, SystemRecord};
use crate::{Error, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(30);

/// One immutable poll result. Readers hold an `Arc` to it and are never
/// blocked by an in-flight refresh; a new snapshot replaces the old one
/// wholesale.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub devices: Vec<DeviceRecord>,
    pub system: SystemRecord,
}

impl Snapshot {
    pub fn device(&self, name: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.name == name)
    }
}

pub struct CoordinatorBuilder {
    client: Arc<NeoHubClient>,
    poll_interval: Duration,
    cycle_timeout: Duration,
    fetch_serials: bool,
    mode_overrides: HashMap<String, Vec<HvacMode>>,
}

impl CoordinatorBuilder {
    pub fn new(client: Arc<NeoHubClient>) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
            fetch_serials: false,
            mode_overrides: HashMap::new(),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    /// Also query the device serial-number listing on each refresh.
    pub fn fetch_serials(mut self, fetch: bool) -> Self {
        self.fetch_serials = fetch;
        self
    }

    /// Restrict the settable modes for one zone. Settable modes become the
    /// intersection of the device's own `available_modes` and this list.
    pub fn mode_override(mut self, zone: impl Into<String>, modes: Vec<HvacMode>) -> Self {
        self.mode_overrides.insert(zone.into(), modes);
        self
    }

    pub fn build(self) -> Coordinator {
        Coordinator {
            client: self.client,
            snapshot: RwLock::new(None),
            last_error: StdMutex::new(None),
            refresh_gate: Mutex::new(()),
            cycles: AtomicU64::new(0),
            version: AtomicU64::new(0),
            poll_interval: self.poll_interval,
            cycle_timeout: self.cycle_timeout,
            fetch_serials: self.fetch_serials,
            mode_overrides: self.mode_overrides,
        }
    }
}

/// Polls the hub on an interval, caches the latest normalized snapshot, and
/// coalesces concurrent refresh demands into a single cycle.
///
/// State machine: Uninitialized -> Refreshing -> Ready <-> Refreshing, with
/// failures retaining the last Ready snapshot (stale-but-available, never
/// torn down).
pub struct Coordinator {
    client: Arc<NeoHubClient>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    last_error: StdMutex<Option<Error>>,
    refresh_gate: Mutex<()>,
    cycles: AtomicU64,
    version: AtomicU64,
    poll_interval: Duration,
    cycle_timeout: Duration,
    fetch_serials: bool,
    mode_overrides: HashMap<String, Vec<HvacMode>>,
}

impl Coordinator {
    pub fn builder(client: Arc<NeoHubClient>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(client)
    }

    /// Latest cached snapshot, if any poll has ever succeeded. Lock-free for
    /// practical purposes: the read lock is held only to clone an `Arc`.
    pub fn data(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    /// True when the last refresh cycle succeeded and data is present.
    pub fn available(&self) -> bool {
        let failed = self.last_error.lock().expect("error lock poisoned").is_some();
        !failed && self.data().is_some()
    }

    /// Refresh now. If a cycle is already in flight the call attaches to it
    /// instead of starting a second one, so any number of concurrent demands
    /// cost the hub exactly one set of exchanges.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>> {
        let arrived = self.cycles.load(Ordering::SeqCst);
        let _gate = self.refresh_gate.lock().await;
        // The counter is bumped before the gate is released, so a caller
        // that queued behind an in-flight cycle always observes its
        // completion here and takes that cycle's outcome.
        if self.cycles.load(Ordering::SeqCst) != arrived {
            return self.last_outcome();
        }
        let outcome = self.run_cycle().await;
        self.cycles.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Drives refresh on the configured interval. Spawn this once per hub;
    /// it never returns.
    pub async fn run(&self) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.refresh().await {
                debug!(error = %e, "scheduled refresh failed");
            }
        }
    }

    // -- Write commands with optimistic cache patches --
    //
    // Each issues the hub command through the client and, on success,
    // patches the cached record so readers see the change before the next
    // poll confirms it. The patch is stamped with the snapshot version
    // current at call time; if a refresh has landed in the meantime the
    // patch is discarded, so optimistic state never outlives one cycle.

    pub async fn set_target_temperature(&self, zone: &str, temp: f64) -> Result<String> {
        let version = self.current_version();
        let reply = self.client.set_temperature(zone, temp).await?;
        self.patch_device(version, zone, |d| d.target_temperature = Some(temp));
        Ok(reply)
    }

    pub async fn set_cool_temp(&self, zone: &str, temp: f64) -> Result<String> {
        let version = self.current_version();
        let reply = self.client.set_cool_temp(zone, temp).await?;
        self.patch_device(version, zone, |d| d.cool_temp = Some(temp));
        Ok(reply)
    }

    /// Set a zone's mode. Off maps to the frost/standby preset; the other
    /// modes map to the hub's HC mode plus frost-off. The two exchanges are
    /// awaited in sequence, so this caller's ordering is preserved.
    pub async fn set_hvac_mode(&self, zone: &str, mode: HvacMode) -> Result<String> {
        self.check_mode_allowed(zone, mode)?;
        let version = self.current_version();
        let hc = match mode {
            HvacMode::Off => None,
            HvacMode::Heat => Some(HcMode::Heat),
            HvacMode::Cool => Some(HcMode::Cool),
            HvacMode::HeatCool => Some(HcMode::Auto),
            HvacMode::FanOnly => Some(HcMode::Vent),
        };
        let reply = match hc {
            Some(hc) => {
                let reply = self.client.set_hc_mode(zone, hc).await?;
                self.client.set_frost(zone, false).await?;
                reply
            }
            None => self.client.set_frost(zone, true).await?,
        };
        self.patch_device(version, zone, |d| {
            d.standby = hc.is_none();
            if let Some(hc) = hc {
                d.hc_mode = Some(hc);
            }
        });
        Ok(reply)
    }

    pub async fn set_standby(&self, zone: &str, on: bool) -> Result<String> {
        let version = self.current_version();
        let reply = self.client.set_frost(zone, on).await?;
        self.patch_device(version, zone, |d| d.standby = on);
        Ok(reply)
    }

    pub async fn set_away(&self, zone: &str, on: bool) -> Result<String> {
        let version = self.current_version();
        let reply = self.client.set_away(zone, on).await?;
        self.patch_device(version, zone, |d| d.away = on);
        Ok(reply)
    }

    pub async fn set_hold(&self, zone: &str, temp: f64, duration: HoldDuration) -> Result<String> {
        let version = self.current_version();
        let reply = self.client.set_hold(zone, temp, duration).await?;
        self.patch_device(version, zone, |d| {
            d.hold_on = true;
            d.hold_time = Some(duration);
            d.hold_temp = Some(temp);
        });
        Ok(reply)
    }

    pub async fn set_timer(&self, zone: &str, on: bool) -> Result<String> {
        let version = self.current_version();
        let reply = self.client.set_timer(zone, on).await?;
        self.patch_device(version, zone, |d| d.timer_on = on);
        Ok(reply)
    }

    pub async fn set_timer_hold(&self, zone: &str, on: bool, minutes: u32) -> Result<String> {
        let version = self.current_version();
        let reply = self.client.set_timer_hold(zone, on, minutes).await?;
        self.patch_device(version, zone, |d| d.timer_on = on);
        Ok(reply)
    }

    pub async fn set_manual(&self, zone: &str, on: bool) -> Result<String> {
        let version = self.current_version();
        let reply = self.client.set_manual(zone, on).await?;
        self.patch_device(version, zone, |d| d.manual_off = !on);
        Ok(reply)
    }

    // -- Refresh internals --

    async fn run_cycle(&self) -> Result<Arc<Snapshot>> {
        let result = match timeout(self.cycle_timeout, self.fetch_snapshot()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Unreachable(format!(
                "refresh cycle timed out after {:?}",
                self.cycle_timeout
            ))),
        };

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.snapshot.write().expect("snapshot lock poisoned") = Some(snapshot.clone());
                *self.last_error.lock().expect("error lock poisoned") = None;
                debug!(
                    version = snapshot.version,
                    devices = snapshot.devices.len(),
                    "refresh cycle complete"
                );
                Ok(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "refresh cycle failed, keeping previous snapshot");
                *self.last_error.lock().expect("error lock poisoned") = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let live = self.client.get_live_data().await?;
        let system = self.client.get_system().await?;
        let serials = if self.fetch_serials {
            match self.client.get_device_ids().await {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!(error = %e, "serial-number query failed, continuing without");
                    None
                }
            }
        } else {
            None
        };

        let (mut devices, system_record) =
            normalize::normalize(&live, &system, serials.as_ref())?;
        self.apply_mode_overrides(&mut devices);
        self.maintain_ntp(&system_record);

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Snapshot {
            version,
            devices,
            system: system_record,
        })
    }

    /// Some hubs fail to restart NTP after a power event. On every refresh
    /// that reports it stopped, issue a best-effort enable, fire-and-forget;
    /// its failure never fails the refresh cycle.
    fn maintain_ntp(&self, system: &SystemRecord) {
        if system.ntp == NtpStatus::Stopped {
            let client = self.client.clone();
            tokio::spawn(async move {
                match client.enable_ntp().await {
                    Ok(reply) => debug!(%reply, "re-enabled hub NTP"),
                    Err(e) => warn!(error = %e, "failed to re-enable hub NTP"),
                }
            });
        }
    }

    fn apply_mode_overrides(&self, devices: &mut [DeviceRecord]) {
        for device in devices.iter_mut() {
            if let Some(allowed) = self.mode_overrides.get(&device.name) {
                device.available_modes.retain(|hc| {
                    let mode = match hc {
                        HcMode::Heat => HvacMode::Heat,
                        HcMode::Cool => HvacMode::Cool,
                        HcMode::Auto => HvacMode::HeatCool,
                        HcMode::Vent => HvacMode::FanOnly,
                    };
                    allowed.contains(&mode)
                });
            }
        }
    }

    fn check_mode_allowed(&self, zone: &str, mode: HvacMode) -> Result<()> {
        if mode == HvacMode::Off {
            return Ok(());
        }
        // Without a snapshot there is nothing to check against.
        let Some(snapshot) = self.data() else { return Ok(()) };
        let Some(device) = snapshot.device(zone) else { return Ok(()) };
        if device.settable_modes().contains(&mode) {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "mode {mode:?} not settable for zone {zone:?}"
            )))
        }
    }

    fn last_outcome(&self) -> Result<Arc<Snapshot>> {
        if let Some(err) = self.last_error.lock().expect("error lock poisoned").clone() {
            return Err(err);
        }
        self.data().ok_or(Error::NoResponse)
    }

    fn current_version(&self) -> u64 {
        self.data().map(|s| s.version).unwrap_or(0)
    }

    fn patch_device(&self, version: u64, zone: &str, apply: impl FnOnce(&mut DeviceRecord)) {
        let mut guard = self.snapshot.write().expect("snapshot lock poisoned");
        let Some(current) = guard.as_ref() else { return };
        if current.version != version {
            // An authoritative refresh landed after the command was issued;
            // its values win over the optimistic patch.
            debug!(zone, "discarding optimistic patch against stale snapshot");
            return;
        }
        let mut devices = current.devices.clone();
        let system = current.system.clone();
        if let Some(device) = devices.iter_mut().find(|d| d.name == zone) {
            apply(device);
            *guard = Some(Arc::new(Snapshot { version, devices, system }));
        }
    }

    #[cfg(test)]
    fn install_snapshot(&self, devices: Vec<DeviceRecord>, version: u64) {
        *self.snapshot.write().unwrap() = Some(Arc::new(Snapshot {
            version,
            devices,
            system: SystemRecord::default(),
        }));
        self.version.store(version, Ordering::SeqCst);
    }
}
