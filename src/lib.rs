#![cfg_attr(not(test), no_std)]

//! SOC estimation engine for the Samsung S2MF301 fuel gauge block.
//!
//! The gauge keeps a hardware coulomb counter which is accurate but jumpy
//! around regime changes (charger plugged, temperature drop, relaxation).
//! The engine turns it into a percentage that moves smoothly, survives power
//! loss, and learns the real capacity of an aging cell.
//!
//! One call to [`FuelGauge::estimate`] is one estimation cycle: read a fresh
//! sample, pick the measurement mode, compensate, map, learn, apply the safety
//! overrides and persist. Scheduling cycles is up to the caller.

#[macro_use]
pub(crate) mod fmt;

pub mod config;
pub mod gateway;
pub mod learning;
pub mod mapping;
pub mod mode;
pub mod overrides;
pub mod persist;
pub mod registers;
pub mod sample;
pub mod shared;
pub mod soc;

#[cfg(test)]
pub(crate) mod fake;

use config::Config;
use gateway::RegisterGateway;
use learning::{CapacityModel, LearningState};
use mode::Mode;
use persist::DeltaStore;
use registers::{decode_capacity_ocv, regs, values};
use sample::RawSample;
use soc::{raw_soc_from_counter, soc_delta, SOC_FULL};

pub use gateway::I2cGateway;
pub use shared::SharedFuelGauge;

/// Chip error type
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipError<E> {
    /// Bus transaction failed, the cycle is aborted
    Register(E),
    /// The chip did not raise a ready flag in time
    PollTimeout,
    /// A mandatory configuration value is absent
    ConfigurationMissing(&'static str),
    /// Fixed-point arithmetic left its range. This is a bug, not a runtime condition
    ArithmeticOverflow,
}

impl<E> From<E> for ChipError<E> {
    fn from(e: E) -> Self {
        Self::Register(e)
    }
}

/// What the rest of the power-management stack tells the gauge
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HostStatus {
    /// SOC currently shown to the user, in percent
    pub ui_soc_pct: u8,
    /// Charger reports an active charge
    pub is_charging: bool,
    /// Charger float voltage in mV, when known
    pub float_voltage_mv: Option<u32>,
}

/// Result of one estimation cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReportedSoc {
    /// 0..=10000
    pub percent_hundredths: u32,
    pub mode: Mode,
    pub soh_pct: u32,
}

/// Capacity figures derived from the last cycle, all in chip capacity units
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapacityReport {
    pub full_charge: u32,
    pub remaining: u32,
    pub learned: u32,
    pub nominal: u32,
    pub cycle_count: u32,
    pub soh_pct: u32,
}

/// Long-lived engine state, mutated once per cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineState {
    pub mode: Mode,
    pub raw_soc: u32,
    pub reported_soc: u32,
    pub comp_offset: u32,
    pub soc_anchor_mapped: u32,
    pub soc_anchor_raw: u32,
    pub is_charging: bool,
    pub battery_is_charging_hw: bool,
    pub vm_status: bool,
    /// Next cycle re-anchors from the stored delta
    pub init_pending: bool,
    pub learning: LearningState,
    pub capacity_cc: i32,
    pub capacity_ocv: u32,
    pub soh_pct: u32,
}

impl EngineState {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            raw_soc: 0,
            reported_soc: 0,
            comp_offset: 0,
            soc_anchor_mapped: 0,
            soc_anchor_raw: 0,
            is_charging: false,
            battery_is_charging_hw: false,
            vm_status: false,
            init_pending: true,
            learning: LearningState::default(),
            capacity_cc: 0,
            capacity_ocv: 0,
            soh_pct: 100,
        }
    }
}

/// Everything a cycle may change before it can still fail
struct Checkpoint {
    state: EngineState,
    capacity: CapacityModel,
    seed_delta: Option<i16>,
    regime: Option<mapping::Regime>,
}

/// Gauge handle. Owns the register gateway and the persisted delta store
pub struct FuelGauge<G, S> {
    gateway: G,
    store: S,
    config: Config,
    host: HostStatus,
    state: EngineState,
    capacity: CapacityModel,
    /// Delta to re-anchor from on the next `init_pending` cycle
    seed_delta: Option<i16>,
    /// Parameters the current anchor was computed under
    regime: Option<mapping::Regime>,
    last_sample: Option<RawSample>,
}

impl<G, S, E> FuelGauge<G, S>
where
    G: RegisterGateway<Error = E>,
    S: DeltaStore,
{
    /// Creates the engine. Reads the measurement mode and the programmed
    /// capacity back from the chip and loads the delta saved before the last
    /// power loss
    pub async fn new(mut gateway: G, mut store: S, config: Config) -> Result<Self, ChipError<E>> {
        config.validate()?;

        let mode = Mode::read_from(&mut gateway).await?;
        let capacity_ocv = decode_capacity_ocv(gateway.read(regs::RBATCAP).await?);
        let seed_delta = store.load_delta();

        info!(
            "gauge up: mode {:?}, capacity {}, saved delta present {}",
            mode,
            capacity_ocv,
            seed_delta.is_some()
        );

        let capacity = CapacityModel {
            nominal_capacity: config.nominal_capacity,
            learned_capacity: if capacity_ocv > 0 {
                capacity_ocv
            } else {
                config.nominal_capacity
            },
            cycle_count: 0,
        };

        let mut state = EngineState::new(mode);
        state.capacity_ocv = capacity_ocv;
        state.soh_pct = capacity.soh_pct();

        Ok(Self {
            gateway,
            store,
            config,
            host: HostStatus::default(),
            state,
            capacity,
            seed_delta,
            regime: None,
            last_sample: None,
        })
    }

    /// Updates the inputs supplied by the charger and the battery service
    pub fn set_host_status(&mut self, host: HostStatus) {
        self.host = host;
    }

    /// Runs one estimation cycle.
    ///
    /// On error nothing is reported and the engine is left exactly as it was
    /// before the cycle, the caller may simply retry on its next tick
    pub async fn estimate(&mut self) -> Result<ReportedSoc, ChipError<E>> {
        let checkpoint = Checkpoint {
            state: self.state,
            capacity: self.capacity,
            seed_delta: self.seed_delta,
            regime: self.regime,
        };

        let result = self.run_cycle().await;

        if result.is_err() {
            debug!("cycle aborted, rolling back");
            self.state = checkpoint.state;
            self.capacity = checkpoint.capacity;
            self.seed_delta = checkpoint.seed_delta;
            self.regime = checkpoint.regime;
        }

        result
    }

    async fn run_cycle(&mut self) -> Result<ReportedSoc, ChipError<E>> {
        let sample = self.acquire_sample().await?;
        let raw_soc = raw_soc_from_counter(sample.raw_counter);

        self.update_mode(&sample).await?;

        let mapped = self.map_cycle(&sample, raw_soc);
        self.state.capacity_ocv = sample.capacity_ocv;

        if self.config.enable_capacity_learning {
            self.learn(&sample, raw_soc).await?;
        }

        let reported = self.apply_overrides(&sample, raw_soc, mapped).await?;
        let reported = reported.min(SOC_FULL);

        let delta = soc_delta(reported, raw_soc);
        self.store.store_delta(delta);
        if self.state.init_pending {
            self.seed_delta = Some(delta);
        }

        self.state.raw_soc = raw_soc;
        self.state.reported_soc = reported;
        self.state.soh_pct = self.capacity.soh_pct();
        self.last_sample = Some(sample);

        debug!(
            "raw {} mapped {} reported {} comp {} temp {} avg_i {} avg_v {}",
            raw_soc,
            mapped,
            reported,
            self.state.comp_offset,
            sample.temperature_dc,
            sample.avg_current_ma,
            sample.avg_voltage_mv
        );

        Ok(ReportedSoc {
            percent_hundredths: reported,
            mode: self.state.mode,
            soh_pct: self.state.soh_pct,
        })
    }

    /// Capacity figures as of the last cycle
    pub fn capacity_report(&self) -> CapacityReport {
        let full_charge =
            (100 - self.state.comp_offset.min(100)) as u64 * self.state.capacity_ocv as u64 / 100;
        let remaining = self.state.reported_soc as u64 * full_charge / SOC_FULL as u64;

        CapacityReport {
            full_charge: full_charge as u32,
            remaining: remaining as u32,
            learned: self.capacity.learned_capacity,
            nominal: self.capacity.nominal_capacity,
            cycle_count: self.capacity.cycle_count,
            soh_pct: self.capacity.soh_pct(),
        }
    }

    /// Open-circuit voltage (mV) expected at the last reported SOC
    pub fn open_circuit_voltage(&self) -> Option<i32> {
        self.config
            .ocv_table
            .ocv_for_soc(self.state.reported_soc as i32)
    }

    /// Makes the chip dump its accumulated state and recalculate SOC
    pub async fn restart_gauging(&mut self) -> Result<(), ChipError<E>> {
        info!("re-calculating SOC");

        self.gateway
            .write(regs::RESTART, values::RESTART_GAUGING)
            .await?;
        self.gateway.delay_ms(1000).await;

        Ok(())
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn capacity(&self) -> &CapacityModel {
        &self.capacity
    }

    pub fn last_sample(&self) -> Option<&RawSample> {
        self.last_sample.as_ref()
    }

    /// Gives the gateway and the store back
    pub fn release(self) -> (G, S) {
        (self.gateway, self.store)
    }
}
