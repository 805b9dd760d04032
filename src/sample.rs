//! Sample acquisition. Every register the cycle depends on is read here,
//! before any state is touched, so a bus error leaves the engine as it was.

use crate::gateway::RegisterGateway;
use crate::persist::DeltaStore;
use crate::registers::*;
use crate::{ChipError, FuelGauge};

/// A snapshot of the battery taken at the start of a cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    pub voltage_mv: u32,
    pub avg_voltage_mv: u32,
    pub current_ma: i32,
    pub avg_current_ma: i32,
    /// Signed SOC counter, 14 fractional bits
    pub raw_counter: i16,
    /// Tenths of °C
    pub temperature_dc: i32,
    /// Supplied by the host
    pub ui_soc_pct: u8,
    pub battery_is_charging_hw: bool,
    pub vm_status: bool,
    /// Only read while capacity learning is enabled
    pub capacity_cc: i32,
    pub capacity_ocv: u32,
    /// Only read while capacity learning is enabled
    pub cycle_count: u32,
}

impl<G, S, E> FuelGauge<G, S>
where
    G: RegisterGateway<Error = E>,
    S: DeltaStore,
{
    /// Reads a word twice until both reads agree. The counters are updated
    /// asynchronously and a torn read is possible otherwise
    async fn read_stable(&mut self, reg: u8) -> Result<u16, ChipError<E>> {
        const STABLE_READ_ATTEMPTS: u32 = 50;

        let mut value = self.gateway.read(reg).await?;

        for _ in 0..STABLE_READ_ATTEMPTS {
            let check = self.gateway.read(reg).await?;
            if check == value {
                return Ok(value);
            }
            value = check;
        }

        debug!("register 0x{:x} did not settle, using 0x{:x}", reg, value);

        Ok(value)
    }

    /// Waits for any of given flags, bounded
    async fn wait_status(&mut self, mask: StatusFlags) -> Result<(), ChipError<E>> {
        const STATUS_POLL_RETRIES: u32 = 10;
        const STATUS_POLL_DELAY_MS: u32 = 1;

        for _ in 0..STATUS_POLL_RETRIES {
            let flags = StatusFlags::from(self.gateway.read(regs::STATUS).await?);

            if flags.intersects(mask) {
                return Ok(());
            }

            self.gateway.delay_ms(STATUS_POLL_DELAY_MS).await;
        }

        Err(ChipError::PollTimeout)
    }

    /// Routes a quantity to the shared monitor output and reads it
    async fn read_monitor(&mut self, select: u8) -> Result<u16, ChipError<E>> {
        self.gateway.write(regs::MONOUT_SEL, select).await?;
        self.wait_status(StatusFlags::MONOUT_READY).await?;

        let raw = self.read_stable(regs::MONOUT).await?;

        self.gateway
            .write(regs::MONOUT_SEL, monout_sel::DEFAULT)
            .await?;

        Ok(raw)
    }

    pub(crate) async fn acquire_sample(&mut self) -> Result<RawSample, ChipError<E>> {
        let raw_counter = self.read_stable(regs::RSOC).await? as i16;

        let avg_current_ma = decode_current(self.read_monitor(monout_sel::AVG_CURRENT).await?);
        let avg_voltage_mv = decode_avg_voltage(self.read_monitor(monout_sel::AVG_VBAT).await?);
        let temperature_dc = decode_temperature(self.read_monitor(monout_sel::AVG_TEMP).await?);

        let voltage_mv = decode_voltage(self.gateway.read(regs::RVBAT).await?);
        let current_ma = decode_current(self.gateway.read(regs::RCUR_CC).await?);

        let status = StatusFlags::from(self.gateway.read(regs::STATUS).await?);
        let capacity_ocv = decode_capacity_ocv(self.gateway.read(regs::RBATCAP).await?);

        let (capacity_cc, cycle_count) = if self.config.enable_capacity_learning {
            let capacity_cc = decode_capacity_cc(self.gateway.read(regs::CAPCC).await?);
            let cycle_count = self.read_monitor(monout_sel::CYCLE).await? as u32;
            (capacity_cc, cycle_count)
        } else {
            (0, 0)
        };

        Ok(RawSample {
            voltage_mv,
            avg_voltage_mv,
            current_ma,
            avg_current_ma,
            raw_counter,
            temperature_dc,
            ui_soc_pct: self.host.ui_soc_pct,
            battery_is_charging_hw: status.contains(StatusFlags::CHG),
            vm_status: status.contains(StatusFlags::VM),
            capacity_cc,
            capacity_ocv,
            cycle_count,
        })
    }
}
