//! Register-file stand-in for the gauge, so whole cycles can be driven
//! without scripting every bus transaction.

use embedded_hal_async::i2c::ErrorKind;

use crate::config::{Config, LearningConfig, OcvTable};
use crate::gateway::RegisterGateway;
use crate::persist::RamDeltaStore;
use crate::registers::{monout_sel, regs, StatusFlags};
use crate::{ChipError, FuelGauge};

/// Physical values the fake chip reports
#[derive(Clone, Copy, Debug)]
pub struct Reading {
    pub raw_soc: u32,
    pub voltage_mv: u32,
    pub avg_voltage_mv: u32,
    pub current_ma: i32,
    pub avg_current_ma: i32,
    pub temperature_dc: i32,
    pub charging_hw: bool,
    pub vm: bool,
    pub capacity_ocv: u32,
    pub capacity_cc: i32,
    pub cycles: u16,
}

impl Default for Reading {
    fn default() -> Self {
        Self {
            raw_soc: 5000,
            voltage_mv: 3900,
            avg_voltage_mv: 3900,
            current_ma: -200,
            avg_current_ma: -200,
            temperature_dc: 250,
            charging_hw: false,
            vm: false,
            capacity_ocv: 4000,
            capacity_cc: 0,
            cycles: 0,
        }
    }
}

/// Rounds up. Encoding with this makes the (flooring) decoders exact
fn div_ceil(a: i64, b: i64) -> i64 {
    -((-a).div_euclid(b))
}

pub struct FakeGauge {
    regs: [u8; 256],
    monitor: [u16; 256],
    status: StatusFlags,
    pub monout_ready: bool,
    pub fail_reads: bool,
    /// Writes to this register fail
    pub fail_writes_to: Option<u8>,
    writes: Vec<(u8, u8)>,
    pub delays: Vec<u32>,
}

impl FakeGauge {
    pub fn new() -> Self {
        let mut gauge = Self {
            regs: [0; 256],
            monitor: [0; 256],
            status: StatusFlags::empty(),
            monout_ready: true,
            fail_reads: false,
            fail_writes_to: None,
            writes: Vec::new(),
            delays: Vec::new(),
        };
        gauge.regs[regs::MONOUT_SEL as usize] = monout_sel::DEFAULT;
        gauge.set(Reading::default());
        gauge
    }

    pub fn with(mut self, reading: Reading) -> Self {
        self.set(reading);
        self
    }

    pub fn with_reg(mut self, reg: u8, value: u8) -> Self {
        self.set_reg(reg, value);
        self
    }

    fn set_word(&mut self, reg: u8, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.regs[reg as usize] = low;
        self.regs[reg as usize + 1] = high;
    }

    pub fn word(&self, reg: u8) -> u16 {
        u16::from_le_bytes([self.regs[reg as usize], self.regs[reg as usize + 1]])
    }

    /// Loads new physical values, as if the battery moved on
    pub fn set(&mut self, reading: Reading) {
        let counter = div_ceil(reading.raw_soc as i64 * 16384, 10000);
        let voltage = div_ceil(reading.voltage_mv as i64 * 8192, 1000);
        let avg_voltage = div_ceil(reading.avg_voltage_mv as i64 * 4096, 1000);
        let current = -div_ceil(reading.current_ma as i64 * 2048, 1000);
        let avg_current = -div_ceil(reading.avg_current_ma as i64 * 2048, 1000);
        let temperature = div_ceil(reading.temperature_dc as i64 * 256, 10);

        self.set_word(regs::RSOC, counter as u16);
        self.set_word(regs::RVBAT, voltage as u16);
        self.set_word(regs::RCUR_CC, current as i16 as u16);
        self.set_word(regs::RBATCAP, (reading.capacity_ocv << 2) as u16);
        self.set_word(regs::CAPCC, (reading.capacity_cc * 2) as i16 as u16);

        self.monitor[monout_sel::AVG_CURRENT as usize] = avg_current as i16 as u16;
        self.monitor[monout_sel::AVG_VBAT as usize] = avg_voltage as u16;
        self.monitor[monout_sel::AVG_TEMP as usize] = temperature as i16 as u16;
        self.monitor[monout_sel::CYCLE as usize] = reading.cycles;

        self.status.set(StatusFlags::CHG, reading.charging_hw);
        self.status.set(StatusFlags::VM, reading.vm);
    }

    pub fn set_reg(&mut self, reg: u8, value: u8) {
        self.regs[reg as usize] = value;
    }

    pub fn reg(&self, reg: u8) -> u8 {
        self.regs[reg as usize]
    }

    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Engine on top of this fake with the test configuration
    pub async fn engine(self) -> FuelGauge<Self, RamDeltaStore> {
        self.engine_with(test_config(), RamDeltaStore::new()).await
    }

    pub async fn engine_with<S: crate::persist::DeltaStore>(
        self,
        config: Config,
        store: S,
    ) -> FuelGauge<Self, S> {
        FuelGauge::new(self, store, config).await.unwrap()
    }
}

impl RegisterGateway for FakeGauge {
    type Error = ErrorKind;

    async fn read(&mut self, reg: u8) -> Result<u16, ChipError<ErrorKind>> {
        if self.fail_reads {
            return Err(ChipError::Register(ErrorKind::Other));
        }

        Ok(match reg {
            regs::STATUS => {
                let mut status = self.status;
                status.set(StatusFlags::MONOUT_READY, self.monout_ready);
                status.bits() as u16
            }
            regs::MONOUT => self.monitor[self.reg(regs::MONOUT_SEL) as usize],
            _ => self.word(reg),
        })
    }

    async fn bulk_read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), ChipError<ErrorKind>> {
        if self.fail_reads {
            return Err(ChipError::Register(ErrorKind::Other));
        }

        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.regs[(reg as usize + i) & 0xFF];
        }

        Ok(())
    }

    async fn write(&mut self, reg: u8, value: u8) -> Result<(), ChipError<ErrorKind>> {
        if self.fail_writes_to == Some(reg) {
            return Err(ChipError::Register(ErrorKind::Other));
        }

        self.writes.push((reg, value));
        self.regs[reg as usize] = value;

        Ok(())
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
    }
}

/// A 4000-unit cell with both features on and a learning process short
/// enough to drive from a test
pub fn test_config() -> Config {
    Config {
        nominal_capacity: 4000,
        learning: LearningConfig {
            cycle_threshold: 10,
            required_count_1: 2,
            required_count_2: 2,
            ..LearningConfig::default()
        },
        ocv_table: OcvTable::from_points(&[
            (10000, 4350),
            (9000, 4200),
            (7000, 4000),
            (5000, 3850),
            (3000, 3750),
            (1000, 3650),
            (0, 3400),
        ]),
        ..Config::default()
    }
}
