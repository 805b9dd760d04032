//! The gauge integrates current most of the time, but near full charge the
//! current is too small to integrate well and the chip has to track the
//! voltage instead.

use crate::config::Config;
use crate::gateway::RegisterGateway;
use crate::persist::DeltaStore;
use crate::registers::{regs, values};
use crate::sample::RawSample;
use crate::{ChipError, FuelGauge, HostStatus};

/// Measurement regime of the gauge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Current,
    HighSocVoltage,
}

impl From<u8> for Mode {
    fn from(fg_mode: u8) -> Self {
        match fg_mode {
            values::MODE_HIGH_SOC_VOLTAGE => Self::HighSocVoltage,
            _ => Self::Current,
        }
    }
}

impl Mode {
    /// Reads the regime the chip is currently configured for
    pub async fn read_from<G: RegisterGateway>(
        gateway: &mut G,
    ) -> Result<Self, ChipError<G::Error>> {
        let raw = gateway.read(regs::FG_MODE).await?;
        Ok(Self::from(raw as u8))
    }

    /// Decides the regime for the next cycle. Sticky unless one of the
    /// transition conditions holds
    pub fn next(self, sample: &RawSample, host: &HostStatus, config: &Config) -> Self {
        let float_voltage = host.float_voltage_mv.unwrap_or(config.float_voltage_mv) * 996 / 1000;

        let near_full = host.is_charging
            && (sample.ui_soc_pct >= 98
                || (sample.avg_voltage_mv > float_voltage
                    && sample.avg_current_ma < config.high_soc_entry_current_ma));

        let loaded = sample.avg_current_ma < -50
            || sample.avg_current_ma >= config.high_soc_exit_current_ma;

        match self {
            Self::Current if near_full => Self::HighSocVoltage,
            Self::HighSocVoltage if !near_full && loaded => Self::Current,
            mode => mode,
        }
    }
}

impl<G, S, E> FuelGauge<G, S>
where
    G: RegisterGateway<Error = E>,
    S: DeltaStore,
{
    /// Reconfigures the measurement block for the given regime
    async fn write_mode(&mut self, mode: Mode) -> Result<(), ChipError<E>> {
        let cfg = self.gateway.read(regs::FG_MODE_CFG).await? as u8;

        match mode {
            Mode::HighSocVoltage => {
                self.gateway
                    .write(regs::FG_MODE, values::MODE_HIGH_SOC_VOLTAGE)
                    .await?;
                self.gateway
                    .write(regs::FG_MODE_CFG, cfg | values::MODE_CFG_VOLTAGE_BITS)
                    .await?;
            }
            Mode::Current => {
                self.gateway
                    .write(regs::FG_MODE, values::MODE_CURRENT)
                    .await?;
                self.gateway
                    .write(regs::FG_MODE_CFG, cfg & !values::MODE_CFG_VOLTAGE_BITS)
                    .await?;
            }
        }

        Ok(())
    }

    pub(crate) async fn update_mode(&mut self, sample: &RawSample) -> Result<Mode, ChipError<E>> {
        let next = self.state.mode.next(sample, &self.host, &self.config);

        if next != self.state.mode {
            self.write_mode(next).await?;
            info!("switched to {:?} mode", next);
            self.state.mode = next;
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeGauge, Reading};

    fn sample(avg_voltage_mv: u32, avg_current_ma: i32, ui_soc_pct: u8) -> RawSample {
        RawSample {
            voltage_mv: avg_voltage_mv,
            avg_voltage_mv,
            current_ma: avg_current_ma,
            avg_current_ma,
            raw_counter: 0,
            temperature_dc: 250,
            ui_soc_pct,
            battery_is_charging_hw: avg_current_ma > 0,
            vm_status: false,
            capacity_cc: 0,
            capacity_ocv: 0,
            cycle_count: 0,
        }
    }

    fn charging() -> HostStatus {
        HostStatus {
            ui_soc_pct: 0,
            is_charging: true,
            float_voltage_mv: Some(4400),
        }
    }

    #[test]
    fn enters_voltage_mode_near_full() {
        let config = Config::default();

        // UI already shows 98%
        assert_eq!(
            Mode::Current.next(&sample(4000, 1500, 98), &charging(), &config),
            Mode::HighSocVoltage
        );

        // above 99.6% of float voltage with taper current
        assert_eq!(
            Mode::Current.next(&sample(4390, 400, 90), &charging(), &config),
            Mode::HighSocVoltage
        );

        // float voltage reached, but current still high
        assert_eq!(
            Mode::Current.next(&sample(4390, 800, 90), &charging(), &config),
            Mode::Current
        );
    }

    #[test]
    fn never_enters_voltage_mode_without_charger() {
        let host = HostStatus {
            is_charging: false,
            ..charging()
        };

        assert_eq!(
            Mode::Current.next(&sample(4390, 100, 100), &host, &Config::default()),
            Mode::Current
        );
    }

    #[test]
    fn float_voltage_falls_back_to_config() {
        let host = HostStatus {
            float_voltage_mv: None,
            ..charging()
        };

        // 4350 * 0.996 = 4332
        assert_eq!(
            Mode::Current.next(&sample(4333, 100, 90), &host, &Config::default()),
            Mode::HighSocVoltage
        );
        assert_eq!(
            Mode::Current.next(&sample(4332, 100, 90), &host, &Config::default()),
            Mode::Current
        );
    }

    #[test]
    fn leaves_voltage_mode_under_load() {
        let config = Config::default();
        let host = HostStatus::default();

        assert_eq!(
            Mode::HighSocVoltage.next(&sample(4300, -51, 99), &host, &config),
            Mode::Current
        );
        assert_eq!(
            Mode::HighSocVoltage.next(&sample(4300, 550, 99), &host, &config),
            Mode::Current
        );
        // relaxed battery stays put
        assert_eq!(
            Mode::HighSocVoltage.next(&sample(4300, -50, 99), &host, &config),
            Mode::HighSocVoltage
        );
        assert_eq!(
            Mode::HighSocVoltage.next(&sample(4300, 549, 99), &host, &config),
            Mode::HighSocVoltage
        );
    }

    #[test]
    fn staying_near_full_wins_over_load() {
        // charging at 99% with a current that alone would mean "leave"
        assert_eq!(
            Mode::HighSocVoltage.next(&sample(4300, 600, 99), &charging(), &Config::default()),
            Mode::HighSocVoltage
        );
    }

    #[tokio::test]
    async fn transition_reconfigures_chip() {
        let mut gauge = FakeGauge::new()
            .with(Reading {
                avg_voltage_mv: 4390,
                avg_current_ma: 300,
                ..Default::default()
            })
            .engine()
            .await;
        gauge.gateway.set_reg(regs::FG_MODE_CFG, 0x81);
        gauge.set_host_status(charging());

        let sample = gauge.acquire_sample().await.unwrap();
        gauge.gateway.clear_writes();

        assert_eq!(
            gauge.update_mode(&sample).await.unwrap(),
            Mode::HighSocVoltage
        );
        assert_eq!(
            gauge.gateway.writes(),
            &[(regs::FG_MODE, 0xFF), (regs::FG_MODE_CFG, 0xF1)]
        );

        // no transition, no writes
        gauge.gateway.clear_writes();
        gauge.update_mode(&sample).await.unwrap();
        assert!(gauge.gateway.writes().is_empty());

        let sample = RawSample {
            avg_current_ma: -200,
            ..sample
        };
        gauge.set_host_status(HostStatus::default());
        assert_eq!(gauge.update_mode(&sample).await.unwrap(), Mode::Current);
        assert_eq!(
            gauge.gateway.writes(),
            &[(regs::FG_MODE, 0x10), (regs::FG_MODE_CFG, 0x81)]
        );
    }

    #[tokio::test]
    async fn initial_mode_is_read_back() {
        let gauge = FakeGauge::new()
            .with_reg(regs::FG_MODE, values::MODE_HIGH_SOC_VOLTAGE)
            .engine()
            .await;

        assert_eq!(gauge.state().mode, Mode::HighSocVoltage);
    }
}
