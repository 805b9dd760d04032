//! Last-word rules applied on top of the mapped SOC.

use crate::gateway::RegisterGateway;
use crate::persist::DeltaStore;
use crate::registers::{regs, values};
use crate::sample::RawSample;
use crate::{ChipError, FuelGauge};

impl<G, S, E> FuelGauge<G, S>
where
    G: RegisterGateway<Error = E>,
    S: DeltaStore,
{
    /// Pins the chip's raw SOC to its minimum and lets it recalculate
    async fn force_raw_soc_to_zero(&mut self) -> Result<(), ChipError<E>> {
        const FIX_SETTLE_MS: u32 = 300;

        self.gateway
            .write(regs::RSOC_FIX, values::RSOC_FIX_MIN)
            .await?;
        self.gateway
            .write(regs::RESTART, values::RESTART_GAUGING)
            .await?;
        self.gateway.delay_ms(FIX_SETTLE_MS).await;

        let fix = self.gateway.read(regs::RSOC_FIX).await? as u8;
        self.gateway
            .write(regs::RSOC_FIX, fix & !values::RSOC_FIX_ENABLE)
            .await?;

        Ok(())
    }

    /// Returns the SOC to report for this cycle
    pub(crate) async fn apply_overrides(
        &mut self,
        sample: &RawSample,
        raw_soc: u32,
        mapped: u32,
    ) -> Result<u32, ChipError<E>> {
        let mut mapped = mapped;
        let mut reported = mapped;

        // battery under load and below cut-off, whatever the counter says
        if sample.avg_voltage_mv < self.config.low_voltage_limit_mv
            && sample.avg_current_ma < -50
            && raw_soc > 100
        {
            if sample.temperature_dc > self.config.low_temp_limit_dc {
                info!(
                    "low voltage {} mV at raw {}, forcing raw SOC to zero",
                    sample.avg_voltage_mv, raw_soc
                );
                self.force_raw_soc_to_zero().await?;
                mapped = 0;
            } else {
                info!("low voltage {} mV on a cold battery, reporting zero", sample.avg_voltage_mv);
            }
            reported = 0;
        }

        // a cold battery at rest reads empty while it is not, keep what the
        // user sees and start over from it next cycle
        let avg = sample.avg_current_ma;
        let cur = sample.current_ma;
        if sample.temperature_dc < self.config.low_temp_limit_dc
            && mapped == 0
            && raw_soc > 500
            && ((-60 < avg && avg < 50) || (-100 < cur && cur < 50))
        {
            reported = sample.ui_soc_pct as u32 * 100;
            self.state.init_pending = true;

            info!("battery relaxing, holding {}", reported);
        }

        Ok(reported)
    }
}
