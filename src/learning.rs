//! Capacity learning.
//!
//! A learning episode starts on a nearly empty, well-cycled battery and
//! waits for it to be charged full (condition 1) and then relaxed at full
//! (condition 2). The coulomb count of that charge is then compared with the
//! capacity the chip assumes and, if the two are close enough, blended into
//! it. Every step is hysteresis-gated, a single bad sample restarts the
//! count.

use crate::config::LearningConfig;
use crate::gateway::RegisterGateway;
use crate::persist::DeltaStore;
use crate::registers::{encode_capacity_ocv, regs, values};
use crate::sample::RawSample;
use crate::{ChipError, FuelGauge};

/// Below this temperature (tenths of °C) no learning happens
const LEARNING_MIN_TEMP_DC: i32 = 200;

/// Progress of the current learning episode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LearningState {
    pub learn_started: bool,
    pub cond1_satisfied: bool,
    pub c1_count: u32,
    pub c2_count: u32,
}

/// Capacity of the cell as far as the engine knows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapacityModel {
    pub nominal_capacity: u32,
    pub learned_capacity: u32,
    pub cycle_count: u32,
}

impl CapacityModel {
    /// State of health in percent, never above 100
    pub fn soh_pct(&self) -> u32 {
        if self.nominal_capacity == 0 {
            return 100;
        }

        (self.learned_capacity as u64 * 100 / self.nominal_capacity as u64).min(100) as u32
    }
}

/// What a single learning step asks the engine to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    Continue,
    Commit,
}

impl LearningState {
    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advances the episode by one sample
    pub fn step(&mut self, sample: &RawSample, raw_soc: u32, config: &LearningConfig) -> Step {
        if sample.temperature_dc < LEARNING_MIN_TEMP_DC {
            self.reset();
            return Step::Continue;
        }

        if !self.learn_started {
            if raw_soc < 1000 && sample.cycle_count >= config.cycle_threshold {
                self.learn_started = true;
                info!("capacity learning started at cycle {}", sample.cycle_count);
            }
            return Step::Continue;
        }

        if !self.cond1_satisfied {
            if !sample.battery_is_charging_hw {
                debug!("capacity learning: charger gone before full");
                self.reset();
                return Step::Continue;
            }

            if self.c1_count >= config.required_count_1 {
                self.cond1_satisfied = true;
                self.c1_count = 0;
                debug!("capacity learning: charged");
            } else if sample.voltage_mv >= config.vbat_threshold_mv
                && sample.avg_current_ma < config.current_threshold_ma
                && raw_soc >= 9700
            {
                self.c1_count += 1;
            } else {
                self.c1_count = 0;
            }

            return Step::Continue;
        }

        if self.c2_count >= config.required_count_2 {
            self.reset();
            return Step::Commit;
        }

        let avg = sample.avg_current_ma;
        if sample.voltage_mv >= config.vbat_threshold_mv.saturating_sub(100)
            && -30 < avg
            && avg < 30
            && raw_soc >= 9800
        {
            self.c2_count += 1;
        } else if avg <= -30 {
            info!("capacity learning aborted, discharge of {} mA", avg);
            self.reset();
        } else {
            self.c2_count = 0;
        }

        Step::Continue
    }
}

/// Blends the coulomb-counted capacity into the current one. `None` if the
/// measurement is too far off to be trusted
pub fn blend_capacity(capacity_cc: i32, capacity_ocv: u32, config: &LearningConfig) -> Option<i64> {
    if capacity_ocv == 0 {
        return None;
    }

    let cc = capacity_cc as i64;
    let ocv = capacity_ocv as i64;

    let gap = cc * 1000 / ocv;
    let low = if config.production { 900 } else { 800 };

    if gap <= low || gap >= 1100 {
        return None;
    }

    let (w_ocv, w_cc) = if config.heavy_weight { (75, 25) } else { (90, 10) };

    Some((ocv * w_ocv + cc * w_cc) / 100)
}

impl<G, S, E> FuelGauge<G, S>
where
    G: RegisterGateway<Error = E>,
    S: DeltaStore,
{
    /// Latches a new capacity into the chip
    async fn write_capacity(&mut self, capacity: u32) -> Result<(), ChipError<E>> {
        let [low, high] = encode_capacity_ocv(capacity).to_le_bytes();

        self.gateway.write(regs::RBATCAP, low).await?;
        self.gateway.write(regs::RBATCAP + 1, high).await?;

        let ctrl = self.gateway.read(regs::BATCAP_CTRL).await? as u8;
        self.gateway
            .write(regs::BATCAP_CTRL, ctrl | values::BATCAP_OCV_EN)
            .await?;

        Ok(())
    }

    async fn commit_capacity(&mut self) -> Result<(), ChipError<E>> {
        let blended = blend_capacity(
            self.state.capacity_cc,
            self.state.capacity_ocv,
            &self.config.learning,
        );

        let Some(blended) = blended else {
            info!(
                "learned capacity rejected: cc {} ocv {}",
                self.state.capacity_cc, self.state.capacity_ocv
            );
            return Ok(());
        };
        let capacity = u32::try_from(blended).map_err(|_| ChipError::ArithmeticOverflow)?;

        info!(
            "learned capacity {} (cc {}, ocv {})",
            capacity, self.state.capacity_cc, self.state.capacity_ocv
        );

        self.capacity.learned_capacity = capacity;

        if self.config.learning.write_back {
            // the episode stays committed even if the chip did not take it
            match self.write_capacity(capacity).await {
                Ok(()) => self.state.capacity_ocv = capacity,
                Err(_) => warn!("failed to write learned capacity {}", capacity),
            }
        }

        Ok(())
    }

    pub(crate) async fn learn(&mut self, sample: &RawSample, raw_soc: u32) -> Result<(), ChipError<E>> {
        self.state.capacity_cc = sample.capacity_cc;
        self.capacity.cycle_count = sample.cycle_count;

        let step = self
            .state
            .learning
            .step(sample, raw_soc, &self.config.learning);

        if step == Step::Commit {
            self.commit_capacity().await?;
        }

        Ok(())
    }
}
