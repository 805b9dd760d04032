//! Register access used by the engine. The engine only ever talks to the chip
//! through [`RegisterGateway`], so a board may put its own transport (or retry
//! policy) underneath. [`I2cGateway`] is the plain embedded-hal one.

use byteorder::{ByteOrder, LittleEndian};
use embedded_hal_async::{delay, i2c};

use crate::registers::DEFAULT_ADDRESS;
use crate::ChipError;

/// Synchronous-per-cycle register transactions
#[allow(async_fn_in_trait)]
pub trait RegisterGateway {
    type Error;

    /// Reads a little-endian word starting at `reg`
    async fn read(&mut self, reg: u8) -> Result<u16, ChipError<Self::Error>>;

    /// Reads `buf.len()` consecutive registers starting at `reg`
    async fn bulk_read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), ChipError<Self::Error>>;

    /// Writes a single register
    async fn write(&mut self, reg: u8, value: u8) -> Result<(), ChipError<Self::Error>>;

    /// Lets the chip settle between dependent transactions
    async fn delay_ms(&mut self, ms: u32);
}

/// Gateway over an async I2C bus
pub struct I2cGateway<I, D> {
    i2c: I,
    delay: D,
    addr: u8,
}

impl<I, D> I2cGateway<I, D> {
    /// Creates the gateway at the default bus address
    pub fn new(i2c: I, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I, delay: D, addr: u8) -> Self {
        Self { i2c, delay, addr }
    }

    /// Gives the bus back
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }
}

impl<I, D, E> RegisterGateway for I2cGateway<I, D>
where
    D: delay::DelayNs,
    I: i2c::I2c<Error = E>,
{
    type Error = E;

    async fn read(&mut self, reg: u8) -> Result<u16, ChipError<E>> {
        let mut response = [0, 0];

        self.i2c
            .write_read(self.addr, &[reg], &mut response)
            .await?;

        Ok(LittleEndian::read_u16(&response))
    }

    async fn bulk_read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), ChipError<E>> {
        self.i2c.write_read(self.addr, &[reg], buf).await?;
        Ok(())
    }

    async fn write(&mut self, reg: u8, value: u8) -> Result<(), ChipError<E>> {
        self.i2c.write(self.addr, &[reg, value]).await?;
        Ok(())
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
    }
}
