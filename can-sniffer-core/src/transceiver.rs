//! Bus transceiver interface
//!
//! The physical controller (an MCP2515-class chip in listen-only mode, a
//! SocketCAN interface, a replayed capture...) lives outside the core. It
//! delivers raw frames and accepts speed configuration; nothing else. There is
//! deliberately no transmit operation.

use crate::types::{BusSpeed, RawFrame, Result};

/// Receive-only access to a bus controller
pub trait Transceiver {
    /// Reconfigure the controller for `speed`
    ///
    /// Errors with [`SnifferError::PeripheralConfig`](crate::SnifferError::PeripheralConfig)
    /// when the controller rejects the speed.
    fn configure(&mut self, speed: BusSpeed) -> Result<()>;

    /// Non-blocking receive
    ///
    /// * `None` - no frame is waiting
    /// * `Some(Ok(frame))` - a frame was read
    /// * `Some(Err(_))` - a frame was pending but could not be read
    fn try_receive(&mut self) -> Option<Result<RawFrame>>;
}

impl<T: Transceiver + ?Sized> Transceiver for &mut T {
    fn configure(&mut self, speed: BusSpeed) -> Result<()> {
        (**self).configure(speed)
    }

    fn try_receive(&mut self) -> Option<Result<RawFrame>> {
        (**self).try_receive()
    }
}

impl<T: Transceiver + ?Sized> Transceiver for Box<T> {
    fn configure(&mut self, speed: BusSpeed) -> Result<()> {
        (**self).configure(speed)
    }

    fn try_receive(&mut self) -> Option<Result<RawFrame>> {
        (**self).try_receive()
    }
}
