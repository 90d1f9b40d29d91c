//! Tick signal from the microcontroller on a GPIO input.

use std::time::Duration;

use lockstep_traits::{BoxError, Edge, TickSource};
use rppal::gpio::{Event, Gpio, InputPin, Trigger};

use crate::error::{HwError, Result};

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

pub struct TickPin {
    pin: InputPin,
}

impl TickPin {
    /// `bcm`: BCM pin number; both edges are reported.
    pub fn new(bcm: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut pin = gpio.get(bcm).map_err(gpio_err)?.into_input_pulldown();
        pin.set_interrupt(Trigger::Both, None).map_err(gpio_err)?;
        Ok(Self { pin })
    }
}

impl TickSource for TickPin {
    fn wait_edge(&mut self, timeout: Duration) -> std::result::Result<Option<Edge>, BoxError> {
        match self.pin.poll_interrupt(true, Some(timeout)) {
            Ok(Some(Event {
                trigger: Trigger::RisingEdge,
                ..
            })) => Ok(Some(Edge::Rising)),
            Ok(Some(Event {
                trigger: Trigger::FallingEdge,
                ..
            })) => Ok(Some(Edge::Falling)),
            // Disabled/Both never appear in a delivered event
            Ok(Some(_) | None) => Ok(None),
            Err(e) => Err(Box::new(gpio_err(e))),
        }
    }
}
