//! Serial ports and the command/acknowledgment exchange run over them.

pub mod mockup;
pub mod serial;

use crossbeam::channel::Sender;

use telega_shared::stm::ConfirmationFrame;
use telega_shared::ByteStructLen;

use crate::command::{Behavior, Command};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::pipeline::PipelineCtx;

pub use mockup::{MockupHandle, MockupPort};
pub use serial::{PortInfo, SerialLink, available_ports};

/// Result of a single timeout-bounded read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Byte(u8),
    /// Nothing arrived before the read timeout
    Timeout,
    /// The port reported no data without timing out
    EndOfStream,
}

/// Byte-oriented serial port.
#[typetag::serde(tag = "type")]
pub trait Port: Send {
    /// Human-readable port name for messages
    fn name(&self) -> String;

    /// Check whether the port is already open
    fn is_open(&self) -> bool;

    /// Open the port using the op's baud rate and read timeout
    fn open(&mut self, ctx: &PipelineCtx) -> Result<()>;

    /// Release the port. Safe to call when already closed.
    fn close(&mut self);

    /// Discard bytes received but not yet read
    fn clear_input(&mut self) -> Result<()>;

    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read one byte, waiting at most the read timeout
    fn read_byte(&mut self) -> Result<ReadOutcome>;

    /// Fill `buf` one byte at a time until it is full or a read comes back empty.
    /// Returns the number of bytes read.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        for (i, slot) in buf.iter_mut().enumerate() {
            match self.read_byte()? {
                ReadOutcome::Byte(b) => *slot = b,
                ReadOutcome::Timeout | ReadOutcome::EndOfStream => return Ok(i),
            }
        }
        Ok(buf.len())
    }
}

/// A port plus the command/acknowledgment protocol of the inertial board.
pub struct DeviceLink {
    port: Box<dyn Port>,
    messages: Sender<Message>,
}

impl DeviceLink {
    pub fn new(port: Box<dyn Port>, messages: Sender<Message>) -> Self {
        Self { port, messages }
    }

    pub fn name(&self) -> String {
        self.port.name()
    }

    pub fn is_open(&self) -> bool {
        self.port.is_open()
    }

    pub fn open(&mut self, ctx: &PipelineCtx) -> Result<()> {
        self.port.open(ctx)
    }

    pub fn close(&mut self) {
        self.port.close();
    }

    pub fn read_byte(&mut self) -> Result<ReadOutcome> {
        self.port.read_byte()
    }

    /// Give the port back, closed.
    pub fn into_port(mut self) -> Box<dyn Port> {
        self.port.close();
        self.port
    }

    /// Send a command by name and wait for the board's confirmation.
    ///
    /// Returns what the reader should do next. On any error the caller must
    /// not act on the command.
    pub fn send(&mut self, name: &str) -> Result<Behavior> {
        let command: Command = name.parse()?;
        if !self.port.is_open() {
            return Err(Error::PortNotOpen(self.port.name()));
        }

        self.post(Message::info(format!(
            "Sending {command} to {}",
            self.port.name()
        )));

        // Stale bytes would be mistaken for the confirmation
        self.port.clear_input()?;
        self.port.write_all(&command.frame())?;

        let mut reply = [0_u8; ConfirmationFrame::BYTE_LEN];
        let n = self.port.read_into(&mut reply)?;
        if !ConfirmationFrame::is_ack(&reply[..n]) {
            return Err(Error::CommandNotAcknowledged {
                command: name.to_owned(),
                received: reply[..n].to_vec(),
            });
        }

        self.post(Message::info(format!("{command} confirmed")));
        Ok(command.behavior())
    }

    fn post(&self, message: Message) {
        // The collector may already be gone during shutdown
        let _ = self.messages.send(message);
    }
}
