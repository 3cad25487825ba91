//! Operator commands for the inertial board.
//!
//! Commands travel over the control channel by their symbolic name so that
//! names with no wire encoding still reach the reader, which parks the port
//! rather than guessing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use telega_shared::stm::{CommandCode, CommandFrame};

use crate::error::Error;

/// Text of the command message emitted when the board reports
/// that its initial setting has finished.
pub const STOP_INITIAL_SETTING: &str = "stop_InitialSetting";

/// What the reader does after a command is confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Behavior {
    /// Keep reading bytes from the device
    Stream,
    /// Close the port and stop reading
    Park,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    StartMeasuring,
    StartInitialSetting,
    StopMeasuring,
    Restart,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::StartMeasuring,
        Command::StartInitialSetting,
        Command::StopMeasuring,
        Command::Restart,
    ];

    /// Symbolic name as used by the operator surface
    pub fn name(self) -> &'static str {
        match self {
            Command::StartMeasuring => "start_Measuring",
            Command::StartInitialSetting => "start_InitialSetting",
            Command::StopMeasuring => "stop_Measuring",
            Command::Restart => "restart",
        }
    }

    pub fn code(self) -> CommandCode {
        match self {
            Command::StartMeasuring => CommandCode::StartMeasuring,
            Command::StartInitialSetting => CommandCode::StartInitialSetting,
            Command::StopMeasuring => CommandCode::StopMeasuring,
            Command::Restart => CommandCode::Restart,
        }
    }

    /// The 6-byte wire frame
    pub fn frame(self) -> [u8; 6] {
        CommandFrame::new(self.code()).to_bytes()
    }

    /// Reader behavior once the board has confirmed this command.
    pub fn behavior(self) -> Behavior {
        match self {
            Command::StartMeasuring | Command::StartInitialSetting => Behavior::Stream,
            Command::StopMeasuring | Command::Restart => Behavior::Park,
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| Error::UnrecognizedCommand(s.to_owned()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for c in Command::ALL {
            assert_eq!(c.name().parse::<Command>().unwrap(), c);
            assert_eq!(c.to_string(), c.name());
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        match "stop_CollectingData".parse::<Command>() {
            Err(Error::UnrecognizedCommand(name)) => assert_eq!(name, "stop_CollectingData"),
            other => panic!("expected UnrecognizedCommand, got {other:?}"),
        }
    }

    #[test]
    fn frames_carry_checksum_of_first_five_bytes() {
        for c in Command::ALL {
            let frame = c.frame();
            let sum = frame[..5].iter().map(|b| *b as u32).sum::<u32>();
            assert_eq!(frame[5] as u32, sum % 256, "bad checksum for {c}");
            assert_eq!(&frame[..3], &[0x7E, 0xE7, 0xFF]);
        }
        assert_eq!(Command::StartMeasuring.frame(), [0x7E, 0xE7, 0xFF, 0xBC, 0xCB, 0xEB]);
    }

    #[test]
    fn start_commands_stream_and_others_park() {
        assert_eq!(Command::StartMeasuring.behavior(), Behavior::Stream);
        assert_eq!(Command::StartInitialSetting.behavior(), Behavior::Stream);
        assert_eq!(Command::StopMeasuring.behavior(), Behavior::Park);
        assert_eq!(Command::Restart.behavior(), Behavior::Park);
    }
}
