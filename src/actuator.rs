//! Single-byte actuator link (motors and face display)
//!
//! The board understands one ASCII symbol per command. The link is optional:
//! the controller holds an `Option` and skips every send when it is absent.

use std::io::Write;
use std::time::Duration;

use crate::config::ActuatorConfig;
use crate::{Error, Result};

/// Substrings that identify a likely microcontroller in a port description
const BOARD_HINTS: &[&str] = &["arduino", "ch340", "usb serial"];

/// Write timeout for one command byte
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Commands in the board's alphabet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    /// Idle face
    FaceBlink,
    /// Busy face shown while the chat backend works
    FaceThink,
}

impl ActuatorCommand {
    /// Wire symbol for this command
    ///
    /// With `swap_turns`, left and right are exchanged for boards whose
    /// motors are wired the other way round.
    #[must_use]
    pub const fn symbol(self, swap_turns: bool) -> u8 {
        match self {
            Self::Forward => b'F',
            Self::Backward => b'B',
            Self::Left if swap_turns => b'R',
            Self::Left => b'L',
            Self::Right if swap_turns => b'L',
            Self::Right => b'R',
            Self::Stop => b'S',
            Self::FaceBlink => b'O',
            Self::FaceThink => b'T',
        }
    }

    /// Phrase spoken after a motion command is sent
    #[must_use]
    pub const fn confirmation(self) -> &'static str {
        match self {
            Self::Forward => "Moving forward.",
            Self::Backward => "Moving backward.",
            Self::Left => "Turning left.",
            Self::Right => "Turning right.",
            Self::Stop => "Stopping.",
            Self::FaceBlink | Self::FaceThink => "",
        }
    }
}

/// Keyword groups in priority order; the first group with a hit wins
const MOTION_KEYWORDS: &[(&[&str], ActuatorCommand)] = &[
    (&["forward", "ahead"], ActuatorCommand::Forward),
    (&["back", "reverse"], ActuatorCommand::Backward),
    (&["left"], ActuatorCommand::Left),
    (&["right"], ActuatorCommand::Right),
    (&["stop", "halt"], ActuatorCommand::Stop),
];

/// Map a transcript to a motion command by keyword containment
#[must_use]
pub fn parse_motion(transcript: &str) -> Option<ActuatorCommand> {
    let text = transcript.to_lowercase();
    MOTION_KEYWORDS
        .iter()
        .find(|(words, _)| words.iter().any(|w| text.contains(w)))
        .map(|(_, cmd)| *cmd)
}

/// Command sink for the robot body
pub trait Actuator {
    /// Send one command
    ///
    /// # Errors
    ///
    /// Returns [`Error::Peripheral`] if the write fails
    fn send(&mut self, command: ActuatorCommand) -> Result<()>;
}

/// Actuator reached over a serial port
pub struct SerialActuator {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    swap_turns: bool,
}

impl SerialActuator {
    /// Open the configured or auto-detected port and wait for the board reset
    ///
    /// # Errors
    ///
    /// Returns [`Error::Peripheral`] if no port is found or it cannot be opened
    pub fn connect(config: &ActuatorConfig) -> Result<Self> {
        let name = match &config.port {
            Some(port) => port.clone(),
            None => {
                let ports = serialport::available_ports()
                    .map_err(|e| Error::Peripheral(format!("could not list serial ports: {e}")))?;
                let described: Vec<(String, String)> = ports
                    .into_iter()
                    .map(|p| {
                        let description = describe_port(&p.port_type);
                        (p.port_name, description)
                    })
                    .collect();
                detect_port(&described)
                    .ok_or_else(|| Error::Peripheral("no board serial port found".to_string()))?
            }
        };

        let port = serialport::new(&name, config.baud)
            .timeout(WRITE_TIMEOUT)
            .open()
            .map_err(|e| Error::Peripheral(format!("failed to open {name}: {e}")))?;

        // Opening the port toggles DTR and resets most boards
        std::thread::sleep(config.reset_delay);
        tracing::info!(port = %name, baud = config.baud, "actuator connected");

        Ok(Self {
            port,
            name,
            swap_turns: config.swap_turns,
        })
    }
}

impl Actuator for SerialActuator {
    fn send(&mut self, command: ActuatorCommand) -> Result<()> {
        let symbol = command.symbol(self.swap_turns);
        self.port
            .write_all(&[symbol])
            .and_then(|()| self.port.flush())
            .map_err(|e| {
                Error::Peripheral(format!("write {:?} to {} failed: {e}", command, self.name))
            })?;
        tracing::debug!(?command, symbol = %char::from(symbol), "actuator command sent");
        Ok(())
    }
}

/// Human-readable description used for board detection
fn describe_port(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(info) => [
            info.manufacturer.as_deref(),
            info.product.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" "),
        _ => String::new(),
    }
}

/// Pick a port from `(name, description)` pairs
///
/// The first description containing a known board hint wins. With no hint
/// match, a lone port is used as-is.
#[must_use]
pub fn detect_port(ports: &[(String, String)]) -> Option<String> {
    let hinted = ports.iter().find(|(_, desc)| {
        let desc = desc.to_lowercase();
        BOARD_HINTS.iter().any(|hint| desc.contains(hint))
    });

    match (hinted, ports) {
        (Some((name, _)), _) => Some(name.clone()),
        (None, [(name, _)]) => Some(name.clone()),
        (None, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_keywords() {
        assert_eq!(parse_motion("go forward"), Some(ActuatorCommand::Forward));
        assert_eq!(parse_motion("full speed AHEAD"), Some(ActuatorCommand::Forward));
        assert_eq!(parse_motion("reverse please"), Some(ActuatorCommand::Backward));
        assert_eq!(parse_motion("turn left"), Some(ActuatorCommand::Left));
        assert_eq!(parse_motion("turn right"), Some(ActuatorCommand::Right));
        assert_eq!(parse_motion("please stop now"), Some(ActuatorCommand::Stop));
        assert_eq!(parse_motion("halt"), Some(ActuatorCommand::Stop));
        assert_eq!(parse_motion("what time is it"), None);
    }

    #[test]
    fn test_priority_order() {
        // forward beats stop, back beats left, left beats right
        assert_eq!(parse_motion("stop going forward"), Some(ActuatorCommand::Forward));
        assert_eq!(parse_motion("go back to the left"), Some(ActuatorCommand::Backward));
        assert_eq!(parse_motion("left or right"), Some(ActuatorCommand::Left));
    }

    #[test]
    fn test_symbols() {
        assert_eq!(ActuatorCommand::Forward.symbol(true), b'F');
        assert_eq!(ActuatorCommand::Backward.symbol(false), b'B');
        assert_eq!(ActuatorCommand::Stop.symbol(true), b'S');
        assert_eq!(ActuatorCommand::FaceBlink.symbol(true), b'O');
        assert_eq!(ActuatorCommand::FaceThink.symbol(true), b'T');
    }

    #[test]
    fn test_turn_swap() {
        assert_eq!(ActuatorCommand::Left.symbol(true), b'R');
        assert_eq!(ActuatorCommand::Right.symbol(true), b'L');
        assert_eq!(ActuatorCommand::Left.symbol(false), b'L');
        assert_eq!(ActuatorCommand::Right.symbol(false), b'R');
    }

    fn ports(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(n, d)| ((*n).to_string(), (*d).to_string()))
            .collect()
    }

    #[test]
    fn test_detect_hinted_port() {
        let found = detect_port(&ports(&[
            ("/dev/ttyS0", ""),
            ("/dev/ttyUSB0", "QinHeng Electronics CH340 serial converter"),
            ("/dev/ttyACM0", "Arduino (www.arduino.cc) Arduino Uno"),
        ]));
        assert_eq!(found.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_detect_single_port_fallback() {
        assert_eq!(
            detect_port(&ports(&[("/dev/ttyAMA0", "")])).as_deref(),
            Some("/dev/ttyAMA0")
        );
        assert_eq!(detect_port(&ports(&[("/dev/ttyS0", ""), ("/dev/ttyS1", "")])), None);
        assert_eq!(detect_port(&[]), None);
    }
}
