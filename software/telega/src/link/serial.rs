//! Hardware serial port via the `serialport` crate.

use std::io::{ErrorKind, Read, Write};

use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use tracing::info;

use super::{Port, ReadOutcome};
use crate::error::{Error, Result};
use crate::pipeline::PipelineCtx;

/// A serial device such as `/dev/ttyUSB0` or `COM3`, opened 8N1 with no flow control.
#[derive(Serialize, Deserialize, Default)]
pub struct SerialLink {
    pub path: String,

    #[serde(skip)]
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            port: None,
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        match self.port.as_mut() {
            Some(port) => Ok(port),
            None => Err(Error::PortNotOpen(self.path.clone())),
        }
    }
}

#[typetag::serde]
impl Port for SerialLink {
    fn name(&self) -> String {
        self.path.clone()
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self, ctx: &PipelineCtx) -> Result<()> {
        let baud_rate = ctx.baud_rate();
        let port = serialport::new(&self.path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(ctx.read_timeout)
            .open()
            .map_err(|e| Error::PortOpen {
                port: self.path.clone(),
                reason: e.to_string(),
            })?;

        info!("Opened serial port {} at {baud_rate} baud", self.path);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the handle releases the device
        if self.port.take().is_some() {
            info!("Closed serial port {}", self.path);
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<ReadOutcome> {
        let mut buf = [0_u8; 1];
        let result = self.port()?.read(&mut buf);
        match result {
            Ok(0) => Ok(ReadOutcome::EndOfStream),
            Ok(_) => Ok(ReadOutcome::Byte(buf[0])),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                Ok(ReadOutcome::Timeout)
            }
            Err(e) if matches!(e.kind(), ErrorKind::BrokenPipe | ErrorKind::NotConnected) => {
                Err(Error::Disconnected(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// An available serial port, as shown to the operator when picking a device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
    pub hardware_id: String,
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let (description, hardware_id) = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let description = usb
                    .product
                    .clone()
                    .or_else(|| usb.manufacturer.clone())
                    .unwrap_or_else(|| "USB serial device".to_owned());
                let mut hwid = format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid);
                if let Some(sn) = &usb.serial_number {
                    hwid.push_str(&format!(" SER={sn}"));
                }
                (description, hwid)
            }
            SerialPortType::PciPort => ("PCI serial port".to_owned(), "PCI".to_owned()),
            SerialPortType::BluetoothPort => {
                ("Bluetooth serial port".to_owned(), "BLUETOOTH".to_owned())
            }
            SerialPortType::Unknown => ("n/a".to_owned(), "n/a".to_owned()),
        };
        Self {
            name: info.port_name,
            description,
            hardware_id,
        }
    }
}

/// List serial ports present on this machine.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()?
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceKind;

    #[test]
    fn missing_device_fails_to_open() {
        let mut link = SerialLink::new("/dev/telega-does-not-exist");
        let err = link.open(&PipelineCtx::new(DeviceKind::Stm)).unwrap_err();
        assert!(matches!(err, Error::PortOpen { .. }));
        assert!(!link.is_open());
    }

    #[test]
    fn closed_link_refuses_io() {
        let mut link = SerialLink::new("/dev/ttyUSB0");
        assert!(matches!(link.read_byte(), Err(Error::PortNotOpen(_))));
        assert!(matches!(link.write_all(&[0x7E]), Err(Error::PortNotOpen(_))));
    }

    #[test]
    fn usb_port_info() {
        let info = serialport::SerialPortInfo {
            port_name: "/dev/ttyUSB0".into(),
            port_type: SerialPortType::UsbPort(serialport::UsbPortInfo {
                vid: 0x0483,
                pid: 0x5740,
                serial_number: Some("205E".into()),
                manufacturer: Some("STMicroelectronics".into()),
                product: None,
            }),
        };
        let info = PortInfo::from(info);
        assert_eq!(info.description, "STMicroelectronics");
        assert_eq!(info.hardware_id, "USB VID:PID=0483:5740 SER=205E");
    }

    #[test]
    fn serde_roundtrip() {
        let link: Box<dyn Port> = Box::new(SerialLink::new("COM3"));
        let json = serde_json::to_string(&link).unwrap();
        assert!(json.contains("\"type\":\"SerialLink\""));
        let back: Box<dyn Port> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name(), "COM3");
        assert!(!back.is_open());
    }
}
