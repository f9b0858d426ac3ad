//! mibctl-serial - line link to the MIB field service unit
//!
//! The host never talks to the bus directly. It sends ASCII command lines to
//! a field service unit, which either runs them itself (`alarm status`) or
//! forwards a tunnelled RPC frame (`binrpc <HEX>`) onto the bus and prints
//! the reply. See [`protocol`] for the line format.
//!
//! # Supported Links
//!
//! - Serial port: `dev=/dev/ttyUSB0`, `dev=/dev/ttyUSB0:115200`, `dev=COM1`
//! - TCP socket: `ip=host:port`
//!
//! # Example
//!
//! ```no_run
//! use mibctl_core::MibController;
//!
//! let stream = mibctl_serial::open("dev=/dev/ttyUSB0")?;
//! let mut controller = MibController::new(stream);
//! for module in controller.enumerate_modules()? {
//!     println!("{:>3}: {}", module.address, module.trimmed_name());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod protocol;
pub mod stream;
pub mod transport;

pub use error::{Result, SerialError};
pub use stream::CmdStream;
pub use transport::serial::SerialLink;
pub use transport::tcp::TcpLink;
pub use transport::LineIo;

/// Connection options for the field service unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialConnection {
    /// Serial port connection
    Serial {
        /// Device path (e.g., "/dev/ttyUSB0" or "COM1")
        device: String,
        /// Baud rate (None for the unit's default)
        baud: Option<u32>,
    },
    /// TCP socket connection
    Tcp {
        /// Hostname or IP address
        host: String,
        /// Port number
        port: u16,
    },
}

impl SerialConnection {
    /// Parse a connection string
    ///
    /// Formats:
    /// - `dev=/dev/ttyUSB0` - Serial with default baud
    /// - `dev=/dev/ttyUSB0:115200` - Serial with specified baud
    /// - `ip=host:port` - TCP connection
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(dev) = s.strip_prefix("dev=") {
            if dev.is_empty() {
                return Err(SerialError::InvalidConnection(
                    "Missing device in dev= parameter".into(),
                ));
            }
            match dev.rsplit_once(':') {
                Some((device, baud_str)) => {
                    let baud = baud_str.parse().map_err(|_| {
                        SerialError::InvalidConnection(format!("Invalid baud rate: {}", baud_str))
                    })?;
                    Ok(SerialConnection::Serial {
                        device: device.to_string(),
                        baud: Some(baud),
                    })
                }
                None => Ok(SerialConnection::Serial {
                    device: dev.to_string(),
                    baud: None,
                }),
            }
        } else if let Some(ip) = s.strip_prefix("ip=") {
            let (host, port_str) = ip.rsplit_once(':').ok_or_else(|| {
                SerialError::InvalidConnection("Missing port in ip= parameter".into())
            })?;
            let port = port_str.parse().map_err(|_| {
                SerialError::InvalidConnection(format!("Invalid port: {}", port_str))
            })?;
            Ok(SerialConnection::Tcp {
                host: host.to_string(),
                port,
            })
        } else {
            Err(SerialError::InvalidConnection(format!(
                "{}. Use dev=... or ip=...",
                s
            )))
        }
    }
}

/// Open a connection and return a type-erased command stream
pub fn open(options: &str) -> Result<CmdStream<Box<dyn LineIo>>> {
    let link: Box<dyn LineIo> = match SerialConnection::parse(options)? {
        SerialConnection::Serial { device, baud } => Box::new(SerialLink::open(&device, baud)?),
        SerialConnection::Tcp { host, port } => Box::new(TcpLink::connect(&host, port)?),
    };
    Ok(CmdStream::new(link))
}

/// Open a command stream over a serial port
pub fn open_serial(device: &str, baud: Option<u32>) -> Result<CmdStream<SerialLink>> {
    Ok(CmdStream::new(SerialLink::open(device, baud)?))
}

/// Open a command stream over TCP
pub fn open_tcp(host: &str, port: u16) -> Result<CmdStream<TcpLink>> {
    Ok(CmdStream::new(TcpLink::connect(host, port)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serial() {
        assert_eq!(
            SerialConnection::parse("dev=/dev/ttyUSB0").unwrap(),
            SerialConnection::Serial {
                device: "/dev/ttyUSB0".into(),
                baud: None
            }
        );
        assert_eq!(
            SerialConnection::parse("dev=COM3:57600").unwrap(),
            SerialConnection::Serial {
                device: "COM3".into(),
                baud: Some(57600)
            }
        );
    }

    #[test]
    fn test_parse_tcp() {
        assert_eq!(
            SerialConnection::parse("ip=localhost:4444").unwrap(),
            SerialConnection::Tcp {
                host: "localhost".into(),
                port: 4444
            }
        );
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["", "dev=", "dev=/dev/ttyS0:fast", "ip=host", "ip=host:99999", "usb"] {
            assert!(
                matches!(
                    SerialConnection::parse(bad),
                    Err(SerialError::InvalidConnection(_))
                ),
                "{bad}"
            );
        }
    }
}
