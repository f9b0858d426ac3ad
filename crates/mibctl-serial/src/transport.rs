//! Line-level link abstraction
//!
//! The field service unit is reached over a serial port; a TCP socket is
//! supported as well for bridges and emulators.

use crate::error::{Result, SerialError};

/// Read and write whole lines
pub trait LineIo {
    /// Write `line` followed by `\n`
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Read one line, without its terminator
    fn read_line(&mut self) -> Result<String>;
}

impl<L: LineIo + ?Sized> LineIo for Box<L> {
    fn write_line(&mut self, line: &str) -> Result<()> {
        (**self).write_line(line)
    }

    fn read_line(&mut self) -> Result<String> {
        (**self).read_line()
    }
}

/// Read one line from a buffered reader, stripping `\r\n`
///
/// Bytes are collected in `pending`, which the caller keeps across calls. A
/// timeout part way through a line leaves the partial line there, and the
/// next call completes it instead of starting mid-reply.
fn read_trimmed<R: std::io::BufRead>(reader: &mut R, pending: &mut Vec<u8>) -> Result<String> {
    let n = reader.read_until(b'\n', pending)?;
    if n == 0 && pending.is_empty() {
        return Err(SerialError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "link closed",
        )));
    }

    let raw = std::mem::take(pending);
    let mut line = String::from_utf8(raw)
        .map_err(|e| SerialError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

pub mod serial {
    //! Serial port link

    use super::*;
    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::{BufReader, Write};
    use std::time::Duration;

    /// Default baud rate of the field service unit
    pub const DEFAULT_BAUD: u32 = 115200;

    /// Serial port link
    pub struct SerialLink {
        port: BufReader<Box<dyn SerialPort>>,
        pending: Vec<u8>,
    }

    impl SerialLink {
        /// Open a serial port, 8N1 without flow control
        pub fn open(device: &str, baud: Option<u32>) -> Result<Self> {
            let baud_rate = baud.unwrap_or(DEFAULT_BAUD);

            let port = serialport::new(device, baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_secs(5))
                .open()?;

            log::info!("Opened serial port {} at {} baud", device, baud_rate);

            Ok(Self {
                port: BufReader::new(port),
                pending: Vec::new(),
            })
        }

        /// Set the read timeout
        pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.port.get_mut().set_timeout(timeout)?;
            Ok(())
        }
    }

    impl LineIo for SerialLink {
        fn write_line(&mut self, line: &str) -> Result<()> {
            let port = self.port.get_mut();
            port.write_all(line.as_bytes())?;
            port.write_all(b"\n")?;
            port.flush()?;
            Ok(())
        }

        fn read_line(&mut self) -> Result<String> {
            read_trimmed(&mut self.port, &mut self.pending)
        }
    }
}

pub mod tcp {
    //! TCP socket link

    use super::*;
    use std::io::{BufReader, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    /// TCP socket link
    pub struct TcpLink {
        reader: BufReader<TcpStream>,
        writer: TcpStream,
        pending: Vec<u8>,
    }

    impl TcpLink {
        /// Connect to a line server at the specified host and port
        pub fn connect(host: &str, port: u16) -> Result<Self> {
            let addr = format!("{}:{}", host, port);
            log::info!("Connecting to {}", addr);

            let stream = TcpStream::connect(&addr)
                .map_err(|e| SerialError::ConnectionFailed(e.to_string()))?;

            stream.set_nodelay(true).map_err(|e| {
                SerialError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e))
            })?;
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .map_err(|e| {
                    SerialError::ConnectionFailed(format!("Failed to set read timeout: {}", e))
                })?;

            let writer = stream
                .try_clone()
                .map_err(|e| SerialError::ConnectionFailed(e.to_string()))?;

            log::info!("Connected to {}", addr);

            Ok(Self {
                reader: BufReader::new(stream),
                writer,
                pending: Vec::new(),
            })
        }
    }

    impl LineIo for TcpLink {
        fn write_line(&mut self, line: &str) -> Result<()> {
            self.writer.write_all(line.as_bytes())?;
            self.writer.write_all(b"\n")?;
            self.writer.flush()?;
            Ok(())
        }

        fn read_line(&mut self) -> Result<String> {
            read_trimmed(&mut self.reader, &mut self.pending)
        }
    }
}
