//! Nova Fitness SDS011 driver speaking the serial protocol in query mode.
//!
//! The driver works over any async byte stream. With the `serial` feature it
//! can open a real port through `tokio-serial`; without it the protocol code is
//! still available for other transports and for testing.

use crate::error::DeviceError;
use crate::sensor::{data::RawSample, traits::ParticulateDevice};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;
use tracing::{debug, trace};

/// Fixed line speed of the SDS011 UART.
pub const BAUD_RATE: u32 = 9600;

/// Upper bound on one command/reply exchange.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

const HEAD: u8 = 0xAA;
const TAIL: u8 = 0xAB;
const COMMAND_ID: u8 = 0xB4;
const REPLY_DATA: u8 = 0xC0;
const REPLY_COMMAND: u8 = 0xC5;

const CMD_REPORT_MODE: u8 = 0x02;
const CMD_QUERY: u8 = 0x04;
const CMD_SLEEP: u8 = 0x06;

/// Length of a host-to-sensor command frame.
pub const COMMAND_LEN: usize = 19;
/// Length of a sensor-to-host reply frame.
pub const REPLY_LEN: usize = 10;

// Replies to other commands (or active-mode reports) tolerated before giving up.
const MAX_SKIPPED_FRAMES: usize = 8;

/// Commands the collector needs from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Only report data when queried
    QueryMode,
    /// Request one measurement
    Query,
    /// Stop fan and laser
    Sleep,
    /// Resume fan and laser
    Work,
}

impl Command {
    fn data(self) -> [u8; 3] {
        match self {
            Command::QueryMode => [CMD_REPORT_MODE, 0x01, 0x01],
            Command::Query => [CMD_QUERY, 0x00, 0x00],
            Command::Sleep => [CMD_SLEEP, 0x01, 0x00],
            Command::Work => [CMD_SLEEP, 0x01, 0x01],
        }
    }

    /// Encode as a frame addressed to any device (id FFFF).
    pub fn encode(self) -> [u8; COMMAND_LEN] {
        let mut frame = [0u8; COMMAND_LEN];
        frame[0] = HEAD;
        frame[1] = COMMAND_ID;
        frame[2..5].copy_from_slice(&self.data());
        frame[15] = 0xFF;
        frame[16] = 0xFF;
        frame[17] = checksum(&frame[2..17]);
        frame[18] = TAIL;
        frame
    }

    fn answered_by(self, frame: &[u8; REPLY_LEN]) -> bool {
        match self {
            Command::Query => frame[1] == REPLY_DATA,
            _ => frame[1] == REPLY_COMMAND && frame[2] == self.data()[0],
        }
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn verify(frame: &[u8; REPLY_LEN]) -> Result<(), DeviceError> {
    if frame[9] != TAIL {
        return Err(DeviceError::malformed(format!(
            "expected frame tail {:#04x}, got {:#04x}",
            TAIL, frame[9]
        )));
    }
    let expected = checksum(&frame[2..8]);
    if frame[8] != expected {
        return Err(DeviceError::Checksum {
            expected,
            actual: frame[8],
        });
    }
    Ok(())
}

/// Decode the PM values of a data reply (tenths of µg/m³, little endian).
pub fn decode_measurement(frame: &[u8; REPLY_LEN]) -> RawSample {
    let pm25 = u16::from_le_bytes([frame[2], frame[3]]);
    let pm10 = u16::from_le_bytes([frame[4], frame[5]]);
    RawSample::new(f64::from(pm25) / 10.0, f64::from(pm10) / 10.0)
}

/// SDS011 sensor attached to an async byte stream.
pub struct Sds011<T> {
    port: T,
    read_timeout: Duration,
}

/// SDS011 on a native serial port.
#[cfg(feature = "serial")]
pub type SerialSds011 = Sds011<tokio_serial::SerialStream>;

impl<T> Sds011<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an already configured stream.
    pub fn new(port: T) -> Self {
        Self {
            port,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set the bound on a single command/reply exchange.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Switch the sensor from active reporting to query mode.
    pub async fn set_query_mode(&mut self) -> Result<(), DeviceError> {
        self.execute(Command::QueryMode).await.map(|_| ())
    }

    async fn execute(&mut self, command: Command) -> Result<[u8; REPLY_LEN], DeviceError> {
        let read_timeout = self.read_timeout;
        time::timeout(read_timeout, self.exchange(command))
            .await
            .map_err(|_| DeviceError::Timeout)?
    }

    async fn exchange(&mut self, command: Command) -> Result<[u8; REPLY_LEN], DeviceError> {
        trace!(?command, "sending command");
        self.port.write_all(&command.encode()).await?;
        self.port.flush().await?;
        self.read_reply(command).await
    }

    async fn read_reply(&mut self, command: Command) -> Result<[u8; REPLY_LEN], DeviceError> {
        for _ in 0..=MAX_SKIPPED_FRAMES {
            let frame = self.read_frame().await?;
            if command.answered_by(&frame) {
                verify(&frame)?;
                return Ok(frame);
            }
            debug!(?command, reply = frame[1], "Skipping unrelated reply frame");
        }

        Err(DeviceError::malformed(format!(
            "no reply to {:?} after {} frames",
            command,
            MAX_SKIPPED_FRAMES + 1
        )))
    }

    async fn read_frame(&mut self) -> Result<[u8; REPLY_LEN], DeviceError> {
        // Resynchronise on the header byte; the timeout bounds this loop.
        while self.port.read_u8().await? != HEAD {}

        let mut frame = [0u8; REPLY_LEN];
        frame[0] = HEAD;
        self.port.read_exact(&mut frame[1..]).await?;
        Ok(frame)
    }
}

#[cfg(feature = "serial")]
impl Sds011<tokio_serial::SerialStream> {
    /// Open the sensor on a serial device (9600 8N1) and enable query mode.
    pub async fn open(path: &str) -> Result<Self, DeviceError> {
        use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};

        let port = tokio_serial::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()
            .map_err(|e| DeviceError::open_error(format!("{}: {}", path, e)))?;

        let mut sensor = Self::new(port);
        sensor.set_query_mode().await?;
        tracing::info!(device = path, "SDS011 opened in query mode");
        Ok(sensor)
    }
}

impl<T> ParticulateDevice for Sds011<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn set_power_state(&mut self, active: bool) -> Result<(), DeviceError> {
        let command = if active { Command::Work } else { Command::Sleep };
        self.execute(command).await.map(|_| ())
    }

    async fn query(&mut self) -> Result<RawSample, DeviceError> {
        let frame = self.execute(Command::Query).await?;
        Ok(decode_measurement(&frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const QUERY: [u8; COMMAND_LEN] = [
        0xAA, 0xB4, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0xFF, 0xFF, 0x02, 0xAB,
    ];
    const SLEEP: [u8; COMMAND_LEN] = [
        0xAA, 0xB4, 0x06, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0xFF, 0xFF, 0x05, 0xAB,
    ];
    const WORK: [u8; COMMAND_LEN] = [
        0xAA, 0xB4, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0xFF, 0xFF, 0x06, 0xAB,
    ];
    const QUERY_MODE: [u8; COMMAND_LEN] = [
        0xAA, 0xB4, 0x02, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0xFF, 0xFF, 0x02, 0xAB,
    ];

    // PM2.5 = 123.6, PM10 = 261.8
    const DATA_REPLY: [u8; REPLY_LEN] = [0xAA, 0xC0, 0xD4, 0x04, 0x3A, 0x0A, 0xA1, 0x60, 0x1D, 0xAB];
    const SLEEP_REPLY: [u8; REPLY_LEN] = [0xAA, 0xC5, 0x06, 0x01, 0x00, 0x00, 0xA1, 0x60, 0x08, 0xAB];
    const WORK_REPLY: [u8; REPLY_LEN] = [0xAA, 0xC5, 0x06, 0x01, 0x01, 0x00, 0xA1, 0x60, 0x09, 0xAB];
    const QUERY_MODE_REPLY: [u8; REPLY_LEN] =
        [0xAA, 0xC5, 0x02, 0x01, 0x01, 0x00, 0xA1, 0x60, 0x05, 0xAB];

    #[test]
    fn test_command_encoding() {
        assert_eq!(Command::Query.encode(), QUERY);
        assert_eq!(Command::Sleep.encode(), SLEEP);
        assert_eq!(Command::Work.encode(), WORK);
        assert_eq!(Command::QueryMode.encode(), QUERY_MODE);
    }

    #[test]
    fn test_decode_measurement() {
        let sample = decode_measurement(&DATA_REPLY);
        assert_eq!(sample.pm25, Some(123.6));
        assert_eq!(sample.pm10, Some(261.8));
    }

    #[tokio::test]
    async fn test_query_reads_data_reply() {
        let port = Builder::new().write(&QUERY).read(&DATA_REPLY).build();
        let mut sensor = Sds011::new(port);

        let sample = sensor.query().await.unwrap();
        assert_eq!(sample, RawSample::new(123.6, 261.8));
    }

    #[tokio::test]
    async fn test_power_state_commands() {
        let port = Builder::new()
            .write(&WORK)
            .read(&WORK_REPLY)
            .write(&SLEEP)
            .read(&SLEEP_REPLY)
            .build();
        let mut sensor = Sds011::new(port);

        sensor.set_power_state(true).await.unwrap();
        sensor.set_power_state(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_set_query_mode() {
        let port = Builder::new().write(&QUERY_MODE).read(&QUERY_MODE_REPLY).build();
        let mut sensor = Sds011::new(port);
        sensor.set_query_mode().await.unwrap();
    }

    #[tokio::test]
    async fn test_resynchronises_on_header() {
        let port = Builder::new()
            .write(&QUERY)
            .read(&[0x00, 0x13, 0xAB])
            .read(&DATA_REPLY)
            .build();
        let mut sensor = Sds011::new(port);

        assert_eq!(sensor.query().await.unwrap().pm10, Some(261.8));
    }

    #[tokio::test]
    async fn test_skips_unrelated_reply() {
        let port = Builder::new()
            .write(&QUERY)
            .read(&SLEEP_REPLY)
            .read(&DATA_REPLY)
            .build();
        let mut sensor = Sds011::new(port);

        assert_eq!(sensor.query().await.unwrap().pm25, Some(123.6));
    }

    #[tokio::test]
    async fn test_checksum_mismatch() {
        let mut corrupted = DATA_REPLY;
        corrupted[8] = 0x00;
        let port = Builder::new().write(&QUERY).read(&corrupted).build();
        let mut sensor = Sds011::new(port);

        match sensor.query().await {
            Err(DeviceError::Checksum { expected, actual }) => {
                assert_eq!(expected, 0x1D);
                assert_eq!(actual, 0x00);
            }
            other => panic!("expected checksum error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_tail() {
        let mut corrupted = DATA_REPLY;
        corrupted[9] = 0x00;
        let port = Builder::new().write(&QUERY).read(&corrupted).build();
        let mut sensor = Sds011::new(port);

        assert!(matches!(
            sensor.query().await,
            Err(DeviceError::MalformedFrame(_))
        ));
    }
}
