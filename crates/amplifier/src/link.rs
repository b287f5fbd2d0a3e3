//! AmplifierLink - one TCP session with the amplifier
//!
//! The protocol is strictly request/response: every command is written in
//! full, then its single acknowledgment byte is read before anything else is
//! sent.

use std::io;
use std::time::{Duration, Instant};

use contracts::AmplifierConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, instrument, warn};

use crate::codec::{
    self, millis_since_epoch, Response, SyncPacket, TriggerPacket, CMD_ATTENTION, CMD_BEGIN,
    CMD_DISCONNECT, CMD_END, LITTLE_ENDIAN_DECLARATION, PROTOCOL_VERSION,
};
use crate::error::{describe_byte, AmplifierError, ProtocolError};

/// Tunables of a link, taken from [`AmplifierConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Upper bound on sync rounds
    pub sync_max_rounds: u32,
    /// A sync round faster than this ends the synchronization
    pub sync_threshold: Duration,
    /// Duration sent with every trigger (milliseconds)
    pub trigger_duration_ms: i32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self::from(&AmplifierConfig::default())
    }
}

impl From<&AmplifierConfig> for LinkSettings {
    fn from(config: &AmplifierConfig) -> Self {
        Self {
            sync_max_rounds: config.sync_max_rounds.max(1),
            sync_threshold: config.sync_threshold(),
            trigger_duration_ms: config.trigger_duration_ms,
        }
    }
}

/// Outcome of [`AmplifierLink::synch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Round-trip of the final sync round
    pub diff: Duration,
    /// Rounds performed
    pub rounds: u32,
}

impl SyncReport {
    /// Final round-trip in whole milliseconds
    pub fn diff_ms(&self) -> u64 {
        self.diff.as_millis() as u64
    }
}

/// Connected amplifier session
pub struct AmplifierLink {
    stream: TcpStream,
    address: String,
    settings: LinkSettings,
    sync_epoch: Instant,
    /// Set after `'X'` has been written
    closed: bool,
    /// Set once any operation failed; the session is unusable afterwards
    terminated: bool,
}

impl AmplifierLink {
    /// Connect and complete the handshake
    ///
    /// # Errors
    /// - [`AmplifierError::Connection`] when the TCP session cannot be established
    /// - [`AmplifierError::Protocol`] when the handshake is not acknowledged
    #[instrument(name = "amplifier_connect", skip(config), fields(address = %config.address()))]
    pub async fn connect(config: &AmplifierConfig) -> Result<Self, AmplifierError> {
        let address = config.address();
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|source| AmplifierError::Connection {
                address: address.clone(),
                source,
            })?;
        // Triggers are latency sensitive
        stream.set_nodelay(true)?;

        let mut link = Self {
            stream,
            address,
            settings: LinkSettings::from(config),
            sync_epoch: Instant::now(),
            closed: false,
            terminated: false,
        };

        let result = link.handshake().await;
        link.guard(result)?;

        info!(address = %link.address, "Amplifier handshake complete");
        Ok(link)
    }

    /// Amplifier address this link is connected to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current zero-reference for outgoing timestamps
    pub fn sync_epoch(&self) -> Instant {
        self.sync_epoch
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Whether the link can still carry commands
    pub fn is_open(&self) -> bool {
        !self.closed && !self.terminated
    }

    /// Align the sync epoch with the amplifier clock
    ///
    /// Sends the attention command, then sync packets until one round trip is
    /// faster than the threshold or the round limit is hit. Each round moves
    /// the epoch to the instant its packet was sent.
    #[instrument(name = "amplifier_synch", skip(self), fields(address = %self.address))]
    pub async fn synch(&mut self) -> Result<SyncReport, AmplifierError> {
        self.ensure_open()?;
        let result = self.synch_rounds().await;
        let report = self.guard(result)?;

        info!(
            diff_ms = report.diff_ms(),
            rounds = report.rounds,
            "Amplifier clock synchronized"
        );
        observability::record_sync(report.diff.as_secs_f64() * 1000.0, report.rounds);
        Ok(report)
    }

    /// Send a trigger with the configured duration
    ///
    /// Returns the amplifier-relative timestamp that was sent.
    pub async fn trigger(&mut self, code: i32, timestamp: Instant) -> Result<i32, AmplifierError> {
        self.trigger_with_duration(code, timestamp, self.settings.trigger_duration_ms)
            .await
    }

    /// Send a trigger identified by a four-character tag
    pub async fn trigger_tag(
        &mut self,
        tag: &[u8; 4],
        timestamp: Instant,
    ) -> Result<i32, AmplifierError> {
        self.trigger(codec::tag_code(tag), timestamp).await
    }

    /// Send a trigger with an explicit duration
    #[instrument(name = "amplifier_trigger", skip(self, timestamp), fields(address = %self.address))]
    pub async fn trigger_with_duration(
        &mut self,
        code: i32,
        timestamp: Instant,
        duration_ms: i32,
    ) -> Result<i32, AmplifierError> {
        self.ensure_open()?;
        let timestamp_ms = millis_since_epoch(self.sync_epoch, timestamp);
        let packet = TriggerPacket::new(code, timestamp_ms, duration_ms);

        let result = self.send_trigger(&packet).await;
        self.guard(result)?;

        debug!(code, ts_ms = timestamp_ms, "Sent amplifier trigger");
        Ok(timestamp_ms)
    }

    #[instrument(name = "amplifier_begin_recording", skip(self))]
    pub async fn send_begin_recording(&mut self) -> Result<(), AmplifierError> {
        self.simple_command(CMD_BEGIN, "begin recording").await
    }

    #[instrument(name = "amplifier_end_recording", skip(self))]
    pub async fn send_end_recording(&mut self) -> Result<(), AmplifierError> {
        self.simple_command(CMD_END, "end recording").await
    }

    /// Send the disconnect command; no acknowledgment is awaited
    ///
    /// Calling this more than once is a no-op.
    #[instrument(name = "amplifier_close", skip(self), fields(address = %self.address))]
    pub async fn close(&mut self) -> Result<(), AmplifierError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.write_all(&[CMD_DISCONNECT]).await?;
        self.stream.flush().await?;
        let _ = self.stream.shutdown().await;
        info!("Amplifier link closed");
        Ok(())
    }
}

impl AmplifierLink {
    async fn handshake(&mut self) -> Result<(), AmplifierError> {
        self.send_command(LITTLE_ENDIAN_DECLARATION).await?;
        self.expect(Response::QuerySuccess, "endianness declaration")
            .await?;

        let version = self.stream.read_u8().await?;
        if version != PROTOCOL_VERSION {
            warn!(
                version = %describe_byte(version),
                expected = PROTOCOL_VERSION,
                "Unexpected amplifier protocol version"
            );
        }

        self.send_command(&[CMD_BEGIN]).await?;
        self.expect(Response::Success, "begin").await?;
        self.drain_extra()?;
        Ok(())
    }

    async fn synch_rounds(&mut self) -> Result<SyncReport, AmplifierError> {
        self.send_command(&[CMD_ATTENTION]).await?;
        self.expect(Response::Success, "attention").await?;

        let packet = SyncPacket::new(0).to_bytes();
        let mut rounds = 0;
        loop {
            rounds += 1;
            self.sync_epoch = Instant::now();
            self.send_command(&packet).await?;
            self.expect_tolerant(Response::Success, "sync").await?;
            let diff = self.sync_epoch.elapsed();

            if diff < self.settings.sync_threshold || rounds >= self.settings.sync_max_rounds {
                return Ok(SyncReport { diff, rounds });
            }
        }
    }

    async fn send_trigger(&mut self, packet: &TriggerPacket) -> Result<(), AmplifierError> {
        self.send_command(&packet.to_bytes()).await?;
        self.expect_tolerant(Response::Success, "trigger").await
    }

    async fn simple_command(
        &mut self,
        command: u8,
        name: &'static str,
    ) -> Result<(), AmplifierError> {
        self.ensure_open()?;
        let result = self.command_with_ack(command, name).await;
        self.guard(result)
    }

    async fn command_with_ack(
        &mut self,
        command: u8,
        name: &'static str,
    ) -> Result<(), AmplifierError> {
        self.send_command(&[command]).await?;
        self.expect(Response::Success, name).await
    }

    /// Write one complete command, discarding anything the peer sent unasked
    async fn send_command(&mut self, bytes: &[u8]) -> Result<(), AmplifierError> {
        self.drain_extra()?;
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one acknowledgment; anything but `expected` is an error
    async fn expect(
        &mut self,
        expected: Response,
        command: &'static str,
    ) -> Result<(), AmplifierError> {
        let actual = self.stream.read_u8().await?;
        check_response(actual, expected, command)?;
        Ok(())
    }

    /// Read one acknowledgment; a mismatch is logged, only `'F'` is an error
    async fn expect_tolerant(
        &mut self,
        expected: Response,
        command: &'static str,
    ) -> Result<(), AmplifierError> {
        let actual = self.stream.read_u8().await?;
        match check_response(actual, expected, command) {
            Err(ProtocolError::UnexpectedResponse { .. }) => {
                warn!(
                    command,
                    expected = %describe_byte(expected.as_byte()),
                    actual = %describe_byte(actual),
                    "Amplifier response mismatch"
                );
                observability::record_response_mismatch(command);
                Ok(())
            }
            other => other.map_err(AmplifierError::from),
        }
    }

    /// Consume bytes that are already buffered on the socket
    fn drain_extra(&mut self) -> Result<(), AmplifierError> {
        let mut extra = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match self.stream.try_read(&mut buf) {
                // EOF surfaces on the next blocking read
                Ok(0) => break,
                Ok(n) => extra.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        if !extra.is_empty() {
            info!(count = extra.len(), bytes = ?extra, "Got extra bytes from amplifier");
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), AmplifierError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(AmplifierError::Closed)
        }
    }

    /// Terminate the session on any error
    fn guard<T>(&mut self, result: Result<T, AmplifierError>) -> Result<T, AmplifierError> {
        if let Err(ref e) = result {
            error!(address = %self.address, error = %e, "Amplifier link terminated");
            self.terminated = true;
        }
        result
    }
}

impl Drop for AmplifierLink {
    fn drop(&mut self) {
        if !self.closed {
            // Best effort, the socket may already be gone
            let _ = self.stream.try_write(&[CMD_DISCONNECT]);
        }
    }
}

fn check_response(
    actual: u8,
    expected: Response,
    command: &'static str,
) -> Result<(), ProtocolError> {
    match Response::from_byte(actual) {
        response if response == expected => Ok(()),
        Response::Failure => Err(ProtocolError::AmplifierFailure { command }),
        _ => Err(ProtocolError::UnexpectedResponse {
            command,
            expected: expected.as_byte(),
            actual,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAmplifier, MockAmplifierConfig};

    async fn connected(mock: &MockAmplifier) -> AmplifierLink {
        AmplifierLink::connect(&mock.amplifier_config())
            .await
            .unwrap()
    }

    #[test]
    fn test_check_response() {
        assert!(check_response(b'Z', Response::Success, "t").is_ok());
        assert!(check_response(b'I', Response::QuerySuccess, "t").is_ok());
        assert!(matches!(
            check_response(b'F', Response::Success, "t"),
            Err(ProtocolError::AmplifierFailure { .. })
        ));
        assert!(matches!(
            check_response(b'I', Response::Success, "t"),
            Err(ProtocolError::UnexpectedResponse {
                expected: b'Z',
                actual: b'I',
                ..
            })
        ));
        assert!(matches!(
            check_response(b'?', Response::Success, "t"),
            Err(ProtocolError::UnexpectedResponse { actual: b'?', .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_handshake() {
        let mock = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();
        let link = connected(&mock).await;
        assert!(link.is_open());

        drop(link);
        mock.wait_for_disconnect().await;
        assert_eq!(mock.commands()[..2], [b'Q', b'B']);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = AmplifierConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        };
        let result = AmplifierLink::connect(&config).await;
        assert!(matches!(result, Err(AmplifierError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_handshake_failure_is_protocol_error() {
        let mock = MockAmplifier::start(MockAmplifierConfig {
            handshake_response: b'F',
            ..Default::default()
        })
        .await
        .unwrap();

        let result = AmplifierLink::connect(&mock.amplifier_config()).await;
        assert!(matches!(
            result,
            Err(AmplifierError::Protocol(ProtocolError::AmplifierFailure { .. }))
        ));
    }

    #[tokio::test]
    async fn test_handshake_unknown_response() {
        let mock = MockAmplifier::start(MockAmplifierConfig {
            handshake_response: b'?',
            ..Default::default()
        })
        .await
        .unwrap();

        let result = AmplifierLink::connect(&mock.amplifier_config()).await;
        assert!(matches!(
            result,
            Err(AmplifierError::Protocol(ProtocolError::UnexpectedResponse {
                actual: b'?',
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_extra_bytes_are_drained() {
        let mock = MockAmplifier::start(MockAmplifierConfig {
            extra_bytes: vec![1, 2, 3],
            ..Default::default()
        })
        .await
        .unwrap();
        let mut link = connected(&mock).await;

        // The unsolicited bytes must not be mistaken for acknowledgments
        link.send_begin_recording().await.unwrap();
        link.trigger(4, Instant::now()).await.unwrap();
        assert_eq!(mock.triggers().len(), 1);
    }

    #[tokio::test]
    async fn test_synch_converges_against_responsive_peer() {
        let mock = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();
        let mut link = connected(&mock).await;

        let before = Instant::now();
        let report = link.synch().await.unwrap();

        assert!(report.rounds < 100, "rounds = {}", report.rounds);
        assert!(report.diff < Duration::from_millis(2));
        assert!(link.sync_epoch() >= before);
        assert_eq!(mock.sync_rounds(), report.rounds as usize);
    }

    #[tokio::test]
    async fn test_synch_gives_up_after_round_limit() {
        let mock = MockAmplifier::start(MockAmplifierConfig {
            sync_delay: Duration::from_millis(5),
            ..Default::default()
        })
        .await
        .unwrap();
        let mut link = connected(&mock).await;

        let report = link.synch().await.unwrap();

        assert_eq!(report.rounds, 100);
        assert!(report.diff >= Duration::from_millis(2));
        assert_eq!(mock.sync_rounds(), 100);
    }

    #[tokio::test]
    async fn test_trigger_timestamp_is_relative_to_epoch() {
        let mock = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();
        let mut link = connected(&mock).await;
        link.synch().await.unwrap();

        let epoch = link.sync_epoch();
        let sent = link
            .trigger(42, epoch + Duration::from_millis(250))
            .await
            .unwrap();
        link.trigger_with_duration(7, epoch, 30).await.unwrap();

        assert_eq!(sent, 250);
        let triggers = mock.triggers();
        assert_eq!(triggers[0], TriggerPacket::new(42, 250, 100));
        assert_eq!(triggers[1], TriggerPacket::new(7, 0, 30));
    }

    #[tokio::test]
    async fn test_trigger_tag() {
        let mock = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();
        let mut link = connected(&mock).await;

        link.trigger_tag(b"STIM", Instant::now()).await.unwrap();
        assert_eq!(mock.triggers()[0].code, codec::tag_code(b"STIM"));
    }

    #[tokio::test]
    async fn test_trigger_response_mismatch_is_tolerated() {
        let mock = MockAmplifier::start(MockAmplifierConfig {
            trigger_response: b'I',
            ..Default::default()
        })
        .await
        .unwrap();
        let mut link = connected(&mock).await;

        link.trigger(1, Instant::now()).await.unwrap();
        link.trigger(2, Instant::now()).await.unwrap();
        assert!(link.is_open());
        assert_eq!(mock.triggers().len(), 2);
    }

    #[tokio::test]
    async fn test_trigger_failure_terminates_link() {
        let mock = MockAmplifier::start(MockAmplifierConfig {
            trigger_response: b'F',
            ..Default::default()
        })
        .await
        .unwrap();
        let mut link = connected(&mock).await;

        let result = link.trigger(1, Instant::now()).await;
        assert!(matches!(
            result,
            Err(AmplifierError::Protocol(ProtocolError::AmplifierFailure { .. }))
        ));
        assert!(!link.is_open());
        assert!(matches!(
            link.trigger(2, Instant::now()).await,
            Err(AmplifierError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_recording_commands() {
        let mock = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();
        let mut link = connected(&mock).await;

        link.send_begin_recording().await.unwrap();
        link.send_end_recording().await.unwrap();
        link.close().await.unwrap();
        mock.wait_for_disconnect().await;

        assert_eq!(mock.commands(), vec![b'Q', b'B', b'B', b'E', b'X']);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mock = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();
        let mut link = connected(&mock).await;

        link.close().await.unwrap();
        link.close().await.unwrap();
        assert!(!link.is_open());
        drop(link);

        mock.wait_for_disconnect().await;
        let disconnects = mock.commands().iter().filter(|c| **c == b'X').count();
        assert_eq!(disconnects, 1);
    }

    #[tokio::test]
    async fn test_drop_sends_disconnect() {
        let mock = MockAmplifier::start(MockAmplifierConfig::default())
            .await
            .unwrap();
        let link = connected(&mock).await;
        drop(link);

        mock.wait_for_disconnect().await;
        assert_eq!(mock.commands().last(), Some(&b'X'));
    }
}
