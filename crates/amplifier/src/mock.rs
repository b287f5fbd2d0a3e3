//! Mock amplifier peer
//!
//! A TCP server speaking the amplifier side of the protocol, for tests
//! without hardware. Sessions are served one after another; every command
//! byte and every decoded trigger is recorded.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::AmplifierConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::codec::{
    TriggerPacket, CMD_ATTENTION, CMD_BEGIN, CMD_DISCONNECT, CMD_END, CMD_SYNC, CMD_TRIGGER,
    PROTOCOL_VERSION, RESPONSE_FAILURE, RESPONSE_QUERY_SUCCESS, RESPONSE_SUCCESS,
    TRIGGER_PACKET_LEN,
};

/// Mock amplifier behavior (can inject failure scenarios)
#[derive(Debug, Clone)]
pub struct MockAmplifierConfig {
    /// Answer to the endianness declaration
    pub handshake_response: u8,
    /// Answer to every trigger packet
    pub trigger_response: u8,
    /// Delay before acknowledging each sync packet
    pub sync_delay: Duration,
    /// Unsolicited bytes sent right after the handshake's begin acknowledgment
    pub extra_bytes: Vec<u8>,
}

impl Default for MockAmplifierConfig {
    fn default() -> Self {
        Self {
            handshake_response: RESPONSE_QUERY_SUCCESS,
            trigger_response: RESPONSE_SUCCESS,
            sync_delay: Duration::ZERO,
            extra_bytes: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    commands: Vec<u8>,
    triggers: Vec<TriggerPacket>,
    sync_rounds: usize,
}

/// Mock amplifier server
pub struct MockAmplifier {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    /// Number of finished sessions
    sessions_ended: Arc<watch::Sender<usize>>,
    task: JoinHandle<()>,
}

impl MockAmplifier {
    /// Bind on an ephemeral localhost port and start serving
    pub async fn start(config: MockAmplifierConfig) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(MockState::default()));
        let (sessions_ended, _) = watch::channel(0usize);
        let sessions_ended = Arc::new(sessions_ended);

        let task = tokio::spawn(serve(
            listener,
            config,
            Arc::clone(&state),
            Arc::clone(&sessions_ended),
        ));

        Ok(Self {
            addr,
            state,
            sessions_ended,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Amplifier configuration pointing at this mock
    pub fn amplifier_config(&self) -> AmplifierConfig {
        AmplifierConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            ..Default::default()
        }
    }

    /// Every command byte received, in order
    pub fn commands(&self) -> Vec<u8> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Every decoded trigger packet, in order
    pub fn triggers(&self) -> Vec<TriggerPacket> {
        self.state.lock().unwrap().triggers.clone()
    }

    /// Number of sync packets acknowledged
    pub fn sync_rounds(&self) -> usize {
        self.state.lock().unwrap().sync_rounds
    }

    /// Wait (up to five seconds) until the first session has ended
    pub async fn wait_for_disconnect(&self) {
        self.wait_for_sessions(1).await;
    }

    /// Wait (up to five seconds) until `count` sessions have ended
    pub async fn wait_for_sessions(&self, count: usize) {
        let mut rx = self.sessions_ended.subscribe();
        let _ = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|ended| *ended >= count),
        )
        .await;
    }
}

impl Drop for MockAmplifier {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    listener: TcpListener,
    config: MockAmplifierConfig,
    state: Arc<Mutex<MockState>>,
    sessions_ended: Arc<watch::Sender<usize>>,
) {
    while let Ok((stream, peer)) = listener.accept().await {
        debug!(%peer, "mock amplifier accepted connection");
        if let Err(e) = serve_session(stream, &config, &state).await {
            debug!(error = %e, "mock amplifier session failed");
        }
        sessions_ended.send_modify(|ended| *ended += 1);
    }
}

async fn serve_session(
    mut stream: TcpStream,
    config: &MockAmplifierConfig,
    state: &Mutex<MockState>,
) -> io::Result<()> {
    let mut begun = false;
    loop {
        let command = match stream.read_u8().await {
            Ok(command) => command,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        state.lock().unwrap().commands.push(command);

        match command {
            b'Q' => {
                let mut rest = [0u8; 4];
                stream.read_exact(&mut rest).await?;
                stream
                    .write_all(&[config.handshake_response, PROTOCOL_VERSION])
                    .await?;
            }
            CMD_BEGIN => {
                let mut reply = vec![RESPONSE_SUCCESS];
                if !begun {
                    reply.extend_from_slice(&config.extra_bytes);
                    begun = true;
                }
                stream.write_all(&reply).await?;
            }
            CMD_END | CMD_ATTENTION => stream.write_all(&[RESPONSE_SUCCESS]).await?,
            CMD_SYNC => {
                let mut timestamp = [0u8; 4];
                stream.read_exact(&mut timestamp).await?;
                state.lock().unwrap().sync_rounds += 1;
                if !config.sync_delay.is_zero() {
                    tokio::time::sleep(config.sync_delay).await;
                }
                stream.write_all(&[RESPONSE_SUCCESS]).await?;
            }
            CMD_TRIGGER => {
                let mut packet = [0u8; TRIGGER_PACKET_LEN];
                packet[0] = command;
                stream.read_exact(&mut packet[1..]).await?;
                let decoded = TriggerPacket::decode(&packet)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                state.lock().unwrap().triggers.push(decoded);
                stream.write_all(&[config.trigger_response]).await?;
            }
            CMD_DISCONNECT => return Ok(()),
            _ => stream.write_all(&[RESPONSE_FAILURE]).await?,
        }
    }
}
