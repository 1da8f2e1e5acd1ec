//! Raw TCP connection speaking RESP
//!
//! The default `NodeConnection`. It connects lazily on the first command,
//! drops the socket on any I/O failure and reconnects on the next command.
//! Every error is returned to the caller. Connect failures are additionally
//! reported to the pool through `ConnectionEvents`, since they are the
//! signal that a node may have left the cluster.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::connection::{ConnectionEvents, ConnectionFactory, NodeConnection};
use crate::config::ConnectionOptions;
use crate::utils::{ConnectionError, ProtocolError, RespDecoder, RespEncoder, RespValue};

type Stream = RespDecoder<BufReader<TcpStream>>;

pub struct RawConnection {
    host: String,
    port: u16,
    options: ConnectionOptions,
    events: ConnectionEvents,
    stream: Mutex<Option<Stream>>,
}

impl RawConnection {
    pub fn new(host: &str, port: u16, options: ConnectionOptions, events: ConnectionEvents) -> Self {
        Self {
            host: host.to_string(),
            port,
            options,
            events,
            stream: Mutex::new(None),
        }
    }

    /// Open the socket and authenticate if configured
    async fn connect(&self) -> Result<Stream, ConnectionError> {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let stream = match tokio::time::timeout(self.options.connect_timeout(), connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.fail(ConnectionError::connect_failed(&self.host, self.port, e))),
            Err(_) => return Err(self.fail(ConnectionError::Timeout(self.options.connect_timeout_ms))),
        };

        // Disable Nagle's algorithm
        stream.set_nodelay(true).ok();
        debug!("Connected to {}", self.events.address());

        let mut decoder = RespDecoder::new(BufReader::with_capacity(65536, stream));
        if let Some(ref password) = self.options.password {
            self.authenticate(&mut decoder, password).await?;
        }
        Ok(decoder)
    }

    async fn authenticate(&self, stream: &mut Stream, password: &str) -> Result<(), ConnectionError> {
        let mut encoder = RespEncoder::with_capacity(64);
        encoder.encode_command_str(&["AUTH", password]);

        match self.round_trip(stream, &encoder).await {
            Ok(RespValue::SimpleString(s)) if s == "OK" => Ok(()),
            Ok(RespValue::Error(e)) => Err(ConnectionError::AuthFailed(e)),
            Ok(other) => Err(ConnectionError::AuthFailed(format!(
                "Unexpected response: {:?}",
                other
            ))),
            Err(e) => Err(ConnectionError::AuthFailed(format!("IO error: {}", e))),
        }
    }

    /// Write one command and read its reply within the read timeout
    async fn round_trip(&self, stream: &mut Stream, encoder: &RespEncoder) -> io::Result<RespValue> {
        let exchange = async {
            let socket = stream.get_mut();
            socket.write_all(encoder.as_bytes()).await?;
            socket.flush().await?;
            stream.decode().await
        };

        match tokio::time::timeout(self.options.read_timeout(), exchange).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no reply within {}ms", self.options.read_timeout_ms),
            )),
        }
    }

    /// Report a connect failure to the pool and hand it back
    fn fail(&self, err: ConnectionError) -> ConnectionError {
        warn!("Connection to {} failed: {}", self.events.address(), err);
        self.events.report(err.clone());
        err
    }
}

#[async_trait]
impl NodeConnection for RawConnection {
    async fn send_command(
        &self,
        name: &str,
        args: &[String],
    ) -> Result<RespValue, ConnectionError> {
        let mut encoder = RespEncoder::with_capacity(64);
        encoder.encode_named(name, args);

        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let Some(stream) = guard.as_mut() else {
            return Err(ConnectionError::Closed);
        };

        match self.round_trip(stream, &encoder).await {
            Ok(RespValue::Error(e)) => Err(ConnectionError::Server(e)),
            Ok(value) => Ok(value),
            Err(e) => {
                // Socket state is unknown; reconnect on next command
                *guard = None;
                debug!("Command to {} failed: {}", self.events.address(), e);
                if e.kind() == io::ErrorKind::InvalidData {
                    Err(ProtocolError::Parse(e.to_string()).into())
                } else {
                    Err(ConnectionError::from(e))
                }
            }
        }
    }

    async fn quit(&self) {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            let mut encoder = RespEncoder::with_capacity(16);
            encoder.encode_command_str(&["QUIT"]);
            if let Err(e) = self.round_trip(&mut stream, &encoder).await {
                debug!("QUIT to {} failed: {}", self.events.address(), e);
            }
            stream.get_mut().get_mut().shutdown().await.ok();
        }
    }
}

/// Factory for `RawConnection`s sharing one set of options
#[derive(Debug, Clone, Default)]
pub struct RawConnectionFactory {
    pub options: ConnectionOptions,
}

impl RawConnectionFactory {
    pub fn new(options: ConnectionOptions) -> Self {
        Self { options }
    }
}

impl ConnectionFactory for RawConnectionFactory {
    fn create(&self, host: &str, port: u16, events: ConnectionEvents) -> Arc<dyn NodeConnection> {
        Arc::new(RawConnection::new(host, port, self.options.clone(), events))
    }
}
