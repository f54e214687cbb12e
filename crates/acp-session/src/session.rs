//! The session: one socket, one buffer, one exchange at a time.
//!
//! # Concurrency model
//!
//! ACP permits a single outstanding request/response exchange per
//! connection. [`Session::queue`] enforces that: it hands out an
//! [`Exchange`] guard backed by a fair async mutex, so callers line up in
//! FIFO order and each sees the socket exclusively from its first request
//! byte to its last response byte. Closing the session wakes every waiter
//! and every in-flight read with [`SessionError::Canceled`].
//!
//! # Receive reassembly
//!
//! Inbound bytes land in one buffer. A read for `n` bytes drains the
//! buffer first, then awaits socket data, decrypting each chunk as it
//! arrives once encryption is installed. The deadline is refreshed
//! whenever bytes arrive, so a slow but live peer does not time out
//! mid-frame.
//!
//! # Encryption
//!
//! [`Exchange::enable_encryption`] (client) and
//! [`Exchange::enable_server_encryption`] (station) install the AES-CTR
//! pair exactly once, immediately after authentication. From then on
//! every outbound byte is encrypted before write and every inbound chunk
//! is decrypted on arrival; the framing layer above never sees
//! ciphertext.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use acp_crypto::{Role, SessionCipher, derive_session_keys};
use acp_proto::{HEADER_SIZE, Message, MessageHeader};
use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{Mutex, MutexGuard, watch},
    time::{Instant, sleep_until},
};

use crate::{Result, error::SessionError};

/// Default per-read deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-side discipline of the session.
///
/// `Monitoring` is terminal: once a session is dedicated to unsolicited
/// event frames, no further exchanges can be queued on it and the only
/// way out is closing the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// No read pending.
    Idle,
    /// An explicit read is consuming the stream.
    Reading,
    /// The session is dedicated to monitor events.
    Monitoring,
}

struct Io {
    stream: Option<TcpStream>,
    buffer: BytesMut,
    cipher: Option<SessionCipher>,
    state: ReadState,
}

struct Shared {
    io: Mutex<Io>,
    closed: watch::Sender<bool>,
    monitoring: AtomicBool,
}

/// Handle to one ACP connection.
///
/// Clones share the underlying connection; the socket itself is owned by
/// the session and only ever touched through [`Exchange`] guards.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Dial `host:port`, bounding the attempt by `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let address = format!("{host}:{port}");
        match tokio::time::timeout(timeout, TcpStream::connect(address.as_str())).await {
            Err(_) => Err(SessionError::Timeout),
            Ok(Err(err)) => Err(SessionError::ConnectFailed(err.to_string())),
            Ok(Ok(stream)) => {
                tracing::debug!(%address, "connected");
                Ok(Self::from_stream(stream))
            },
        }
    }

    /// Wrap an accepted socket (station side).
    #[must_use]
    pub fn from_stream(stream: TcpStream) -> Self {
        // Request/response frames are small; coalescing hurts latency
        let _ = stream.set_nodelay(true);

        Self {
            shared: Arc::new(Shared {
                io: Mutex::new(Io {
                    stream: Some(stream),
                    buffer: BytesMut::with_capacity(8 * 1024),
                    cipher: None,
                    state: ReadState::Idle,
                }),
                closed: watch::channel(false).0,
                monitoring: AtomicBool::new(false),
            }),
        }
    }

    /// Wait for exclusive access to the session and begin an exchange.
    ///
    /// Callers line up FIFO. Waiters are aborted with
    /// [`SessionError::Canceled`] when the session closes, and refused
    /// with [`SessionError::Monitoring`] once the session is dedicated to
    /// event frames.
    pub async fn queue(&self) -> Result<Exchange<'_>> {
        let mut closed = self.shared.closed.subscribe();
        if *closed.borrow() {
            return Err(SessionError::Canceled);
        }
        if self.shared.monitoring.load(Ordering::Acquire) {
            return Err(SessionError::Monitoring);
        }

        let io = tokio::select! {
            guard = self.shared.io.lock() => guard,
            _ = closed.changed() => return Err(SessionError::Canceled),
        };

        if *closed.borrow() {
            return Err(SessionError::Canceled);
        }
        if io.stream.is_none() {
            return Err(SessionError::NotConnected);
        }

        Ok(Exchange { io, closed, shared: Arc::clone(&self.shared) })
    }

    /// Close the session: abort every waiter and in-flight read, shut the
    /// socket down, and drop buffer and encryption context.
    pub async fn close(&self) {
        self.shared.closed.send_replace(true);

        let mut io = self.shared.io.lock().await;
        if let Some(mut stream) = io.stream.take() {
            let _ = stream.shutdown().await;
        }
        io.buffer.clear();
        io.cipher = None;
        io.state = ReadState::Idle;
        self.shared.monitoring.store(false, Ordering::Release);

        tracing::debug!("session closed");
    }

    /// True once [`Self::close`] has run (or an exchange observed EOF and
    /// the session was closed from that side).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }
}

enum ReadEvent {
    Data(usize),
    Eof,
    Failed(String),
    TimedOut,
    Closed,
}

/// Exclusive access to the session for one exchange.
///
/// Dropping the guard ends the exchange and admits the next queued
/// caller. A monitor consumer instead holds its guard for the rest of the
/// connection's life.
pub struct Exchange<'a> {
    io: MutexGuard<'a, Io>,
    closed: watch::Receiver<bool>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Exchange<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange").finish_non_exhaustive()
    }
}

impl Exchange<'_> {
    /// Serialize `message` (encrypting if enabled) and write it out.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        self.send_raw(&message.compose()).await
    }

    /// Write pre-framed bytes (encrypting if enabled). Monitor event
    /// frames and streamed property elements are not [`Message`]s, so
    /// they go out through this path.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let mut closed = self.closed.clone();
        if *closed.borrow() {
            return Err(SessionError::Canceled);
        }

        let mut wire = bytes.to_vec();
        let io = &mut *self.io;
        if let Some(cipher) = io.cipher.as_mut() {
            cipher.encrypt(&mut wire);
        }

        let stream = io.stream.as_mut().ok_or(SessionError::NotConnected)?;
        let outcome = tokio::select! {
            res = stream.write_all(&wire) => res.map_err(SessionError::from),
            _ = closed.changed() => Err(SessionError::Canceled),
        };

        if let Err(SessionError::Io(_)) = &outcome {
            io.stream = None;
        }
        outcome
    }

    /// Return exactly `n` bytes from the inbound stream, waiting up to
    /// `timeout` between arrivals.
    pub async fn receive(&mut self, n: usize, timeout: Duration) -> Result<Bytes> {
        if self.io.state == ReadState::Idle {
            self.io.state = ReadState::Reading;
        }
        let result = self.receive_inner(n, timeout).await;
        if self.io.state == ReadState::Reading {
            self.io.state = ReadState::Idle;
        }
        result
    }

    async fn receive_inner(&mut self, n: usize, timeout: Duration) -> Result<Bytes> {
        let mut closed = self.closed.clone();
        if *closed.borrow() {
            return Err(SessionError::Canceled);
        }

        let mut deadline = Instant::now() + timeout;
        loop {
            let Io { stream, buffer, cipher, .. } = &mut *self.io;

            if buffer.len() >= n {
                return Ok(buffer.split_to(n).freeze());
            }

            let sock = stream.as_mut().ok_or(SessionError::NotConnected)?;
            let mut chunk = [0u8; 8 * 1024];

            let event = tokio::select! {
                read = sock.read(&mut chunk) => match read {
                    Ok(0) => ReadEvent::Eof,
                    Ok(count) => ReadEvent::Data(count),
                    Err(err) => ReadEvent::Failed(err.to_string()),
                },
                () = sleep_until(deadline) => ReadEvent::TimedOut,
                _ = closed.changed() => ReadEvent::Closed,
            };

            match event {
                ReadEvent::Data(count) => {
                    let arrived = &mut chunk[..count];
                    if let Some(cipher) = cipher.as_mut() {
                        cipher.decrypt(arrived);
                    }
                    buffer.extend_from_slice(arrived);
                    // Progress resets the clock; only silence times out
                    deadline = Instant::now() + timeout;
                },
                ReadEvent::Eof => {
                    *stream = None;
                    return Err(SessionError::Canceled);
                },
                ReadEvent::Failed(msg) => {
                    *stream = None;
                    return Err(SessionError::Io(msg));
                },
                ReadEvent::TimedOut => return Err(SessionError::Timeout),
                ReadEvent::Closed => return Err(SessionError::Canceled),
            }
        }
    }

    /// Read one complete message: header, then body if the header claims
    /// one, with both checksums verified.
    ///
    /// On a framing failure the receive buffer is dropped (its alignment
    /// can no longer be trusted) but the session stays open.
    pub async fn receive_message(&mut self) -> Result<Message> {
        self.receive_message_timeout(DEFAULT_TIMEOUT).await
    }

    /// [`Self::receive_message`] with an explicit per-read deadline.
    pub async fn receive_message_timeout(&mut self, timeout: Duration) -> Result<Message> {
        let header_bytes = self.receive(HEADER_SIZE, timeout).await?;
        let header = match MessageHeader::parse(&header_bytes) {
            Ok(header) => header,
            Err(err) => {
                self.drop_buffer();
                return Err(err.into());
            },
        };

        let body = if header.body_size >= 0 {
            Some(self.receive(header.body_size as usize, timeout).await?)
        } else {
            None
        };

        match Message::from_parts(&header, body) {
            Ok(message) => Ok(message),
            Err(err) => {
                self.drop_buffer();
                Err(err.into())
            },
        }
    }

    /// Install session encryption with the client role: writes use the
    /// client stream, reads the station stream.
    pub fn enable_encryption(
        &mut self,
        key: &[u8],
        client_iv: &[u8; 16],
        server_iv: &[u8; 16],
    ) -> Result<()> {
        self.install_cipher(Role::Client, key, client_iv, server_iv)
    }

    /// Install session encryption with the station role (the reverse
    /// stream assignment).
    pub fn enable_server_encryption(
        &mut self,
        key: &[u8],
        client_iv: &[u8; 16],
        server_iv: &[u8; 16],
    ) -> Result<()> {
        self.install_cipher(Role::Server, key, client_iv, server_iv)
    }

    fn install_cipher(
        &mut self,
        role: Role,
        key: &[u8],
        client_iv: &[u8; 16],
        server_iv: &[u8; 16],
    ) -> Result<()> {
        if self.io.cipher.is_some() {
            return Err(SessionError::EncryptionAlreadyEnabled);
        }
        let keys = derive_session_keys(key);
        self.io.cipher = Some(SessionCipher::new(role, &keys, client_iv, server_iv));
        tracing::debug!(?role, "session encryption enabled");
        Ok(())
    }

    /// Dedicate the session to unsolicited event frames. Irreversible;
    /// later [`Session::queue`] calls fail with
    /// [`SessionError::Monitoring`].
    pub fn begin_monitoring(&mut self) {
        self.io.state = ReadState::Monitoring;
        self.shared.monitoring.store(true, Ordering::Release);
    }

    /// Current read-side state.
    #[must_use]
    pub fn state(&self) -> ReadState {
        self.io.state
    }

    /// Number of buffered inbound bytes not yet consumed by a read.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.io.buffer.len()
    }

    fn drop_buffer(&mut self) {
        let dropped = self.io.buffer.len();
        if dropped > 0 {
            tracing::warn!(dropped, "dropping receive buffer after framing error");
        }
        self.io.buffer.clear();
    }
}
