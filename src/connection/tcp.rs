//! Length-prefixed envelopes over a non-blocking TCP stream

use super::wire::{MAX_FRAME_LEN, Serializer, WireFormat};
use super::{Connection, DeliveryClass, Envelope, MessageId, NameMap, SenderId};
use crate::error::{Error, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

const READ_CHUNK: usize = 4096;

/// Unsent bytes held for a slow peer before low-latency messages are dropped
pub const MAX_PENDING_WRITE: usize = 1024 * 1024;

/// TCP endpoint. Reads and writes never block; partial frames stay buffered
/// until the rest arrives (or can be written).
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    serializer: Serializer,
    names: NameMap,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    closed: bool,
    dropped: u64,
}

impl TcpConnection {
    /// Connect to a tracker server
    pub fn connect(addr: impl ToSocketAddrs, format: WireFormat) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream, format)
    }

    /// Wrap an accepted stream
    pub fn from_stream(stream: TcpStream, format: WireFormat) -> Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        log::info!("Connection established with {} ({:?})", peer, format);
        Ok(Self {
            stream,
            peer,
            serializer: Serializer::new(format),
            names: NameMap::default(),
            read_buf: Vec::with_capacity(READ_CHUNK),
            write_buf: Vec::new(),
            closed: false,
            dropped: 0,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Peer has closed the stream
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes queued but not yet accepted by the socket
    pub fn pending_write(&self) -> usize {
        self.write_buf.len()
    }

    /// Low-latency messages discarded because the peer stopped reading
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Write as much of the pending output as the socket accepts
    pub fn flush(&mut self) -> Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    self.closed = true;
                    return Err(Error::ConnectionClosed);
                }
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.closed = true;
                    return Err(Error::Io(e));
                }
            }
        }
        Ok(())
    }

    /// Pull whatever bytes are available into the read buffer
    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    if !self.closed {
                        log::info!("Peer {} disconnected", self.peer);
                    }
                    self.closed = true;
                    return Ok(());
                }
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.closed = true;
                    return Err(Error::Io(e));
                }
            }
        }
    }

    /// Take one complete frame body off the read buffer
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.read_buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]) as usize;

        if len > MAX_FRAME_LEN {
            self.closed = true;
            return Err(Error::Other(format!("Message too large: {} bytes", len)));
        }
        if self.read_buf.len() < 4 + len {
            return Ok(None);
        }

        let body = self.read_buf[4..4 + len].to_vec();
        self.read_buf.drain(..4 + len);
        Ok(Some(body))
    }
}

impl Connection for TcpConnection {
    fn register_message_type(&mut self, name: &str) -> Result<MessageId> {
        Ok(self.names.register_type(name))
    }

    fn register_sender(&mut self, name: &str) -> Result<SenderId> {
        Ok(self.names.register_sender(name))
    }

    fn send(
        &mut self,
        message: MessageId,
        sender: SenderId,
        timestamp_us: u64,
        payload: &[u8],
        class: DeliveryClass,
    ) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        let wire = self
            .names
            .outgoing(message, sender, timestamp_us, payload, class)?;
        let framed = self.serializer.frame(&wire)?;

        if self.write_buf.len() + framed.len() > MAX_PENDING_WRITE {
            self.flush()?;
        }
        if self.write_buf.len() + framed.len() > MAX_PENDING_WRITE {
            match class {
                DeliveryClass::LowLatency => {
                    self.dropped += 1;
                    if self.dropped % 100 == 1 {
                        log::warn!(
                            "Peer {} not reading, dropped {} low-latency messages ({} bytes pending)",
                            self.peer,
                            self.dropped,
                            self.write_buf.len()
                        );
                    }
                    return Ok(());
                }
                DeliveryClass::Reliable => {
                    log::error!(
                        "Peer {} not reading, closing connection ({} bytes pending)",
                        self.peer,
                        self.write_buf.len()
                    );
                    self.closed = true;
                    return Err(Error::Other(format!(
                        "Send buffer full for {} ({} bytes pending)",
                        self.peer,
                        self.write_buf.len()
                    )));
                }
            }
        }

        self.write_buf.extend_from_slice(&framed);
        self.flush()
    }

    fn receive(&mut self) -> Result<Option<Envelope>> {
        if !self.write_buf.is_empty() && !self.closed {
            self.flush()?;
        }
        if !self.closed {
            self.fill()?;
        }

        while let Some(body) = self.next_frame()? {
            match self.serializer.deserialize(&body) {
                Ok(wire) => return Ok(Some(self.names.incoming(wire))),
                Err(e) => {
                    log::warn!("Discarding undecodable message from {}: {}", self.peer, e);
                }
            }
        }

        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        Ok(None)
    }
}
