/// Transport binding - datagram I/O over a fixed local/remote endpoint pair
///
/// The binding exclusively owns the datagram resource and both message
/// buffers. Callers borrow it mutably for one send or receive at a time, so
/// two exchanges can never interleave on the same buffers.
use std::io::ErrorKind;
use std::net::UdpSocket;

use tracing::debug;

use crate::contracts::{Endpoint, IncomingMessage, OutgoingMessage};
use crate::errors::{BeaconError, Result};
use crate::{INCOMING_CAPACITY, OUTGOING_CAPACITY};

/// Raw datagram primitives
///
/// Sending is split into open/write/close the way embedded UDP stacks expose
/// it; all three must succeed for a datagram to leave the device.
pub trait DatagramIo {
    /// Bind the local endpoint and start listening.
    fn bind(&mut self, local: Endpoint) -> Result<()>;

    /// Open a send context addressed to `remote`.
    fn begin_packet(&mut self, remote: Endpoint) -> Result<()>;

    /// Append bytes to the open send context, returning how many were taken.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Close the send context and put the datagram on the wire.
    fn end_packet(&mut self) -> Result<()>;

    /// Non-blocking receive. `Ok(None)` when nothing is waiting.
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, Endpoint)>>;
}

/// A datagram received into the incoming buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub len: usize,
    pub from: Endpoint,
}

/// Transport binding over any [`DatagramIo`]
pub struct TransportBinding<D> {
    io: D,
    local: Endpoint,
    remote: Endpoint,
    bound: bool,
    outgoing: OutgoingMessage,
    incoming: IncomingMessage,
}

impl<D: DatagramIo> TransportBinding<D> {
    pub fn new(io: D, local: Endpoint, remote: Endpoint) -> Self {
        Self {
            io,
            local,
            remote,
            bound: false,
            outgoing: OutgoingMessage::new(),
            incoming: IncomingMessage::new(),
        }
    }

    pub fn local(&self) -> Endpoint {
        self.local
    }

    pub fn remote(&self) -> Endpoint {
        self.remote
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Bind the local endpoint
    ///
    /// Binding happens once per wake; later calls are no-ops so the local
    /// port can never change between exchanges.
    pub fn listen(&mut self) -> Result<()> {
        if self.bound {
            return Ok(());
        }
        self.io.bind(self.local)?;
        self.bound = true;
        debug!(local = %self.local, "listening");
        Ok(())
    }

    /// Buffer the codec encodes into before [`send_outgoing`](Self::send_outgoing)
    pub fn outgoing_mut(&mut self) -> &mut OutgoingMessage {
        &mut self.outgoing
    }

    pub fn outgoing(&self) -> &[u8] {
        &self.outgoing
    }

    /// Send the outgoing buffer to the remote endpoint as one datagram
    ///
    /// # Errors
    /// - `TransportNotBound` before [`listen`](Self::listen)
    /// - `TransportOpenFailed` / `TransportWriteFailed` / `TransportCloseFailed`
    ///   for the sub-step that failed
    pub fn send_outgoing(&mut self) -> Result<usize> {
        if !self.bound {
            return Err(BeaconError::TransportNotBound);
        }
        if self.outgoing.is_empty() {
            return Err(BeaconError::TransportWriteFailed("empty message packet".to_string()));
        }

        self.io
            .begin_packet(self.remote)
            .map_err(|e| BeaconError::TransportOpenFailed(e.to_string()))?;

        let written = self
            .io
            .write(&self.outgoing)
            .map_err(|e| BeaconError::TransportWriteFailed(e.to_string()))?;
        if written == 0 {
            return Err(BeaconError::TransportWriteFailed("zero bytes written".to_string()));
        }

        self.io
            .end_packet()
            .map_err(|e| BeaconError::TransportCloseFailed(e.to_string()))?;

        Ok(written)
    }

    /// Poll once for a datagram without blocking
    ///
    /// At most `INCOMING_CAPACITY - 1` bytes are kept. A zero-length datagram
    /// counts as nothing received.
    pub fn poll_incoming(&mut self) -> Result<Option<Received>> {
        if !self.bound {
            return Err(BeaconError::TransportNotBound);
        }

        self.incoming.clear();
        self.incoming
            .resize_default(INCOMING_CAPACITY)
            .map_err(|_| BeaconError::IoError("incoming buffer resize".to_string()))?;

        let result = self.io.try_recv(&mut self.incoming[..INCOMING_CAPACITY - 1]);
        match result {
            Ok(Some((len, from))) if len > 0 => {
                self.incoming.truncate(len.min(INCOMING_CAPACITY - 1));
                Ok(Some(Received { len: self.incoming.len(), from }))
            }
            Ok(_) => {
                self.incoming.clear();
                Ok(None)
            }
            Err(e) => {
                self.incoming.clear();
                Err(e)
            }
        }
    }

    /// Bytes of the last datagram received
    pub fn incoming(&self) -> &[u8] {
        &self.incoming
    }

    /// Access the underlying datagram I/O
    pub fn io(&self) -> &D {
        &self.io
    }
}

/// Non-blocking UDP socket implementation of [`DatagramIo`]
#[derive(Debug, Default)]
pub struct UdpDatagram {
    socket: Option<UdpSocket>,
    staging: heapless::Vec<u8, OUTGOING_CAPACITY>,
    destination: Option<Endpoint>,
}

impl UdpDatagram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the socket actually bound to (useful with port 0)
    pub fn local_addr(&self) -> Result<Endpoint> {
        let socket = self.socket.as_ref().ok_or(BeaconError::TransportNotBound)?;
        Ok(socket.local_addr()?.into())
    }
}

impl DatagramIo for UdpDatagram {
    fn bind(&mut self, local: Endpoint) -> Result<()> {
        let socket = UdpSocket::bind(local.as_socket_addr())?;
        socket.set_nonblocking(true)?;
        self.socket = Some(socket);
        Ok(())
    }

    fn begin_packet(&mut self, remote: Endpoint) -> Result<()> {
        if self.socket.is_none() {
            return Err(BeaconError::TransportNotBound);
        }
        self.staging.clear();
        self.destination = Some(remote);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        if self.destination.is_none() {
            return Err(BeaconError::IoError("no open packet".to_string()));
        }
        let room = self.staging.capacity() - self.staging.len();
        let take = bytes.len().min(room);
        self.staging
            .extend_from_slice(&bytes[..take])
            .map_err(|_| BeaconError::IoError("packet buffer full".to_string()))?;
        Ok(take)
    }

    fn end_packet(&mut self) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(BeaconError::TransportNotBound)?;
        let destination = self
            .destination
            .take()
            .ok_or_else(|| BeaconError::IoError("no open packet".to_string()))?;

        let sent = socket.send_to(&self.staging, destination.as_socket_addr())?;
        if sent != self.staging.len() {
            return Err(BeaconError::IoError(format!(
                "short send: {} of {} bytes",
                sent,
                self.staging.len()
            )));
        }
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, Endpoint)>> {
        let socket = self.socket.as_ref().ok_or(BeaconError::TransportNotBound)?;
        match socket.recv_from(buf) {
            Ok((len, from)) => Ok(Some((len, from.into()))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
