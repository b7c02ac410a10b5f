//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking accept/read/write calls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! One iteration waits (bounded by the poll timeout) for readiness on the
//! listener plus every occupied slot, then services the listener first and
//! the ready slots in ascending index order. Clients are registered with the
//! poller while they hold a slot, so the registered set is the watch-set.
//!
//! A slot reads at most `READS_PER_TURN` chunks per iteration. Unread data is
//! remembered in `ClientConn::read_pending`, since mio only reports an edge
//! once. While a slot has `outbound_high_water` reply bytes queued it stops
//! reading and dispatching and waits for WRITABLE alone.

use crate::config::Config;
use crate::error::ServerError;
use crate::protocols::menu::{self, Action};
use crate::runtime::framer::CommandBuffer;
use crate::runtime::slots::{SlotTable, MAX_CLIENTS};
use bytes::{Buf, BytesMut};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

const EVENTS_CAPACITY: usize = 64;

/// Reads one slot may do per iteration before the next slot is serviced.
const READS_PER_TURN: usize = 4;

/// Outbound high-water mark, in read chunks.
const OUTBOUND_HIGH_WATER_CHUNKS: usize = 4;

/// Per-client bounds, fixed at bind time.
#[derive(Debug, Clone, Copy)]
struct Limits {
    outbound_high_water: usize,
    max_command_len: usize,
}

impl Limits {
    fn new(config: &Config) -> Self {
        Self {
            outbound_high_water: config.read_chunk_size.max(1) * OUTBOUND_HIGH_WATER_CHUNKS,
            max_command_len: config.max_command_len,
        }
    }
}

/// A client that owns a slot.
struct ClientConn {
    stream: TcpStream,
    /// Address captured at accept, used when `getpeername` fails later.
    peer: Option<SocketAddr>,
    commands: CommandBuffer,
    /// Reply bytes the socket has not accepted yet.
    outbound: BytesMut,
    /// Interest currently registered for this slot.
    interest: Interest,
    /// The socket may hold data no new event will announce.
    read_pending: bool,
}

impl ClientConn {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer: Some(peer),
            commands: CommandBuffer::new(),
            outbound: BytesMut::new(),
            interest: Interest::READABLE,
            read_pending: false,
        }
    }

    /// Current peer address, preferring a fresh lookup on the socket.
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok().or(self.peer)
    }

    /// Too many replies queued to take on more commands.
    fn backlogged(&self, limits: &Limits) -> bool {
        self.outbound.len() >= limits.outbound_high_water
    }

    /// Should be read this iteration even without a fresh event.
    fn carries_read(&self, limits: &Limits) -> bool {
        self.read_pending && !self.backlogged(limits)
    }

    fn wanted_interest(&self, limits: &Limits) -> Interest {
        if self.backlogged(limits) {
            Interest::WRITABLE
        } else if self.outbound.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE.add(Interest::WRITABLE)
        }
    }

    /// Write queued bytes until done or the socket would block.
    fn flush(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => self.outbound.advance(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Flush, then bring the registered interest in line with the queue.
    fn send_pending(&mut self, registry: &Registry, slot: usize, limits: &Limits) -> io::Result<()> {
        self.flush()?;
        let interest = self.wanted_interest(limits);
        if interest != self.interest {
            registry.reregister(&mut self.stream, Token(slot), interest)?;
            self.interest = interest;
        }
        Ok(())
    }
}

/// Why a client is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// Zero-length read.
    Disconnect,
    /// Client sent `exit`.
    Exit,
    /// Unterminated command longer than the configured limit.
    CommandTooLong,
    /// Read or write failed.
    Error,
}

/// Readiness collected from one wait, before any servicing.
#[derive(Debug, Default, Clone, Copy)]
struct SlotReadiness {
    readable: bool,
    writable: bool,
}

/// The multiplexed command server.
pub struct Server {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    slots: SlotTable<ClientConn>,
    poll_timeout: Duration,
    read_buf: Vec<u8>,
    limits: Limits,
}

impl Server {
    /// Create the listening socket and poller.
    ///
    /// Any failure here means the server cannot start.
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        let address = config.address();
        let addr: SocketAddr = address
            .parse()
            .map_err(|source| ServerError::InvalidAddress {
                addr: address.clone(),
                source,
            })?;

        let listener = create_listener(addr, config.backlog)?;
        let mut listener = TcpListener::from_std(listener);

        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(ServerError::Register)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener,
            slots: SlotTable::new(MAX_CLIENTS),
            poll_timeout: config.poll_timeout(),
            read_buf: vec![0u8; config.read_chunk_size.max(1)],
            limits: Limits::new(config),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve forever. Only returns if the process is torn down around it.
    pub fn run(&mut self) -> Result<(), ServerError> {
        info!(
            addr = ?self.local_addr().ok(),
            max_clients = self.slots.capacity(),
            poll_timeout_ms = self.poll_timeout.as_millis() as u64,
            max_command_len = self.limits.max_command_len,
            outbound_high_water = self.limits.outbound_high_water,
            "Server listening"
        );
        loop {
            self.poll_once();
        }
    }

    /// One iteration: wait for readiness, then service what is ready.
    pub fn poll_once(&mut self) {
        let limits = self.limits;

        // Leftover input must not wait out a full timeout
        let carried = self.slots.occupied().any(|(_, c)| c.carries_read(&limits));
        let timeout = if carried {
            Duration::ZERO
        } else {
            self.poll_timeout
        };

        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return,
            Err(e) => {
                error!(error = %e, "Readiness wait failed");
                return;
            }
        }

        let mut listener_ready = false;
        let mut ready = [SlotReadiness::default(); MAX_CLIENTS];
        for event in self.events.iter() {
            match event.token() {
                LISTENER_TOKEN => listener_ready = true,
                Token(slot) => {
                    if let Some(r) = ready.get_mut(slot) {
                        r.readable |= event.is_readable() || event.is_read_closed();
                        r.writable |= event.is_writable() || event.is_write_closed();
                    }
                }
            }
        }

        if listener_ready {
            accept_connections(&self.listener, self.poll.registry(), &mut self.slots, &limits);
        }

        for (slot, r) in ready.iter().enumerate() {
            if r.writable {
                handle_writable(slot, self.poll.registry(), &mut self.slots, &limits);
            }
            let carried = self
                .slots
                .get_mut(slot)
                .is_some_and(|c| c.carries_read(&limits));
            if r.readable || carried {
                handle_readable(
                    slot,
                    self.poll.registry(),
                    &mut self.slots,
                    &mut self.read_buf,
                    &limits,
                );
            }
        }
    }

    /// Peer address per occupied slot, in slot order.
    #[cfg(test)]
    fn slot_peers(&self) -> Vec<(usize, Option<SocketAddr>)> {
        self.slots.occupied().map(|(slot, c)| (slot, c.peer)).collect()
    }

    /// Reply bytes queued for a slot.
    #[cfg(test)]
    fn queued_bytes(&self, slot: usize) -> Option<usize> {
        self.slots
            .occupied()
            .find(|(s, _)| *s == slot)
            .map(|(_, c)| c.outbound.len())
    }

    #[cfg(test)]
    fn read_pending(&self, slot: usize) -> bool {
        self.slots
            .occupied()
            .any(|(s, c)| s == slot && c.read_pending)
    }
}

/// Accept every pending connection, installing each into the lowest free slot.
fn accept_connections(
    listener: &TcpListener,
    registry: &Registry,
    slots: &mut SlotTable<ClientConn>,
    limits: &Limits,
) {
    loop {
        match listener.accept() {
            Ok((mut stream, peer)) => {
                let Some(slot) = slots.find_free() else {
                    warn!(peer = %peer, "No free slot, rejecting connection");
                    if let Err(e) = stream.write(menu::server_full()) {
                        debug!(peer = %peer, error = %e, "Failed to send server-full notice");
                    }
                    continue;
                };

                if let Err(e) = registry.register(&mut stream, Token(slot), Interest::READABLE) {
                    error!(peer = %peer, error = %e, "Failed to register connection");
                    continue;
                }

                let mut conn = ClientConn::new(stream, peer);
                conn.outbound.extend_from_slice(&menu::welcome());
                let result = conn.send_pending(registry, slot, limits);

                if slots.insert(conn).is_err() {
                    // find_free just returned this slot and nothing ran in between
                    continue;
                }
                info!(slot, peer = %peer, clients = slots.len(), "Accepted connection");

                if let Err(e) = result {
                    warn!(slot, error = %e, "Failed to send welcome");
                    teardown(slot, registry, slots, CloseReason::Error);
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(error = %e, "Accept error");
                break;
            }
        }
    }
}

/// Read up to `READS_PER_TURN` chunks from a slot, dispatching complete commands.
///
/// Stopping early on the budget or a reply backlog sets `read_pending`, and
/// only `WouldBlock` clears it.
fn handle_readable(
    slot: usize,
    registry: &Registry,
    slots: &mut SlotTable<ClientConn>,
    read_buf: &mut [u8],
    limits: &Limits,
) {
    let mut reads = 0;
    while reads < READS_PER_TURN {
        let Some(conn) = slots.get_mut(slot) else {
            return;
        };
        if conn.backlogged(limits) {
            conn.read_pending = true;
            return;
        }

        let n = match conn.stream.read(read_buf) {
            Ok(0) => {
                teardown(slot, registry, slots, CloseReason::Disconnect);
                return;
            }
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                conn.read_pending = false;
                return;
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(slot, error = %e, "Read error");
                teardown(slot, registry, slots, CloseReason::Error);
                return;
            }
        };
        reads += 1;

        trace!(slot, bytes = n, "Read from client");
        conn.commands.extend(&read_buf[..n]);

        if let Some(reason) = dispatch_commands(slot, conn, registry, limits) {
            teardown(slot, registry, slots, reason);
            return;
        }

        if conn.commands.partial_len() > limits.max_command_len {
            warn!(
                slot,
                bytes = conn.commands.partial_len(),
                limit = limits.max_command_len,
                "Command too long, closing client"
            );
            teardown(slot, registry, slots, CloseReason::CommandTooLong);
            return;
        }
    }

    if let Some(conn) = slots.get_mut(slot) {
        conn.read_pending = true;
    }
}

/// Dispatch buffered commands for `conn` in arrival order.
///
/// Stops while the reply queue is over the high-water mark; the rest stay
/// buffered until `handle_writable` drains the queue. Returns a close reason
/// if the client must be torn down.
fn dispatch_commands(
    slot: usize,
    conn: &mut ClientConn,
    registry: &Registry,
    limits: &Limits,
) -> Option<CloseReason> {
    if !conn.commands.has_command() || conn.backlogged(limits) {
        return None;
    }

    let peer = conn.peer_addr();
    loop {
        while !conn.backlogged(limits) {
            let Some(line) = conn.commands.next_command() else {
                break;
            };
            let command = menu::parse(line);
            trace!(slot, ?command, "Dispatching command");

            match menu::handle(&command, peer) {
                Action::Reply(bytes) => conn.outbound.extend_from_slice(&bytes),
                Action::Close => {
                    // Replies to earlier commands still go out, best effort
                    if let Err(e) = conn.flush() {
                        debug!(slot, error = %e, "Failed to flush replies before exit");
                    }
                    return Some(CloseReason::Exit);
                }
            }
        }

        if let Err(e) = conn.send_pending(registry, slot, limits) {
            debug!(slot, error = %e, "Write error");
            return Some(CloseReason::Error);
        }
        if conn.backlogged(limits) || !conn.commands.has_command() {
            return None;
        }
    }
}

/// Drain queued replies, then resume commands the backlog held back.
fn handle_writable(
    slot: usize,
    registry: &Registry,
    slots: &mut SlotTable<ClientConn>,
    limits: &Limits,
) {
    let Some(conn) = slots.get_mut(slot) else {
        return;
    };
    let close = match conn.send_pending(registry, slot, limits) {
        Ok(()) => dispatch_commands(slot, conn, registry, limits),
        Err(e) => {
            debug!(slot, error = %e, "Write error");
            Some(CloseReason::Error)
        }
    };
    if let Some(reason) = close {
        teardown(slot, registry, slots, reason);
    }
}

/// Log the peer, close the socket and free the slot.
fn teardown(
    slot: usize,
    registry: &Registry,
    slots: &mut SlotTable<ClientConn>,
    reason: CloseReason,
) {
    let Some(mut conn) = slots.release(slot) else {
        return;
    };

    match conn.peer_addr() {
        Some(peer) => info!(
            slot,
            ip = %peer.ip(),
            port = peer.port(),
            reason = ?reason,
            "Client disconnected"
        ),
        None => info!(slot, reason = ?reason, "Client disconnected, unknown peer"),
    }

    if !conn.commands.is_empty() {
        debug!(
            slot,
            bytes = conn.commands.len(),
            partial = %String::from_utf8_lossy(conn.commands.pending()),
            "Discarding undispatched input"
        );
    }

    if let Err(e) = registry.deregister(&mut conn.stream) {
        debug!(slot, error = %e, "Failed to deregister connection");
    }
    // Dropping the stream closes the descriptor
}

/// Create a non-blocking listening socket.
fn create_listener(addr: SocketAddr, backlog: i32) -> Result<std::net::TcpListener, ServerError> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )
    .map_err(ServerError::Socket)?;

    socket
        .set_reuse_address(true)
        .map_err(ServerError::SocketOption)?;
    socket
        .set_nonblocking(true)
        .map_err(ServerError::SocketOption)?;
    socket.bind(&addr.into()).map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    socket.listen(backlog).map_err(ServerError::Listen)?;

    Ok(socket.into())
}
