//! Connection aggregate
//!
//! One [`Connection`] per peer. Outbound, channel messages go through the
//! association, which builds packets, and each packet is sealed into one
//! record. Inbound, a record is authenticated, its packet decoded and every
//! chunk dispatched.
//!
//! The connection never blocks and never reads a clock of its own: the
//! caller drives it with [`handle_datagram`](Connection::handle_datagram),
//! [`flush_outgoing`](Connection::flush_outgoing) and
//! [`poll_timers`](Connection::poll_timers).

use super::channel::{DataChannel, DataChannelConfig, DataChannelState, Message, Reassembly};
use super::event::DataChannelEvent;
use super::status::{ChannelStatus, ConnectionState, ConnectionStatus};
use crate::config::ConnectionConfig;
use crate::error::{NetworkError, Result};
use crate::sctp::{
    Association, Chunk, DataChannelOpen, DataChunk, DcepMessage, MAX_TSN_LOOKAHEAD, Packet,
    SendOutcome, StreamResetChunk, TransportStats, ppid, tsn_gte,
};
use crate::security::dtls::{
    CONTENT_TYPE_APPLICATION_DATA, DTLS_1_2_VERSION, MAX_SEQUENCE_NUMBER, RECORD_HEADER_LEN,
};
use crate::security::{CipherSuite, KeyMaterial, RecordHeader, ReplayWindow, SecurityContext};
use crate::transport::DatagramSocket;
use crate::utils::{Clock, SystemClock};
use logging::Logger;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Largest datagram [`Connection::receive_from`] accepts
const MAX_DATAGRAM_LEN: usize = 65536;
/// Peer reset requests held while their data is still arriving.
const MAX_PENDING_RESETS: usize = 128;

/// Application callback, invoked with `(channel_id, payload)`
pub type MessageHandler = Box<dyn FnMut(u16, &[u8]) + Send>;

pub struct Connection {
    config: ConnectionConfig,
    state: ConnectionState,
    security: SecurityContext,
    association: Association,

    channels: BTreeMap<u16, DataChannel>,
    labels: HashMap<String, u16>,
    next_channel_id: Option<u16>,
    used_ids: HashSet<u16>,
    reset_seq: u32,
    /// Peer resets waiting for the data sent before them
    pending_resets: Vec<StreamResetChunk>,

    outbound: VecDeque<Vec<u8>>,
    events: VecDeque<DataChannelEvent>,
    handler: Option<MessageHandler>,

    write_epoch: u16,
    write_seq: u64,
    read_epoch: u16,
    replay: ReplayWindow,
    auth_failures: u32,

    clock: Box<dyn Clock>,
    logger: Logger,
}

impl Connection {
    /// Creates a connection with the system clock and the logger described
    /// by `config.logging`.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let logger = config.logging.build("connection")?;
        Self::with_parts(config, Box::new(SystemClock), logger)
    }

    /// Creates a connection with an explicit clock and logger.
    pub fn with_parts(
        config: ConnectionConfig,
        clock: Box<dyn Clock>,
        logger: Logger,
    ) -> Result<Self> {
        config.validate()?;
        let role = config.role;
        let association = Association::new(config.transport.clone(), logger.for_component("sctp"));
        Ok(Self {
            state: ConnectionState::New,
            security: SecurityContext::new(role),
            association,
            channels: BTreeMap::new(),
            labels: HashMap::new(),
            next_channel_id: Some(role.first_channel_id()),
            used_ids: HashSet::new(),
            reset_seq: 0,
            pending_resets: Vec::new(),
            outbound: VecDeque::new(),
            events: VecDeque::new(),
            handler: None,
            write_epoch: 0,
            write_seq: 0,
            read_epoch: 0,
            replay: ReplayWindow::new(),
            auth_failures: 0,
            clock,
            logger: logger.for_component("connection"),
            config,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    pub fn association(&self) -> &Association {
        &self.association
    }

    /// Marks the connection usable for channel operations.
    pub fn connect(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::New => {
                self.state = ConnectionState::Connected;
                self.logger.info(&format!(
                    "Connection established as {:?}",
                    self.config.role
                ));
                Ok(())
            }
            ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => Err(NetworkError::ConnectionClosed),
        }
    }

    /// Installs keys from an external handshake. Both directions move to
    /// epoch 1 and sequence numbers restart.
    pub fn install_keys(&mut self, suite: CipherSuite, keys: KeyMaterial) -> Result<()> {
        self.security.install_keys(suite, keys)?;
        self.enter_next_epoch();
        self.logger
            .info(&format!("Record protection enabled with {suite:?}"));
        Ok(())
    }

    /// Derives and installs keys from a pre-master secret and both randoms.
    pub fn establish_keys(
        &mut self,
        suite: CipherSuite,
        pre_master_secret: &[u8],
        client_random: &[u8; 32],
        server_random: &[u8; 32],
    ) -> Result<()> {
        self.security
            .establish(suite, pre_master_secret, client_random, server_random)?;
        self.enter_next_epoch();
        self.logger
            .info(&format!("Record protection enabled with {suite:?}"));
        Ok(())
    }

    fn enter_next_epoch(&mut self) {
        self.write_epoch = self.write_epoch.wrapping_add(1);
        self.read_epoch = self.read_epoch.wrapping_add(1);
        self.write_seq = 0;
        self.replay.reset();
        self.auth_failures = 0;
    }

    fn ensure_connected(&self) -> Result<()> {
        match self.state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::New => Err(NetworkError::NotConnected),
            ConnectionState::Closed => Err(NetworkError::ConnectionClosed),
        }
    }

    /// Creates a reliable ordered channel. A negotiated channel is open
    /// immediately; otherwise an open request is sent and the channel stays
    /// `Connecting` until the peer acks.
    pub fn create_channel(&mut self, label: &str, negotiated: bool) -> Result<u16> {
        let config = DataChannelConfig {
            negotiated,
            ..DataChannelConfig::reliable(label)
        };
        self.create_channel_with(config)
    }

    pub fn create_channel_with(&mut self, config: DataChannelConfig) -> Result<u16> {
        self.ensure_connected()?;

        let id = match config.id {
            Some(_) if !config.negotiated => {
                return Err(NetworkError::Config(
                    "explicit channel ids require a negotiated channel".to_string(),
                ));
            }
            Some(id) if self.used_ids.contains(&id) => {
                return Err(NetworkError::ProtocolViolation(format!(
                    "channel id {id} already used"
                )));
            }
            Some(id) => id,
            None => self.allocate_channel_id()?,
        };

        let state = if config.negotiated {
            DataChannelState::Open
        } else {
            let open = DataChannelOpen::new(
                config.label.clone(),
                config.protocol.clone(),
                config.ordered,
            );
            self.association
                .send(id, ppid::DCEP, &DcepMessage::Open(open).to_bytes(), false)?;
            DataChannelState::Connecting
        };

        self.logger.info(&format!(
            "Created channel {id} '{}' ({})",
            config.label,
            if config.negotiated { "negotiated" } else { "in-band" }
        ));
        self.insert_channel(DataChannel::new(id, config, state));
        Ok(id)
    }

    /// Next free id of our parity. Ids are never reused.
    fn allocate_channel_id(&mut self) -> Result<u16> {
        loop {
            let id = self.next_channel_id.ok_or_else(|| {
                NetworkError::Network("channel ids exhausted".to_string())
            })?;
            self.next_channel_id = id.checked_add(2);
            if !self.used_ids.contains(&id) {
                return Ok(id);
            }
        }
    }

    fn insert_channel(&mut self, channel: DataChannel) {
        let id = channel.id();
        let label_free = match self.labels.get(channel.label()) {
            Some(existing) => self
                .channels
                .get(existing)
                .is_none_or(|c| c.state() == DataChannelState::Closed),
            None => true,
        };
        if label_free {
            self.labels.insert(channel.label().to_string(), id);
        }
        self.used_ids.insert(id);
        self.channels.insert(id, channel);
    }

    pub fn get_channel(&self, id: u16) -> Option<&DataChannel> {
        self.channels.get(&id)
    }

    pub fn find_channel_by_label(&self, label: &str) -> Option<&DataChannel> {
        self.labels.get(label).and_then(|id| self.channels.get(id))
    }

    pub fn channels(&self) -> impl Iterator<Item = &DataChannel> {
        self.channels.values()
    }

    pub fn send_text(&mut self, channel_id: u16, text: &str) -> Result<SendOutcome> {
        self.send_message(channel_id, text.as_bytes(), ppid::STRING, ppid::STRING_EMPTY)
    }

    pub fn send_binary(&mut self, channel_id: u16, data: &[u8]) -> Result<SendOutcome> {
        self.send_message(channel_id, data, ppid::BINARY, ppid::BINARY_EMPTY)
    }

    fn send_message(
        &mut self,
        channel_id: u16,
        data: &[u8],
        ppid_value: u32,
        empty_ppid: u32,
    ) -> Result<SendOutcome> {
        self.ensure_connected()?;
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(NetworkError::ChannelNotFound(channel_id))?;
        if !channel.is_open() {
            return Err(NetworkError::ChannelNotOpen {
                id: channel_id,
                state: channel.state(),
            });
        }

        // Empty messages travel as one zero byte with a dedicated PPID.
        let (ppid_value, payload) = if data.is_empty() {
            (empty_ppid, &[0u8][..])
        } else {
            (ppid_value, data)
        };
        let outcome =
            self.association
                .send(channel_id, ppid_value, payload, !channel.is_ordered())?;
        channel.record_sent(data.len());
        Ok(outcome)
    }

    /// Pops the next message queued on a channel that had no handler.
    pub fn recv(&mut self, channel_id: u16) -> Result<Option<Message>> {
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(NetworkError::ChannelNotFound(channel_id))?;
        Ok(channel.recv())
    }

    /// Registers the message handler, replacing any previous one.
    pub fn on_message<F>(&mut self, handler: F)
    where
        F: FnMut(u16, &[u8]) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Starts closing a channel. It becomes `Closed` once none of its data
    /// is left unacknowledged and the peer has confirmed the stream reset.
    pub fn close_channel(&mut self, channel_id: u16) -> Result<()> {
        self.ensure_connected()?;
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(NetworkError::ChannelNotFound(channel_id))?;
        if matches!(
            channel.state(),
            DataChannelState::Closing | DataChannelState::Closed
        ) {
            return Ok(());
        }

        channel.on_closing();
        self.association.reset_stream(channel_id, self.reset_seq);
        self.reset_seq = self.reset_seq.wrapping_add(1);
        self.logger.info(&format!("Closing channel {channel_id}"));
        self.reap_closing_channels();
        Ok(())
    }

    fn reap_closing_channels(&mut self) {
        let done: Vec<u16> = self
            .channels
            .values()
            .filter(|c| c.state() == DataChannelState::Closing)
            .map(DataChannel::id)
            .filter(|id| !self.association.has_unacked(*id))
            .collect();
        for id in done {
            self.mark_channel_closed(id);
        }
    }

    fn mark_channel_closed(&mut self, id: u16) {
        if let Some(channel) = self.channels.get_mut(&id)
            && channel.state() != DataChannelState::Closed
        {
            channel.on_closed();
            self.events.push_back(DataChannelEvent::ChannelClosed { id });
            self.logger.info(&format!("Channel {id} closed"));
        }
    }

    /// Tears the connection down. Every channel becomes `Closed`, buffered
    /// and in-flight data is released and the handler is dropped, so no
    /// message is delivered after this returns. A final ABORT datagram is
    /// left for [`flush_outgoing`](Self::flush_outgoing). Calling it again
    /// does nothing.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        let was_connected = self.state == ConnectionState::Connected;
        self.teardown();
        if was_connected {
            self.queue_abort();
        }
        self.logger.info("Connection closed");
    }

    fn teardown(&mut self) {
        self.handler = None;
        self.pending_resets.clear();
        let ids: Vec<u16> = self.channels.keys().copied().collect();
        for id in ids {
            self.mark_channel_closed(id);
        }
        self.association.reset();
        self.state = ConnectionState::Closed;
        self.events.push_back(DataChannelEvent::ConnectionClosed);
    }

    fn queue_abort(&mut self) {
        let transport = &self.config.transport;
        let mut packet = Packet::new(
            transport.local_port,
            transport.remote_port,
            transport.verification_tag,
        );
        packet.add_chunk(Chunk::Abort);
        match self.seal(&packet.to_bytes()) {
            Ok(datagram) => self.outbound.push_back(datagram),
            Err(e) => self.logger.warn(&format!("Could not seal ABORT: {e}")),
        }
    }

    /// Every datagram ready to go out right now.
    pub fn flush_outgoing(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut datagrams = Vec::new();
        while let Some(datagram) = self.create_sctp_packet()? {
            datagrams.push(datagram);
        }
        Ok(datagrams)
    }

    /// One sealed datagram, or `None` when nothing is pending.
    pub fn create_sctp_packet(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(datagram) = self.outbound.pop_front() {
            return Ok(Some(datagram));
        }
        if self.state != ConnectionState::Connected {
            return Ok(None);
        }
        let Some(packet) = self.association.poll_transmit(self.clock.now()) else {
            return Ok(None);
        };
        let bytes = packet.to_bytes();
        self.logger.debug(&format!(
            "Sending packet with {} chunks ({} bytes)",
            packet.chunks.len(),
            bytes.len()
        ));
        self.seal(&bytes).map(Some)
    }

    /// Wraps `payload` in one record with the next write sequence number.
    fn seal(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        if self.write_seq > MAX_SEQUENCE_NUMBER {
            return Err(NetworkError::Network(
                "record sequence numbers exhausted; install new keys".to_string(),
            ));
        }
        let fragment = self.security.encrypt_record(
            self.write_epoch,
            self.write_seq,
            CONTENT_TYPE_APPLICATION_DATA,
            DTLS_1_2_VERSION,
            payload,
        )?;
        let length = u16::try_from(fragment.len()).map_err(|_| {
            NetworkError::InvalidPacket(format!("record of {} bytes too long", fragment.len()))
        })?;
        let header = RecordHeader {
            content_type: CONTENT_TYPE_APPLICATION_DATA,
            version: DTLS_1_2_VERSION,
            epoch: self.write_epoch,
            sequence: self.write_seq,
            length,
        };
        self.write_seq += 1;

        let mut datagram = Vec::with_capacity(RECORD_HEADER_LEN + fragment.len());
        datagram.extend_from_slice(&header.to_bytes());
        datagram.extend_from_slice(&fragment);
        Ok(datagram)
    }

    /// Processes one inbound datagram.
    ///
    /// Records from another epoch and replayed records are dropped. A
    /// record failing authentication is reported as an error; after
    /// `max_auth_failures` failures in a row the error becomes
    /// [`NetworkError::TooManyAuthFailures`] and the caller should close.
    pub fn handle_datagram(&mut self, datagram: &[u8]) -> Result<()> {
        self.ensure_connected()?;

        let (header, fragment) = RecordHeader::parse(datagram)?;
        if header.content_type != CONTENT_TYPE_APPLICATION_DATA
            || header.version != DTLS_1_2_VERSION
        {
            return Err(NetworkError::InvalidPacket(format!(
                "unexpected record type {} version 0x{:04X}",
                header.content_type, header.version
            )));
        }
        if header.epoch != self.read_epoch {
            self.logger.warn(&format!(
                "Dropping record from epoch {} (reading epoch {})",
                header.epoch, self.read_epoch
            ));
            return Ok(());
        }
        // Plaintext records carry no authenticated sequence number.
        let keyed = self.read_epoch > 0;
        if keyed && self.replay.is_replay(header.sequence) {
            self.logger.warn(&format!(
                "Dropping replayed record {}",
                header.sequence
            ));
            return Ok(());
        }

        let plaintext = match self.security.decrypt_record(
            header.epoch,
            header.sequence,
            header.content_type,
            header.version,
            fragment,
        ) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                self.auth_failures += 1;
                self.logger.warn(&format!(
                    "Record {} failed authentication ({} in a row)",
                    header.sequence, self.auth_failures
                ));
                if self.auth_failures >= self.config.max_auth_failures {
                    return Err(NetworkError::TooManyAuthFailures(self.auth_failures));
                }
                return Err(e.into());
            }
        };
        self.auth_failures = 0;
        if keyed {
            self.replay.mark(header.sequence);
        }

        let packet = Packet::from_bytes(&plaintext)?;
        if packet.verification_tag != self.config.transport.verification_tag {
            return Err(NetworkError::InvalidPacket(format!(
                "verification tag 0x{:08X} does not match",
                packet.verification_tag
            )));
        }
        self.logger.debug(&format!(
            "Received packet with {} chunks",
            packet.chunks.len()
        ));

        let now = self.clock.now();
        for chunk in packet.chunks {
            match chunk {
                Chunk::Data(data) => self.association.handle_data(data),
                Chunk::Sack(sack) => {
                    self.association.process_ack(&sack, now);
                }
                Chunk::Abort => {
                    self.logger.info("Peer aborted the connection");
                    self.teardown();
                    return Ok(());
                }
                Chunk::StreamReset(reset) if reset.response => {
                    if !self.association.on_reset_response(reset.request_seq) {
                        self.logger.debug(&format!(
                            "Ignoring response to unknown reset request {}",
                            reset.request_seq
                        ));
                    }
                }
                Chunk::StreamReset(reset) => self.queue_peer_reset(reset),
                Chunk::Unknown { chunk_type, .. } => {
                    self.logger
                        .debug(&format!("Skipping unknown chunk type {chunk_type}"));
                }
            }
        }

        let mut result = Ok(());
        while let Some(chunk) = self.association.poll_received() {
            if let Err(e) = self.deliver(chunk) {
                self.logger.warn(&format!("Rejected inbound data: {e}"));
                self.events.push_back(DataChannelEvent::Error {
                    message: e.to_string(),
                });
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        self.apply_stream_resets();
        self.reap_closing_channels();
        result
    }

    fn queue_peer_reset(&mut self, reset: StreamResetChunk) {
        let received = self.association.peer_cumulative_tsn();
        if !tsn_gte(received, reset.last_tsn)
            && reset.last_tsn.wrapping_sub(received) > MAX_TSN_LOOKAHEAD
        {
            self.logger.warn(&format!(
                "Ignoring reset request {} for TSN {} far beyond {received}",
                reset.request_seq, reset.last_tsn
            ));
            return;
        }
        if self
            .pending_resets
            .iter()
            .any(|pending| pending.request_seq == reset.request_seq)
        {
            return;
        }
        if self.pending_resets.len() >= MAX_PENDING_RESETS {
            self.logger.warn(&format!(
                "Too many pending reset requests, dropping request {}",
                reset.request_seq
            ));
            return;
        }
        self.pending_resets.push(reset);
    }

    /// Closes channels the peer reset, once everything it sent on them
    /// before the reset has been received, and confirms each request.
    /// Repeated requests are confirmed again.
    fn apply_stream_resets(&mut self) {
        let received = self.association.peer_cumulative_tsn();
        let (ready, waiting): (Vec<_>, Vec<_>) = self
            .pending_resets
            .drain(..)
            .partition(|reset| tsn_gte(received, reset.last_tsn));
        self.pending_resets = waiting;
        for reset in ready {
            for &id in &reset.stream_ids {
                self.mark_channel_closed(id);
            }
            self.association
                .queue_control(Chunk::StreamReset(StreamResetChunk::response(
                    reset.request_seq,
                )));
        }
    }

    fn deliver(&mut self, chunk: DataChunk) -> Result<()> {
        let stream_id = chunk.stream_id;
        if chunk.ppid == ppid::DCEP {
            if !(chunk.beginning && chunk.ending) {
                return Err(NetworkError::ProtocolViolation(format!(
                    "fragmented control message on stream {stream_id}"
                )));
            }
            return self.handle_dcep(stream_id, &chunk.data);
        }

        let channel = self
            .channels
            .get_mut(&stream_id)
            .ok_or(NetworkError::ChannelNotFound(stream_id))?;
        if channel.state() == DataChannelState::Closed {
            self.logger
                .debug(&format!("Dropping data for closed channel {stream_id}"));
            return Ok(());
        }
        match channel.on_fragment(chunk, self.config.transport.max_buffered_bytes) {
            Reassembly::Complete(message) => match self.handler.as_mut() {
                Some(handler) => handler(stream_id, &message.data),
                None => channel.push_received(message),
            },
            Reassembly::Partial => {}
            Reassembly::Discarded => {
                self.logger.warn(&format!(
                    "Discarded incomplete or oversized message on channel {stream_id}"
                ));
            }
        }
        Ok(())
    }

    fn handle_dcep(&mut self, stream_id: u16, data: &[u8]) -> Result<()> {
        match DcepMessage::parse(data)? {
            DcepMessage::Open(open) => {
                if self.config.role.owns_channel_id(stream_id) {
                    return Err(NetworkError::ProtocolViolation(format!(
                        "peer opened channel {stream_id} with our parity"
                    )));
                }
                if self.used_ids.contains(&stream_id) {
                    return Err(NetworkError::ProtocolViolation(format!(
                        "peer opened channel {stream_id} which is already in use"
                    )));
                }

                // Acknowledge first so a refused ACK leaves no channel behind.
                self.association
                    .send(stream_id, ppid::DCEP, &DcepMessage::Ack.to_bytes(), false)?;
                let config = DataChannelConfig {
                    label: open.label.clone(),
                    ordered: open.channel_type.is_ordered(),
                    negotiated: false,
                    id: Some(stream_id),
                    protocol: open.protocol,
                };
                self.insert_channel(DataChannel::new(
                    stream_id,
                    config,
                    DataChannelState::Open,
                ));
                self.logger.info(&format!(
                    "Peer opened channel {stream_id} '{}'",
                    open.label
                ));
                self.events.push_back(DataChannelEvent::ChannelOpened {
                    id: stream_id,
                    label: open.label,
                });
            }
            DcepMessage::Ack => {
                let channel = self
                    .channels
                    .get_mut(&stream_id)
                    .ok_or(NetworkError::ChannelNotFound(stream_id))?;
                if channel.state() == DataChannelState::Connecting {
                    channel.on_open();
                    self.logger
                        .info(&format!("Channel {stream_id} acknowledged by peer"));
                    self.events.push_back(DataChannelEvent::ChannelOpened {
                        id: stream_id,
                        label: channel.label().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Runs loss recovery if the retransmission timer has expired.
    /// Returns whether a timeout was handled.
    pub fn poll_timers(&mut self) -> Result<bool> {
        if self.state != ConnectionState::Connected {
            return Ok(false);
        }
        match self.association.timeout_deadline() {
            Some(deadline) if self.clock.now() >= deadline => {
                self.association.handle_timeout()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn timeout_deadline(&self) -> Option<Instant> {
        self.association.timeout_deadline()
    }

    pub fn poll_event(&mut self) -> Option<DataChannelEvent> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<DataChannelEvent> {
        self.events.drain(..).collect()
    }

    /// Flushes and sends every pending datagram to `peer`. Returns how many
    /// were sent.
    pub fn send_pending(
        &mut self,
        socket: &mut dyn DatagramSocket,
        peer: SocketAddr,
    ) -> Result<usize> {
        let datagrams = self.flush_outgoing()?;
        for datagram in &datagrams {
            socket.send_to(datagram, peer)?;
        }
        Ok(datagrams.len())
    }

    /// Waits up to `timeout` for one datagram and processes it. Returns
    /// whether one arrived.
    pub fn receive_from(
        &mut self,
        socket: &mut dyn DatagramSocket,
        timeout: Duration,
    ) -> Result<bool> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        match socket.recv_timeout(&mut buf, timeout)? {
            Some((len, _)) => {
                self.handle_datagram(&buf[..len])?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn stats(&self) -> TransportStats {
        self.association.stats()
    }

    pub fn status(&self) -> ConnectionStatus {
        let channels: Vec<ChannelStatus> = self.channels.values().map(ChannelStatus::from).collect();
        ConnectionStatus {
            role: self.config.role,
            state: self.state,
            connected: self.is_connected(),
            encrypted: self.security.is_active(),
            cipher_suite: self.security.cipher_suite(),
            channel_count: channels.len(),
            open_channels: channels
                .iter()
                .filter(|c| c.state == DataChannelState::Open)
                .count(),
            auth_failures: self.auth_failures,
            transport: self.stats(),
            channels,
        }
    }

    pub fn status_json(&self) -> Result<String> {
        self.status().to_json()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.config.role)
            .field("state", &self.state)
            .field("security", &self.security)
            .field("channels", &self.channels.len())
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}
