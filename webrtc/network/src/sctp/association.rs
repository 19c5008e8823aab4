//! Reliable transport session
//!
//! One association per connection. Outbound messages are fragmented into
//! DATA chunks, wait in a bounded buffer, get a TSN when the congestion
//! window admits them and sit in flight until a SACK covers them. Inbound
//! chunks are reordered by TSN and released to the channel layer in order.
//!
//! There is no INIT handshake: both peers start from the configured
//! `initial_tsn` and verification tag.

use super::chunk::{Chunk, DataChunk, GapBlock, SackChunk, StreamResetChunk, tsn_gt};
use super::congestion::CongestionController;
use super::packet::Packet;
use crate::config::{OverflowPolicy, TransportConfig};
use crate::error::{NetworkError, Result};
use logging::Logger;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Gap offsets are 16 bits; chunks further ahead are dropped.
pub const MAX_TSN_LOOKAHEAD: u32 = u16::MAX as u32;
const MAX_REPORTED_DUPLICATES: usize = 16;

/// Result of handing a message to [`Association::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every fragment entered the congestion window.
    Admitted,
    /// At least one fragment is waiting for window space.
    Buffered,
}

/// Snapshot of transport counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportStats {
    pub cwnd: usize,
    pub ssthresh: usize,
    pub in_flight_bytes: usize,
    pub in_flight_count: usize,
    pub buffered_bytes: usize,
    pub buffered_count: usize,
    pub rto_ms: u64,
    pub srtt_ms: Option<f64>,
    pub next_tsn: u32,
    pub cumulative_tsn_ack: u32,
    pub peer_cumulative_tsn: u32,
    pub retransmissions: u64,
}

/// Outcome of processing one SACK
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckSummary {
    pub bytes_acked: usize,
    pub chunks_acked: usize,
}

/// Chunk waiting for window space. Retransmissions keep their TSN.
#[derive(Debug, Clone)]
struct Pending {
    chunk: DataChunk,
    tsn_assigned: bool,
    transmissions: u32,
}

#[derive(Debug, Clone)]
struct InFlight {
    chunk: DataChunk,
    sent_at: Option<Instant>,
    transmissions: u32,
}

/// Reset of one of our outgoing streams, kept until the peer responds.
///
/// `last_tsn` is fixed when the request is first sent, after every
/// message queued on the stream has been given a TSN.
#[derive(Debug, Clone)]
struct OutgoingReset {
    request_seq: u32,
    stream_id: u16,
    last_tsn: Option<u32>,
    sent_at: Option<Instant>,
}

/// Received chunk slot; `None` once an unordered chunk was delivered early.
type ReceiveSlot = Option<DataChunk>;

pub struct Association {
    config: TransportConfig,
    congestion: CongestionController,
    logger: Logger,

    next_tsn: u32,
    outbound_stream_seq: HashMap<u16, u16>,
    buffered: VecDeque<Pending>,
    buffered_bytes: usize,
    in_flight: VecDeque<InFlight>,
    in_flight_bytes: usize,
    /// TSNs admitted but not yet written into a packet
    transmit_queue: VecDeque<u32>,
    control_queue: VecDeque<Chunk>,
    outgoing_resets: Vec<OutgoingReset>,
    cumulative_tsn_ack: u32,
    consecutive_timeouts: u32,
    retransmissions: u64,

    peer_cumulative_tsn: u32,
    received: HashMap<u32, ReceiveSlot>,
    ready: VecDeque<DataChunk>,
    duplicates: Vec<u32>,
    sack_pending: bool,
}

impl Association {
    pub fn new(config: TransportConfig, logger: Logger) -> Self {
        let initial_tsn = config.initial_tsn;
        Self {
            congestion: CongestionController::new(&config),
            config,
            logger,
            next_tsn: initial_tsn,
            outbound_stream_seq: HashMap::new(),
            buffered: VecDeque::new(),
            buffered_bytes: 0,
            in_flight: VecDeque::new(),
            in_flight_bytes: 0,
            transmit_queue: VecDeque::new(),
            control_queue: VecDeque::new(),
            outgoing_resets: Vec::new(),
            cumulative_tsn_ack: initial_tsn.wrapping_sub(1),
            consecutive_timeouts: 0,
            retransmissions: 0,
            peer_cumulative_tsn: initial_tsn.wrapping_sub(1),
            received: HashMap::new(),
            ready: VecDeque::new(),
            duplicates: Vec::new(),
            sack_pending: false,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn congestion(&self) -> &CongestionController {
        &self.congestion
    }

    pub fn in_flight_bytes(&self) -> usize {
        self.in_flight_bytes
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    pub fn available_window(&self) -> usize {
        self.congestion.available_window(self.in_flight_bytes)
    }

    /// Whether `bytes` more would be admitted straight into flight.
    pub fn can_send(&self, bytes: usize) -> bool {
        self.buffered.is_empty() && bytes <= self.available_window()
    }

    /// Fragments `data` and queues it on `stream_id`, admitting as much as
    /// the window and burst limit allow.
    pub fn send(
        &mut self,
        stream_id: u16,
        ppid: u32,
        data: &[u8],
        unordered: bool,
    ) -> Result<SendOutcome> {
        self.make_room(data.len())?;

        let seq = self.outbound_stream_seq.entry(stream_id).or_insert(0);
        let stream_seq = *seq;
        *seq = seq.wrapping_add(1);

        let fragments: Vec<&[u8]> = if data.is_empty() {
            vec![data]
        } else {
            data.chunks(self.config.max_fragment_size).collect()
        };
        let last = fragments.len() - 1;
        for (i, fragment) in fragments.into_iter().enumerate() {
            let mut chunk = DataChunk::new(0, stream_id, stream_seq, ppid, fragment.to_vec());
            chunk.unordered = unordered;
            chunk.beginning = i == 0;
            chunk.ending = i == last;
            self.buffered_bytes += chunk.data.len();
            self.buffered.push_back(Pending {
                chunk,
                tsn_assigned: false,
                transmissions: 0,
            });
        }

        self.flush_buffer();
        Ok(if self.buffered.is_empty() {
            SendOutcome::Admitted
        } else {
            SendOutcome::Buffered
        })
    }

    fn make_room(&mut self, incoming: usize) -> Result<()> {
        let limit = self.config.max_buffered_bytes;
        if self.buffered_bytes + incoming <= limit {
            return Ok(());
        }
        if self.config.overflow_policy == OverflowPolicy::DropOldest && incoming <= limit {
            while self.buffered_bytes + incoming > limit {
                if !self.evict_oldest_message() {
                    break;
                }
            }
            if self.buffered_bytes + incoming <= limit {
                return Ok(());
            }
        }
        Err(NetworkError::BufferFull {
            buffered: self.buffered_bytes,
            limit,
        })
    }

    /// Drops the oldest message none of whose fragments was ever sent.
    fn evict_oldest_message(&mut self) -> bool {
        let Some(start) = self
            .buffered
            .iter()
            .position(|p| !p.tsn_assigned && p.chunk.beginning)
        else {
            return false;
        };
        let mut dropped = 0;
        while let Some(pending) = self.buffered.get(start) {
            if pending.tsn_assigned {
                break;
            }
            let ending = pending.chunk.ending;
            if let Some(removed) = self.buffered.remove(start) {
                self.buffered_bytes -= removed.chunk.data.len();
                dropped += 1;
            }
            if ending {
                break;
            }
        }
        self.logger
            .warn(&format!("Send buffer full, dropped {dropped} oldest chunks"));
        dropped > 0
    }

    /// Moves buffered chunks into flight, strictly FIFO, while the window
    /// has room. Returns how many were admitted.
    pub fn flush_buffer(&mut self) -> usize {
        let mut admitted = 0;
        while admitted < self.config.max_burst {
            let Some(front) = self.buffered.front() else {
                break;
            };
            let len = front.chunk.data.len();
            if self.in_flight_bytes + len > self.congestion.cwnd() {
                break;
            }
            let Some(mut pending) = self.buffered.pop_front() else {
                break;
            };
            self.buffered_bytes -= len;

            if !pending.tsn_assigned {
                pending.chunk.tsn = self.next_tsn;
                self.next_tsn = self.next_tsn.wrapping_add(1);
            }
            self.transmit_queue.push_back(pending.chunk.tsn);
            self.in_flight_bytes += len;
            self.in_flight.push_back(InFlight {
                chunk: pending.chunk,
                sent_at: None,
                transmissions: pending.transmissions,
            });
            admitted += 1;
        }
        admitted
    }

    /// Queues a control chunk for the next outbound packet.
    pub fn queue_control(&mut self, chunk: Chunk) {
        self.control_queue.push_back(chunk);
    }

    /// Requests a reset of our outgoing `stream_id`.
    ///
    /// The request goes out once every message already queued on the
    /// stream holds a TSN, and is repeated on timeout until the peer
    /// responds.
    pub fn reset_stream(&mut self, stream_id: u16, request_seq: u32) {
        self.outgoing_resets.push(OutgoingReset {
            request_seq,
            stream_id,
            last_tsn: None,
            sent_at: None,
        });
    }

    /// Drops the reset the peer has answered. Returns false for unknown
    /// or already answered requests.
    pub fn on_reset_response(&mut self, request_seq: u32) -> bool {
        let before = self.outgoing_resets.len();
        self.outgoing_resets.retain(|r| r.request_seq != request_seq);
        let answered = self.outgoing_resets.len() < before;
        if answered {
            self.consecutive_timeouts = 0;
        }
        answered
    }

    fn reset_due(&self, reset: &OutgoingReset) -> bool {
        reset.sent_at.is_none()
            && (reset.last_tsn.is_some()
                || !self
                    .buffered
                    .iter()
                    .any(|p| p.chunk.stream_id == reset.stream_id && !p.tsn_assigned))
    }

    /// True while any chunk of `stream_id` is buffered or unacknowledged,
    /// or a reset of it awaits the peer's response.
    pub fn has_unacked(&self, stream_id: u16) -> bool {
        self.in_flight.iter().any(|f| f.chunk.stream_id == stream_id)
            || self.buffered.iter().any(|p| p.chunk.stream_id == stream_id)
            || self.outgoing_resets.iter().any(|r| r.stream_id == stream_id)
    }

    pub fn has_pending_output(&self) -> bool {
        self.sack_pending
            || !self.control_queue.is_empty()
            || !self.transmit_queue.is_empty()
            || self.outgoing_resets.iter().any(|r| self.reset_due(r))
    }

    /// Assembles the next outbound packet: pending control chunks and SACK
    /// first, then queued DATA up to the MTU. `None` when nothing is due.
    pub fn poll_transmit(&mut self, now: Instant) -> Option<Packet> {
        if !self.has_pending_output() {
            return None;
        }
        let mtu = self.config.mtu;
        let mut packet = Packet::new(
            self.config.local_port,
            self.config.remote_port,
            self.config.verification_tag,
        );

        while let Some(chunk) = self.control_queue.front() {
            if !packet.is_empty() && packet.wire_len() + chunk.wire_len() > mtu {
                break;
            }
            if let Some(chunk) = self.control_queue.pop_front() {
                packet.add_chunk(chunk);
            }
        }

        for i in 0..self.outgoing_resets.len() {
            if !self.reset_due(&self.outgoing_resets[i]) {
                continue;
            }
            let last_tsn = self.next_tsn.wrapping_sub(1);
            let reset = &mut self.outgoing_resets[i];
            let chunk = StreamResetChunk::request(
                reset.request_seq,
                *reset.last_tsn.get_or_insert(last_tsn),
                vec![reset.stream_id],
            );
            if !packet.is_empty() && packet.wire_len() + chunk.wire_len() > mtu {
                break;
            }
            reset.sent_at = Some(now);
            packet.add_chunk(Chunk::StreamReset(chunk));
        }

        if self.sack_pending {
            let sack = self.build_sack(mtu.saturating_sub(packet.wire_len()));
            if packet.is_empty() || packet.wire_len() + sack.wire_len() <= mtu {
                packet.add_chunk(Chunk::Sack(sack));
                self.sack_pending = false;
            }
        }

        while let Some(&tsn) = self.transmit_queue.front() {
            let Some(entry) = self.in_flight.iter_mut().find(|f| f.chunk.tsn == tsn) else {
                self.transmit_queue.pop_front();
                continue;
            };
            if !packet.is_empty() && packet.wire_len() + entry.chunk.wire_len() > mtu {
                break;
            }
            entry.sent_at = Some(now);
            entry.transmissions += 1;
            if entry.transmissions > 1 {
                self.retransmissions += 1;
            }
            packet.add_chunk(Chunk::Data(entry.chunk.clone()));
            self.transmit_queue.pop_front();
        }

        if packet.is_empty() {
            None
        } else {
            Some(packet)
        }
    }

    /// Removes every chunk the SACK covers, feeds the congestion
    /// controller and admits buffered data into the opened window.
    pub fn process_ack(&mut self, sack: &SackChunk, now: Instant) -> AckSummary {
        if tsn_gt(self.cumulative_tsn_ack, sack.cumulative_tsn) {
            self.logger.debug(&format!(
                "Ignoring stale SACK {} (cumulative ack {})",
                sack.cumulative_tsn, self.cumulative_tsn_ack
            ));
            return AckSummary::default();
        }
        if tsn_gt(sack.cumulative_tsn, self.next_tsn.wrapping_sub(1)) {
            self.logger.warn(&format!(
                "SACK acknowledges unsent TSN {}",
                sack.cumulative_tsn
            ));
            return AckSummary::default();
        }
        self.cumulative_tsn_ack = sack.cumulative_tsn;

        let mut summary = AckSummary::default();
        let mut rtt_sample: Option<Duration> = None;
        let mut kept = VecDeque::with_capacity(self.in_flight.len());
        for entry in self.in_flight.drain(..) {
            if sack.acknowledges(entry.chunk.tsn) {
                summary.bytes_acked += entry.chunk.data.len();
                summary.chunks_acked += 1;
                if entry.transmissions == 1
                    && let Some(sent_at) = entry.sent_at
                {
                    rtt_sample = Some(now.saturating_duration_since(sent_at));
                }
            } else {
                kept.push_back(entry);
            }
        }
        self.in_flight = kept;
        self.in_flight_bytes -= summary.bytes_acked;

        // Late SACK for chunks already requeued by a timeout.
        let before = self.buffered.len();
        let mut requeued_acked = 0;
        self.buffered.retain(|p| {
            let acked = p.tsn_assigned && sack.acknowledges(p.chunk.tsn);
            if acked {
                requeued_acked += p.chunk.data.len();
            }
            !acked
        });
        self.buffered_bytes -= requeued_acked;
        summary.chunks_acked += before - self.buffered.len();
        summary.bytes_acked += requeued_acked;

        if summary.chunks_acked > 0 {
            self.consecutive_timeouts = 0;
        }
        self.congestion.on_ack(summary.bytes_acked, rtt_sample);
        self.flush_buffer();
        summary
    }

    /// When the oldest outstanding chunk or unanswered reset request times
    /// out, if there is one.
    pub fn timeout_deadline(&self) -> Option<Instant> {
        self.in_flight
            .iter()
            .filter_map(|f| f.sent_at)
            .chain(self.outgoing_resets.iter().filter_map(|r| r.sent_at))
            .min()
            .map(|oldest| oldest + self.congestion.rto())
    }

    /// Loss recovery: shrink the window, back off the timer and requeue
    /// every unacked chunk at the head of the buffer with its TSN.
    /// Unanswered reset requests are sent again with their original
    /// `last_tsn`.
    pub fn handle_timeout(&mut self) -> Result<()> {
        let resets_outstanding = self.outgoing_resets.iter().any(|r| r.sent_at.is_some());
        if self.in_flight.is_empty() && !resets_outstanding {
            return Ok(());
        }
        self.consecutive_timeouts += 1;
        if self.consecutive_timeouts > self.config.max_retransmits {
            return Err(NetworkError::RetransmitLimitExceeded {
                attempts: self.consecutive_timeouts,
            });
        }

        self.congestion.on_timeout();
        for reset in &mut self.outgoing_resets {
            reset.sent_at = None;
        }
        let count = self.in_flight.len();
        while let Some(entry) = self.in_flight.pop_back() {
            self.buffered_bytes += entry.chunk.data.len();
            self.buffered.push_front(Pending {
                chunk: entry.chunk,
                tsn_assigned: true,
                transmissions: entry.transmissions,
            });
        }
        self.in_flight_bytes = 0;
        self.transmit_queue.clear();

        self.logger.debug(&format!(
            "Retransmission timeout #{}: requeued {count} chunks, cwnd {} rto {:?}",
            self.consecutive_timeouts,
            self.congestion.cwnd(),
            self.congestion.rto()
        ));
        self.flush_buffer();
        Ok(())
    }

    /// Stores an inbound DATA chunk and schedules a SACK.
    pub fn handle_data(&mut self, chunk: DataChunk) {
        self.sack_pending = true;
        let tsn = chunk.tsn;
        if !tsn_gt(tsn, self.peer_cumulative_tsn) || self.received.contains_key(&tsn) {
            self.duplicates.push(tsn);
            return;
        }
        if tsn.wrapping_sub(self.peer_cumulative_tsn) > MAX_TSN_LOOKAHEAD {
            self.logger
                .warn(&format!("Dropping DATA with TSN {tsn} far beyond window"));
            return;
        }

        if chunk.unordered && chunk.beginning && chunk.ending {
            self.ready.push_back(chunk);
            self.received.insert(tsn, None);
        } else {
            self.received.insert(tsn, Some(chunk));
        }

        let mut next = self.peer_cumulative_tsn.wrapping_add(1);
        while let Some(slot) = self.received.remove(&next) {
            if let Some(chunk) = slot {
                self.ready.push_back(chunk);
            }
            self.peer_cumulative_tsn = next;
            next = next.wrapping_add(1);
        }
    }

    /// Highest TSN up to which everything from the peer has arrived.
    pub fn peer_cumulative_tsn(&self) -> u32 {
        self.peer_cumulative_tsn
    }

    /// Next chunk released for delivery, in TSN order.
    pub fn poll_received(&mut self) -> Option<DataChunk> {
        self.ready.pop_front()
    }

    fn build_sack(&mut self, budget: usize) -> SackChunk {
        let held: usize = self
            .received
            .values()
            .flatten()
            .map(|c| c.data.len())
            .sum();
        let a_rwnd = self.config.max_buffered_bytes.saturating_sub(held) as u32;
        let mut sack = SackChunk::new(self.peer_cumulative_tsn, a_rwnd);

        let mut offsets: Vec<u32> = self
            .received
            .keys()
            .map(|tsn| tsn.wrapping_sub(self.peer_cumulative_tsn))
            .collect();
        offsets.sort_unstable();
        for offset in offsets {
            let offset = offset as u16;
            match sack.gap_blocks.last_mut() {
                Some(block) if block.end.wrapping_add(1) == offset => block.end = offset,
                _ => sack.gap_blocks.push(GapBlock {
                    start: offset,
                    end: offset,
                }),
            }
        }

        let max_entries = budget.saturating_sub(16) / 4;
        sack.gap_blocks.truncate(max_entries);
        let dup_room = max_entries
            .saturating_sub(sack.gap_blocks.len())
            .min(MAX_REPORTED_DUPLICATES);
        sack.duplicate_tsns = self.duplicates.drain(..).take(dup_room).collect();
        sack
    }

    /// Drops all queued and in-flight data. Used on close.
    pub fn reset(&mut self) {
        self.buffered.clear();
        self.buffered_bytes = 0;
        self.in_flight.clear();
        self.in_flight_bytes = 0;
        self.transmit_queue.clear();
        self.control_queue.clear();
        self.outgoing_resets.clear();
        self.received.clear();
        self.ready.clear();
        self.duplicates.clear();
        self.sack_pending = false;
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            cwnd: self.congestion.cwnd(),
            ssthresh: self.congestion.ssthresh(),
            in_flight_bytes: self.in_flight_bytes,
            in_flight_count: self.in_flight.len(),
            buffered_bytes: self.buffered_bytes,
            buffered_count: self.buffered.len(),
            rto_ms: self.congestion.rto().as_millis() as u64,
            srtt_ms: self.congestion.srtt().map(|d| d.as_secs_f64() * 1000.0),
            next_tsn: self.next_tsn,
            cumulative_tsn_ack: self.cumulative_tsn_ack,
            peer_cumulative_tsn: self.peer_cumulative_tsn,
            retransmissions: self.retransmissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sctp::chunk::ppid;

    fn association(config: TransportConfig) -> Association {
        Association::new(config, Logger::disabled())
    }

    fn data_chunks(packet: &Packet) -> Vec<DataChunk> {
        packet
            .chunks
            .iter()
            .filter_map(|c| match c {
                Chunk::Data(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    fn resets_of(packet: &Packet) -> Vec<StreamResetChunk> {
        packet
            .chunks
            .iter()
            .filter_map(|c| match c {
                Chunk::StreamReset(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    fn sack_of(packet: &Packet) -> Option<SackChunk> {
        packet.chunks.iter().find_map(|c| match c {
            Chunk::Sack(s) => Some(s.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_send_admits_within_window() {
        let mut assoc = association(TransportConfig::default());
        let outcome = assoc.send(0, ppid::STRING, b"hello", false).unwrap();
        assert_eq!(outcome, SendOutcome::Admitted);
        assert_eq!(assoc.in_flight_bytes(), 5);
        assert!(assoc.timeout_deadline().is_none());

        let now = Instant::now();
        let packet = assoc.poll_transmit(now).unwrap();
        let chunks = data_chunks(&packet);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].tsn, 0);
        assert_eq!(chunks[0].data, b"hello");
        assert_eq!(assoc.timeout_deadline(), Some(now + Duration::from_secs(1)));
        assert!(assoc.poll_transmit(now).is_none());
    }

    #[test]
    fn test_fragmentation_flags() {
        let config = TransportConfig {
            max_fragment_size: 4,
            ..TransportConfig::default()
        };
        let mut assoc = association(config);
        assoc.send(2, ppid::BINARY, b"0123456789", false).unwrap();
        let packet = assoc.poll_transmit(Instant::now()).unwrap();
        let chunks = data_chunks(&packet);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].beginning && !chunks[0].ending);
        assert!(!chunks[1].beginning && !chunks[1].ending);
        assert!(!chunks[2].beginning && chunks[2].ending);
        assert_eq!(
            chunks.iter().map(|c| c.tsn).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(chunks.iter().all(|c| c.stream_seq == 0));
    }

    #[test]
    fn test_window_full_buffers() {
        let mut assoc = association(TransportConfig::default());
        let big = vec![7u8; 6000];
        let outcome = assoc.send(0, ppid::BINARY, &big, false).unwrap();
        assert_eq!(outcome, SendOutcome::Buffered);
        assert!(assoc.in_flight_bytes() <= assoc.congestion().cwnd());
        assert_eq!(assoc.in_flight_bytes() + assoc.buffered_bytes(), 6000);
        assert!(!assoc.can_send(1));
    }

    #[test]
    fn test_ack_releases_window_and_drains_buffer() {
        let mut assoc = association(TransportConfig::default());
        assoc.send(0, ppid::BINARY, &vec![1u8; 6000], false).unwrap();
        let now = Instant::now();
        let packet = assoc.poll_transmit(now).unwrap();
        let sent = data_chunks(&packet);
        let last = sent.last().unwrap().tsn;

        let summary = assoc.process_ack(&SackChunk::new(last, 65535), now + Duration::from_millis(50));
        assert_eq!(summary.chunks_acked, sent.len());
        assert_eq!(assoc.buffered_bytes(), 0);
        assert!(assoc.congestion().cwnd() > 4800);
        assert_eq!(
            assoc.congestion().srtt(),
            Some(Duration::from_millis(50))
        );
    }

    #[test]
    fn test_gap_ack_removes_selected_chunks() {
        let config = TransportConfig {
            max_fragment_size: 10,
            ..TransportConfig::default()
        };
        let mut assoc = association(config);
        assoc.send(0, ppid::BINARY, &[0u8; 30], false).unwrap();
        assoc.poll_transmit(Instant::now()).unwrap();

        // TSN 0 and 2 received, 1 missing.
        let mut sack = SackChunk::new(0, 1000);
        sack.gap_blocks.push(GapBlock { start: 2, end: 2 });
        let summary = assoc.process_ack(&sack, Instant::now());
        assert_eq!(summary.chunks_acked, 2);
        assert_eq!(assoc.stats().in_flight_count, 1);
        assert!(assoc.has_unacked(0));
    }

    #[test]
    fn test_timeout_requeues_with_original_tsn() {
        let mut assoc = association(TransportConfig::default());
        assoc.send(0, ppid::STRING, b"a", false).unwrap();
        assoc.send(0, ppid::STRING, b"b", false).unwrap();
        let t0 = Instant::now();
        assoc.poll_transmit(t0).unwrap();

        assoc.handle_timeout().unwrap();
        assert_eq!(assoc.congestion().cwnd(), 4800);
        assert_eq!(assoc.congestion().rto(), Duration::from_secs(2));

        let packet = assoc.poll_transmit(t0 + Duration::from_secs(1)).unwrap();
        let resent = data_chunks(&packet);
        assert_eq!(
            resent.iter().map(|c| c.tsn).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(assoc.stats().retransmissions, 2);

        // Karn: the retransmitted chunks give no RTT sample.
        assoc.process_ack(&SackChunk::new(1, 1000), t0 + Duration::from_secs(2));
        assert!(assoc.congestion().srtt().is_none());
        assert!(!assoc.has_unacked(0));
    }

    #[test]
    fn test_retransmit_limit() {
        let config = TransportConfig {
            max_retransmits: 2,
            ..TransportConfig::default()
        };
        let mut assoc = association(config);
        assoc.send(0, ppid::STRING, b"x", false).unwrap();
        assoc.poll_transmit(Instant::now());
        assert!(assoc.handle_timeout().is_ok());
        assert!(assoc.handle_timeout().is_ok());
        assert!(matches!(
            assoc.handle_timeout(),
            Err(NetworkError::RetransmitLimitExceeded { attempts: 3 })
        ));
    }

    #[test]
    fn test_timeout_with_nothing_in_flight_is_noop() {
        let mut assoc = association(TransportConfig::default());
        assoc.handle_timeout().unwrap();
        assert_eq!(assoc.congestion().rto(), Duration::from_secs(1));
    }

    #[test]
    fn test_buffer_cap_reject_newest() {
        let config = TransportConfig {
            max_buffered_bytes: 8000,
            ..TransportConfig::default()
        };
        let mut assoc = association(config);
        assoc.send(0, ppid::BINARY, &vec![0u8; 7000], false).unwrap();
        let err = assoc.send(0, ppid::BINARY, &vec![0u8; 6000], false).unwrap_err();
        assert!(matches!(err, NetworkError::BufferFull { limit: 8000, .. }));
    }

    #[test]
    fn test_buffer_cap_drop_oldest() {
        let config = TransportConfig {
            max_buffered_bytes: 3000,
            max_fragment_size: 1000,
            initial_cwnd: 2000,
            overflow_policy: OverflowPolicy::DropOldest,
            ..TransportConfig::default()
        };
        let mut assoc = association(config);
        let t0 = Instant::now();
        assoc.send(0, ppid::BINARY, &[1u8; 2000], false).unwrap();
        while assoc.poll_transmit(t0).is_some() {}
        assoc.process_ack(&SackChunk::new(1, 65535), t0 + Duration::from_millis(50));
        assert_eq!(assoc.congestion().cwnd(), 3200);

        // TSNs 2..=4, then a timeout leaves TSN 4 requeued behind a full window.
        assoc.send(0, ppid::BINARY, &[2u8; 3000], false).unwrap();
        while assoc.poll_transmit(t0).is_some() {}
        assoc.handle_timeout().unwrap();
        assert_eq!(assoc.in_flight_bytes(), 2000);
        assert_eq!(assoc.buffered_bytes(), 1000);

        assoc.send(1, ppid::BINARY, &[3u8; 1000], false).unwrap();
        assoc.send(2, ppid::BINARY, &[4u8; 1000], false).unwrap();
        assert_eq!(assoc.buffered_bytes(), 3000);

        // Full: the oldest never-sent message (stream 1) goes, the requeued
        // retransmission stays.
        assoc.send(3, ppid::BINARY, &[5u8; 1000], false).unwrap();
        assert_eq!(assoc.buffered_bytes(), 3000);
        assert_eq!(assoc.stats().buffered_count, 3);

        assoc.process_ack(&SackChunk::new(3, 65535), t0 + Duration::from_secs(2));
        assert_eq!(assoc.buffered_bytes(), 0);
        let mut sent = Vec::new();
        while let Some(packet) = assoc.poll_transmit(t0 + Duration::from_secs(2)) {
            sent.extend(data_chunks(&packet));
        }
        assert_eq!(sent.iter().map(|c| c.tsn).collect::<Vec<_>>(), vec![4, 5, 6]);
        assert_eq!(
            sent.iter().map(|c| c.stream_id).collect::<Vec<_>>(),
            vec![0, 2, 3]
        );
        assert_eq!(sent[0].data[0], 2);
    }

    #[test]
    fn test_stream_reset_waits_for_buffered_data() {
        let mut assoc = association(TransportConfig::default());
        let t0 = Instant::now();
        assoc.send(0, ppid::BINARY, &vec![0u8; 6000], false).unwrap();
        assert!(assoc.buffered_bytes() > 0);
        assoc.reset_stream(0, 7);

        let mut last_sent = 0;
        while let Some(packet) = assoc.poll_transmit(t0) {
            assert!(resets_of(&packet).is_empty());
            last_sent = data_chunks(&packet).last().map_or(last_sent, |c| c.tsn);
        }
        assert_eq!(last_sent, 3);

        assoc.process_ack(&SackChunk::new(3, 65535), t0 + Duration::from_millis(50));
        let mut resets = Vec::new();
        let mut last_tsn = 0;
        while let Some(packet) = assoc.poll_transmit(t0 + Duration::from_millis(50)) {
            resets.extend(resets_of(&packet));
            last_tsn = data_chunks(&packet).last().map_or(last_tsn, |c| c.tsn);
        }
        assert_eq!(last_tsn, 5);
        assert_eq!(resets.len(), 1);
        assert_eq!(resets[0].request_seq, 7);
        assert_eq!(resets[0].last_tsn, 5);
        assert_eq!(resets[0].stream_ids, vec![0]);

        assoc.process_ack(&SackChunk::new(5, 65535), t0 + Duration::from_millis(100));
        assert!(assoc.has_unacked(0));
        assert!(assoc.on_reset_response(7));
        assert!(!assoc.has_unacked(0));
        assert!(!assoc.on_reset_response(7));
    }

    #[test]
    fn test_stream_reset_resent_until_answered() {
        let mut assoc = association(TransportConfig::default());
        let t0 = Instant::now();
        assoc.reset_stream(2, 1);
        let first = resets_of(&assoc.poll_transmit(t0).unwrap());
        assert_eq!(first.len(), 1);
        assert!(assoc.poll_transmit(t0).is_none());
        assert_eq!(assoc.timeout_deadline(), Some(t0 + Duration::from_secs(1)));

        assoc.handle_timeout().unwrap();
        let t1 = t0 + Duration::from_secs(1);
        let again = resets_of(&assoc.poll_transmit(t1).unwrap());
        assert_eq!(again, first);
        assert_eq!(assoc.timeout_deadline(), Some(t1 + Duration::from_secs(2)));

        assert!(assoc.on_reset_response(1));
        assert!(assoc.timeout_deadline().is_none());
        assert!(!assoc.has_unacked(2));
    }

    #[test]
    fn test_receive_reorders_and_reports_gaps() {
        let mut assoc = association(TransportConfig::default());
        assoc.handle_data(DataChunk::new(1, 0, 1, ppid::STRING, b"second".to_vec()));
        assert!(assoc.poll_received().is_none());

        let packet = assoc.poll_transmit(Instant::now()).unwrap();
        let sack = sack_of(&packet).unwrap();
        assert_eq!(sack.cumulative_tsn, u32::MAX);
        assert_eq!(sack.gap_blocks, vec![GapBlock { start: 2, end: 2 }]);

        assoc.handle_data(DataChunk::new(0, 0, 0, ppid::STRING, b"first".to_vec()));
        assert_eq!(assoc.poll_received().unwrap().data, b"first");
        assert_eq!(assoc.poll_received().unwrap().data, b"second");

        let sack = sack_of(&assoc.poll_transmit(Instant::now()).unwrap()).unwrap();
        assert_eq!(sack.cumulative_tsn, 1);
        assert!(sack.gap_blocks.is_empty());
    }

    #[test]
    fn test_duplicate_data_reacknowledged() {
        let mut assoc = association(TransportConfig::default());
        assoc.handle_data(DataChunk::new(0, 0, 0, ppid::STRING, b"x".to_vec()));
        assoc.poll_transmit(Instant::now());
        assoc.handle_data(DataChunk::new(0, 0, 0, ppid::STRING, b"x".to_vec()));
        assert_eq!(assoc.poll_received().unwrap().data, b"x");
        assert!(assoc.poll_received().is_none());

        let sack = sack_of(&assoc.poll_transmit(Instant::now()).unwrap()).unwrap();
        assert_eq!(sack.duplicate_tsns, vec![0]);
    }

    #[test]
    fn test_unordered_delivered_early() {
        let mut assoc = association(TransportConfig::default());
        let mut chunk = DataChunk::new(3, 1, 0, ppid::BINARY, vec![9]);
        chunk.unordered = true;
        assoc.handle_data(chunk);
        assert_eq!(assoc.poll_received().unwrap().data, vec![9]);
    }

    #[test]
    fn test_sack_bundled_with_data() {
        let mut assoc = association(TransportConfig::default());
        assoc.handle_data(DataChunk::new(0, 1, 0, ppid::STRING, b"in".to_vec()));
        assoc.send(0, ppid::STRING, b"out", false).unwrap();
        let packet = assoc.poll_transmit(Instant::now()).unwrap();
        assert!(matches!(packet.chunks[0], Chunk::Sack(_)));
        assert!(matches!(packet.chunks[1], Chunk::Data(_)));
        assert!(packet.wire_len() <= 1200);
    }

    #[test]
    fn test_stale_sack_ignored() {
        let mut assoc = association(TransportConfig::default());
        assoc.send(0, ppid::STRING, b"a", false).unwrap();
        assoc.send(0, ppid::STRING, b"b", false).unwrap();
        assoc.poll_transmit(Instant::now());
        assoc.process_ack(&SackChunk::new(1, 1000), Instant::now());
        let summary = assoc.process_ack(&SackChunk::new(0, 1000), Instant::now());
        assert_eq!(summary, AckSummary::default());
    }

    #[test]
    fn test_reset_releases_accounting() {
        let mut assoc = association(TransportConfig::default());
        assoc.send(0, ppid::BINARY, &vec![0u8; 9000], false).unwrap();
        assoc.reset();
        let stats = assoc.stats();
        assert_eq!(stats.in_flight_bytes, 0);
        assert_eq!(stats.buffered_bytes, 0);
        assert!(assoc.poll_transmit(Instant::now()).is_none());
    }
}
