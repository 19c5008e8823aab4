//! Congestion window and retransmission timer
//!
//! Slow start and congestion avoidance follow RFC 4960 section 7.2, the RTO
//! estimator follows RFC 6298. The controller only does arithmetic; the
//! association feeds it acked byte counts, RTT samples and timeouts.

use crate::config::TransportConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CongestionController {
    cwnd: usize,
    ssthresh: usize,
    partial_bytes_acked: usize,
    mtu: usize,
    initial_cwnd: usize,
    max_cwnd: usize,
    ssthresh_floor: usize,
    srtt: Option<Duration>,
    rttvar: Duration,
    rto: Duration,
    min_rto: Duration,
    max_rto: Duration,
    granularity: Duration,
}

impl CongestionController {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            cwnd: config.initial_cwnd,
            ssthresh: config.initial_ssthresh,
            partial_bytes_acked: 0,
            mtu: config.mtu,
            initial_cwnd: config.initial_cwnd,
            max_cwnd: config.max_cwnd,
            ssthresh_floor: config.ssthresh_floor,
            srtt: None,
            rttvar: Duration::ZERO,
            rto: config.initial_rto().clamp(config.min_rto(), config.max_rto()),
            min_rto: config.min_rto(),
            max_rto: config.max_rto(),
            granularity: config.clock_granularity(),
        }
    }

    pub fn cwnd(&self) -> usize {
        self.cwnd
    }

    pub fn ssthresh(&self) -> usize {
        self.ssthresh
    }

    pub fn rto(&self) -> Duration {
        self.rto
    }

    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }

    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    /// Room left in the window. Never negative.
    pub fn available_window(&self, in_flight_bytes: usize) -> usize {
        self.cwnd.saturating_sub(in_flight_bytes)
    }

    /// Applies an acknowledgment of `bytes_acked` new bytes.
    ///
    /// `rtt_sample` must come from a chunk that was sent exactly once.
    pub fn on_ack(&mut self, bytes_acked: usize, rtt_sample: Option<Duration>) {
        if let Some(sample) = rtt_sample {
            self.update_rtt(sample);
        }
        if bytes_acked == 0 {
            return;
        }

        if self.in_slow_start() {
            self.cwnd += bytes_acked.min(self.mtu);
        } else {
            self.partial_bytes_acked += bytes_acked;
            if self.partial_bytes_acked >= self.cwnd {
                self.partial_bytes_acked -= self.cwnd;
                self.cwnd += self.mtu;
            }
        }
        self.cwnd = self.cwnd.min(self.max_cwnd);
    }

    /// Loss recovery after the retransmission timer fired.
    pub fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(self.ssthresh_floor);
        self.cwnd = self.initial_cwnd;
        self.partial_bytes_acked = 0;
        self.rto = (self.rto * 2).min(self.max_rto);
    }

    fn update_rtt(&mut self, sample: Duration) {
        match self.srtt {
            None => {
                self.srtt = Some(sample);
                self.rttvar = sample / 2;
            }
            Some(srtt) => {
                let delta = if srtt > sample {
                    srtt - sample
                } else {
                    sample - srtt
                };
                self.rttvar = (self.rttvar * 3 + delta) / 4;
                self.srtt = Some((srtt * 7 + sample) / 8);
            }
        }

        let srtt = self.srtt.unwrap_or(sample);
        let rto = srtt + self.granularity.max(self.rttvar * 4);
        self.rto = rto.clamp(self.min_rto, self.max_rto);
    }
}
