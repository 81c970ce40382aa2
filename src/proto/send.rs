use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, trace};

use super::wire::{self, ACK};
use super::{
    lift, project, Endpoint, ACK_WAIT, PAYLOAD_MAX, RTO, SENDER_IDLE, SEQ_HALF,
};
use crate::Error;

/* TCP-Reno congestion state: slow start below ssthresh, additive increase
 * above it, multiplicative decrease on loss, fast retransmit on the third
 * duplicate cumulative ACK, and window inflation while in fast recovery. */
#[derive(Debug, Clone)]
pub(crate) struct Reno {
    cwnd: f64,
    ssthresh: f64,
    dup_acks: u32,
    in_fast_recovery: bool,
}

impl Reno {
    pub(crate) fn new() -> Self {
        Reno {
            cwnd: 1.0,
            ssthresh: 65536.0,
            dup_acks: 0,
            in_fast_recovery: false,
        }
    }

    // Segments the window may hold, counted from the unacked base.
    fn window(&self) -> u64 {
        self.cwnd as u64
    }

    fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2.0).max(2.0);
        self.cwnd = 1.0;
        self.dup_acks = 0;
        self.in_fast_recovery = false;
    }

    fn on_new_ack(&mut self) {
        if self.in_fast_recovery {
            // Deflate back to the post-loss threshold.
            self.cwnd = self.ssthresh;
            self.in_fast_recovery = false;
        } else if self.cwnd < self.ssthresh {
            // Slow start.
            self.cwnd += 1.0;
        } else {
            // Congestion avoidance.
            self.cwnd += 1.0 / self.cwnd;
        }
        self.dup_acks = 0;
    }

    // True exactly when the caller must fast-retransmit the window base.
    fn on_dup_ack(&mut self) -> bool {
        if self.in_fast_recovery {
            // Every further duplicate means a segment left the network.
            self.cwnd += 1.0;
            return false;
        }

        self.dup_acks += 1;
        if self.dup_acks < 3 {
            return false;
        }

        self.in_fast_recovery = true;
        self.ssthresh = (self.cwnd / 2.0).max(2.0);
        self.cwnd = self.ssthresh + 3.0;
        true
    }
}

impl Endpoint {
    /* Chunk `data` into PAYLOAD_MAX-sized segments numbered from
     * seq_cursor + 1 and drive the sliding window until everything is
     * cumulatively acknowledged. seq_cursor then advances by the segment
     * count; an empty byte stream sends nothing and advances nothing. */
    pub fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut window: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
        for (i, chunk) in data.chunks(PAYLOAD_MAX).enumerate() {
            let seq = self.seq_cursor + 1 + i as u64;
            window.insert(seq, wire::seal_data(project(seq), 0, chunk));
        }

        let total = window.len() as u64;
        // The lift anchor stays unambiguous only below half the wire space.
        debug_assert!(self.seq_cursor + total - self.seq_base < SEQ_HALF);

        if total > 0 {
            self.drive_window(&window)?;
        }

        self.seq_cursor += total;
        Ok(())
    }

    fn drive_window(&mut self, window: &BTreeMap<u64, Vec<u8>>) -> Result<(), Error> {
        let mut base = self.seq_cursor + 1;
        let highest = self.seq_cursor + window.len() as u64;
        let mut next = base;
        let mut base_sent_at = Instant::now();

        debug!("sending segments [{base}, {highest}]");
        self.last_rx = Instant::now();

        while base <= highest {
            if self.last_rx.elapsed() > SENDER_IDLE {
                return Err(Error::PeerGone(SENDER_IDLE));
            }

            // Fill the congestion window.
            while next < base + self.reno.window() && next <= highest {
                self.transmit(&window[&next])?;
                if next == base {
                    base_sent_at = Instant::now();
                }
                next += 1;
            }

            // A single timer, anchored at the window base. On expiry the
            // whole in-flight range goes out again.
            if base < next && base_sent_at.elapsed() > RTO {
                self.reno.on_timeout();
                debug!("RTO: flushing [{base}, {next}), cwnd back to 1");
                for frame in window.range(base..next).map(|(_, f)| f) {
                    self.transmit(frame)?;
                }
                base_sent_at = Instant::now();
            }

            // The short wait keeps send, timer, and ACK steps interleaved.
            let Some(ack) = self.wait_for(ACK, ACK_WAIT)? else {
                continue;
            };

            let acked = lift(self.seq_base, ack.header.seq);
            if acked + 1 > base {
                // New cumulative ACK: slide the window.
                base = acked + 1;
                if base < next {
                    base_sent_at = Instant::now();
                }
                self.reno.on_new_ack();
                trace!("acked through {acked}, cwnd={:.1}", self.reno.cwnd);
            } else if acked + 1 == base {
                if self.reno.on_dup_ack() {
                    debug!("3 duplicate ACKs for {acked}: fast retransmit of {base}");
                    self.transmit(&window[&base])?;
                    base_sent_at = Instant::now();
                }
            }
            // acked + 1 < base: stale ACK, drop.
        }

        debug!("all segments acknowledged");
        Ok(())
    }
}
