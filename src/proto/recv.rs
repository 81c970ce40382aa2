use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, trace};

use super::wire::{self, ACK, DAT};
use super::{dec_seq, lift, project, Endpoint, DATA_WAIT, RECEIVER_IDLE};
use crate::Error;

// Receiver-emitted ACKs advertise a constant full window; the field is
// reserved on the wire and never inspected on receive.
const ACK_WINDOW: u16 = u16::MAX;

impl Endpoint {
    /* Buffer DATA segments keyed by lifted sequence, advance the in-order
     * cursor, and answer every arrival with a cumulative ACK naming the
     * highest in-order sequence. The stream ends once a FIN has been seen
     * and everything below its sequence has arrived. */
    pub fn recv(&mut self) -> Result<Vec<u8>, Error> {
        let mut buffered: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
        let mut recv_base = self.seq_cursor + 1;

        self.last_rx = Instant::now();

        loop {
            if self.last_rx.elapsed() > RECEIVER_IDLE {
                // A recorded FIN beyond the cursor means the sender finished
                // and went away; only a stalled tail kept us here.
                match self.fin_seen {
                    Some(fin) if fin > recv_base => break,
                    _ => return Err(Error::ReceiveIdle(RECEIVER_IDLE)),
                }
            }

            if matches!(self.fin_seen, Some(fin) if recv_base >= fin) {
                break;
            }

            let Some(dgram) = self.wait_for(DAT, DATA_WAIT)? else {
                continue;
            };

            let seq = lift(self.seq_base, dgram.header.seq);
            if seq >= recv_base {
                buffered.entry(seq).or_insert(dgram.payload);
            }
            while buffered.contains_key(&recv_base) {
                recv_base += 1;
            }
            trace!("got segment {seq}, in-order through {}", recv_base - 1);

            /* Cumulative ACK for recv_base - 1. With no progress this repeats
             * the previous ACK, which is what drives the sender's fast
             * retransmit. */
            let ack = wire::seal_control(dec_seq(project(recv_base)), ACK_WINDOW, ACK);
            self.transmit(&ack)?;
        }

        debug!("stream complete, {} segments buffered", buffered.len());

        self.seq_cursor += buffered.len() as u64;

        let mut delivered = Vec::new();
        for payload in buffered.into_values() {
            delivered.extend_from_slice(&payload);
        }
        Ok(delivered)
    }
}
