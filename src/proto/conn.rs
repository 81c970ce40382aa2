use std::net::SocketAddr;
use std::time::Instant;

use log::{debug, warn};
use rand::Rng;

use super::send::Reno;
use super::wire::{self, ACK, FIN, FIN_ACK, SYN, SYN_ACK};
use super::{
    inc_seq, project, Endpoint, HANDSHAKE_BUDGET, HANDSHAKE_STEP, MAX_SYN_RETRIES, QUIET_PERIOD,
    SEQ_SPACE, TEARDOWN_BUDGET,
};
use crate::Error;

/*
Connection establishment and teardown, from each endpoint's perspective:

        active opener                          passive opener

          CLOSED                                  CLOSED
             |  snd SYN(x)                           |
         SYN_SENT ----------- SYN ----------> SYN_RECEIVED
             |                                       |  snd SYN|ACK(x+1)
             |  <--------- SYN|ACK(x+1) -------------|
             |  snd ACK(x+1)                         |
        ESTABLISHED --------- ACK ----------> ESTABLISHED
          (2 s quiet)

         initiator                              responder

        ESTABLISHED                            ESTABLISHED
             |  snd FIN(c)                           |
          FIN_SENT ----------- FIN ---------->       |
             |                                       |  snd FIN|ACK(c)
             |  <--------- FIN|ACK(c) ---------------|
           CLOSED                               (2 s quiet)
                                                  CLOSED

Every wait loop discards corrupt, off-peer, mis-flagged, and mis-sequenced
datagrams, and retries never advance seq_cursor. The quiet periods absorb a
lost terminal ACK / FIN|ACK: any repetition of the preceding step triggers a
retransmission and re-arms the 2 s deadline.
*/

impl Endpoint {
    pub fn connect(&mut self, peer: SocketAddr) -> Result<(), Error> {
        let isn = rand::thread_rng().gen_range(0..SEQ_SPACE as u32);
        self.connect_with_isn(peer, isn)
    }

    pub(crate) fn connect_with_isn(&mut self, peer: SocketAddr, isn: u32) -> Result<(), Error> {
        self.fin_seen = None;
        self.reno = Reno::new();
        self.peer = Some(peer);

        let syn = wire::seal_control(isn, 0, SYN);
        self.transmit(&syn)?;
        debug!("sent SYN isn={isn} to {peer}");

        let expect = inc_seq(isn);
        let mut retries = 0;
        loop {
            match self.wait_for(SYN_ACK, HANDSHAKE_STEP)? {
                Some(d) if d.header.seq == expect => break,
                Some(d) => warn!("ignoring SYN|ACK with unexpected seq {}", d.header.seq),
                None => {
                    if retries == MAX_SYN_RETRIES {
                        return Err(Error::ConnectFailed(retries));
                    }
                    retries += 1;
                    self.transmit(&syn)?;
                }
            }
        }

        // The 64-bit space is anchored at the ISN, assigned exactly once here.
        self.seq_base = isn as u64;
        self.seq_cursor = isn as u64;

        let ack = wire::seal_control(expect, 0, ACK);
        self.transmit(&ack)?;

        // A repeated SYN|ACK means our ACK was lost; silence means it landed.
        let mut deadline = Instant::now() + QUIET_PERIOD;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match self.wait_for(SYN_ACK, left)? {
                Some(d) if d.header.seq == expect => {
                    self.transmit(&ack)?;
                    deadline = Instant::now() + QUIET_PERIOD;
                }
                Some(_) => {}
                None => break,
            }
        }

        debug!("connected to {peer}");
        Ok(())
    }

    pub fn accept(&mut self) -> Result<(), Error> {
        self.fin_seen = None;
        self.reno = Reno::new();

        // The first well-formed SYN also binds the peer (see recv_frame).
        let Some(syn) = self.wait_for(SYN, HANDSHAKE_BUDGET)? else {
            return Err(Error::AcceptTimeout(HANDSHAKE_BUDGET));
        };
        let isn = syn.header.seq;
        debug!("got SYN isn={isn}");

        self.seq_base = isn as u64;
        self.seq_cursor = isn as u64;

        let expect = inc_seq(isn);
        let syn_ack = wire::seal_control(expect, 0, SYN_ACK);
        self.transmit(&syn_ack)?;

        let deadline = Instant::now() + HANDSHAKE_BUDGET;
        loop {
            if Instant::now() >= deadline {
                return Err(Error::AcceptTimeout(HANDSHAKE_BUDGET));
            }
            match self.wait_for(ACK, HANDSHAKE_STEP)? {
                Some(d) if d.header.seq == expect => break,
                Some(d) => warn!("ignoring ACK with unexpected seq {}", d.header.seq),
                // Silence: our SYN|ACK may be gone, nudge again.
                None => self.transmit(&syn_ack)?,
            }
        }

        debug!("accepted connection from {:?}", self.peer);
        Ok(())
    }

    /* Initiator side of the teardown. The FIN consumes one sequence number
     * past the last data segment. A missing FIN|ACK is reported as
     * TeardownTimeout; by then the transfer itself has already completed. */
    pub fn close(&mut self) -> Result<(), Error> {
        self.seq_cursor += 1;
        let seq = project(self.seq_cursor);

        let fin = wire::seal_control(seq, 0, FIN);
        self.transmit(&fin)?;
        debug!("sent FIN seq={seq}");

        let deadline = Instant::now() + TEARDOWN_BUDGET;
        loop {
            if Instant::now() >= deadline {
                return Err(Error::TeardownTimeout);
            }
            match self.wait_for(FIN_ACK, HANDSHAKE_STEP)? {
                Some(d) if d.header.seq == seq => break,
                Some(d) => warn!("ignoring FIN|ACK with unexpected seq {}", d.header.seq),
                None => self.transmit(&fin)?,
            }
        }

        self.peer = None;
        debug!("closed");
        Ok(())
    }

    pub fn wait_close(&mut self) -> Result<(), Error> {
        self.seq_cursor += 1;
        let seq = project(self.seq_cursor);
        let fin_ack = wire::seal_control(seq, 0, FIN_ACK);

        // The FIN usually arrives while the data plane is still draining; in
        // that case acknowledge it right away.
        if self.fin_seen.is_some() {
            self.transmit(&fin_ack)?;
            self.peer = None;
            debug!("acknowledged FIN observed during transfer, closed");
            return Ok(());
        }

        let deadline = Instant::now() + TEARDOWN_BUDGET;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(Error::TeardownTimeout);
            }
            match self.wait_for(FIN, left)? {
                Some(d) if d.header.seq == seq => break,
                Some(d) => warn!("ignoring FIN with unexpected seq {}", d.header.seq),
                None => return Err(Error::TeardownTimeout),
            }
        }

        self.transmit(&fin_ack)?;

        // A repeated FIN means the FIN|ACK was lost.
        let mut deadline = Instant::now() + QUIET_PERIOD;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match self.wait_for(FIN, left)? {
                Some(d) if d.header.seq == seq => {
                    self.transmit(&fin_ack)?;
                    deadline = Instant::now() + QUIET_PERIOD;
                }
                Some(_) => {}
                None => break,
            }
        }

        self.peer = None;
        debug!("closed");
        Ok(())
    }
}
