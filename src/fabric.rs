//! In-process rank fabric
//!
//! Ranks are threads joined by an all-to-all mailbox fabric: every rank
//! owns one receiver and a sender table covering the whole world.
//! Messages are matched on `(source, tag)`, with out-of-order arrivals
//! parked in a per-rank stash. Peer death is advertised through a shared
//! alive bitmap; a receive from a dead peer whose mailbox holds no
//! matching message resolves to `PeerFailed` instead of blocking, which
//! is the hook the fault-recovery strategies build on.
//!
//! The blocking discipline follows the classic rank-ordered pattern: the
//! lower-ranked endpoint sends then receives, the higher-ranked endpoint
//! receives then sends, with tag pairs that are inverses between the two
//! peers. Collectives (sum/min reduction, barrier) are gathered at the
//! lowest live rank and broadcast back, re-electing the root if it dies.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::FurnaceError;

const TAG_REDUCE_SUM: u32 = 0x100;
const TAG_REDUCE_SUM_RESULT: u32 = 0x101;
const TAG_REDUCE_MIN: u32 = 0x102;
const TAG_REDUCE_MIN_RESULT: u32 = 0x103;
const TAG_BARRIER: u32 = 0x104;
const TAG_BARRIER_RESULT: u32 = 0x105;

const POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Result of a point-to-point exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStatus {
    Ok,
    /// The peer process has died; the recv buffer was not written and
    /// must be rebuilt before use
    PeerFailed,
}

/// Cartesian axes of the process grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Neighbour ranks on all four faces; `None` marks a face on the global
/// domain boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbours {
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub down: Option<usize>,
    pub up: Option<usize>,
}

struct Packet {
    src: usize,
    tag: u32,
    data: Vec<f64>,
}

struct Shared {
    senders: Vec<Sender<Packet>>,
    alive: Vec<AtomicBool>,
    aborted: AtomicBool,
}

#[derive(Clone, Copy)]
struct Topology {
    x_chunks: usize,
    y_chunks: usize,
}

/// The world constructor
pub struct Fabric;

impl Fabric {
    /// Build a world of `num_ranks` connected endpoints, one per rank
    /// thread.
    pub fn new(num_ranks: usize) -> Vec<RankComm> {
        let mut senders = Vec::with_capacity(num_ranks);
        let mut receivers = Vec::with_capacity(num_ranks);
        for _ in 0..num_ranks {
            let (tx, rx) = unbounded();
            senders.push(tx);
            receivers.push(rx);
        }

        let shared = Arc::new(Shared {
            senders,
            alive: (0..num_ranks).map(|_| AtomicBool::new(true)).collect(),
            aborted: AtomicBool::new(false),
        });

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, mailbox)| RankComm {
                rank,
                shared: Arc::clone(&shared),
                mailbox,
                stash: VecDeque::new(),
                topology: None,
                acked: false,
            })
            .collect()
    }
}

/// One rank's endpoint into the fabric
pub struct RankComm {
    rank: usize,
    shared: Arc<Shared>,
    mailbox: Receiver<Packet>,
    stash: VecDeque<Packet>,
    topology: Option<Topology>,
    acked: bool,
}

impl RankComm {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.shared.senders.len()
    }

    pub fn is_alive(&self, rank: usize) -> bool {
        self.shared.alive[rank].load(Ordering::SeqCst)
    }

    /// Mark this rank dead. Peers observe the death on their next
    /// receive from us; no further calls should be made on this endpoint.
    pub fn kill(&mut self) {
        self.shared.alive[self.rank].store(false, Ordering::SeqCst);
    }

    /// Fatally end the whole run; every blocked endpoint unblocks with a
    /// transport error.
    pub fn abort(&self) {
        self.shared.aborted.store(true, Ordering::SeqCst);
    }

    /// Acknowledge observed peer failures: from now on neighbour
    /// resolution skips dead ranks and yields the next live rank along
    /// the axis, as if the communicator had been shrunk around them.
    pub fn ack_failures(&mut self) {
        self.acked = true;
    }

    /// Whether failures have been acknowledged on this endpoint
    pub fn failures_acked(&self) -> bool {
        self.acked
    }

    /// Create the Cartesian topology over the whole world.
    ///
    /// Ranks map row-major over coordinates: `rank = cx * y_chunks + cy`,
    /// non-periodic in both axes, no reordering.
    pub fn cart_create(&mut self, x_chunks: usize, y_chunks: usize) -> Result<(), FurnaceError> {
        if x_chunks * y_chunks != self.size() {
            return Err(FurnaceError::Transport(format!(
                "cartesian grid {}x{} does not match {} ranks",
                x_chunks,
                y_chunks,
                self.size()
            )));
        }
        self.topology = Some(Topology { x_chunks, y_chunks });
        Ok(())
    }

    fn topology(&self) -> Result<Topology, FurnaceError> {
        self.topology
            .ok_or_else(|| FurnaceError::Transport("cartesian topology not initialised".into()))
    }

    /// Cartesian coordinates of `rank`
    pub fn cart_coords(&self, rank: usize) -> Result<(usize, usize), FurnaceError> {
        let topo = self.topology()?;
        Ok((rank / topo.y_chunks, rank % topo.y_chunks))
    }

    /// Shift along `axis`, returning `(predecessor, successor)` ranks;
    /// `None` marks the edge of the grid. Once failures are
    /// acknowledged, dead ranks are skipped over.
    pub fn cart_shift(
        &self,
        axis: Axis,
        offset: usize,
    ) -> Result<(Option<usize>, Option<usize>), FurnaceError> {
        let topo = self.topology()?;
        let (cx, cy) = self.cart_coords(self.rank)?;
        let step = match axis {
            Axis::X => (offset as i64, 0),
            Axis::Y => (0, offset as i64),
        };
        let pred = self.resolve(cx, cy, (-step.0, -step.1), topo);
        let succ = self.resolve(cx, cy, step, topo);
        Ok((pred, succ))
    }

    /// Neighbours on both axes at once
    pub fn neighbours(&self) -> Result<Neighbours, FurnaceError> {
        let (left, right) = self.cart_shift(Axis::X, 1)?;
        let (down, up) = self.cart_shift(Axis::Y, 1)?;
        Ok(Neighbours { left, right, down, up })
    }

    fn resolve(&self, cx: usize, cy: usize, step: (i64, i64), topo: Topology) -> Option<usize> {
        let unit = (step.0.signum(), step.1.signum());
        let mut nx = cx as i64 + step.0;
        let mut ny = cy as i64 + step.1;
        loop {
            if nx < 0 || ny < 0 || nx >= topo.x_chunks as i64 || ny >= topo.y_chunks as i64 {
                return None;
            }
            let rank = nx as usize * topo.y_chunks + ny as usize;
            // An unacknowledged dead rank is still addressed, so the
            // exchange observes the failure and recovery can run.
            if self.is_alive(rank) || !self.acked {
                return Some(rank);
            }
            nx += unit.0;
            ny += unit.1;
        }
    }

    fn post(&self, dst: usize, tag: u32, data: Vec<f64>) {
        let _ = self.shared.senders[dst].send(Packet {
            src: self.rank,
            tag,
            data,
        });
    }

    /// Wait for a message from `src` with `tag`. Returns `None` when the
    /// peer is dead and no matching message is queued.
    fn recv_match(&mut self, src: usize, tag: u32) -> Result<Option<Vec<f64>>, FurnaceError> {
        loop {
            let pos = self
                .stash
                .iter()
                .position(|p| p.src == src && p.tag == tag);
            if let Some(packet) = pos.and_then(|p| self.stash.remove(p)) {
                return Ok(Some(packet.data));
            }

            if self.shared.aborted.load(Ordering::SeqCst) {
                return Err(FurnaceError::Transport("run aborted".into()));
            }

            match self.mailbox.recv_timeout(POLL_INTERVAL) {
                Ok(packet) => self.stash.push_back(packet),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.is_alive(src) {
                        // Drain anything already delivered before giving up
                        while let Ok(packet) = self.mailbox.try_recv() {
                            self.stash.push_back(packet);
                        }
                        if !self.stash.iter().any(|p| p.src == src && p.tag == tag) {
                            return Ok(None);
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(FurnaceError::Transport("mailbox disconnected".into()));
                }
            }
        }
    }

    /// Blocking paired exchange with `peer`.
    ///
    /// The lower-ranked endpoint sends first then receives; the
    /// higher-ranked endpoint receives first then sends. `send_tag` and
    /// `recv_tag` must be inverses of the peer's pair.
    pub fn send_recv(
        &mut self,
        send: &[f64],
        recv: &mut [f64],
        peer: usize,
        send_tag: u32,
        recv_tag: u32,
    ) -> Result<ExchangeStatus, FurnaceError> {
        let incoming = if self.rank < peer {
            self.post(peer, send_tag, send.to_vec());
            self.recv_match(peer, recv_tag)?
        } else {
            let incoming = self.recv_match(peer, recv_tag)?;
            self.post(peer, send_tag, send.to_vec());
            incoming
        };

        match incoming {
            Some(data) => {
                if data.len() != recv.len() {
                    self.abort();
                    return Err(FurnaceError::Transport(format!(
                        "exchange length mismatch with rank {}: sent {}, expected {}",
                        peer,
                        data.len(),
                        recv.len()
                    )));
                }
                recv.copy_from_slice(&data);
                Ok(ExchangeStatus::Ok)
            }
            None => Ok(ExchangeStatus::PeerFailed),
        }
    }

    /// All-reduce SUM over the live ranks
    pub fn sum_over_ranks(&mut self, value: f64) -> Result<f64, FurnaceError> {
        self.allreduce(value, TAG_REDUCE_SUM, TAG_REDUCE_SUM_RESULT, |a, b| a + b)
    }

    /// All-reduce MIN over the live ranks
    pub fn min_over_ranks(&mut self, value: f64) -> Result<f64, FurnaceError> {
        self.allreduce(value, TAG_REDUCE_MIN, TAG_REDUCE_MIN_RESULT, f64::min)
    }

    /// Synchronise the live ranks
    pub fn barrier(&mut self) -> Result<(), FurnaceError> {
        self.allreduce(0.0, TAG_BARRIER, TAG_BARRIER_RESULT, |a, _| a)
            .map(|_| ())
    }

    fn lowest_live_rank(&self) -> Result<usize, FurnaceError> {
        (0..self.size())
            .find(|&r| self.is_alive(r))
            .ok_or_else(|| FurnaceError::Transport("no live ranks".into()))
    }

    fn allreduce(
        &mut self,
        value: f64,
        contrib_tag: u32,
        result_tag: u32,
        op: fn(f64, f64) -> f64,
    ) -> Result<f64, FurnaceError> {
        loop {
            let root = self.lowest_live_rank()?;

            if root == self.rank {
                let mut acc = value;
                for peer in 0..self.size() {
                    if peer == self.rank || !self.is_alive(peer) {
                        continue;
                    }
                    // A peer that dies before contributing simply drops
                    // out of the reduction
                    if let Some(data) = self.recv_match(peer, contrib_tag)? {
                        acc = op(acc, data[0]);
                    }
                }
                for peer in 0..self.size() {
                    if peer != self.rank && self.is_alive(peer) {
                        self.post(peer, result_tag, vec![acc]);
                    }
                }
                return Ok(acc);
            }

            self.post(root, contrib_tag, vec![value]);
            match self.recv_match(root, result_tag)? {
                Some(data) => return Ok(data[0]),
                // Root died mid-reduction: re-elect and retry
                None => continue,
            }
        }
    }
}
