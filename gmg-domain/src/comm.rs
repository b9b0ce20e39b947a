//! Process-group communication
//!
//! [`Communicator`] is the narrow message-passing interface used by ghost filling,
//! inter-level transfers and vector reductions: rank/size queries, tagged non-blocking
//! sends, tag-matched receives bounded by a timeout, and a few collectives built on top.
//!
//! [`ThreadComm`] runs every rank of a group inside one process, one OS thread per rank,
//! connected by channels. Messages between a pair of ranks are delivered in send order.

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Transport failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommError {
    /// Destination rank outside the group
    #[error("rank {rank} is out of range for a group of size {size}")]
    InvalidRank {
        /// Requested rank
        rank: usize,
        /// Size of the group
        size: usize,
    },

    /// The peer has gone away
    #[error("rank {rank} has disconnected")]
    Disconnected {
        /// The unreachable rank
        rank: usize,
    },

    /// No matching message arrived in time
    #[error("no matching message arrived within {waited_ms} ms")]
    Timeout {
        /// How long the receive waited
        waited_ms: u128,
    },

    /// A collective received a payload of the wrong shape
    #[error("collective from rank {rank} carried {got} values, expected {expected}")]
    MalformedCollective {
        /// Sending rank
        rank: usize,
        /// Expected payload length
        expected: usize,
        /// Actual payload length
        got: usize,
    },
}

/// Direction of an inter-level message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferPhase {
    /// One-time parent/child claims exchanged while building a schedule
    Handshake,
    /// Fine-to-coarse contributions, added on the owner
    Restrict,
    /// Coarse patches shipped to the owners of their children
    Interpolate,
}

/// Message tag; every message is self-describing through its tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Ghost slab for `dest_patch` across its face `dest_face` (a [`crate::Face::index`])
    Ghost {
        /// Domain id
        domain: usize,
        /// Id of the patch whose ghosts receive the slab
        dest_patch: usize,
        /// Face index on the destination patch
        dest_face: usize,
        /// Id of the patch the slab was computed from
        source_patch: usize,
    },
    /// Patch data moving between two levels; `domain` is the coarse domain id
    InterLevel {
        /// Coarse domain id
        domain: usize,
        /// Transfer direction
        phase: TransferPhase,
        /// Coarse patch id (or sending rank during the handshake)
        patch: usize,
    },
    /// Contribution to a reduction, sent to rank 0
    Reduce,
    /// Result of a reduction, sent from rank 0
    Broadcast,
}

/// A received message
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Sending rank
    pub source: usize,
    /// Message tag
    pub tag: Tag,
    /// Message body
    pub payload: Vec<f64>,
}

/// Handle for a non-blocking send
#[must_use = "a send must be waited on before its pass ends"]
#[derive(Debug)]
pub struct SendRequest {
    dest: usize,
    delivered: bool,
}

impl SendRequest {
    /// A request whose payload has already been handed to the transport.
    pub fn delivered(dest: usize) -> Self {
        Self {
            dest,
            delivered: true,
        }
    }

    /// Destination rank
    pub fn dest(&self) -> usize {
        self.dest
    }

    /// Block until the send is locally complete.
    pub fn wait(self) -> Result<(), CommError> {
        if self.delivered {
            Ok(())
        } else {
            Err(CommError::Disconnected { rank: self.dest })
        }
    }
}

/// Point-to-point and collective communication within a group of ranks.
pub trait Communicator: Send + Sync + fmt::Debug {
    /// Rank of this process in the group
    fn rank(&self) -> usize;

    /// Number of ranks in the group
    fn size(&self) -> usize;

    /// Start sending `payload` to `dest`.
    fn isend(&self, dest: usize, tag: Tag, payload: Vec<f64>) -> Result<SendRequest, CommError>;

    /// Receive the oldest message for which `accept(source, tag)` holds.
    ///
    /// Messages that do not match stay queued for later receives. Fails with
    /// [`CommError::Timeout`] when nothing matching arrives in time.
    fn recv_matching(
        &self,
        accept: &mut dyn FnMut(usize, &Tag) -> bool,
    ) -> Result<Envelope, CommError>;

    /// Gather one value from every rank, in rank order, on every rank.
    fn all_gather(&self, value: f64) -> Result<Vec<f64>, CommError> {
        gather_through_root(self, value)
    }

    /// Sum of `value` over all ranks. Every rank gets the bitwise same result.
    fn all_reduce_sum(&self, value: f64) -> Result<f64, CommError> {
        Ok(self.all_gather(value)?.iter().sum())
    }

    /// Maximum of `value` over all ranks.
    fn all_reduce_max(&self, value: f64) -> Result<f64, CommError> {
        Ok(self
            .all_gather(value)?
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max))
    }

    /// Wait until every rank reaches the barrier.
    fn barrier(&self) -> Result<(), CommError> {
        self.all_gather(0.0).map(|_| ())
    }
}

fn gather_through_root<C: Communicator + ?Sized>(comm: &C, value: f64) -> Result<Vec<f64>, CommError> {
    let size = comm.size();
    if size == 1 {
        return Ok(vec![value]);
    }
    if comm.rank() == 0 {
        let mut values = Vec::with_capacity(size);
        values.push(value);
        for rank in 1..size {
            let envelope =
                comm.recv_matching(&mut |source, tag| source == rank && *tag == Tag::Reduce)?;
            values.push(single_value(&envelope)?);
        }
        for rank in 1..size {
            comm.isend(rank, Tag::Broadcast, values.clone())?.wait()?;
        }
        Ok(values)
    } else {
        comm.isend(0, Tag::Reduce, vec![value])?.wait()?;
        let envelope = comm.recv_matching(&mut |source, tag| source == 0 && *tag == Tag::Broadcast)?;
        if envelope.payload.len() != size {
            return Err(CommError::MalformedCollective {
                rank: 0,
                expected: size,
                got: envelope.payload.len(),
            });
        }
        Ok(envelope.payload)
    }
}

fn single_value(envelope: &Envelope) -> Result<f64, CommError> {
    match envelope.payload.as_slice() {
        [value] => Ok(*value),
        other => Err(CommError::MalformedCollective {
            rank: envelope.source,
            expected: 1,
            got: other.len(),
        }),
    }
}

struct Inbox {
    receiver: Receiver<Envelope>,
    unmatched: VecDeque<Envelope>,
}

/// In-process communicator: one instance per rank, each owned by its own thread.
pub struct ThreadComm {
    rank: usize,
    outboxes: Vec<Sender<Envelope>>,
    inbox: Mutex<Inbox>,
    timeout: Duration,
}

impl ThreadComm {
    /// Receive timeout used unless overridden with [`ThreadComm::with_timeout`]
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a connected group of `size` ranks.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| ThreadComm {
                rank,
                outboxes: senders.clone(),
                inbox: Mutex::new(Inbox {
                    receiver,
                    unmatched: VecDeque::new(),
                }),
                timeout: Self::DEFAULT_TIMEOUT,
            })
            .collect()
    }

    /// A group with a single rank.
    pub fn single() -> ThreadComm {
        let (sender, receiver) = mpsc::channel();
        ThreadComm {
            rank: 0,
            outboxes: vec![sender],
            inbox: Mutex::new(Inbox {
                receiver,
                unmatched: VecDeque::new(),
            }),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Set how long a receive waits for a matching message.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Current receive timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.outboxes.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outboxes.len()
    }

    fn isend(&self, dest: usize, tag: Tag, payload: Vec<f64>) -> Result<SendRequest, CommError> {
        let outbox = self.outboxes.get(dest).ok_or(CommError::InvalidRank {
            rank: dest,
            size: self.size(),
        })?;
        outbox
            .send(Envelope {
                source: self.rank,
                tag,
                payload,
            })
            .map_err(|_| CommError::Disconnected { rank: dest })?;
        Ok(SendRequest::delivered(dest))
    }

    fn recv_matching(
        &self,
        accept: &mut dyn FnMut(usize, &Tag) -> bool,
    ) -> Result<Envelope, CommError> {
        let mut inbox = self
            .inbox
            .lock()
            .map_err(|_| CommError::Disconnected { rank: self.rank })?;
        if let Some(pos) = inbox
            .unmatched
            .iter()
            .position(|envelope| accept(envelope.source, &envelope.tag))
        {
            if let Some(envelope) = inbox.unmatched.remove(pos) {
                return Ok(envelope);
            }
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match inbox.receiver.recv_timeout(remaining) {
                Ok(envelope) if accept(envelope.source, &envelope.tag) => return Ok(envelope),
                Ok(envelope) => inbox.unmatched.push_back(envelope),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CommError::Timeout {
                        waited_ms: self.timeout.as_millis(),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CommError::Disconnected { rank: self.rank });
                }
            }
        }
    }
}
