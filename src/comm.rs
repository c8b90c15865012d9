//! Module `comm` implement the message transport between participants.
//!
//! Participants are addressed by rank. Each participant owns exactly
//! one mailbox; sends go to any rank, receives come off the single
//! mailbox either non-blocking ([Comm::poll]) or tag-selective
//! ([Comm::wait_tag]). Tag-selective waits stash unrelated arrivals in
//! a pending queue, preserving per-sender order, so the scheduler sees
//! them on its next poll.
//!
//! The transport is in-process channels; nothing outside this module
//! assumes that. Delivery is ordered per (source, destination) pair.

use lazy_static::lazy_static;

use std::{
    collections::VecDeque,
    sync::mpsc,
    time,
};

use crate::{buf::Encoded, Error, Result};

/// Wire-level message tags. The numbering is part of the wire
/// protocol; renumbering requires a protocol version bump.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    ContOrTerm = 0,
    AskDonate = 1,
    AskDonateToHub = 2,
    AskHubShare = 3,
    FinishInit = 4,
    HubLoad = 5,
    AskLoad = 6,
    AskPause = 7,
    AskTerminate = 8,
    Idle = 9,
    Incumbent = 10,
    LoadInfo = 11,
    WorkerNeedWork = 12,
    Model = 13,
    Node = 14,
    Params = 15,
    TermCheck = 16,
    HubCheckCluster = 17,
    HubPeriodCheck = 18,
    HubPeriodReport = 19,
    HubStatus = 20,
    WorkerStatus = 21,
    HubTermStatus = 22,
    WorkerTermStatus = 23,
    Size = 24,
    SubTreeByMaster = 25,
    SubTree = 26,
    NodeSize = 27,
    TellMasterRecv = 28,
    TellHubRecv = 29,
    HubAskIndices = 30,
    IndicesFromMaster = 31,
    WorkerAskIndices = 32,
    IndicesFromHub = 33,
    ForceTerm = 34,
    MasterIncumbent = 35,
    HubIncumbent = 36,
    AskHubPause = 37,
    AskDonateToWorker = 38,
    SubTreeByWorker = 39,
    IncumbentTwo = 40,
}

lazy_static! {
    /// Every tag, indexed by its wire number.
    pub static ref TAGS: Vec<Tag> = vec![
        Tag::ContOrTerm,
        Tag::AskDonate,
        Tag::AskDonateToHub,
        Tag::AskHubShare,
        Tag::FinishInit,
        Tag::HubLoad,
        Tag::AskLoad,
        Tag::AskPause,
        Tag::AskTerminate,
        Tag::Idle,
        Tag::Incumbent,
        Tag::LoadInfo,
        Tag::WorkerNeedWork,
        Tag::Model,
        Tag::Node,
        Tag::Params,
        Tag::TermCheck,
        Tag::HubCheckCluster,
        Tag::HubPeriodCheck,
        Tag::HubPeriodReport,
        Tag::HubStatus,
        Tag::WorkerStatus,
        Tag::HubTermStatus,
        Tag::WorkerTermStatus,
        Tag::Size,
        Tag::SubTreeByMaster,
        Tag::SubTree,
        Tag::NodeSize,
        Tag::TellMasterRecv,
        Tag::TellHubRecv,
        Tag::HubAskIndices,
        Tag::IndicesFromMaster,
        Tag::WorkerAskIndices,
        Tag::IndicesFromHub,
        Tag::ForceTerm,
        Tag::MasterIncumbent,
        Tag::HubIncumbent,
        Tag::AskHubPause,
        Tag::AskDonateToWorker,
        Tag::SubTreeByWorker,
        Tag::IncumbentTwo,
    ];
}

impl Tag {
    pub fn to_wire(&self) -> u8 {
        *self as u8
    }

    pub fn from_wire(val: u8) -> Result<Tag> {
        match TAGS.get(val as usize) {
            Some(tag) => Ok(*tag),
            None => err_at!(FailConvert, msg: "message tag {}", val),
        }
    }
}

/// One message between participants.
pub struct Message {
    pub from: usize,
    pub tag: Tag,
    pub body: Encoded,
}

impl Message {
    /// Control message with no payload.
    pub fn control(from: usize, tag: Tag) -> Message {
        Message {
            from,
            tag,
            body: Encoded::new(""),
        }
    }
}

/// A participant's endpoint: senders to every rank plus its own
/// mailbox.
pub struct Comm {
    rank: usize,
    txs: Vec<mpsc::Sender<Message>>,
    rx: mpsc::Receiver<Message>,
    pending: VecDeque<Message>,
}

/// Build a fully connected mesh of `n` participants. Element `i` of
/// the returned vector is rank `i`'s endpoint.
pub fn full_mesh(n: usize) -> Vec<Comm> {
    let mut txs = Vec::with_capacity(n);
    let mut rxs = Vec::with_capacity(n);
    for _ in 0..n {
        let (tx, rx) = mpsc::channel();
        txs.push(tx);
        rxs.push(rx);
    }

    rxs.into_iter()
        .enumerate()
        .map(|(rank, rx)| Comm {
            rank,
            txs: txs.clone(),
            rx,
            pending: VecDeque::default(),
        })
        .collect()
}

impl Comm {
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of participants in the mesh.
    pub fn size(&self) -> usize {
        self.txs.len()
    }

    /// Send `body` to `to`. Sending to self is allowed; the message
    /// comes back through the own mailbox.
    pub fn send(&self, to: usize, tag: Tag, body: Encoded) -> Result<()> {
        let msg = Message {
            from: self.rank,
            tag,
            body,
        };
        match self.txs.get(to) {
            Some(tx) => err_at!(IPCFail, tx.send(msg), "to {}", to),
            None => err_at!(InvariantViolation, msg: "rank {} out of mesh", to),
        }
    }

    /// Send a bare control message.
    pub fn send_control(&self, to: usize, tag: Tag) -> Result<()> {
        self.send(to, tag, Encoded::new(""))
    }

    /// Send `body` to every rank in `ranks`, skipping self.
    pub fn broadcast(&self, ranks: &[usize], tag: Tag, body: &Encoded) -> Result<()> {
        for &to in ranks.iter().filter(|r| **r != self.rank) {
            self.send(to, tag, body.clone())?;
        }
        Ok(())
    }

    /// Non-blocking receive; pending stash first, then the mailbox.
    pub fn poll(&mut self) -> Option<Message> {
        match self.pending.pop_front() {
            Some(msg) => Some(msg),
            None => self.rx.try_recv().ok(),
        }
    }

    /// Receive with a bounded wait. Returns None when `timeout`
    /// expires with no arrival.
    pub fn poll_timeout(&mut self, timeout: time::Duration) -> Option<Message> {
        match self.pending.pop_front() {
            Some(msg) => Some(msg),
            None => self.rx.recv_timeout(timeout).ok(),
        }
    }

    /// Blocking receive of the next message matching `tag` (and
    /// `from`, when given). Non-matching arrivals keep their order in
    /// the pending stash.
    pub fn wait_tag(&mut self, tag: Tag, from: Option<usize>) -> Result<Message> {
        let matches = |msg: &Message| -> bool {
            msg.tag == tag && from.map(|f| f == msg.from).unwrap_or(true)
        };

        if let Some(off) = self.pending.iter().position(|m| matches(m)) {
            return Ok(self.pending.remove(off).unwrap());
        }

        loop {
            let msg = err_at!(IPCFail, self.rx.recv(), "waiting {:?}", tag)?;
            if matches(&msg) {
                break Ok(msg);
            }
            self.pending.push_back(msg);
        }
    }

    /// Blocking receive of the next message matching any tag in
    /// `tags`.
    pub fn wait_any(&mut self, tags: &[Tag]) -> Result<Message> {
        if let Some(off) = self.pending.iter().position(|m| tags.contains(&m.tag)) {
            return Ok(self.pending.remove(off).unwrap());
        }

        loop {
            let msg = err_at!(IPCFail, self.rx.recv(), "waiting {:?}", tags)?;
            if tags.contains(&msg.tag) {
                break Ok(msg);
            }
            self.pending.push_back(msg);
        }
    }

    /// Drop every message still queued, used on forced shutdown. The
    /// mailbox stays usable.
    pub fn discard_queued(&mut self) {
        self.pending.clear();
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
#[path = "comm_test.rs"]
mod comm_test;
