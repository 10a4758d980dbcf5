//! Messages exchanged between workloads, the MMU and the scheduler.
//!
//! Channel topology:
//! - workload -> scheduler: [`Registration`] (carries the workload's resume sender)
//! - scheduler -> workload: [`Resume`]
//! - workload -> MMU: [`Request`] (carries the workload's reply sender)
//! - MMU -> workload: [`Reply`]
//! - MMU -> scheduler: [`Notification`]

use std::fmt;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

use crate::constants::*;
use crate::error::{Result, SimError};

/// Workload asks to be admitted
#[derive(Debug, Clone)]
pub struct Registration {
    pub pid: usize,
    pub resume: Sender<Resume>,
}

/// Lets an admitted workload start issuing references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resume;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Reference to `page`, legal iff `0 <= page < bound`
    Access { page: i64, bound: i64 },
    /// The workload has no further references
    EndOfStream,
}

impl RequestKind {
    /// Decode a raw reference; `END_OF_REF` is the end-of-stream sentinel.
    pub fn from_raw(page: i64, bound: i64) -> Self {
        if page == i64::from(END_OF_REF) {
            RequestKind::EndOfStream
        } else {
            RequestKind::Access { page, bound }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub pid: usize,
    pub kind: RequestKind,
    pub reply_to: Sender<Reply>,
}

/// What the MMU answers to one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    /// Page is resident in this frame (hit or resolved fault)
    Frame(usize),
    /// Reference outside the process's legal bound
    Invalid,
    /// No free frame and no resident page of this process to evict
    Unresolvable,
    /// Acknowledges end-of-stream
    EndOfStream,
}

impl AccessOutcome {
    /// Raw integer form written to outcome files
    pub fn to_raw(&self) -> i64 {
        match self {
            AccessOutcome::Frame(frame) => *frame as i64,
            AccessOutcome::Invalid => i64::from(INVALID_PAGE),
            AccessOutcome::Unresolvable => i64::from(PAGE_FAULT),
            AccessOutcome::EndOfStream => i64::from(END_OF_REF),
        }
    }

    /// `Invalid` and `Unresolvable` end a workload's reference stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, AccessOutcome::Invalid | AccessOutcome::Unresolvable)
    }
}

impl fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessOutcome::Frame(frame) => write!(f, "frame {}", frame),
            AccessOutcome::Invalid => write!(f, "INVALID"),
            AccessOutcome::Unresolvable => write!(f, "UNRESOLVABLE"),
            AccessOutcome::EndOfStream => write!(f, "END"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub pid: usize,
    pub outcome: AccessOutcome,
}

/// MMU -> scheduler notice. Completion has its own variant instead of
/// sharing a flag with "no fault".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    FaultHandled,
    NoFault,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub pid: usize,
    pub kind: NoticeKind,
}

/// Blocking receive, bounded by `timeout` when one is configured
pub fn recv<T>(rx: &Receiver<T>, timeout: Option<Duration>, waiting_for: &'static str) -> Result<T> {
    match timeout {
        None => rx.recv().map_err(|_| SimError::Disconnected(waiting_for)),
        Some(after) => rx.recv_timeout(after).map_err(|e| match e {
            RecvTimeoutError::Timeout => SimError::Timeout { waiting_for, after },
            RecvTimeoutError::Disconnected => SimError::Disconnected(waiting_for),
        }),
    }
}

pub fn send<T>(tx: &Sender<T>, msg: T, channel: &'static str) -> Result<()> {
    tx.send(msg).map_err(|_| SimError::Disconnected(channel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{bounded, unbounded};

    #[test]
    fn test_request_from_raw() {
        assert_eq!(
            RequestKind::from_raw(3, 8),
            RequestKind::Access { page: 3, bound: 8 }
        );
        assert_eq!(
            RequestKind::from_raw(-1, 8),
            RequestKind::Access { page: -1, bound: 8 }
        );
        assert_eq!(RequestKind::from_raw(-9, 8), RequestKind::EndOfStream);
    }

    #[test]
    fn test_outcome_to_raw() {
        assert_eq!(AccessOutcome::Frame(0).to_raw(), 0);
        assert_eq!(AccessOutcome::Frame(12).to_raw(), 12);
        assert_eq!(AccessOutcome::Invalid.to_raw(), -2);
        assert_eq!(AccessOutcome::Unresolvable.to_raw(), -1);
        assert_eq!(AccessOutcome::EndOfStream.to_raw(), -9);
    }

    #[test]
    fn test_terminal_outcomes() {
        assert!(AccessOutcome::Invalid.is_terminal());
        assert!(AccessOutcome::Unresolvable.is_terminal());
        assert!(!AccessOutcome::Frame(1).is_terminal());
        assert!(!AccessOutcome::EndOfStream.is_terminal());
    }

    #[test]
    fn test_recv_timeout_and_disconnect() {
        let (tx, rx) = bounded::<u32>(1);
        let err = recv(&rx, Some(Duration::from_millis(10)), "reply").unwrap_err();
        assert!(matches!(err, SimError::Timeout { waiting_for: "reply", .. }));

        tx.send(7).unwrap();
        assert_eq!(recv(&rx, None, "reply").unwrap(), 7);

        drop(tx);
        let err = recv(&rx, None, "reply").unwrap_err();
        assert!(matches!(err, SimError::Disconnected("reply")));
    }

    #[test]
    fn test_send_to_dropped_receiver() {
        let (tx, rx) = unbounded::<Resume>();
        drop(rx);
        assert!(matches!(
            send(&tx, Resume, "resume"),
            Err(SimError::Disconnected("resume"))
        ));
    }
}
