//! A simulated process: registers for admission, waits to be resumed, then
//! walks its reference string one request at a time.

use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{self, AccessOutcome, Registration, Request, RequestKind, Resume};

/// Reference string of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub pid: usize,
    /// Pages `0..bound` are legal for this process
    pub bound: i64,
    pub references: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadReport {
    pub pid: usize,
    /// One outcome per reference actually issued
    pub outcomes: Vec<AccessOutcome>,
}

pub struct Workload {
    spec: WorkloadSpec,
    timeout: Option<Duration>,
}

/// Handed out by [`Workload::register`]; resolves once the scheduler admits the workload
pub struct Admission {
    resume: Receiver<Resume>,
}

impl Workload {
    /// `timeout` bounds each wait for an MMU reply
    pub fn new(spec: WorkloadSpec, timeout: Option<Duration>) -> Self {
        Workload { spec, timeout }
    }

    pub fn pid(&self) -> usize {
        self.spec.pid
    }

    /// Join the scheduler's ready queue
    pub fn register(&self, registrations: &Sender<Registration>) -> Result<Admission> {
        let (resume_tx, resume_rx) = bounded(1);
        let registration = Registration {
            pid: self.spec.pid,
            resume: resume_tx,
        };
        protocol::send(registrations, registration, "registration")?;
        debug!("[PROC {}] registered", self.spec.pid);
        Ok(Admission { resume: resume_rx })
    }

    /// Wait for admission, then issue every reference and end the stream.
    pub fn run(self, admission: Admission, requests: &Sender<Request>) -> Result<WorkloadReport> {
        let Workload { spec, timeout } = self;
        let WorkloadSpec { pid, bound, references } = spec;

        // Admission may legitimately wait for every earlier process, so this
        // wait is only ended by the resume or by the scheduler going away.
        protocol::recv(&admission.resume, None, "resume")?;
        info!("[PROC {}] admitted, {} references", pid, references.len());

        let mut outcomes = Vec::with_capacity(references.len());
        for page in references {
            let kind = RequestKind::from_raw(page, bound);
            if kind == RequestKind::EndOfStream {
                debug!("[PROC {}] end marker in reference string", pid);
                break;
            }
            let outcome = exchange(pid, kind, requests, timeout)?;
            debug!("[PROC {}] page={} -> {}", pid, page, outcome);
            outcomes.push(outcome);

            if outcome.is_terminal() {
                info!("[PROC {}] {} page={} -> terminating", pid, outcome, page);
                break;
            }
        }

        let ack = exchange(pid, RequestKind::EndOfStream, requests, timeout)?;
        if ack != AccessOutcome::EndOfStream {
            warn!("[PROC {}] expected end-of-ref ack, got {}", pid, ack);
        }
        info!("[PROC {}] finished reference string", pid);

        Ok(WorkloadReport { pid, outcomes })
    }
}

/// One request, one reply. The reply channel lives for this exchange only,
/// so a departed MMU shows up as a disconnect.
fn exchange(
    pid: usize,
    kind: RequestKind,
    requests: &Sender<Request>,
    timeout: Option<Duration>,
) -> Result<AccessOutcome> {
    let (reply_tx, reply_rx) = bounded(1);
    protocol::send(requests, Request { pid, kind, reply_to: reply_tx }, "MMU request")?;
    let reply = protocol::recv(&reply_rx, timeout, "MMU reply")?;
    if reply.pid != pid {
        warn!("[PROC {}] got reply addressed to pid={}", pid, reply.pid);
    }
    Ok(reply.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Reply;
    use crossbeam::channel::unbounded;
    use std::thread;

    /// Answers every access with a fixed outcome until end-of-stream
    fn fake_mmu(requests: Receiver<Request>, answer: AccessOutcome) -> Vec<RequestKind> {
        let mut seen = Vec::new();
        for request in requests.iter() {
            seen.push(request.kind);
            let outcome = match request.kind {
                RequestKind::EndOfStream => AccessOutcome::EndOfStream,
                RequestKind::Access { .. } => answer,
            };
            request.reply_to.send(Reply { pid: request.pid, outcome }).unwrap();
            if request.kind == RequestKind::EndOfStream {
                break;
            }
        }
        seen
    }

    fn run_against(spec: WorkloadSpec, answer: AccessOutcome) -> (WorkloadReport, Vec<RequestKind>) {
        let (reg_tx, reg_rx) = unbounded();
        let (req_tx, req_rx) = unbounded();

        let mmu = thread::spawn(move || fake_mmu(req_rx, answer));
        let workload = Workload::new(spec, None);
        let admission = workload.register(&reg_tx).unwrap();
        let worker = thread::spawn(move || workload.run(admission, &req_tx));

        let registration: Registration = reg_rx.recv().unwrap();
        registration.resume.send(Resume).unwrap();

        let report = worker.join().unwrap().unwrap();
        (report, mmu.join().unwrap())
    }

    #[test]
    fn test_issues_every_reference_then_end() {
        let spec = WorkloadSpec { pid: 2, bound: 4, references: vec![0, 3, 1] };
        let (report, seen) = run_against(spec, AccessOutcome::Frame(1));

        assert_eq!(report.pid, 2);
        assert_eq!(report.outcomes, vec![AccessOutcome::Frame(1); 3]);
        assert_eq!(
            seen,
            vec![
                RequestKind::Access { page: 0, bound: 4 },
                RequestKind::Access { page: 3, bound: 4 },
                RequestKind::Access { page: 1, bound: 4 },
                RequestKind::EndOfStream,
            ]
        );
    }

    #[test]
    fn test_stops_on_invalid_but_still_ends_stream() {
        let spec = WorkloadSpec { pid: 0, bound: 2, references: vec![5, 0, 1] };
        let (report, seen) = run_against(spec, AccessOutcome::Invalid);

        assert_eq!(report.outcomes, vec![AccessOutcome::Invalid]);
        assert_eq!(
            seen,
            vec![RequestKind::Access { page: 5, bound: 2 }, RequestKind::EndOfStream]
        );
    }

    #[test]
    fn test_end_marker_cuts_stream_short() {
        let spec = WorkloadSpec { pid: 1, bound: 4, references: vec![1, -9, 2] };
        let (report, seen) = run_against(spec, AccessOutcome::Frame(0));

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], RequestKind::EndOfStream);
    }

    #[test]
    fn test_waits_for_resume_before_requesting() {
        let (reg_tx, reg_rx) = unbounded();
        let (req_tx, req_rx) = unbounded::<Request>();
        let spec = WorkloadSpec { pid: 0, bound: 1, references: vec![0] };
        let workload = Workload::new(spec, None);
        let admission = workload.register(&reg_tx).unwrap();
        let worker = thread::spawn(move || workload.run(admission, &req_tx));

        let registration: Registration = reg_rx.recv().unwrap();
        assert_eq!(registration.pid, 0);
        assert!(req_rx.recv_timeout(Duration::from_millis(50)).is_err());

        // Dropping the resume sender stands in for a scheduler that went away
        drop(registration);
        assert!(worker.join().unwrap().is_err());
    }

    #[test]
    fn test_register_fails_without_scheduler() {
        let (reg_tx, reg_rx) = unbounded::<Registration>();
        drop(reg_rx);
        let workload = Workload::new(WorkloadSpec { pid: 0, bound: 1, references: vec![] }, None);
        assert_eq!(workload.pid(), 0);
        assert!(workload.register(&reg_tx).is_err());
    }
}
