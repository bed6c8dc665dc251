//! Deterministic scheduler.
//!
//! Holds the clock (seconds and frames) and the queue of outstanding
//! requests. It never runs code itself: the [`Host`](crate::Host) takes
//! due requests out of the queue and executes their actions, so tests
//! control exactly when time passes.
//!
//! Requests are kept in submission order and due requests fire in that
//! order. An instance has at most one outstanding resume per dispatch
//! procedure: submitting a new one replaces the old.

use smallvec::SmallVec;

use cadence_ir::machine::JoinMode;

use crate::value::{InstanceId, ProcIndex, TaskId};

/// Callback into one instance's dispatch procedure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResumeHandle {
    pub instance: InstanceId,
    pub procedure: ProcIndex,
}

/// When a request becomes due.
#[derive(Clone, Debug, PartialEq)]
pub enum Due {
    /// At this clock time, in seconds.
    Seconds(f64),
    /// At this frame number.
    Frame(u64),
    /// When the tasks complete.
    Completion {
        tasks: SmallVec<[TaskId; 2]>,
        mode: JoinMode,
    },
}

impl Due {
    pub fn is_timer(&self) -> bool {
        !matches!(self, Due::Completion { .. })
    }
}

/// What happens when a request fires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Resume(ResumeHandle),
    /// Complete a timer or join task.
    Complete(TaskId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub seq: u64,
    pub due: Due,
    pub action: Action,
}

#[derive(Clone, Debug)]
pub struct TestScheduler {
    now: f64,
    frame: u64,
    frame_seconds: f64,
    next_seq: u64,
    pending: Vec<Request>,
}

impl TestScheduler {
    pub fn new(frame_seconds: f64) -> Self {
        TestScheduler {
            now: 0.0,
            frame: 0,
            frame_seconds,
            next_seq: 0,
            pending: Vec::new(),
        }
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Outstanding requests in submission order.
    pub fn pending(&self) -> &[Request] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Are any time- or frame-based requests outstanding?
    pub fn has_timers(&self) -> bool {
        self.pending.iter().any(|r| r.due.is_timer())
    }

    // ── Submission ──────────────────────────────────────────────────

    pub fn submit(&mut self, due: Due, action: Action) {
        if let Action::Resume(handle) = action {
            let before = self.pending.len();
            self.pending.retain(|r| r.action != Action::Resume(handle));
            if self.pending.len() != before {
                tracing::trace!(?handle, "replaced outstanding resume");
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        tracing::trace!(seq, ?due, ?action, "submitted request");
        self.pending.push(Request { seq, due, action });
    }

    /// `seconds` from now; negative durations are due immediately.
    pub fn after_seconds(&self, seconds: f64) -> Due {
        Due::Seconds(self.now + seconds.max(0.0))
    }

    /// `frames` from now; at least one frame.
    pub fn after_frames(&self, frames: i64) -> Due {
        let frames = u64::try_from(frames).unwrap_or(0).max(1);
        Due::Frame(self.frame.saturating_add(frames))
    }

    // ── Clock ───────────────────────────────────────────────────────

    /// Move to the next frame, advancing time by one frame's duration.
    pub fn advance_frame(&mut self) {
        self.frame += 1;
        self.now += self.frame_seconds;
    }

    pub fn advance_seconds(&mut self, seconds: f64) {
        self.now += seconds.max(0.0);
    }

    fn advance_to(&mut self, due: &Due) {
        match *due {
            Due::Seconds(at) => self.now = self.now.max(at),
            Due::Frame(frame) => {
                while self.frame < frame {
                    self.advance_frame();
                }
            }
            Due::Completion { .. } => {}
        }
    }

    // ── Taking requests ─────────────────────────────────────────────

    fn is_due(&self, due: &Due) -> bool {
        match *due {
            Due::Seconds(at) => at <= self.now,
            Due::Frame(frame) => frame <= self.frame,
            Due::Completion { .. } => false,
        }
    }

    /// Remove the oldest timer that is due.
    pub(crate) fn take_due_timer(&mut self) -> Option<Request> {
        let index = self.pending.iter().position(|r| self.is_due(&r.due))?;
        Some(self.pending.remove(index))
    }

    /// Remove the oldest completion request whose tasks are done.
    pub(crate) fn take_ready_completion(
        &mut self,
        done: impl Fn(&[TaskId], JoinMode) -> bool,
    ) -> Option<Request> {
        let index = self.pending.iter().position(|r| match &r.due {
            Due::Completion { tasks, mode } => done(tasks, *mode),
            Due::Seconds(_) | Due::Frame(_) => false,
        })?;
        Some(self.pending.remove(index))
    }

    /// Sequence numbers of the outstanding timers.
    pub(crate) fn timer_seqs(&self) -> Vec<u64> {
        self.pending
            .iter()
            .filter(|r| r.due.is_timer())
            .map(|r| r.seq)
            .collect()
    }

    /// Remove a request by sequence number, moving the clock up to its
    /// due time.
    pub(crate) fn take_seq(&mut self, seq: u64) -> Option<Request> {
        let index = self.pending.iter().position(|r| r.seq == seq)?;
        let request = self.pending.remove(index);
        self.advance_to(&request.due);
        Some(request)
    }
}

#[cfg(test)]
mod tests;
