//! Cancelable prep/capture windows driven by frame timestamps.
//!
//! Arming a window bumps a generation counter and replaces any pending
//! deadlines, so at most one prep/capture pair is ever live. Every fired
//! event carries the token it was armed with; the owner compares it with
//! [`WindowScheduler::current`] and drops anything stale.

use tracing::debug;

use crate::types::CalibrationPhase;

/// Identifies one armed window pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub generation: u64,
    pub phase: CalibrationPhase,
    pub point_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Prep window elapsed: start capturing.
    PrepElapsed,
    /// Capture window elapsed: process the buffer.
    CaptureElapsed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowEvent {
    pub token: TimerToken,
    pub kind: WindowKind,
    /// When the event was due, in ms. Follow-up windows start from here.
    pub due_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pending {
    token: TimerToken,
    kind: WindowKind,
    due_ms: f64,
}

#[derive(Debug, Clone, Default)]
pub struct WindowScheduler {
    generation: u64,
    current: Option<TimerToken>,
    pending: Vec<Pending>,
}

impl WindowScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels whatever is pending and arms a new prep/capture pair starting
    /// at `start_ms`.
    pub fn arm(
        &mut self,
        phase: CalibrationPhase,
        point_index: usize,
        start_ms: f64,
        prep_ms: f64,
        capture_ms: f64,
    ) -> TimerToken {
        self.cancel();
        self.generation += 1;
        let token = TimerToken { generation: self.generation, phase, point_index };
        self.pending.push(Pending { token, kind: WindowKind::PrepElapsed, due_ms: start_ms + prep_ms });
        self.pending.push(Pending {
            token,
            kind: WindowKind::CaptureElapsed,
            due_ms: start_ms + prep_ms + capture_ms,
        });
        self.current = Some(token);
        token
    }

    /// Drops every pending deadline. Tokens handed out earlier become stale.
    pub fn cancel(&mut self) {
        if !self.pending.is_empty() {
            debug!("Cancelling {} pending window(s)", self.pending.len());
        }
        self.pending.clear();
        self.current = None;
    }

    pub fn current(&self) -> Option<TimerToken> {
        self.current
    }

    pub fn is_current(&self, token: &TimerToken) -> bool {
        self.current.as_ref() == Some(token)
    }

    /// Pops the earliest event due at or before `now_ms`.
    pub fn poll(&mut self, now_ms: f64) -> Option<WindowEvent> {
        let (idx, _) = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due_ms <= now_ms)
            .min_by(|a, b| a.1.due_ms.total_cmp(&b.1.due_ms))?;
        let p = self.pending.remove(idx);
        Some(WindowEvent { token: p.token, kind: p.kind, due_ms: p.due_ms })
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
