//! Fetch session state machine.
//!
//! ```text
//! pending ──start──▶ in_progress ──complete_success──▶ success
//!    │                   │ └──────complete_failure──▶ failed ──┐
//!    └──────cancel───────┴──────────cancel──────────▶ cancelled ┤
//!    ▲                                                         │
//!    └────────────────────────── retry ─────────────────────────┘
//! ```
//!
//! Fields are private; the transition methods are the only mutators.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{FetchError, Result};
use crate::models::Period;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// The transition table.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Success)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
                | (Failed, Pending)
                | (Cancelled, Pending)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(FetchError::InvalidInput(format!(
                "unknown session status '{}'",
                other
            ))),
        }
    }
}

/// One call to one source. Never mutated after it is appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAttempt {
    pub source_id: String,
    pub source_name: String,
    pub attempted_at: DateTime<Utc>,
    pub success: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Flat, serializable form of a session used at the persistence boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub period: Period,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts: Vec<SourceAttempt>,
    pub final_source: Option<String>,
    pub retry_count: u32,
    pub error: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FetchSession {
    id: String,
    period: Period,
    status: SessionStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    attempts: Vec<SourceAttempt>,
    final_source: Option<String>,
    retry_count: u32,
    error: Option<String>,
}

impl FetchSession {
    /// A new `pending` session.
    pub fn new(period: Period, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            period,
            status: SessionStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            attempts: Vec::new(),
            final_source: None,
            retry_count: 0,
            error: None,
        }
    }

    /// Rebuilds a session from storage, rejecting inconsistent records.
    pub fn restore(snapshot: SessionSnapshot) -> Result<Self> {
        let invalid = |what: &str| {
            FetchError::InvalidInput(format!("session {}: {}", snapshot.id, what))
        };
        if snapshot.status.is_terminal() != snapshot.completed_at.is_some() {
            return Err(invalid("completed_at does not match status"));
        }
        if snapshot.final_source.is_some() && snapshot.status != SessionStatus::Success {
            return Err(invalid("final source on unsuccessful session"));
        }
        if snapshot.status == SessionStatus::Success && snapshot.final_source.is_none() {
            return Err(invalid("successful session without final source"));
        }
        Ok(Self {
            id: snapshot.id,
            period: snapshot.period,
            status: snapshot.status,
            created_at: snapshot.created_at,
            started_at: snapshot.started_at,
            completed_at: snapshot.completed_at,
            attempts: snapshot.attempts,
            final_source: snapshot.final_source,
            retry_count: snapshot.retry_count,
            error: snapshot.error,
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            period: self.period,
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            attempts: self.attempts.clone(),
            final_source: self.final_source.clone(),
            retry_count: self.retry_count,
            error: self.error.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn attempts(&self) -> &[SourceAttempt] {
        &self.attempts
    }

    pub fn final_source(&self) -> Option<&str> {
        self.final_source.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn transition(&mut self, next: SessionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(FetchError::StateConflict(format!(
                "session {}: {} -> {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SessionStatus::InProgress)?;
        self.started_at = Some(now);
        Ok(())
    }

    /// Appends an attempt. Allowed while running, and after a cancel so the
    /// attempt that was already in flight is still recorded.
    pub fn record_attempt(&mut self, attempt: SourceAttempt) -> Result<()> {
        match self.status {
            SessionStatus::InProgress | SessionStatus::Cancelled => {
                self.attempts.push(attempt);
                Ok(())
            }
            other => Err(FetchError::StateConflict(format!(
                "session {}: cannot record attempt while {}",
                self.id, other
            ))),
        }
    }

    pub fn complete_success(&mut self, source_name: &str, now: DateTime<Utc>) -> Result<()> {
        self.transition(SessionStatus::Success)?;
        self.final_source = Some(source_name.to_string());
        self.completed_at = Some(now);
        self.error = None;
        Ok(())
    }

    pub fn complete_failure(&mut self, error: &str, now: DateTime<Utc>) -> Result<()> {
        self.transition(SessionStatus::Failed)?;
        self.completed_at = Some(now);
        self.error = Some(error.to_string());
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SessionStatus::Cancelled)?;
        self.completed_at = Some(now);
        self.error = Some("cancelled".to_string());
        Ok(())
    }

    /// `failed | cancelled -> pending`, incrementing `retry_count` by one.
    pub fn retry(&mut self) -> Result<()> {
        self.transition(SessionStatus::Pending)?;
        self.retry_count += 1;
        self.completed_at = None;
        self.error = None;
        self.final_source = None;
        self.started_at = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn session() -> FetchSession {
        FetchSession::new(Period::monthly(2024, 3).unwrap(), Utc::now())
    }

    fn attempt(success: bool) -> SourceAttempt {
        SourceAttempt {
            source_id: "a".to_string(),
            source_name: "A".to_string(),
            attempted_at: Utc::now(),
            success,
            response_time_ms: 12,
            error: (!success).then(|| "timeout".to_string()),
        }
    }

    #[test]
    fn test_happy_path() {
        let mut s = session();
        assert_eq!(s.status(), SessionStatus::Pending);
        s.start(Utc::now()).unwrap();
        s.record_attempt(attempt(false)).unwrap();
        s.record_attempt(attempt(true)).unwrap();
        s.complete_success("A", Utc::now()).unwrap();

        assert_eq!(s.status(), SessionStatus::Success);
        assert_eq!(s.final_source(), Some("A"));
        assert_eq!(s.attempts().len(), 2);
        assert!(s.completed_at().is_some());
    }

    #[test]
    fn test_start_twice_is_state_conflict() {
        let mut s = session();
        s.start(Utc::now()).unwrap();
        assert!(matches!(s.start(Utc::now()), Err(FetchError::StateConflict(_))));
    }

    #[test]
    fn test_retry_only_from_failed_or_cancelled() {
        let mut s = session();
        assert!(s.retry().is_err());
        s.start(Utc::now()).unwrap();
        assert!(s.retry().is_err());
        s.complete_failure("all sources failed", Utc::now()).unwrap();

        s.retry().unwrap();
        assert_eq!(s.status(), SessionStatus::Pending);
        assert_eq!(s.retry_count(), 1);
        assert!(s.completed_at().is_none());
        assert!(s.error().is_none());

        s.cancel(Utc::now()).unwrap();
        s.retry().unwrap();
        assert_eq!(s.retry_count(), 2);
    }

    #[test]
    fn test_success_is_final() {
        let mut s = session();
        s.start(Utc::now()).unwrap();
        s.complete_success("A", Utc::now()).unwrap();
        assert!(s.cancel(Utc::now()).is_err());
        assert!(s.retry().is_err());
        assert!(s.record_attempt(attempt(true)).is_err());
    }

    #[test]
    fn test_restore_rejects_inconsistent_snapshot() {
        let mut s = session();
        s.start(Utc::now()).unwrap();
        s.complete_success("A", Utc::now()).unwrap();
        let snapshot = s.snapshot();
        assert!(FetchSession::restore(snapshot.clone()).is_ok());

        let mut broken = snapshot;
        broken.completed_at = None;
        assert!(FetchSession::restore(broken).is_err());
    }

    #[derive(Clone, Copy, Debug)]
    enum Op {
        Start,
        Success,
        Failure,
        Cancel,
        Retry,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Start),
            Just(Op::Success),
            Just(Op::Failure),
            Just(Op::Cancel),
            Just(Op::Retry),
        ]
    }

    proptest! {
        #[test]
        fn prop_only_allowed_edges(ops in proptest::collection::vec(op(), 0..40)) {
            let mut s = session();
            for op in ops {
                let before = s.status();
                let retries = s.retry_count();
                let now = Utc::now();
                let result = match op {
                    Op::Start => s.start(now),
                    Op::Success => s.complete_success("A", now),
                    Op::Failure => s.complete_failure("x", now),
                    Op::Cancel => s.cancel(now),
                    Op::Retry => s.retry(),
                };
                match result {
                    Ok(()) => {
                        prop_assert!(before.can_transition_to(s.status()));
                        let expected = if matches!(op, Op::Retry) { retries + 1 } else { retries };
                        prop_assert_eq!(s.retry_count(), expected);
                    }
                    Err(e) => {
                        prop_assert!(matches!(e, FetchError::StateConflict(_)));
                        prop_assert_eq!(s.status(), before);
                        prop_assert_eq!(s.retry_count(), retries);
                    }
                }
                prop_assert_eq!(s.status().is_terminal(), s.completed_at().is_some());
            }
        }
    }
}
