use crate::{
    AgentQuestion, AgentStatus, BoundedLogBuffer, ConnectionState, LogEntry, ProgressSnapshot,
    ServerFrame, DEFAULT_LOG_CAPACITY,
};

/// Per-field change counters, bumped whenever the field is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Revisions {
    pub status: u64,
    pub progress: u64,
    pub question: u64,
}

/// Authoritative values fetched over REST after a reconnect. `None` means the
/// fetch for that field failed or was skipped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciliation {
    pub agent_status: Option<AgentStatus>,
    pub progress: Option<ProgressSnapshot>,
    pub pending_question: Option<Option<AgentQuestion>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub status_applied: bool,
    pub progress_applied: bool,
    pub question_applied: bool,
}

impl ReconcileReport {
    pub fn any(&self) -> bool {
        self.status_applied || self.progress_applied || self.question_applied
    }
}

/// Client-side view of one project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectState {
    scope: Option<String>,
    connection: ConnectionState,
    agent_status: AgentStatus,
    progress: ProgressSnapshot,
    logs: BoundedLogBuffer,
    pending_question: Option<AgentQuestion>,
    revisions: Revisions,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self::unscoped(DEFAULT_LOG_CAPACITY)
    }
}

impl ProjectState {
    pub fn unscoped(log_capacity: usize) -> Self {
        Self {
            scope: None,
            connection: ConnectionState::Disconnected,
            agent_status: AgentStatus::default(),
            progress: ProgressSnapshot::default(),
            logs: BoundedLogBuffer::new(log_capacity),
            pending_question: None,
            revisions: Revisions::default(),
        }
    }

    pub fn for_scope(scope: impl Into<String>, log_capacity: usize) -> Self {
        Self {
            scope: Some(scope.into()),
            ..Self::unscoped(log_capacity)
        }
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn agent_status(&self) -> AgentStatus {
        self.agent_status
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress
    }

    pub fn logs(&self) -> &BoundedLogBuffer {
        &self.logs
    }

    pub fn pending_question(&self) -> Option<&AgentQuestion> {
        self.pending_question.as_ref()
    }

    pub fn revisions(&self) -> Revisions {
        self.revisions
    }

    /// Returns false when the state was already `next`.
    pub fn set_connection(&mut self, next: ConnectionState) -> bool {
        if self.connection == next {
            return false;
        }
        self.connection = next;
        true
    }

    /// Applies one decoded frame. Pong carries no state and reports false.
    pub fn apply_frame(&mut self, frame: ServerFrame) -> bool {
        match frame {
            ServerFrame::AgentStatus { status } => {
                self.agent_status = status;
                self.revisions.status += 1;
            }
            ServerFrame::Progress(snapshot) => {
                self.progress = snapshot;
                self.revisions.progress += 1;
            }
            ServerFrame::Log(entry) => self.push_log(entry),
            ServerFrame::AgentQuestion { question } => {
                self.pending_question = Some(question);
                self.revisions.question += 1;
            }
            ServerFrame::Pong => return false,
        }
        true
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
    }

    pub fn clear_logs(&mut self) -> bool {
        if self.logs.is_empty() {
            return false;
        }
        self.logs.clear();
        true
    }

    pub fn clear_pending_question(&mut self) -> bool {
        if self.pending_question.take().is_none() {
            return false;
        }
        self.revisions.question += 1;
        true
    }

    /// Clears the pending question only if it is still the one identified by `id`.
    pub fn resolve_question(&mut self, id: &str) -> bool {
        if self.pending_question.as_ref().map(|q| q.id.as_str()) != Some(id) {
            return false;
        }
        self.clear_pending_question()
    }

    /// Applies each fetched field unless the stream replaced it after `seen`
    /// was captured; a newer streamed value always wins over a REST read.
    pub fn apply_reconciliation(&mut self, fetched: Reconciliation, seen: Revisions) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if let Some(status) = fetched.agent_status {
            if self.revisions.status == seen.status {
                self.agent_status = status;
                self.revisions.status += 1;
                report.status_applied = true;
            }
        }
        if let Some(progress) = fetched.progress {
            if self.revisions.progress == seen.progress {
                self.progress = progress;
                self.revisions.progress += 1;
                report.progress_applied = true;
            }
        }
        if let Some(question) = fetched.pending_question {
            if self.revisions.question == seen.question {
                self.pending_question = question;
                self.revisions.question += 1;
                report.question_applied = true;
            }
        }
        report
    }
}
