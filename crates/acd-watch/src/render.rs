use acd_core::{AgentStatus, ConnectionState, ProgressSnapshot, ProjectState};

/// What has already been printed, so each update renders only the delta.
#[derive(Debug, Default)]
pub struct Renderer {
    scope: Option<String>,
    connection: Option<ConnectionState>,
    status: Option<AgentStatus>,
    progress: Option<ProgressSnapshot>,
    logs_seen: u64,
    question_id: Option<String>,
}

impl Renderer {
    pub fn render(&mut self, state: &ProjectState) -> Vec<String> {
        let mut out = Vec::new();
        if state.scope() != self.scope.as_deref() {
            *self = Renderer {
                scope: state.scope().map(str::to_string),
                ..Renderer::default()
            };
            if let Some(scope) = state.scope() {
                out.push(format!("== {scope} =="));
            }
        }

        if self.connection != Some(state.connection()) {
            self.connection = Some(state.connection());
            out.push(format!("[link] {}", connection_label(state.connection())));
        }

        if self.status != Some(state.agent_status()) {
            self.status = Some(state.agent_status());
            out.push(format!("[agent] {}", state.agent_status()));
        }

        let progress = state.progress();
        if self.progress != Some(progress) {
            self.progress = Some(progress);
            out.push(format!("[progress] {}", progress_label(&progress)));
        }

        let logs = state.logs();
        let fresh = logs.appended().saturating_sub(self.logs_seen);
        self.logs_seen = logs.appended();
        let fresh = usize::try_from(fresh).unwrap_or(usize::MAX);
        for entry in logs.tail(fresh) {
            out.push(format!("{} {}", entry.time_label(), entry.line));
        }

        let question_id = state.pending_question().map(|question| question.id.clone());
        if question_id != self.question_id {
            match state.pending_question() {
                Some(question) => {
                    out.push(format!("[question {}] {}", question.id, question.question));
                    if let Some(context) = question.context.as_deref().filter(|c| !c.is_empty()) {
                        out.push(format!("  context: {context}"));
                    }
                    for (idx, option) in question.options.iter().flatten().enumerate() {
                        out.push(format!("  {}. {option}", idx + 1));
                    }
                    out.push("  reply with :answer <text>".to_string());
                }
                None => out.push("[question] none pending".to_string()),
            }
            self.question_id = question_id;
        }
        out
    }
}

fn connection_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => "connected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Disconnected => "disconnected; holding last snapshot",
    }
}

fn progress_label(progress: &ProgressSnapshot) -> String {
    let mut label = format!(
        "{}/{} passing ({:.1}%)",
        progress.passing, progress.total, progress.percentage
    );
    if progress.in_progress > 0 {
        label.push_str(&format!(", {} in progress", progress.in_progress));
    }
    if progress.is_complete() {
        label.push_str(", complete");
    }
    label
}
