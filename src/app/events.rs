use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, Sender};

/// User-facing one-shot messages. Background work never prints; it pushes a
/// notice and the presentation layer decides how to surface it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
    pub at: DateTime<Utc>,
    pub trace_id: String,
}

#[derive(Clone)]
pub struct NoticeSender {
    tx: Sender<Notice>,
}

impl NoticeSender {
    pub fn info(&self, trace_id: &str, message: impl Into<String>) {
        self.push(Severity::Info, trace_id, message.into());
    }

    pub fn error(&self, trace_id: &str, message: impl Into<String>) {
        self.push(Severity::Error, trace_id, message.into());
    }

    fn push(&self, severity: Severity, trace_id: &str, message: String) {
        // A dropped receiver means nobody is listening anymore; the notice
        // is disposable by definition.
        let _ = self.tx.send(Notice {
            severity,
            message,
            at: Utc::now(),
            trace_id: trace_id.to_string(),
        });
    }
}

pub fn notice_channel() -> (NoticeSender, Receiver<Notice>) {
    let (tx, rx) = channel();
    (NoticeSender { tx }, rx)
}
