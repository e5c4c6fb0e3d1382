use crate::core::story::SceneSource;
use log::{debug, error, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

/// Where the current generation cycle stands.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleState {
    Idle,
    RequestingNarrative,
    NarrativeFailed { reason: String },
    NarrativeReady,
    ExtractingScenes,
    ScenesReady { source: SceneSource, count: usize },
    RequestingIllustrations { done: usize, total: usize },
    IllustrationsSettled { succeeded: usize, total: usize },
    Assembling,
    Downloaded { path: PathBuf },
    AssemblyFailed { reason: String },
}

pub type Subscriber = Box<dyn Fn(&CycleState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(usize);

/// State store for one page view. Subscribers are called on every transition,
/// in registration order, and stay registered until `unsubscribe`.
pub struct StoryState {
    current: CycleState,
    next_id: usize,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl Default for StoryState {
    fn default() -> Self {
        Self::new()
    }
}

impl StoryState {
    pub fn new() -> Self {
        Self {
            current: CycleState::Idle,
            next_id: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn current(&self) -> &CycleState {
        &self.current
    }

    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn transition(&mut self, next: CycleState) {
        debug!("Cycle state: {:?} -> {:?}", self.current, next);
        self.current = next;
        for (_, subscriber) in &self.subscribers {
            subscriber(&self.current);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Warning => "warn",
            NoticeLevel::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.message)
    }
}

/// User-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);

    fn info(&self, message: &str) {
        self.notify(Notice::new(NoticeLevel::Info, message));
    }
    fn success(&self, message: &str) {
        self.notify(Notice::new(NoticeLevel::Success, message));
    }
    fn warning(&self, message: &str) {
        self.notify(Notice::new(NoticeLevel::Warning, message));
    }
    fn error(&self, message: &str) {
        self.notify(Notice::new(NoticeLevel::Error, message));
    }
}

/// Prints notices to stdout and mirrors them into the log.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info | NoticeLevel::Success => info!("{}", notice.message),
            NoticeLevel::Warning => warn!("{}", notice.message),
            NoticeLevel::Error => error!("{}", notice.message),
        }
        println!("{}", notice);
    }
}

/// Keeps every notice in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn messages(&self, level: NoticeLevel) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter(|n| n.level == level)
            .map(|n| n.message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_subscribers_see_every_transition() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut state = StoryState::new();

        let sink = seen.clone();
        let id = state.subscribe(Box::new(move |s| sink.lock().unwrap().push(s.clone())));

        state.transition(CycleState::RequestingNarrative);
        state.transition(CycleState::NarrativeReady);
        assert_eq!(state.current(), &CycleState::NarrativeReady);

        assert!(state.unsubscribe(id));
        assert!(!state.unsubscribe(id));
        state.transition(CycleState::Idle);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![CycleState::RequestingNarrative, CycleState::NarrativeReady]
        );
        assert_eq!(state.current(), &CycleState::Idle);
    }

    #[test]
    fn test_recording_notifier_filters_by_level() {
        let notifier = RecordingNotifier::new();
        notifier.success("Image 1 generated!");
        notifier.error("Failed to generate image 2: boom");

        assert_eq!(notifier.notices().len(), 2);
        assert_eq!(
            notifier.messages(NoticeLevel::Error),
            vec!["Failed to generate image 2: boom".to_string()]
        );
    }
}
