use chrono::{DateTime, Local};
#[cfg(test)]
use std::sync::Mutex;

/// One entry of the progress stream: when it happened and what happened
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl ProgressEvent {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
        }
    }
}

/// Trait for terminal output operations to enable testing with mocks
pub trait Output: Send + Sync {
    /// Print a success message
    fn success(&self, message: &str);

    /// Print an error message
    fn error(&self, message: &str);

    /// Print a warning message
    fn warning(&self, message: &str);

    /// Print an info message
    fn info(&self, message: &str);

    /// Print a section header
    fn section(&self, title: &str);

    /// Print a key-value pair
    fn key_value(&self, key: &str, value: &str);

    /// Print a stage indicator (`[n/total] description`)
    fn step(&self, number: usize, total: usize, description: &str);

    /// Print a progress event
    fn progress(&self, event: &ProgressEvent);

    /// Print a file path
    fn path(&self, path: &str);
}

/// Real terminal output implementation using the output module
pub struct TerminalOutput;

impl Output for TerminalOutput {
    fn success(&self, message: &str) {
        crate::output::success(message);
    }

    fn error(&self, message: &str) {
        crate::output::error(message);
    }

    fn warning(&self, message: &str) {
        crate::output::warning(message);
    }

    fn info(&self, message: &str) {
        crate::output::info(message);
    }

    fn section(&self, title: &str) {
        crate::output::section(title);
    }

    fn key_value(&self, key: &str, value: &str) {
        crate::output::key_value(key, value);
    }

    fn step(&self, number: usize, total: usize, description: &str) {
        crate::output::step(number, total, description);
    }

    fn progress(&self, event: &ProgressEvent) {
        crate::output::progress(&event.timestamp, &event.message);
    }

    fn path(&self, path: &str) {
        crate::output::path(path);
    }
}

/// Output message captured by MockOutput for testing
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum OutputMessage {
    Success(String),
    Error(String),
    Warning(String),
    Info(String),
    Section(String),
    KeyValue(String, String),
    Step(usize, usize, String),
    Progress(String),
    Path(String),
}

/// Mock output implementation for testing (captures output)
#[cfg(test)]
#[derive(Debug)]
pub struct MockOutput {
    messages: Mutex<Vec<OutputMessage>>,
    events: Mutex<Vec<ProgressEvent>>,
}

#[cfg(test)]
impl MockOutput {
    /// Create new mock output
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Get all captured messages
    pub fn get_messages(&self) -> Vec<OutputMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Check if any error message was output
    pub fn has_error(&self) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, OutputMessage::Error(_)))
    }

    /// Get all progress events, in emission order
    pub fn get_events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Get all progress messages
    pub fn get_progress(&self) -> Vec<String> {
        self.get_events().into_iter().map(|e| e.message).collect()
    }

    /// Get all stage descriptions
    pub fn get_steps(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                OutputMessage::Step(n, total, description) => {
                    Some(format!("{}/{} {}", n, total, description))
                }
                _ => None,
            })
            .collect()
    }

    /// Get all messages formatted as text
    pub fn to_text(&self) -> String {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|msg| match msg {
                OutputMessage::Success(s) => format!("✓ {}", s),
                OutputMessage::Error(s) => format!("✗ {}", s),
                OutputMessage::Warning(s) => format!("⚠ {}", s),
                OutputMessage::Info(s) => s.clone(),
                OutputMessage::Section(s) => format!("\n=== {} ===", s),
                OutputMessage::KeyValue(k, v) => format!("{}: {}", k, v),
                OutputMessage::Step(n, total, s) => format!("[{}/{}] {}", n, total, s),
                OutputMessage::Progress(s) => s.clone(),
                OutputMessage::Path(s) => s.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push(&self, message: OutputMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

#[cfg(test)]
impl Default for MockOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Output for MockOutput {
    fn success(&self, message: &str) {
        self.push(OutputMessage::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(OutputMessage::Error(message.to_string()));
    }

    fn warning(&self, message: &str) {
        self.push(OutputMessage::Warning(message.to_string()));
    }

    fn info(&self, message: &str) {
        self.push(OutputMessage::Info(message.to_string()));
    }

    fn section(&self, title: &str) {
        self.push(OutputMessage::Section(title.to_string()));
    }

    fn key_value(&self, key: &str, value: &str) {
        self.push(OutputMessage::KeyValue(key.to_string(), value.to_string()));
    }

    fn step(&self, number: usize, total: usize, description: &str) {
        self.push(OutputMessage::Step(number, total, description.to_string()));
    }

    fn progress(&self, event: &ProgressEvent) {
        self.push(OutputMessage::Progress(event.message.clone()));
        self.events.lock().unwrap().push(event.clone());
    }

    fn path(&self, path: &str) {
        self.push(OutputMessage::Path(path.to_string()));
    }
}
