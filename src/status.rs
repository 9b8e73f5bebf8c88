use std::time::{Duration, Instant};

pub const IDLE_TEXT: &str = "Idle";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Default,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Default => "info",
            Severity::Success => "ok",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// The one-line status shown to the user. Messages revert to "Idle" once their
/// duration runs out; `tick` performs the revert.
#[derive(Debug, Clone)]
pub struct StatusLine {
    text: String,
    severity: Severity,
    expires_at: Option<Instant>,
    duration: Duration,
}

impl StatusLine {
    pub fn new(duration: Duration) -> Self {
        Self {
            text: IDLE_TEXT.to_string(),
            severity: Severity::Default,
            expires_at: None,
            duration,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn set(&mut self, text: impl Into<String>, severity: Severity) {
        self.text = text.into();
        self.severity = severity;
        self.expires_at = if self.duration.is_zero() {
            None
        } else {
            Some(Instant::now() + self.duration)
        };
    }

    pub fn reset(&mut self) {
        self.text = IDLE_TEXT.to_string();
        self.severity = Severity::Default;
        self.expires_at = None;
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                self.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn message_reverts_to_idle_after_duration() {
        let mut status = StatusLine::new(Duration::from_millis(50));
        status.set("Imported preset", Severity::Success);

        status.tick(Instant::now());
        assert_eq!(status.text(), "Imported preset");

        status.tick(Instant::now() + Duration::from_millis(60));
        assert_eq!(status.text(), IDLE_TEXT);
        assert_eq!(status.severity(), Severity::Default);
    }

    #[test]
    fn zero_duration_keeps_message() {
        let mut status = StatusLine::new(Duration::ZERO);
        status.set("Fetching presets...", Severity::Default);
        status.tick(Instant::now() + Duration::from_secs(3600));
        assert_eq!(status.text(), "Fetching presets...");
    }
}
