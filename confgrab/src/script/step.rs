//! One send/expect exchange in a device script.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::context::ScriptContext;
use crate::channel::Pattern;

/// What to do when a step's pattern does not show up in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Abort the whole script.
    #[default]
    Fail,
    /// Resend and re-expect up to `n` more times, then fail.
    Retry(u32),
    /// Record a soft failure and carry on with the next step.
    Skip,
}

/// Computes send text from what the session has seen so far.
pub type SendFn = Arc<dyn Fn(&ScriptContext<'_>) -> Option<String> + Send + Sync>;

/// Decides whether a step runs at all.
pub type StepCondition = Arc<dyn Fn(&ScriptContext<'_>) -> bool + Send + Sync>;

/// Text sent before a step's expect.
#[derive(Clone, Default)]
pub enum SendText {
    /// Send nothing, only wait.
    #[default]
    None,
    /// Literal command text.
    Text(String),
    /// The device's login username.
    Username,
    /// The device's login password. Never logged.
    Password,
    /// The device's enable password. Never logged.
    EnablePassword,
    /// Computed at run time; `None` skips the send but still expects.
    Generated(SendFn),
}

impl SendText {
    /// Build a generated send from a closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&ScriptContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        SendText::Generated(Arc::new(f))
    }

    /// Whether the rendered text must be masked in logs and records.
    pub fn is_secret(&self) -> bool {
        matches!(self, SendText::Password | SendText::EnablePassword)
    }
}

impl fmt::Debug for SendText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendText::None => f.write_str("None"),
            SendText::Text(text) => f.debug_tuple("Text").field(text).finish(),
            SendText::Username => f.write_str("Username"),
            SendText::Password => f.write_str("Password"),
            SendText::EnablePassword => f.write_str("EnablePassword"),
            SendText::Generated(_) => f.write_str("Generated(<fn>)"),
        }
    }
}

impl From<&str> for SendText {
    fn from(text: &str) -> Self {
        SendText::Text(text.to_string())
    }
}

impl From<String> for SendText {
    fn from(text: String) -> Self {
        SendText::Text(text)
    }
}

/// A single step: optionally send something, then wait for a pattern.
///
/// Steps are immutable once built; scripts share them behind an `Arc`.
#[derive(Clone)]
pub struct ExpectStep {
    send: SendText,
    pattern: Pattern,
    rejects: Vec<Pattern>,
    on_timeout: TimeoutPolicy,
    timeout: Option<Duration>,
    capture: bool,
    authenticating: bool,
    hidden: bool,
    accept_eof: bool,
    condition: Option<StepCondition>,
}

impl ExpectStep {
    /// Create a step that sends `send` and waits for `pattern`.
    pub fn new(send: impl Into<SendText>, pattern: Pattern) -> Self {
        Self {
            send: send.into(),
            pattern,
            rejects: Vec::new(),
            on_timeout: TimeoutPolicy::Fail,
            timeout: None,
            capture: false,
            authenticating: false,
            hidden: false,
            accept_eof: false,
            condition: None,
        }
    }

    /// Create a step that only waits for `pattern`.
    pub fn wait(pattern: Pattern) -> Self {
        Self::new(SendText::None, pattern)
    }

    /// Treat a match of `pattern` as an authentication rejection.
    pub fn with_reject(mut self, pattern: Pattern) -> Self {
        self.rejects.push(pattern);
        self
    }

    /// Set the timeout policy.
    pub fn with_on_timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.on_timeout = policy;
        self
    }

    /// Set a custom timeout for this step.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Include this step's output in the artifact.
    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Mark the step as part of login; the script's authentication
    /// failure patterns then compete with the step pattern.
    pub fn with_authenticating(mut self, authenticating: bool) -> Self {
        self.authenticating = authenticating;
        self
    }

    /// Mask the sent text in logs and records.
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Count end of stream as success (logout steps).
    pub fn with_accept_eof(mut self, accept_eof: bool) -> Self {
        self.accept_eof = accept_eof;
        self
    }

    /// Only run the step when `condition` holds.
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ScriptContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub(super) fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn send(&self) -> &SendText {
        &self.send
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn rejects(&self) -> &[Pattern] {
        &self.rejects
    }

    pub fn on_timeout(&self) -> TimeoutPolicy {
        self.on_timeout
    }

    /// Step timeout, if it overrides the script default.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_capture(&self) -> bool {
        self.capture
    }

    pub fn is_authenticating(&self) -> bool {
        self.authenticating
    }

    /// Whether sent text must be masked.
    pub fn is_hidden(&self) -> bool {
        self.hidden || self.send.is_secret()
    }

    pub fn accepts_eof(&self) -> bool {
        self.accept_eof
    }

    /// Evaluate the step's run condition.
    pub fn should_run(&self, context: &ScriptContext<'_>) -> bool {
        self.condition.as_ref().is_none_or(|condition| condition(context))
    }
}

impl fmt::Debug for ExpectStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectStep")
            .field("send", &self.send)
            .field("pattern", &self.pattern)
            .field("rejects", &self.rejects)
            .field("on_timeout", &self.on_timeout)
            .field("timeout", &self.timeout)
            .field("capture", &self.capture)
            .field("authenticating", &self.authenticating)
            .field("hidden", &self.hidden)
            .field("accept_eof", &self.accept_eof)
            .field("condition", &self.condition.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_defaults() {
        let step = ExpectStep::new("show version", Pattern::literal("#"));
        assert!(matches!(step.send(), SendText::Text(t) if t == "show version"));
        assert_eq!(step.on_timeout(), TimeoutPolicy::Fail);
        assert!(step.timeout().is_none());
        assert!(!step.is_capture());
        assert!(!step.is_hidden());
    }

    #[test]
    fn test_secret_sends_are_hidden() {
        let step = ExpectStep::new(SendText::Password, Pattern::literal("#"));
        assert!(step.is_hidden());

        let step = ExpectStep::new("enable", Pattern::literal(":")).with_hidden(true);
        assert!(step.is_hidden());
    }
}
