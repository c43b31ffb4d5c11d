//! Device scripts and their builder.

use std::time::Duration;

use super::context::ScriptContext;
use super::step::{ExpectStep, SendText, TimeoutPolicy};
use crate::channel::Pattern;
use crate::error::ScriptError;

/// An ordered conversation with one kind of device.
///
/// Scripts are pure data: they hold no connection state and are shared
/// between jobs behind an `Arc`.
#[derive(Debug, Clone)]
pub struct DeviceScript {
    name: String,
    line_terminator: String,
    default_timeout: Duration,
    prompt: Option<Pattern>,
    steps: Vec<ExpectStep>,
    auth_failure_patterns: Vec<Pattern>,
}

impl DeviceScript {
    /// Start building a script called `name`.
    pub fn builder(name: impl Into<String>) -> ScriptBuilder {
        ScriptBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appended to every line the script sends.
    pub fn line_terminator(&self) -> &str {
        &self.line_terminator
    }

    /// Timeout for steps that do not set their own.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// The device prompt, if the script declared one.
    pub fn prompt(&self) -> Option<&Pattern> {
        self.prompt.as_ref()
    }

    pub fn steps(&self) -> &[ExpectStep] {
        &self.steps
    }

    /// Patterns that mean the device refused our credentials.
    pub fn auth_failure_patterns(&self) -> &[Pattern] {
        &self.auth_failure_patterns
    }

    /// Effective timeout for `step`.
    pub fn step_timeout(&self, step: &ExpectStep) -> Duration {
        step.timeout().unwrap_or(self.default_timeout)
    }
}

/// Builder for [`DeviceScript`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use confgrab::channel::Pattern;
/// use confgrab::script::{DeviceScript, TimeoutPolicy};
///
/// let script = DeviceScript::builder("lab_switch")
///     .timeout(Duration::from_secs(10))
///     .prompt(Pattern::prompt(r"switch#").unwrap())
///     .wait().expect(Pattern::literal("Username:"))
///     .send_username().authenticating().expect(Pattern::literal("Password:"))
///     .send_password().authenticating().expect_prompt()
///     .send("terminal length 0").expect_prompt()
///     .send("show running-config").capture().on_timeout(TimeoutPolicy::Retry(1)).expect_prompt()
///     .send("exit").accept_eof().expect(Pattern::Any)
///     .build()
///     .unwrap();
///
/// assert_eq!(script.steps().len(), 6);
/// ```
#[derive(Debug)]
pub struct ScriptBuilder {
    name: String,
    line_terminator: String,
    default_timeout: Duration,
    prompt: Option<Pattern>,
    steps: Vec<ExpectStep>,
    auth_failure_patterns: Vec<Pattern>,
    problems: Vec<String>,
}

impl ScriptBuilder {
    /// Create a builder with a `\n` terminator and a 30 second timeout.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            line_terminator: "\n".to_string(),
            default_timeout: Duration::from_secs(30),
            prompt: None,
            steps: Vec::new(),
            auth_failure_patterns: Vec::new(),
            problems: Vec::new(),
        }
    }

    /// Set the line terminator.
    pub fn line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    /// Set the default step timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the prompt used by [`PendingStep::expect_prompt`].
    pub fn prompt(mut self, prompt: Pattern) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Add an authentication failure pattern.
    pub fn auth_failure(mut self, pattern: Pattern) -> Self {
        self.auth_failure_patterns.push(pattern);
        self
    }

    /// Append a fully built step.
    pub fn step(mut self, step: ExpectStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Begin a step that sends `text`.
    pub fn send(self, text: impl Into<SendText>) -> PendingStep {
        PendingStep::new(self, text.into())
    }

    /// Begin a step that sends nothing and only waits.
    pub fn wait(self) -> PendingStep {
        PendingStep::new(self, SendText::None)
    }

    /// Begin a step that sends the device's username.
    pub fn send_username(self) -> PendingStep {
        PendingStep::new(self, SendText::Username)
    }

    /// Begin a step that sends the device's password.
    pub fn send_password(self) -> PendingStep {
        PendingStep::new(self, SendText::Password)
    }

    /// Begin a step that sends the device's enable password.
    pub fn send_enable_password(self) -> PendingStep {
        PendingStep::new(self, SendText::EnablePassword)
    }

    /// Begin a step whose text is computed from earlier output.
    pub fn send_with<F>(self, generate: F) -> PendingStep
    where
        F: Fn(&ScriptContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        PendingStep::new(self, SendText::from_fn(generate))
    }

    /// Validate and build the script.
    pub fn build(self) -> Result<DeviceScript, ScriptError> {
        let mut problems = self.problems;
        if self.name.trim().is_empty() {
            problems.push("script name is empty".to_string());
        }
        if self.steps.is_empty() {
            problems.push("script has no steps".to_string());
        }
        if self.default_timeout.is_zero() {
            problems.push("default timeout is zero".to_string());
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.timeout().is_some_and(|t| t.is_zero()) {
                problems.push(format!("step {} has a zero timeout", index));
            }
        }

        if !problems.is_empty() {
            return Err(ScriptError::InvalidDefinition {
                message: format!("{}: {}", self.name, problems.join("; ")),
            });
        }

        Ok(DeviceScript {
            name: self.name,
            line_terminator: self.line_terminator,
            default_timeout: self.default_timeout,
            prompt: self.prompt,
            steps: self.steps,
            auth_failure_patterns: self.auth_failure_patterns,
        })
    }
}

/// A step under construction. Finished by [`expect`](Self::expect) or
/// [`expect_prompt`](Self::expect_prompt), which hand the builder back.
#[derive(Debug)]
pub struct PendingStep {
    builder: ScriptBuilder,
    step: ExpectStep,
}

impl PendingStep {
    fn new(builder: ScriptBuilder, send: SendText) -> Self {
        Self {
            builder,
            step: ExpectStep::new(send, Pattern::Any),
        }
    }

    /// Include this step's output in the artifact.
    pub fn capture(mut self) -> Self {
        self.step = self.step.with_capture(true);
        self
    }

    /// What to do if the pattern does not arrive in time.
    pub fn on_timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.step = self.step.with_on_timeout(policy);
        self
    }

    /// Override the script's default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.step = self.step.with_timeout(timeout);
        self
    }

    /// Output that means the device rejected this step.
    pub fn reject(mut self, pattern: Pattern) -> Self {
        self.step = self.step.with_reject(pattern);
        self
    }

    /// Also watch for the script's authentication failure patterns.
    pub fn authenticating(mut self) -> Self {
        self.step = self.step.with_authenticating(true);
        self
    }

    /// Mask the sent text.
    pub fn hidden(mut self) -> Self {
        self.step = self.step.with_hidden(true);
        self
    }

    /// End of stream counts as success.
    pub fn accept_eof(mut self) -> Self {
        self.step = self.step.with_accept_eof(true);
        self
    }

    /// Run the step only when `condition` holds.
    pub fn only_if<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ScriptContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.step = self.step.with_condition(condition);
        self
    }

    /// Finish the step, waiting for `pattern`.
    pub fn expect(self, pattern: Pattern) -> ScriptBuilder {
        let mut builder = self.builder;
        builder.steps.push(self.step.with_pattern(pattern));
        builder
    }

    /// Finish the step, waiting for the script's prompt.
    pub fn expect_prompt(self) -> ScriptBuilder {
        let mut builder = self.builder;
        match builder.prompt.clone() {
            Some(prompt) => builder.steps.push(self.step.with_pattern(prompt)),
            None => {
                let index = builder.steps.len();
                builder
                    .problems
                    .push(format!("step {} expects the prompt but none is set", index));
            }
        }
        builder
    }
}
