//! Executes one device script over one expect engine.

use std::time::Duration;

use bytes::Bytes;
use log::{debug, warn};
use secrecy::ExposeSecret;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time::Instant;

use super::artifact::{Artifact, MASK, StepOutcome, StepRecord, normalize_newlines, strip_echo};
use super::failure::{FailureKind, SessionFailure};
use crate::channel::{EngineConfig, ExpectEngine, ExpectMatch, Pattern};
use crate::error::ChannelError;
use crate::script::{DeviceScript, ExpectStep, ScriptContext, SendText, TimeoutPolicy};
use crate::transport::Device;

/// Runs a [`DeviceScript`] against a device.
///
/// The runner borrows the device and script and owns nothing else; every
/// run gets its own engine and transport.
#[derive(Debug)]
pub struct SessionRunner<'a> {
    device: &'a Device,
    script: &'a DeviceScript,

    /// Whole-job deadline; no step may wait past it.
    deadline: Option<Instant>,

    /// Checked before every step.
    stop: Option<watch::Receiver<bool>>,
}

/// Result of one step that did not fail the session.
struct StepResult {
    outcome: StepOutcome,
    found: Option<ExpectMatch>,
    attempts: u32,
}

impl<'a> SessionRunner<'a> {
    pub fn new(device: &'a Device, script: &'a DeviceScript) -> Self {
        Self {
            device,
            script,
            deadline: None,
            stop: None,
        }
    }

    /// Bound the whole session by an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Bound the whole session by `timeout` from now.
    pub fn with_job_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Abort before the next step once `stop` becomes `true`.
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Run the script over `transport` and close it afterwards.
    ///
    /// The script's line terminator and default timeout override the
    /// matching fields of `config`.
    pub async fn run<T>(
        &self,
        transport: T,
        config: EngineConfig,
    ) -> Result<Artifact, SessionFailure>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let config = EngineConfig {
            line_terminator: self.script.line_terminator().to_string(),
            timeout: self.script.default_timeout(),
            ..config
        };
        let mut engine = ExpectEngine::new(transport, config).with_label(self.device.id.as_str());

        let result = self.run_engine(&mut engine).await;

        if let Err(e) = engine.close().await {
            debug!("{}: error closing transport: {}", self.device.id, e);
        }
        result
    }

    /// Run the script over an existing engine. The engine is left open.
    ///
    /// Lines are sent with the script's terminator from here on.
    pub async fn run_engine<T>(
        &self,
        engine: &mut ExpectEngine<T>,
    ) -> Result<Artifact, SessionFailure>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        engine.set_line_terminator(self.script.line_terminator());

        let started = Instant::now();
        let mut records: Vec<StepRecord> = Vec::with_capacity(self.script.steps().len());
        let mut soft_failures = Vec::new();
        let mut text = String::new();

        debug!(
            "{}: running script '{}' ({} steps)",
            self.device.id,
            self.script.name(),
            self.script.steps().len()
        );

        for (index, step) in self.script.steps().iter().enumerate() {
            if self.stop_requested() {
                return Err(self
                    .failure(FailureKind::Cancelled, "stop requested")
                    .at_step(index)
                    .with_buffer(&engine.last_buffer()));
            }

            let context = ScriptContext::new(self.device, &records);
            if !step.should_run(&context) {
                debug!("{}: step {} not run", self.device.id, index);
                records.push(StepRecord::not_run(index));
                continue;
            }
            let input = self
                .render(step, &context)
                .map_err(|f| f.at_step(index).with_buffer(&engine.last_buffer()))?;

            let step_started = Instant::now();
            let result = self
                .run_step(engine, index, step, input.as_deref())
                .await?;

            let (output, matched) = match &result.found {
                Some(found) => (
                    found.before_str().into_owned(),
                    found.matched_str().into_owned(),
                ),
                None => (String::new(), String::new()),
            };

            if step.is_capture() && result.outcome == StepOutcome::Matched {
                text.push_str(&normalize_newlines(strip_echo(&output, input.as_deref())));
            }
            if result.outcome == StepOutcome::SoftFailed {
                soft_failures.push(index);
            }

            records.push(StepRecord {
                index,
                input: input.map(|text| if step.is_hidden() { MASK.to_string() } else { text }),
                output,
                matched,
                outcome: result.outcome,
                attempts: result.attempts,
                elapsed: step_started.elapsed(),
            });
        }

        let elapsed = started.elapsed();
        debug!(
            "{}: script '{}' finished in {:?} ({} bytes captured)",
            self.device.id,
            self.script.name(),
            elapsed,
            text.len()
        );

        Ok(Artifact {
            device_id: self.device.id.clone(),
            script: self.script.name().to_string(),
            text,
            steps: records,
            soft_failures,
            elapsed,
        })
    }

    async fn run_step<T>(
        &self,
        engine: &mut ExpectEngine<T>,
        index: usize,
        step: &ExpectStep,
        input: Option<&str>,
    ) -> Result<StepResult, SessionFailure>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut patterns: Vec<&Pattern> = vec![step.pattern()];
        patterns.extend(step.rejects());
        if step.is_authenticating() {
            patterns.extend(self.script.auth_failure_patterns());
        }

        let budget = self.script.step_timeout(step);
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            if let Some(text) = input {
                debug!(
                    "{}: step {} sending {:?}",
                    self.device.id,
                    index,
                    if step.is_hidden() { MASK } else { text }
                );
                engine.send(text).await.map_err(|e| {
                    self.failure(FailureKind::TransportWrite, e.to_string())
                        .at_step(index)
                        .with_buffer(&engine.last_buffer())
                })?;
            }

            let step_deadline = Instant::now() + budget;
            let (deadline, job_bound) = match self.deadline {
                Some(job) if job <= step_deadline => (job, true),
                _ => (step_deadline, false),
            };

            debug!(
                "{}: step {} expecting {} within {:?}",
                self.device.id,
                index,
                step.pattern(),
                budget
            );

            match engine.expect_until(&patterns, deadline, budget).await {
                Ok(found) if found.pattern_index == 0 => {
                    return Ok(StepResult {
                        outcome: StepOutcome::Matched,
                        found: Some(found),
                        attempts,
                    });
                }
                Ok(found) => {
                    let rejected = found.matched_str().trim().to_string();
                    warn!("{}: step {} rejected: {}", self.device.id, index, rejected);
                    return Err(self
                        .failure(
                            FailureKind::AuthenticationFailed,
                            format!("device replied {:?}", rejected),
                        )
                        .at_step(index)
                        .with_buffer(found.consumed()));
                }
                Err(ChannelError::Timeout { buffer, .. }) if job_bound => {
                    return Err(self
                        .failure(FailureKind::JobTimeout, "job deadline passed")
                        .at_step(index)
                        .with_buffer(&buffer));
                }
                Err(ChannelError::Timeout { buffer, timeout }) => {
                    match step.on_timeout() {
                        TimeoutPolicy::Retry(retries) if attempts <= retries => {
                            warn!(
                                "{}: step {} timed out after {:?}, retry {}/{}",
                                self.device.id, index, timeout, attempts, retries
                            );
                        }
                        TimeoutPolicy::Skip => {
                            warn!(
                                "{}: step {} timed out after {:?}, skipping",
                                self.device.id, index, timeout
                            );
                            return Ok(StepResult {
                                outcome: StepOutcome::SoftFailed,
                                found: None,
                                attempts,
                            });
                        }
                        _ => {
                            return Err(
                                self.timeout_failure(index, step.pattern(), timeout, &buffer)
                            );
                        }
                    }
                }
                Err(ChannelError::Eof { .. }) if step.accepts_eof() => {
                    debug!("{}: step {} saw end of stream", self.device.id, index);
                    return Ok(StepResult {
                        outcome: StepOutcome::Eof,
                        found: None,
                        attempts,
                    });
                }
                Err(ChannelError::Eof { buffer }) => {
                    return Err(self
                        .failure(FailureKind::UnexpectedEof, "device closed the connection")
                        .at_step(index)
                        .with_buffer(&buffer));
                }
                Err(ChannelError::Read(e)) => {
                    return Err(self
                        .failure(FailureKind::UnexpectedEof, format!("read failed: {}", e))
                        .at_step(index)
                        .with_buffer(&engine.last_buffer()));
                }
                Err(e @ (ChannelError::Write(_) | ChannelError::InvalidPattern(_))) => {
                    return Err(self
                        .failure(FailureKind::Internal, e.to_string())
                        .at_step(index)
                        .with_buffer(&engine.last_buffer()));
                }
            }
        }
    }

    /// Produce the text a step sends, or `None` to only expect.
    fn render(
        &self,
        step: &ExpectStep,
        context: &ScriptContext<'_>,
    ) -> Result<Option<String>, SessionFailure> {
        let credentials = &self.device.credentials;
        let missing = |message: &str| self.failure(FailureKind::AuthenticationFailed, message);

        match step.send() {
            SendText::None => Ok(None),
            SendText::Text(text) => Ok(Some(text.clone())),
            SendText::Username => credentials
                .username
                .clone()
                .map(Some)
                .ok_or_else(|| missing("device asked for a username but none is configured")),
            SendText::Password => credentials
                .password
                .as_ref()
                .map(|secret| Some(secret.expose_secret().to_string()))
                .ok_or_else(|| missing("device asked for a password but none is configured")),
            SendText::EnablePassword => credentials
                .enable_password
                .as_ref()
                .map(|secret| Some(secret.expose_secret().to_string()))
                .ok_or_else(|| {
                    missing("privileged mode required but no enable password is configured")
                }),
            SendText::Generated(generate) => Ok(generate(context)),
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(|stop| *stop.borrow())
    }

    fn failure(&self, kind: FailureKind, message: impl Into<String>) -> SessionFailure {
        SessionFailure::new(self.device.id.as_str(), kind, message)
    }

    fn timeout_failure(
        &self,
        index: usize,
        pattern: &Pattern,
        timeout: Duration,
        buffer: &Bytes,
    ) -> SessionFailure {
        warn!(
            "{}: step {} timed out after {:?} waiting for {}",
            self.device.id, index, timeout, pattern
        );
        self.failure(
            FailureKind::ExpectTimeout,
            format!("{} not seen within {:?}", pattern, timeout),
        )
        .at_step(index)
        .with_buffer(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Credentials;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tokio_test::{assert_err, assert_ok};

    fn device() -> Device {
        Device::new("r1", "192.0.2.1", "test").with_credentials(Credentials::new("admin", "s3cret"))
    }

    fn raw_config() -> EngineConfig {
        EngineConfig {
            strip_ansi: false,
            ..EngineConfig::default()
        }
    }

    fn prompt() -> Pattern {
        Pattern::regex(r">\s*$").unwrap()
    }

    /// Read one line the runner sent, without the terminator.
    async fn read_line<S: AsyncRead + Unpin>(stream: &mut S) -> String {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).await.unwrap();
            if byte[0] == b'\n' {
                return String::from_utf8(line).unwrap();
            }
            line.push(byte[0]);
        }
    }

    #[tokio::test]
    async fn test_capture_before_prompt() {
        let script = DeviceScript::builder("test")
            .prompt(prompt())
            .send("cmd")
            .capture()
            .expect_prompt()
            .build()
            .unwrap();
        let device = device();

        let (client, mut server) = duplex(256);
        let fake = tokio::spawn(async move {
            assert_eq!(read_line(&mut server).await, "cmd");
            server.write_all(b"result\n> ").await.unwrap();
            server
        });

        let runner = SessionRunner::new(&device, &script);

        let artifact = assert_ok!(runner.run(client, raw_config()).await);
        assert_eq!(artifact.text, "result\n");
        assert_eq!(artifact.steps[0].outcome, StepOutcome::Matched);
        assert_eq!(artifact.steps[0].input.as_deref(), Some("cmd"));
        fake.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let script = DeviceScript::builder("test")
            .timeout(Duration::from_secs(2))
            .wait()
            .expect(prompt())
            .build()
            .unwrap();
        let device = device();
        let (client, _server) = duplex(64);

        let started = Instant::now();
        let runner = SessionRunner::new(&device, &script);
        let failure = assert_err!(runner.run(client, raw_config()).await);

        assert_eq!(failure.kind, FailureKind::ExpectTimeout);
        assert_eq!(failure.step_index, Some(0));
        assert!(failure.last_buffer.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_captures_concatenate_without_echo() {
        let script = DeviceScript::builder("test")
            .prompt(Pattern::prompt("router>").unwrap())
            .wait()
            .expect_prompt()
            .send("show version")
            .capture()
            .expect_prompt()
            .send("terminal length 0")
            .expect_prompt()
            .send("show running-config")
            .capture()
            .expect_prompt()
            .build()
            .unwrap();
        let device = device();

        let transport = tokio_test::io::Builder::new()
            .read(b"router> ")
            .write(b"show version\n")
            .read(b"show version\r\nVersion 15.2\r\n")
            .read(b"router> ")
            .write(b"terminal length 0\n")
            .read(b"terminal length 0\r\nrouter> ")
            .write(b"show running-config\n")
            .read(b"show running-config\r\nhostname r1\r\n!\r\nrouter> ")
            .build();

        let mut engine = ExpectEngine::new(transport, raw_config());
        let runner = SessionRunner::new(&device, &script);
        let artifact = assert_ok!(runner.run_engine(&mut engine).await);

        assert_eq!(artifact.text, "Version 15.2\nhostname r1\n!\n");
        assert_eq!(artifact.steps.len(), 4);
        assert!(!artifact.is_partial());
    }

    #[tokio::test]
    async fn test_run_engine_uses_script_terminator() {
        let script = DeviceScript::builder("test")
            .line_terminator("\r\n")
            .prompt(prompt())
            .auth_failure(Pattern::literal("% Authentication failed"))
            .wait()
            .expect(Pattern::literal("Password:"))
            .send_password()
            .authenticating()
            .expect_prompt()
            .build()
            .unwrap();
        let device = Device::new("r1", "192.0.2.1", "test")
            .with_credentials(Credentials::new("admin", "wrong"));

        let transport = tokio_test::io::Builder::new()
            .read(b"Password: ")
            .write(b"wrong\r\n")
            .read(b"\r\n% Authentication failed\r\n")
            .build();
        let mut engine = ExpectEngine::new(transport, raw_config());
        assert_eq!(engine.config().line_terminator, "\n");

        let runner = SessionRunner::new(&device, &script);
        let failure = assert_err!(runner.run_engine(&mut engine).await);
        assert_eq!(failure.kind, FailureKind::AuthenticationFailed);
        assert_eq!(failure.step_index, Some(1));
        assert_eq!(engine.config().line_terminator, "\r\n");
    }

    #[tokio::test]
    async fn test_auth_failure_pattern_fails_session() {
        let script = DeviceScript::builder("test")
            .prompt(prompt())
            .auth_failure(Pattern::literal("% Authentication failed"))
            .wait()
            .expect(Pattern::literal("Username:"))
            .send_username()
            .expect(Pattern::literal("Password:"))
            .send_password()
            .authenticating()
            .expect_prompt()
            .build()
            .unwrap();
        let device = device();

        let transport = tokio_test::io::Builder::new()
            .read(b"Username: ")
            .write(b"admin\n")
            .read(b"Password: ")
            .write(b"s3cret\n")
            .read(b"\r\n% Authentication failed\r\n\r\nUsername: ")
            .build();
        let mut engine = ExpectEngine::new(transport, raw_config());

        let runner = SessionRunner::new(&device, &script);

        let failure = assert_err!(runner.run_engine(&mut engine).await);
        assert_eq!(failure.kind, FailureKind::AuthenticationFailed);
        assert_eq!(failure.step_index, Some(2));
        // The password itself never ends up in the failure.
        assert!(!failure.to_string().contains("s3cret"));
    }

    #[tokio::test]
    async fn test_reject_pattern_fails_session() {
        let script = DeviceScript::builder("test")
            .prompt(prompt())
            .send("show running-config")
            .reject(Pattern::literal("% Invalid input"))
            .expect_prompt()
            .build()
            .unwrap();
        let device = device();

        let transport = tokio_test::io::Builder::new()
            .write(b"show running-config\n")
            .read(b"% Invalid input detected\r\nrouter> ")
            .build();
        let mut engine = ExpectEngine::new(transport, raw_config());

        let runner = SessionRunner::new(&device, &script);

        let failure = assert_err!(runner.run_engine(&mut engine).await);
        assert_eq!(failure.kind, FailureKind::AuthenticationFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_resends_and_succeeds() {
        let script = DeviceScript::builder("test")
            .send("ping")
            .timeout(Duration::from_secs(1))
            .on_timeout(TimeoutPolicy::Retry(2))
            .expect(Pattern::literal("pong"))
            .build()
            .unwrap();
        let device = device();

        let (client, mut server) = duplex(64);
        let fake = tokio::spawn(async move {
            // Ignore the first request, answer the second.
            assert_eq!(read_line(&mut server).await, "ping");
            assert_eq!(read_line(&mut server).await, "ping");
            server.write_all(b"pong").await.unwrap();
            server
        });

        let runner = SessionRunner::new(&device, &script);

        let artifact = assert_ok!(runner.run(client, raw_config()).await);
        assert_eq!(artifact.steps[0].attempts, 2);
        fake.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_fails() {
        let script = DeviceScript::builder("test")
            .send("ping")
            .timeout(Duration::from_secs(1))
            .on_timeout(TimeoutPolicy::Retry(1))
            .expect(Pattern::literal("pong"))
            .build()
            .unwrap();
        let device = device();
        let (client, _server) = duplex(64);

        let runner = SessionRunner::new(&device, &script);

        let failure = assert_err!(runner.run(client, raw_config()).await);
        assert_eq!(failure.kind, FailureKind::ExpectTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_records_soft_failure() {
        let script = DeviceScript::builder("test")
            .prompt(prompt())
            .wait()
            .timeout(Duration::from_secs(1))
            .on_timeout(TimeoutPolicy::Skip)
            .expect(Pattern::literal("--More--"))
            .wait()
            .capture()
            .expect_prompt()
            .build()
            .unwrap();
        let device = device();

        let (client, mut server) = duplex(64);
        let mut engine = ExpectEngine::new(client, raw_config());
        server.write_all(b"config\n> ").await.unwrap();

        let runner = SessionRunner::new(&device, &script);

        let artifact = assert_ok!(runner.run_engine(&mut engine).await);
        assert_eq!(artifact.soft_failures, vec![0]);
        assert_eq!(artifact.steps[0].outcome, StepOutcome::SoftFailed);
        assert_eq!(artifact.text, "config\n");
        assert!(artifact.is_partial());
    }

    #[tokio::test]
    async fn test_conditional_and_generated_steps() {
        let script = DeviceScript::builder("test")
            .prompt(prompt())
            .wait()
            .expect_prompt()
            .send("enable")
            .only_if(|ctx| ctx.has_enable_password())
            .expect(Pattern::literal("Password:"))
            .send_with(|ctx| ctx.last_output().map(|_| format!("echo {}", ctx.device_id())))
            .expect_prompt()
            .build()
            .unwrap();
        let device = device();

        let transport = tokio_test::io::Builder::new()
            .read(b"> ")
            .write(b"echo r1\n")
            .read(b"echo r1\r\n> ")
            .build();
        let mut engine = ExpectEngine::new(transport, raw_config());

        let runner = SessionRunner::new(&device, &script);

        let artifact = assert_ok!(runner.run_engine(&mut engine).await);
        assert_eq!(artifact.steps[1].outcome, StepOutcome::NotRun);
        assert_eq!(artifact.steps[2].input.as_deref(), Some("echo r1"));
    }

    #[tokio::test]
    async fn test_hidden_input_is_masked() {
        let script = DeviceScript::builder("test")
            .send_password()
            .expect(Pattern::literal(">"))
            .build()
            .unwrap();
        let device = device();

        let transport = tokio_test::io::Builder::new()
            .write(b"s3cret\n")
            .read(b">")
            .build();
        let mut engine = ExpectEngine::new(transport, raw_config());

        let runner = SessionRunner::new(&device, &script);

        let artifact = assert_ok!(runner.run_engine(&mut engine).await);
        assert_eq!(artifact.steps[0].input.as_deref(), Some(MASK));
    }

    #[tokio::test]
    async fn test_missing_password_fails() {
        let script = DeviceScript::builder("test")
            .send_password()
            .expect(Pattern::literal(">"))
            .build()
            .unwrap();
        let device = Device::new("r1", "192.0.2.1", "test");
        let (client, _server) = duplex(64);

        let runner = SessionRunner::new(&device, &script);

        let failure = assert_err!(runner.run(client, raw_config()).await);
        assert_eq!(failure.kind, FailureKind::AuthenticationFailed);
        assert_eq!(failure.step_index, Some(0));
    }

    #[tokio::test]
    async fn test_eof_mid_script_and_on_logout() {
        let script = DeviceScript::builder("test")
            .send("exit")
            .accept_eof()
            .expect(Pattern::literal("never"))
            .build()
            .unwrap();
        let device = device();

        let (client, server) = duplex(64);
        drop(server);
        let mut engine = ExpectEngine::new(client, raw_config());
        // The write fails first because the peer is gone.
        let runner = SessionRunner::new(&device, &script);
        let failure = assert_err!(runner.run_engine(&mut engine).await);
        assert_eq!(failure.kind, FailureKind::TransportWrite);

        let transport = tokio_test::io::Builder::new()
            .write(b"exit\n")
            .read(b"bye\r\n")
            .build();
        let mut engine = ExpectEngine::new(transport, raw_config());
        let runner = SessionRunner::new(&device, &script);
        let artifact = assert_ok!(runner.run_engine(&mut engine).await);
        assert_eq!(artifact.steps[0].outcome, StepOutcome::Eof);

        let script = DeviceScript::builder("test")
            .wait()
            .expect(Pattern::literal("#"))
            .build()
            .unwrap();
        let transport = tokio_test::io::Builder::new().read(b"Connection closed").build();
        let mut engine = ExpectEngine::new(transport, raw_config());
        let runner = SessionRunner::new(&device, &script);
        let failure = assert_err!(runner.run_engine(&mut engine).await);
        assert_eq!(failure.kind, FailureKind::UnexpectedEof);
        assert_eq!(failure.last_buffer, "Connection closed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_deadline() {
        let script = DeviceScript::builder("test")
            .timeout(Duration::from_secs(60))
            .wait()
            .expect(Pattern::literal("#"))
            .build()
            .unwrap();
        let device = device();
        let (client, _server) = duplex(64);

        let failure = assert_err!(
            SessionRunner::new(&device, &script)
                .with_job_timeout(Duration::from_secs(5))
                .run(client, raw_config())
                .await
        );
        assert_eq!(failure.kind, FailureKind::JobTimeout);
    }

    #[tokio::test]
    async fn test_stop_signal_cancels_before_next_step() {
        let script = DeviceScript::builder("test")
            .wait()
            .expect(Pattern::literal("#"))
            .build()
            .unwrap();
        let device = device();
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();
        let (client, _server) = duplex(64);

        let failure = assert_err!(
            SessionRunner::new(&device, &script)
                .with_stop_signal(stop_rx)
                .run(client, raw_config())
                .await
        );
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert_eq!(failure.step_index, Some(0));
    }
}
