//! Built-in scripts for common network operating systems.
//!
//! Every script shares the same login prelude. The first step waits for
//! whatever the device shows first (a login prompt over Telnet, usually a
//! shell prompt over SSH where the transport already authenticated) and
//! the following steps run only when the matching prompt was seen.

pub mod arista_eos;
pub mod cisco_ios;
pub mod juniper_junos;

use std::time::Duration;

use crate::channel::Pattern;
use crate::error::ScriptError;
use crate::script::{ScriptBuilder, ScriptContext};

/// Username or login prompt.
const LOGIN_PROMPT: &str = r"(?i)(user ?name|login):\s*\z";

/// Password prompt, including the enable password prompt.
const PASSWORD_PROMPT: &str = r"(?i)password:\s*\z";

/// Output that means the credentials were refused.
const AUTH_FAILURES: &[&str] = &[
    r"(?i)%\s*(authentication failed|login invalid|bad passwords?)",
    r"(?i)login incorrect",
    r"(?i)access denied",
];

/// Timeout for the logout step, which often sees the connection drop.
pub(crate) const LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Capturing a large configuration can take a while.
pub(crate) const CAPTURE_TIMEOUT: Duration = Duration::from_secs(120);

/// Add authentication failure patterns and the login prelude.
///
/// `shell` is the prompt that means the session is logged in.
pub(crate) fn login(builder: ScriptBuilder, shell: &str) -> Result<ScriptBuilder, ScriptError> {
    let first = Pattern::regex(&format!(
        "(?:{})|(?:{})|(?:{})",
        LOGIN_PROMPT, PASSWORD_PROMPT, shell
    ))?;

    let mut builder = builder;
    for failure in AUTH_FAILURES {
        builder = builder.auth_failure(Pattern::regex(failure)?);
    }

    Ok(builder
        .wait()
        .authenticating()
        .expect(first)
        .send_username()
        .authenticating()
        .only_if(saw_login_prompt)
        .reject(Pattern::regex(LOGIN_PROMPT)?)
        .expect(Pattern::regex(PASSWORD_PROMPT)?)
        .send_password()
        .authenticating()
        .only_if(saw_password_prompt)
        .reject(Pattern::regex(PASSWORD_PROMPT)?)
        .reject(Pattern::regex(LOGIN_PROMPT)?)
        .expect(Pattern::regex(shell)?))
}

/// Add `enable` escalation for devices that land in user exec mode.
///
/// A session left in user exec mode without an enable password fails
/// right away instead of timing out on the first privileged command.
pub(crate) fn enable(
    builder: ScriptBuilder,
    privileged: &str,
) -> Result<ScriptBuilder, ScriptError> {
    Ok(builder
        .send_enable_password()
        .only_if(|ctx| !ctx.has_enable_password() && at_user_exec(ctx))
        .expect(Pattern::Any)
        .send("enable")
        .only_if(|ctx| ctx.has_enable_password() && at_user_exec(ctx))
        .expect(Pattern::regex(PASSWORD_PROMPT)?)
        .send_enable_password()
        .authenticating()
        .only_if(saw_password_prompt)
        .reject(Pattern::regex(PASSWORD_PROMPT)?)
        .reject(Pattern::regex(r"(?i)%\s*(access denied|bad secrets)")?)
        .expect(Pattern::regex(privileged)?))
}

/// Close the session; the device hanging up is success.
pub(crate) fn logout(builder: ScriptBuilder, command: &str) -> ScriptBuilder {
    builder
        .send(command)
        .accept_eof()
        .timeout(LOGOUT_TIMEOUT)
        .on_timeout(crate::script::TimeoutPolicy::Skip)
        .expect(Pattern::Any)
}

fn saw_login_prompt(ctx: &ScriptContext<'_>) -> bool {
    ctx.last_matched().is_some_and(|matched| {
        let matched = matched.to_ascii_lowercase();
        matched.contains("name:") || matched.contains("login:")
    })
}

fn saw_password_prompt(ctx: &ScriptContext<'_>) -> bool {
    ctx.last_matched()
        .is_some_and(|matched| matched.to_ascii_lowercase().contains("password:"))
}

fn at_user_exec(ctx: &ScriptContext<'_>) -> bool {
    ctx.last_matched()
        .is_some_and(|matched| matched.trim_end().ends_with('>'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::EngineConfig;
    use crate::script::DeviceScript;
    use crate::session::{Artifact, FailureKind, SessionFailure, SessionRunner};
    use crate::transport::{Credentials, Device};
    use tokio_test::io::Builder;
    use tokio_test::{assert_err, assert_ok};

    fn builtin() -> Vec<DeviceScript> {
        vec![
            arista_eos::script().unwrap(),
            cisco_ios::script().unwrap(),
            juniper_junos::script().unwrap(),
        ]
    }

    async fn run(
        script: &DeviceScript,
        credentials: Credentials,
        transport: tokio_test::io::Mock,
    ) -> Result<Artifact, SessionFailure> {
        let device = Device::new("r1", "192.0.2.1", script.name()).with_credentials(credentials);
        SessionRunner::new(&device, script)
            .run(transport, EngineConfig::default())
            .await
    }

    fn line(text: &str, script: &DeviceScript) -> Vec<u8> {
        format!("{}{}", text, script.line_terminator()).into_bytes()
    }

    #[test]
    fn test_login_prompt_variants() {
        let pattern = Pattern::regex(LOGIN_PROMPT).unwrap();
        assert!(pattern.is_match(b"User Access Verification\r\n\r\nUsername: "));
        assert!(pattern.is_match(b"router login: "));
        assert!(pattern.is_match(b"User name:"));
        assert!(!pattern.is_match(b"Username: admin\r\n"));
    }

    #[test]
    fn test_auth_failure_patterns() {
        let patterns: Vec<Pattern> = AUTH_FAILURES
            .iter()
            .map(|p| Pattern::regex(p).unwrap())
            .collect();
        let matches = |text: &[u8]| patterns.iter().any(|p| p.is_match(text));

        assert!(matches(b"% Authentication failed\r\n"));
        assert!(matches(b"% Login invalid\r\n"));
        assert!(matches(b"Login incorrect\r\nlogin: "));
        assert!(!matches(b"router>"));
    }

    #[tokio::test]
    async fn test_password_prompt_again_fails_authentication() {
        for script in builtin() {
            let transport = Builder::new()
                .read(b"Password: ")
                .write(&line("wrong", &script))
                .read(b"\r\nPassword: ")
                .build();

            let credentials = Credentials::new("admin", "wrong");

            let failure = assert_err!(run(&script, credentials, transport).await);
            assert_eq!(failure.kind, FailureKind::AuthenticationFailed, "{}", script.name());
            assert_eq!(failure.step_index, Some(2), "{}", script.name());
        }
    }

    #[tokio::test]
    async fn test_login_prompt_again_fails_authentication() {
        for script in builtin() {
            let transport = Builder::new()
                .read(b"Username: ")
                .write(&line("admin", &script))
                .read(b"admin\r\nPassword: ")
                .write(&line("wrong", &script))
                .read(b"\r\n\r\nUsername: ")
                .build();

            let credentials = Credentials::new("admin", "wrong");

            let failure = assert_err!(run(&script, credentials, transport).await);
            assert_eq!(failure.kind, FailureKind::AuthenticationFailed, "{}", script.name());
            assert_eq!(failure.step_index, Some(2), "{}", script.name());
        }
    }

    #[tokio::test]
    async fn test_enable_password_prompt_again_fails_authentication() {
        let script = cisco_ios::script().unwrap();
        let credentials = Credentials::new("admin", "s3cret").with_enable_password("wrong");
        let transport = Builder::new()
            .read(b"router>")
            .write(b"enable\r\n")
            .read(b"enable\r\nPassword: ")
            .write(b"wrong\r\n")
            .read(b"\r\nPassword: ")
            .build();

        let failure = assert_err!(run(&script, credentials, transport).await);
        assert_eq!(failure.kind, FailureKind::AuthenticationFailed);
        assert_eq!(failure.step_index, Some(5));
    }

    #[tokio::test]
    async fn test_user_exec_without_enable_password_fails_fast() {
        for script in [arista_eos::script().unwrap(), cisco_ios::script().unwrap()] {
            let transport = Builder::new().read(b"router>").build();

            let credentials = Credentials::new("admin", "s3cret");

            let failure = assert_err!(run(&script, credentials, transport).await);
            assert_eq!(failure.kind, FailureKind::AuthenticationFailed, "{}", script.name());
            assert_eq!(failure.step_index, Some(3), "{}", script.name());
            assert!(failure.message.contains("no enable password"), "{}", failure.message);
        }
    }

    #[tokio::test]
    async fn test_enable_then_capture() {
        let script = cisco_ios::script().unwrap();
        let credentials = Credentials::new("admin", "s3cret").with_enable_password("secret");
        let transport = Builder::new()
            .read(b"router>")
            .write(b"enable\r\n")
            .read(b"enable\r\nPassword: ")
            .write(b"secret\r\n")
            .read(b"\r\nrouter#")
            .write(b"terminal length 0\r\n")
            .read(b"terminal length 0\r\nrouter#")
            .write(b"show running-config\r\n")
            .read(b"show running-config\r\nhostname r1\r\n!\r\nrouter#")
            .write(b"exit\r\n")
            .build();

        let artifact = assert_ok!(run(&script, credentials, transport).await);
        assert_eq!(artifact.text, "hostname r1\n!\n");
        assert!(!artifact.is_partial());
    }
}
