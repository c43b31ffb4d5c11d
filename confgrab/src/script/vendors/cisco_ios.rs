//! Cisco IOS / IOS-XE running configuration backup.
//!
//! # Prompt Examples
//!
//! ```text
//! router>                 # user exec
//! router#                 # privileged exec
//! ```
//!
//! Over Telnet the device asks for a username and password first; over SSH
//! the transport has already authenticated. Devices that land in user exec
//! are escalated with `enable` when an enable password is configured.

use crate::channel::Pattern;
use crate::error::ScriptError;
use crate::script::DeviceScript;

use super::{CAPTURE_TIMEOUT, enable, login, logout};

/// Script name for Cisco IOS.
pub const SCRIPT_NAME: &str = "cisco_ios";

/// User or privileged exec prompt.
const SHELL_PROMPT: &str = r"(?m)^[\w.\-@()/: ]{1,63}[>#]\s?\z";

/// Privileged exec prompt only.
const PRIVILEGED_PROMPT: &str = r"(?m)^[\w.\-@()/: ]{1,63}#\s?\z";

/// Create the Cisco IOS backup script.
pub fn script() -> Result<DeviceScript, ScriptError> {
    let builder = DeviceScript::builder(SCRIPT_NAME)
        .line_terminator("\r\n")
        .prompt(Pattern::regex(PRIVILEGED_PROMPT)?);

    let builder = login(builder, SHELL_PROMPT)?;
    let builder = enable(builder, PRIVILEGED_PROMPT)?
        .send("terminal length 0")
        .expect_prompt()
        .send("show running-config")
        .capture()
        .timeout(CAPTURE_TIMEOUT)
        .reject(Pattern::literal("% Invalid input"))
        .expect_prompt();

    logout(builder, "exit").build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cisco_script() {
        let script = script().unwrap();
        assert_eq!(script.name(), "cisco_ios");
        assert_eq!(script.line_terminator(), "\r\n");
        assert_eq!(script.steps().len(), 9);
        assert!(script.steps()[7].is_capture());
        assert!(script.steps()[8].accepts_eof());
    }

    #[test]
    fn test_prompt_match() {
        let shell = Pattern::regex(SHELL_PROMPT).unwrap();
        assert!(shell.is_match(b"router>"));
        assert!(shell.is_match(b"\r\nrouter#"));
        assert!(shell.is_match(b"core-sw.lab# "));
        assert!(!shell.is_match(b"router#show run\r\n"));

        let privileged = Pattern::regex(PRIVILEGED_PROMPT).unwrap();
        assert!(privileged.is_match(b"router#"));
        assert!(!privileged.is_match(b"router>"));
    }
}
