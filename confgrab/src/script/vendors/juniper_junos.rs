//! Juniper JUNOS configuration backup in `set` format.
//!
//! Prompt patterns are adapted from [scrapli](https://github.com/carlmontanari/scrapli).
//!
//! ```text
//! user@router>              # exec mode
//! {master:0}                # routing-engine indicator (separate line)
//! user@router>              # exec prompt on next line
//! ```

use crate::channel::Pattern;
use crate::error::ScriptError;
use crate::script::DeviceScript;

use super::{CAPTURE_TIMEOUT, login, logout};

/// Script name for Juniper JUNOS.
pub const SCRIPT_NAME: &str = "juniper_junos";

/// Operational mode prompt.
const EXEC_PROMPT: &str = r"(?mi)^(\{\w+(:(\w+)?\d)?\}\r?\n)?[\w\-@()/:\.]{1,63}>\s?\z";

/// Create the Juniper JUNOS backup script.
pub fn script() -> Result<DeviceScript, ScriptError> {
    let builder = DeviceScript::builder(SCRIPT_NAME).prompt(Pattern::regex(EXEC_PROMPT)?);

    let builder = login(builder, EXEC_PROMPT)?
        .send("set cli screen-length 0")
        .expect_prompt()
        .send("set cli screen-width 0")
        .expect_prompt()
        .send("show configuration | display set")
        .capture()
        .timeout(CAPTURE_TIMEOUT)
        .reject(Pattern::literal("syntax error"))
        .expect_prompt();

    logout(builder, "exit").build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_juniper_script() {
        let script = script().unwrap();
        assert_eq!(script.name(), "juniper_junos");
        assert_eq!(script.steps().len(), 7);
        assert!(script.steps()[5].is_capture());
    }

    #[test]
    fn test_exec_prompt_match() {
        let exec = Pattern::regex(EXEC_PROMPT).unwrap();
        assert!(exec.is_match(b"user@router>"));
        assert!(exec.is_match(b"user@router> "));
        assert!(exec.is_match(b"{master:0}\nuser@router>"));
        assert!(!exec.is_match(b"user@router#"));
    }
}
