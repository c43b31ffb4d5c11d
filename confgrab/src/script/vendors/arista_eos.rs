//! Arista EOS running configuration backup.
//!
//! Prompt patterns are adapted from [scrapli](https://github.com/carlmontanari/scrapli).
//!
//! ```text
//! switch>                            # exec mode
//! switch#                            # privilege_exec mode
//! ```

use crate::channel::Pattern;
use crate::error::ScriptError;
use crate::script::DeviceScript;

use super::{CAPTURE_TIMEOUT, enable, login, logout};

/// Script name for Arista EOS.
pub const SCRIPT_NAME: &str = "arista_eos";

const SHELL_PROMPT: &str = r"(?mi)^[\w.\-@()/: ]{1,63}[>#]\s?\z";

// `(config` prompts never appear here: the script does not enter configuration mode.
const PRIVILEGED_PROMPT: &str = r"(?mi)^[\w.\-@()/: ]{1,63}#\s?\z";

/// Create the Arista EOS backup script.
pub fn script() -> Result<DeviceScript, ScriptError> {
    let builder = DeviceScript::builder(SCRIPT_NAME).prompt(Pattern::regex(PRIVILEGED_PROMPT)?);

    let builder = login(builder, SHELL_PROMPT)?;
    let builder = enable(builder, PRIVILEGED_PROMPT)?
        .send("terminal length 0")
        .expect_prompt()
        .send("terminal width 32767")
        .expect_prompt()
        .send("show running-config")
        .capture()
        .timeout(CAPTURE_TIMEOUT)
        .reject(Pattern::literal("% Invalid input"))
        .expect_prompt();

    logout(builder, "exit").build()
}
