//! Operator command boundary.
//!
//! A [`Console`] turns one line of operator input into one reply, either a
//! human-readable text or, when the line contains `-json`, a JSON object
//! carrying the same information. The console never panics on input and
//! never changes scheduler state on a malformed command.
//!
//! ```text
//! confgrab> backup r1
//! Backup of r1 succeeded (job #1, 1 attempt(s), 5120 bytes)
//! confgrab> status -json
//! {"ok":true,"command":"status","result":{"state":"stopped",...}}
//! ```

use log::debug;
use serde_json::{Value, json};

use crate::error::{CommandError, SchedulerError};
use crate::scheduler::{
    JobOutcome, JobReport, JobState, Reporter, Scheduler, SchedulerStatus, StartOutcome,
    StopOutcome, TaskAdmission,
};
use crate::transport::Connector;

/// Modifier switching replies to JSON.
const JSON_FLAG: &str = "-json";

/// Optional first word, so `confgrab status` works like `status`.
const PREFIX: &str = "confgrab";

/// An operator command, validated at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Restart,
    Stop,
    Backup { device_id: String },
    RunTask { task: String },
    Status,
    Version,
    Help,
}

/// One row of the dispatch table.
struct CommandSpec {
    name: &'static str,
    argument: Option<&'static str>,
    summary: &'static str,
    build: fn(Option<String>) -> Command,
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "start",
        argument: None,
        summary: "Start scheduler",
        build: |_| Command::Start,
    },
    CommandSpec {
        name: "restart",
        argument: None,
        summary: "Restart scheduler",
        build: |_| Command::Restart,
    },
    CommandSpec {
        name: "stop",
        argument: None,
        summary: "Stop scheduler",
        build: |_| Command::Stop,
    },
    CommandSpec {
        name: "backup",
        argument: Some("DEVICE ID"),
        summary: "Single device backup",
        build: |arg| Command::Backup {
            device_id: arg.unwrap_or_default(),
        },
    },
    CommandSpec {
        name: "runtask",
        argument: Some("TASK"),
        summary: "Run task by name",
        build: |arg| Command::RunTask {
            task: arg.unwrap_or_default(),
        },
    },
    CommandSpec {
        name: "status",
        argument: None,
        summary: "Get scheduler status",
        build: |_| Command::Status,
    },
    CommandSpec {
        name: "version",
        argument: None,
        summary: "Get scheduler version",
        build: |_| Command::Version,
    },
    CommandSpec {
        name: "help",
        argument: None,
        summary: "Show this help",
        build: |_| Command::Help,
    },
];

impl Command {
    /// Parse the words of a command line, without the `-json` modifier.
    ///
    /// Returns `Ok(None)` for a blank line. Command names are
    /// case-insensitive; arguments are taken as given.
    pub fn parse<'a>(
        words: impl IntoIterator<Item = &'a str>,
    ) -> Result<Option<Self>, CommandError> {
        let mut words = words.into_iter().peekable();
        if words
            .peek()
            .is_some_and(|word| word.eq_ignore_ascii_case(PREFIX))
        {
            words.next();
        }

        let Some(name) = words.next() else {
            return Ok(None);
        };
        let spec = COMMANDS
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;

        let argument = match spec.argument {
            Some(argument) => Some(
                words
                    .next()
                    .ok_or(CommandError::MissingArgument {
                        command: spec.name,
                        argument,
                    })?
                    .to_string(),
            ),
            None => None,
        };
        if let Some(extra) = words.next() {
            return Err(CommandError::UnexpectedArgument {
                command: spec.name,
                extra: extra.to_string(),
            });
        }

        Ok(Some((spec.build)(argument)))
    }

    /// Name of the command as typed at the console.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Restart => "restart",
            Command::Stop => "stop",
            Command::Backup { .. } => "backup",
            Command::RunTask { .. } => "runtask",
            Command::Status => "status",
            Command::Version => "version",
            Command::Help => "help",
        }
    }
}

/// Split off the `-json` modifier, which may appear anywhere on the line.
fn split_line(line: &str) -> (bool, Vec<&str>) {
    let mut json = false;
    let words = line
        .split_whitespace()
        .filter(|word| {
            let flag = word.eq_ignore_ascii_case(JSON_FLAG);
            json |= flag;
            !flag
        })
        .collect();
    (json, words)
}

/// The console's help text.
pub fn help_text() -> String {
    let mut help = String::from("Available commands:\n");
    for spec in COMMANDS {
        let usage = match spec.argument {
            Some(argument) => format!("{} <{}>", spec.name, argument),
            None => spec.name.to_string(),
        };
        help.push_str(&format!("  {:<19}- {}\n", usage, spec.summary));
    }
    help.push_str("\nAdd -json to any command to get JSON output");
    help
}

/// What a command produced, before rendering.
enum Outcome {
    Started(StartOutcome),
    Restarted,
    Stopped(StopOutcome),
    Backup(JobReport),
    Task(TaskAdmission),
    Status(SchedulerStatus),
    Version,
    Help,
}

impl Outcome {
    fn is_success(&self) -> bool {
        match self {
            Outcome::Backup(report) => report.outcome.is_success(),
            _ => true,
        }
    }

    fn text(&self) -> String {
        match self {
            Outcome::Started(StartOutcome::Started) => "Scheduler started".to_string(),
            Outcome::Started(StartOutcome::AlreadyRunning) => {
                "Scheduler is already running".to_string()
            }
            Outcome::Restarted => "Scheduler restarted".to_string(),
            Outcome::Stopped(StopOutcome::Stopped) => "Scheduler stopped".to_string(),
            Outcome::Stopped(StopOutcome::AlreadyStopped) => {
                "Scheduler is not running".to_string()
            }
            Outcome::Backup(report) => match &report.outcome {
                JobOutcome::Succeeded(artifact) => format!(
                    "Backup of {} succeeded (job {}, {} attempt(s), {} bytes)",
                    report.device_id,
                    report.job_id,
                    report.attempts,
                    artifact.text.len()
                ),
                JobOutcome::Failed(failure) => format!(
                    "Backup of {} {} (job {}): {}",
                    report.device_id,
                    state_word(report),
                    report.job_id,
                    failure
                ),
            },
            Outcome::Task(admission) => {
                let mut text = format!(
                    "Task '{}': {} job(s) queued",
                    admission.task,
                    admission.admitted.len()
                );
                for rejected in &admission.rejected {
                    text.push_str(&format!("\n  {}: {}", rejected.device_id, rejected.error));
                }
                text
            }
            Outcome::Status(status) => format!(
                "Scheduler: {}\n\
                 Workers: {}\n\
                 Jobs: {} queued, {} running\n\
                 Finished: {} succeeded, {} failed, {} timed out, {} cancelled\n\
                 Inventory: {} device(s), {} task(s)",
                status.state,
                status.workers,
                status.queued,
                status.running,
                status.counters.succeeded,
                status.counters.failed,
                status.counters.timed_out,
                status.counters.cancelled,
                status.devices,
                status.tasks
            ),
            Outcome::Version => format!("{} {}", PREFIX, env!("CARGO_PKG_VERSION")),
            Outcome::Help => help_text(),
        }
    }

    fn json(&self) -> Value {
        match self {
            Outcome::Started(outcome) => json!({ "outcome": outcome }),
            Outcome::Restarted => json!({ "outcome": "restarted" }),
            Outcome::Stopped(outcome) => json!({ "outcome": outcome }),
            Outcome::Backup(report) => json!(report),
            Outcome::Task(admission) => json!(admission),
            Outcome::Status(status) => json!(status),
            Outcome::Version => json!({
                "name": PREFIX,
                "version": env!("CARGO_PKG_VERSION"),
            }),
            Outcome::Help => json!({
                "commands": COMMANDS
                    .iter()
                    .map(|spec| json!({
                        "name": spec.name,
                        "argument": spec.argument,
                        "summary": spec.summary,
                    }))
                    .collect::<Vec<_>>(),
            }),
        }
    }
}

fn state_word(report: &JobReport) -> &'static str {
    match report.state {
        JobState::TimedOut => "timed out",
        JobState::Cancelled => "was cancelled",
        _ => "failed",
    }
}

/// Why a line could not be carried out.
enum Failure {
    Command(CommandError),
    Scheduler(SchedulerError),
}

impl Failure {
    fn message(&self) -> String {
        match self {
            Failure::Command(e) => e.to_string(),
            Failure::Scheduler(e) => e.to_string(),
        }
    }
}

/// Executes operator command lines against a scheduler.
pub struct Console<C, R> {
    scheduler: Scheduler<C, R>,
}

impl<C, R> Console<C, R>
where
    C: Connector,
    R: Reporter,
{
    pub fn new(scheduler: Scheduler<C, R>) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler<C, R> {
        &self.scheduler
    }

    /// Execute one line and render the reply. Blank lines give an empty
    /// reply.
    pub async fn execute(&self, line: &str) -> String {
        let (json, words) = split_line(line);
        if words.is_empty() && !json {
            return String::new();
        }

        let command = match Command::parse(words) {
            Ok(Some(command)) => command,
            Ok(None) => return String::new(),
            Err(e) => return render_failure(None, &Failure::Command(e), json),
        };
        debug!("console: {:?}", command);

        match self.dispatch(&command).await {
            Ok(outcome) => render(&command, &outcome, json),
            Err(e) => render_failure(Some(&command), &Failure::Scheduler(e), json),
        }
    }

    async fn dispatch(&self, command: &Command) -> Result<Outcome, SchedulerError> {
        let outcome = match command {
            Command::Start => Outcome::Started(self.scheduler.start().await?),
            Command::Restart => {
                self.scheduler.restart().await?;
                Outcome::Restarted
            }
            Command::Stop => Outcome::Stopped(self.scheduler.stop().await?),
            Command::Backup { device_id } => {
                Outcome::Backup(self.scheduler.run_single_backup(device_id).await?)
            }
            Command::RunTask { task } => Outcome::Task(self.scheduler.run_task(task)?),
            Command::Status => Outcome::Status(self.scheduler.status()),
            Command::Version => Outcome::Version,
            Command::Help => Outcome::Help,
        };
        Ok(outcome)
    }
}

fn render(command: &Command, outcome: &Outcome, json: bool) -> String {
    if !json {
        return outcome.text();
    }
    json!({
        "ok": outcome.is_success(),
        "command": command.name(),
        "result": outcome.json(),
    })
    .to_string()
}

fn render_failure(command: Option<&Command>, failure: &Failure, json: bool) -> String {
    if !json {
        return format!("Error: {}", failure.message());
    }
    json!({
        "ok": false,
        "command": command.map(Command::name),
        "error": failure.message(),
    })
    .to_string()
}
