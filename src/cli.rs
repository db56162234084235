//! Command-line interface and REPL

use anyhow::{bail, Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::ConnectionStatus;
use crate::controls::ControlSet;
use crate::model::Snapshot;
use crate::protocol::{Command, Target};

/// One interactive command
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Status,
    List,
    Set(SetRequest),
    Help,
    Quit,
}

/// A `set` line before it is checked against the control catalogue
#[derive(Debug, Clone, PartialEq)]
pub enum SetRequest {
    /// `set <control-id> <value>`
    Control { id: String, value: Value },
    /// `set <strip|bus> <index> <param> <value>`
    Address(Command),
}

impl SetRequest {
    /// Turn the request into the command its control would send, so gains
    /// are clamped and route params follow the current device kind
    pub fn resolve(&self, controls: &ControlSet) -> Result<Command> {
        let (control, value) = match self {
            SetRequest::Control { id, value } => {
                let control = controls
                    .get(id)
                    .with_context(|| format!("no control '{}', try 'list'", id))?;
                (control, value)
            },
            SetRequest::Address(command) => {
                let control = controls
                    .find(command.target, command.index, &command.param)
                    .with_context(|| {
                        format!(
                            "no control for {} {} {} on this device",
                            command.target, command.index, command.param
                        )
                    })?;
                (control, &command.value)
            },
        };

        let parsed = control
            .parse_value(value)
            .with_context(|| format!("invalid value {} for {}", value, control.unique_id()))?;
        control
            .command(parsed)
            .with_context(|| format!("{} cannot be set to {}", control.unique_id(), value))
    }
}

impl CliCommand {
    /// Parse one input line; blank lines yield `Ok(None)`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "status" => CliCommand::Status,
            "list" | "ls" => CliCommand::List,
            "help" | "?" => CliCommand::Help,
            "quit" | "exit" => CliCommand::Quit,
            "set" => {
                let first = words.next().context(SET_USAGE)?;
                match Target::from_name(first) {
                    Some(target) => {
                        let index = words.next().context("missing index")?;
                        let index: usize = index
                            .parse()
                            .with_context(|| format!("invalid index '{}'", index))?;
                        let param = words.next().context("missing param")?;
                        let value = rest_value(words)?;
                        CliCommand::Set(SetRequest::Address(Command::new(target, index, param, value)))
                    },
                    None => CliCommand::Set(SetRequest::Control {
                        id: first.to_string(),
                        value: rest_value(words)?,
                    }),
                }
            },
            other => bail!("unknown command '{}', try 'help'", other),
        };
        Ok(Some(command))
    }
}

const SET_USAGE: &str = "usage: set <control-id> <value> | set <strip|bus> <index> <param> <value>";

fn rest_value<'a>(words: impl Iterator<Item = &'a str>) -> Result<Value> {
    let raw = words.collect::<Vec<_>>().join(" ");
    if raw.is_empty() {
        bail!("missing value");
    }
    Ok(parse_value(&raw))
}

/// JSON when it parses (`true`, `-3.5`, `"x"`), a plain string otherwise
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Read lines on a dedicated thread; the channel closes on EOF or Ctrl-C
pub fn spawn_reader() -> Result<mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::Builder::new()
        .name("vm-mirror-repl".to_string())
        .spawn(move || {
            let mut rl = match DefaultEditor::new() {
                Ok(rl) => rl,
                Err(e) => {
                    warn!("Failed to start line editor: {}", e);
                    return;
                },
            };
            read_lines(&mut rl, &tx);
        })
        .context("Failed to start REPL thread")?;

    Ok(rx)
}

fn read_lines(rl: &mut DefaultEditor, tx: &mpsc::UnboundedSender<String>) {
    loop {
        match rl.readline("vm> ") {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.as_str());
                }
                if tx.send(line).is_err() {
                    break;
                }
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                debug!("REPL closed by user");
                break;
            },
            Err(e) => {
                warn!("REPL read error: {}", e);
                break;
            },
        }
    }
}

pub fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  {}                                 connection and device summary", "status".yellow());
    println!("  {}                                   controls with current values", "list".yellow());
    println!("  {}                 set a control by id", "set <control-id> <value>".yellow());
    println!("  {} set a control by address", "set <strip|bus> <index> <param> <value>".yellow());
    println!("  {}                              leave", "quit | exit".yellow());
}

pub fn print_status(endpoint: &str, status: ConnectionStatus, snapshot: Option<&Snapshot>) {
    let status_text = match status {
        ConnectionStatus::Connected => "connected".green(),
        ConnectionStatus::Reconnecting { attempt } => format!("reconnecting (#{})", attempt).yellow(),
        ConnectionStatus::Connecting => "connecting".yellow(),
        ConnectionStatus::Idle => "idle".normal(),
        ConnectionStatus::Stopped => "stopped".red(),
    };
    println!("{} {} ({})", "Device:".bold(), endpoint.cyan(), status_text);

    let Some(snapshot) = snapshot else {
        println!("  {}", "no state (unavailable)".red());
        return;
    };
    println!(
        "  kind {} / protocol {} / {} strips / {} buses",
        snapshot.kind().to_string().green(),
        snapshot.protocol(),
        snapshot.strips().len(),
        snapshot.buses().len()
    );
    for strip in snapshot.strips() {
        let routes: Vec<_> = strip.routes.active().map(|slot| slot.label()).collect();
        println!(
            "  strip {} {:<24} {} {:>6.1} dB -> {}",
            strip.index,
            strip.label,
            if strip.mute { "M".red() } else { "-".normal() },
            strip.gain,
            routes.join(" ")
        );
    }
    for bus in snapshot.buses() {
        println!(
            "  bus   {} {:<24} {} {:>6.1} dB",
            bus.index,
            bus.label,
            if bus.mute { "M".red() } else { "-".normal() },
            bus.gain
        );
    }
}

pub fn print_controls(controls: &ControlSet, snapshot: Option<&Snapshot>) {
    println!("{} {} controls ({})", "Controls:".bold(), controls.len(), controls.kind());
    for control in controls.iter() {
        let value = control
            .value(snapshot)
            .map(|v| v.to_string().green())
            .unwrap_or_else(|| "unavailable".red());
        println!("  {:<40} {:<36} {}", control.unique_id(), control.name(snapshot), value);
    }
}
