use std::io::{IsTerminal, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use jsonfifo_endpoint::{ChannelPaths, IpcEvent};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    event: &'static str,
    role: &'a str,
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    timestamp: String,
}

pub fn print_event(event: &IpcEvent, paths: &ChannelPaths, format: OutputFormat) {
    let line = match format {
        OutputFormat::Json => {
            let mut out = EventOutput {
                event: event_name(event),
                role: paths.role().as_str(),
                channel: paths.name(),
                data: None,
                kind: None,
                message: None,
                timestamp: now_unix_seconds(),
            };
            match event {
                IpcEvent::Data(value) => out.data = Some(value),
                IpcEvent::Error(err) => {
                    out.kind = Some(err.kind.as_str());
                    out.message = Some(&err.message);
                }
                IpcEvent::Connected | IpcEvent::Disconnected => {}
            }
            to_json_line(&out)
        }
        OutputFormat::Pretty => match event {
            IpcEvent::Data(value) => format!("[{}] data {value}", paths.role()),
            IpcEvent::Error(err) => format!("[{}] error {err}", paths.role()),
            other => format!("[{}] {}", paths.role(), event_name(other)),
        },
    };
    emit_line(&line);
}

#[derive(Serialize)]
struct PathsOutput<'a> {
    channel: &'a str,
    role: &'a str,
    directory: &'a Path,
    #[serde(rename = "in")]
    in_path: &'a Path,
    #[serde(rename = "out")]
    out_path: &'a Path,
}

pub fn print_paths(paths: &ChannelPaths, format: OutputFormat) {
    let line = match format {
        OutputFormat::Json => to_json_line(&PathsOutput {
            channel: paths.name(),
            role: paths.role().as_str(),
            directory: paths.directory(),
            in_path: paths.in_path(),
            out_path: paths.out_path(),
        }),
        OutputFormat::Pretty => format!(
            "{} {}\n  in:  {}\n  out: {}",
            paths.role(),
            paths.name(),
            paths.in_path().display(),
            paths.out_path().display()
        ),
    };
    emit_line(&line);
}

fn event_name(event: &IpcEvent) -> &'static str {
    match event {
        IpcEvent::Data(_) => "data",
        IpcEvent::Connected => "connected",
        IpcEvent::Disconnected => "disconnected",
        IpcEvent::Error(_) => "error",
    }
}

fn to_json_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

// Flush per line so a consumer on a pipe sees events as they happen.
fn emit_line(line: &str) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
