use std::time::Duration;

use jsonfifo_endpoint::{EndpointConfig, ErrorKind, IpcEndpoint, IpcEvent, Role};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::cmd::ConnectArgs;
use crate::exit::{
    endpoint_error, io_error, CliError, CliResult, INTERRUPTED, SUCCESS, TRANSPORT_ERROR, USAGE,
};
use crate::output::{print_event, OutputFormat};

struct Session {
    role: Role,
    config: EndpointConfig,
    message: Option<Value>,
    every: Option<Duration>,
    count: Option<usize>,
    forward_stdin: bool,
}

pub fn run(args: ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let message = args.send.as_deref().map(parse_json).transpose()?;
    let every = args.every.as_deref().map(parse_duration).transpose()?;
    let reopen_delay = parse_duration(&args.reopen_delay)?;

    let role: Role = args.role.into();
    let session = Session {
        role,
        config: EndpointConfig::new(role, args.name)
            .with_base_directory(args.dir.resolve())
            .with_reopen_delay(reopen_delay),
        message,
        every,
        count: args.count,
        forward_stdin: !args.no_stdin,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    runtime.block_on(session.run(format))
}

impl Session {
    async fn run(self, format: OutputFormat) -> CliResult<i32> {
        let mut endpoint = IpcEndpoint::new(self.config)
            .map_err(|err| endpoint_error("endpoint setup failed", err))?;
        info!(role = %self.role, channel = endpoint.paths().name(), "connecting");

        if let Some(message) = &self.message {
            endpoint
                .send(message)
                .map_err(|err| endpoint_error("send failed", err))?;
        }

        let mut ticker = self.every.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = self.forward_stdin;
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);

        let mut received = 0usize;
        let mut fatal: Option<String> = None;
        let mut failure: Option<CliError> = None;
        let mut code = SUCCESS;

        loop {
            tokio::select! {
                result = &mut interrupt => {
                    if let Err(err) = result {
                        warn!(error = %err, "ctrl-c handler failed");
                    }
                    info!("interrupted; closing");
                    code = INTERRUPTED;
                    break;
                }
                event = endpoint.next_event() => {
                    let Some(event) = event else {
                        break;
                    };
                    print_event(&event, endpoint.paths(), format);
                    match &event {
                        IpcEvent::Data(_) => {
                            received += 1;
                            if self.count.is_some_and(|count| received >= count) {
                                break;
                            }
                        }
                        IpcEvent::Error(err) if err.kind == ErrorKind::Provision => {
                            fatal = Some(err.message.clone());
                        }
                        _ => {}
                    }
                }
                line = stdin.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => {
                        if let Err(err) = forward_line(&endpoint, &line) {
                            failure = Some(err);
                            break;
                        }
                    }
                    Ok(None) => stdin_open = false,
                    Err(err) => {
                        warn!(error = %err, "stdin read failed; no longer forwarding");
                        stdin_open = false;
                    }
                },
                _ = next_tick(&mut ticker) => {
                    if let Some(message) = &self.message {
                        if let Err(err) = endpoint.send(message) {
                            failure = Some(endpoint_error("send failed", err));
                            break;
                        }
                    }
                }
            }
        }

        let closed = endpoint.close().await;
        while let Some(event) = endpoint.try_next_event() {
            print_event(&event, endpoint.paths(), format);
        }

        if let Some(err) = failure {
            return Err(err);
        }
        if let Some(message) = fatal {
            return Err(CliError::new(
                TRANSPORT_ERROR,
                format!("endpoint stopped: {message}"),
            ));
        }
        closed.map_err(|err| endpoint_error("close failed", err))?;
        Ok(code)
    }
}

fn forward_line(endpoint: &IpcEndpoint, line: &str) -> CliResult<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<Value>(line) {
        Ok(value) => endpoint
            .send(&value)
            .map_err(|err| endpoint_error("send failed", err)),
        Err(err) => {
            warn!(error = %err, "ignoring stdin line that is not JSON");
            Ok(())
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn parse_json(input: &str) -> CliResult<Value> {
    serde_json::from_str(input)
        .map_err(|err| CliError::new(USAGE, format!("--send is not valid JSON: {err}")))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn send_payload_must_be_json() {
        assert_eq!(parse_json(r#"{"fromHost":"blub"}"#).unwrap()["fromHost"], "blub");
        assert_eq!(parse_json("{nope").unwrap_err().code, USAGE);
    }
}
