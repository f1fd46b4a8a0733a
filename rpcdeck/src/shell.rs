//! # Shell
//!
//! A line-oriented command loop over standard input. Each line is parsed into a [`Command`] and
//! applied to the [`Engine`]. Results of calls arrive asynchronously as events and are printed
//! by the event printer in `main`, so `send` never blocks the prompt.
use crate::cli::Cli;
use crate::formatter::{FormattedString, GenericError, ServiceList};
use rpcdeck_core::Engine;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  connect <address> [--no-reflect]   Open a new session
  services                           List discovered services
  select <method>                    Show the input shape of /package.Service/Method
  send <method> [json]               Send a message (defaults to {})
  end                                Half-close the open client stream
  cancel                             Cancel the call in flight
  state                              Show the connectivity state
  describe <symbol>                  Show a service, message or enum
  help                               Show this help
  quit                               Exit";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Connect { address: String, no_reflect: bool },
    Services,
    Select { method: String },
    Send { method: String, payload: String },
    End,
    Cancel,
    State,
    Describe { symbol: String },
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = line
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((line, ""));

        let required = |what: &str| {
            if rest.is_empty() {
                Err(format!("'{name}' expects {what}"))
            } else {
                Ok(rest.to_string())
            }
        };

        match name {
            "connect" => {
                let mut parts = rest.split_whitespace();
                let address = parts
                    .next()
                    .ok_or_else(|| "'connect' expects an address".to_string())?;
                let no_reflect = match parts.next() {
                    None => false,
                    Some("--no-reflect") => true,
                    Some(other) => return Err(format!("Unexpected argument '{other}'")),
                };
                Ok(Command::Connect {
                    address: address.to_string(),
                    no_reflect,
                })
            }
            "services" => Ok(Command::Services),
            "select" => Ok(Command::Select {
                method: required("a method")?,
            }),
            "send" => {
                let rest = required("a method")?;
                let (method, payload) = rest
                    .split_once(char::is_whitespace)
                    .map(|(method, payload)| (method, payload.trim()))
                    .unwrap_or((rest.as_str(), "{}"));
                Ok(Command::Send {
                    method: method.to_string(),
                    payload: payload.to_string(),
                })
            }
            "end" => Ok(Command::End),
            "cancel" => Ok(Command::Cancel),
            "state" => Ok(Command::State),
            "describe" => Ok(Command::Describe {
                symbol: required("a symbol")?,
            }),
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("Unknown command '{other}'. Type 'help'.")),
        }
    }
}

/// Reads commands until `quit` or end of input.
pub async fn run(engine: Engine, cli: &Cli) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                eprintln!("{}", FormattedString::from(GenericError("Invalid command", err)));
                continue;
            }
        };

        if command == Command::Quit {
            break;
        }
        execute(&engine, cli, command).await;
    }

    Ok(())
}

async fn execute(engine: &Engine, cli: &Cli, command: Command) {
    tracing::debug!(?command, "executing command");

    match command {
        Command::Connect {
            address,
            no_reflect,
        } => {
            let mut options = cli.connection_options(address);
            options.reflect = options.reflect && !no_reflect;

            if let Err(err) = engine.connect(options).await {
                eprintln!("{}", FormattedString::from(GenericError("Connect failed", err)));
            }
        }
        Command::Services => {
            println!("{}", FormattedString::from(ServiceList(engine.services().await)));
        }
        Command::Select { method } => {
            // The view is printed when its event arrives.
            if let Err(err) = engine.select_method(&method).await {
                eprintln!("{}", FormattedString::from(GenericError("Select failed", err)));
            }
        }
        Command::Send { method, payload } => {
            let engine = engine.clone();
            tokio::spawn(async move {
                if let Err(err) = engine.send(&method, &payload).await {
                    eprintln!("{}", FormattedString::from(GenericError("Send failed", err)));
                }
            });
        }
        Command::End => {
            if !engine.close_stream() {
                eprintln!("{}", FormattedString::from(GenericError("End", "no open stream")));
            }
        }
        Command::Cancel => engine.cancel(),
        Command::State => match engine.state().await {
            Some(state) => println!("{state}"),
            None => println!("disconnected"),
        },
        Command::Describe { symbol } => match engine.describe(&symbol).await {
            Ok(descriptor) => println!("{}", FormattedString::from(descriptor)),
            Err(err) => eprintln!("{}", FormattedString::from(GenericError("Describe failed", err))),
        },
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}
