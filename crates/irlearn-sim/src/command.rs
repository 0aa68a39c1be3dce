//! Text command surface
//!
//! One command per line. The keyword is case-insensitive; arguments are
//! whitespace separated and may be wrapped in `<>`, `[]` or `()`, which are
//! stripped (`send <3>` is `send 3`).

use std::fmt;

use thiserror::Error;

use irlearn_core::{Protocol, SignalId};

/// Frames injected by `press` when no count is given
pub const DEFAULT_PRESS_COUNT: u32 = 5;

pub const HELP: &str = "\
Commands:
  learn                 start learning (press the remote button repeatedly)
  stop                  finish learning now, or cancel with too few samples
  status                learner and store status
  list                  stored signals
  send <id>             transmit a signal
  repeat <id> <n>       transmit a signal n times
  delete <id>           delete a signal
  clear                 delete every signal
  info <id>             signal summary
  detail <id>           field breakdown and timing analysis
  raw <id>              raw timing durations
  name <id> <text>      rename a signal
  verify <id>           loopback verification (5 sends)
  continuous <id>       10 s continuous loopback test
  hw                    toggle the hardware pulse generator path
  press <proto> <value> [bits] [n]
                        simulate n presses of a remote button
  help                  this text";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}', type 'help' for a list")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid signal id '{0}', expected a positive integer")]
    InvalidId(String),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unknown protocol '{0}'")]
    InvalidProtocol(String),
}

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Learn,
    Stop,
    Status,
    List,
    Clear,
    Send(SignalId),
    Repeat { id: SignalId, times: u32 },
    Delete(SignalId),
    Info(SignalId),
    Detail(SignalId),
    Raw(SignalId),
    Name { id: SignalId, name: String },
    Verify(SignalId),
    Continuous(SignalId),
    ToggleHardware,
    Press {
        protocol: Protocol,
        value: u32,
        bits: u16,
        times: u32,
    },
}

fn clean(arg: &str) -> String {
    arg.chars()
        .filter(|c| !matches!(c, '<' | '>' | '[' | ']' | '(' | ')'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_id(arg: Option<&str>, usage: &'static str) -> Result<SignalId, CommandError> {
    let raw = arg.ok_or(CommandError::Usage(usage))?;
    let cleaned = clean(raw);
    match cleaned.parse::<SignalId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(CommandError::InvalidId(raw.to_string())),
    }
}

fn parse_count(arg: &str) -> Result<u32, CommandError> {
    match clean(arg).parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::InvalidNumber(arg.to_string())),
    }
}

fn parse_value(arg: &str) -> Result<u32, CommandError> {
    let cleaned = clean(arg);
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => cleaned.parse::<u32>(),
    };
    parsed.map_err(|_| CommandError::InvalidNumber(arg.to_string()))
}

impl Command {
    /// Parse one line
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (line, ""),
        };
        if keyword.is_empty() {
            return Err(CommandError::Empty);
        }
        let mut args = rest.split_whitespace();

        let command = match keyword.to_ascii_lowercase().as_str() {
            "help" | "?" => Command::Help,
            "learn" => Command::Learn,
            "stop" => Command::Stop,
            "status" => Command::Status,
            "list" | "ls" => Command::List,
            "clear" => Command::Clear,
            "hw" | "rmt" => Command::ToggleHardware,
            "send" => Command::Send(parse_id(args.next(), "send <id>")?),
            "delete" => Command::Delete(parse_id(args.next(), "delete <id>")?),
            "info" => Command::Info(parse_id(args.next(), "info <id>")?),
            "detail" => Command::Detail(parse_id(args.next(), "detail <id>")?),
            "raw" => Command::Raw(parse_id(args.next(), "raw <id>")?),
            "verify" => Command::Verify(parse_id(args.next(), "verify <id>")?),
            "continuous" => Command::Continuous(parse_id(args.next(), "continuous <id>")?),
            "repeat" => {
                const USAGE: &str = "repeat <id> <times>";
                let id = parse_id(args.next(), USAGE)?;
                let times = parse_count(args.next().ok_or(CommandError::Usage(USAGE))?)?;
                Command::Repeat { id, times }
            }
            "name" => {
                const USAGE: &str = "name <id> <text>";
                let id = parse_id(args.next(), USAGE)?;
                // keep the name's own spacing and case
                let name = rest
                    .split_once(char::is_whitespace)
                    .map(|(_, n)| n.trim())
                    .unwrap_or("");
                if name.is_empty() {
                    return Err(CommandError::Usage(USAGE));
                }
                Command::Name {
                    id,
                    name: name.to_string(),
                }
            }
            "press" => {
                const USAGE: &str = "press <protocol> <value> [bits] [times]";
                let proto = args.next().ok_or(CommandError::Usage(USAGE))?;
                let protocol = clean(proto)
                    .parse::<Protocol>()
                    .map_err(|_| CommandError::InvalidProtocol(proto.to_string()))?;
                let value = parse_value(args.next().ok_or(CommandError::Usage(USAGE))?)?;
                let bits = match args.next() {
                    Some(b) => u16::try_from(parse_count(b)?)
                        .ok()
                        .filter(|b| *b <= 32)
                        .ok_or_else(|| CommandError::InvalidNumber(b.to_string()))?,
                    None => 32,
                };
                let times = match args.next() {
                    Some(n) => parse_count(n)?,
                    None => DEFAULT_PRESS_COUNT,
                };
                Command::Press {
                    protocol,
                    value,
                    bits,
                    times,
                }
            }
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Help => f.write_str("help"),
            Command::Learn => f.write_str("learn"),
            Command::Stop => f.write_str("stop"),
            Command::Status => f.write_str("status"),
            Command::List => f.write_str("list"),
            Command::Clear => f.write_str("clear"),
            Command::Send(id) => write!(f, "send {}", id),
            Command::Repeat { id, times } => write!(f, "repeat {} {}", id, times),
            Command::Delete(id) => write!(f, "delete {}", id),
            Command::Info(id) => write!(f, "info {}", id),
            Command::Detail(id) => write!(f, "detail {}", id),
            Command::Raw(id) => write!(f, "raw {}", id),
            Command::Name { id, name } => write!(f, "name {} {}", id, name),
            Command::Verify(id) => write!(f, "verify {}", id),
            Command::Continuous(id) => write!(f, "continuous {}", id),
            Command::ToggleHardware => f.write_str("hw"),
            Command::Press {
                protocol,
                value,
                bits,
                times,
            } => write!(f, "press {} 0x{:X} {} {}", protocol, value, bits, times),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::parse("learn"), Ok(Command::Learn));
        assert_eq!(Command::parse("  LIST  "), Ok(Command::List));
        assert_eq!(Command::parse("rmt"), Ok(Command::ToggleHardware));
        assert_eq!(Command::parse(""), Err(CommandError::Empty));
        assert!(matches!(Command::parse("gpio"), Err(CommandError::Unknown(_))));
    }

    #[test]
    fn test_id_brackets_stripped() {
        assert_eq!(Command::parse("send <3>"), Ok(Command::Send(3)));
        assert_eq!(Command::parse("delete [12]"), Ok(Command::Delete(12)));
        assert_eq!(Command::parse("info (1)"), Ok(Command::Info(1)));
    }

    #[test]
    fn test_invalid_ids() {
        assert!(matches!(Command::parse("send 0"), Err(CommandError::InvalidId(_))));
        assert!(matches!(Command::parse("send abc"), Err(CommandError::InvalidId(_))));
        assert!(matches!(Command::parse("send -2"), Err(CommandError::InvalidId(_))));
        assert_eq!(Command::parse("send"), Err(CommandError::Usage("send <id>")));
    }

    #[test]
    fn test_repeat() {
        assert_eq!(
            Command::parse("repeat <2> <5>"),
            Ok(Command::Repeat { id: 2, times: 5 })
        );
        assert!(matches!(Command::parse("repeat 2 0"), Err(CommandError::InvalidNumber(_))));
        assert!(matches!(Command::parse("repeat 2"), Err(CommandError::Usage(_))));
    }

    #[test]
    fn test_name_keeps_text() {
        assert_eq!(
            Command::parse("name 4   Living Room TV"),
            Ok(Command::Name {
                id: 4,
                name: "Living Room TV".into()
            })
        );
        assert!(matches!(Command::parse("name 4"), Err(CommandError::Usage(_))));
    }

    #[test]
    fn test_press() {
        assert_eq!(
            Command::parse("press nec 0x00FF00FF"),
            Ok(Command::Press {
                protocol: Protocol::Nec,
                value: 0x00FF_00FF,
                bits: 32,
                times: DEFAULT_PRESS_COUNT
            })
        );
        assert_eq!(
            Command::parse("press sony 2704 12 7"),
            Ok(Command::Press {
                protocol: Protocol::Sony,
                value: 2704,
                bits: 12,
                times: 7
            })
        );
        assert!(matches!(
            Command::parse("press foo 1"),
            Err(CommandError::InvalidProtocol(_))
        ));
        assert!(matches!(
            Command::parse("press nec 1 40"),
            Err(CommandError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_display_reparses() {
        for cmd in [
            Command::Repeat { id: 3, times: 2 },
            Command::Verify(9),
            Command::Press {
                protocol: Protocol::Rc5,
                value: 0x1A,
                bits: 13,
                times: 2,
            },
        ] {
            assert_eq!(Command::parse(&cmd.to_string()), Ok(cmd));
        }
    }
}
