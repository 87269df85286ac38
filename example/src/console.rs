//! Operator console command parsing.

use exfoliator::SubjectKey;
use exfoliator_common::Axis;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Help,
    Status,
    Home(Option<Axis>),
    Enable(Axis),
    Disable(Axis),
    Move(Axis, f64),
    Toggle(SubjectKey, bool),
    Temperature(f64),
    Tape { speed: i64, torque: i64, time: f64 },
    EmergencyStop,
    /// Free-form controller text, after history recall.
    Raw(String),
    History,
    Programs,
    Load(String),
    Save { name: String, path: String },
    Delete(String),
    Run(String),
    Queue { program: String, targets: Vec<String> },
    Start,
    Pause,
    Resume,
    Cancel,
    Quit,
}

pub const HELP: &str = "\
Commands:
  status                      device, queue and program summary
  home [x|y]                  home one axis or all
  enable <x|y> | disable <x|y>
  move <x|y> <mm>
  extend <name> | retract <name>    pneumatic (nozzle, stage, stamp)
  vac <name> <on|off>         vacuum (vacnozzle, chuck)
  temp <celsius>
  tape <speed> <torque> <seconds>
  estop
  cmd <text>                  free-form controller command
  !! | !-n                    repeat the last / n-th last command
  history
  programs | load <name> | save <name> <file> | delete <name> | run <name>
  queue <program> <target>... e.g. queue peel A1 A2 B1
  start | pause | resume | cancel
  quit";

fn axis(word: Option<&str>) -> Result<Axis, String> {
    word.ok_or_else(|| "missing axis".to_string())?.parse()
}

fn number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T, String> {
    let word = word.ok_or_else(|| format!("missing {}", what))?;
    word.parse()
        .map_err(|_| format!("'{}' is not a valid {}", word, what))
}

fn name(word: Option<&str>, what: &str) -> Result<String, String> {
    word.map(str::to_string)
        .ok_or_else(|| format!("missing {}", what))
}

/// Parses one input line. History recall is resolved by the caller first.
pub fn parse(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let mut words = rest.split_whitespace();

    let command = match verb.to_ascii_lowercase().as_str() {
        "help" | "?" => ConsoleCommand::Help,
        "status" => ConsoleCommand::Status,
        "home" => match words.next() {
            Some(word) => ConsoleCommand::Home(Some(axis(Some(word))?)),
            None => ConsoleCommand::Home(None),
        },
        "enable" => ConsoleCommand::Enable(axis(words.next())?),
        "disable" => ConsoleCommand::Disable(axis(words.next())?),
        "move" => {
            let axis = axis(words.next())?;
            ConsoleCommand::Move(axis, number(words.next(), "position")?)
        }
        "extend" => ConsoleCommand::Toggle(
            SubjectKey::Pneumatic(name(words.next(), "component")?),
            true,
        ),
        "retract" => ConsoleCommand::Toggle(
            SubjectKey::Pneumatic(name(words.next(), "component")?),
            false,
        ),
        "vac" => {
            let component = name(words.next(), "component")?;
            let on = match words.next() {
                Some("on") => true,
                Some("off") => false,
                _ => return Err("expected on or off".into()),
            };
            ConsoleCommand::Toggle(SubjectKey::Vacuum(component), on)
        }
        "temp" => ConsoleCommand::Temperature(number(words.next(), "temperature")?),
        "tape" => ConsoleCommand::Tape {
            speed: number(words.next(), "speed")?,
            torque: number(words.next(), "torque")?,
            time: number(words.next(), "time")?,
        },
        "estop" | "stop!" => ConsoleCommand::EmergencyStop,
        "cmd" if !rest.is_empty() => return Ok(ConsoleCommand::Raw(rest.to_string())),
        "cmd" => return Err("missing command text".into()),
        "history" => ConsoleCommand::History,
        "programs" => ConsoleCommand::Programs,
        "load" => ConsoleCommand::Load(name(words.next(), "program name")?),
        "save" => ConsoleCommand::Save {
            name: name(words.next(), "program name")?,
            path: name(words.next(), "file")?,
        },
        "delete" => ConsoleCommand::Delete(name(words.next(), "program name")?),
        "run" => ConsoleCommand::Run(name(words.next(), "program name")?),
        "queue" => {
            let program = name(words.next(), "program name")?;
            let targets: Vec<String> = words.by_ref().map(str::to_string).collect();
            if targets.is_empty() {
                return Err("select at least one target".into());
            }
            ConsoleCommand::Queue { program, targets }
        }
        "start" => ConsoleCommand::Start,
        "pause" => ConsoleCommand::Pause,
        "resume" => ConsoleCommand::Resume,
        "cancel" => ConsoleCommand::Cancel,
        "quit" | "exit" => ConsoleCommand::Quit,
        "" => return Err("empty input".into()),
        other => return Err(format!("unknown command '{}', try help", other)),
    };

    if words.next().is_some() {
        return Err(format!("too many arguments for '{}'", verb));
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_commands() {
        assert_eq!(parse("home"), Ok(ConsoleCommand::Home(None)));
        assert_eq!(parse("home y"), Ok(ConsoleCommand::Home(Some(Axis::Y))));
        assert_eq!(parse("enable X"), Ok(ConsoleCommand::Enable(Axis::X)));
        assert_eq!(parse("move x 12.5"), Ok(ConsoleCommand::Move(Axis::X, 12.5)));
        assert!(parse("move z 1").is_err());
        assert!(parse("move x far").is_err());
    }

    #[test]
    fn test_toggles() {
        assert_eq!(
            parse("extend nozzle"),
            Ok(ConsoleCommand::Toggle(SubjectKey::pneumatic("nozzle"), true))
        );
        assert_eq!(
            parse("vac chuck off"),
            Ok(ConsoleCommand::Toggle(SubjectKey::vacuum("chuck"), false))
        );
        assert!(parse("vac chuck maybe").is_err());
    }

    #[test]
    fn test_raw_command_keeps_spacing() {
        assert_eq!(
            parse("cmd MoveX 10  fast"),
            Ok(ConsoleCommand::Raw("MoveX 10  fast".into()))
        );
        assert!(parse("cmd").is_err());
    }

    #[test]
    fn test_queue_needs_targets() {
        assert_eq!(
            parse("queue peel A1 A2"),
            Ok(ConsoleCommand::Queue {
                program: "peel".into(),
                targets: vec!["A1".into(), "A2".into()],
            })
        );
        assert!(parse("queue peel").is_err());
    }

    #[test]
    fn test_rejects_extra_arguments_and_unknown_verbs() {
        assert!(parse("start now").is_err());
        assert!(parse("jump").is_err());
        assert!(parse("   ").is_err());
    }
}
