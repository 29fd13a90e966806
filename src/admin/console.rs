//! Line-oriented operator console driving the headless host.

use crate::admin::commands::{dispatch, parse_command, CommandSender};
use crate::afk::signals::{ActivityListener, ActivitySignal, Verdict};
use crate::text::format_duration;
use crate::world::host::Host;
use crate::world::position::Location;
use crate::world::sim::SimHost;
use std::io::BufRead;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Join(String),
    Quit(String),
    Move { name: String, x: f64, y: f64, z: f64 },
    Chat(String),
    /// A slash command typed by an entity, e.g. `as Alex /afk`.
    As { name: String, line: String },
    /// A slash command run from the console itself.
    Command(String),
    List,
    Shutdown,
    Help,
}

pub fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.starts_with('/') {
        return Ok(Some(ConsoleCommand::Command(trimmed.to_string())));
    }
    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap_or_default().to_ascii_lowercase();
    let mut name = || {
        parts
            .next()
            .map(str::to_string)
            .ok_or_else(|| format!("{command}: missing name"))
    };
    let parsed = match command.as_str() {
        "join" => ConsoleCommand::Join(name()?),
        "quit" | "leave" => ConsoleCommand::Quit(name()?),
        "chat" => ConsoleCommand::Chat(name()?),
        "move" => {
            let name = name()?;
            let coords: Vec<f64> = parts
                .by_ref()
                .take(3)
                .map(|value| {
                    value
                        .parse::<f64>()
                        .map_err(|_| format!("move: expected number, got '{value}'"))
                })
                .collect::<Result<_, _>>()?;
            let [x, y, z] = coords[..] else {
                return Err("move: expected <name> <x> <y> <z>".to_string());
            };
            ConsoleCommand::Move { name, x, y, z }
        }
        "as" => {
            let name = name()?;
            let line = parts.collect::<Vec<_>>().join(" ");
            if !line.starts_with('/') {
                return Err("as: expected <name> /<command>".to_string());
            }
            ConsoleCommand::As { name, line }
        }
        "list" | "who" => ConsoleCommand::List,
        "shutdown" | "stop" | "exit" => ConsoleCommand::Shutdown,
        "help" => ConsoleCommand::Help,
        other => return Err(format!("unknown console command '{other}'")),
    };
    Ok(Some(parsed))
}

/// Reads commands until `shutdown` or end of input.
pub fn run_console<R: BufRead>(
    listener: &ActivityListener<SimHost>,
    host: &SimHost,
    root: &Path,
    input: R,
) -> Result<(), String> {
    for line in input.lines() {
        let line = line.map_err(|err| format!("console read failed: {}", err))?;
        match parse_console_line(&line) {
            Ok(Some(ConsoleCommand::Shutdown)) => return Ok(()),
            Ok(Some(command)) => {
                for reply in apply(listener, host, root, command) {
                    println!("{}", reply);
                }
            }
            Ok(None) => {}
            Err(err) => println!("{}", err),
        }
    }
    Ok(())
}

fn apply(
    listener: &ActivityListener<SimHost>,
    host: &SimHost,
    root: &Path,
    command: ConsoleCommand,
) -> Vec<String> {
    let engine = listener.engine();
    let lookup = |name: &str| host.find_by_name(name).ok_or_else(|| vec![format!("no such entity '{name}'")]);
    let result = match command {
        ConsoleCommand::Join(name) => {
            let id = host.find_by_name(&name).unwrap_or_else(|| host.join(&name));
            host.join_with_id(id, &name);
            let outcome = listener.on_join(id);
            Ok(vec![format!("{name} joined ({id}): {outcome:?}")])
        }
        ConsoleCommand::Quit(name) => lookup(&name).map(|id| {
            let returned = listener.on_quit(id);
            host.leave(id);
            vec![format!("{name} left: {returned:?}")]
        }),
        ConsoleCommand::Move { name, x, y, z } => lookup(&name).and_then(|id| {
            let from = host.entity(id).map(|entity| entity.location).ok_or_else(|| vec![format!("no such entity '{name}'")])?;
            let to = Location { x, y, z, ..from.clone() };
            match listener.handle(id, ActivitySignal::Move { from: &from, to: &to }) {
                Verdict::Cancel => Ok(vec![format!("{name} move cancelled")]),
                Verdict::Redirect(held) => {
                    host.place(id, held);
                    Ok(vec![format!("{name} is held in place")])
                }
                Verdict::Proceed => {
                    // a wake-up may already have moved the entity back
                    if host.entity(id).map(|entity| entity.location) == Some(from) {
                        host.place(id, to);
                    }
                    Ok(Vec::new())
                }
            }
        }),
        ConsoleCommand::Chat(name) => lookup(&name).map(|id| {
            listener.handle(id, ActivitySignal::Chat);
            Vec::new()
        }),
        ConsoleCommand::As { name, line } => lookup(&name).map(|id| {
            listener.handle(id, ActivitySignal::Command(&line));
            match parse_command(&line) {
                Ok(Some(command)) => {
                    dispatch(engine, root, CommandSender::Entity(id), &command);
                    host.messages(id).last().cloned().into_iter().collect()
                }
                Ok(None) => Vec::new(),
                Err(err) => vec![err],
            }
        }),
        ConsoleCommand::Command(line) => Ok(match parse_command(&line) {
            Ok(Some(command)) => dispatch(engine, root, CommandSender::Console, &command),
            Ok(None) => Vec::new(),
            Err(err) => vec![err],
        }),
        ConsoleCommand::List => {
            let now = Instant::now();
            Ok(host
                .online_entities()
                .into_iter()
                .filter_map(|id| host.entity(id).map(|entity| (id, entity)))
                .map(|(id, entity)| {
                    let state = engine
                        .record(id)
                        .filter(|record| record.is_away())
                        .map(|record| format!("away {}", format_duration(record.away_duration(now))))
                        .unwrap_or_else(|| "active".to_string());
                    format!(
                        "{} [{}] {} {:.1} {:.1} {:.1}",
                        entity.name, state, entity.location.world, entity.location.x, entity.location.y, entity.location.z
                    )
                })
                .collect())
        }
        ConsoleCommand::Help => Ok(vec![
            "join <name> | quit <name> | move <name> <x> <y> <z> | chat <name>".to_string(),
            "as <name> /<command> | /afkstatus | /afkreload | list | shutdown".to_string(),
        ]),
        ConsoleCommand::Shutdown => Ok(Vec::new()),
    };
    result.unwrap_or_else(|err| err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afk::engine::AfkEngine;
    use crate::config::Settings;
    use crate::persistence::backup::BackupStore;
    use std::sync::Arc;

    #[test]
    fn parse_console_line_parses_commands() {
        assert_eq!(parse_console_line("   ").unwrap(), None);
        assert_eq!(
            parse_console_line("join Alex").unwrap(),
            Some(ConsoleCommand::Join("Alex".to_string()))
        );
        assert_eq!(
            parse_console_line("move Alex 1 64.5 -3").unwrap(),
            Some(ConsoleCommand::Move {
                name: "Alex".to_string(),
                x: 1.0,
                y: 64.5,
                z: -3.0
            })
        );
        assert_eq!(
            parse_console_line("as Alex /afk").unwrap(),
            Some(ConsoleCommand::As {
                name: "Alex".to_string(),
                line: "/afk".to_string()
            })
        );
        assert_eq!(
            parse_console_line("/afkstatus").unwrap(),
            Some(ConsoleCommand::Command("/afkstatus".to_string()))
        );
        assert!(parse_console_line("move Alex 1 2").is_err());
        assert!(parse_console_line("dance").is_err());
    }

    #[test]
    fn console_session_drives_engine() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(SimHost::new());
        let engine = Arc::new(AfkEngine::new(
            Arc::clone(&host),
            Settings::default(),
            BackupStore::from_root(dir.path()),
        ));
        let listener = ActivityListener::new(Arc::clone(&engine));
        let script = "join Alex\nas Alex /afk\nlist\nshutdown\njoin Never\n";
        run_console(&listener, &host, dir.path(), script.as_bytes()).unwrap();

        let id = host.find_by_name("Alex").unwrap();
        // no permission granted, toggle refused
        assert!(!engine.is_away(id));
        assert!(host.find_by_name("Never").is_none());

        host.grant(id, crate::admin::commands::PERMISSION_AFK);
        run_console(&listener, &host, dir.path(), "as Alex /afk\n".as_bytes()).unwrap();
        assert!(engine.is_away(id));
        run_console(&listener, &host, dir.path(), "move Alex 5 100 5\n".as_bytes()).unwrap();
        assert!(!engine.is_away(id));
    }
}
