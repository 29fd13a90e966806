use crate::afk::engine::AfkEngine;
use crate::config::Settings;
use crate::text::{colorize, format_duration, render};
use crate::world::host::{EntityId, Host};
use std::path::Path;
use std::time::Instant;

pub const PERMISSION_AFK: &str = "smartafk.afk";
pub const PERMISSION_STATUS: &str = "smartafk.status";
pub const PERMISSION_RELOAD: &str = "smartafk.reload";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfkCommand {
    Toggle,
    Status,
    Reload,
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSender {
    Entity(EntityId),
    Console,
}

pub fn parse_command(message: &str) -> Result<Option<AfkCommand>, String> {
    let trimmed = message.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(None);
    };
    let command = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| "command missing name".to_string())?
        .to_ascii_lowercase();
    let parsed = match command.as_str() {
        "afk" => AfkCommand::Toggle,
        "afkstatus" => AfkCommand::Status,
        "afkreload" => AfkCommand::Reload,
        _ => AfkCommand::Unknown(command),
    };
    Ok(Some(parsed))
}

fn permitted<H: Host>(engine: &AfkEngine<H>, sender: CommandSender, permission: &str) -> bool {
    match sender {
        CommandSender::Console => true,
        CommandSender::Entity(id) => engine.host().has_permission(id, permission),
    }
}

/// Runs a command and returns the reply lines for the sender, already
/// colourised. `root` is the data directory the config is reloaded from.
pub fn execute<H: Host>(
    engine: &AfkEngine<H>,
    root: &Path,
    sender: CommandSender,
    command: &AfkCommand,
) -> Vec<String> {
    let settings = engine.settings();
    let messages = &settings.messages;
    match command {
        AfkCommand::Toggle => {
            let CommandSender::Entity(id) = sender else {
                return vec![colorize(&messages.players_only)];
            };
            if !permitted(engine, sender, PERMISSION_AFK) {
                return vec![colorize(&messages.no_permission)];
            }
            match engine.toggle_away(id) {
                Ok(transition) => tracing::debug!("{} toggled afk: {:?}", engine.name_of(id), transition),
                Err(err) => tracing::warn!("afk toggle failed: {}", err),
            }
            Vec::new()
        }
        AfkCommand::Status => {
            if !permitted(engine, sender, PERMISSION_STATUS) {
                return vec![colorize(&messages.no_permission)];
            }
            status_lines(engine, &settings, Instant::now())
        }
        AfkCommand::Reload => {
            if !permitted(engine, sender, PERMISSION_RELOAD) {
                return vec![colorize(&messages.no_permission)];
            }
            match Settings::load(root) {
                Ok((reloaded, issues)) => {
                    for issue in &issues {
                        tracing::warn!("config {}: {}", issue.key, issue.message);
                    }
                    let reply = colorize(&format!("{}{}", reloaded.messages.prefix, reloaded.messages.reload));
                    engine.reload_settings(reloaded);
                    tracing::info!("configuration reloaded");
                    vec![reply]
                }
                Err(err) => {
                    tracing::error!("configuration reload failed: {}", err);
                    vec![colorize("&cReload failed, see the server log.")]
                }
            }
        }
        AfkCommand::Unknown(name) => vec![format!("Unknown command: /{name}")],
    }
}

fn status_lines<H: Host>(engine: &AfkEngine<H>, settings: &Settings, now: Instant) -> Vec<String> {
    let messages = &settings.messages;
    let mut lines = vec![colorize(&messages.status_header)];
    let away = engine.away_entities(now);
    for (id, duration) in &away {
        lines.push(render(
            &messages.status_line,
            &[
                ("player", &engine.name_of(*id)),
                ("time", &format_duration(*duration)),
            ],
        ));
    }
    if away.is_empty() {
        lines.push(colorize(&messages.status_empty));
    } else {
        lines.push(render(&messages.status_total, &[("count", &away.len().to_string())]));
    }
    lines
}

/// Executes and delivers the replies to an entity sender. Console replies
/// are returned to the caller.
pub fn dispatch<H: Host>(
    engine: &AfkEngine<H>,
    root: &Path,
    sender: CommandSender,
    command: &AfkCommand,
) -> Vec<String> {
    let replies = execute(engine, root, sender, command);
    let CommandSender::Entity(id) = sender else {
        return replies;
    };
    for reply in &replies {
        if let Err(err) = engine.host().send_message(id, reply) {
            tracing::debug!("reply not delivered: {}", err);
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::backup::BackupStore;
    use crate::world::sim::SimHost;
    use std::sync::Arc;

    fn engine(root: &Path) -> (Arc<SimHost>, AfkEngine<SimHost>) {
        let host = Arc::new(SimHost::new());
        let engine = AfkEngine::new(Arc::clone(&host), Settings::default(), BackupStore::from_root(root));
        (host, engine)
    }

    #[test]
    fn parse_command_ignores_chat() {
        assert_eq!(parse_command("hello").unwrap(), None);
    }

    #[test]
    fn parse_command_parses_names() {
        assert_eq!(parse_command("/afk").unwrap(), Some(AfkCommand::Toggle));
        assert_eq!(parse_command(" /AfkStatus ").unwrap(), Some(AfkCommand::Status));
        assert_eq!(parse_command("/afkreload now").unwrap(), Some(AfkCommand::Reload));
        assert_eq!(
            parse_command("/spawn").unwrap(),
            Some(AfkCommand::Unknown("spawn".to_string()))
        );
        assert!(parse_command("/").is_err());
    }

    #[test]
    fn toggle_requires_entity_and_permission() {
        let dir = tempfile::tempdir().unwrap();
        let (host, engine) = engine(dir.path());
        let replies = execute(&engine, dir.path(), CommandSender::Console, &AfkCommand::Toggle);
        assert_eq!(replies, vec![colorize(&Settings::default().messages.players_only)]);

        let id = host.join("Alex");
        let replies = execute(&engine, dir.path(), CommandSender::Entity(id), &AfkCommand::Toggle);
        assert_eq!(replies, vec![colorize(&Settings::default().messages.no_permission)]);
        assert!(!engine.is_away(id));

        host.grant(id, PERMISSION_AFK);
        assert!(execute(&engine, dir.path(), CommandSender::Entity(id), &AfkCommand::Toggle).is_empty());
        assert!(engine.is_away(id));
    }

    #[test]
    fn status_lists_away_entities() {
        let dir = tempfile::tempdir().unwrap();
        let (host, engine) = engine(dir.path());
        let lines = execute(&engine, dir.path(), CommandSender::Console, &AfkCommand::Status);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("Nobody is AFK"));

        let id = host.join("Alex");
        engine.set_away(id, true).unwrap();
        let lines = execute(&engine, dir.path(), CommandSender::Console, &AfkCommand::Status);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("Alex"));
        assert!(lines[1].contains("0s"));
        assert!(lines[2].contains('1'));
    }

    #[test]
    fn reload_reads_config_from_root() {
        let dir = tempfile::tempdir().unwrap();
        let (host, engine) = engine(dir.path());
        std::fs::write(dir.path().join(crate::config::CONFIG_FILE), "afk-timeout: 120\n").unwrap();

        let id = host.join("Alex");
        let denied = dispatch(&engine, dir.path(), CommandSender::Entity(id), &AfkCommand::Reload);
        assert!(denied.is_empty());
        assert_eq!(host.messages(id), vec![colorize(&Settings::default().messages.no_permission)]);
        assert_eq!(engine.settings().afk_timeout, 300);

        let replies = dispatch(&engine, dir.path(), CommandSender::Console, &AfkCommand::Reload);
        assert_eq!(replies.len(), 1);
        assert_eq!(engine.settings().afk_timeout, 120);
    }
}
