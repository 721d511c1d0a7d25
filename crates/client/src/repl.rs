use std::io::Write;
use std::sync::Arc;

use cognicore_client::{
    ClientError, CoordinatorEvent, CoordinatorState, HttpRegistryClient, NoticeLevel,
    SettingsPatch, StateCoordinator,
};
use cognicore_protocol::Role;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

const HELP: &str = "\
Commands:
  /sessions              list sessions (* marks the current one)
  /new                   start a new session
  /select <n>            switch to session n
  /delete <n>            delete session n
  /rename <n> <title>    rename session n
  /history               show the current conversation
  /search <text>         show messages containing text
  /clear-search          drop the search filter
  /model <id>            set the model
  /temp <0..1>           set the temperature
  /max-tokens <n>        set the token budget
  /prompts <goal>        suggest starter prompts for a goal
  /stats                 count sessions
  /clear-all             delete every session
  /help                  show this help
  /quit                  exit
Anything else is sent to the current session.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(String),
    Sessions,
    New,
    Select(usize),
    Delete(usize),
    Rename(usize, String),
    History,
    Search(String),
    ClearSearch,
    Model(String),
    Temperature(f64),
    MaxTokens(u32),
    Prompts(String),
    Stats,
    ClearAll,
    Help,
    Quit,
}

/// Parse one input line. Session numbers are 1-based, as printed by
/// `/sessions`.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "sessions" => Ok(Command::Sessions),
        "new" => Ok(Command::New),
        "select" => Ok(Command::Select(session_number(rest)?)),
        "delete" => Ok(Command::Delete(session_number(rest)?)),
        "rename" => {
            let (number, title) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: /rename <n> <title>".to_string())?;
            Ok(Command::Rename(session_number(number)?, title.trim().to_string()))
        }
        "history" => Ok(Command::History),
        "search" => Ok(Command::Search(rest.to_string())),
        "clear-search" => Ok(Command::ClearSearch),
        "model" if !rest.is_empty() => Ok(Command::Model(rest.to_string())),
        "model" => Err("usage: /model <id>".to_string()),
        "temp" => rest
            .parse()
            .map(Command::Temperature)
            .map_err(|_| "usage: /temp <0..1>".to_string()),
        "max-tokens" => rest
            .parse()
            .map(Command::MaxTokens)
            .map_err(|_| "usage: /max-tokens <n>".to_string()),
        "prompts" => Ok(Command::Prompts(rest.to_string())),
        "stats" => Ok(Command::Stats),
        "clear-all" => Ok(Command::ClearAll),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command /{other}, try /help")),
    }
}

fn session_number(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("expected a session number, got {raw:?}")),
    }
}

pub async fn run(
    coordinator: StateCoordinator,
    prompts: Arc<HttpRegistryClient>,
) -> anyhow::Result<()> {
    let printer = tokio::spawn(print_events(coordinator.subscribe()));

    coordinator.initialize().await;
    print_sessions(&coordinator.snapshot());
    print_history(&coordinator.snapshot());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => execute(&coordinator, &prompts, command).await,
            Err(message) => println!("{message}"),
        }
    }

    printer.abort();
    Ok(())
}

async fn execute(coordinator: &StateCoordinator, prompts: &HttpRegistryClient, command: Command) {
    match command {
        Command::Send(text) => {
            if coordinator.send_message(&text).await {
                println!();
            } else {
                println!("(busy, message not sent)");
            }
        }
        Command::Sessions => print_sessions(&coordinator.snapshot()),
        Command::New => {
            if coordinator.create_session().await.is_some() {
                print_sessions(&coordinator.snapshot());
            }
        }
        Command::Select(n) => {
            if let Some(id) = session_at(coordinator, n) {
                coordinator.select_session(&id).await;
                print_history(&coordinator.snapshot());
            }
        }
        Command::Delete(n) => {
            if let Some(id) = session_at(coordinator, n) {
                coordinator.open_delete_dialog(&id);
                coordinator.delete_session().await;
                print_sessions(&coordinator.snapshot());
            }
        }
        Command::Rename(n, title) => {
            if let Some(id) = session_at(coordinator, n) {
                coordinator.open_rename_dialog(&id);
                if let Err(ClientError::Validation(message)) =
                    coordinator.rename_session(&title).await
                {
                    println!("{message}");
                    coordinator.close_rename_dialog();
                }
            }
        }
        Command::History => print_history(&coordinator.snapshot()),
        Command::Search(query) => {
            coordinator.set_search_query(&query);
            let state = coordinator.snapshot();
            for message in state.search_results() {
                println!("{}: {}", role_label(message.role), message.content);
            }
        }
        Command::ClearSearch => coordinator.clear_search(),
        Command::Model(model) => coordinator.set_settings(SettingsPatch::model(model)).await,
        Command::Temperature(temperature) => {
            coordinator
                .set_settings(SettingsPatch {
                    temperature: Some(temperature),
                    ..Default::default()
                })
                .await
        }
        Command::MaxTokens(max_tokens) => {
            coordinator
                .set_settings(SettingsPatch {
                    max_tokens: Some(max_tokens),
                    ..Default::default()
                })
                .await
        }
        Command::Prompts(goal) => match prompts.generate_prompts(&goal).await {
            Ok(list) => {
                for (i, prompt) in list.iter().enumerate() {
                    println!("{}. {}", i + 1, prompt);
                }
            }
            Err(e) => println!("{e}"),
        },
        Command::Stats => match coordinator.session_count().await {
            Ok(count) => println!("{count} sessions"),
            Err(e) => println!("{e}"),
        },
        Command::ClearAll => match coordinator.clear_all_sessions().await {
            Ok(cleared) => println!("cleared {cleared} sessions"),
            Err(e) => println!("{e}"),
        },
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}

fn session_at(coordinator: &StateCoordinator, n: usize) -> Option<String> {
    let state = coordinator.snapshot();
    let id = state.sessions.get(n - 1).map(|s| s.id.clone());
    if id.is_none() {
        println!("no session {n}, see /sessions");
    }
    id
}

async fn print_events(mut events: broadcast::Receiver<CoordinatorEvent>) {
    loop {
        match events.recv().await {
            Ok(CoordinatorEvent::Fragment { text, .. }) => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            Ok(CoordinatorEvent::Notice(notice)) => match notice.level {
                NoticeLevel::Success => println!("[ok] {}", notice.text),
                NoticeLevel::Error => println!("[error] {}", notice.text),
            },
            Ok(CoordinatorEvent::StateChanged { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_sessions(state: &CoordinatorState) {
    for (i, session) in state.sessions.iter().enumerate() {
        let marker = if state.current_session_id.as_deref() == Some(session.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {}. {}", i + 1, session.title);
    }
}

fn print_history(state: &CoordinatorState) {
    for message in state.visible_messages() {
        println!("{}: {}", role_label(message.role), message.content);
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_sent() {
        assert_eq!(
            parse_command("  hello there "),
            Ok(Command::Send("hello there".to_string()))
        );
    }

    #[test]
    fn commands_parse_their_arguments() {
        assert_eq!(parse_command("/select 2"), Ok(Command::Select(2)));
        assert_eq!(
            parse_command("/rename 1  Borrow checker notes"),
            Ok(Command::Rename(1, "Borrow checker notes".to_string()))
        );
        assert_eq!(parse_command("/temp 0.3"), Ok(Command::Temperature(0.3)));
        assert_eq!(parse_command("/max-tokens 512"), Ok(Command::MaxTokens(512)));
        assert_eq!(
            parse_command("/model openai/gpt-4o"),
            Ok(Command::Model("openai/gpt-4o".to_string()))
        );
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse_command("/select 0").is_err());
        assert!(parse_command("/select two").is_err());
        assert!(parse_command("/rename 1").is_err());
        assert!(parse_command("/model").is_err());
        assert!(parse_command("/frobnicate").is_err());
    }
}
