use agentview_client::config::{Args, ClientConfig};
use agentview_client::logging::init_logging;
use agentview_client::term::{self, UserCommand};
use agentview_client::{Driver, HttpTabApi, ReconnectPolicy, Session, SessionTransport};
use chrono::Utc;
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ClientConfig::from_args(&args)?;
    let _log_guard = init_logging(&config.log_dir, config.debug, config.log_stdout);
    info!(
        event = "client_start",
        url = %config.ws_url,
        api = %config.api_base
    );

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (done_tx, mut done_rx) = mpsc::channel(64);
    let mut transport = SessionTransport::new();
    let outbound = transport.connect(config.ws_url.clone(), event_tx, ReconnectPolicy::default());
    let api = Arc::new(HttpTabApi::new(config.api_base.clone()));
    let driver = Driver::new(api, outbound, done_tx);
    let mut session = Session::new(config.fold);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    print_lines(&[term::HELP.to_string()]);
    loop {
        let commands = tokio::select! {
            Some(event) = event_rx.recv() => session.handle_transport(event, Utc::now()),
            Some(done) = done_rx.recv() => done.apply(&mut session),
            line = stdin.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(event = "stdin_error", error = %err);
                        break;
                    }
                };
                match term::parse_command(&line) {
                    Ok(UserCommand::Quit) => break,
                    Ok(command) => handle_user_command(&mut session, command),
                    Err(message) => {
                        print_lines(&[message]);
                        Vec::new()
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        };
        if driver.run(commands) {
            print_view(&mut session);
        }
    }

    transport.shutdown();
    info!(event = "client_stop");
    Ok(())
}

fn handle_user_command(session: &mut Session, command: UserCommand) -> Vec<agentview_client::Command> {
    let now = Utc::now();
    match command {
        UserCommand::List => {
            let mut lines = term::list_lines(session.registry());
            if !session.is_connected() {
                lines.push("(disconnected, reconnecting)".to_string());
            }
            print_lines(&lines);
            Vec::new()
        }
        UserCommand::Show => {
            print_view(session);
            Vec::new()
        }
        UserCommand::Activate(reference) => {
            match term::resolve_tab_ref(session.registry(), &reference) {
                Some(id) => session.activate(&id),
                None => {
                    print_lines(&[format!("no tab {reference}")]);
                    Vec::new()
                }
            }
        }
        UserCommand::Close(None) => session.close(None, now),
        UserCommand::Close(Some(reference)) => {
            match term::resolve_tab_ref(session.registry(), &reference) {
                Some(id) => session.close(Some(&id), now),
                None => {
                    print_lines(&[format!("no tab {reference}")]);
                    Vec::new()
                }
            }
        }
        UserCommand::Reopen => session.reopen(),
        UserCommand::NextTab => session.cycle(1),
        UserCommand::PrevTab => session.cycle(-1),
        UserCommand::NextHunk | UserCommand::PrevHunk => {
            let forward = command == UserCommand::NextHunk;
            let Some(diff) = session.view_mut().diff_mut() else {
                print_lines(&["active tab is not a diff".to_string()]);
                return Vec::new();
            };
            if forward {
                diff.nav.next();
            } else {
                diff.nav.previous();
            }
            print_view(session);
            Vec::new()
        }
        UserCommand::Expand(idx) | UserCommand::Collapse(idx) => {
            let expanded = matches!(command, UserCommand::Expand(_));
            let Some(diff) = session.view_mut().diff_mut() else {
                print_lines(&["active tab is not a diff".to_string()]);
                return Vec::new();
            };
            if !diff.folds.set_expanded(idx, expanded) {
                print_lines(&[format!("no fold {idx}")]);
                return Vec::new();
            }
            print_view(session);
            Vec::new()
        }
        UserCommand::Help => {
            print_lines(&[term::HELP.to_string()]);
            Vec::new()
        }
        UserCommand::Quit => Vec::new(),
    }
}

fn print_view(session: &mut Session) {
    let lines = term::render_lines(session.view(), term::DEFAULT_WIDTH);
    print_lines(&lines);
}

fn print_lines(lines: &[String]) {
    let mut stdout = io::stdout().lock();
    for line in lines {
        let _ = writeln!(stdout, "{line}");
    }
    let _ = stdout.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentview_client::Command;
    use agentview_core::diff::FoldConfig;
    use agentview_core::protocol::ClientRequest;
    use agentview_core::{Tab, TabType};

    fn session_with(ids: &[&str]) -> Session {
        let mut session = Session::new(FoldConfig::default());
        let tabs = ids
            .iter()
            .map(|id| Tab::new(*id, id.to_uppercase(), TabType::Plain, *id))
            .collect();
        session.load_completed(0, Ok(tabs));
        session
    }

    #[test]
    fn close_with_unknown_ref_leaves_tabs_alone() {
        let mut session = session_with(&["a", "b"]);
        let commands = handle_user_command(&mut session, UserCommand::Close(Some("typo".into())));
        assert!(commands.is_empty());
        assert_eq!(session.registry().len(), 2);
        assert!(session.history().is_empty());
    }

    #[test]
    fn close_resolves_ids_and_positions() {
        let mut session = session_with(&["a", "b", "c"]);
        let commands = handle_user_command(&mut session, UserCommand::Close(Some("#2".into())));
        assert_eq!(
            commands,
            [Command::Send(ClientRequest::CloseTab {
                id: "b".to_string()
            })]
        );
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history().peek().map(|s| s.id.as_str()), Some("b"));
    }
}
