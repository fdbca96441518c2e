//! Interactive chat with the legal assistant.
//!
//! # Usage
//!
//! ```bash
//! # Local functions endpoint, state in ./.mecenas-state.json
//! mecenas-chat
//!
//! # A hosted backend with its anonymous key
//! mecenas-chat --api-url https://example.supabase.co/functions/v1/ --api-key KEY
//!
//! # Settings from a YAML file, without colors
//! mecenas-chat --config mecenas.yaml --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/feedback +|-` - Rate the latest answer
//! - `/share` - Publish the conversation
//! - `/recover` - Repair the conversation after an interrupted answer
//! - `/quit` - Exit the application

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::Notify;

use mecenas::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, TerminalObserver, TurnOutcome, help_text,
    parse_command,
};
use mecenas::{AssistantClient, FileStore, SessionStorage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("mecenas-chat [OPTIONS]");
    let mut config = ChatConfig::new();
    if let Some(path) = &args.config {
        config = config.with_yaml_file(path)?;
    }
    let config = config.with_env().with_args(args);

    let client = AssistantClient::with_options(
        config.api_key.clone(),
        Some(config.api_url.clone()),
        Some(config.timeout),
    )?
    .with_missing_terminal(config.missing_terminal);
    let mut storage = SessionStorage::new(FileStore::open(&config.storage_path)?);
    if !storage.consent_accepted() {
        println!("Rozmowy są zapisywane w celu poprawy jakości odpowiedzi.");
        storage.set_consent_accepted(true)?;
    }

    let mut observer = TerminalObserver::with_color(config.use_color);
    let mut session = ChatSession::new(client, config, storage);
    let mut rl = DefaultEditor::new()?;
    let mut attachment: Option<String> = None;

    // Wakes an in-flight answer when Ctrl+C arrives during streaming.
    let interrupt = Arc::new(Notify::new());
    let interrupt_clone = interrupt.clone();
    ctrlc::set_handler(move || {
        interrupt_clone.notify_waiters();
    })?;

    println!("Mecenas (session: {})", session.session_id()?);
    println!("Type /help for commands, /quit to exit\n");

    loop {
        match rl.readline("Ty: ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Do widzenia!");
                            break;
                        }
                        ChatCommand::Clear => match session.clear() {
                            Ok(()) => observer.print_info("Conversation cleared."),
                            Err(err) => eprintln!("Error: {err}"),
                        },
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::Premium(enabled) => match session.set_premium_model(enabled) {
                            Ok(()) if enabled => observer.print_info("Premium model enabled."),
                            Ok(()) => observer.print_info("Premium model disabled."),
                            Err(err) => eprintln!("Error: {err}"),
                        },
                        ChatCommand::Unlock => match session.unlock_premium() {
                            Ok(()) => observer.print_info("Premium model unlocked."),
                            Err(err) => eprintln!("Error: {err}"),
                        },
                        ChatCommand::Feedback(kind) => {
                            let Some(message_id) = session.last_assistant().map(|m| m.id.clone())
                            else {
                                eprintln!("Error: no answer to rate yet");
                                continue;
                            };
                            if let Err(err) =
                                session.submit_feedback(&message_id, kind, &mut observer).await
                            {
                                eprintln!("Error: {err}");
                            }
                        }
                        ChatCommand::Share => match session.share().await {
                            Ok(share_id) => observer.print_info(&format!("Share id: {share_id}")),
                            Err(err) => eprintln!("Error: {err}"),
                        },
                        ChatCommand::Open(share_id) => match session.open_shared(&share_id).await {
                            Ok(count) => {
                                observer.print_info(&format!("Loaded {count} messages."));
                                for message in session.messages() {
                                    println!("[{}] {}", message.role, message.content);
                                }
                            }
                            Err(err) if err.is_expired() => eprintln!("Error: link expired"),
                            Err(err) => eprintln!("Error: {err}"),
                        },
                        ChatCommand::Attach(path) => match std::fs::read_to_string(&path) {
                            Ok(text) => {
                                observer.print_info(&format!(
                                    "Attached {path} ({} bytes) to the next question.",
                                    text.len()
                                ));
                                attachment = Some(text);
                            }
                            Err(err) => eprintln!("Error: cannot read {path}: {err}"),
                        },
                        ChatCommand::Sources => match session.last_assistant() {
                            Some(message) => observer.print_sources(message),
                            None => observer.print_info("No answer yet."),
                        },
                        ChatCommand::Session => print_session(&mut session),
                        ChatCommand::Recover => {
                            if session.recover(&mut observer) {
                                observer.print_info("Recovered the interrupted answer.");
                            } else {
                                observer.print_info("Nothing to recover.");
                            }
                        }
                        ChatCommand::Invalid(message) => eprintln!("Error: {message}"),
                    }
                    continue;
                }

                println!("Mecenas:");
                let outcome = tokio::select! {
                    outcome = session.send_message(line, attachment.take(), &mut observer) => {
                        Some(outcome)
                    }
                    _ = interrupt.notified() => None,
                };
                match outcome {
                    Some(Ok(TurnOutcome::Completed { .. })) => {}
                    Some(Ok(TurnOutcome::Failed { error, .. })) => {
                        tracing::debug!(error = %error, "turn failed");
                    }
                    Some(Err(err)) => eprintln!("Error: {err}"),
                    None => {
                        observer.print_interrupted();
                        session.recover(&mut observer);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nDo widzenia!");
                break;
            }
            Err(err) => {
                eprintln!("Input error: {err}");
                break;
            }
        }
    }

    Ok(())
}

fn print_session(session: &mut ChatSession<AssistantClient>) {
    let session_id = session
        .session_id()
        .unwrap_or_else(|err| format!("(unavailable: {err})"));
    let storage = session.storage();
    println!("    Session:");
    println!("      Id: {session_id}");
    println!("      Messages: {}", session.messages().len());
    println!("      Premium unlocked: {}", storage.premium_unlocked());
    println!("      Premium model: {}", session.premium_model());
    println!("      Consent accepted: {}", storage.consent_accepted());
    println!("      Backend: {}", session.config().api_url);
    println!("      State: {:?}", session.state());
}
