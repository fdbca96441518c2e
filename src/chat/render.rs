//! Terminal rendering for the chat application.
//!
//! [`TerminalObserver`] prints the growing assistant answer incrementally and
//! shows notices with ANSI styling.

use std::io::{self, Stdout, Write};

use crate::Message;
use crate::chat::notice::{Notice, NoticeLevel};
use crate::chat::session::ChatObserver;

/// ANSI escape code for dim text (used for citations).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for info notices).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for success notices).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for error notices).
const ANSI_RED: &str = "\x1b[31m";

/// Plain text observer with optional ANSI styling.
pub struct TerminalObserver {
    stdout: Stdout,
    use_color: bool,
    streaming: Option<String>,
    printed: usize,
}

impl TerminalObserver {
    /// Creates a new TerminalObserver with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new TerminalObserver with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            streaming: None,
            printed: 0,
        }
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    /// Print an informational line.
    pub fn print_info(&mut self, info: &str) {
        println!("{info}");
    }

    /// Print the sources cited by `message`.
    pub fn print_sources(&mut self, message: &Message) {
        let Some(metadata) = message.metadata.as_ref().filter(|m| !m.is_empty()) else {
            println!("No sources cited.");
            return;
        };
        for (i, source) in metadata.sources.iter().enumerate() {
            let article = source
                .article
                .as_deref()
                .map(|a| format!(" {a}"))
                .unwrap_or_default();
            println!("[{}] {}{}", i + 1, source.title, article);
            if let Some(url) = &source.url {
                if self.use_color {
                    println!("    {ANSI_DIM}{url}{ANSI_RESET}");
                } else {
                    println!("    {url}");
                }
            }
        }
    }

    /// Print a newline if an answer was interrupted mid-line.
    pub fn print_interrupted(&mut self) {
        if self.streaming.take().is_some() {
            println!();
        }
        println!("[interrupted]");
        self.flush();
    }

    /// Text of `content` not yet shown for the current answer.
    fn unseen<'a>(&mut self, content: &'a str) -> &'a str {
        if content.len() < self.printed || !content.is_char_boundary(self.printed) {
            // The text was replaced rather than extended; start a fresh line.
            println!();
            self.printed = 0;
        }
        let unseen = &content[self.printed..];
        self.printed = content.len();
        unseen
    }
}

impl Default for TerminalObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatObserver for TerminalObserver {
    fn message_appended(&mut self, message: &Message) {
        if message.is_assistant() {
            self.streaming = Some(message.id.clone());
            self.printed = 0;
        }
    }

    fn message_updated(&mut self, message: &Message) {
        if self.streaming.as_deref() != Some(message.id.as_str()) {
            return;
        }
        let unseen = self.unseen(&message.content);
        print!("{unseen}");
        self.flush();
    }

    fn loading_changed(&mut self, loading: bool) {
        if !loading && self.streaming.take().is_some() {
            println!();
            self.flush();
        }
    }

    fn notify(&mut self, notice: &Notice) {
        let (label, color) = match notice.level {
            NoticeLevel::Info => ("info", ANSI_CYAN),
            NoticeLevel::Success => ("ok", ANSI_GREEN),
            NoticeLevel::Error => ("error", ANSI_RED),
        };
        if self.use_color {
            eprintln!(
                "\n{color}[{label}] {}{ANSI_RESET} {}",
                notice.title, notice.description
            );
        } else {
            eprintln!("\n[{label}] {} {}", notice.title, notice.description);
        }
    }
}
