//! Terminal rendering of the chat

use crate::protocol::Phase;
use crate::store::{Message, MessageId, Role, ViewUpdate};
use std::io::{self, Write};

pub const CRISIS_BANNER: &str = "[crisis support]";
pub const CLEAR_HINT: &str = "(This conversation will clear in a moment.)";
pub const THINKING: &str = "thinking...";
pub const CLEAR_PROMPT: &str = "Clear the conversation? [y/N] ";

fn reply_prefix(phase: Option<Phase>) -> String {
    match phase {
        Some(phase) => format!("companion [{phase}]: "),
        None => "companion: ".to_string(),
    }
}

/// One message as a block of text, without a trailing newline
pub fn render_message(message: &Message) -> String {
    match message.role {
        Role::User => format!("you: {}", message.content),
        Role::Assistant if message.is_resolution => {
            format!("companion: {}\n{CLEAR_HINT}", message.content)
        }
        Role::Assistant if message.content.is_empty() => {
            format!("{}{THINKING}", reply_prefix(message.phase))
        }
        Role::Assistant => format!("{}{}", reply_prefix(message.phase), message.content),
        Role::System if message.is_crisis => format!("{CRISIS_BANNER} {}", message.content),
        Role::System => message.content.clone(),
    }
}

/// Whether a prompt answer means yes
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Writes view updates as a running transcript.
///
/// A streaming reply stays on an open line while chunks arrive; anything
/// else printed meanwhile closes the line and reopens it afterwards.
pub struct TranscriptPrinter<W: Write> {
    out: W,
    open_reply: Option<(MessageId, Option<Phase>)>,
}

impl<W: Write> TranscriptPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            open_reply: None,
        }
    }

    pub fn apply(&mut self, update: &ViewUpdate) -> io::Result<()> {
        match update {
            ViewUpdate::Appended(message) => self.appended(message)?,
            ViewUpdate::Extended { id, text } => {
                if self.open_reply.is_some_and(|(open, _)| open == *id) {
                    write!(self.out, "{text}")?;
                }
            }
            ViewUpdate::Removed { id } => {
                self.close_line()?;
                if self.open_reply.is_some_and(|(open, _)| open == *id) {
                    self.open_reply = None;
                    writeln!(self.out, "(reply discarded)")?;
                } else {
                    writeln!(self.out, "(your last message was not sent)")?;
                }
            }
            ViewUpdate::Cleared => {
                self.close_line()?;
                self.open_reply = None;
                writeln!(self.out, "---- conversation cleared ----")?;
            }
            ViewUpdate::Meta(meta) => {
                tracing::debug!(
                    conversation_id = ?meta.conversation_id,
                    phase = %meta.phase,
                    round_count = meta.round_count,
                    "Conversation metadata"
                );
            }
            ViewUpdate::Busy { sending, .. } => {
                if !sending {
                    self.close_line()?;
                    self.open_reply = None;
                }
            }
            ViewUpdate::Notice(notice) => {
                self.interrupt(|out| writeln!(out, "! {notice}"))?;
            }
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn appended(&mut self, message: &Message) -> io::Result<()> {
        match message.role {
            Role::Assistant if !message.is_resolution => {
                self.close_line()?;
                write!(self.out, "{}{}", reply_prefix(message.phase), message.content)?;
                self.open_reply = Some((message.id, message.phase));
                Ok(())
            }
            _ => {
                let text = render_message(message);
                self.interrupt(|out| writeln!(out, "{text}"))
            }
        }
    }

    /// Print a full line, resuming an open reply afterwards
    fn interrupt(&mut self, print: impl FnOnce(&mut W) -> io::Result<()>) -> io::Result<()> {
        self.close_line()?;
        print(&mut self.out)?;
        if let Some((_, phase)) = self.open_reply {
            write!(self.out, "{}", reply_prefix(phase))?;
        }
        Ok(())
    }

    fn close_line(&mut self) -> io::Result<()> {
        if self.open_reply.is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }
}
