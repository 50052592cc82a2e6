//! JSON-lines console adapter
//!
//! Stands in for the chat platform: each input line is an event, each output
//! line is the engine's answer for it.
//!
//! ```text
//! > {"type":"message","surface":"g1-c42","scope":"g1","user":7,"name":"mika","text":"recall 10"}
//! < {"surface":"g1-c42","command":"recall","ok":true,"context":[...],"recall_block":"[...] mika (user): ..."}
//! > {"type":"reply","surface":"g1-c42","text":"..."}
//! ```

use crate::commands::{self, Command};
use recallbot_core::{Scope, SurfaceKey, Turn, UserId};
use recallbot_memory::{render_recall_block, ConversationEngine, InboundMessage, RecallOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

const CLEAR_ANSWER: &str = "conversation memory cleared; logs are kept";

fn default_scope() -> String {
    "dm".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsoleEvent {
    Message {
        surface: String,
        #[serde(default = "default_scope")]
        scope: String,
        user: u64,
        #[serde(default)]
        name: String,
        text: String,
    },
    /// The assistant's answer, fed back by the response generator.
    Reply { surface: String, text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleOutput {
    pub surface: String,
    pub command: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub context: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall_block: Option<String>,
}

impl ConsoleOutput {
    fn new(surface: &SurfaceKey, command: &str, context: Vec<Turn>) -> Self {
        Self {
            surface: surface.to_string(),
            command: command.to_string(),
            ok: true,
            message: None,
            context,
            recall_block: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn with_recall(mut self, recall: Option<&RecallOutcome>) -> Self {
        self.recall_block = recall
            .filter(|r| !r.picked.is_empty())
            .map(|r| render_recall_block(&r.picked));
        self
    }

    fn failed(mut self, message: impl Into<String>) -> Self {
        self.ok = false;
        self.message = Some(message.into());
        self
    }
}

pub struct Console {
    engine: Arc<ConversationEngine>,
    bot_id: UserId,
    bot_name: String,
}

impl Console {
    pub fn new(engine: Arc<ConversationEngine>, bot_id: UserId, bot_name: impl Into<String>) -> Self {
        Self { engine, bot_id, bot_name: bot_name.into() }
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    /// Read events until EOF, writing one output line per event. Malformed
    /// lines produce an error line and do not stop the loop.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut handled = 0;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let output = self.handle_line(&line).await;
            let mut json = serde_json::to_string(&output)?;
            json.push('\n');
            writer.write_all(json.as_bytes()).await?;
            writer.flush().await?;
            handled += 1;
        }
        info!("Console input closed after {} events", handled);
        Ok(handled)
    }

    pub async fn handle_line(&self, line: &str) -> ConsoleOutput {
        match serde_json::from_str::<ConsoleEvent>(line) {
            Ok(event) => self.handle(event).await,
            Err(e) => {
                warn!("Malformed console event: {}", e);
                ConsoleOutput::new(&SurfaceKey::new(""), "invalid", Vec::new()).failed(e.to_string())
            }
        }
    }

    pub async fn handle(&self, event: ConsoleEvent) -> ConsoleOutput {
        match event {
            ConsoleEvent::Reply { surface, text } => {
                let surface = SurfaceKey::new(surface);
                let outcome = self.engine.on_reply(&surface, self.bot_id, &self.bot_name, text).await;
                let output = ConsoleOutput::new(&surface, "reply", self.engine.get_context(&surface).await);
                match outcome.log_error {
                    Some(e) => output.with_message(format!("not logged: {}", e)),
                    None => output,
                }
            }
            ConsoleEvent::Message { surface, scope, user, name, text } => {
                let msg = InboundMessage::new(surface, scope, UserId(user), name, text);
                self.dispatch(msg).await
            }
        }
    }

    async fn dispatch(&self, msg: InboundMessage) -> ConsoleOutput {
        let surface = msg.surface.clone();
        let scope: Scope = msg.scope.clone();
        let user = msg.sender;

        match commands::parse(&msg.text) {
            Command::Clear => {
                self.engine.clear(&surface).await;
                let logged = self.engine.log_exchange(msg, self.bot_id, &self.bot_name, CLEAR_ANSWER).await;
                let output = ConsoleOutput::new(&surface, "clear", Vec::new()).with_message(CLEAR_ANSWER);
                match logged.into_iter().find_map(|o| o.log_error) {
                    Some(e) => output.with_message(format!("{}; not logged: {}", CLEAR_ANSWER, e)),
                    None => output,
                }
            }
            Command::SetAlias { alias } => {
                let result = self.engine.set_alias(&scope, user, &alias).await;
                // The request itself is part of the conversation either way.
                let outcome = self.engine.on_message(msg).await;
                let output = ConsoleOutput::new(&surface, "alias", outcome.context);
                match result {
                    Ok(stored) => output.with_message(format!("alias set to {}", stored)),
                    Err(e) => output.failed(e.to_string()),
                }
            }
            Command::Recall { lines, rest } => {
                // The whole requested tail comes back; the keyword trigger
                // does not fire on top of an explicit recall.
                let window = commands::clamp_recall_lines(lines, user, self.engine.config());
                let recall = self.engine.recall(&surface, Some(window), Some(window)).await;
                let msg = InboundMessage { text: rest, ..msg }.without_auto_recall();
                let outcome = self.engine.on_message(msg).await;
                ConsoleOutput::new(&surface, "recall", outcome.context).with_recall(Some(&recall))
            }
            Command::Fresh { rest } => {
                let msg = InboundMessage { text: rest, ..msg };
                let outcome = self.engine.on_message(msg).await;
                ConsoleOutput::new(&surface, "fresh", vec![outcome.turn])
            }
            Command::Chat { text } => {
                let msg = InboundMessage { text, ..msg };
                let outcome = self.engine.on_message(msg).await;
                let output =
                    ConsoleOutput::new(&surface, "chat", outcome.context).with_recall(outcome.recall.as_ref());
                match outcome.log_error {
                    Some(e) => output.with_message(format!("not logged: {}", e)),
                    None => output,
                }
            }
        }
    }
}
