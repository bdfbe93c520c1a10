//! `docqa chat` and `docqa complete`.
//!
//! The chat loop streams each reply to the terminal while it is generated
//! and keeps every conversation in a [`ChatStore`]. A failed reply leaves
//! the conversation as it was before the prompt.

use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::chat::ChatStore;
use crate::config::Config;
use crate::llm::{collect_stream, ChatMessage, ChatModel, OpenAiCompatClient};
use crate::session_cmd::Flow;

const HELP: &str = "\
Commands:
  :new              start a new conversation
  :list             list conversations
  :switch <id>      make another conversation active
  :delete <id>      delete a conversation
  :show             print the active conversation
  :models           list models offered by the service
  :quit             leave the chat
Anything else is sent to the model.";

/// Interactive chat over stdin.
pub async fn run_chat(config: &Config, model: Option<String>) -> Result<()> {
    let client = client_for(config, model)?;
    let store = ChatStore::open(&config.chat.history_path, &config.chat.system_prompt)?;
    let mut stdout = std::io::stdout();
    writeln!(
        stdout,
        "docqa chat ({}). History: {}. Type :help for commands.",
        client.model_name(),
        store.path().display()
    )?;
    let mut repl = ChatRepl::new(client, store);
    repl.run(BufReader::new(tokio::io::stdin()), &mut stdout).await
}

/// Single prompt, single reply. With `stream`, fragments are printed as
/// they arrive.
pub async fn run_complete(
    config: &Config,
    prompt: &str,
    system: Option<&str>,
    stream: bool,
    model: Option<String>,
) -> Result<()> {
    let client = client_for(config, model)?;
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));

    let mut stdout = std::io::stdout();
    if stream {
        let fragments = client.stream(&messages).await?;
        collect_stream(fragments, |f| {
            let _ = write!(stdout, "{}", f);
            let _ = stdout.flush();
        })
        .await?;
        writeln!(stdout)?;
    } else {
        let reply = client.complete(&messages).await?;
        writeln!(stdout, "{}", reply.trim_end())?;
    }
    Ok(())
}

fn client_for(config: &Config, model: Option<String>) -> Result<Arc<dyn ChatModel>> {
    let client = OpenAiCompatClient::from_config(&config.llm)?;
    Ok(match model {
        Some(m) => Arc::new(client.with_model(m)),
        None => Arc::new(client),
    })
}

pub struct ChatRepl {
    model: Arc<dyn ChatModel>,
    store: ChatStore,
}

impl ChatRepl {
    pub fn new(model: Arc<dyn ChatModel>, store: ChatStore) -> Self {
        Self { model, store }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        loop {
            write!(out, "you> ")?;
            out.flush()?;
            let Some(line) = lines.next_line().await? else {
                writeln!(out)?;
                break;
            };
            if self.handle_line(&line, out).await? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    pub async fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Flow> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        match command {
            ":quit" | ":q" | ":exit" => return Ok(Flow::Quit),
            ":help" => writeln!(out, "{}", HELP)?,
            ":new" => {
                let id = self.store.new_chat()?;
                writeln!(out, "Started {}.", id)?;
            }
            ":list" => {
                let active = self.store.active_id().to_string();
                for (id, title) in self.store.list() {
                    let marker = if id == active { "*" } else { " " };
                    writeln!(out, "{} {:<10} {}", marker, id, title)?;
                }
            }
            ":switch" => match self.store.switch(rest) {
                Ok(()) => writeln!(out, "Switched to {}.", rest)?,
                Err(e) => writeln!(out, "error: {}", e)?,
            },
            ":delete" => match self.store.delete(rest) {
                Ok(()) => writeln!(out, "Deleted {}. Active: {}.", rest, self.store.active_id())?,
                Err(e) => writeln!(out, "error: {}", e)?,
            },
            ":show" => self.print_active(out)?,
            ":models" => {
                let current = self.model.model_name().to_string();
                for m in self.model.available_models().await {
                    let marker = if m == current { "*" } else { " " };
                    writeln!(out, "{} {}", marker, m)?;
                }
            }
            c if c.starts_with(':') => {
                writeln!(out, "unknown command '{}'. Type :help for commands.", c)?
            }
            _ => self.send(line, out).await?,
        }
        Ok(Flow::Continue)
    }

    async fn send<W: Write>(&mut self, prompt: &str, out: &mut W) -> Result<()> {
        let messages = self.store.push_user(prompt)?;
        let reply = match self.model.stream(&messages).await {
            Ok(fragments) => {
                let mut write_err = None;
                let result = collect_stream(fragments, |f| {
                    if let Err(e) = write!(out, "{}", f).and_then(|_| out.flush()) {
                        write_err.get_or_insert(e);
                    }
                })
                .await;
                if let Some(e) = write_err {
                    return Err(e.into());
                }
                result
            }
            Err(e) => Err(e),
        };
        match reply {
            Ok(text) => {
                writeln!(out)?;
                self.store.push_assistant(&text)?;
            }
            Err(e) => {
                writeln!(out)?;
                writeln!(out, "error: {:#}", e)?;
                self.store.pop_unanswered()?;
            }
        }
        Ok(())
    }

    fn print_active<W: Write>(&self, out: &mut W) -> Result<()> {
        let Some(chat) = self.store.active() else {
            return Ok(());
        };
        writeln!(out, "{} ({})", chat.title, self.store.active_id())?;
        for m in &chat.messages {
            let role = serde_json::to_value(m.role)?;
            writeln!(out, "[{}] {}", role.as_str().unwrap_or_default(), m.content)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Role, TextStream};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use futures::stream;
    use tempfile::TempDir;

    /// Streams back the last user message in two pieces, or fails when it
    /// contains "fail".
    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        fn model_name(&self) -> &str {
            "echo-1"
        }

        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
        }

        async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            if last.contains("fail") {
                return Ok(Box::pin(stream::iter(vec![
                    Ok("par".to_string()),
                    Err(anyhow!("stream dropped")),
                ])));
            }
            Ok(Box::pin(stream::iter(vec![
                Ok("echo: ".to_string()),
                Ok(last),
            ])))
        }
    }

    fn repl(tmp: &TempDir) -> ChatRepl {
        let store = ChatStore::open(tmp.path().join("chats.json"), "be brief").unwrap();
        ChatRepl::new(Arc::new(EchoModel), store)
    }

    #[tokio::test]
    async fn test_reply_is_streamed_and_saved() {
        let tmp = TempDir::new().unwrap();
        let mut r = repl(&tmp);
        let mut out = Vec::new();
        r.handle_line("hello there", &mut out).await.unwrap();

        assert!(String::from_utf8(out).unwrap().contains("echo: hello there"));
        let chat = r.store().active().unwrap();
        assert_eq!(chat.title, "hello there");
        let roles: Vec<Role> = chat.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(chat.messages[2].content, "echo: hello there");
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_conversation_unchanged() {
        let tmp = TempDir::new().unwrap();
        let mut r = repl(&tmp);
        let mut out = Vec::new();
        r.handle_line("please fail", &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("error: stream dropped"));
        assert_eq!(r.store().active().unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_commands() {
        let tmp = TempDir::new().unwrap();
        let mut r = repl(&tmp);
        let mut out = Vec::new();
        r.handle_line(":new", &mut out).await.unwrap();
        r.handle_line(":list", &mut out).await.unwrap();
        r.handle_line(":switch chat_9", &mut out).await.unwrap();
        r.handle_line(":models", &mut out).await.unwrap();
        r.handle_line(":bogus", &mut out).await.unwrap();
        assert_eq!(r.handle_line(":quit", &mut out).await.unwrap(), Flow::Quit);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Started chat_2."));
        assert!(text.contains("* chat_2"));
        assert!(text.contains("error: no chat with id 'chat_9'"));
        assert!(text.contains("llama-3.3-70b-versatile"));
        assert!(text.contains("unknown command ':bogus'"));
        assert_eq!(r.store().active_id(), "chat_2");
    }

    #[tokio::test]
    async fn test_run_until_eof() {
        let tmp = TempDir::new().unwrap();
        let mut r = repl(&tmp);
        let input: &[u8] = b"first\n\nsecond\n";
        let mut out = Vec::new();
        r.run(input, &mut out).await.unwrap();
        assert_eq!(r.store().active().unwrap().messages.len(), 5);
    }
}
