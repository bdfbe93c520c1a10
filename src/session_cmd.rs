//! `docqa ask` and the interactive `docqa session` loop.
//!
//! Both keep a single [`Session`] in memory for the life of the process.
//! Pipeline errors are printed and the loop keeps going; only I/O errors on
//! the terminal end it.

use anyhow::{bail, Result};
use docqa_core::history::QaEntry;
use docqa_core::prompt::AnswerStyle;
use docqa_core::provenance::format_sources;
use docqa_core::session::Session;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::ingest::read_uploads;
use crate::progress::{BuildProgressReporter, ProgressMode};
use crate::qa::{BuildReport, LoadOutcome, Pipeline};

const HELP: &str = "\
Commands:
  :load <paths...>          index PDF/TXT files or folders
  :style concise|detailed   set the answer length
  :history                  list answered questions, newest first
  :rerun <n>                ask question #n again
  :clear                    clear the history
  :status                   show the indexed files
  :quit                     leave the session
Anything else is asked as a question.";

/// One-shot: index `files`, answer `question`, print the answer and sources.
pub async fn run_ask(
    config: &Config,
    files: &[PathBuf],
    recursive: bool,
    question: &str,
    style: Option<AnswerStyle>,
    progress: ProgressMode,
    json: bool,
) -> Result<()> {
    let uploads = read_uploads(files, recursive)?;
    if uploads.is_empty() {
        bail!("No PDF or TXT files found in the given paths");
    }

    let pipeline = Pipeline::from_config(config)?;
    let mut session = Session::new();
    let reporter = progress.reporter();
    if let LoadOutcome::Rebuilt(report) = pipeline
        .load(&mut session, uploads, reporter.as_ref())
        .await?
    {
        print_skipped(&mut std::io::stderr(), &report)?;
    }

    let entry = pipeline.ask(&mut session, question, style).await?;
    let mut stdout = std::io::stdout();
    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&entry)?)?;
    } else {
        print_entry(&mut stdout, &entry)?;
    }
    Ok(())
}

/// Interactive loop over stdin.
pub async fn run_session(
    config: &Config,
    files: &[PathBuf],
    recursive: bool,
    progress: ProgressMode,
) -> Result<()> {
    let pipeline = Pipeline::from_config(config)?;
    let mut repl = SessionRepl::new(pipeline, progress.reporter());
    let mut stdout = std::io::stdout();

    writeln!(stdout, "docqa session. Type :help for commands.")?;
    if !files.is_empty() {
        repl.load(files, recursive, &mut stdout).await?;
    }
    repl.run(BufReader::new(tokio::io::stdin()), &mut stdout).await
}

/// Whether the loop should keep reading.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct SessionRepl {
    pipeline: Pipeline,
    session: Session,
    progress: Box<dyn BuildProgressReporter>,
}

impl SessionRepl {
    pub fn new(pipeline: Pipeline, progress: Box<dyn BuildProgressReporter>) -> Self {
        Self {
            pipeline,
            session: Session::new(),
            progress,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Read lines from `input` until EOF or `:quit`.
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        loop {
            write!(out, "> ")?;
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
            ":status" => self.print_status(out)?,
            ":clear" => {
                self.session.clear_history();
                writeln!(out, "History cleared.")?;
            }
            ":history" => self.print_history(out)?,
            ":style" => match rest.parse::<AnswerStyle>() {
                Ok(style) => {
                    self.session.answer_style = style;
                    writeln!(out, "Answer style: {}", style)?;
                }
                Err(e) => writeln!(out, "error: {}", e)?,
            },
            ":load" => {
                let paths: Vec<PathBuf> = rest.split_whitespace().map(PathBuf::from).collect();
                if paths.is_empty() {
                    writeln!(out, "usage: :load <paths...>")?;
                } else {
                    self.load(&paths, false, out).await?;
                }
            }
            ":rerun" => {
                let question = rest
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| self.session.history().get(n))
                    .map(|e| e.question.clone());
                match question {
                    Some(q) => self.ask(&q, out).await?,
                    None => writeln!(out, "error: no history entry '{}'", rest)?,
                }
            }
            c if c.starts_with(':') => {
                writeln!(out, "unknown command '{}'. Type :help for commands.", c)?
            }
            _ => self.ask(line, out).await?,
        }
        Ok(Flow::Continue)
    }

    /// Index `paths`, keeping the current index when the build fails.
    pub async fn load<W: Write>(&mut self, paths: &[PathBuf], recursive: bool, out: &mut W) -> Result<()> {
        let uploads = match read_uploads(paths, recursive) {
            Ok(u) if u.is_empty() => {
                writeln!(out, "error: no PDF or TXT files found")?;
                return Ok(());
            }
            Ok(u) => u,
            Err(e) => {
                writeln!(out, "error: {:#}", e)?;
                return Ok(());
            }
        };
        match self
            .pipeline
            .load(&mut self.session, uploads, self.progress.as_ref())
            .await
        {
            Ok(LoadOutcome::Unchanged) => {
                writeln!(out, "Documents unchanged; keeping the current index.")?
            }
            Ok(LoadOutcome::Rebuilt(report)) => {
                writeln!(
                    out,
                    "Indexed {} file(s): {} page(s), {} chunk(s).",
                    report.files.len() - report.skipped.len(),
                    report.pages,
                    report.chunks
                )?;
                print_skipped(out, &report)?;
            }
            Err(e) => writeln!(out, "error: {}", e)?,
        }
        Ok(())
    }

    async fn ask<W: Write>(&mut self, question: &str, out: &mut W) -> Result<()> {
        match self.pipeline.ask(&mut self.session, question, None).await {
            Ok(entry) => print_entry(out, &entry)?,
            Err(e) => writeln!(out, "error: {}", e)?,
        }
        Ok(())
    }

    fn print_status<W: Write>(&self, out: &mut W) -> Result<()> {
        if !self.session.is_ready() {
            writeln!(out, "No index yet. Use :load <paths...> to add documents.")?;
        } else {
            writeln!(
                out,
                "Index ready: {} chunk(s) from {} file(s).",
                self.session.chunk_count(),
                self.session.files().len()
            )?;
            for f in self.session.files() {
                writeln!(out, "  - {}", f)?;
            }
        }
        writeln!(
            out,
            "Answer style: {}. History: {} entr{}.",
            self.session.answer_style,
            self.session.history().len(),
            if self.session.history().len() == 1 { "y" } else { "ies" }
        )?;
        Ok(())
    }

    fn print_history<W: Write>(&self, out: &mut W) -> Result<()> {
        if self.session.history().is_empty() {
            writeln!(out, "No questions yet.")?;
            return Ok(());
        }
        for (n, entry) in self.session.history().newest_first() {
            writeln!(
                out,
                "#{} [{}] {} ({})",
                n,
                entry.style,
                entry.label(),
                format_relative(entry.asked_at.timestamp())
            )?;
            for line in format_sources(&entry.sources) {
                writeln!(out, "     {}", line)?;
            }
        }
        Ok(())
    }
}

fn print_entry<W: Write>(out: &mut W, entry: &QaEntry) -> Result<()> {
    writeln!(out, "{}", entry.answer.trim_end())?;
    if !entry.sources.is_empty() {
        writeln!(out)?;
        writeln!(out, "Sources:")?;
        for line in format_sources(&entry.sources) {
            writeln!(out, "  - {}", line)?;
        }
    }
    Ok(())
}

fn print_skipped<W: Write>(out: &mut W, report: &BuildReport) -> Result<()> {
    for s in &report.skipped {
        writeln!(out, "skipped {}: {}", s.filename, s.reason)?;
    }
    Ok(())
}

/// Format a Unix timestamp as a relative time string (e.g. "3 mins ago").
fn format_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| ts.to_string())
    }
}
