//! Line-oriented front end for the session engine
//!
//! Stands in for the extension's panel and input widget: slash commands
//! map one-to-one onto engine operations and carry no semantics of
//! their own.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use penny_session::{PageSource, SessionEngine, SessionEvent, SessionStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

/// Read commands from stdin until `/quit`
pub async fn run(engine: &mut SessionEngine) -> anyhow::Result<()> {
    println!("{}", engine.messages()[0].text());
    println!("Commands: /clear, /summarize <file>, /image <prompt>, /attach <file> <text>, /quit");

    let printer = spawn_printer(engine.subscribe());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        if let Err(e) = dispatch(engine, line).await {
            eprintln!("error: {}", e);
        }
    }

    printer.abort();
    Ok(())
}

/// Submit a single prompt and exit once the turn completes
pub async fn one_shot(engine: &mut SessionEngine, prompt: String) -> anyhow::Result<()> {
    let printer = spawn_printer(engine.subscribe());
    let result = engine.submit(prompt, None).await;
    printer.abort();
    result?;
    Ok(())
}

async fn dispatch(engine: &mut SessionEngine, line: &str) -> anyhow::Result<()> {
    if line == "/clear" {
        engine.clear().await?;
        println!("(history cleared)");
        return Ok(());
    }

    if let Some(rest) = line.strip_prefix("/summarize ") {
        let page = FilePage {
            path: PathBuf::from(rest.trim()),
        };
        engine.summarize_page(&page).await?;
        return Ok(());
    }

    if let Some(prompt) = line.strip_prefix("/image ") {
        engine
            .generate_image(
                prompt.trim().to_string(),
                penny_ai::ImageModel::default(),
                penny_ai::ImageSize::default(),
            )
            .await?;
        return Ok(());
    }

    if let Some(rest) = line.strip_prefix("/attach ") {
        let (path, text) = rest
            .trim()
            .split_once(' ')
            .ok_or_else(|| anyhow::anyhow!("usage: /attach <file> <text>"))?;
        let image = data_url(Path::new(path)).await?;
        engine.submit(text.to_string(), Some(image)).await?;
        return Ok(());
    }

    engine.submit(line.to_string(), None).await?;
    Ok(())
}

/// Printed byte offsets per history index, so each update emits only
/// its unseen suffix.
struct PrintedOffsets {
    seen: HashMap<usize, usize>,
}

impl PrintedOffsets {
    fn new() -> Self {
        Self {
            seen: HashMap::new(),
        }
    }

    /// Forget all offsets. Called when history changes structurally,
    /// since indices are reused after a clear.
    fn reset(&mut self) {
        self.seen.clear();
    }

    /// The not-yet-printed suffix of `text` for the message at `index`.
    /// A stale offset that no longer lands on a char boundary of the
    /// new text falls back to the full text.
    fn advance<'a>(&mut self, index: usize, text: &'a str) -> &'a str {
        let seen = self.seen.entry(index).or_insert(0);
        let suffix = text.get(*seen..).unwrap_or(text);
        *seen = text.len();
        suffix
    }
}

/// Print streamed fragments as they land in history
fn spawn_printer(mut rx: broadcast::Receiver<SessionEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut printed = PrintedOffsets::new();
        loop {
            match rx.recv().await {
                Ok(SessionEvent::MessageUpdate { index, message }) => {
                    let text = message.text();
                    let suffix = printed.advance(index, &text);
                    if !suffix.is_empty() {
                        print!("{}", suffix);
                        std::io::stdout().flush().ok();
                    }
                }
                Ok(SessionEvent::HistoryChanged) => {
                    printed.reset();
                }
                Ok(SessionEvent::Status {
                    status: SessionStatus::Idle,
                }) => {
                    println!();
                }
                Ok(SessionEvent::Notice { message }) => {
                    eprintln!("{}", message);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Page-content boundary backed by a local file
struct FilePage {
    path: PathBuf,
}

#[async_trait]
impl PageSource for FilePage {
    async fn plain_text(&self) -> Option<String> {
        tokio::fs::read_to_string(&self.path).await.ok()
    }
}

/// Encode a local image file as an inline data URL
async fn data_url(path: &Path) -> anyhow::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let mime = match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    Ok(format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}
