//! CLI for saree-tryon - virtual saree try-on.

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand, ValueEnum};
use saree_tryon::gate::env_api_key;
use saree_tryon::{
    AspectRatio, ConnectionGate, ConnectionStatus, CredentialHost, GeminiModel, GeminiTryOnClient,
    GenerateOutcome, ImageSize, ImageSlot, KeyStore, TryOnError,
    WorkflowController, DOWNLOAD_FILE_NAME,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "saree-tryon")]
#[command(about = "Render a person wearing a saree via Gemini image generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a try-on image from two photos
    Generate(GenerateArgs),

    /// Show connection status and check the key
    Status(ModelArgs),

    /// Interactive session (select, generate, download, reset)
    Shell(ModelArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Photo of the person
    #[arg(long)]
    person: PathBuf,

    /// Photo of the saree
    #[arg(long)]
    garment: PathBuf,

    /// Output file path (or directory)
    #[arg(short, long, default_value = DOWNLOAD_FILE_NAME)]
    output: PathBuf,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Clone)]
struct ModelArgs {
    /// Model to use
    #[arg(short, long, value_enum, default_value = "pro")]
    model: ModelArg,

    /// Output aspect ratio
    #[arg(long, value_enum, default_value = "3:4")]
    aspect_ratio: AspectRatioArg,

    /// Output resolution
    #[arg(long, value_enum, default_value = "2K")]
    image_size: ImageSizeArg,

    /// Retries on rate limits and network errors
    #[arg(long, default_value_t = 0)]
    retries: u32,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    Flash,
    Pro,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Flash => GeminiModel::NanoBanana,
            ModelArg::Pro => GeminiModel::NanoBananaPro,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectRatioArg {
    #[value(name = "1:1")]
    Square,
    #[value(name = "2:3")]
    Portrait2x3,
    #[value(name = "3:2")]
    Landscape3x2,
    #[value(name = "3:4")]
    Portrait3x4,
    #[value(name = "4:3")]
    Landscape4x3,
    #[value(name = "4:5")]
    Portrait4x5,
    #[value(name = "5:4")]
    Landscape5x4,
    #[value(name = "9:16")]
    Tall,
    #[value(name = "16:9")]
    Wide,
    #[value(name = "21:9")]
    Ultrawide,
}

impl From<AspectRatioArg> for AspectRatio {
    fn from(arg: AspectRatioArg) -> Self {
        match arg {
            AspectRatioArg::Square => AspectRatio::Square,
            AspectRatioArg::Portrait2x3 => AspectRatio::Portrait2x3,
            AspectRatioArg::Landscape3x2 => AspectRatio::Landscape3x2,
            AspectRatioArg::Portrait3x4 => AspectRatio::Portrait3x4,
            AspectRatioArg::Landscape4x3 => AspectRatio::Landscape4x3,
            AspectRatioArg::Portrait4x5 => AspectRatio::Portrait4x5,
            AspectRatioArg::Landscape5x4 => AspectRatio::Landscape5x4,
            AspectRatioArg::Tall => AspectRatio::Tall,
            AspectRatioArg::Wide => AspectRatio::Wide,
            AspectRatioArg::Ultrawide => AspectRatio::Ultrawide,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ImageSizeArg {
    #[value(name = "1K")]
    OneK,
    #[value(name = "2K")]
    TwoK,
    #[value(name = "4K")]
    FourK,
}

impl From<ImageSizeArg> for ImageSize {
    fn from(arg: ImageSizeArg) -> Self {
        match arg {
            ImageSizeArg::OneK => ImageSize::OneK,
            ImageSizeArg::TwoK => ImageSize::TwoK,
            ImageSizeArg::FourK => ImageSize::FourK,
        }
    }
}

/// Line reader over stdin, shared by the shell and the key prompt.
#[derive(Clone)]
struct Terminal {
    lines: Arc<Mutex<Lines<BufReader<Stdin>>>>,
}

impl Terminal {
    fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines())),
        }
    }

    /// Prints `prompt` to stderr and reads one line. `None` on EOF.
    async fn read_line(&self, prompt: &str) -> std::io::Result<Option<String>> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(prompt.as_bytes()).await?;
        stderr.flush().await?;
        self.lines.lock().await.next_line().await
    }
}

/// Prompts on the terminal for a key and keeps it in memory.
struct TerminalKeyHost {
    store: KeyStore,
    terminal: Terminal,
}

#[async_trait]
impl CredentialHost for TerminalKeyHost {
    async fn has_selected_api_key(&self) -> saree_tryon::Result<bool> {
        Ok(self.store.is_set())
    }

    async fn open_select_key(&self) -> saree_tryon::Result<()> {
        let line = self
            .terminal
            .read_line("Paste a Gemini API key: ")
            .await?
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .ok_or_else(|| TryOnError::Connection("No key entered.".into()))?;
        self.store.set(line);
        Ok(())
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("SAREE_TRYON_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds a controller wired to the terminal host when stdin is interactive.
fn build_session(args: &ModelArgs, terminal: &Terminal) -> anyhow::Result<WorkflowController> {
    let store = KeyStore::new();
    let host: Option<Arc<dyn CredentialHost>> = if std::io::stdin().is_terminal() {
        Some(Arc::new(TerminalKeyHost {
            store: store.clone(),
            terminal: terminal.clone(),
        }))
    } else {
        None
    };

    let client = GeminiTryOnClient::builder()
        .key_store(store)
        .model(args.model.into())
        .aspect_ratio(args.aspect_ratio.into())
        .image_size(args.image_size.into())
        .build()?;

    Ok(
        WorkflowController::new(ConnectionGate::new(env_api_key(), host), Arc::new(client))
            .with_retries(args.retries),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => generate(args, cli.json).await?,
        Commands::Status(args) => status(args, cli.json).await?,
        Commands::Shell(args) => shell(args).await?,
    }

    Ok(())
}

async fn generate(args: GenerateArgs, json_output: bool) -> anyhow::Result<()> {
    let mut session = build_session(&args.model, &Terminal::new())?;
    session.initialize().await;

    session.select_image(ImageSlot::Human, &args.person).await?;
    session.select_image(ImageSlot::Garment, &args.garment).await?;

    let mut outcome = session.generate().await;
    if session.should_regenerate(&outcome) {
        outcome = session.generate().await;
    }

    let uri = match outcome {
        GenerateOutcome::Completed(uri) => uri,
        GenerateOutcome::Failed(message) => anyhow::bail!(message),
        GenerateOutcome::ConnectRequired => anyhow::bail!(session
            .state()
            .last_error
            .clone()
            .unwrap_or_else(|| "Not connected.".into())),
        GenerateOutcome::Skipped | GenerateOutcome::Stale => {
            anyhow::bail!("Generation did not run")
        }
    };

    let saved = session.save_result(&args.output).await?;

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "output": saved.display().to_string(),
            "model": session.generator().name(),
            "mime_type": uri.split_once(';').map(|(head, _)| head.trim_start_matches("data:")),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Generated try-on image: {}", saved.display());
    }

    Ok(())
}

async fn status(args: ModelArgs, json_output: bool) -> anyhow::Result<()> {
    let mut session = build_session(&args, &Terminal::new())?;
    let status = session.initialize().await;

    let key_check = if status == ConnectionStatus::Connected {
        Some(session.generator().health_check().await)
    } else {
        None
    };

    if json_output {
        let result = serde_json::json!({
            "status": status,
            "env_credential": session.gate().has_env_credential(),
            "interactive": session.gate().has_host(),
            "model": session.generator().name(),
            "key_valid": key_check.as_ref().map(|r| r.is_ok()),
            "error": key_check.as_ref().and_then(|r| r.as_ref().err()).map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Status: {status}");
        println!("Model: {}", session.generator().name());
        println!(
            "Environment key: {}",
            if session.gate().has_env_credential() { "set" } else { "not set" }
        );
        match key_check {
            Some(Ok(())) => println!("Key check: ok"),
            Some(Err(e)) => println!("Key check: failed ({e})"),
            None => println!("Key check: skipped"),
        }
    }

    Ok(())
}

const SHELL_HELP: &str = "\
Commands:
  person <path>      select the photo of the person
  garment <path>     select the photo of the saree
  clear person|garment
  generate           render the try-on image
  download [path]    save the result (default saree-try-on.png)
  connect            choose an API key
  status             show session state
  reset              start over
  quit";

async fn shell(args: ModelArgs) -> anyhow::Result<()> {
    let terminal = Terminal::new();
    let mut session = build_session(&args, &terminal)?;
    let status = session.initialize().await;
    println!("saree-tryon ({status}). Type 'help' for commands.");

    while let Some(line) = terminal.read_line("> ").await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "" => {}
            "help" => println!("{SHELL_HELP}"),
            "quit" | "exit" => break,
            "person" | "garment" => {
                let slot = parse_slot(command).unwrap_or(ImageSlot::Human);
                if rest.is_empty() {
                    println!("usage: {command} <path>");
                    continue;
                }
                match session.select_image(slot, rest).await {
                    Ok(()) => println!("{slot} image selected"),
                    Err(e) => println!("error: {e}"),
                }
            }
            "clear" => match parse_slot(rest) {
                Some(slot) => {
                    session.clear_image(slot);
                    println!("{slot} image cleared");
                }
                None => println!("usage: clear person|garment"),
            },
            "generate" => match session.generate().await {
                GenerateOutcome::Completed(_) => println!("done; use 'download' to save"),
                GenerateOutcome::Failed(message) => println!("error: {message}"),
                GenerateOutcome::ConnectRequired => match &session.state().last_error {
                    Some(message) => println!("error: {message}"),
                    None => println!("connected; run 'generate' again"),
                },
                GenerateOutcome::Skipped => println!("select both images first"),
                GenerateOutcome::Stale => {}
            },
            "download" => {
                let target = if rest.is_empty() { DOWNLOAD_FILE_NAME } else { rest };
                match session.save_result(target).await {
                    Ok(path) => println!("saved {}", path.display()),
                    Err(e) => println!("error: {e}"),
                }
            }
            "connect" => match session.connect().await {
                Ok(()) => println!("connected"),
                Err(e) => println!("error: {e}"),
            },
            "status" => print_state(&session),
            "reset" => {
                session.reset();
                println!("session reset");
            }
            other => println!("unknown command '{other}'; type 'help'"),
        }
    }

    Ok(())
}

fn parse_slot(word: &str) -> Option<ImageSlot> {
    match word {
        "person" | "human" => Some(ImageSlot::Human),
        "garment" | "saree" => Some(ImageSlot::Garment),
        _ => None,
    }
}

fn print_state(session: &WorkflowController) {
    let state = session.state();
    let describe = |slot: ImageSlot| {
        state
            .image(slot)
            .map(|img| {
                let name = img
                    .source()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(in memory)".into());
                format!("{name} [{}]", img.mime_type())
            })
            .unwrap_or_else(|| "none".into())
    };

    println!("connection: {}", session.status());
    println!("person:     {}", describe(ImageSlot::Human));
    println!("garment:    {}", describe(ImageSlot::Garment));
    println!(
        "result:     {}",
        if state.result_image.is_some() { "ready" } else { "none" }
    );
    if let Some(error) = &state.last_error {
        println!("last error: {error}");
    }
}
