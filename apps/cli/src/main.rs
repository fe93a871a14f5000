use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use exam_assist_client::SNAPSHOT_FILE;
use exam_assist_core::{bootstrap, rank, AssistantRuntime, AssistantSettings, RankOptions};
use indicatif::ProgressBar;
use output::{OutputFormat, Renderer};
use progress::spinner;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_CONFIG_STEM: &str = "exam-assist";
const ENV_PREFIX: &str = "EXAM_ASSIST";

#[derive(Debug, Parser, Clone)]
#[command(
    name = "exam-assist",
    version,
    about = "Ask the exam question bank in Arabic from the shell."
)]
struct Cli {
    /// Preferred renderer for command output.
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    /// TOML settings file (defaults to ./exam-assist.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Question store base URL.
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Override the corpus snapshot directory.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    /// Disable ANSI colors in log output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Suppress non-critical CLI output.
    #[arg(long, global = true)]
    quiet: bool,
    /// Disable progress indicators for network calls.
    #[arg(long, global = true)]
    no_progress: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, Clone)]
enum Command {
    /// Start an interactive conversation.
    Chat,
    /// Speak newline-delimited JSON commands and events over STDIO.
    Serve,
    /// Show which stored questions a query would be matched against.
    Rank {
        query: String,
        /// Minimum similarity to keep a question.
        #[arg(long)]
        threshold: Option<f64>,
        /// Maximum number of questions to show.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Inspect or fill the offline corpus snapshot.
    Corpus {
        #[command(subcommand)]
        command: CorpusCommand,
    },
    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand, Clone)]
enum CorpusCommand {
    /// Report snapshot location, age and size.
    Status,
    /// Download the corpus and write the snapshot.
    Warmup {
        /// Fail instead of falling back to an existing snapshot.
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(Clone, Debug, Serialize)]
struct SnapshotReport {
    path: String,
    exists: bool,
    question_count: usize,
    stored_at: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
struct WarmupSummary {
    refreshed: bool,
    question_count: usize,
    snapshot_path: Option<String>,
}

impl Cli {
    fn progress_enabled(&self) -> bool {
        !self.quiet && !self.no_progress
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    if let Command::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "exam-assist", &mut std::io::stdout());
        return Ok(());
    }

    let settings = load_settings(&cli)?;
    let runtime = bootstrap(settings)?;
    let renderer = Renderer::new(cli.format);

    match &cli.command {
        Command::Chat => chat::run(&runtime, &renderer).await,
        Command::Serve => runtime.serve_stdio().await,
        Command::Rank {
            query,
            threshold,
            limit,
        } => handle_rank(&runtime, &cli, &renderer, query, *threshold, *limit).await,
        Command::Corpus { command } => {
            handle_corpus_command(command.clone(), &runtime, &cli, &renderer).await
        }
        Command::Completions { .. } => Ok(()),
    }
}

/// Defaults, then the TOML file, then `EXAM_ASSIST_*` variables, then flags.
fn load_settings(cli: &Cli) -> Result<AssistantSettings> {
    let builder = config::Config::builder();
    let builder = match &cli.config {
        Some(path) => builder.add_source(config::File::from(path.as_path()).required(true)),
        None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_STEM).required(false)),
    };
    let mut settings: AssistantSettings = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .context("failed to load settings")?
        .try_deserialize()
        .context("invalid settings")?;

    if let Some(base_url) = &cli.base_url {
        settings.base_url.clone_from(base_url);
    }
    if let Some(cache_dir) = &cli.cache_dir {
        settings.cache_dir = Some(cache_dir.clone());
    }
    Ok(settings)
}

async fn handle_rank(
    runtime: &AssistantRuntime,
    cli: &Cli,
    renderer: &Renderer,
    query: &str,
    threshold: Option<f64>,
    limit: Option<usize>,
) -> Result<()> {
    let defaults = runtime.settings().rank_options();
    let options = RankOptions {
        threshold: threshold.unwrap_or(defaults.threshold),
        limit: limit.unwrap_or(defaults.limit),
    };

    let progress = spinner(cli.progress_enabled(), "Loading question corpus...");
    let corpus = match runtime.client().questions().await {
        Ok(corpus) => {
            finish_spinner(progress, None);
            corpus
        }
        Err(error) => {
            finish_spinner(progress, None);
            return Err(anyhow!(error).context("failed to load question corpus"));
        }
    };

    let suggestions = rank(query, &corpus, options);
    info!(
        target: "exam_assist_cli",
        corpus = corpus.len(),
        matches = suggestions.len(),
        "ranked query"
    );
    if cli.quiet {
        return Ok(());
    }
    renderer.suggestions(&suggestions)
}

async fn handle_corpus_command(
    command: CorpusCommand,
    runtime: &AssistantRuntime,
    cli: &Cli,
    renderer: &Renderer,
) -> Result<()> {
    let client = runtime.client();
    match command {
        CorpusCommand::Status => {
            let Some(cache) = client.snapshot_cache() else {
                if !cli.quiet {
                    renderer.snapshot_disabled()?;
                }
                return Ok(());
            };
            let path = cache.path_for(SNAPSHOT_FILE);
            let snapshot = client.load_snapshot().await?;
            if cli.quiet {
                return Ok(());
            }
            let report = SnapshotReport {
                path: path.display().to_string(),
                exists: snapshot.is_some(),
                question_count: snapshot.as_ref().map_or(0, |entry| entry.value.len()),
                stored_at: snapshot.map(|entry| entry.stored_at.to_string()),
            };
            renderer.snapshot_status(&report)?;
        }
        CorpusCommand::Warmup { refresh } => {
            let label = if refresh {
                "Refreshing question corpus..."
            } else {
                "Loading question corpus..."
            };
            let progress = spinner(cli.progress_enabled(), label);
            let result = if refresh {
                client.refresh_questions().await
            } else {
                client.questions().await
            };
            let corpus = match result {
                Ok(corpus) => {
                    finish_spinner(progress, Some(format!("Cached {} questions", corpus.len())));
                    corpus
                }
                Err(error) => {
                    finish_spinner(progress, None);
                    return Err(anyhow!(error).context("failed to warm corpus snapshot"));
                }
            };

            if cli.quiet {
                return Ok(());
            }
            let summary = WarmupSummary {
                refreshed: refresh,
                question_count: corpus.len(),
                snapshot_path: client
                    .snapshot_cache()
                    .map(|cache| cache.path_for(SNAPSHOT_FILE).display().to_string()),
            };
            renderer.warmup(&summary)?;
        }
    }
    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .without_time()
        .with_ansi(!cli.no_color)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))
}

fn finish_spinner(spinner: Option<ProgressBar>, message: Option<String>) {
    if let Some(progress) = spinner {
        if let Some(msg) = message {
            progress.finish_with_message(msg);
        } else {
            progress.finish_and_clear();
        }
    }
}

mod chat {
    use anyhow::Result;
    use exam_assist_core::{
        state::{Phase, Sender},
        Command, ConversationController, SessionEvent,
    };
    use futures::StreamExt;
    use tokio_util::codec::{FramedRead, LinesCodec};
    use tracing::warn;

    use super::{AssistantRuntime, Renderer};

    const NAME_PROMPT: &str = "ما اسمك؟";
    const HELP: &str = "/1 /2 /3 لاختيار سؤال مقترح · /close · /open · /stats · /quit";

    #[derive(Debug, PartialEq)]
    pub enum ChatInput {
        Command(Command),
        Stats,
        Quit,
        Unknown(String),
        Blank,
    }

    /// Maps a typed line to an action given the current conversation.
    pub fn parse_line(line: &str, controller: &ConversationController) -> ChatInput {
        let line = line.trim();
        if line.is_empty() {
            return ChatInput::Blank;
        }

        if let Some(rest) = line.strip_prefix('/') {
            return match rest {
                "quit" | "exit" => ChatInput::Quit,
                "stats" => ChatInput::Stats,
                "close" => ChatInput::Command(Command::Close),
                "open" => ChatInput::Command(Command::Open),
                other => match other.parse::<usize>() {
                    Ok(index) if index >= 1 => controller
                        .suggestions()
                        .get(index - 1)
                        .map_or_else(
                            || ChatInput::Unknown(line.to_string()),
                            |suggestion| {
                                ChatInput::Command(Command::SelectSuggestion {
                                    text: suggestion.text.clone(),
                                })
                            },
                        ),
                    _ => ChatInput::Unknown(line.to_string()),
                },
            };
        }

        if controller.phase() == Phase::AwaitingName {
            ChatInput::Command(Command::SubmitName {
                name: line.to_string(),
            })
        } else {
            ChatInput::Command(Command::Send {
                text: Some(line.to_string()),
            })
        }
    }

    pub async fn run(runtime: &AssistantRuntime, renderer: &Renderer) -> Result<()> {
        let mut driver = runtime.session();
        let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
        let mut input_open = true;

        println!("{HELP}");
        show(&driver.dispatch(Command::Open));

        loop {
            tokio::select! {
                line = lines.next(), if input_open => match line {
                    Some(Ok(line)) => match parse_line(&line, driver.controller()) {
                        ChatInput::Command(command) => show(&driver.dispatch(command)),
                        ChatInput::Stats => renderer.turns(driver.turns())?,
                        ChatInput::Quit => break,
                        ChatInput::Unknown(text) => println!("? {text}\n{HELP}"),
                        ChatInput::Blank => {}
                    },
                    Some(Err(error)) => {
                        warn!(target: "exam_assist_cli", error = %error, "failed to read input");
                    }
                    None => input_open = false,
                },
                event = driver.next_completion(), if driver.has_pending() => {
                    if let Some(event) = event {
                        show(&event);
                    }
                }
                else => break,
            }
        }

        Ok(())
    }

    fn show(event: &SessionEvent) {
        for message in &event.messages {
            let speaker = match message.sender {
                Sender::User => "أنت",
                Sender::Assistant => "المساعد",
            };
            println!("{speaker}: {}", message.text);
        }

        if !event.messages.is_empty() && !event.suggestions.is_empty() {
            for (index, suggestion) in event.suggestions.iter().enumerate() {
                println!(
                    "  /{} {} ({:.0}%)",
                    index + 1,
                    suggestion.text,
                    suggestion.similarity * 100.0
                );
            }
        }

        if let Some(error) = &event.name_error {
            println!("{error}");
        } else if let Some(reason) = &event.rejected {
            println!("({reason})");
        }

        if event.phase == Phase::AwaitingName && event.name_error.is_none() && event.messages.is_empty() {
            println!("{NAME_PROMPT}");
        }
        if event.busy && !event.messages.is_empty() {
            println!("…");
        }
    }
}

mod output {
    use std::fmt::Write;

    use anyhow::Result;
    use clap::ValueEnum;
    use exam_assist_core::{state::SuggestedQuestion, TurnRecord};
    use serde_json::json;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
    pub enum OutputFormat {
        Json,
        Table,
        Text,
    }

    #[derive(Copy, Clone, Debug)]
    pub struct Renderer {
        format: OutputFormat,
    }

    impl Renderer {
        pub fn new(format: OutputFormat) -> Self {
            Self { format }
        }

        pub fn suggestions(&self, suggestions: &[SuggestedQuestion]) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(suggestions)?);
                }
                OutputFormat::Table => {
                    let rows: Vec<Vec<String>> = suggestions
                        .iter()
                        .enumerate()
                        .map(|(index, suggestion)| {
                            vec![
                                (index + 1).to_string(),
                                format!("{:.3}", suggestion.similarity),
                                truncate(&suggestion.text, 80),
                            ]
                        })
                        .collect();
                    render_table(&["#", "Similarity", "Question"], &rows);
                }
                OutputFormat::Text => {
                    if suggestions.is_empty() {
                        println!("No stored question is close enough.");
                    }
                    for suggestion in suggestions {
                        println!("• {:.3} {}", suggestion.similarity, suggestion.text);
                    }
                }
            }
            Ok(())
        }

        pub fn turns(&self, turns: &[TurnRecord]) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(turns)?);
                }
                OutputFormat::Table => {
                    let rows: Vec<Vec<String>> = turns
                        .iter()
                        .map(|turn| {
                            vec![
                                turn.timestamp.to_string(),
                                format!("{:?}", turn.outcome),
                                turn.latency_ms.to_string(),
                                truncate(&turn.query, 60),
                            ]
                        })
                        .collect();
                    render_table(&["Timestamp", "Outcome", "Latency (ms)", "Query"], &rows);
                }
                OutputFormat::Text => {
                    if turns.is_empty() {
                        println!("No searches yet.");
                    }
                    for turn in turns {
                        println!(
                            "[{}] {:?} {} ms: {}",
                            turn.timestamp, turn.outcome, turn.latency_ms, turn.query
                        );
                    }
                }
            }
            Ok(())
        }

        pub fn snapshot_status(&self, report: &crate::SnapshotReport) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(report)?);
                }
                OutputFormat::Table => {
                    let rows = vec![
                        vec!["Path".to_string(), report.path.clone()],
                        vec!["Exists".to_string(), report.exists.to_string()],
                        vec!["Questions".to_string(), report.question_count.to_string()],
                        vec![
                            "Stored At".to_string(),
                            report.stored_at.clone().unwrap_or_else(|| "n/a".to_string()),
                        ],
                    ];
                    render_table(&["Property", "Value"], &rows);
                }
                OutputFormat::Text => {
                    println!("Snapshot: {}", report.path);
                    println!("Exists: {}", report.exists);
                    println!("Questions: {}", report.question_count);
                    println!(
                        "Stored at: {}",
                        report.stored_at.as_deref().unwrap_or("n/a")
                    );
                }
            }
            Ok(())
        }

        pub fn snapshot_disabled(&self) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    let payload = json!({ "snapshot": "disabled" });
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                }
                OutputFormat::Table | OutputFormat::Text => {
                    println!("Corpus snapshot is disabled (no cache directory).");
                }
            }
            Ok(())
        }

        pub fn warmup(&self, summary: &crate::WarmupSummary) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(summary)?);
                }
                OutputFormat::Table => {
                    let rows = vec![
                        vec!["Refreshed".to_string(), summary.refreshed.to_string()],
                        vec!["Questions".to_string(), summary.question_count.to_string()],
                        vec![
                            "Snapshot".to_string(),
                            summary
                                .snapshot_path
                                .clone()
                                .unwrap_or_else(|| "disabled".to_string()),
                        ],
                    ];
                    render_table(&["Property", "Value"], &rows);
                }
                OutputFormat::Text => {
                    println!("Corpus warmup complete:");
                    println!("  Refreshed: {}", summary.refreshed);
                    println!("  Questions: {}", summary.question_count);
                    println!(
                        "  Snapshot: {}",
                        summary.snapshot_path.as_deref().unwrap_or("disabled")
                    );
                }
            }
            Ok(())
        }
    }

    fn render_table(headers: &[&str], rows: &[Vec<String>]) {
        let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
        for row in rows {
            for (idx, cell) in row.iter().enumerate() {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
        }

        fn render_line(columns: &[&str], widths: &[usize]) -> String {
            let mut line = String::new();
            for (idx, value) in columns.iter().enumerate() {
                let width = widths[idx];
                let _ = write!(line, "| {value:width$} ");
            }
            line.push('|');
            line
        }

        println!("{}", render_line(headers, &widths));
        let separator: String = widths
            .iter()
            .map(|width| format!("|{:-^1$}", "", width + 2))
            .collect();
        println!("{separator}|");

        for row in rows {
            let cols: Vec<&str> = row.iter().map(String::as_str).collect();
            println!("{}", render_line(&cols, &widths));
        }
    }

    pub(crate) fn truncate(value: &str, max: usize) -> String {
        if value.chars().count() <= max {
            value.to_string()
        } else {
            let mut truncated = value
                .chars()
                .take(max.saturating_sub(1))
                .collect::<String>();
            truncated.push('…');
            truncated
        }
    }
}

mod progress {
    use std::time::Duration;

    use indicatif::{ProgressBar, ProgressStyle};

    pub fn spinner(message_enabled: bool, message: impl Into<String>) -> Option<ProgressBar> {
        if !message_enabled {
            return None;
        }
        let progress = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        progress.set_style(style);
        progress.set_message(message.into());
        progress.enable_steady_tick(Duration::from_millis(80));
        Some(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::chat::{parse_line, ChatInput};
    use super::*;
    use exam_assist_client::types::QuestionItem;
    use exam_assist_core::{ControllerOptions, ConversationController};

    fn cli_with(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("valid arguments")
    }

    #[test]
    fn settings_file_and_flags_layer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "base_url = \"http://store.test\"\nsuggestion_limit = 5\nsimilarity_threshold = 0.55\n",
        )
        .expect("write settings");

        let config_arg = path.display().to_string();
        let cli = cli_with(&["exam-assist", "--config", &config_arg, "serve"]);
        let settings = load_settings(&cli).expect("settings load");
        assert_eq!(settings.base_url, "http://store.test");
        assert_eq!(settings.suggestion_limit, 5);
        assert!((settings.similarity_threshold - 0.55).abs() < f64::EPSILON);
        assert_eq!(settings.min_name_chars, 2);

        let cli = cli_with(&[
            "exam-assist",
            "--config",
            &config_arg,
            "--base-url",
            "http://override.test",
            "serve",
        ]);
        let settings = load_settings(&cli).expect("settings load");
        assert_eq!(settings.base_url, "http://override.test");
    }

    #[test]
    fn environment_overrides_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "request_timeout_secs = 3\n").expect("write settings");
        let config_arg = path.display().to_string();

        // No other test reads the timeout.
        std::env::set_var("EXAM_ASSIST_REQUEST_TIMEOUT_SECS", "25");
        let cli = cli_with(&["exam-assist", "--config", &config_arg, "serve"]);
        let loaded = load_settings(&cli);
        std::env::remove_var("EXAM_ASSIST_REQUEST_TIMEOUT_SECS");

        let settings = loaded.expect("settings load");
        assert_eq!(settings.request_timeout_secs, 25);
        assert_eq!(settings.request_timeout(), std::time::Duration::from_secs(25));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let cli = cli_with(&["exam-assist", "--config", "/definitely/missing.toml", "serve"]);
        assert!(load_settings(&cli).is_err());
    }

    #[test]
    fn chat_lines_follow_the_phase() {
        let mut controller = ConversationController::new(ControllerOptions::default());
        controller.install_corpus(vec![QuestionItem {
            id: 1,
            text: "ما عاصمة السعودية".to_string(),
            options: vec!["الرياض".to_string()],
            correct_option_index: 0,
        }]);
        controller.open();

        assert_eq!(
            parse_line("سارة", &controller),
            ChatInput::Command(exam_assist_core::Command::SubmitName {
                name: "سارة".to_string()
            })
        );

        controller.submit_name("سارة").expect("valid name");
        assert_eq!(
            parse_line(" سؤال ", &controller),
            ChatInput::Command(exam_assist_core::Command::Send {
                text: Some("سؤال".to_string())
            })
        );
        assert_eq!(parse_line("/quit", &controller), ChatInput::Quit);
        assert_eq!(parse_line("/stats", &controller), ChatInput::Stats);
        assert_eq!(parse_line("   ", &controller), ChatInput::Blank);
        assert!(matches!(parse_line("/1", &controller), ChatInput::Unknown(_)));

        controller.set_input("وين عاصمه السعوديه");
        let ticket = controller.send().expect("send");
        controller.finish_search(ticket.generation, Ok(vec![]));
        assert_eq!(
            parse_line("/1", &controller),
            ChatInput::Command(exam_assist_core::Command::SelectSuggestion {
                text: "ما عاصمة السعودية".to_string()
            })
        );
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(output::truncate("عاصمة", 10), "عاصمة");
        assert_eq!(output::truncate("عاصمة السعودية", 4), "عاص…");
    }
}
