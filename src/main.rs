use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use drydock_core::events::RunEvent;
use drydock_core::project::ChangeKind;
use drydock_core::provider::CompletionProvider;
use drydock_engine::runner::{AgentRunner, RunRequest, RunnerConfig, UploadedFile};
use drydock_engine::session::Session;
use drydock_engine::workflow::FeatureWorkflow;
use drydock_env::LocalEnvFactory;
use drydock_llm::anthropic::{AnthropicConfig, AnthropicProvider};
use drydock_llm::retry::RetryProvider;
use drydock_telemetry::{init_logging, LogConfig};

/// Run an AI coding agent inside an ephemeral, isolated environment.
#[derive(Parser)]
#[command(name = "drydock", version, about)]
struct Cli {
    /// The task to hand to the agent.
    query: String,

    /// Maximum number of model turns.
    #[arg(long, default_value_t = 10)]
    max_turns: u32,

    /// Model id passed to the completion provider.
    #[arg(long, default_value = "claude-sonnet-4-5")]
    model: String,

    /// Local project directory to attach to the run.
    #[arg(long)]
    project: Option<PathBuf>,

    /// Files to place in the workspace before the first turn.
    #[arg(long)]
    upload: Vec<PathBuf>,

    /// Apply all detected changes back to the project after the run.
    #[arg(long)]
    apply: bool,

    /// Skip the backup normally taken before applying changes.
    #[arg(long)]
    no_backup: bool,

    /// Run the architect/coder/tester/reviewer sequence instead of a
    /// single agent.
    #[arg(long)]
    workflow: bool,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig {
        json: cli.json_logs,
        ..Default::default()
    });
    tracing::info!(model = %cli.model, max_turns = cli.max_turns, "drydock starting");

    let provider = AnthropicProvider::new(
        AnthropicConfig::from_env().context("completion provider configuration")?,
    );
    let provider: Arc<dyn CompletionProvider> = Arc::new(RetryProvider::with_defaults(provider));

    let config = RunnerConfig {
        model: cli.model.clone(),
        max_turns: cli.max_turns,
        ..Default::default()
    };
    let runner = AgentRunner::new(provider, Arc::new(LocalEnvFactory::new()), config);
    let session = Arc::new(Session::new());

    let mut events = if cli.workflow {
        FeatureWorkflow::new(runner).run(Arc::clone(&session), cli.query.clone())
    } else {
        let mut request = RunRequest::new(&cli.query);
        request.max_turns = Some(cli.max_turns);
        request.project = cli.project.clone();
        request.uploaded_files = read_uploads(&cli.upload)?;
        runner.run(Arc::clone(&session), request)
    };

    while let Some(event) = events.next().await {
        render(&event);
        if event.is_terminal() {
            break;
        }
    }

    report_changes(&session, cli.apply, !cli.no_backup).await;
    Ok(())
}

fn read_uploads(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    paths
        .iter()
        .map(|path| {
            let contents = std::fs::read(path)
                .with_context(|| format!("reading upload {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".into());
            Ok(UploadedFile { name, contents })
        })
        .collect()
}

fn render(event: &RunEvent) {
    match event {
        RunEvent::Status { message } => println!("· {message}"),
        RunEvent::Text { content } => println!("{content}"),
        RunEvent::ToolUse { tool, input, .. } => println!("→ {tool} {input}"),
        RunEvent::ToolResult { payload, is_error, .. } => {
            let marker = if *is_error { "✗" } else { "←" };
            println!("{marker} {}", first_line(payload, 200));
        }
        RunEvent::File { path, size } => println!("· uploaded {path} ({size} bytes)"),
        RunEvent::Error { message } => eprintln!("error: {message}"),
        RunEvent::Done { message } => println!("✓ {message}"),
    }
}

fn first_line(s: &str, max: usize) -> String {
    let line = s.lines().next().unwrap_or("");
    if line.len() > max {
        let mut end = max;
        while end > 0 && !line.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &line[..end])
    } else {
        line.to_string()
    }
}

async fn report_changes(session: &Session, apply: bool, with_backup: bool) {
    let changes = session.changes();
    if changes.is_empty() {
        return;
    }

    println!("\nDetected changes:");
    for change in &changes {
        let marker = match change.kind {
            ChangeKind::Created => "+",
            ChangeKind::Modified => "~",
            ChangeKind::Deleted => "-",
        };
        println!("  {marker} {}", change.path);
    }

    if !apply {
        println!("(re-run with --apply to write these back)");
        return;
    }

    match session.apply_changes(None, with_backup).await {
        Some(report) => {
            if let Some(backup) = &report.backup_path {
                println!("backup: {}", backup.display());
            }
            println!("applied {} change(s)", report.applied.len());
            for failure in &report.failed {
                eprintln!("failed {}: {}", failure.path, failure.error);
            }
        }
        None => eprintln!("no project attached; nothing to apply"),
    }
}
