mod config;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use cotg_diff::{DiffTracker, TurnLedger};
use cotg_tools::shell::parse::{classify, tokenize};
use cotg_tools::{
    AuditLogger, ChannelObserver, EventEmitter, ExecEvent, FileTools, LocalFacade, ShellExecutor,
    ShellTool, ToolCall, ToolOutput,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, resolve_config_path};

#[derive(Parser)]
#[command(name = "cotg", version, about = "Sandboxed tool execution for coding assistants")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a shell command through the sandbox and print its payload as JSON
    Exec {
        #[command(flatten)]
        run: RunArgs,

        /// Print begin/end events to stderr as JSON lines
        #[arg(long)]
        events: bool,
    },
    /// Print how a command line is classified
    Classify {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Dispatch one tool call (shell or file tool) and print the turn summary
    Tool {
        /// Tool id: shell, read, write, edit, delete, move, list, search
        tool_id: String,

        /// Tool parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Run a command and summarize what it changed in the watched files
    Diff {
        /// File to watch, relative to the working directory (repeatable)
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Working directory for the command
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Timeout in milliseconds, overriding the configured default
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl RunArgs {
    fn tool_call(&self) -> ToolCall {
        let mut params = HashMap::new();
        params.insert(
            "command".to_owned(),
            serde_json::Value::String(self.command.join(" ")),
        );
        if let Some(dir) = &self.workdir {
            params.insert(
                "workdir".to_owned(),
                serde_json::Value::String(dir.display().to_string()),
            );
        }
        if let Some(ms) = self.timeout_ms {
            params.insert("timeout_ms".to_owned(), serde_json::Value::from(ms));
        }
        ToolCall {
            tool_id: ShellTool::NAME.to_owned(),
            params,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    match cli.command {
        Command::Exec { run, events } => run_exec(&config, &run, events).await,
        Command::Classify { command } => {
            let command = command.join(" ");
            let parsed = classify(&command, &tokenize(&command));
            let report = serde_json::json!({
                "risk": parsed.risk(),
                "parsed_command": parsed,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Tool { tool_id, params } => run_tool(&config, tool_id, &params).await,
        Command::Diff { files, run } => run_diff(&config, &files, &run).await,
    }
}

async fn run_tool(config: &Config, tool_id: String, params: &str) -> anyhow::Result<ExitCode> {
    let params: HashMap<String, serde_json::Value> =
        serde_json::from_str(params).context("--params must be a JSON object")?;
    let call = ToolCall { tool_id, params };

    let facade = Arc::new(LocalFacade::from_config(&config.tools));
    let shell = ShellTool::new(
        ShellExecutor::new(facade.as_ref(), &config.tools.shell),
        EventEmitter::new(),
    );
    let files = FileTools::from_config(facade, TurnLedger::new(), &config.tools.files);

    let cancel = CancellationToken::new();
    let output = match shell.execute_tool_call(&call, &cancel).await? {
        Some(output) => output,
        None => files
            .execute_tool_call(&call)
            .await?
            .with_context(|| format!("unknown tool: {}", call.tool_id))?,
    };

    println!("{output}");
    let changes = files.ledger().finish().await;
    if !changes.is_empty() {
        println!("{}", changes.summarize());
        for line in changes.describe() {
            println!("  {line}");
        }
    }
    Ok(exit_code(&output))
}

async fn run_exec(config: &Config, run: &RunArgs, events: bool) -> anyhow::Result<ExitCode> {
    let (mut emitter, printer) = if events {
        let (observer, rx) = ChannelObserver::channel(64);
        (
            EventEmitter::new().with_observer(Arc::new(observer)),
            Some(tokio::spawn(print_events(rx))),
        )
    } else {
        (EventEmitter::new(), None)
    };
    if config.tools.audit.enabled {
        let logger = AuditLogger::from_config(&config.tools.audit)
            .await
            .context("failed to open audit log")?;
        emitter = emitter.with_observer(Arc::new(logger));
    }

    let output = execute(config, emitter, run).await?;
    if let Some(printer) = printer {
        finish_printer(printer).await;
    }

    match &output.data {
        Some(payload) => println!("{}", serde_json::to_string_pretty(payload)?),
        None => println!("{output}"),
    }
    Ok(exit_code(&output))
}

async fn run_diff(config: &Config, files: &[PathBuf], run: &RunArgs) -> anyhow::Result<ExitCode> {
    let root = match &run.workdir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to resolve working directory")?,
    };
    let mut tracker = DiffTracker::new(root);
    for file in files {
        tracker.snapshot(file);
    }

    let output = execute(config, EventEmitter::new(), run).await?;
    if !output.success {
        eprintln!("{output}");
    }

    let changes = tracker.changes();
    println!("{}", changes.summarize());
    for line in changes.describe() {
        println!("  {line}");
    }
    Ok(exit_code(&output))
}

async fn execute(
    config: &Config,
    emitter: EventEmitter,
    run: &RunArgs,
) -> anyhow::Result<ToolOutput> {
    let facade = LocalFacade::from_config(&config.tools);
    let tool = ShellTool::new(ShellExecutor::new(&facade, &config.tools.shell), emitter);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling command");
            on_interrupt.cancel();
        }
    });

    tool.execute_tool_call(&run.tool_call(), &cancel)
        .await?
        .context("shell tool did not handle the call")
}

async fn print_events(mut rx: tokio::sync::mpsc::Receiver<ExecEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => eprintln!("{line}"),
            Err(e) => tracing::warn!("failed to serialize event: {e}"),
        }
    }
}

async fn finish_printer(printer: JoinHandle<()>) {
    if let Err(e) = printer.await {
        tracing::warn!("event printer task failed: {e}");
    }
}

fn exit_code(output: &ToolOutput) -> ExitCode {
    if output.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
