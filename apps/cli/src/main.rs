//! Clipforge CLI: chat with the editing agent, run tools directly, and
//! inspect configuration and multi-take projects.
//!
//! Exit codes: 0 success, 1 configuration error, 2 unrecoverable runtime
//! error.

use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use cf_domain::config::ConfigStore;
use cf_service::VideoEditorService;

#[derive(Parser)]
#[command(name = "clipforge", about = "AI-assisted video editing backend", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat with the editing agent.
    Chat,
    /// Send a single message and print the streamed reply.
    Ask {
        /// The request, in natural language.
        message: String,
    },
    /// Tool operations.
    Tool {
        #[command(subcommand)]
        command: ToolCommand,
    },
    /// Configuration operations.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// List multi-take projects.
    Projects {
        /// Delete a project record by id (files on disk are kept).
        #[arg(long)]
        delete: Option<String>,
    },
}

#[derive(Subcommand)]
enum ToolCommand {
    /// List every registered tool.
    List,
    /// Run one tool with JSON arguments.
    Run {
        name: String,
        /// Arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the (credential-masked) configuration.
    Show,
    /// Set a configuration field.
    Set { key: String, value: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::from(2);
        }
    };
    match runtime.block_on(run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Config(e)) => {
            eprintln!("configuration error: {e}");
            ExitCode::from(1)
        }
        Err(RunError::Runtime(e)) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

enum RunError {
    Config(anyhow::Error),
    Runtime(anyhow::Error),
}

async fn run() -> Result<(), RunError> {
    let cli = Cli::parse();

    let config = ConfigStore::load_default()
        .map_err(|e| RunError::Config(anyhow::anyhow!(e)))?;
    let service = Arc::new(
        VideoEditorService::new(Arc::new(config))
            .map_err(|e| RunError::Config(anyhow::anyhow!(e)))?,
    );

    match cli.command {
        Command::Chat => chat_repl(service).await.map_err(RunError::Runtime),
        Command::Ask { message } => {
            stream_one_message(&service, message)
                .await
                .map_err(RunError::Runtime)
        }
        Command::Tool { command } => match command {
            ToolCommand::List => {
                for def in service.list_tools() {
                    println!("{:<28} {}", def.name, def.description);
                }
                Ok(())
            }
            ToolCommand::Run { name, args } => {
                let arguments: serde_json::Value = serde_json::from_str(&args)
                    .map_err(|e| RunError::Runtime(anyhow::anyhow!("--args is not valid JSON: {e}")))?;
                let cancel = cancel_on_ctrl_c();
                let result = service.execute_tool(&name, arguments, cancel).await;
                if result.success {
                    println!("{}", result.content);
                    if !result.data.is_null() {
                        println!("{}", serde_json::to_string_pretty(&result.data).unwrap_or_default());
                    }
                    Ok(())
                } else {
                    Err(RunError::Runtime(anyhow::anyhow!(result.error)))
                }
            }
        },
        Command::Config { command } => match command {
            ConfigCommand::Show => {
                let masked = service.get_config();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&masked)
                        .map_err(|e| RunError::Runtime(anyhow::anyhow!(e)))?
                );
                Ok(())
            }
            ConfigCommand::Set { key, value } => {
                set_config_field(&service, &key, &value).map_err(RunError::Config)
            }
        },
        Command::Projects { delete } => {
            let home = dirs::home_dir()
                .ok_or_else(|| RunError::Config(anyhow::anyhow!("no home directory")))?;
            let store = cf_multitake::ProjectStore::new(home.join(".clipforge").join("projects"))
                .map_err(|e| RunError::Runtime(anyhow::anyhow!(e)))?;
            if let Some(id) = delete {
                let uuid: uuid::Uuid = id
                    .parse()
                    .map_err(|_| RunError::Runtime(anyhow::anyhow!("not a project id: {id}")))?;
                store
                    .delete(&uuid)
                    .map_err(|e| RunError::Runtime(anyhow::anyhow!(e)))?;
                println!("deleted {id} (files on disk retained)");
                return Ok(());
            }
            let projects = store
                .list()
                .map_err(|e| RunError::Runtime(anyhow::anyhow!(e)))?;
            if projects.is_empty() {
                println!("no projects");
            }
            for p in projects {
                println!(
                    "{}  {:<24} {:?} ({} takes, {} sections)",
                    p.id,
                    p.name,
                    p.status.phase,
                    p.takes.len(),
                    p.script.sections.len()
                );
            }
            Ok(())
        }
    }
}

fn set_config_field(
    service: &VideoEditorService,
    key: &str,
    value: &str,
) -> Result<(), anyhow::Error> {
    let value = value.to_string();
    let applied = match key {
        "openaiKey" => service.update_config(|c| c.openai_key = Some(value.clone())),
        "claudeApiKey" => service.update_config(|c| c.claude_api_key = Some(value.clone())),
        "elevenLabsKey" => service.update_config(|c| c.eleven_labs_key = Some(value.clone())),
        "agentModel" => service.update_config(|c| c.agent_model = Some(value.clone())),
        "ffmpegPath" => service.update_config(|c| c.ffmpeg_path = value.clone()),
        "ffprobePath" => service.update_config(|c| c.ffprobe_path = value.clone()),
        "lastProjectDir" => service.update_config(|c| c.last_project_dir = Some(value.clone())),
        "agentProvider" => {
            let provider = serde_json::from_value(serde_json::Value::String(value.clone()))
                .map_err(|_| anyhow::anyhow!("agentProvider must be \"openai\" or \"claude\""))?;
            service.update_config(|c| c.agent_provider = provider)
        }
        "defaultQuality" => {
            let quality = serde_json::from_value(serde_json::Value::String(value.clone()))
                .map_err(|_| anyhow::anyhow!("defaultQuality must be high, medium or low"))?;
            service.update_config(|c| c.default_quality = quality)
        }
        other => return Err(anyhow::anyhow!("unknown config key \"{other}\"")),
    };
    applied.map_err(|e| anyhow::anyhow!(e))?;
    println!("{key} updated");
    Ok(())
}

/// A token that trips on Ctrl-C, for long tool runs.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trip.cancel();
        }
    });
    cancel
}

async fn stream_one_message(
    service: &VideoEditorService,
    message: String,
) -> Result<(), anyhow::Error> {
    let cancel = cancel_on_ctrl_c();
    let mut stream = service.send_message(message, cancel);
    while let Some(update) = stream.next().await {
        if let Some(delta) = &update.content_delta {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        }
        if let Some(calls) = &update.tool_calls {
            for call in calls {
                println!("\n[tool] {}({})", call.name, call.arguments);
            }
        }
        if let Some(results) = &update.tool_results {
            for outcome in results {
                let tag = if outcome.result.success { "ok" } else { "failed" };
                println!("[tool] {} {tag}", outcome.name);
            }
        }
        if update.done {
            println!();
            if let Some(error) = &update.error {
                return Err(anyhow::anyhow!(error.clone()));
            }
            break;
        }
    }
    Ok(())
}

async fn chat_repl(service: Arc<VideoEditorService>) -> Result<(), anyhow::Error> {
    println!("clipforge chat - /clear resets, /history shows the log, /quit exits");
    let mut editor = rustyline::DefaultEditor::new()?;
    loop {
        match editor.readline("you> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                match line {
                    "/quit" | "/exit" => break,
                    "/clear" => {
                        service.clear_conversation();
                        println!("conversation cleared");
                    }
                    "/history" => {
                        for msg in service.get_conversation_history() {
                            println!("[{:?}] {}", msg.role, msg.content.extract_all_text());
                        }
                    }
                    _ => {
                        if let Err(e) = stream_one_message(&service, line.to_string()).await {
                            eprintln!("error: {e}");
                        }
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => return Err(anyhow::anyhow!(e)),
        }
    }
    Ok(())
}
