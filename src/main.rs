//! Recallbot — conversation memory with log-backed recall

use clap::{Parser, Subcommand};
use recallbot::console::Console;
use recallbot::logging;
use recallbot_core::{MemoryConfig, SurfaceKey, UserId};
use recallbot_memory::{render_recall_block, ConversationEngine, LogStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "recallbot", about = "Conversation memory with log-backed recall")]
struct Cli {
    /// Config file (TOML). Missing file means defaults.
    #[arg(short, long, default_value = "recallbot.toml")]
    config: PathBuf,

    /// Overrides `data_dir` from the config and DATA_DIR.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Also write logs to a daily-rotated file in this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap all surfaces, then handle JSON-line events from stdin
    Run {
        /// User id recorded for assistant replies
        #[arg(long, default_value_t = 0)]
        bot_id: u64,
        /// Display name recorded for assistant replies
        #[arg(long, default_value = "bot")]
        bot_name: String,
    },
    /// Print the last records of a surface's log
    Tail {
        #[arg(short, long)]
        surface: String,
        #[arg(short, long, default_value_t = 20)]
        lines: usize,
    },
    /// List surfaces with log history
    Surfaces,
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(cli.log_dir.as_deref(), cli.log_json)?;

    let mut config = MemoryConfig::resolve(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command.unwrap_or(Commands::Run { bot_id: 0, bot_name: "bot".to_string() }) {
        Commands::Run { bot_id, bot_name } => {
            let engine = Arc::new(ConversationEngine::open(config).await?);
            engine.bootstrap().await;
            info!("recallbot v{} ready, data in {}", env!("CARGO_PKG_VERSION"), engine.config().data_dir.display());

            let console = Console::new(engine, UserId(bot_id), bot_name);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            console.run(stdin, tokio::io::stdout()).await?;
        }

        Commands::Tail { surface, lines } => {
            let log = LogStore::new(&config.data_dir);
            let turns = log.try_read_tail(&SurfaceKey::new(surface), lines).await?;
            println!("{}", render_recall_block(&turns));
        }

        Commands::Surfaces => {
            let log = LogStore::new(&config.data_dir);
            for surface in log.surfaces().await {
                println!("{}", surface);
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}
