mod auth_commands;
mod channel_commands;
mod runtime;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::channel_commands::FlagUpdate;

#[derive(Parser)]
#[command(
    name = "soulxbot",
    version,
    about = "soulxbot: stream sessions, first chatters and questions of the day"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file; discovered from the working and user config dirs when absent.
    #[arg(long, short, global = true, env = "SOULXBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat bot, session pollers and HTTP API.
    Serve {
        /// Overrides server.bind.
        #[arg(long)]
        bind: Option<String>,
        /// Overrides server.port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Broadcaster credential management.
    Auth {
        #[command(subcommand)]
        action: auth_commands::AuthAction,
    },
    /// Bar a user from the first race.
    Exclude {
        #[arg(long)]
        username: String,
        /// Channel to scope the exclusion to; global when omitted.
        #[arg(long)]
        owner: Option<String>,
    },
    /// List exclusions of a channel, or the global ones.
    Exclusions {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Toggle a channel's features.
    Flags {
        #[arg(long)]
        username: String,
        #[arg(long)]
        first: Option<bool>,
        #[arg(long)]
        qotd: Option<bool>,
        #[arg(long)]
        bot_disabled: Option<bool>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = soulxbot_config::load_or_discover(cli.config.as_deref())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.bot.environment,
        "soulxbot starting"
    );

    match cli.command {
        Commands::Serve { bind, port } => runtime::serve(config, bind, port).await,
        Commands::Auth { action } => auth_commands::handle_auth(action, config).await,
        Commands::Exclude { username, owner } => {
            let store = runtime::open_store(&config).await?;
            let msg = channel_commands::exclude(&store, &username, owner.as_deref()).await?;
            println!("{msg}");
            Ok(())
        },
        Commands::Exclusions { owner } => {
            let store = runtime::open_store(&config).await?;
            for username in channel_commands::exclusions(&store, owner.as_deref()).await? {
                println!("{username}");
            }
            Ok(())
        },
        Commands::Flags {
            username,
            first,
            qotd,
            bot_disabled,
        } => {
            let store = runtime::open_store(&config).await?;
            let update = FlagUpdate {
                first,
                qotd,
                bot_disabled,
            };
            let flags = channel_commands::set_flags(&store, &username, update).await?;
            println!(
                "{username}: first={} qotd={} bot_disabled={}",
                flags.first_enabled, flags.qotd_enabled, flags.bot_disabled
            );
            Ok(())
        },
    }
}
