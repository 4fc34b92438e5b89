mod config_commands;
mod doctor_commands;
mod onboard_commands;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "quill", about = "Quill onboarding controller")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/quill/).
    #[arg(long, global = true, env = "QUILL_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,
    /// Custom data directory (overrides default data dir).
    #[arg(long, global = true, env = "QUILL_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and walk through the remaining onboarding steps.
    Onboard(onboard_commands::OnboardArgs),
    /// Show a user's onboarding flags and resolved stage.
    Status {
        /// User id as issued by the identity provider.
        uid: String,
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Forget the signed-in user. Onboarding progress is kept.
    SignOut,
    /// List the selectable topics.
    Topics,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Config validation and environment audit.
    Doctor,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "quill starting");

    if let Some(ref dir) = cli.config_dir {
        quill_config::set_config_dir(dir.clone());
    }
    if let Some(ref dir) = cli.data_dir {
        quill_config::set_data_dir(dir.clone());
    }

    match cli.command {
        Commands::Onboard(args) => {
            let config = quill_config::discover_and_load();
            onboard_commands::handle_onboard(args, &config).await
        },
        Commands::Status { uid, json } => {
            let config = quill_config::discover_and_load();
            onboard_commands::handle_status(&uid, json, &config)
        },
        Commands::SignOut => {
            let config = quill_config::discover_and_load();
            onboard_commands::handle_sign_out(&config)
        },
        Commands::Topics => {
            let config = quill_config::discover_and_load();
            onboard_commands::handle_topics(&config);
            Ok(())
        },
        Commands::Config { action } => config_commands::handle_config(action).await,
        Commands::Doctor => doctor_commands::handle_doctor().await,
    }
}
