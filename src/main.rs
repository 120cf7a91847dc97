use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ftp_import::cli::{cmd_import, ImportArgs};
use ftp_import::{config, server, Core};

#[derive(Parser)]
#[command(name = "ftp-import")]
#[command(version, about = "Stream a file from an FTP server into an object storage bucket", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (falls back to environment variables)
    #[arg(long, global = true, env = "FTP_IMPORT_CONFIG")]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the import endpoint over HTTP
    Serve {
        /// Address to listen on (overrides the config file)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Run a single import and print the result
    Import {
        /// Destination bucket
        #[arg(long)]
        bucket: String,

        /// FTP host, optionally with :port
        #[arg(long)]
        host: String,

        /// Remote file name; also used as the object name
        #[arg(long)]
        file: String,

        /// FTP user (anonymous when omitted)
        #[arg(long)]
        user: Option<String>,

        /// FTP password
        #[arg(long, env = "FTP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // One transfer needs no worker pool; the server handles connections concurrently
    let runtime = match cli.command {
        Commands::Serve { .. } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?,
        Commands::Import { .. } => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?,
    };

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref())?;
    let core = Core::new(config)?;

    match cli.command {
        Commands::Serve { listen } => {
            let listen = listen.unwrap_or_else(|| core.config.server.listen.clone());
            server::run_server(&core, &listen).await?;
        }
        Commands::Import {
            bucket,
            host,
            file,
            user,
            password,
        } => {
            let args = ImportArgs {
                bucket,
                host,
                file,
                user,
                password,
            };
            let response = cmd_import(&core, &args).await?;
            if !response.is_success() {
                anyhow::bail!("import failed with status {}", response.status);
            }
        }
    }

    Ok(())
}
