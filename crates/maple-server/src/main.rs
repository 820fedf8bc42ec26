//! MapleFile cloud service binary

use clap::Parser;
use maple_server::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "maple-server")]
#[command(about = "End-to-end encrypted file sync service")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "MAPLE_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "MAPLE_PORT")]
    port: u16,

    /// Public base URL presigned links are minted under
    #[arg(long, env = "MAPLE_PUBLIC_URL")]
    public_url: Option<String>,

    /// Token key (base64, 32 bytes); generated per run when unset
    #[arg(long, env = "MAPLE_TOKEN_KEY")]
    token_key: Option<String>,

    /// Comma-separated ISO country codes refused at the edge
    #[arg(long, env = "MAPLE_BANNED_COUNTRIES", value_delimiter = ',')]
    banned_countries: Vec<String>,

    /// Rate limit in requests per second per account
    #[arg(long, default_value = "100", env = "MAPLE_RATE_LIMIT_RPS")]
    rate_limit_rps: u32,

    /// Enable debug logging
    #[arg(short, long, env = "MAPLE_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("maple_server={log_level},tower_http=warn").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let public_url = args
        .public_url
        .unwrap_or_else(|| format!("http://localhost:{}", args.port));

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        public_url,
        token_key: args.token_key,
        banned_countries: args.banned_countries,
        rate_limit_rps: args.rate_limit_rps,
        ..Default::default()
    };

    run_server(config).await
}
