use clap::Parser;
use skyload_server::{Emulator, EmulatorOptions};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "skyload-server",
    version,
    about = "In-memory emulator for the skyload control-plane protocol v1"
)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8321)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Describes that report `creating` before a new cluster is available.
    #[arg(long, default_value_t = 2)]
    creating_polls: u32,

    /// Describes that report `deleting` before a deleted cluster disappears.
    #[arg(long, default_value_t = 2)]
    deleting_polls: u32,

    /// Describes that fail with ServiceUnavailable before any succeeds.
    #[arg(long, default_value_t = 0)]
    transient_describes: u32,

    /// Address published as the endpoint of available clusters.
    #[arg(long, default_value = "127.0.0.1")]
    endpoint_address: String,

    /// Require this access key (with --secret-key) on every request.
    #[arg(long, requires = "secret_key")]
    access_key: Option<String>,

    #[arg(long, requires = "access_key")]
    secret_key: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SKYLOAD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let options = EmulatorOptions {
        creating_polls: cli.creating_polls,
        deleting_polls: cli.deleting_polls,
        transient_describes: cli.transient_describes,
        endpoint_address: cli.endpoint_address,
        credentials: cli.access_key.zip(cli.secret_key),
    };

    let addr = format!("{}:{}", cli.bind, cli.port);
    info!("starting skyload-server on {addr}");
    info!(
        "clusters stay creating for {} describes, deleting for {}",
        options.creating_polls, options.deleting_polls
    );

    let emulator = Arc::new(Emulator::new(options));
    match skyload_server::run_server(&emulator, &addr) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("cannot serve on {addr}: {e}");
            ExitCode::FAILURE
        }
    }
}
