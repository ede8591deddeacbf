use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use mzview::handle::DEFAULT_BRACKET_LIMIT;
use mzview::server::{serve, AppState, ServerConfig};
use mzview::{FileRegistry, ScanProcessor};

/// Serve scans from mass spectrometry data files over HTTP, processing them on demand.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The mzML or MGF files to serve. Each is addressed by its position in
    /// this list, starting from 0.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// The address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// The port to listen on
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// An origin allowed to make cross-origin requests. May be repeated.
    /// Any origin is allowed if none are given.
    #[arg(long = "allow-origin")]
    allow_origin: Vec<String>,

    /// The most scans to inspect after an MS1 scan when looking for its products
    #[arg(long, default_value_t = DEFAULT_BRACKET_LIMIT)]
    bracket_limit: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let registry = match FileRegistry::open_mzdata_paths(&args.paths) {
        Ok(registry) => registry,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    for entry in registry.iter() {
        info!("Key {} => {}", entry.key(), entry.path().display());
    }

    let processor = ScanProcessor::default().with_bracket_limit(args.bracket_limit);
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        allowed_origins: args.allow_origin,
    };
    match serve(AppState::new(registry, processor), &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server failed: {e}");
            ExitCode::FAILURE
        }
    }
}
