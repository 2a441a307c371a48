//! Remote helper entry point.
//!
//! Invoked by git as `git-remote-ckb <remote-name> <url>` with the line
//! protocol on stdin/stdout. Stdout belongs to git, so diagnostics go to a
//! log file named by `CKB_GIT_LOG` (and stderr on fatal exit).

use std::io::{stdin, stdout};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use git_remote_ckb::{
    CkbCliSigner, CkbRpcClient, Dispatcher, GitCli, HelperConfig, HelperResult, LedgerRpc,
    RemoteUrl, Signer,
};

#[derive(Parser)]
#[command(name = "git-remote-ckb", version, about = "Git remote helper for the Nervos CKB ledger")]
struct Args {
    /// Remote name as configured in git
    remote_name: String,
    /// Remote URL, ckb://address@type_id
    url: String,
}

fn init_logging() {
    let Ok(path) = std::env::var("CKB_GIT_LOG") else {
        return;
    };
    let Ok(file) = std::fs::File::create(&path) else {
        eprintln!("git-remote-ckb: cannot open log file {}", path);
        return;
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "git_remote_ckb=debug".into()),
        )
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
}

async fn run(args: Args) -> HelperResult<()> {
    tracing::info!("helper started for remote {} at {}", args.remote_name, args.url);
    let config = HelperConfig::from_env();
    let url = RemoteUrl::parse(&args.url)?;

    let rpc: Arc<dyn LedgerRpc> = Arc::new(CkbRpcClient::new(config.rpc.clone())?);
    let signer: Arc<dyn Signer> = Arc::new(CkbCliSigner::new(config.signer_bin.clone()));
    let mut dispatcher = Dispatcher::new(config, url, rpc, signer, Box::new(GitCli::new()));

    let input = stdin();
    let output = stdout();
    dispatcher.run(input.lock(), output.lock()).await
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_logging();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("fatal: {}", e);
        eprintln!("fatal: {}", e);
        std::process::exit(1);
    }
}
