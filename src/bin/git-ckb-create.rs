//! Repository creation tool.
//!
//! Mints a new repository slot owned by the given address and prints the
//! remote URL to configure in git.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use git_remote_ckb::{
    CkbCliSigner, CkbRpcClient, HelperConfig, HelperResult, LedgerRpc, RepoCreator, Signer,
};

#[derive(Parser)]
#[command(name = "git-ckb-create", version, about = "Create a git repository on the Nervos CKB ledger")]
struct Args {
    /// Owner's CKB address; also the signing account
    address: String,
}

async fn run(args: Args) -> HelperResult<()> {
    let config = HelperConfig::from_env();
    let client = CkbRpcClient::new(config.rpc.clone())?;
    client.ping().await?;

    let rpc: Arc<dyn LedgerRpc> = Arc::new(client);
    let signer: Arc<dyn Signer> = Arc::new(CkbCliSigner::new(config.signer_bin.clone()));
    let creator = RepoCreator::new(rpc, signer, config);

    let url = creator.allocate(&args.address).await?;
    println!("{}", url);
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
