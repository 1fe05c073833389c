use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use spin_wager::{
    config::NetworkProfile,
    wallets,
};
use std::{
    path::PathBuf,
    sync::OnceLock,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

mod client;
mod ui;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_AMOUNT: &str = "1";
const DEFAULT_LOG_DIR: &str = "~/.spin-wager/logs";

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: spin-wager --keystore <name|path> [--profile <path>] [--rpc-url <url>]\n\
         [--amount <decimal>] [--log-dir <path>]\n\
         spin-wager --init-profile <path>\n\
         \n\
         Flags:\n\
           --keystore <name|path> Encrypted keystore to sign with (names resolve in ~/.foundry/keystores)\n\
           --profile <path>       Network profile JSON (defaults to Monad testnet)\n\
           --rpc-url <url>        Override the profile's RPC URL\n\
           --amount <decimal>     Initial wager amount (default {})\n\
           --log-dir <path>       Directory for log files (default {})\n\
           --init-profile <path>  Write the default network profile to <path> and exit",
        DEFAULT_AMOUNT, DEFAULT_LOG_DIR,
    );
    std::process::exit(0);
}

enum Command {
    Play {
        profile: NetworkProfile,
        keystore: String,
        amount: String,
        log_dir: String,
    },
    InitProfile(PathBuf),
}

fn parse_cli_args() -> Result<Command> {
    let mut args = std::env::args().skip(1);
    let mut profile_path: Option<String> = None;
    let mut rpc_url: Option<String> = None;
    let mut keystore: Option<String> = None;
    let mut amount: Option<String> = None;
    let mut log_dir: Option<String> = None;
    let mut init_profile: Option<String> = None;

    while let Some(arg) = args.next() {
        let slot = match arg.as_str() {
            "--profile" => &mut profile_path,
            "--rpc-url" => &mut rpc_url,
            "--keystore" => &mut keystore,
            "--amount" => &mut amount,
            "--log-dir" => &mut log_dir,
            "--init-profile" => &mut init_profile,
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        };
        let value = args
            .next()
            .ok_or_else(|| eyre!("{arg} requires an argument"))?;
        if slot.is_some() {
            return Err(eyre!("{arg} may only be specified once"));
        }
        *slot = Some(value);
    }

    if let Some(path) = init_profile {
        return Ok(Command::InitProfile(PathBuf::from(path)));
    }

    let mut profile = match profile_path {
        Some(path) => NetworkProfile::load(path)?,
        None => NetworkProfile::monad_testnet()?,
    };
    if let Some(url) = rpc_url {
        profile.rpc_url = url;
    }
    let keystore = keystore
        .ok_or_else(|| eyre!("Specify --keystore <name|path> to select a signing key"))?;

    Ok(Command::Play {
        profile,
        keystore,
        amount: amount.unwrap_or_else(|| DEFAULT_AMOUNT.to_string()),
        log_dir: log_dir.unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()),
    })
}

/// The terminal belongs to the UI, so logs go to a daily file.
fn init_logging(log_dir: &str) -> Result<()> {
    let dir = PathBuf::from(shellexpand::tilde(log_dir).into_owned());
    std::fs::create_dir_all(&dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, "spin-wager.log"));
    let _ = LOG_GUARD.set(guard);
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| eyre!("Failed to install log subscriber: {err}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let (profile, keystore, amount, log_dir) = match parse_cli_args()? {
        Command::InitProfile(path) => {
            let written = NetworkProfile::monad_testnet()?.save(path)?;
            println!("Wrote network profile to {}", written.display());
            return Ok(());
        }
        Command::Play {
            profile,
            keystore,
            amount,
            log_dir,
        } => (profile, keystore, amount, log_dir),
    };
    init_logging(&log_dir)?;
    tracing::info!(network = %profile, "starting spin-wager client");

    let dir = wallets::default_keystore_dir()?;
    let descriptor = wallets::resolve_keystore(&keystore, &dir)?;
    let signer = wallets::unlock_keystore(&descriptor, profile.chain_id)?;

    client::run_app(client::AppConfig {
        profile,
        signer,
        amount,
    })
    .await
}
