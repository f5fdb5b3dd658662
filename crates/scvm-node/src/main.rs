//! SCVM Node - Hosts the contract VM worker pool.
//!
//! Boots the pool of out-of-process workers and offers a few
//! maintenance commands around compiled contract code.

pub mod config;
pub mod telemetry;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scvm_codec::{decode_code, encode_code, LuaCode};
use scvm_vm::{init_context, start_vm_pool, ProcessLauncher};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "scvm-node")]
#[command(about = "SCVM Node - contract execution on a pool of VM workers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Config file path
    #[arg(short, long, value_name = "FILE", env = "SCVM_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overrides the config file
    #[arg(short, long, env = "SCVM_LOG")]
    log_level: Option<String>,

    /// Number of VM workers
    #[arg(long)]
    pool_size: Option<usize>,

    /// VM worker executable
    #[arg(long, value_name = "FILE", env = "AERGOVM_PATH")]
    vm_path: Option<PathBuf>,

    /// Log as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the worker pool and wait for Ctrl-C
    Run,
    /// Compile a contract source through a worker and print the code string
    Compile {
        file: PathBuf,
        /// The source imports a parent contract
        #[arg(long)]
        has_parent: bool,
    },
    /// Encode a compiled code file as a code string
    Encode { file: PathBuf },
    /// Decode a code string, writing the raw code to a file or describing it
    Decode {
        code: String,
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::NodeConfig::from_file(path)?,
        None => config::NodeConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    telemetry::init_from_config(&config.logging)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Compile { file, has_parent } => compile(config, file, has_parent).await,
        Command::Encode { file } => {
            let code = std::fs::read(&file).with_context(|| format!("Failed to read '{}'", file.display()))?;
            println!("{}", encode_code(&code));
            Ok(())
        }
        Command::Decode { code, out } => decode(&code, out),
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn apply_overrides(config: &mut config::NodeConfig, args: &Args) {
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = "json".to_string();
    }
    if let Some(size) = args.pool_size {
        config.vm.pool_size = size;
    }
    if let Some(path) = &args.vm_path {
        config.vm.vm_path = Some(path.clone());
    }
}

/// Applies the process-wide execution settings and starts the pool.
async fn boot(config: &config::NodeConfig) -> anyhow::Result<&'static scvm_vm::VmPool> {
    if config.vm.zero_fee {
        scvm_fee::enable_zero_fee();
    }
    init_context(config.vm.max_context);

    let launcher = ProcessLauncher::new(config.vm.vm_path.clone());
    info!(vm = %launcher.path().display(), size = config.vm.pool_size, "starting vm pool");
    let pool_config = config.vm.pool_config();
    let pool = tokio::task::spawn_blocking(move || start_vm_pool(pool_config, Box::new(launcher))).await??;
    Ok(pool)
}

async fn run(config: config::NodeConfig) -> anyhow::Result<()> {
    let pool = boot(&config).await?;
    info!(
        pub_net = config.vm.pub_net,
        fork = pool.fork(),
        available = pool.available(),
        "node running, press Ctrl-C to stop"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("shutting down");
    tokio::task::spawn_blocking(move || pool.stop()).await?;
    Ok(())
}

async fn compile(config: config::NodeConfig, file: PathBuf, has_parent: bool) -> anyhow::Result<()> {
    let source =
        std::fs::read_to_string(&file).with_context(|| format!("Failed to read '{}'", file.display()))?;
    let pool = boot(&config).await?;
    let fork = config.vm.fork;
    // compiling takes longer than a query
    let deadline = Instant::now() + Duration::from_millis(config.vm.timeout_ms.max(5_000));

    let code = tokio::task::spawn_blocking(move || {
        let code = scvm_vm::compile(pool, fork, &source, has_parent, Some(deadline));
        pool.stop();
        code
    })
    .await??;
    println!("{}", encode_code(code.bytes()));
    Ok(())
}

fn decode(encoded: &str, out: Option<PathBuf>) -> anyhow::Result<()> {
    let raw = decode_code(encoded.trim())?;
    if let Some(path) = out {
        std::fs::write(&path, &raw).with_context(|| format!("Failed to write '{}'", path.display()))?;
        info!(bytes = raw.len(), file = %path.display(), "code written");
        return Ok(());
    }
    let code = LuaCode::from_bytes(raw);
    if !code.is_valid_format() {
        anyhow::bail!("not a compiled contract code");
    }
    println!("bytecode: {} bytes", code.byte_code().len());
    println!("abi: {}", String::from_utf8_lossy(code.abi()));
    Ok(())
}
