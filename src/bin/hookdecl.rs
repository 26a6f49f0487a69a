use clap::Parser;
use hookdecl::{
    config::EngineConfig, executor::ProcessExecutor, request::RequestData, Error, Service,
};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the hook document
    #[arg(short, long, default_value = "hooks.hcl")]
    config: PathBuf,

    /// Path to the engine config (JSON)
    #[arg(short, long)]
    engine: Option<PathBuf>,

    /// Path to a request fixture (JSON)
    #[arg(short, long)]
    request: Option<PathBuf>,

    /// Hook to evaluate the request against
    #[arg(long)]
    hook: Option<String>,

    /// Only load and validate the document
    #[arg(long)]
    check: bool,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let mut config = match &cli.engine {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.debug |= cli.verbose;
    debug!("config: {:?}", config);

    let source = std::fs::read_to_string(&cli.config).map_err(|e| {
        Error::config(format!("Failed to read {}: {}", cli.config.display(), e))
    })?;
    let service = Service::load(&source, &config)?;
    info!(hooks = ?service.hook_ids(), "document loaded");

    if cli.check {
        println!(
            "{}: {} hook(s) OK",
            cli.config.display(),
            service.hook_ids().len()
        );
        return Ok(());
    }

    let hook = cli
        .hook
        .as_deref()
        .ok_or_else(|| Error::config("--hook is required unless --check is given"))?;
    let request: RequestData = match &cli.request {
        Some(path) => hookdecl::config::from_file(path)?,
        None => RequestData::default(),
    };

    let executor = ProcessExecutor::new(config.executor.clone());
    let outcome = service.handle(hook, request, &executor).await?;

    let report = serde_json::json!({
        "hook": outcome.hook_id,
        "request_id": outcome.request_id.to_string(),
        "verdict": outcome.verdict.to_string(),
        "result": outcome.result,
        "response": outcome.response,
    });
    let text = serde_json::to_string_pretty(&report)
        .map_err(|e| Error::internal(format!("Failed to render outcome: {}", e)))?;
    println!("{}", text);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
