use anyhow::Result;
use clap::Parser as _;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use healthres_cli::cli::{Cli, Commands};
use healthres_cli::{chat, commands, user_message};
use healthres_core::config::Config;
use healthres_llm::{build_generator, Responder};
use healthres_retrieval::Session;

const DEFAULT_FILTER: &str =
    "warn,healthres_core=info,healthres_embed=info,healthres_ann=info,healthres_vector=info,healthres_retrieval=info,healthres_llm=info";

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("{}", user_message(&e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let settings = config.settings()?;
    let default_k = settings.retrieval.top_k;
    let session = Session::from_settings(settings).await?;

    match cli.command {
        Commands::Ingest => commands::ingest(&session).await?,
        Commands::Search { query, backend, top_k } => {
            let matches = commands::search(&session, &query, backend, top_k.unwrap_or(default_k)).await?;
            commands::print_matches(backend, &matches);
        }
        Commands::Ask { query, backend, top_k, stream } => {
            let responder = Responder::new(build_generator(&session.settings().generation)?);
            let matches = commands::search(&session, &query, backend, top_k.unwrap_or(default_k)).await?;
            commands::print_matches(backend, &matches);
            println!();
            commands::answer(&responder, &query, &matches, &[], stream).await?;
        }
        Commands::Chat { backend, top_k, stream } => {
            let responder = Responder::new(build_generator(&session.settings().generation)?);
            chat::run(&session, &responder, backend, top_k.unwrap_or(default_k), stream).await?;
        }
    }
    Ok(())
}
