use clap::Parser;
use tracing_subscriber::EnvFilter;

use quarry_gateway::api;
use quarry_gateway::cli::{investigate, load_config, search, status, workflow, Cli, Command};
use quarry_gateway::state::AppState;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(&cli)?;

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(1);
    };

    match command {
        Command::Investigate {
            goal,
            max_turns,
            no_sanctions,
            no_news,
            dry_run,
            interactive,
            save,
            resume,
            output,
        } => {
            let state = AppState::from_config(config)?;
            investigate::run(
                &state,
                investigate::InvestigateArgs {
                    goal,
                    max_turns,
                    no_sanctions,
                    no_news,
                    dry_run,
                    interactive,
                    save,
                    resume,
                    output,
                },
            )
            .await
        }
        Command::Search {
            query,
            entity_type,
            limit,
        } => {
            let state = AppState::from_config(config)?;
            search::run(&state, &query, &entity_type, limit).await?;
            Ok(0)
        }
        Command::Workflow {
            name,
            target,
            dry_run,
        } => {
            let state = AppState::from_config(config)?;
            workflow::run(&state, &name, &target, dry_run).await?;
            Ok(0)
        }
        Command::Status => {
            let state = AppState::from_config(config)?;
            status::run(&state);
            Ok(0)
        }
        Command::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve(config).await?;
            Ok(0)
        }
    }
}

async fn serve(config: quarry_domain::config::Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let bind = state.config.server.bind.clone();
    let router = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(addr = %bind, "quarry gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown requested");
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
