use clap::Parser;

mod app;
mod cli;
mod config;
mod fingerprint;
mod posts;
mod refresh;
mod search;
mod semantic;
mod sources;
mod storage;
mod store;
#[cfg(test)]
mod tests;
mod web;

use app::App;
use config::Config;

fn base_path() -> anyhow::Result<String> {
    if let Ok(path) = std::env::var("SCRIBBLE_BASE_PATH") {
        return Ok(path);
    }

    let home = homedir::my_home()
        .map_err(|err| anyhow::anyhow!("failed to resolve home directory: {err}"))?
        .ok_or_else(|| anyhow::anyhow!("no home directory found"))?;

    Ok(home
        .join(".local")
        .join("share")
        .join("scribble")
        .to_string_lossy()
        .into_owned())
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let config = Config::load_with(&base_path()?)?;
    let app = App::new(config)?;

    match args.command {
        cli::Command::Daemon { addr, no_preload } => web::start_daemon(app, &addr, !no_preload),

        cli::Command::Search {
            query,
            top_n,
            min_similarity,
        } => {
            let hits = app.search(&query, top_n, min_similarity)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }

        cli::Command::List { platform } => {
            let posts = app.list_posts(platform.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&posts)?);
            Ok(())
        }

        cli::Command::Show { id } => {
            let post = app.get_post(&id)?;
            println!("{}", serde_json::to_string_pretty(&post)?);
            Ok(())
        }

        cli::Command::Refresh { platform, force } => {
            let summary = runtime()?.block_on(app.refresh(platform.as_deref(), force))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }

        cli::Command::Platforms {} => {
            println!("{}", serde_json::to_string_pretty(&app.platforms())?);
            Ok(())
        }
    }
}
