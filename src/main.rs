use anyhow::{bail, Context};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use spoke_publisher::config;
use spoke_publisher::errors::error_chain;
use spoke_publisher::models::SearchParams;
use spoke_publisher::uploader::{progress_tracker::percent, BatchProgressCallback, Blob, ImageThumbnailer};
use spoke_publisher::ApiClient;

const USAGE: &str = "Usage:
  spoke-publisher resolve <url> [index]
  spoke-publisher projects
  spoke-publisher upload-assets <file>...
  spoke-publisher search <source> <query>";

fn register_cancel_handler(cancel: CancellationToken) {
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, cancelling...");
        cancel.cancel();
    }) {
        log::warn!("Failed to set Ctrl-C handler: {}", e);
    }
}

#[tokio::main]
async fn main() {
    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    log::info!("Starting Spoke Publisher v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    register_cancel_handler(cancel.clone());

    let args: Vec<String> = std::env::args().skip(1).collect();

    let result = match ApiClient::from_config(config) {
        Ok(client) => run(&client, &args, &cancel).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        match e.downcast_ref::<spoke_publisher::AppError>() {
            Some(app_error) if app_error.is_aborted() => {
                log::info!("{}", app_error);
            }
            Some(app_error) => {
                log::error!("{}", error_chain(app_error));
                std::process::exit(1);
            }
            None => {
                log::error!("{:#}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn run(client: &ApiClient, args: &[String], cancel: &CancellationToken) -> anyhow::Result<()> {
    match args.first().map(String::as_str) {
        Some("resolve") => {
            let url = args.get(1).context(USAGE)?;
            let index = args
                .get(2)
                .map(|i| i.parse::<u32>())
                .transpose()
                .context("index must be a non-negative integer")?;

            let media = client.resolver().resolve_media(url, index).await?;
            println!("canonical:  {}", media.canonical_url);
            println!("accessible: {}", media.accessible_url);
            println!(
                "type:       {}",
                media.content_type.as_deref().unwrap_or("unknown")
            );
            if let Some(files) = &media.files {
                println!("files:      {}", files.len());
            }
        }
        Some("projects") => {
            for project in client.get_projects().await? {
                let scene = project
                    .scene
                    .as_ref()
                    .map(|scene| client.scene_url(&scene.scene_id))
                    .unwrap_or_else(|| "unpublished".to_string());
                println!("{}  {}  {}", project.project_id, project.name, scene);
            }
        }
        Some("upload-assets") => {
            let paths: Vec<PathBuf> = args[1..].iter().map(PathBuf::from).collect();
            if paths.is_empty() {
                bail!(USAGE);
            }

            let mut files = Vec::with_capacity(paths.len());
            for path in &paths {
                files.push(
                    Blob::from_path(path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                );
            }

            let progress: BatchProgressCallback = Arc::new(|item: usize, total: usize, fraction: f64| {
                log::info!("Uploading {}/{}: {}%", item, total, percent(fraction));
            });

            let assets = client
                .upload_assets(&ImageThumbnailer::default(), &files, Some(progress), cancel)
                .await?;

            for asset in &assets {
                println!("{}  {}  {}", asset.id, asset.name, asset.url);
            }
            if assets.len() < files.len() {
                log::info!("Uploaded {} of {} files before cancellation", assets.len(), files.len());
            }
        }
        Some("search") => {
            let source = args.get(1).context(USAGE)?;
            let params = SearchParams {
                query: args.get(2).cloned(),
                ..SearchParams::default()
            };

            let results = client.search_media(source, &params, None, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
