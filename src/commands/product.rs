use std::path::PathBuf;

use anyhow::{anyhow, Result};
use previewar_core::cache::CACHE_DB_FILE;
use previewar_core::config::{cache_dir, resolve_api_key};
use previewar_core::pipeline::BEST_IMAGE_FILE;
use previewar_core::scraper::url_info::domain_to_brand;
use previewar_core::{HttpChatBackend, Pipeline, Settings};
use tracing::{info, warn};

use super::print_json;

fn build_pipeline(settings: &Settings, use_cache: bool) -> Result<Pipeline<HttpChatBackend>> {
    let provider = settings.provider()?;
    let model = settings.effective_model()?;
    let api_key = resolve_api_key(provider)?;
    info!("Using {} model '{}'", provider, model);

    let backend = HttpChatBackend::new(provider, &model, &api_key)
        .map_err(|e| anyhow!(e))?
        .with_max_output_tokens(settings.max_output_tokens);
    let pipeline = Pipeline::new(backend, settings.clone()).map_err(|e| anyhow!(e))?;

    if !use_cache {
        info!("Report cache disabled");
        return Ok(pipeline);
    }
    match cache_dir() {
        Ok(dir) => Ok(pipeline.with_cache(dir.join(CACHE_DB_FILE))),
        Err(e) => {
            warn!("{}, continuing without cache", e);
            Ok(pipeline)
        }
    }
}

pub async fn identify(settings: &Settings, url: &str) -> Result<()> {
    let pipeline = build_pipeline(settings, false)?;
    let info = pipeline.identify(url).await.map_err(|e| anyhow!(e))?;
    print_json(&info)
}

pub async fn scrape(settings: &Settings, url: &str, company: Option<&str>) -> Result<()> {
    let pipeline = build_pipeline(settings, false)?;
    let company = company.map(str::to_string).or_else(|| domain_to_brand(url));
    let analysis = pipeline
        .scrape(url, company.as_deref())
        .await
        .map_err(|e| anyhow!(e))?;
    print_json(&analysis)
}

pub async fn select(
    settings: &Settings,
    url: &str,
    use_cache: bool,
    print_scrape: bool,
    out: Option<PathBuf>,
) -> Result<()> {
    let pipeline = build_pipeline(settings, use_cache)?;
    let (report, analysis) = pipeline.select_with_analysis(url).await.map_err(|e| anyhow!(e))?;

    if print_scrape {
        match analysis {
            Some(analysis) => eprintln!("{}", serde_json::to_string_pretty(&analysis)?),
            None => eprintln!("Report served from cache; run with --no-cache to see the page analysis."),
        }
    }
    print_json(&report)?;

    if report.best_image.image_url.is_none() {
        warn!("No best image for '{}': {}", url, report.best_image.reasoning);
        return Ok(());
    }
    let out = out.unwrap_or_else(|| settings.output_dir.join(BEST_IMAGE_FILE));
    let saved = pipeline
        .save_report_image(&report, &out)
        .await
        .map_err(|e| anyhow!(e))?;
    info!("Saved best image to {:?}", saved);
    Ok(())
}

pub async fn prompt(settings: &Settings, url: &str, use_cache: bool) -> Result<()> {
    let pipeline = build_pipeline(settings, use_cache)?;
    let result = pipeline.build_prompt(url).await.map_err(|e| anyhow!(e))?;
    print_json(&result)
}
