//! End-to-end flow from a product URL to the best image and its prompts.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::cache::ProductCache;
use crate::config::Settings;
use crate::image_prep::save_best_image;
use crate::llm::ChatBackend;
use crate::prompt::{generate_negative_prompt, pick_target_object, PromptResult};
use crate::scraper::page_filter::filter_product_html;
use crate::scraper::{analyze_page, url_info, PageAnalysis, ProductInfo, ScraperHttpClient};
use crate::selector::{
    choose_dimensions, expand_aliases, normalize_url_list, rank_images, validate_dimensions,
    BestImage, ProductReport,
};
use crate::writer::write_atomic;

/// File name of the downloaded best image inside the output directory.
pub const BEST_IMAGE_FILE: &str = "best_image.png";

pub struct Pipeline<B: ChatBackend> {
    backend: B,
    http: ScraperHttpClient,
    settings: Settings,
    /// SQLite report cache; None disables caching.
    cache_db: Option<PathBuf>,
}

impl<B: ChatBackend> Pipeline<B> {
    pub fn new(backend: B, settings: Settings) -> Result<Self, String> {
        let http = ScraperHttpClient::new(&settings.client_options())?;
        Ok(Self {
            backend,
            http,
            settings,
            cache_db: None,
        })
    }

    pub fn with_cache(mut self, db_path: PathBuf) -> Self {
        self.cache_db = Some(db_path);
        self
    }

    /// Replace the HTTP client built from the settings.
    pub fn with_http_client(mut self, http: ScraperHttpClient) -> Self {
        self.http = http;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Retailer and product nouns for `url`.
    pub async fn identify(&self, url: &str) -> Result<ProductInfo, String> {
        url_info::identify_product(url, &self.http, &self.backend).await
    }

    /// Fetch the page and extract dimension strings and image URLs.
    pub async fn scrape(&self, url: &str, company: Option<&str>) -> Result<PageAnalysis, String> {
        let html = self.fetch_html(url).await?;
        self.analyze_html(url, company, &html).await
    }

    async fn fetch_html(&self, url: &str) -> Result<String, String> {
        let html = self.http.fetch_page(url).await?;
        if html.trim().is_empty() {
            return Err(format!("Empty page returned for '{}'", url));
        }
        Ok(html)
    }

    /// Analyze already fetched HTML, dumping the raw and filtered page when
    /// `dump_html` is set.
    pub async fn analyze_html(
        &self,
        url: &str,
        company: Option<&str>,
        html: &str,
    ) -> Result<PageAnalysis, String> {
        if self.settings.dump_html {
            self.dump_html(html, company);
        }
        analyze_page(html, url, company, &self.backend).await
    }

    fn dump_html(&self, html: &str, company: Option<&str>) {
        let dir = &self.settings.output_dir;
        let raw_path = dir.join("page.html");
        let filtered_path = dir.join("page_filtered.html");
        let filtered = filter_product_html(html, company);

        for (path, content) in [(&raw_path, html), (&filtered_path, filtered.as_str())] {
            if let Err(e) = write_atomic(path, content.as_bytes()) {
                warn!("Failed to dump HTML to {:?}: {}", path, e);
            }
        }
    }

    /// Full selection: identify, scrape, settle dimensions, expand aliases
    /// and rank images. Reports are cached per URL.
    pub async fn select_best_image(&self, url: &str) -> Result<ProductReport, String> {
        self.select_with_analysis(url).await.map(|(report, _)| report)
    }

    /// Like `select_best_image`, also returning the page analysis the report
    /// was built from. The analysis is None when the report came from cache.
    pub async fn select_with_analysis(
        &self,
        url: &str,
    ) -> Result<(ProductReport, Option<PageAnalysis>), String> {
        let url = url.trim();
        if url.is_empty() {
            return Err("Product URL cannot be empty.".to_string());
        }

        if let Some(report) = self.cached_report(url).await {
            return Ok((report, None));
        }

        // One fetch serves both the title and the analysis
        let html = self.fetch_html(url).await?;
        let title = url_info::extract_title(&html);
        let info = url_info::identify_with_title(url, title.as_deref(), &self.backend).await?;
        let analysis = self.analyze_html(url, Some(&info.company_name), &html).await?;
        let report = self.build_report(url, info, analysis.clone()).await?;

        self.store_report(url, &report).await;
        Ok((report, Some(analysis)))
    }

    /// Turn an identified product and its page analysis into a report.
    pub async fn build_report(
        &self,
        url: &str,
        info: ProductInfo,
        analysis: PageAnalysis,
    ) -> Result<ProductReport, String> {
        let image_urls = normalize_url_list(&analysis.image_urls, Some(self.settings.max_images));
        info!(
            "{} candidate images after normalization (from {})",
            image_urls.len(),
            analysis.image_urls.len()
        );

        let dimensions = choose_dimensions(&analysis.potential_dimension_values, &self.backend).await?;
        for w in validate_dimensions(&dimensions) {
            warn!(
                "Validation warning for '{}': {} (field: {}, value: {})",
                url, w.message, w.field, w.value
            );
        }

        let product_names = expand_aliases(&info.product_names, &self.backend).await;
        let dims_hint = (!dimensions.is_empty()).then_some(&dimensions);
        let ranking = rank_images(&image_urls, &product_names, dims_hint, &self.backend).await?;

        Ok(ProductReport {
            url: url.to_string(),
            company_name: info.company_name,
            identified_names: info.product_names,
            product_names,
            dimensions,
            all_image_urls: image_urls,
            best_image: BestImage {
                image_url: ranking.best_image_url,
                reasoning: ranking.reasoning,
            },
            scores: ranking.scores,
            bot_wall: analysis.bot_wall,
            generated_at: Utc::now(),
        })
    }

    /// Select the best image and download it to `out_path` as PNG.
    pub async fn run_with_image(
        &self,
        url: &str,
        out_path: &Path,
    ) -> Result<(ProductReport, PathBuf), String> {
        let report = self.select_best_image(url).await?;
        let saved = self.save_report_image(&report, out_path).await?;
        Ok((report, saved))
    }

    /// Download the report's best image to `out_path` as PNG.
    pub async fn save_report_image(&self, report: &ProductReport, out_path: &Path) -> Result<PathBuf, String> {
        let image_url = report.best_image.image_url.as_deref().ok_or_else(|| {
            format!(
                "No best image found for '{}': {}",
                report.url, report.best_image.reasoning
            )
        })?;

        let (saved, _) = save_best_image(image_url, out_path, &self.http).await?;
        Ok(saved)
    }

    /// Segmentation target and negative prompt for the product at `url`.
    /// The best image is saved to `output_dir/best_image.png` on the way.
    pub async fn build_prompt(&self, url: &str) -> Result<PromptResult, String> {
        let report = self.select_best_image(url).await?;
        self.prompt_for_report(&report).await
    }

    pub async fn prompt_for_report(&self, report: &ProductReport) -> Result<PromptResult, String> {
        let target_object = pick_target_object(&report.identified_names);

        let Some(image_url) = report.best_image.image_url.clone() else {
            info!("No best image for '{}', negative prompt left empty", report.url);
            return Ok(PromptResult {
                target_object,
                negative_prompt: String::new(),
                best_image_url: None,
            });
        };

        let out_path = self.settings.output_dir.join(BEST_IMAGE_FILE);
        let (_, bytes) = save_best_image(&image_url, &out_path, &self.http).await?;
        let negative_prompt =
            generate_negative_prompt(&target_object, &report.product_names, &bytes, &self.backend).await?;

        Ok(PromptResult {
            target_object,
            negative_prompt,
            best_image_url: Some(image_url),
        })
    }

    async fn cached_report(&self, url: &str) -> Option<ProductReport> {
        let db_path = self.cache_db.clone()?;
        let key = url.to_string();
        let cached = tokio::task::spawn_blocking(move || ProductCache::new(&db_path)?.get(&key))
            .await
            .map_err(|e| format!("Cache task panicked: {}", e));

        match cached {
            Ok(Ok(Some(report))) => {
                info!("Cache hit for '{}', returning cached report", url);
                Some(report)
            }
            Ok(Ok(None)) => {
                info!("Cache miss for '{}', running the full pipeline", url);
                None
            }
            Ok(Err(e)) | Err(e) => {
                warn!("Cache lookup failed for '{}': {}, proceeding without cache", url, e);
                None
            }
        }
    }

    async fn store_report(&self, url: &str, report: &ProductReport) {
        let Some(db_path) = self.cache_db.clone() else {
            return;
        };
        let key = url.to_string();
        let to_store = report.clone();
        let ttl_days = self.settings.cache_ttl_days;

        let stored = tokio::task::spawn_blocking(move || {
            ProductCache::new(&db_path)?.put(&key, &to_store, ttl_days)
        })
        .await
        .map_err(|e| format!("Cache task panicked: {}", e));

        if let Err(e) = stored.and_then(|r| r) {
            warn!("Failed to cache report for '{}': {}", url, e);
        }
    }
}

/// Open the cache at `db_path` and drop expired (or, with `all`, every) entry.
pub async fn clear_cache(db_path: PathBuf, all: bool) -> Result<usize, String> {
    tokio::task::spawn_blocking(move || {
        let cache = ProductCache::new(&db_path)?;
        if all {
            cache.clear_all()
        } else {
            cache.clear_expired()
        }
    })
    .await
    .map_err(|e| format!("Cache task panicked: {}", e))?
}
