//! Polite HTTP access to retailer sites: robots.txt, per-host pacing and
//! retries on throttling responses.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::StatusCode;
use texting_robots::{get_robots_url, Robot};
use tracing::{info, warn};
use url::Url;

/// Name matched against robots.txt `User-agent` groups.
pub const ROBOTS_AGENT: &str = "PreviewAR/1.0";

/// Retail sites commonly serve 403s to non-browser user agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Wrap width for the plain-text fallback of a page.
const TEXT_WIDTH: usize = 120;
const MAX_RETRIES: u32 = 2;
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const ROBOTS_TTL: Duration = Duration::from_secs(60 * 60);
const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn host_key(url: &str) -> Result<String, String> {
    let parsed = Url::parse(url).map_err(|e| format!("Invalid URL '{}': {}", url, e))?;
    parsed
        .host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| format!("URL '{}' has no host", url))
}

/// Spaces out requests to the same host. Different hosts never wait on
/// each other.
pub struct HostThrottle {
    gap: Duration,
    last_seen: Mutex<HashMap<String, Instant>>,
}

impl HostThrottle {
    /// A non-positive rate falls back to one request per second.
    pub fn per_second(rate: f64) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        Self {
            gap: Duration::from_secs_f64(1.0 / rate),
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn gap(&self) -> Duration {
        self.gap
    }

    /// Sleep until `url`'s host may be contacted again. `crawl_delay` wins
    /// over the configured gap when it is longer.
    pub async fn pace(&self, url: &str, crawl_delay: Option<Duration>) -> Result<(), String> {
        let host = host_key(url)?;
        let gap = crawl_delay.map_or(self.gap, |d| d.max(self.gap));

        let wait = guard(&self.last_seen)
            .get(&host)
            .map(|last| gap.saturating_sub(last.elapsed()))
            .filter(|w| !w.is_zero());
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }

        guard(&self.last_seen).insert(host, Instant::now());
        Ok(())
    }
}

/// Parsed robots.txt for one host.
struct RobotsEntry {
    robot: Robot,
    crawl_delay: Option<Duration>,
    fetched_at: Instant,
}

impl RobotsEntry {
    fn parse(body: &[u8]) -> Result<Self, String> {
        let robot = Robot::new(ROBOTS_AGENT, body).map_err(|e| format!("Invalid robots.txt: {}", e))?;
        Ok(Self {
            crawl_delay: robot.delay.map(Duration::from_secs_f32),
            robot,
            fetched_at: Instant::now(),
        })
    }

    fn permissive() -> Result<Self, String> {
        Self::parse(b"")
    }

    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < ROBOTS_TTL
    }
}

/// Verdict for one URL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotsVerdict {
    pub allowed: bool,
    pub crawl_delay: Option<Duration>,
}

/// robots.txt lookups, cached per host for an hour. A robots.txt that cannot
/// be fetched or parsed allows everything.
#[derive(Default)]
pub struct RobotsPolicy {
    entries: Mutex<HashMap<String, RobotsEntry>>,
}

impl RobotsPolicy {
    pub async fn verdict(&self, client: &reqwest::Client, url: &str) -> Result<RobotsVerdict, String> {
        let host = host_key(url)?;

        if let Some(entry) = guard(&self.entries).get(&host).filter(|e| e.is_fresh()) {
            return Ok(verdict_for(entry, url));
        }

        let robots_url =
            get_robots_url(url).map_err(|e| format!("No robots.txt location for '{}': {}", url, e))?;
        let entry = match fetch_robots(client, &robots_url).await {
            Ok(body) => RobotsEntry::parse(&body).or_else(|e| {
                warn!("{} for {}, treating every path as allowed", e, host);
                RobotsEntry::permissive()
            })?,
            Err(e) => {
                info!("{}, treating every path on {} as allowed", e, host);
                RobotsEntry::permissive()?
            }
        };

        let verdict = verdict_for(&entry, url);
        guard(&self.entries).insert(host, entry);
        Ok(verdict)
    }
}

fn verdict_for(entry: &RobotsEntry, url: &str) -> RobotsVerdict {
    RobotsVerdict {
        allowed: entry.robot.allowed(url),
        crawl_delay: entry.crawl_delay,
    }
}

async fn fetch_robots(client: &reqwest::Client, robots_url: &str) -> Result<Vec<u8>, String> {
    info!("Fetching {}", robots_url);
    let response = client
        .get(robots_url)
        .timeout(ROBOTS_TIMEOUT)
        .send()
        .await
        .map_err(|e| format!("Could not fetch {}: {}", robots_url, e))?;

    if !response.status().is_success() {
        return Err(format!("{} answered {}", robots_url, response.status()));
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| format!("Could not read {}: {}", robots_url, e))?;
    Ok(body.to_vec())
}

/// Options for [`ScraperHttpClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub requests_per_second: f64,
    pub respect_robots: bool,
    pub timeout: Duration,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    pub use_system_proxy: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            respect_robots: true,
            timeout: Duration::from_secs(30),
            use_system_proxy: true,
        }
    }
}

/// HTTP client for product pages and product images.
pub struct ScraperHttpClient {
    client: reqwest::Client,
    throttle: HostThrottle,
    robots: Option<RobotsPolicy>,
}

impl ScraperHttpClient {
    pub fn new(options: &ClientOptions) -> Result<Self, String> {
        let mut builder = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::limited(10));
        if !options.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            throttle: HostThrottle::per_second(options.requests_per_second),
            robots: options.respect_robots.then(RobotsPolicy::default),
        })
    }

    /// Fetch a product page as text. Fails when robots.txt disallows the
    /// URL (unless robots checks are off) or after retries run out.
    pub async fn fetch_page(&self, url: &str) -> Result<String, String> {
        let mut crawl_delay = None;
        if let Some(robots) = &self.robots {
            let verdict = robots.verdict(&self.client, url).await?;
            if !verdict.allowed {
                return Err(format!("robots.txt disallows fetching '{}'", url));
            }
            crawl_delay = verdict.crawl_delay;
        }

        self.throttle.pace(url, crawl_delay).await?;
        info!("Fetching page '{}'", url);
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| format!("Failed to read page body from '{}': {}", url, e))
    }

    /// Download raw bytes such as images. Paced, but robots.txt is not
    /// consulted since image CDNs are not crawled.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, String> {
        self.throttle.pace(url, None).await?;
        info!("Downloading '{}'", url);
        let body = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| format!("Failed to read download from '{}': {}", url, e))?;
        Ok(body.to_vec())
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, String> {
        for attempt in 0..=MAX_RETRIES {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| format!("Request to '{}' failed: {}", url, e))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if !should_retry(status) || attempt == MAX_RETRIES {
                return Err(format!(
                    "'{}' answered HTTP {} {}",
                    url,
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                ));
            }

            let delay = backoff(attempt);
            warn!(
                "'{}' answered HTTP {}, retry {}/{} in {:?}",
                url,
                status.as_u16(),
                attempt + 1,
                MAX_RETRIES,
                delay
            );
            tokio::time::sleep(delay).await;
        }
        Err(format!("Gave up on '{}'", url))
    }

    /// Plain-text rendering of a page for when tag filtering leaves nothing.
    pub fn html_to_text(html: &str) -> String {
        html2text::from_read(html.as_bytes(), TEXT_WIDTH).unwrap_or_else(|e| {
            warn!("Could not render page as text ({}), using raw HTML", e);
            html.to_string()
        })
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Doubling delay plus up to half of it again as jitter.
fn backoff(attempt: u32) -> Duration {
    let base = BACKOFF_BASE * 2u32.pow(attempt);
    let jitter_ms = rand::rng().random_range(0..=base.as_millis() as u64 / 2);
    base + Duration::from_millis(jitter_ms)
}
