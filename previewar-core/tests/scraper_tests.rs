mod common;

use common::{local_client, read_fixture, FakeBackend, ScriptedServer};
use previewar_core::scraper::bot_wall::{detect_bot_wall, BotWall};
use previewar_core::scraper::page_filter::{collect_image_urls, filter_product_html};
use previewar_core::scraper::url_info::{domain_to_brand, extract_title};
use previewar_core::scraper::{analyze_page, identify_product};

const AMAZON_URL: &str = "https://www.amazon.com/Modular-Sectional/dp/B0F7F1XPCG";
const IKEA_URL: &str = "https://www.ikea.com/us/en/p/uppland-sofa-blekinge-white-s19384116/";

#[test]
fn test_amazon_filter_keeps_specs_and_images() {
    let html = read_fixture("amazon_product.html");
    let filtered = filter_product_html(&html, Some("Amazon"));

    assert!(filtered.contains(r#"<span id="productTitle">"#));
    assert!(filtered.contains("Overall dimensions: 112\"W x 56\"D x 33\"H"));
    assert!(filtered.contains("<td>56\"D x 112\"W x 33\"H</td>"));
    assert!(filtered.contains("71main._AC_SL1500_.jpg"));
    // Bullets are only kept through their spans outside IKEA
    assert!(!filtered.contains("<li>"));
    assert!(!filtered.contains("window.ue_t0"));
    assert!(!filtered.contains("Today's Deals"));
}

#[test]
fn test_amazon_image_urls_prefer_hires() {
    let html = read_fixture("amazon_product.html");
    let urls = collect_image_urls(&html, AMAZON_URL);

    assert_eq!(
        urls,
        vec![
            "https://m.media-amazon.com/images/I/71og-main._AC_SL1500_.jpg",
            "https://m.media-amazon.com/images/I/71main._AC_SL1500_.jpg",
            "https://m.media-amazon.com/images/I/81side._AC_SL1500_.jpg",
            "https://m.media-amazon.com/images/I/91dims._AC_US40_.jpg",
        ]
    );
}

#[test]
fn test_ikea_filter_keeps_measurement_bullets() {
    let html = read_fixture("ikea_product.html");
    let filtered = filter_product_html(&html, Some("IKEA"));

    assert!(filtered.contains("<li>Width: 91 3/8 \"</li>"));
    assert!(filtered.contains("<li>Height: 33 1/2 \"</li>"));

    let without_li = filter_product_html(&html, Some("Target"));
    assert!(!without_li.contains("Width: 91 3/8"));
}

#[test]
fn test_ikea_image_urls_resolve_relative_and_srcset() {
    let html = read_fixture("ikea_product.html");
    let urls = collect_image_urls(&html, IKEA_URL);

    assert_eq!(urls.len(), 2);
    assert!(urls[0].ends_with("?f=xl"), "widest srcset entry expected, got {}", urls[0]);
    assert_eq!(
        urls[1],
        "https://www.ikea.com/us/en/images/products/uppland-sofa-blekinge-white__0818566_pe774490_s5.jpg"
    );
}

#[test]
fn test_titles_and_brands_from_fixtures() {
    assert_eq!(
        extract_title(&read_fixture("ikea_product.html")).as_deref(),
        Some("UPPLAND Sofa, Blekinge white - IKEA")
    );
    assert_eq!(domain_to_brand(IKEA_URL).as_deref(), Some("IKEA"));
    assert_eq!(domain_to_brand(AMAZON_URL).as_deref(), Some("Amazon"));
}

#[test]
fn test_bot_walls_in_fixtures() {
    assert_eq!(detect_bot_wall(&read_fixture("amazon_product.html")), None);
    assert_eq!(detect_bot_wall(&read_fixture("ikea_product.html")), None);
    assert_eq!(
        detect_bot_wall(&read_fixture("amazon_safeguard.html")),
        Some(BotWall::AmazonSafeguard)
    );
    assert_eq!(
        detect_bot_wall(&read_fixture("wayfair_press_hold.html")),
        Some(BotWall::PressAndHold)
    );
}

#[tokio::test]
async fn test_analyze_amazon_page() {
    let html = read_fixture("amazon_product.html");
    let backend = FakeBackend::new(&[r#"{
        "potential_dimension_values": ["112 in W x 56 in D x 33 in H", "60 x 40 x 30 in (package)"],
        "image_urls": ["https://m.media-amazon.com/images/I/71main._AC_SL1500_.jpg"]
    }"#]);

    let analysis = analyze_page(&html, AMAZON_URL, Some("Amazon"), &backend).await.unwrap();

    assert_eq!(analysis.potential_dimension_values.len(), 2);
    // Model URL first, then markup URLs it missed
    assert_eq!(analysis.image_urls[0], "https://m.media-amazon.com/images/I/71main._AC_SL1500_.jpg");
    assert_eq!(analysis.image_urls.len(), 4);
    assert_eq!(analysis.bot_wall, None);

    let prompt = &backend.prompts()[0];
    assert!(prompt.contains(&format!("Page URL: {}", AMAZON_URL)));
    assert!(prompt.contains("60 x 40 x 30 inches"));
    assert!(!prompt.contains("<th>"));
}

#[tokio::test]
async fn test_analyze_bot_wall_page_reports_wall() {
    let html = read_fixture("amazon_safeguard.html");
    let backend = FakeBackend::new(&[r#"{"potential_dimension_values": [], "image_urls": []}"#]);

    let analysis = analyze_page(&html, AMAZON_URL, Some("Amazon"), &backend).await.unwrap();

    assert_eq!(analysis.bot_wall, Some(BotWall::AmazonSafeguard));
    assert!(analysis.image_urls.is_empty());
    assert!(analysis.potential_dimension_values.is_empty());
}

#[tokio::test]
async fn test_fetch_page_retries_unavailable_then_succeeds() {
    let server = ScriptedServer::start(&[("/p", &[(503, ""), (503, ""), (200, "<title>Sofa</title>")])]).await;
    let http = local_client(false);

    let html = http.fetch_page(&server.url("/p")).await.unwrap();
    assert_eq!(html, "<title>Sofa</title>");
    assert_eq!(server.hits("/p"), 3);
}

#[tokio::test]
async fn test_fetch_page_retries_too_many_requests() {
    let server = ScriptedServer::start(&[("/p", &[(429, "slow down"), (200, "ok")])]).await;
    let http = local_client(false);

    assert_eq!(http.fetch_page(&server.url("/p")).await.unwrap(), "ok");
    assert_eq!(server.hits("/p"), 2);
}

#[tokio::test]
async fn test_fetch_page_forbidden_is_not_retried() {
    let server = ScriptedServer::start(&[("/p", &[(403, "denied"), (200, "ok")])]).await;
    let http = local_client(false);

    let err = http.fetch_page(&server.url("/p")).await.unwrap_err();
    assert!(err.contains("HTTP 403"), "{}", err);
    assert_eq!(server.hits("/p"), 1);
}

#[tokio::test]
async fn test_fetch_page_gives_up_after_two_retries() {
    let server = ScriptedServer::start(&[("/p", &[(500, "")])]).await;
    let http = local_client(false);

    let err = http.fetch_page(&server.url("/p")).await.unwrap_err();
    assert!(err.contains("HTTP 500"), "{}", err);
    assert_eq!(server.hits("/p"), 3);
}

#[tokio::test]
async fn test_robots_disallow_blocks_pages_but_not_images() {
    let server = ScriptedServer::start(&[
        ("/robots.txt", &[(200, "User-agent: *\nDisallow: /private/\n")]),
        ("/private/p", &[(200, "secret")]),
        ("/public/p", &[(200, "public")]),
        ("/private/img.jpg", &[(200, "bytes")]),
    ])
    .await;
    let http = local_client(true);

    let err = http.fetch_page(&server.url("/private/p")).await.unwrap_err();
    assert!(err.contains("robots.txt disallows"), "{}", err);
    assert_eq!(server.hits("/private/p"), 0);

    assert_eq!(http.fetch_page(&server.url("/public/p")).await.unwrap(), "public");
    assert_eq!(http.fetch_bytes(&server.url("/private/img.jpg")).await.unwrap(), b"bytes");
    // robots.txt is fetched once per host
    assert_eq!(server.hits("/robots.txt"), 1);
}

#[tokio::test]
async fn test_missing_robots_allows_everything() {
    let server = ScriptedServer::start(&[("/p", &[(200, "page")])]).await;
    let http = local_client(true);

    assert_eq!(http.fetch_page(&server.url("/p")).await.unwrap(), "page");
    assert_eq!(server.hits("/robots.txt"), 1);
}

#[tokio::test]
async fn test_robots_ignored_when_disabled() {
    let server = ScriptedServer::start(&[
        ("/robots.txt", &[(200, "User-agent: *\nDisallow: /\n")]),
        ("/p", &[(200, "page")]),
    ])
    .await;
    let http = local_client(false);

    assert_eq!(http.fetch_page(&server.url("/p")).await.unwrap(), "page");
    assert_eq!(server.hits("/robots.txt"), 0);
}

#[tokio::test]
async fn test_identify_survives_missing_page() {
    let server = ScriptedServer::start(&[]).await;
    let http = local_client(true);
    let backend = FakeBackend::new(&[r#"{"company_name": "Shop", "product_name": ["lamp"]}"#]);

    let info = identify_product(&server.url("/gone"), &http, &backend).await.unwrap();
    assert_eq!(info.company_name, "Shop");
    assert_eq!(info.product_names, vec!["lamp"]);
    assert_eq!(server.hits("/gone"), 1);
    assert!(backend.prompts()[0].contains(r#""page_title":"""#));
}
