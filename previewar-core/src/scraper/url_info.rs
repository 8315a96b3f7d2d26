use serde_json::{json, Value};
use tracing::{info, warn};
use url::{Host, Url};

use super::http_client::ScraperHttpClient;
use super::types::ProductInfo;
use crate::llm::{parse_json_reply, ChatBackend, ChatMessage, ChatRequest};

/// Guess a retailer name from the URL's domain. Only a hint for the model.
pub fn domain_to_brand(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = match parsed.host()? {
        Host::Domain(domain) => domain.to_lowercase(),
        Host::Ipv4(_) | Host::Ipv6(_) => return None,
    };

    // Registrable domain per the public suffix list, e.g. amazon.com.be
    let domain = psl::domain_str(host.trim_end_matches('.'))?;
    let registrable = domain.split('.').next()?;

    let spaced = registrable.replace(|c: char| c == '-' || c == '_', " ");
    let words: Vec<&str> = spaced.split_whitespace().collect();
    let brand = match words.as_slice() {
        [] => return None,
        [single] => capitalize(single),
        many => many.iter().map(|w| capitalize(w)).collect::<Vec<_>>().join(" "),
    };

    let fixed = match brand.as_str() {
        "Ikea" => "IKEA".to_string(),
        "Ebay" => "eBay".to_string(),
        "Best buy" | "Bestbuy" => "Best Buy".to_string(),
        "Crateandbarrel" => "Crate & Barrel".to_string(),
        _ => brand,
    };
    Some(fixed)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `<title>` text with whitespace collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let selector = scraper::Selector::parse("title").ok()?;
    let document = scraper::Html::parse_document(html);
    let raw: String = document.select(&selector).next()?.text().collect();
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

pub fn build_identify_prompt(
    url: &str,
    hostname: &str,
    brand_hint: Option<&str>,
    title: Option<&str>,
) -> String {
    let context = json!({
        "url": url,
        "hostname": hostname,
        "brand_hint_from_domain": brand_hint.unwrap_or(""),
        "page_title": title.unwrap_or(""),
        "instructions": concat!(
            "Identify the e-commerce company/retailer hosting this product page ",
            "and the names for the product being sold on the url page. ",
            "For example, names can be: sectional, couch, table, bed, chair, lamp, etc. ",
            "Output the information as a JSON object in the following format: ",
            "{ \"company_name\": str, \"product_name\": list of str }"
        ),
    });
    context.to_string()
}

fn identify_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "company_name": {"type": "string"},
            "product_name": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["company_name", "product_name"],
        "additionalProperties": false
    })
}

/// Parse the identify reply. `product_name` may be a single string or a list.
pub fn parse_product_info(reply: &str) -> Result<ProductInfo, String> {
    let value = parse_json_reply(reply)?;
    let obj = value
        .as_object()
        .ok_or_else(|| "Model did not return a JSON object for product info".to_string())?;

    let company_name = obj
        .get("company_name")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| "Model did not return the expected field 'company_name'".to_string())?;

    let product_names = match obj.get("product_name") {
        Some(Value::String(name)) => vec![name.clone()],
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        _ => return Err("Model did not return the expected field 'product_name'".to_string()),
    };
    let product_names = product_names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();

    Ok(ProductInfo {
        company_name,
        product_names,
    })
}

/// Ask the model who sells the product at `url` and what it is, given an
/// already fetched page title.
pub async fn identify_with_title<B: ChatBackend>(
    url: &str,
    title: Option<&str>,
    backend: &B,
) -> Result<ProductInfo, String> {
    let hostname = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    let brand_hint = domain_to_brand(url);

    let prompt = build_identify_prompt(url, &hostname, brand_hint.as_deref(), title);
    let request = ChatRequest::new(None, vec![ChatMessage::user(prompt)])
        .with_schema("product_info", identify_schema());

    let reply = backend.complete(&request).await?;
    let info = parse_product_info(&reply)?;
    info!(
        "Identified '{}' selling {:?} at {}",
        info.company_name, info.product_names, url
    );
    Ok(info)
}

/// Fetch the page title (best effort) and identify the product.
pub async fn identify_product<B: ChatBackend>(
    url: &str,
    http: &ScraperHttpClient,
    backend: &B,
) -> Result<ProductInfo, String> {
    let title = match http.fetch_page(url).await {
        Ok(html) => extract_title(&html),
        Err(e) => {
            warn!("Could not fetch title for {}: {}", url, e);
            None
        }
    };
    identify_with_title(url, title.as_deref(), backend).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;

    #[test]
    fn test_domain_to_brand_fixes() {
        assert_eq!(domain_to_brand("https://www.ikea.com/us/en/p/x").as_deref(), Some("IKEA"));
        assert_eq!(domain_to_brand("https://www.ebay.com/itm/1").as_deref(), Some("eBay"));
        assert_eq!(domain_to_brand("https://www.bestbuy.com/site/x").as_deref(), Some("Best Buy"));
        assert_eq!(
            domain_to_brand("https://www.crateandbarrel.com/sofa").as_deref(),
            Some("Crate & Barrel")
        );
        assert_eq!(domain_to_brand("https://smile.amazon.com/dp/B0").as_deref(), Some("Amazon"));
    }

    #[test]
    fn test_domain_to_brand_multi_part_suffix_and_hyphens() {
        assert_eq!(domain_to_brand("https://www.amazon.co.uk/dp/B0").as_deref(), Some("Amazon"));
        assert_eq!(
            domain_to_brand("https://shop.pottery-barn.com.au/x").as_deref(),
            Some("Pottery Barn")
        );
        assert_eq!(domain_to_brand("https://WAYFAIR.com/").as_deref(), Some("Wayfair"));
    }

    #[test]
    fn test_domain_to_brand_country_suffixes() {
        assert_eq!(domain_to_brand("https://www.amazon.com.be/dp/B0").as_deref(), Some("Amazon"));
        assert_eq!(domain_to_brand("https://www.takealot.co.za/p/1").as_deref(), Some("Takealot"));
        assert_eq!(domain_to_brand("https://www.amazon.com.mx/dp/B0").as_deref(), Some("Amazon"));
        assert_eq!(domain_to_brand("https://www.ikea.com.tw/zh/p").as_deref(), Some("IKEA"));
        assert_eq!(domain_to_brand("https://www.amazon.de./dp/B0").as_deref(), Some("Amazon"));
    }

    #[test]
    fn test_domain_to_brand_rejects_ip_and_garbage() {
        assert_eq!(domain_to_brand("http://192.168.1.10/product"), None);
        assert_eq!(domain_to_brand("not a url"), None);
        assert_eq!(domain_to_brand("https://localhost/"), None);
    }

    #[test]
    fn test_extract_title_collapses_whitespace() {
        let html = "<html><head><title>\n  UPPLAND Sofa,\n\t Blekinge white  | IKEA </title></head></html>";
        assert_eq!(extract_title(html).as_deref(), Some("UPPLAND Sofa, Blekinge white | IKEA"));
        assert_eq!(extract_title("<title>   </title>"), None);
        assert_eq!(extract_title("<p>no title</p>"), None);
    }

    #[test]
    fn test_build_identify_prompt_is_json_context() {
        let prompt = build_identify_prompt(
            "https://www.ikea.com/p/1",
            "www.ikea.com",
            Some("IKEA"),
            None,
        );
        let value: Value = serde_json::from_str(&prompt).unwrap();
        assert_eq!(value["hostname"], "www.ikea.com");
        assert_eq!(value["brand_hint_from_domain"], "IKEA");
        assert_eq!(value["page_title"], "");
        assert!(value["instructions"].as_str().unwrap().contains("company_name"));
    }

    #[test]
    fn test_parse_product_info_list_and_string() {
        let info = parse_product_info(r#"{"company_name": " Amazon ", "product_name": ["sectional", " ", "couch"]}"#).unwrap();
        assert_eq!(info.company_name, "Amazon");
        assert_eq!(info.product_names, vec!["sectional", "couch"]);

        let info = parse_product_info("```json\n{\"company_name\": \"IKEA\", \"product_name\": \"sofa\"}\n```").unwrap();
        assert_eq!(info.product_names, vec!["sofa"]);
    }

    #[test]
    fn test_parse_product_info_missing_fields() {
        let err = parse_product_info(r#"{"company_name": "IKEA"}"#).unwrap_err();
        assert!(err.contains("product_name"));
        let err = parse_product_info(r#"{"product_name": []}"#).unwrap_err();
        assert!(err.contains("company_name"));
        assert!(parse_product_info("[]").is_err());
    }

    #[tokio::test]
    async fn test_identify_with_title_sends_context() {
        let backend = ScriptedBackend::replying(r#"{"company_name": "IKEA", "product_name": ["sofa", "couch"]}"#);
        let info = identify_with_title("https://www.ikea.com/us/en/p/uppland", Some("UPPLAND Sofa"), &backend)
            .await
            .unwrap();

        assert_eq!(info.company_name, "IKEA");
        assert_eq!(backend.call_count(), 1);
        let prompt = backend.last_prompt();
        assert!(prompt.contains("UPPLAND Sofa"));
        assert!(prompt.contains("\"brand_hint_from_domain\":\"IKEA\""));
        let request = backend.requests.lock().unwrap()[0].clone();
        assert_eq!(request.json_schema.unwrap().0, "product_info");
    }

    #[tokio::test]
    async fn test_identify_propagates_backend_error() {
        let backend = ScriptedBackend::new(vec![Err("LLM API error: 401".to_string())]);
        let err = identify_with_title("https://www.ikea.com/p", None, &backend).await.unwrap_err();
        assert!(err.contains("401"));
    }
}
