//! JSON-LD extraction from result and detail pages.

use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use crate::models::{ListingRecord, ListingReference};
use crate::utils::error::{AppError, Result};

const RESULT_LIST_SELECTOR: &str =
    r#"script[type="application/ld+json"][data-hid="result-list-metadata"]"#;
const LD_JSON_SELECTOR: &str = r#"script[type="application/ld+json"]"#;

const LISTING_TYPES: &[&str] = &[
    "Product",
    "Residence",
    "SingleFamilyResidence",
    "House",
    "Apartment",
    "Accommodation",
    "RealEstateListing",
];

#[derive(Debug, Clone, PartialEq)]
pub struct PageExtraction {
    pub refs: Vec<ListingReference>,
    pub is_end_of_results: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultList {
    #[serde(default)]
    item_list_element: Vec<SearchResultItem>,
}

#[derive(Debug, Deserialize)]
struct SearchResultItem {
    #[serde(default)]
    position: i64,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LdListing {
    name: String,
    url: String,
    description: String,
    address: LdAddress,
    offers: LdOffers,
    image: Value,
    photo: Vec<LdPhoto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LdAddress {
    street_address: String,
    address_locality: String,
    address_region: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LdOffers {
    price_currency: String,
    price: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LdPhoto {
    content_url: String,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::Internal(format!("invalid selector {}: {}", css, e)))
}

/// Pull listing references out of one search-result page.
///
/// A page without the result-list block, or with an empty list, marks the end
/// of the results. A block that is present but cannot be parsed is an error.
pub fn extract_page(html: &str) -> Result<PageExtraction> {
    let document = Html::parse_document(html);
    let selector = selector(RESULT_LIST_SELECTOR)?;

    // Pages may split the list over several blocks; their items are concatenated
    let mut refs = Vec::new();
    for block in document.select(&selector) {
        let text: String = block.text().collect();
        let list: SearchResultList = serde_json::from_str(text.trim())
            .map_err(|e| AppError::Extraction(format!("malformed result list: {}", e)))?;

        refs.extend(
            list.item_list_element
                .into_iter()
                .filter(|item| !item.url.is_empty())
                .map(|item| ListingReference {
                    url: item.url,
                    position: item.position,
                }),
        );
    }

    Ok(PageExtraction {
        is_end_of_results: refs.is_empty(),
        refs,
    })
}

/// Build a listing from the JSON-LD block of a detail page that describes the
/// property itself.
///
/// Detail pages also carry `Organization`, `WebSite` and `BreadcrumbList`
/// blocks. Only a block with an offer, an address or a dwelling `@type`
/// counts as the listing, whatever its position on the page.
pub fn extract_detail(html: &str) -> Result<ListingRecord> {
    let document = Html::parse_document(html);
    let selector = selector(LD_JSON_SELECTOR)?;

    for block in document.select(&selector) {
        let text: String = block.text().collect();
        let value = match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("Skipping JSON-LD block: {}", e);
                continue;
            }
        };

        let Some(node) = ld_nodes(&value).into_iter().find(|node| is_listing_node(node)) else {
            continue;
        };

        let listing = LdListing::deserialize(node)
            .map_err(|e| AppError::Extraction(format!("malformed listing data: {}", e)))?;
        return Ok(into_record(listing));
    }

    Err(AppError::Extraction(
        "no listing data found on detail page".to_string(),
    ))
}

/// Top-level objects of a block, looking into arrays and `@graph`.
fn ld_nodes(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().flat_map(ld_nodes).collect(),
        Value::Object(map) => match map.get("@graph") {
            Some(graph) => ld_nodes(graph),
            None => vec![value],
        },
        _ => Vec::new(),
    }
}

fn is_listing_node(node: &Value) -> bool {
    let has = |key: &str| node.get(key).is_some_and(|v| !v.is_null());
    if has("offers") || has("address") {
        return true;
    }

    match node.get("@type") {
        Some(Value::String(kind)) => LISTING_TYPES.contains(&kind.as_str()),
        Some(Value::Array(kinds)) => kinds
            .iter()
            .filter_map(Value::as_str)
            .any(|kind| LISTING_TYPES.contains(&kind)),
        _ => false,
    }
}

fn into_record(listing: LdListing) -> ListingRecord {
    let image_url = image_url(&listing.image)
        .or_else(|| {
            listing
                .photo
                .iter()
                .map(|p| p.content_url.clone())
                .find(|u| !u.is_empty())
        })
        .unwrap_or_default();

    ListingRecord {
        url: listing.url,
        name: listing.name,
        description: listing.description,
        street: listing.address.street_address,
        locality: listing.address.address_locality,
        region: listing.address.address_region,
        price_currency: listing.offers.price_currency,
        price: price(&listing.offers.price),
        image_url,
        ..Default::default()
    }
}

fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(image_url),
        Value::Object(map) => map
            .get("contentUrl")
            .or_else(|| map.get("url"))
            .and_then(image_url),
        _ => None,
    }
}

fn price(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    }
}
