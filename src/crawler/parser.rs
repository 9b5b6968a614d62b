use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::crawler::models::{
    Cell, CellRole, FieldTable, ListingFields, ListingRecord, ListingReference,
};

const LD_JSON: &str = r#"script[type="application/ld+json"]"#;
const GALLERY_ANCHOR: &str = "a.mainContents_gallery-colorbox";
const PRELOAD_IMAGE: &str = r#"link[rel="preload"][as="image"]"#;
const ESTATE_ID: &str = "td.estateID";

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

/// Detail-page URLs from the catalog's structured-data blocks, at most `max_items`.
/// A block that fails to parse is skipped; the remaining blocks are still scanned.
pub fn extract_item_links(html: &str, max_items: usize) -> Vec<ListingReference> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for script in document.select(&selector(LD_JSON)) {
        if links.len() >= max_items {
            break;
        }

        let text = script.text().collect::<String>();
        if !text.contains("ItemList") {
            continue;
        }

        let data: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "Skipping malformed structured-data block");
                continue;
            }
        };

        let Some(items) = data.get("itemListElement").and_then(Value::as_array) else {
            continue;
        };

        for item in items {
            if links.len() >= max_items {
                break;
            }
            if let Some(url) = item_url(item) {
                links.push(ListingReference::new(url));
            }
        }
    }

    links
}

fn item_url(item: &Value) -> Option<&str> {
    let url = match item.get("item")? {
        Value::String(s) => Some(s.as_str()),
        obj @ Value::Object(_) => obj
            .get("@id")
            .or_else(|| obj.get("url"))
            .and_then(Value::as_str),
        _ => None,
    };
    url.filter(|s| !s.trim().is_empty())
}

/// Pair each header with the nearest following value that comes before the
/// next header. Unpaired headers produce no entry.
pub fn parse_field_table(cells: &[Cell]) -> FieldTable {
    let mut table = FieldTable::new();
    let mut pending: Option<&str> = None;

    for cell in cells {
        match cell.role {
            CellRole::Header => pending = Some(cell.text.trim()),
            CellRole::Value => {
                if let Some(key) = pending.take() {
                    table.insert(key.to_string(), cell.text.trim().to_string());
                }
            }
        }
    }

    table
}

/// `th`/`td` cells of the first table in the document, in document order.
pub fn table_cells(document: &Html) -> Vec<Cell> {
    let Some(table) = document.select(&selector("table")).next() else {
        return Vec::new();
    };

    table
        .select(&selector("th, td"))
        .map(|el| {
            let text = element_text(&el);
            match el.value().name() {
                "th" => Cell::header(text),
                _ => Cell::value(text),
            }
        })
        .collect()
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Build the fixed-shape record for one detail page. Images are attached later.
pub fn extract_record(document: &Html, source_url: &str) -> ListingRecord {
    let id = document
        .select(&selector(ESTATE_ID))
        .next()
        .map(|el| element_text(&el))
        .unwrap_or_default();

    let table = parse_field_table(&table_cells(document));

    ListingRecord {
        id,
        fields: ListingFields::project(&table),
        source_url: source_url.to_string(),
        ..Default::default()
    }
}

/// Raw image hrefs for a listing. Gallery anchors win outright; preload links
/// are only consulted when the gallery is empty and an id is known.
pub fn image_candidates(document: &Html, listing_id: &str) -> Vec<String> {
    let gallery: Vec<String> = document
        .select(&selector(GALLERY_ANCHOR))
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .collect();

    if !gallery.is_empty() || listing_id.is_empty() {
        return gallery;
    }

    document
        .select(&selector(PRELOAD_IMAGE))
        .filter_map(|link| link.value().attr("href"))
        .filter(|href| href.contains(listing_id) && href.to_lowercase().contains("exterior"))
        .map(str::to_string)
        .collect()
}

/// Everything the pipeline needs from one detail page.
#[derive(Debug, Clone)]
pub struct DetailPage {
    pub record: ListingRecord,
    pub image_candidates: Vec<String>,
}

pub fn parse_detail_page(html: &str, source_url: &str) -> DetailPage {
    let document = Html::parse_document(html);
    let record = extract_record(&document, source_url);
    let image_candidates = if record.id.is_empty() {
        Vec::new()
    } else {
        image_candidates(&document, &record.id)
    };

    DetailPage { record, image_candidates }
}
