use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A detail-page URL as found on the catalog page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingReference {
    pub url: String,
}

impl ListingReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Trailing path segment of the URL. Only used for the pre-fetch skip check.
    pub fn id(&self) -> &str {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRole {
    Header,
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub role: CellRole,
    pub text: String,
}

impl Cell {
    pub fn header(text: impl Into<String>) -> Self {
        Self { role: CellRole::Header, text: text.into() }
    }

    pub fn value(text: impl Into<String>) -> Self {
        Self { role: CellRole::Value, text: text.into() }
    }
}

/// Header text -> value text, built from one markup table.
pub type FieldTable = HashMap<String, String>;

macro_rules! listing_fields {
    ($( $field:ident => $label:tt ),* $(,)?) => {
        /// The fixed projection of a listing's field table.
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct ListingFields {
            $(
                #[serde(rename = $label, default)]
                pub $field: String,
            )*
        }

        impl ListingFields {
            pub const LABELS: &'static [&'static str] = &[$($label),*];

            /// Absent labels become empty strings.
            pub fn project(table: &FieldTable) -> Self {
                Self::from_lookup(|label| table.get(label).cloned())
            }

            pub fn from_lookup(mut get: impl FnMut(&str) -> Option<String>) -> Self {
                Self {
                    $( $field: get($label).unwrap_or_default(), )*
                }
            }

            pub fn values(&self) -> Vec<&str> {
                vec![$( self.$field.as_str() ),*]
            }
        }
    };
}

listing_fields! {
    price => "価格",
    layout => "間取り",
    property_type => "物件種別",
    address => "所在地",
    access => "アクセス",
    floor_area => "建物面積",
    parking => "駐車場",
    build_date => "築年月",
    structure => "建物構造",
    construction_method => "工法",
    light_exposure => "主要採光",
    balcony => "バルコニー",
    warranty => "保証・評価",
    renovation => "リフォーム",
    land_area => "土地面積",
    road_access => "接道",
    setback => "セットバック",
    private_road => "私道",
    land_category => "地目",
    terrain => "地勢",
    rights => "権利",
    city_planning => "都市計画",
    use_district => "用途地域",
    coverage_ratio => "建ぺい/容積率",
    land_law => "土地国土法",
    permit_number => "許可番号",
    building_code => "建築基準法",
    legal_restrictions => "法令制限",
    elementary_school => "小学区",
    middle_school => "中学区",
    occupancy => "現況",
    handover => "引渡",
    other_costs => "その他費用",
    remarks => "備考",
    transaction_type => "取引態様",
}

pub const ID_COLUMN: &str = "物件番号";
pub const URL_COLUMN: &str = "詳細ページ";
pub const IMAGE_URLS_COLUMN: &str = "画像URL";
pub const IMAGE_COUNT_COLUMN: &str = "画像枚数";

const IMAGE_URL_SEPARATOR: &str = ", ";

/// One row of the dataset. `id` comes from the page itself, not the URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    #[serde(rename = "物件番号", default)]
    pub id: String,
    #[serde(flatten)]
    pub fields: ListingFields,
    #[serde(rename = "詳細ページ", default)]
    pub source_url: String,
    #[serde(
        rename = "画像URL",
        default,
        serialize_with = "join_urls",
        deserialize_with = "split_urls"
    )]
    pub image_urls: Vec<String>,
    #[serde(rename = "画像枚数", default)]
    pub image_count: u32,
}

impl ListingRecord {
    /// Column names in output order.
    pub fn columns() -> Vec<&'static str> {
        let mut cols = Vec::with_capacity(ListingFields::LABELS.len() + 4);
        cols.push(ID_COLUMN);
        cols.extend_from_slice(ListingFields::LABELS);
        cols.push(URL_COLUMN);
        cols.push(IMAGE_URLS_COLUMN);
        cols.push(IMAGE_COUNT_COLUMN);
        cols
    }

    /// Cell values aligned with [`ListingRecord::columns`].
    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(ListingFields::LABELS.len() + 4);
        row.push(self.id.clone());
        row.extend(self.fields.values().into_iter().map(str::to_string));
        row.push(self.source_url.clone());
        row.push(self.image_urls.join(IMAGE_URL_SEPARATOR));
        row.push(self.image_count.to_string());
        row
    }

    /// Rebuild a record from named cells. Unknown columns are ignored,
    /// missing ones default to empty.
    pub fn from_columns(cells: &HashMap<&str, &str>) -> Self {
        let text = |col: &str| cells.get(col).map(|v| v.to_string()).unwrap_or_default();

        Self {
            id: text(ID_COLUMN),
            fields: ListingFields::from_lookup(|label| cells.get(label).map(|v| v.to_string())),
            source_url: text(URL_COLUMN),
            image_urls: split_url_list(&text(IMAGE_URLS_COLUMN)),
            image_count: parse_count(&text(IMAGE_COUNT_COLUMN)),
        }
    }

    /// Attach harvested image references.
    pub fn set_images(&mut self, urls: Vec<String>) {
        self.image_count = urls.len() as u32;
        self.image_urls = urls;
    }

    pub fn clear_images(&mut self) {
        self.image_urls.clear();
        self.image_count = 0;
    }
}

// Split on the join separator only; URLs may carry bare commas.
fn split_url_list(raw: &str) -> Vec<String> {
    raw.split(IMAGE_URL_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// Spreadsheet round-trips can turn "3" into "3.0".
fn parse_count(raw: &str) -> u32 {
    let raw = raw.trim();
    raw.parse::<u32>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u32))
        .unwrap_or(0)
}

fn join_urls<S: Serializer>(urls: &[String], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&urls.join(IMAGE_URL_SEPARATOR))
}

fn split_urls<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.as_deref().map(split_url_list).unwrap_or_default())
}
