//! DataTables envelope decoding and per-panel row remapping.
//!
//! Panels return rows as untyped positional arrays and no two deployments
//! agree on column order. A layout names, for each output column, where its
//! value comes from; [`normalize_messages`] and [`normalize_inventory`] apply
//! that layout and drop rows too short to satisfy it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scrape;

/// The `{sEcho, iTotalRecords, iTotalDisplayRecords, aaData}` wrapper shared
/// by every panel endpoint and by the bridge's own responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "sEcho", default)]
    pub s_echo: Value,
    #[serde(rename = "iTotalRecords", default)]
    pub i_total_records: Value,
    #[serde(rename = "iTotalDisplayRecords", default)]
    pub i_total_display_records: Value,
    #[serde(rename = "aaData")]
    pub aa_data: Vec<Vec<Value>>,
}

impl Envelope {
    /// Decode a query response body.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Source of one output column.
///
/// TOML examples: `{ column = 2 }`, `{ literal = "$" }`,
/// `{ fallback = { column = 6, default = "0" } }`, `"calling_code"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// The raw cell, passed through untouched.
    Column(usize),
    /// The cell if present and a string, else `default`.
    Fallback { column: usize, default: String },
    /// A constant.
    Literal(String),
    /// The cell with HTML tags stripped and whitespace trimmed.
    BareText(usize),
    /// Country display name derived from the row's phone number.
    CountryName,
    /// Calling code derived from the row's phone number.
    CallingCode,
    /// `Monthly` if the cell mentions monthly billing, else `Weekly`.
    BillingPeriod(usize),
    /// Currency symbol plus the last number found in a price cell, e.g. `€ 1.5`.
    PriceTag(usize),
}

impl Field {
    /// The column this field needs to exist, if any.
    fn required_column(&self) -> Option<usize> {
        match self {
            Self::Column(i) | Self::BareText(i) | Self::BillingPeriod(i) | Self::PriceTag(i) => {
                Some(*i)
            }
            Self::Fallback { .. } | Self::Literal(_) | Self::CountryName | Self::CallingCode => None,
        }
    }

    fn needs_phone(&self) -> bool {
        matches!(self, Self::CountryName | Self::CallingCode)
    }

    fn resolve(&self, row: &[Value], phone: Option<&PhoneInfo>) -> Value {
        let cell = |i: usize| row.get(i).cloned().unwrap_or(Value::Null);
        match self {
            Self::Column(i) => cell(*i),
            Self::Fallback { column, default } => match row.get(*column) {
                Some(Value::String(s)) => Value::String(s.clone()),
                _ => Value::String(default.clone()),
            },
            Self::Literal(s) => Value::String(s.clone()),
            Self::BareText(i) => Value::String(scrape::bare_text(&cell_text(row, *i))),
            Self::CountryName => {
                Value::String(phone.map(|p| p.country.clone()).unwrap_or_default())
            }
            Self::CallingCode => {
                Value::String(phone.map(|p| p.calling_code.clone()).unwrap_or_default())
            }
            Self::BillingPeriod(i) => Value::String(billing_period(&cell_text(row, *i)).into()),
            Self::PriceTag(i) => Value::String(price_tag(&cell_text(row, *i))),
        }
    }
}

fn default_message_strip() -> Vec<String> {
    vec!["null".to_string()]
}

/// Column layout for the SMS log report.
///
/// Output row: date, range, number, service, message, currency, cost and,
/// when configured, status.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MessageLayout {
    /// Rows with fewer cells are dropped.
    pub min_fields: usize,
    pub date: Field,
    pub range: Field,
    pub number: Field,
    pub service: Field,
    /// Column holding the (HTML-escaped) message text.
    pub message: usize,
    pub currency: Field,
    pub cost: Field,
    #[serde(default)]
    pub status: Option<Field>,
    /// Literal fragments removed from the decoded message.
    #[serde(default = "default_message_strip")]
    pub message_strip: Vec<String>,
}

impl MessageLayout {
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            Some(&self.date),
            Some(&self.range),
            Some(&self.number),
            Some(&self.service),
            Some(&self.currency),
            Some(&self.cost),
            self.status.as_ref(),
        ];
        check_columns(
            self.min_fields,
            fields
                .into_iter()
                .flatten()
                .filter_map(Field::required_column)
                .chain(std::iter::once(self.message)),
        )
    }
}

/// Column layout for the number inventory report.
///
/// Output row: label, prefix, number, period, price, stats.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InventoryLayout {
    /// Rows with fewer cells are dropped.
    pub min_fields: usize,
    pub label: Field,
    pub prefix: Field,
    /// Column holding the phone number.
    pub number: usize,
    pub period: Field,
    pub price: Field,
    pub stats: Field,
    /// Remove spaces and dashes from the number before output and parsing.
    #[serde(default)]
    pub strip_number_separators: bool,
}

impl InventoryLayout {
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            &self.label,
            &self.prefix,
            &self.period,
            &self.price,
            &self.stats,
        ];
        check_columns(
            self.min_fields,
            fields
                .into_iter()
                .filter_map(Field::required_column)
                .chain(std::iter::once(self.number)),
        )
    }

    fn needs_phone(&self) -> bool {
        [&self.label, &self.prefix, &self.period, &self.price, &self.stats]
            .iter()
            .any(|f| f.needs_phone())
    }
}

fn check_columns(min_fields: usize, columns: impl Iterator<Item = usize>) -> Result<(), String> {
    if min_fields == 0 {
        return Err("min_fields must be at least 1".into());
    }
    for c in columns {
        if c >= min_fields {
            return Err(format!(
                "column {c} is out of range for min_fields = {min_fields}"
            ));
        }
    }
    Ok(())
}

/// Remap SMS log rows. Totals are passed through as the panel sent them.
pub fn normalize_messages(mut env: Envelope, layout: &MessageLayout) -> Envelope {
    env.aa_data = env
        .aa_data
        .into_iter()
        .filter(|row| row.len() >= layout.min_fields)
        .map(|row| {
            let message = clean_message(&cell_text(&row, layout.message), &layout.message_strip);
            let mut out = vec![
                layout.date.resolve(&row, None),
                layout.range.resolve(&row, None),
                layout.number.resolve(&row, None),
                layout.service.resolve(&row, None),
                Value::String(message),
                layout.currency.resolve(&row, None),
                layout.cost.resolve(&row, None),
            ];
            if let Some(status) = &layout.status {
                out.push(status.resolve(&row, None));
            }
            out
        })
        .collect();
    env
}

/// Remap number inventory rows and rewrite both totals to the output count.
pub fn normalize_inventory(mut env: Envelope, layout: &InventoryLayout) -> Envelope {
    let needs_phone = layout.needs_phone();
    env.aa_data = env
        .aa_data
        .into_iter()
        .filter(|row| row.len() >= layout.min_fields)
        .map(|row| {
            let mut number = cell_text(&row, layout.number);
            if layout.strip_number_separators {
                number.retain(|c| c != ' ' && c != '-');
            }
            let phone = needs_phone.then(|| PhoneInfo::derive(&number));
            let phone = phone.as_ref();
            vec![
                layout.label.resolve(&row, phone),
                layout.prefix.resolve(&row, phone),
                Value::String(number),
                layout.period.resolve(&row, phone),
                layout.price.resolve(&row, phone),
                layout.stats.resolve(&row, phone),
            ]
        })
        .collect();
    let count = env.aa_data.len();
    env.i_total_records = Value::from(count);
    env.i_total_display_records = Value::from(count);
    env
}

/// Text content of a cell. Numbers are rendered, null and missing cells are empty.
fn cell_text(row: &[Value], i: usize) -> String {
    match row.get(i) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn clean_message(raw: &str, strip: &[String]) -> String {
    let mut msg = html_escape::decode_html_entities(raw).into_owned();
    for fragment in strip.iter().filter(|f| !f.is_empty()) {
        msg = msg.replace(fragment.as_str(), "");
    }
    msg.trim().to_string()
}

fn billing_period(cell: &str) -> &'static str {
    if cell.to_lowercase().contains("monthly") {
        "Monthly"
    } else {
        "Weekly"
    }
}

fn price_tag(cell: &str) -> String {
    static AMOUNT_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[\d.]+").expect("amount regex is valid"));
    let currency = if cell.contains('€') {
        "€"
    } else if cell.contains('£') {
        "£"
    } else {
        "$"
    };
    let amount = AMOUNT_RE
        .find_iter(cell)
        .last()
        .map_or("0", |m| m.as_str());
    format!("{currency} {amount}")
}

/// Country information derived from a raw phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneInfo {
    /// E.164 calling code without `+`, e.g. `92`.
    pub calling_code: String,
    /// Display name, the ISO region code when unmapped, or `Unknown`.
    pub country: String,
}

impl PhoneInfo {
    /// Parse `number` as E.164 (prepending `+` when absent).
    ///
    /// On parse failure the calling code falls back to the first three
    /// characters of the number. Upstream numbers are inconsistently
    /// formatted, so the fallback is only approximate.
    pub fn derive(number: &str) -> Self {
        let candidate = if number.starts_with('+') {
            number.to_string()
        } else {
            format!("+{number}")
        };
        match phonenumber::parse(None, &candidate) {
            Ok(parsed) => {
                let country = parsed.country();
                Self {
                    calling_code: country.code().to_string(),
                    country: country
                        .id()
                        .map_or_else(|| "Unknown".to_string(), |id| country_name(&format!("{id:?}"))),
                }
            }
            Err(_) => {
                let digits = number.trim_start_matches('+');
                let calling_code = if digits.chars().count() > 3 {
                    digits.chars().take(3).collect()
                } else {
                    String::new()
                };
                Self {
                    calling_code,
                    country: "Unknown".to_string(),
                }
            }
        }
    }
}

/// Display name for an ISO 3166 region code; unmapped codes are returned as-is.
pub fn country_name(region: &str) -> String {
    let region = region.to_uppercase();
    let name = match region.as_str() {
        "AF" => "Afghanistan",
        "AE" => "UAE",
        "AU" => "Australia",
        "BD" => "Bangladesh",
        "CA" => "Canada",
        "CN" => "China",
        "DE" => "Germany",
        "DZ" => "Algeria",
        "EG" => "Egypt",
        "FR" => "France",
        "GB" => "United Kingdom",
        "ID" => "Indonesia",
        "IN" => "India",
        "NG" => "Nigeria",
        "PK" => "Pakistan",
        "RU" => "Russia",
        "SA" => "Saudi Arabia",
        "TR" => "Turkey",
        "US" => "USA",
        _ => return region,
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent_sms_layout() -> MessageLayout {
        MessageLayout {
            min_fields: 9,
            date: Field::Column(0),
            range: Field::Column(1),
            number: Field::Column(2),
            service: Field::Column(3),
            message: 5,
            currency: Field::Column(6),
            cost: Field::Column(7),
            status: Some(Field::Column(8)),
            message_strip: default_message_strip(),
        }
    }

    fn client_inventory_layout() -> InventoryLayout {
        InventoryLayout {
            min_fields: 6,
            label: Field::Column(0),
            prefix: Field::CallingCode,
            number: 2,
            period: Field::Column(3),
            price: Field::Column(4),
            stats: Field::BareText(5),
            strip_number_separators: true,
        }
    }

    fn envelope(rows: Vec<Vec<Value>>) -> Envelope {
        Envelope {
            s_echo: json!(2),
            i_total_records: json!("57"),
            i_total_display_records: json!("57"),
            aa_data: rows,
        }
    }

    #[test]
    fn test_parse_envelope() {
        let body = r#"{"sEcho":3,"iTotalRecords":"2","iTotalDisplayRecords":"2","aaData":[["a",1],["b",2]]}"#;
        let env = Envelope::parse(body).unwrap();
        assert_eq!(env.s_echo, json!(3));
        assert_eq!(env.aa_data.len(), 2);
        assert!(Envelope::parse("not json").is_err());
        assert!(Envelope::parse(r#"{"error":"nope"}"#).is_err());
    }

    #[test]
    fn test_messages_drop_user_column_and_clean_text() {
        let row = vec![
            json!("2026-03-14 10:00:01"),
            json!("Pakistan Jazz"),
            json!("923001234567"),
            json!("WhatsApp"),
            json!("agent7"),
            json!("  Your code is 123&#45;456 null "),
            json!("$"),
            json!("0.01"),
            json!("Delivered"),
        ];
        let out = normalize_messages(envelope(vec![row]), &agent_sms_layout());
        assert_eq!(out.aa_data.len(), 1);
        assert_eq!(
            out.aa_data[0],
            vec![
                json!("2026-03-14 10:00:01"),
                json!("Pakistan Jazz"),
                json!("923001234567"),
                json!("WhatsApp"),
                json!("Your code is 123-456"),
                json!("$"),
                json!("0.01"),
                json!("Delivered"),
            ]
        );
        assert_eq!(out.i_total_records, json!("57"));
    }

    #[test]
    fn test_messages_preserve_count_and_drop_short_rows() {
        let full = |i: i64| {
            (0..9)
                .map(|c| if c == 5 { json!("msg") } else { json!(i) })
                .collect::<Vec<_>>()
        };
        let rows = vec![full(1), full(2), full(3)];
        let out = normalize_messages(envelope(rows.clone()), &agent_sms_layout());
        assert_eq!(out.aa_data.len(), 3);

        let mut with_short = rows;
        with_short.push(vec![json!("too"), json!("short")]);
        with_short.push(vec![]);
        let out = normalize_messages(envelope(with_short), &agent_sms_layout());
        assert_eq!(out.aa_data.len(), 3);
    }

    #[test]
    fn test_messages_fallback_cost_and_literal_currency() {
        let layout = MessageLayout {
            min_fields: 5,
            date: Field::Column(0),
            range: Field::Column(1),
            number: Field::Column(2),
            service: Field::Column(3),
            message: 4,
            currency: Field::Literal("$".into()),
            cost: Field::Fallback {
                column: 5,
                default: "0".into(),
            },
            status: None,
            message_strip: vec!["<#>".into(), "null".into()],
        };
        let rows = vec![
            vec![json!("d"), json!("r"), json!("n"), json!("s"), json!("&lt;#&gt; code 9")],
            vec![
                json!("d"),
                json!("r"),
                json!("n"),
                json!("s"),
                json!("hi"),
                json!("0.02"),
            ],
        ];
        let out = normalize_messages(envelope(rows), &layout);
        assert_eq!(out.aa_data[0][4], json!("code 9"));
        assert_eq!(out.aa_data[0][6], json!("0"));
        assert_eq!(out.aa_data[1][5], json!("$"));
        assert_eq!(out.aa_data[1][6], json!("0.02"));
        assert_eq!(out.aa_data[1].len(), 7);
    }

    #[test]
    fn test_inventory_derives_calling_code() {
        let rows = vec![vec![
            json!("Pakistan-Exclusive"),
            json!(""),
            json!("92 300-1234567"),
            json!("Weekly"),
            json!("0.05"),
            json!("<b>3</b> SMS"),
        ]];
        let out = normalize_inventory(envelope(rows), &client_inventory_layout());
        assert_eq!(
            out.aa_data[0],
            vec![
                json!("Pakistan-Exclusive"),
                json!("92"),
                json!("923001234567"),
                json!("Weekly"),
                json!("0.05"),
                json!("3 SMS"),
            ]
        );
        assert_eq!(out.i_total_records, json!(1));
        assert_eq!(out.i_total_display_records, json!(1));
    }

    #[test]
    fn test_inventory_price_tag_layout() {
        let layout = InventoryLayout {
            min_fields: 8,
            label: Field::Column(1),
            prefix: Field::Column(2),
            number: 3,
            period: Field::BillingPeriod(4),
            price: Field::PriceTag(4),
            stats: Field::Column(7),
            strip_number_separators: false,
        };
        let row = |price: &str| {
            vec![
                json!(""),
                json!("Algeria"),
                json!("213"),
                json!("213555000111"),
                json!(price),
                json!(""),
                json!(""),
                json!("12/50"),
            ]
        };
        let rows = vec![
            row("<span>Monthly</span> €1.50"),
            row("weekly 0.2"),
            row("<i>£</i> 3"),
            vec![json!("short")],
        ];
        let out = normalize_inventory(envelope(rows), &layout);
        assert_eq!(out.aa_data.len(), 3);
        assert_eq!(out.aa_data[0][3], json!("Monthly"));
        assert_eq!(out.aa_data[0][4], json!("€ 1.50"));
        assert_eq!(out.aa_data[1][3], json!("Weekly"));
        assert_eq!(out.aa_data[1][4], json!("$ 0.2"));
        assert_eq!(out.aa_data[2][4], json!("£ 3"));
        assert_eq!(out.i_total_records, json!(3));
    }

    #[test]
    fn test_phone_info_e164() {
        let info = PhoneInfo::derive("+923001234567");
        assert_eq!(info.calling_code, "92");
        assert_eq!(info.country, "Pakistan");

        let info = PhoneInfo::derive("923001234567");
        assert_eq!(info.calling_code, "92");
    }

    #[test]
    fn test_phone_info_fallback() {
        // 999 is not an assigned calling code.
        let info = PhoneInfo::derive("999123456");
        assert_eq!(info.calling_code, "999");
        assert_eq!(info.country, "Unknown");

        let info = PhoneInfo::derive("");
        assert_eq!(info.calling_code, "");
    }

    #[test]
    fn test_country_name() {
        assert_eq!(country_name("pk"), "Pakistan");
        assert_eq!(country_name("ZW"), "ZW");
    }

    #[test]
    fn test_layout_validation() {
        assert!(agent_sms_layout().validate().is_ok());
        let mut bad = agent_sms_layout();
        bad.min_fields = 6;
        assert!(bad.validate().is_err());

        assert!(client_inventory_layout().validate().is_ok());
        let mut bad = client_inventory_layout();
        bad.number = 9;
        assert!(bad.validate().is_err());
    }
}
