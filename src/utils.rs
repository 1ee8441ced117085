use anyhow::{anyhow, Context, Result};
use csv::Writer;

use crate::models::Listing;

pub const ATTRIBUTION: &str = "Data provided by CoinGecko";
pub const ATTRIBUTION_URL: &str = "https://www.coingecko.com/";

pub fn now_ts() -> f64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs_f64()
}

/// `$1.23K`, `$4.50B`, ... Scales by 1000 up to trillions.
pub fn format_large_number(num: Option<f64>, precision: usize) -> String {
    let Some(mut num) = num.filter(|n| n.is_finite()) else {
        return "N/A".to_string();
    };
    if num == 0.0 {
        return "0".to_string();
    }
    const SUFFIXES: [&str; 5] = ["", "K", "M", "B", "T"];
    let mut magnitude = 0;
    while num.abs() >= 1000.0 && magnitude < SUFFIXES.len() - 1 {
        magnitude += 1;
        num /= 1000.0;
    }
    format!("${num:.precision$}{}", SUFFIXES[magnitude])
}

pub fn format_percent(percent: Option<f64>, include_sign: bool) -> String {
    match percent.filter(|p| p.is_finite()) {
        None => "N/A".to_string(),
        Some(p) => {
            let sign = if p > 0.0 && include_sign { "+" } else { "" };
            format!("{sign}{p:.2}%")
        }
    }
}

pub fn format_price(price: Option<f64>) -> String {
    match price.filter(|p| p.is_finite()) {
        None => "N/A".to_string(),
        Some(p) => format!("${p:.4}"),
    }
}

/// Whole dollars with thousands separators, e.g. `$1,234,568`.
pub fn format_usd_grouped(value: Option<f64>) -> String {
    let Some(v) = value.filter(|v| v.is_finite()) else {
        return "N/A".to_string();
    };
    let rounded = format!("{:.0}", v.abs());
    let mut grouped = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (i, ch) in rounded.chars().enumerate() {
        if i > 0 && (rounded.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if v < 0.0 && rounded != "0" { "-" } else { "" };
    format!("{sign}${grouped}")
}

pub fn percent_color(percent: Option<f64>) -> &'static str {
    match percent {
        None => "gray",
        Some(p) if p > 0.0 => "#10B981",
        Some(p) if p < 0.0 => "#EF4444",
        Some(_) => "#94A3B8",
    }
}

fn raw(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

const CSV_HEADER: [&str; 19] = [
    "id",
    "name",
    "symbol",
    "rank",
    "price",
    "market_cap",
    "volume_24h",
    "percent_change_1h",
    "percent_change_24h",
    "percent_change_7d",
    "percent_change_30d",
    "last_updated",
    "formatted_price",
    "formatted_market_cap",
    "formatted_volume",
    "formatted_percent_change_1h",
    "formatted_percent_change_24h",
    "formatted_percent_change_7d",
    "formatted_percent_change_30d",
];

/// Raw values followed by their display forms, one line per listing.
pub fn listings_csv<'a>(rows: impl IntoIterator<Item = &'a Listing>) -> Result<String> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for r in rows {
        writer.write_record([
            r.id.clone(),
            r.name.clone(),
            r.symbol.clone(),
            r.rank.map(|x| x.to_string()).unwrap_or_default(),
            raw(r.current_price),
            raw(r.market_cap),
            raw(r.volume_24h),
            raw(r.percent_change_1h),
            raw(r.percent_change_24h),
            raw(r.percent_change_7d),
            raw(r.percent_change_30d),
            r.last_updated.map(|t| t.to_rfc3339()).unwrap_or_default(),
            format_price(r.current_price),
            format_usd_grouped(r.market_cap),
            format_usd_grouped(r.volume_24h),
            format_percent(r.percent_change_1h, false),
            format_percent(r.percent_change_24h, false),
            format_percent(r.percent_change_7d, false),
            format_percent(r.percent_change_30d, false),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("csv flush failed: {}", e.error()))?;
    String::from_utf8(bytes).context("csv output is not utf-8")
}
