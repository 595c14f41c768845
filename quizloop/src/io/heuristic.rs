//! Deterministic answer extraction for known quiz page shapes.
//!
//! Heuristics run in a fixed order and later matches override earlier ones:
//! an embedded JSON `answer`, a secret code behind a scrape link, then an
//! aggregate over a linked CSV file.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Number, Value};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::core::types::Answer;
use crate::io::fetcher::PageFetcher;
use crate::io::producer::{AnswerProducer, ProduceRequest};

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static SCRAPE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(/demo-scrape-data[^\s{"]*)"#).expect("scrape regex"));
static SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)secret\s*(?:code)?\s*(?:is|:)?\s*([0-9]{3,})").expect("secret regex")
});
static NUMBER_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9]{3,})\b").expect("number token regex"));
static WORD_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z0-9_\-]{4,})\b").expect("word token regex"));
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));
static CSV_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(https?://\S+?\.csv)").expect("csv url regex"));
static CUTOFF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Cutoff[:\s]*([0-9]+)").expect("cutoff regex"));
static EMBEDDED_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+(?:\.\d+)?)").expect("embedded number regex"));
static ID_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)id|index|key").expect("id column regex"));

const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

pub struct HeuristicProducer<F> {
    fetcher: F,
    fallback: Option<String>,
}

impl<F: PageFetcher> HeuristicProducer<F> {
    pub fn new(fetcher: F, fallback: Option<String>) -> Self {
        Self { fetcher, fallback }
    }

    async fn secret_from_scrape_page(&self, page_url: &str, path: &str) -> Result<Option<String>> {
        let scrape_url = resolve(page_url, path)?;
        info!(scrape_url = %scrape_url, "following scrape path");
        let scraped = self.fetcher.fetch(&scrape_url).await?;
        Ok(secret_code(&scraped.text))
    }

    async fn total_from_csv(&self, csv_url: &str, cutoff: Option<f64>) -> Result<Option<Value>> {
        info!(csv_url = %csv_url, ?cutoff, "aggregating csv");
        let file = self.fetcher.fetch(csv_url).await?;
        Ok(csv_total(&file.body, cutoff))
    }
}

#[async_trait]
impl<F: PageFetcher> AnswerProducer for HeuristicProducer<F> {
    #[instrument(skip_all, fields(url = %request.url))]
    async fn produce(&self, request: &ProduceRequest<'_>) -> Result<Option<Answer>> {
        let page = request.page;
        let mut candidate = json_answer(&page.text);

        let normalized = WHITESPACE_RE.replace_all(&page.text, " ");
        if let Some(path) = scrape_path(&normalized) {
            match self.secret_from_scrape_page(request.url, &path).await {
                Ok(Some(code)) => candidate = Some(Value::String(code)),
                Ok(None) => debug!("scrape page had no secret code"),
                Err(err) => warn!(err = %format!("{err:#}"), "scrape path failed"),
            }
        }

        if let Some(csv_url) = csv_link(&page.body, &normalized, request.url) {
            match self.total_from_csv(&csv_url, cutoff(&page.text)).await {
                Ok(Some(total)) => candidate = Some(total),
                Ok(None) => debug!("csv had no numeric column"),
                Err(err) => warn!(err = %format!("{err:#}"), "csv aggregation failed"),
            }
        }

        let candidate = candidate
            .and_then(Answer::from_value)
            .or_else(|| self.fallback.as_deref().and_then(|f| Answer::from_value(f.into())));
        debug!(found = candidate.is_some(), "heuristics finished");
        Ok(candidate)
    }
}

fn resolve(base: &str, reference: &str) -> Result<String> {
    let base = Url::parse(base).with_context(|| format!("parse base url {base}"))?;
    let joined = base
        .join(reference)
        .with_context(|| format!("resolve {reference} against {base}"))?;
    Ok(joined.to_string())
}

/// `answer` field of the JSON object embedded in the page text.
pub fn json_answer(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let parsed: Value = serde_json::from_str(&text[start..=end]).ok()?;
    parsed.get("answer").cloned()
}

pub fn scrape_path(normalized_text: &str) -> Option<String> {
    SCRAPE_PATH_RE
        .captures(normalized_text)
        .map(|caps| caps[1].to_string())
}

/// Best-effort secret code: explicit phrase, then longest number, then longest token.
pub fn secret_code(text: &str) -> Option<String> {
    if let Some(caps) = SECRET_RE.captures(text) {
        return Some(caps[1].trim().to_string());
    }

    let numbers = NUMBER_TOKEN_RE.find_iter(text).map(|m| m.as_str());
    if let Some(longest) = first_longest(numbers) {
        return Some(longest.to_string());
    }

    let words = WORD_TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|token| !token.contains('@') && !token.contains("http"))
        .filter(|token| !matches!(token.to_ascii_lowercase().as_str(), "code" | "secret"));
    first_longest(words).map(str::to_string)
}

/// Longest token; the earliest one wins ties.
fn first_longest<'a>(tokens: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut best: Option<&'a str> = None;
    for token in tokens {
        if best.is_none_or(|current| token.len() > current.len()) {
            best = Some(token);
        }
    }
    best
}

/// First CSV link: anchors in the HTML first, then absolute URLs in the text.
pub fn csv_link(html: &str, normalized_text: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let href = document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::trim)
        .find(|href| {
            let lower = href.to_ascii_lowercase();
            lower.contains(".csv") || lower.ends_with("csv")
        });
    if let Some(href) = href {
        return resolve(page_url, href).ok();
    }
    CSV_URL_RE
        .captures(normalized_text)
        .map(|caps| caps[1].to_string())
}

pub fn cutoff(text: &str) -> Option<f64> {
    CUTOFF_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<f64>().ok())
}

/// Sum of the most plausible numeric column, optionally only cells `>= cutoff`.
pub fn csv_total(raw: &str, cutoff: Option<f64>) -> Option<Value> {
    let rows = read_rows(raw, sniff_delimiter(raw));
    let first = rows.first()?;
    let has_header = first.iter().any(|cell| cell.trim().parse::<f64>().is_err());

    let (headers, data): (Vec<String>, &[Vec<String>]) = if has_header {
        (first.iter().map(|h| h.trim().to_string()).collect(), &rows[1..])
    } else {
        ((0..first.len()).map(|i| format!("col_{i}")).collect(), &rows[..])
    };

    // column index -> (numeric cell count, sum)
    let mut columns: BTreeMap<usize, (usize, f64)> = BTreeMap::new();
    for row in data {
        for (idx, cell) in row.iter().enumerate() {
            if let Some(num) = parse_cell(cell) {
                let entry = columns.entry(idx).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += num;
            }
        }
    }
    if columns.is_empty() {
        return None;
    }

    let name = |idx: usize| {
        headers
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("col_{idx}"))
    };
    let chosen = columns
        .keys()
        .copied()
        .find(|idx| name(*idx).eq_ignore_ascii_case("value"))
        .or_else(|| {
            let preferred: Vec<usize> = columns
                .keys()
                .copied()
                .filter(|idx| !ID_COLUMN_RE.is_match(&name(*idx)))
                .collect();
            let pool = if preferred.is_empty() {
                columns.keys().copied().collect()
            } else {
                preferred
            };
            pool.into_iter().max_by(|a, b| {
                let (count_a, sum_a) = columns[a];
                let (count_b, sum_b) = columns[b];
                count_a
                    .cmp(&count_b)
                    .then(sum_a.total_cmp(&sum_b))
                    .then(b.cmp(a))
            })
        })?;
    debug!(column = %name(chosen), "chose numeric column");

    let total = match cutoff {
        None => columns[&chosen].1,
        Some(cutoff) => data
            .iter()
            .filter_map(|row| row.get(chosen).and_then(|cell| parse_cell(cell)))
            .filter(|num| *num >= cutoff)
            .sum(),
    };
    number_value(total)
}

fn parse_cell(cell: &str) -> Option<f64> {
    let cleaned = cell.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(num) = cleaned.parse::<f64>() {
        return Some(num);
    }
    EMBEDDED_NUMBER_RE
        .captures(&cleaned)
        .and_then(|caps| caps[1].parse::<f64>().ok())
}

fn number_value(total: f64) -> Option<Value> {
    let rounded = total.round();
    if (total - rounded).abs() < 1e-9 && rounded.abs() < i64::MAX as f64 {
        return Some(Value::from(rounded as i64));
    }
    Number::from_f64(total).map(Value::Number)
}

/// Delimiter whose per-line count is non-zero and consistent over the first lines.
fn sniff_delimiter(raw: &str) -> u8 {
    let sample: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).take(5).collect();
    let Some(first) = sample.first() else {
        return b',';
    };
    DELIMITERS
        .iter()
        .copied()
        .filter(|delim| {
            let count = first.bytes().filter(|b| b == delim).count();
            count > 0
                && sample
                    .iter()
                    .all(|line| line.bytes().filter(|b| b == delim).count() == count)
        })
        .max_by_key(|delim| first.bytes().filter(|b| b == delim).count())
        .unwrap_or(b',')
}

fn read_rows(raw: &str, delimiter: u8) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());
    reader
        .records()
        .filter_map(|record| record.ok())
        .map(|record| record.iter().map(str::to_string).collect())
        .filter(|row: &Vec<String>| row.iter().any(|cell| !cell.trim().is_empty()))
        .collect()
}
