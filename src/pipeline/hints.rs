use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{PropertyType, AREAS, AREA_ALIASES};

/// Filter constraints extracted deterministically from the corrected text.
///
/// These are NOT the query - the planner still writes the SQL - but they pin
/// down the parts where comparator direction must be exact, and they are
/// what the comparator tests assert against.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryHints {
    pub price_max: Option<i64>,
    pub price_min: Option<i64>,
    pub bedrooms_exact: Option<i32>,
    pub bedrooms_min: Option<i32>,
    pub property_type: Option<PropertyType>,
    pub location: Option<String>,
    pub ready_only: bool,
    pub available_only: bool,
    pub requested_limit: Option<i64>,
}

static PRICE_MAX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:under|below|less than|cheaper than|at most|up to|within|max(?:imum)?(?:\s+of)?)\s+(?:aed\s+)?(\d[\d,]*(?:\.\d+)?)\s*(million|mn|m|k)?\b",
    )
    .unwrap()
});

static PRICE_MIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:above|over|more than|exceeding|upwards of|at least|min(?:imum)?(?:\s+of)?|starting (?:at|from))\s+(?:aed\s+)?(\d[\d,]*(?:\.\d+)?)\s*(million|mn|m|k)?\b",
    )
    .unwrap()
});

static BEDROOMS_PLUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*\+\s*(?:bed(?:room)?s?|br)\b").unwrap());

static BEDROOMS_AT_LEAST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:at least|minimum(?:\s+of)?)\s+(\d{1,2})\s*(?:bed(?:room)?s?|br)\b")
        .unwrap()
});

static BEDROOMS_MORE_THAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:more than|over)\s+(\d{1,2})\s*(?:bed(?:room)?s?|br)\b").unwrap()
});

static BEDROOMS_EXACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*[- ]?\s*(?:bed(?:room)?s?|br)\b").unwrap());

static LIMIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:show|list|give|display)(?:\s+me)?\s+(?:the\s+)?(?:top\s+|first\s+)?(\d{1,3})\b|\b(?:top|first)\s+(\d{1,3})\b")
        .unwrap()
});

static READY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bready\b").unwrap());
static AVAILABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bavailable\b").unwrap());

pub fn extract(text: &str) -> QueryHints {
    let mut hints = QueryHints::default();

    extract_bedrooms(text, &mut hints);
    extract_prices(text, &mut hints);
    extract_type(text, &mut hints);
    extract_location(text, &mut hints);
    extract_limit(text, &mut hints);

    hints.ready_only = READY_RE.is_match(text);
    hints.available_only = AVAILABLE_RE.is_match(text);

    hints
}

impl QueryHints {
    pub fn is_empty(&self) -> bool {
        *self == QueryHints::default()
    }

    /// Constraint lines handed to the planner prompt. Each line is a literal
    /// predicate the generated SQL must honor.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(v) = self.price_max {
            lines.push(format!("price < {}", v));
        }
        if let Some(v) = self.price_min {
            lines.push(format!("price > {}", v));
        }
        if let Some(v) = self.bedrooms_exact {
            lines.push(format!("bedrooms = {}", v));
        }
        if let Some(v) = self.bedrooms_min {
            lines.push(format!("bedrooms >= {}", v));
        }
        if let Some(t) = self.property_type {
            lines.push(format!("type = '{}'", t.as_str()));
        }
        if let Some(ref l) = self.location {
            lines.push(format!("location = '{}'", l));
        }
        if self.ready_only {
            lines.push("possession = 'Ready'".to_string());
        }
        if self.available_only {
            lines.push("available = true".to_string());
        }
        lines
    }
}

fn extract_bedrooms(text: &str, hints: &mut QueryHints) {
    if let Some(caps) = BEDROOMS_PLUS_RE.captures(text) {
        hints.bedrooms_min = caps[1].parse().ok();
    } else if let Some(caps) = BEDROOMS_AT_LEAST_RE.captures(text) {
        hints.bedrooms_min = caps[1].parse().ok();
    } else if let Some(caps) = BEDROOMS_MORE_THAN_RE.captures(text) {
        // "more than 4" is strictly greater, so the bound is 5.
        hints.bedrooms_min = caps[1].parse::<i32>().ok().map(|n| n + 1);
    } else if let Some(caps) = BEDROOMS_EXACT_RE.captures(text) {
        hints.bedrooms_exact = caps[1].parse().ok();
    }
}

fn extract_prices(text: &str, hints: &mut QueryHints) {
    for caps in PRICE_MAX_RE.captures_iter(text) {
        if let Some(v) = price_amount(text, &caps) {
            hints.price_max = Some(v);
        }
    }
    for caps in PRICE_MIN_RE.captures_iter(text) {
        if let Some(v) = price_amount(text, &caps) {
            hints.price_min = Some(v);
        }
    }
}

/// Resolve a captured number+suffix into whole AED, rejecting matches that
/// are really about bedrooms ("more than 4 bedrooms") or too ambiguous to
/// be a price ("under 3" with no unit).
fn price_amount(text: &str, caps: &regex::Captures) -> Option<i64> {
    let number = caps.get(1)?;
    let tail = &text[caps.get(0)?.end()..];
    if tail.trim_start().to_lowercase().starts_with("bed")
        || tail.trim_start().to_lowercase().starts_with("br")
    {
        return None;
    }

    let raw: f64 = number.as_str().replace(',', "").parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(s) if s == "million" || s == "mn" || s == "m" => 1_000_000.0,
        Some(s) if s == "k" => 1_000.0,
        _ => {
            // No unit: only plausible as a price when already price-sized.
            if raw < 1000.0 {
                return None;
            }
            1.0
        }
    };

    let amount = (raw * multiplier).round() as i64;
    (amount > 0).then_some(amount)
}

fn extract_type(text: &str, hints: &mut QueryHints) {
    let lowered = text.to_lowercase();
    hints.property_type = if lowered.contains("apartment") || lowered.contains("flat") {
        Some(PropertyType::Apartment)
    } else if lowered.contains("villa") {
        Some(PropertyType::Villa)
    } else if lowered.contains("townhouse") {
        Some(PropertyType::Townhouse)
    } else if lowered.contains("penthouse") {
        Some(PropertyType::Penthouse)
    } else if lowered.contains("studio") {
        Some(PropertyType::Apartment)
    } else {
        None
    };
}

fn extract_location(text: &str, hints: &mut QueryHints) {
    let lowered = text.to_lowercase();
    for area in AREAS {
        if lowered.contains(&area.to_lowercase()) {
            hints.location = Some(area.to_string());
            return;
        }
    }
    // Abbreviations match whole words only ("jlt" must not hit inside a word).
    for word in lowered.split(|c: char| !c.is_ascii_alphanumeric()) {
        for (alias, area) in AREA_ALIASES {
            if word == *alias {
                hints.location = Some(area.to_string());
                return;
            }
        }
    }
}

fn extract_limit(text: &str, hints: &mut QueryHints) {
    if let Some(caps) = LIMIT_RE.captures(text) {
        let number = caps.get(1).or_else(|| caps.get(2));
        if let (Some(m), Some(whole)) = (number, caps.get(0)) {
            // "show me 2 bedroom flats" is a bedroom count, not a limit.
            let tail = &text[whole.end()..];
            if tail.trim_start().to_lowercase().starts_with("bed")
                || tail.trim_start().to_lowercase().starts_with("br")
            {
                return;
            }
            hints.requested_limit = m.as_str().parse::<i64>().ok().map(|n| n.clamp(1, 100));
        }
    }
}
