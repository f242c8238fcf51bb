use serde_json::Value;

/// Appended when a query ran but matched nothing. One explicit empty-result
/// line plus concrete ways to widen the net.
pub const BROADENING_SUGGESTION: &str = "No matching properties were found. Would you like to \
broaden the search? For example, raise the budget, drop one of the filters, or try a nearby area.";

/// Format whole AED with thousands separators: 2450000 -> "2,450,000 AED".
pub fn format_price(value: i64) -> String {
    let negative = value < 0;
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 5);

    let offset = digits.len() % 3;
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - offset) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if negative {
        format!("-{} AED", grouped)
    } else {
        format!("{} AED", grouped)
    }
}

/// Ensure an answer that came back with zero observed rows carries the
/// empty-result guidance exactly once.
pub fn ensure_broadening(answer: &str) -> String {
    if answer.to_lowercase().contains("broaden") {
        return answer.to_string();
    }
    if answer.trim().is_empty() {
        return BROADENING_SUGGESTION.to_string();
    }
    format!("{}\n\n{}", answer.trim_end(), BROADENING_SUGGESTION)
}

/// Deterministic enumeration of observed rows, used when the planner ran out
/// of iterations before the model produced its own summary.
pub fn compose_partial(rows: &[Value]) -> String {
    let mut out = String::from(
        "I couldn't finish refining that search, but here is what I found so far:\n",
    );
    for (i, row) in rows.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!("{}. {}", i + 1, describe_row(row)));
    }
    out
}

/// One line per listing: type, location/building, bedrooms, price, possession.
/// Unknown shapes (aggregates, projections) render as compact JSON so the
/// data is never silently dropped.
pub fn describe_row(row: &Value) -> String {
    let location = row.get("location").and_then(Value::as_str);
    let property_type = row.get("type").and_then(Value::as_str);
    let bedrooms = row.get("bedrooms").and_then(Value::as_i64);
    let price = price_of(row);
    let possession = row.get("possession").and_then(Value::as_str);
    let building = row.get("building").and_then(Value::as_str);

    if location.is_none() && property_type.is_none() && price.is_none() {
        return serde_json::to_string(row).unwrap_or_else(|_| "<unreadable row>".to_string());
    }

    let mut parts: Vec<String> = Vec::new();
    let mut head = String::new();
    head.push_str(property_type.unwrap_or("Property"));
    if let Some(loc) = location {
        head.push_str(" in ");
        head.push_str(loc);
    }
    if let Some(b) = building {
        head.push_str(&format!(" ({})", b));
    }
    parts.push(head);

    if let Some(b) = bedrooms {
        parts.push(format!("{} bedrooms", b));
    }
    if let Some(p) = price {
        parts.push(format_price(p));
    }
    if let Some(p) = possession {
        parts.push(format!("possession: {}", p));
    }

    parts.join(" - ")
}

/// Price may arrive as a JSON integer, a float, or (from NUMERIC columns of
/// a pre-existing table) a numeric string.
fn price_of(row: &Value) -> Option<i64> {
    match row.get("price")? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}
