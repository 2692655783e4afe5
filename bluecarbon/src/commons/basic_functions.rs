use serde_json::Value;

/// Square metres per hectare
pub const M2_PER_HA: f64 = 10_000.0;

/// Hectares per square kilometre
pub const HA_PER_KM2: f64 = 100.0;

/// Median of the finite values, `None` when there are none
pub fn median(values: &mut Vec<f64>) -> Option<f64> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

pub fn m2_to_ha(m2: f64) -> f64 {
    m2 / M2_PER_HA
}

pub fn ha_to_km2(ha: f64) -> f64 {
    ha / HA_PER_KM2
}

/// Percentage of `part` in `whole`; `None` if either is missing or `whole` is zero
pub fn percent_of(part: Option<f64>, whole: Option<f64>) -> Option<f64> {
    match (part, whole) {
        (Some(p), Some(w)) if w != 0.0 => Some(100.0 * p / w),
        _ => None,
    }
}

/// Attribute value as a usable label
///
/// Null, empty and the literal placeholders "null"/"None" carry no value.
/// Numbers and booleans are stringified.
pub fn attribute_label(value: &Value) -> Option<String> {
    let label = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => return None,
    };
    if label.is_empty() || label == "null" || label == "None" {
        None
    } else {
        Some(label)
    }
}
