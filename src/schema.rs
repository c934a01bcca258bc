//! Input Schema and Validation
//!
//! The engine consumes a raw attribute mapping (arbitrary subset of the
//! recognized schema). This module owns the required-field list, the valid
//! numeric ranges, and the static defaulting table used to complete partial
//! requests before encoding.

use crate::error::EngineError;
use serde_json::{Map, Value};

/// Raw request payload: free-form attribute mapping, JSON object shaped
pub type RawInput = Map<String, Value>;

/// Fields every prediction request must carry
pub const REQUIRED_FIELDS: [&str; 9] = [
    "state",
    "soil_ph",
    "soil_moisture",
    "soil_nitrogen",
    "soil_phosphorus",
    "soil_potassium",
    "avg_temperature",
    "humidity",
    "rainfall",
];

/// Valid ranges for the numeric required fields
pub const NUMERIC_RANGES: [(&str, f64, f64); 8] = [
    ("soil_ph", 5.0, 8.5),
    ("soil_moisture", 20.0, 90.0),
    ("soil_nitrogen", 20.0, 100.0),
    ("soil_phosphorus", 15.0, 80.0),
    ("soil_potassium", 50.0, 250.0),
    ("avg_temperature", 15.0, 45.0),
    ("humidity", 30.0, 95.0),
    ("rainfall", 0.0, 20.0),
];

/// Numeric features in their fixed encoding order. The regression target
/// (`average_yield`) is deliberately not part of this list.
pub const NUMERIC_FEATURES: [&str; 21] = [
    "variability",
    "district_factor",
    "climate_factor",
    "soil_health_factor",
    "ph_optimal",
    "moisture_optimal",
    "temp_optimal",
    "duration_days",
    "seasonal_factor_kharif",
    "seasonal_factor_rabi",
    "seasonal_factor_zaid",
    "soil_ph",
    "soil_moisture",
    "soil_nitrogen",
    "soil_phosphorus",
    "soil_potassium",
    "soil_organic_matter",
    "avg_temperature",
    "humidity",
    "rainfall",
    "wind_speed",
];

/// Categorical attributes, label-encoded in this order after the numerics
pub const CATEGORICAL_FEATURES: [&str; 8] = [
    "state",
    "crop",
    "district",
    "soil_type",
    "climate_zone",
    "water_requirement",
    "season",
    "trend",
];

/// Read a field as f64, accepting integer or float JSON numbers
pub fn num_field(input: &RawInput, name: &str) -> Option<f64> {
    input.get(name).and_then(Value::as_f64)
}

/// Read a field as a string slice
pub fn str_field<'a>(input: &'a RawInput, name: &str) -> Option<&'a str> {
    input.get(name).and_then(Value::as_str)
}

/// Validate a raw request against the required-field list and numeric ranges.
///
/// Collects every violation (missing fields first, then range violations)
/// into field-specific messages. No model is invoked on failure.
pub fn validate_input(input: &RawInput) -> Result<(), EngineError> {
    let mut issues = Vec::new();

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|f| !input.contains_key(*f))
        .collect();
    if !missing.is_empty() {
        issues.push(format!("Missing required fields: {}", missing.join(", ")));
    }

    for (field, min_val, max_val) in NUMERIC_RANGES {
        if let Some(value) = input.get(field) {
            match value.as_f64() {
                Some(v) if (min_val..=max_val).contains(&v) => {}
                Some(v) => {
                    issues.push(format!("{}: {} (expected {}-{})", field, v, min_val, max_val));
                }
                None => {
                    issues.push(format!("{}: expected a number", field));
                }
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(EngineError::validation(issues))
    }
}

/// Static defaulting table for attributes absent from a request.
///
/// Values are fixed, not learned; they describe a representative alluvial
/// kharif rice plot so partial requests still encode to a complete vector.
pub fn default_record() -> RawInput {
    let mut defaults = Map::new();
    let entries: [(&str, Value); 30] = [
        ("state", Value::from("punjab")),
        ("crop", Value::from("Rice")),
        ("district", Value::from("ludhiana")),
        ("average_yield", Value::from(4.0)),
        ("trend", Value::from("stable")),
        ("variability", Value::from(0.08)),
        ("district_factor", Value::from(1.2)),
        ("soil_type", Value::from("alluvial")),
        ("climate_zone", Value::from("north-western-plains")),
        ("climate_factor", Value::from(1.2)),
        ("soil_health_factor", Value::from(1.1)),
        ("ph_optimal", Value::from(6.0)),
        ("moisture_optimal", Value::from(80.0)),
        ("temp_optimal", Value::from(28.0)),
        ("water_requirement", Value::from("High")),
        ("season", Value::from("kharif")),
        ("duration_days", Value::from(135.0)),
        ("seasonal_factor_kharif", Value::from(1.2)),
        ("seasonal_factor_rabi", Value::from(1.0)),
        ("seasonal_factor_zaid", Value::from(1.0)),
        ("soil_ph", Value::from(6.8)),
        ("soil_moisture", Value::from(60.0)),
        ("soil_nitrogen", Value::from(70.0)),
        ("soil_phosphorus", Value::from(50.0)),
        ("soil_potassium", Value::from(180.0)),
        ("soil_organic_matter", Value::from(3.0)),
        ("avg_temperature", Value::from(28.0)),
        ("humidity", Value::from(60.0)),
        ("rainfall", Value::from(4.0)),
        ("wind_speed", Value::from(8.0)),
    ];
    for (key, value) in entries {
        defaults.insert(key.to_string(), value);
    }
    defaults
}

/// Merge a request over the defaulting table; request values win
pub fn apply_defaults(input: &RawInput) -> RawInput {
    let mut merged = default_record();
    for (key, value) in input {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_input() -> RawInput {
        json!({
            "state": "punjab",
            "soil_ph": 6.8,
            "soil_moisture": 60,
            "soil_nitrogen": 70,
            "soil_phosphorus": 50,
            "soil_potassium": 180,
            "avg_temperature": 28,
            "humidity": 60,
            "rainfall": 4
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn test_valid_input_passes() {
        assert!(validate_input(&valid_input()).is_ok());
    }

    #[test]
    fn test_out_of_range_ph_rejected() {
        let mut input = valid_input();
        input.insert("soil_ph".to_string(), json!(9.0));
        let err = validate_input(&input).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("soil_ph"));
        assert!(msg.contains("5-8.5"));
    }

    #[test]
    fn test_missing_rainfall_rejected() {
        let mut input = valid_input();
        input.remove("rainfall");
        let err = validate_input(&input).unwrap_err();
        assert!(err.to_string().contains("rainfall"));
    }

    #[test]
    fn test_defaults_complete_every_feature() {
        let defaults = default_record();
        for name in NUMERIC_FEATURES {
            assert!(defaults.contains_key(name), "missing default for {}", name);
        }
        for name in CATEGORICAL_FEATURES {
            assert!(defaults.contains_key(name), "missing default for {}", name);
        }
    }

    #[test]
    fn test_apply_defaults_preserves_request_values() {
        let mut input = RawInput::new();
        input.insert("soil_ph".to_string(), json!(7.4));
        let merged = apply_defaults(&input);
        assert_eq!(num_field(&merged, "soil_ph"), Some(7.4));
        assert_eq!(str_field(&merged, "state"), Some("punjab"));
    }
}
