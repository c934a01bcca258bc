//! Crop Recommendation Ranking
//!
//! Converts classifier probabilities (or rule-based fallback scores) into a
//! ranked, capped list of recommendations. Every entry carries a suitability
//! score in [0,1], a dense 1-based rank, a confidence tier, and 1–3 reason
//! strings from a deterministic per-crop rule table. The fallback path scores
//! a static per-state candidate list with pH/temperature/rainfall window
//! adjustments and clamps to [0.2, 0.95].

use crate::bank::CropModelBank;
use crate::heuristic::JitterSource;
use crate::schema::{self, RawInput};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

const FALLBACK_SCORE_FLOOR: f64 = 0.2;
const FALLBACK_SCORE_CEILING: f64 = 0.95;

/// Confidence tier derived from the suitability score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// High > 0.7, Medium > 0.4, Low otherwise
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            Confidence::High
        } else if score > 0.4 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// One ranked crop recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropRecommendation {
    pub crop: String,
    pub score: f64,
    /// 1-based, dense over the returned list
    pub rank: usize,
    pub confidence: Confidence,
    /// 1–3 entries, never empty
    pub reasons: SmallVec<[String; 3]>,
}

/// Static per-state candidate crops for fallback ranking
const STATE_CROPS: [(&str, [&str; 5]); 12] = [
    ("punjab", ["Wheat", "Rice", "Maize", "Cotton", "Sugarcane"]),
    ("haryana", ["Wheat", "Rice", "Mustard", "Bajra", "Jowar"]),
    ("uttar_pradesh", ["Rice", "Wheat", "Sugarcane", "Potato", "Mustard"]),
    ("maharashtra", ["Sugarcane", "Cotton", "Soybean", "Turmeric", "Grapes"]),
    ("karnataka", ["Rice", "Ragi", "Jowar", "Maize", "Coffee"]),
    ("tamil_nadu", ["Rice", "Sugarcane", "Cotton", "Groundnut", "Coconut"]),
    ("gujarat", ["Wheat", "Cotton", "Groundnut", "Sugarcane", "Mustard"]),
    ("rajasthan", ["Wheat", "Mustard", "Bajra", "Jowar", "Cotton"]),
    ("bihar", ["Rice", "Wheat", "Maize", "Sugarcane", "Lentil"]),
    ("west_bengal", ["Rice", "Wheat", "Jute", "Potato", "Mustard"]),
    ("madhya_pradesh", ["Wheat", "Rice", "Soybean", "Maize", "Chickpea"]),
    ("odisha", ["Rice", "Maize", "Ragi", "Black Gram", "Green Gram"]),
];

fn candidate_crops(state: &str) -> Vec<&'static str> {
    STATE_CROPS
        .iter()
        .find(|(name, _)| *name == state)
        .map(|(_, crops)| crops.to_vec())
        .unwrap_or_else(|| vec!["Rice", "Wheat", "Maize"])
}

/// Rank crops from averaged classifier probabilities.
///
/// Stable sort on descending score keeps the bank's class order for ties;
/// ranks are dense and 1-based.
pub fn rank_with_models(
    bank: &CropModelBank,
    features: &[f64],
    input: &RawInput,
    top_k: usize,
) -> Result<Vec<CropRecommendation>> {
    let probabilities = bank.average_probabilities(features)?;
    let mut scored: Vec<(String, f64)> = bank
        .classes()
        .iter()
        .cloned()
        .zip(probabilities)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    Ok(build_recommendations(scored, input, top_k))
}

/// Rank crops without models: static per-state candidates scored by banded
/// rules plus a small bounded random term
pub fn rank_fallback(
    input: &RawInput,
    top_k: usize,
    jitter: &mut JitterSource,
) -> Vec<CropRecommendation> {
    let state = schema::str_field(input, "state").unwrap_or("punjab");
    let soil_ph = schema::num_field(input, "soil_ph").unwrap_or(6.5);
    let avg_temp = schema::num_field(input, "avg_temperature").unwrap_or(25.0);
    let rainfall = schema::num_field(input, "rainfall").unwrap_or(4.0);

    let scored: Vec<(String, f64)> = candidate_crops(state)
        .into_iter()
        .take(5)
        .enumerate()
        .map(|(i, crop)| {
            // Base score decreases down the state's candidate list
            let mut score = 0.8 - (i as f64) * 0.1;

            match crop {
                "Rice" if (6.0..=7.0).contains(&soil_ph) => score += 0.2,
                "Wheat" if (6.5..=7.5).contains(&soil_ph) => score += 0.2,
                "Maize" if (6.0..=7.0).contains(&soil_ph) => score += 0.2,
                _ => {}
            }
            match crop {
                "Rice" if (25.0..=35.0).contains(&avg_temp) => score += 0.1,
                "Wheat" if (15.0..=25.0).contains(&avg_temp) => score += 0.1,
                "Maize" if (20.0..=30.0).contains(&avg_temp) => score += 0.1,
                _ => {}
            }
            match crop {
                "Rice" if rainfall >= 5.0 => score += 0.1,
                "Wheat" if (2.0..=6.0).contains(&rainfall) => score += 0.1,
                "Maize" if (3.0..=8.0).contains(&rainfall) => score += 0.1,
                _ => {}
            }

            score += jitter.uniform(-0.1, 0.1);
            (
                crop.to_string(),
                score.clamp(FALLBACK_SCORE_FLOOR, FALLBACK_SCORE_CEILING),
            )
        })
        .collect();

    let mut sorted = scored;
    sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    build_recommendations(sorted, input, top_k)
}

fn build_recommendations(
    sorted: Vec<(String, f64)>,
    input: &RawInput,
    top_k: usize,
) -> Vec<CropRecommendation> {
    sorted
        .into_iter()
        .take(top_k)
        .enumerate()
        .map(|(i, (crop, score))| {
            let reasons = reasons_for(&crop, input);
            CropRecommendation {
                confidence: Confidence::from_score(score),
                reasons,
                crop,
                score,
                rank: i + 1,
            }
        })
        .collect()
}

/// Deterministic per-crop reason rules, capped at 3 entries. When no rule
/// fires, a single generic locality reason keeps the list non-empty.
fn reasons_for(crop: &str, input: &RawInput) -> SmallVec<[String; 3]> {
    let soil_ph = schema::num_field(input, "soil_ph").unwrap_or(6.5);
    let soil_moisture = schema::num_field(input, "soil_moisture").unwrap_or(60.0);
    let soil_nitrogen = schema::num_field(input, "soil_nitrogen").unwrap_or(60.0);
    let avg_temp = schema::num_field(input, "avg_temperature").unwrap_or(25.0);
    let rainfall = schema::num_field(input, "rainfall").unwrap_or(4.0);

    let mut reasons: SmallVec<[String; 3]> = SmallVec::new();
    match crop {
        "Rice" => {
            if soil_moisture >= 60.0 {
                reasons.push("High soil moisture suitable for rice".to_string());
            }
            if avg_temp >= 25.0 {
                reasons.push("Warm temperature ideal for rice growth".to_string());
            }
            if rainfall >= 5.0 {
                reasons.push("Adequate rainfall for rice cultivation".to_string());
            }
        }
        "Wheat" => {
            if soil_ph >= 6.5 {
                reasons.push("Optimal soil pH for wheat".to_string());
            }
            if (15.0..=25.0).contains(&avg_temp) {
                reasons.push("Cool temperature suitable for wheat".to_string());
            }
            if soil_nitrogen >= 60.0 {
                reasons.push("Good nitrogen levels for wheat".to_string());
            }
        }
        "Maize" => {
            if soil_ph >= 6.0 {
                reasons.push("Good soil pH for maize".to_string());
            }
            if avg_temp >= 20.0 {
                reasons.push("Warm temperature suitable for maize".to_string());
            }
            if rainfall >= 3.0 {
                reasons.push("Adequate rainfall for maize".to_string());
            }
        }
        "Sugarcane" => {
            if soil_moisture >= 70.0 {
                reasons.push("High moisture requirement met".to_string());
            }
            if avg_temp >= 25.0 {
                reasons.push("Warm temperature ideal for sugarcane".to_string());
            }
        }
        "Cotton" => {
            if (6.5..=7.5).contains(&soil_ph) {
                reasons.push("Optimal soil pH for cotton".to_string());
            }
            if (20.0..=30.0).contains(&avg_temp) {
                reasons.push("Suitable temperature for cotton".to_string());
            }
        }
        _ => {}
    }

    if reasons.is_empty() {
        let state = schema::str_field(input, "state").unwrap_or("local");
        reasons.push(format!("Suitable for {} conditions", state));
    }
    reasons.truncate(3);
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn punjab_input() -> RawInput {
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
    fn test_fallback_ranks_are_dense_and_one_based() {
        let recs = rank_fallback(&punjab_input(), 5, &mut JitterSource::disabled());
        assert_eq!(recs.len(), 5);
        for (i, rec) in recs.iter().enumerate() {
            assert_eq!(rec.rank, i + 1);
            assert!(!rec.reasons.is_empty() && rec.reasons.len() <= 3);
            assert!((FALLBACK_SCORE_FLOOR..=FALLBACK_SCORE_CEILING).contains(&rec.score));
        }
        // Stable sort: scores never increase down the list
        for pair in recs.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_punjab_top_recommendation_is_high_confidence_staple() {
        let recs = rank_fallback(&punjab_input(), 5, &mut JitterSource::disabled());
        let top = &recs[0];
        assert!(top.crop == "Wheat" || top.crop == "Rice");
        assert_eq!(top.confidence, Confidence::High);
    }

    #[test]
    fn test_unknown_state_gets_default_candidates() {
        let mut input = punjab_input();
        input.insert("state".to_string(), json!("atlantis"));
        let recs = rank_fallback(&input, 5, &mut JitterSource::disabled());
        assert_eq!(recs.len(), 3);
        let crops: Vec<&str> = recs.iter().map(|r| r.crop.as_str()).collect();
        assert!(crops.contains(&"Rice"));
    }

    #[test]
    fn test_generic_reason_when_no_rule_fires() {
        // Turmeric has no rule entries
        let reasons = reasons_for("Turmeric", &punjab_input());
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("punjab"));
    }

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(Confidence::from_score(0.71), Confidence::High);
        assert_eq!(Confidence::from_score(0.7), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.41), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.4), Confidence::Low);
    }

    #[test]
    fn test_top_k_caps_the_list() {
        let recs = rank_fallback(&punjab_input(), 2, &mut JitterSource::disabled());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].rank, 2);
    }
}
