//! Defensive normalization of assessor payloads.
//!
//! The external service is not trusted to honor its own contract. A payload
//! without a usable score is malformed outright; individually broken list
//! entries are dropped rather than failing the whole verdict.

use serde_json::Value;

use crate::reasoning::{
    error::{ReasoningError, malformed},
    types::{BoundingBoxAnnotation, ReasoningVerdict},
};

const GRID_MAX: u16 = 1000;

pub fn normalize(payload: &Value) -> Result<ReasoningVerdict, ReasoningError> {
    let object = payload
        .as_object()
        .ok_or_else(|| malformed("payload is not an object"))?;

    let authenticity_score = match object.get("authenticity_score") {
        Some(Value::Number(number)) => {
            let score = number
                .as_u64()
                .ok_or_else(|| malformed(format!("authenticity_score {number} is not an integer")))?;
            if score > 100 {
                return Err(malformed(format!(
                    "authenticity_score {score} exceeds 100"
                )));
            }
            score as u8
        }
        Some(other) => {
            return Err(malformed(format!(
                "authenticity_score has unexpected type: {other}"
            )));
        }
        None => return Err(malformed("authenticity_score is missing")),
    };

    let flagged_issues = object
        .get("flagged_issues")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(|issue| issue.trim().to_string())
                .filter(|issue| !issue.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let reasoning = object
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|summary| !summary.is_empty())
        .map(str::to_string);

    let bounding_boxes = object
        .get("bounding_boxes")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(parse_bounding_box).collect())
        .unwrap_or_default();

    Ok(ReasoningVerdict {
        authenticity_score,
        flagged_issues,
        reasoning,
        summary,
        bounding_boxes,
    })
}

fn parse_bounding_box(entry: &Value) -> Option<BoundingBoxAnnotation> {
    let object = entry.as_object()?;
    let label = object.get("label")?.as_str()?.trim();
    if label.is_empty() {
        return None;
    }
    let coordinates = object.get("box_2d")?.as_array()?;
    if coordinates.len() != 4 {
        return None;
    }
    let mut box_2d = [0u16; 4];
    for (slot, coordinate) in box_2d.iter_mut().zip(coordinates) {
        let value = coordinate.as_u64()?;
        if value > u64::from(GRID_MAX) {
            return None;
        }
        *slot = value as u16;
    }
    Some(BoundingBoxAnnotation {
        box_2d,
        label: label.to_string(),
    })
}
