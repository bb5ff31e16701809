use serde::{ Deserialize, Serialize };
use serde_json::Value;
use std::collections::BTreeMap;

/// How-to material for creating a club.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClubGuide {
    /// Free-form guide content, usually markdown text or a list of steps.
    pub guide: Value,
    /// Field name to requirement, e.g. `"description" -> "At least 200 characters"`.
    pub requirements: BTreeMap<String, String>,
    pub tips: Vec<String>,
}

/// Server verdict on the club data collected so far.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClubValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub score: f64,
    pub is_valid: bool,
    pub grade: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validation_tolerates_missing_fields() {
        let validation: ClubValidation = serde_json::from_value(
            json!({ "errors": ["name is required"], "score": 0, "is_valid": false })
        ).unwrap();
        assert_eq!(validation.errors, vec!["name is required"]);
        assert!(validation.grade.is_none());
        assert!(validation.warnings.is_empty());
    }
}
