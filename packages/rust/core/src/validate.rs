//! Validation and repair of semi-structured inference output.
//!
//! The inference service is expected to answer with one JSON object, but
//! frequently wraps it in code fences or prose. Everything here is a pure
//! function of the raw text.

use pactlens_shared::{Clauses, ContractType, Opportunity, Party, Risk};
use serde_json::{Map, Value};

/// Clause groups that must be present, with accepted aliases.
const CLAUSE_GROUPS: [(&str, &[&str]); 7] = [
    ("payment", &[]),
    ("liability", &[]),
    ("termination", &[]),
    ("confidentiality", &[]),
    ("ip", &[]),
    ("law", &["governing_law", "governing-law"]),
    ("renewal", &[]),
];

/// Why inference output could not be accepted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OutputError {
    /// No parseable JSON object in the output.
    #[error("malformed output: {0}")]
    Malformed(String),

    /// The model answered with a top-level `error` field.
    #[error("rejected by model: {0}")]
    Rejected(String),

    /// The object parsed but violates the expected shape.
    #[error("schema violations: {}", .0.join("; "))]
    Schema(Vec<String>),
}

/// A full analysis that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAnalysis {
    pub detected_type: Option<ContractType>,
    /// `Some` only when the output explicitly supplied at least one party.
    pub parties: Option<Vec<Party>>,
    pub score: u8,
    pub clauses: Clauses,
    pub risks: Vec<Risk>,
    pub opportunities: Vec<Opportunity>,
    pub summary: Option<String>,
    pub recommendations: Option<String>,
    pub negotiation_points: Vec<String>,
}

/// Classifier output after cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutput {
    pub detected_type: ContractType,
    pub confidence: f64,
    pub reasoning: String,
    pub parties: Vec<Party>,
}

/// Remove code-fence markers and cut the text down to its outermost `{...}`.
pub fn extract_json_object(raw: &str) -> Option<String> {
    let cleaned = raw.replace("```json", "").replace("```JSON", "").replace("```", "");
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    Some(cleaned[start..=end].to_string())
}

/// Parse the raw output into a JSON object, detecting domain rejections.
pub fn parse_object(raw: &str) -> Result<Map<String, Value>, OutputError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| OutputError::Malformed("no JSON object found".into()))?;

    let value: Value =
        serde_json::from_str(&json).map_err(|e| OutputError::Malformed(e.to_string()))?;

    let Value::Object(object) = value else {
        return Err(OutputError::Malformed("top-level value is not an object".into()));
    };

    if let Some(reason) = rejection_reason(object.get("error")) {
        return Err(OutputError::Rejected(reason));
    }
    Ok(object)
}

fn rejection_reason(error: Option<&Value>) -> Option<String> {
    match error? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

/// Validate full-analysis output.
///
/// Repairs run first (severity case-folding, blank strings to null); the
/// shape check after that is all-or-nothing.
pub fn validate_analysis(raw: &str) -> Result<ValidatedAnalysis, OutputError> {
    let mut object = parse_object(raw)?;
    repair_analysis(&mut object);

    let mut violations = Vec::new();

    let clauses = check_clauses(object.get("clauses"), &mut violations);
    let risks: Option<Vec<Risk>> = check_array(&object, "risks", &mut violations);
    let opportunities: Option<Vec<Opportunity>> =
        check_array(&object, "opportunities", &mut violations);
    let negotiation_points: Option<Vec<String>> =
        check_array(&object, "negotiation_points", &mut violations);
    let score = check_score(object.get("score"), &mut violations);

    let (Some(clauses), Some(risks), Some(opportunities), Some(negotiation_points), Some(score)) =
        (clauses, risks, opportunities, negotiation_points, score)
    else {
        return Err(OutputError::Schema(violations));
    };

    let parties = object
        .get("parties")
        .and_then(Value::as_array)
        .map(|values| clean_parties(values))
        .filter(|parties| !parties.is_empty());

    Ok(ValidatedAnalysis {
        detected_type: optional_text(&object, "detected_type").map(|t| ContractType::from_label(&t)),
        parties,
        score,
        clauses,
        risks,
        opportunities,
        summary: optional_text(&object, "summary"),
        recommendations: optional_text(&object, "recommendations"),
        negotiation_points,
    })
}

/// Parse classifier output. Only unparseable output is an error; missing
/// fields fall back to neutral values.
pub fn parse_classification(raw: &str) -> Result<ClassificationOutput, OutputError> {
    let object = parse_object(raw)?;

    let detected_type = match object.get("detected_type").and_then(Value::as_str) {
        Some(label) if ContractType::is_known_label(label) => ContractType::from_label(label),
        Some(label) => {
            tracing::warn!(label, "classifier returned a type outside the vocabulary");
            ContractType::Other
        }
        None => ContractType::Other,
    };

    Ok(ClassificationOutput {
        detected_type,
        confidence: object
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.0),
        reasoning: optional_text(&object, "reasoning").unwrap_or_default(),
        parties: object
            .get("parties")
            .and_then(Value::as_array)
            .map(|values| clean_parties(values))
            .unwrap_or_default(),
    })
}

/// Keep parties with a non-empty name and fill in missing role/description.
pub fn clean_parties(values: &[Value]) -> Vec<Party> {
    values
        .iter()
        .filter_map(|value| {
            let name = value.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let role = non_blank(value.get("role")).unwrap_or("Party");
            let description = non_blank(value.get("description")).unwrap_or("Party in the contract");
            Some(Party::new(name, role, description))
        })
        .collect()
}

fn non_blank(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn optional_text(object: &Map<String, Value>, key: &str) -> Option<String> {
    non_blank(object.get(key)).map(str::to_string)
}

// ---------------------------------------------------------------------------
// Repairs
// ---------------------------------------------------------------------------

fn repair_analysis(object: &mut Map<String, Value>) {
    if let Some(Value::Array(risks)) = object.get_mut("risks") {
        for risk in risks.iter_mut() {
            if let Some(Value::String(severity)) = risk.get_mut("severity") {
                *severity = severity.trim().to_lowercase();
            }
        }
    }

    if let Some(Value::Object(clauses)) = object.get_mut("clauses") {
        for group in clauses.values_mut() {
            if let Value::Object(fields) = group {
                for field in fields.values_mut() {
                    if matches!(field, Value::String(s) if s.trim().is_empty()) {
                        *field = Value::Null;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shape checks
// ---------------------------------------------------------------------------

fn check_clauses(value: Option<&Value>, violations: &mut Vec<String>) -> Option<Clauses> {
    let Some(Value::Object(groups)) = value else {
        violations.push("clauses: missing or not an object".into());
        return None;
    };

    let mut complete = true;
    for (name, aliases) in CLAUSE_GROUPS {
        let group = std::iter::once(name)
            .chain(aliases.iter().copied())
            .find_map(|key| groups.get(key));
        match group {
            Some(Value::Object(_)) => {}
            Some(_) => {
                violations.push(format!("clauses.{name}: not an object"));
                complete = false;
            }
            None => {
                violations.push(format!("clauses.{name}: missing"));
                complete = false;
            }
        }
    }
    if !complete {
        return None;
    }

    match serde_json::from_value(Value::Object(groups.clone())) {
        Ok(clauses) => Some(clauses),
        Err(e) => {
            violations.push(format!("clauses: {e}"));
            None
        }
    }
}

fn check_array<T: serde::de::DeserializeOwned>(
    object: &Map<String, Value>,
    key: &str,
    violations: &mut Vec<String>,
) -> Option<Vec<T>> {
    match object.get(key) {
        Some(value @ Value::Array(_)) => match serde_json::from_value(value.clone()) {
            Ok(items) => Some(items),
            Err(e) => {
                violations.push(format!("{key}: {e}"));
                None
            }
        },
        Some(_) => {
            violations.push(format!("{key}: not an array"));
            None
        }
        None => {
            violations.push(format!("{key}: missing"));
            None
        }
    }
}

fn check_score(value: Option<&Value>, violations: &mut Vec<String>) -> Option<u8> {
    let Some(score) = value.and_then(Value::as_f64) else {
        violations.push("score: missing or not a number".into());
        return None;
    };
    if !(0.0..=100.0).contains(&score) {
        violations.push(format!("score: {score} outside 0-100"));
        return None;
    }
    Some(score.round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pactlens_shared::Severity;

    fn analysis_json(score: &str, severity: &str) -> String {
        format!(
            r#"{{
                "detected_type": "Employment",
                "clauses": {{
                    "payment": {{"amount": "$120,000 per year", "schedule": "", "late_fees": null}},
                    "liability": {{}},
                    "termination": {{"notice": "30 days", "auto_renewal": false}},
                    "confidentiality": {{}},
                    "ip": {{}},
                    "law": {{"governing_law": "Delaware"}},
                    "renewal": {{}}
                }},
                "risks": [{{"type": "Termination", "severity": "{severity}", "excerpt": "at will", "note": "no severance"}}],
                "opportunities": [{{"type": "Equity", "excerpt": "options", "note": "negotiate vesting"}}],
                "score": {score},
                "negotiation_points": ["Ask for severance"]
            }}"#
        )
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(raw).as_deref(), Some("{\"a\": 1}"));
        assert!(extract_json_object("no json here").is_none());
    }

    #[test]
    fn severity_is_case_folded() {
        for severity in ["HIGH", "High", "high", " high "] {
            let analysis = validate_analysis(&analysis_json("55", severity)).expect("valid");
            assert_eq!(analysis.risks[0].severity, Severity::High);
        }
    }

    #[test]
    fn unknown_severity_fails_validation() {
        let err = validate_analysis(&analysis_json("55", "critical")).unwrap_err();
        assert!(matches!(err, OutputError::Schema(_)));
    }

    #[test]
    fn blank_clause_fields_become_null() {
        let analysis = validate_analysis(&analysis_json("55", "low")).unwrap();
        assert_eq!(analysis.clauses.payment.schedule, None);
        assert_eq!(analysis.clauses.payment.amount.as_deref(), Some("$120,000 per year"));
        assert_eq!(analysis.clauses.law.governing_law.as_deref(), Some("Delaware"));
        assert!(analysis.summary.is_none());
        assert!(analysis.parties.is_none());
    }

    #[test]
    fn score_bounds() {
        assert_eq!(validate_analysis(&analysis_json("0", "low")).unwrap().score, 0);
        assert_eq!(validate_analysis(&analysis_json("100", "low")).unwrap().score, 100);
        assert_eq!(validate_analysis(&analysis_json("69.6", "low")).unwrap().score, 70);
        for bad in ["101", "-1", "\"eighty\""] {
            let err = validate_analysis(&analysis_json(bad, "low")).unwrap_err();
            match err {
                OutputError::Schema(v) => assert!(v.iter().any(|m| m.starts_with("score"))),
                other => panic!("expected schema error, got {other:?}"),
            }
        }
    }

    #[test]
    fn missing_clause_group_fails_whole_record() {
        let raw = analysis_json("80", "low").replace(r#""renewal": {}"#, r#""extra": {}"#);
        match validate_analysis(&raw).unwrap_err() {
            OutputError::Schema(v) => assert!(v.contains(&"clauses.renewal: missing".to_string())),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn governing_law_alias_is_accepted() {
        let raw = analysis_json("80", "low").replace(r#""law":"#, r#""governing_law":"#);
        let analysis = validate_analysis(&raw).unwrap();
        assert_eq!(analysis.clauses.law.governing_law.as_deref(), Some("Delaware"));
    }

    #[test]
    fn error_field_is_rejection() {
        let err = validate_analysis(r#"{"error": "not a contract"}"#).unwrap_err();
        assert_eq!(err, OutputError::Rejected("not a contract".into()));

        let err = parse_classification("```json\n{\"error\": \"spam\"}\n```").unwrap_err();
        assert_eq!(err, OutputError::Rejected("spam".into()));
    }

    #[test]
    fn null_error_field_is_ignored() {
        let raw = analysis_json("80", "low").replacen('{', r#"{"error": null,"#, 1);
        assert!(validate_analysis(&raw).is_ok());
    }

    #[test]
    fn classification_collapses_unknown_type() {
        let out = parse_classification(
            r#"{"detected_type": "Franchise Agreement", "confidence": 1.7, "parties": []}"#,
        )
        .unwrap();
        assert_eq!(out.detected_type, ContractType::Other);
        assert_eq!(out.confidence, 1.0);
        assert!(out.parties.is_empty());
    }

    #[test]
    fn parties_are_cleaned() {
        let values: Vec<Value> = serde_json::from_str(
            r#"[
                {"name": "  Acme Inc ", "role": "Employer", "description": "Hiring company"},
                {"name": "Jane Doe"},
                {"name": "   "},
                {"role": "Witness"}
            ]"#,
        )
        .unwrap();
        let parties = clean_parties(&values);
        assert_eq!(parties.len(), 2);
        assert_eq!(parties[0].name, "Acme Inc");
        assert_eq!(parties[1].role, "Party");
        assert_eq!(parties[1].description, "Party in the contract");
    }
}
