//! Classification stage ("light analysis"): contract type and parties in
//! one inference call, with a heuristic fallback.

use chrono::Utc;
use pactlens_inference::ResponseFormat;
use pactlens_shared::{AnalysisRecord, ContractType, Document, Party, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::heuristics;
use crate::pipeline::{PipelineDeps, denormalize_type};
use crate::prompts;
use crate::validate::{self, ClassificationOutput};

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Inference,
    Heuristic,
}

/// Result of the classification stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub detected_type: ContractType,
    pub confidence: f64,
    pub reasoning: String,
    pub parties: Vec<Party>,
    pub source: ClassificationSource,
}

impl From<ClassificationOutput> for Classification {
    fn from(out: ClassificationOutput) -> Self {
        Self {
            detected_type: out.detected_type,
            confidence: out.confidence,
            reasoning: out.reasoning,
            parties: out.parties,
            source: ClassificationSource::Inference,
        }
    }
}

/// Classify a document and upsert its partial analysis record.
///
/// Inference failures never fail this stage; persistence failures do.
#[instrument(skip_all, fields(document = %document.id))]
pub(crate) async fn run(deps: &PipelineDeps, document: &Document, text: &str) -> Result<Classification> {
    let prompt = prompts::classification(prompts::leading_chars(text, deps.limits.classify_chars));

    let classification = match deps.inference.generate(&prompt, ResponseFormat::Json).await {
        Ok(raw) => match validate::parse_classification(&raw) {
            Ok(out) => Classification::from(out),
            Err(e) => {
                warn!(error = %e, "classifier output unusable, using heuristics");
                heuristic_classification(text, Some(&raw))
            }
        },
        Err(e) => {
            warn!(error = %e, "classifier call failed, using heuristics");
            heuristic_classification(text, None)
        }
    };

    upsert_partial(deps, document, &classification).await?;
    denormalize_type(&deps.storage, document, classification.detected_type).await;

    info!(
        detected_type = %classification.detected_type,
        parties = classification.parties.len(),
        source = ?classification.source,
        "classification complete"
    );
    Ok(classification)
}

/// Best-effort classification from the raw text alone.
///
/// The full text is scanned, not just the prefix given to the classifier.
pub fn heuristic_classification(text: &str, raw_output: Option<&str>) -> Classification {
    let salvaged = raw_output.and_then(heuristics::salvage_detected_type);

    let (detected_type, reasoning) = match salvaged {
        Some(t) => (t, "Recovered from unparseable classifier output"),
        None if heuristics::has_employment_cues(text) => (
            ContractType::Employment,
            "Detected from contract text keywords",
        ),
        None => (ContractType::Other, "No classification signal in contract text"),
    };

    Classification {
        detected_type,
        confidence: 0.0,
        reasoning: reasoning.into(),
        parties: heuristics::extract_parties(text),
        source: ClassificationSource::Heuristic,
    }
}

async fn upsert_partial(
    deps: &PipelineDeps,
    document: &Document,
    classification: &Classification,
) -> Result<()> {
    let storage = &deps.storage;

    match storage.find_latest_analysis(&document.id).await? {
        Some(record) if record.is_terminal() => {
            debug!(record = %record.id, "record already terminal, leaving it untouched");
        }
        Some(mut record) => {
            record.parties = merge_parties(&record.parties, &classification.parties);
            if record.detected_type.is_none() || classification.detected_type != ContractType::Other {
                record.detected_type = Some(classification.detected_type);
            }
            record.updated_at = Utc::now();
            if !storage.update_partial_analysis(&record).await? {
                warn!(record = %record.id, "partial record changed concurrently, merge skipped");
            }
        }
        None => {
            let record = AnalysisRecord::partial(
                document.id.clone(),
                Some(classification.detected_type),
                classification.parties.clone(),
            );
            if !storage.insert_analysis(&record).await? {
                warn!("analysis record created concurrently, insert skipped");
            }
        }
    }
    Ok(())
}

/// Union by exact name, existing parties first.
fn merge_parties(existing: &[Party], incoming: &[Party]) -> Vec<Party> {
    let mut merged = existing.to_vec();
    for party in incoming {
        if !merged.iter().any(|p| p.name == party.name) {
            merged.push(party.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scripted_deps, seed_document};
    use pactlens_shared::PactLensError;

    const TEXT: &str = "This Agreement is between Acme Corp and John Smith. The Employee shall receive a salary.";

    #[tokio::test]
    async fn unparseable_output_falls_back_to_heuristics() {
        let (deps, _) = scripted_deps(vec![Ok("I'm sorry, I can't help with that.".into())]).await;
        let document = seed_document(&deps.storage, "alice", TEXT).await;

        let result = run(&deps, &document, TEXT).await.unwrap();
        assert_eq!(result.source, ClassificationSource::Heuristic);
        let names: Vec<_> = result.parties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Acme Corp", "John Smith"]);
        assert_eq!(result.detected_type, ContractType::Employment);

        let record = deps.storage.find_latest_analysis(&document.id).await.unwrap().unwrap();
        assert!(!record.is_terminal());
        assert_eq!(record.parties.len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_is_not_fatal() {
        let (deps, _) = scripted_deps(vec![Err(PactLensError::InferenceTransport("down".into()))]).await;
        let document = seed_document(&deps.storage, "alice", TEXT).await;
        let result = run(&deps, &document, TEXT).await.unwrap();
        assert_eq!(result.source, ClassificationSource::Heuristic);
    }

    #[test]
    fn salvaged_type_beats_keywords() {
        let raw = r#"{"detected_type": "NDA", "parties": [ {"name": "Acme"#;
        let classification = heuristic_classification(TEXT, Some(raw));
        assert_eq!(classification.detected_type, ContractType::Nda);
    }

    #[tokio::test]
    async fn inference_result_creates_partial_record_and_sets_type() {
        let (deps, inference) = scripted_deps(vec![Ok(r#"```json
{"detected_type": "Employment", "confidence": 0.9, "reasoning": "salary",
 "parties": [{"name": "Acme Inc", "role": "Employer", "description": "Hiring company"}]}
```"#
            .into())])
        .await;
        let document = seed_document(&deps.storage, "alice", TEXT).await;

        let result = run(&deps, &document, TEXT).await.unwrap();
        assert_eq!(result.source, ClassificationSource::Inference);
        assert_eq!(inference.format(0), ResponseFormat::Json);

        let stored = deps.storage.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(stored.detected_type, Some(ContractType::Employment));
        let record = deps.storage.find_latest_analysis(&document.id).await.unwrap().unwrap();
        assert_eq!(record.parties[0].name, "Acme Inc");
    }

    #[tokio::test]
    async fn rerun_merges_parties_into_partial_record() {
        let first = r#"{"detected_type": "Employment", "parties": [{"name": "Acme Inc", "role": "Employer"}]}"#;
        let second = r#"{"detected_type": "Other", "parties": [{"name": "Jane Doe", "role": "Employee"}, {"name": "Acme Inc", "role": "Company"}]}"#;
        let (deps, _) = scripted_deps(vec![Ok(first.into()), Ok(second.into())]).await;
        let document = seed_document(&deps.storage, "alice", TEXT).await;

        run(&deps, &document, TEXT).await.unwrap();
        run(&deps, &document, TEXT).await.unwrap();

        let record = deps.storage.find_latest_analysis(&document.id).await.unwrap().unwrap();
        let names: Vec<_> = record.parties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Acme Inc", "Jane Doe"]);
        assert_eq!(record.parties[0].role, "Employer");
        assert_eq!(record.detected_type, Some(ContractType::Employment));
    }

    #[tokio::test]
    async fn classifier_sees_bounded_prefix() {
        let long_text = "x".repeat(50_000);
        let (deps, inference) = scripted_deps(vec![Ok("{}".into())]).await;
        let document = seed_document(&deps.storage, "alice", &long_text).await;
        run(&deps, &document, &long_text).await.unwrap();
        let prompt = inference.prompt(0);
        assert!(prompt.contains(&"x".repeat(deps.limits.classify_chars)));
        assert!(!prompt.contains(&"x".repeat(deps.limits.classify_chars + 1)));
    }

    #[test]
    fn merge_keeps_existing_first() {
        let existing = vec![Party::new("Acme Inc", "Employer", "d")];
        let incoming = vec![Party::new("Acme Inc", "Party", "x"), Party::new("Jane", "Employee", "y")];
        let merged = merge_parties(&existing, &incoming);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].role, "Employer");
    }
}
