//! Full analysis stage: clauses, risks, opportunities, score and guidance.

use chrono::Utc;
use pactlens_inference::ResponseFormat;
use pactlens_shared::{AnalysisRecord, ContractType, Document, PactLensError, Result, is_favorable};
use tracing::{info, instrument, warn};

use crate::pipeline::{PipelineDeps, denormalize_type};
use crate::prompts;
use crate::validate::{self, OutputError, ValidatedAnalysis};

pub fn default_summary(score: u8) -> String {
    format!("Contract analysis completed with a score of {score}/100.")
}

pub fn default_recommendations(score: u8, favorable: bool) -> String {
    let verdict = if favorable {
        "this contract appears favorable"
    } else {
        "review the identified risks and opportunities"
    };
    format!("Based on the score of {score}/100, {verdict}.")
}

/// Run full analysis and persist the terminal record.
///
/// At most one terminal record exists per document: an existing terminal
/// record, or losing a race to another writer, yields
/// [`PactLensError::AlreadyAnalyzed`].
#[instrument(skip_all, fields(document = %document.id))]
pub(crate) async fn run(deps: &PipelineDeps, document: &Document, text: &str) -> Result<AnalysisRecord> {
    let existing = deps.storage.find_latest_analysis(&document.id).await?;
    if existing.as_ref().is_some_and(AnalysisRecord::is_terminal) {
        return Err(PactLensError::AlreadyAnalyzed);
    }

    let prompt = prompts::analysis(
        prompts::leading_chars(text, deps.limits.analysis_chars),
        document.selected_party.as_deref(),
    );
    let raw = deps.inference.generate(&prompt, ResponseFormat::Json).await?;
    if raw.trim().is_empty() {
        return Err(PactLensError::InferenceEmpty);
    }

    let validated = validate::validate_analysis(&raw).map_err(|e| match e {
        OutputError::Rejected(reason) => {
            info!(%reason, "document rejected as not a contract");
            PactLensError::DomainRejection(reason)
        }
        other => {
            warn!(error = %other, "analysis output failed validation");
            PactLensError::InvalidAnalysis(other.to_string())
        }
    })?;

    let is_update = existing.is_some();
    let base = existing
        .unwrap_or_else(|| AnalysisRecord::partial(document.id.clone(), None, Vec::new()));
    let record = complete_record(base, validated);

    let written = if is_update {
        deps.storage.update_partial_analysis(&record).await?
    } else {
        deps.storage.insert_analysis(&record).await?
    };
    if !written {
        return Err(lost_race(deps, document).await);
    }

    if let Some(t) = record.detected_type.filter(|t| *t != ContractType::Other) {
        denormalize_type(&deps.storage, document, t).await;
    }

    info!(
        score = record.score,
        favorable = record.favorable,
        risks = record.risks.len(),
        opportunities = record.opportunities.len(),
        "analysis complete"
    );
    Ok(record)
}

/// Fold validated output into the (possibly partial) record.
fn complete_record(mut record: AnalysisRecord, analysis: ValidatedAnalysis) -> AnalysisRecord {
    let favorable = is_favorable(analysis.score);

    record.detected_type = analysis
        .detected_type
        .filter(|t| *t != ContractType::Other)
        .or(record.detected_type);
    if let Some(parties) = analysis.parties {
        record.parties = parties;
    }
    record.score = Some(analysis.score);
    record.favorable = Some(favorable);
    record.clauses = analysis.clauses;
    record.risks = analysis.risks;
    record.opportunities = analysis.opportunities;
    record.summary = Some(
        analysis
            .summary
            .unwrap_or_else(|| default_summary(analysis.score)),
    );
    record.recommendations = Some(
        analysis
            .recommendations
            .unwrap_or_else(|| default_recommendations(analysis.score, favorable)),
    );
    record.negotiation_points = analysis.negotiation_points;
    record.updated_at = Utc::now();
    record
}

/// Explain a write that matched nothing.
async fn lost_race(deps: &PipelineDeps, document: &Document) -> PactLensError {
    match deps.storage.find_latest_analysis(&document.id).await {
        Ok(Some(current)) if current.is_terminal() => {
            warn!("concurrent analysis finished first");
            PactLensError::AlreadyAnalyzed
        }
        Ok(_) => PactLensError::Persistence("analysis record changed during analysis".into()),
        Err(e) => e,
    }
}
