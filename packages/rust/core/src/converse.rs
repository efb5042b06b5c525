//! Conversational stage: answers questions about one contract, optionally
//! augmented with external search results.

use pactlens_inference::ResponseFormat;
use pactlens_shared::{ChatTurn, Document, PactLensError, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::augment;
use crate::pipeline::PipelineDeps;
use crate::prompts::{self, ChatContext};
use crate::retrieval::{self, NormalizedResults, RetrievedItem};

/// One answered turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    /// Whether external results were put in front of the model.
    pub augmented: bool,
    pub sources: Vec<RetrievedItem>,
    /// Whether the answer references at least one source. `None` when not augmented.
    pub cited_sources: Option<bool>,
}

#[instrument(skip_all, fields(document = %document.id, history = history.len()))]
pub(crate) async fn run(
    deps: &PipelineDeps,
    document: &Document,
    text: &str,
    history: &[ChatTurn],
    question: &str,
) -> Result<ChatAnswer> {
    let question = question.trim();
    if question.is_empty() {
        return Err(PactLensError::validation("Question must not be empty."));
    }

    let analysis = deps.storage.find_latest_analysis(&document.id).await?;

    let decision = augment::decide(question, deps.inference.as_ref(), deps.retrieval.is_some()).await;
    debug!(decision = ?decision.decision, reason = ?decision.reason, "augmentation decided");

    let results = if decision.augment() {
        fetch_sources(deps, question).await
    } else {
        NormalizedResults::Empty
    };
    let rendered = results.render();

    let prompt = prompts::chat(&ChatContext {
        document,
        text: prompts::leading_chars(text, deps.limits.chat_chars),
        analysis: analysis.as_ref(),
        history,
        question,
        sources: rendered.as_deref(),
    });

    let answer = deps.inference.generate(&prompt, ResponseFormat::Text).await?;
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(PactLensError::InferenceEmpty);
    }

    let augmented = rendered.is_some();
    let cited_sources = augmented.then(|| cites_sources(answer, &results));
    if cited_sources == Some(false) {
        warn!("answer does not reference the supplied sources");
    }

    info!(augmented, sources = results.items().len(), "answer ready");
    Ok(ChatAnswer {
        answer: answer.to_string(),
        augmented,
        sources: results.items().to_vec(),
        cited_sources,
    })
}

/// Search and normalize. Failures degrade to no augmentation.
async fn fetch_sources(deps: &PipelineDeps, question: &str) -> NormalizedResults {
    let Some(retrieval) = deps.retrieval.as_ref() else {
        return NormalizedResults::Empty;
    };
    match retrieval.search(question, deps.retrieval_max_results).await {
        Ok(payload) => {
            let results = retrieval::normalize_results(&payload, &deps.limits);
            if results.is_empty() {
                debug!("search returned nothing usable");
            }
            results
        }
        Err(e) => {
            warn!(error = %e, "search failed, answering without it");
            NormalizedResults::Empty
        }
    }
}

/// Does the answer mention a source label, title or URL?
fn cites_sources(answer: &str, results: &NormalizedResults) -> bool {
    let lowered = answer.to_lowercase();
    let count = match results {
        NormalizedResults::Items(items) => items.len(),
        NormalizedResults::Passthrough(_) => 1,
        NormalizedResults::Empty => 0,
    };
    if (1..=count).any(|n| lowered.contains(&format!("source {n}"))) {
        return true;
    }
    results.items().iter().any(|item| {
        item.title
            .as_deref()
            .is_some_and(|t| lowered.contains(&t.to_lowercase()))
            || item.url.as_deref().is_some_and(|u| answer.contains(u))
    })
}
