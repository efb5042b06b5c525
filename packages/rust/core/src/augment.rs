//! Decides whether a conversational answer should be augmented with
//! external search results.
//!
//! Cheap deterministic checks run first; the inference classifier is only
//! consulted when neither an explicit search request nor a fact keyword
//! settles the question.

use std::sync::LazyLock;

use pactlens_inference::{InferenceService, ResponseFormat};
use regex::Regex;
use tracing::{debug, warn};

use crate::prompts;

static SEARCH_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(search|online|web|internet|look\s+(?:it\s+)?up|lookup|google)\b")
        .expect("valid regex")
});

static FACT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(current(?:ly)?|latest|today|recent(?:ly)?|this\s+year|tax(?:es|ation)?|interest\s+rates?|exchange\s+rates?|inflation|minimum\s+wage|market|benchmarks?|average|industry\s+standard|typical|laws?|legal(?:ly)?|legislation|regulat\w*|statut\w*|complian\w*|enforceab\w*|calculat\w*|convert)\b",
    )
    .expect("valid regex")
});

/// Augmentation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentDecision {
    NoAugment,
    Augment,
}

/// What settled the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// No retrieval service is configured.
    RetrievalUnavailable,
    /// The user asked for a search explicitly.
    SearchCue,
    /// The question mentions externally verifiable facts.
    FactKeyword,
    /// The yes/no classifier answered.
    Classifier,
    /// The classifier call failed or answered neither yes nor no.
    ClassifierFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub decision: AugmentDecision,
    pub reason: DecisionReason,
}

impl Decision {
    fn new(decision: AugmentDecision, reason: DecisionReason) -> Self {
        Self { decision, reason }
    }

    pub fn augment(&self) -> bool {
        self.decision == AugmentDecision::Augment
    }
}

pub fn has_search_cue(question: &str) -> bool {
    SEARCH_CUE.is_match(question)
}

pub fn has_fact_keyword(question: &str) -> bool {
    FACT_KEYWORD.is_match(question)
}

/// Run the decision procedure for one question.
pub async fn decide(
    question: &str,
    inference: &dyn InferenceService,
    retrieval_available: bool,
) -> Decision {
    if !retrieval_available {
        return Decision::new(AugmentDecision::NoAugment, DecisionReason::RetrievalUnavailable);
    }
    if has_search_cue(question) {
        return Decision::new(AugmentDecision::Augment, DecisionReason::SearchCue);
    }
    // A keyword match forces augmentation, so the classifier only ever runs
    // when the keyword result is "no".
    if has_fact_keyword(question) {
        return Decision::new(AugmentDecision::Augment, DecisionReason::FactKeyword);
    }

    let reply = inference
        .generate(&prompts::augmentation_check(question), ResponseFormat::Text)
        .await;

    match reply.as_deref().map(parse_yes_no) {
        Ok(Some(true)) => Decision::new(AugmentDecision::Augment, DecisionReason::Classifier),
        Ok(Some(false)) => Decision::new(AugmentDecision::NoAugment, DecisionReason::Classifier),
        Ok(None) => {
            debug!("augmentation classifier gave no clear answer");
            Decision::new(AugmentDecision::NoAugment, DecisionReason::ClassifierFailed)
        }
        Err(e) => {
            warn!(error = %e, "augmentation classifier failed, not augmenting");
            Decision::new(AugmentDecision::NoAugment, DecisionReason::ClassifierFailed)
        }
    }
}

fn parse_yes_no(reply: &str) -> Option<bool> {
    let word = reply
        .trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .split(|c: char| !c.is_alphanumeric())
        .next()?
        .to_ascii_uppercase();
    match word.as_str() {
        "YES" => Some(true),
        "NO" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedInference;

    #[test]
    fn search_cues() {
        assert!(has_search_cue("Can you search online for this?"));
        assert!(has_search_cue("please look it up"));
        assert!(!has_search_cue("What does the researcher clause say?"));
    }

    #[test]
    fn fact_keywords() {
        assert!(has_fact_keyword("What is the current UK tax rate?"));
        assert!(has_fact_keyword("Is this non-compete enforceable in California?"));
        assert!(!has_fact_keyword("Who are the parties?"));
        assert!(!has_fact_keyword("What is the hourly rate in this contract?"));
    }

    #[test]
    fn yes_no_parsing() {
        assert_eq!(parse_yes_no("YES"), Some(true));
        assert_eq!(parse_yes_no(" no."), Some(false));
        assert_eq!(parse_yes_no("**Yes**, because..."), Some(true));
        assert_eq!(parse_yes_no("Maybe"), None);
        assert_eq!(parse_yes_no(""), None);
    }

    #[tokio::test]
    async fn keyword_skips_classifier() {
        let inference = ScriptedInference::new(vec![]);
        let decision = decide("What is the current UK tax rate?", &inference, true).await;
        assert_eq!(decision.decision, AugmentDecision::Augment);
        assert_eq!(decision.reason, DecisionReason::FactKeyword);
        assert_eq!(inference.call_count(), 0);
    }

    #[tokio::test]
    async fn search_cue_skips_classifier() {
        let inference = ScriptedInference::new(vec![]);
        let decision = decide("Search the web for similar agreements", &inference, true).await;
        assert_eq!(decision.reason, DecisionReason::SearchCue);
        assert_eq!(inference.call_count(), 0);
    }

    #[tokio::test]
    async fn no_retrieval_never_augments() {
        let inference = ScriptedInference::new(vec![]);
        let decision = decide("Search online for the current tax rate", &inference, false).await;
        assert_eq!(decision.decision, AugmentDecision::NoAugment);
        assert_eq!(decision.reason, DecisionReason::RetrievalUnavailable);
        assert_eq!(inference.call_count(), 0);
    }

    #[tokio::test]
    async fn classifier_decides_otherwise() {
        let inference = ScriptedInference::new(vec![Ok("YES".into())]);
        let decision = decide("How does this compare to what others pay?", &inference, true).await;
        assert!(decision.augment());
        assert_eq!(decision.reason, DecisionReason::Classifier);
        assert_eq!(inference.call_count(), 1);

        let inference = ScriptedInference::new(vec![Ok("NO".into())]);
        let decision = decide("Who signs the agreement?", &inference, true).await;
        assert!(!decision.augment());
    }

    #[tokio::test]
    async fn classifier_failure_does_not_augment() {
        let inference = ScriptedInference::new(vec![Err(
            pactlens_shared::PactLensError::InferenceTransport("timeout".into()),
        )]);
        let decision = decide("Who signs the agreement?", &inference, true).await;
        assert_eq!(decision.decision, AugmentDecision::NoAugment);
        assert_eq!(decision.reason, DecisionReason::ClassifierFailed);
    }
}
