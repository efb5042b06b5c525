//! Test doubles shared by the stage tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use pactlens_inference::{InferenceService, ResponseFormat, RetrievalService};
use pactlens_shared::{
    CallerId, Document, DocumentId, Extraction, Limits, PactLensError, Result, hash_text,
};
use pactlens_storage::Storage;

use crate::pipeline::PipelineDeps;

/// Inference double that replays scripted responses and records prompts.
pub struct ScriptedInference {
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<(String, ResponseFormat)>>,
}

impl ScriptedInference {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn prompt(&self, index: usize) -> String {
        self.calls.lock().unwrap()[index].0.clone()
    }

    pub fn format(&self, index: usize) -> ResponseFormat {
        self.calls.lock().unwrap()[index].1
    }
}

#[async_trait]
impl InferenceService for ScriptedInference {
    async fn generate(&self, prompt: &str, format: ResponseFormat) -> Result<String> {
        self.calls.lock().unwrap().push((prompt.to_string(), format));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PactLensError::InferenceTransport("script exhausted".into())))
    }
}

/// Retrieval double returning one fixed payload (or failure).
pub struct ScriptedRetrieval {
    response: Mutex<Option<Result<serde_json::Value>>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedRetrieval {
    pub fn new(response: Result<serde_json::Value>) -> Self {
        Self {
            response: Mutex::new(Some(response)),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetrievalService for ScriptedRetrieval {
    async fn search(&self, query: &str, _limit: u32) -> Result<serde_json::Value> {
        self.queries.lock().unwrap().push(query.to_string());
        self.response
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(PactLensError::Retrieval("script exhausted".into())))
    }
}

/// Fresh database path in the temp dir.
pub fn temp_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("pl_core_test_{}.db", uuid::Uuid::now_v7()))
}

/// Throwaway database in the temp dir.
pub async fn temp_storage() -> Storage {
    Storage::open(&temp_db_path()).await.expect("open test db")
}

/// Stage dependencies over a throwaway database, default limits and no retrieval.
pub fn deps_on(storage: Storage, inference: Arc<dyn InferenceService>) -> PipelineDeps {
    PipelineDeps {
        storage,
        inference,
        retrieval: None,
        limits: Limits::default(),
        retrieval_max_results: 5,
    }
}

/// Stage dependencies backed by a scripted inference double.
pub async fn scripted_deps(responses: Vec<Result<String>>) -> (PipelineDeps, Arc<ScriptedInference>) {
    let inference = Arc::new(ScriptedInference::new(responses));
    let deps = deps_on(temp_storage().await, inference.clone());
    (deps, inference)
}

/// Insert a document owned by `owner` with the given text.
pub async fn seed_document(storage: &Storage, owner: &str, text: &str) -> Document {
    let id = DocumentId::new();
    let document = Document {
        id: id.clone(),
        owner: CallerId::new(owner),
        filename: "contract.pdf".into(),
        content_hash: hash_text(text),
        detected_type: None,
        selected_party: None,
        created_at: Utc::now(),
    };
    let extraction = Extraction {
        document_id: id,
        text: text.into(),
        pages: 1,
    };
    storage
        .insert_document(&document, &extraction)
        .await
        .expect("seed document");
    document
}

/// A valid full-analysis response.
pub fn analysis_response(score: u8) -> String {
    serde_json::json!({
        "detected_type": "Employment",
        "clauses": {
            "payment": {"amount": "$90,000", "schedule": "bi-weekly", "late_fees": null},
            "liability": {"cap": null, "exclusions": null, "indemnity": null},
            "termination": {"notice": "two weeks", "for_cause": "misconduct", "without_cause": null, "auto_renewal": null},
            "confidentiality": {"scope": "all business information", "duration": "indefinite", "carve_outs": null},
            "ip": {"ownership": "Employer", "license": null, "derivatives": null},
            "law": {"governing_law": "California", "jurisdiction": null, "dispute_resolution": "arbitration"},
            "renewal": {"term_length": null, "renewal_window": null, "conditions": null}
        },
        "risks": [{"type": "Arbitration", "severity": "HIGH", "excerpt": "binding arbitration", "note": "waives jury trial"}],
        "opportunities": [{"type": "Bonus", "excerpt": "annual bonus", "note": "negotiate a floor"}],
        "score": score,
        "negotiation_points": ["Request mutual arbitration costs"]
    })
    .to_string()
}
