//! Pipeline coordinator: authorization, text loading and stage dispatch for
//! one caller.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use pactlens_inference::{InferenceService, RetrievalService};
use pactlens_shared::{
    AnalysisRecord, CallerId, ChatTurn, ContractType, Document, DocumentId, Extraction, Limits,
    PactLensError, Result, hash_text,
};
use pactlens_storage::Storage;

use crate::classify::{self, Classification};
use crate::converse::{self, ChatAnswer};
use crate::analyze;

/// Collaborators shared by every stage.
pub struct PipelineDeps {
    pub storage: Storage,
    pub inference: Arc<dyn InferenceService>,
    /// `None` when no search endpoint is configured.
    pub retrieval: Option<Arc<dyn RetrievalService>>,
    pub limits: Limits,
    pub retrieval_max_results: u32,
}

/// Entry point for all document operations on behalf of one caller.
pub struct ContractPipeline {
    deps: PipelineDeps,
    caller: CallerId,
}

impl ContractPipeline {
    pub fn new(deps: PipelineDeps, caller: CallerId) -> Self {
        Self { deps, caller }
    }

    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    /// Store a new document with its extracted text.
    #[instrument(skip_all, fields(caller = %self.caller, filename = %filename))]
    pub async fn ingest(&self, filename: &str, text: &str, pages: u32) -> Result<Document> {
        if text.trim().is_empty() {
            return Err(PactLensError::validation("The document contains no extractable text."));
        }
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(PactLensError::validation("A filename is required."));
        }

        let document = Document {
            id: DocumentId::new(),
            owner: self.caller.clone(),
            filename: filename.to_string(),
            content_hash: hash_text(text),
            detected_type: None,
            selected_party: None,
            created_at: Utc::now(),
        };
        let extraction = Extraction {
            document_id: document.id.clone(),
            text: text.to_string(),
            pages,
        };
        self.deps.storage.insert_document(&document, &extraction).await?;

        info!(document = %document.id, chars = text.chars().count(), pages, "document ingested");
        Ok(document)
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.deps.storage.list_documents(&self.caller).await
    }

    pub async fn document(&self, id: &DocumentId) -> Result<Document> {
        self.authorize(id).await
    }

    /// Latest analysis record, partial or terminal.
    pub async fn analysis(&self, id: &DocumentId) -> Result<Option<AnalysisRecord>> {
        self.authorize(id).await?;
        self.deps.storage.find_latest_analysis(id).await
    }

    /// Delete a document and everything derived from it.
    #[instrument(skip_all, fields(caller = %self.caller, document = %id))]
    pub async fn delete_document(&self, id: &DocumentId) -> Result<()> {
        self.authorize(id).await?;
        if !self.deps.storage.delete_document(id).await? {
            return Err(PactLensError::not_found("contract"));
        }
        info!("document deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Detect type and parties. Never fails on inference errors.
    pub async fn classify(&self, id: &DocumentId) -> Result<Classification> {
        let document = self.authorize(id).await?;
        let text = self.load_text(id).await?;
        classify::run(&self.deps, &document, &text).await
    }

    /// Full analysis. Fails with `AlreadyAnalyzed` once a terminal record exists.
    pub async fn analyze(&self, id: &DocumentId) -> Result<AnalysisRecord> {
        let document = self.authorize(id).await?;
        let text = self.load_text(id).await?;
        analyze::run(&self.deps, &document, &text).await
    }

    /// Answer one question. History is supplied by the caller and never stored.
    pub async fn converse(
        &self,
        id: &DocumentId,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<ChatAnswer> {
        let document = self.authorize(id).await?;
        let text = self.load_text(id).await?;
        converse::run(&self.deps, &document, &text, history, question).await
    }

    // -----------------------------------------------------------------------
    // Party selection
    // -----------------------------------------------------------------------

    /// Record which party the caller represents.
    ///
    /// When parties are known for the document the name must be one of them.
    #[instrument(skip_all, fields(caller = %self.caller, document = %id))]
    pub async fn select_party(&self, id: &DocumentId, name: &str) -> Result<()> {
        self.authorize(id).await?;
        let name = name.trim();
        if name.is_empty() {
            return Err(PactLensError::validation("Party name must not be empty."));
        }

        if let Some(record) = self.deps.storage.find_latest_analysis(id).await? {
            if !record.parties.is_empty() && !record.parties.iter().any(|p| p.name == name) {
                return Err(PactLensError::validation(format!(
                    "\"{name}\" is not a detected party of this contract."
                )));
            }
        }

        self.deps.storage.set_selected_party(id, Some(name)).await?;
        info!(party = %name, "party selected");
        Ok(())
    }

    pub async fn selected_party(&self, id: &DocumentId) -> Result<Option<String>> {
        Ok(self.authorize(id).await?.selected_party)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn authorize(&self, id: &DocumentId) -> Result<Document> {
        let document = self
            .deps
            .storage
            .get_document(id)
            .await?
            .ok_or_else(|| PactLensError::not_found("contract"))?;
        if document.owner != self.caller {
            warn!(document = %id, caller = %self.caller, "access denied");
            return Err(PactLensError::Unauthorized);
        }
        Ok(document)
    }

    async fn load_text(&self, id: &DocumentId) -> Result<String> {
        self.deps
            .storage
            .get_extraction(id)
            .await?
            .map(|e| e.text)
            .ok_or_else(|| PactLensError::not_found("contract text"))
    }
}

/// Set the document's type unless one is already recorded.
///
/// Best effort: a failure is logged and the stage result still stands.
pub(crate) async fn denormalize_type(storage: &Storage, document: &Document, detected: ContractType) {
    if document.detected_type.is_some() {
        return;
    }
    match storage.set_document_type_if_unset(&document.id, detected).await {
        Ok(true) => info!(document = %document.id, detected_type = %detected, "document type recorded"),
        Ok(false) => {}
        Err(e) => warn!(document = %document.id, error = %e, "failed to record document type"),
    }
}
