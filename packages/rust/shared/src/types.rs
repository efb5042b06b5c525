//! Core domain types for PactLens contract analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Minimum score at which a contract counts as favorable.
pub const FAVORABLE_THRESHOLD: u8 = 70;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for document identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    /// Generate a new time-sortable document identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identity of the caller, as supplied by the authorization collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(pub String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ContractType
// ---------------------------------------------------------------------------

/// Closed vocabulary of contract categories.
///
/// Labels outside the vocabulary collapse to [`ContractType::Other`] on
/// parse and on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContractType {
    Employment,
    IndependentContractor,
    ConsultingAgreement,
    NonCompeteAgreement,
    Nda,
    IpAssignment,
    TradeSecretAgreement,
    Msa,
    StatementOfWork,
    ProfessionalServices,
    Saas,
    SoftwareLicense,
    ApiAgreement,
    CloudServices,
    DataProcessingAgreement,
    LeaseAgreement,
    PurchaseAgreement,
    PropertyManagement,
    ConstructionContract,
    LoanAgreement,
    InvestmentAgreement,
    FinancialServices,
    PartnershipAgreement,
    JointVenture,
    VendorAgreement,
    DistributionAgreement,
    SupplyAgreement,
    MedicalServices,
    ResearchAgreement,
    ClinicalTrialAgreement,
    TrainingAgreement,
    GovernmentContract,
    GrantAgreement,
    Other,
}

impl ContractType {
    /// Every member of the vocabulary, in prompt order.
    pub const ALL: [ContractType; 34] = [
        Self::Employment,
        Self::IndependentContractor,
        Self::ConsultingAgreement,
        Self::NonCompeteAgreement,
        Self::Nda,
        Self::IpAssignment,
        Self::TradeSecretAgreement,
        Self::Msa,
        Self::StatementOfWork,
        Self::ProfessionalServices,
        Self::Saas,
        Self::SoftwareLicense,
        Self::ApiAgreement,
        Self::CloudServices,
        Self::DataProcessingAgreement,
        Self::LeaseAgreement,
        Self::PurchaseAgreement,
        Self::PropertyManagement,
        Self::ConstructionContract,
        Self::LoanAgreement,
        Self::InvestmentAgreement,
        Self::FinancialServices,
        Self::PartnershipAgreement,
        Self::JointVenture,
        Self::VendorAgreement,
        Self::DistributionAgreement,
        Self::SupplyAgreement,
        Self::MedicalServices,
        Self::ResearchAgreement,
        Self::ClinicalTrialAgreement,
        Self::TrainingAgreement,
        Self::GovernmentContract,
        Self::GrantAgreement,
        Self::Other,
    ];

    /// Canonical label, as used in prompts and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employment => "Employment",
            Self::IndependentContractor => "Independent Contractor",
            Self::ConsultingAgreement => "Consulting Agreement",
            Self::NonCompeteAgreement => "Non-Compete Agreement",
            Self::Nda => "NDA",
            Self::IpAssignment => "IP Assignment",
            Self::TradeSecretAgreement => "Trade Secret Agreement",
            Self::Msa => "MSA",
            Self::StatementOfWork => "Statement of Work",
            Self::ProfessionalServices => "Professional Services",
            Self::Saas => "SaaS",
            Self::SoftwareLicense => "Software License",
            Self::ApiAgreement => "API Agreement",
            Self::CloudServices => "Cloud Services",
            Self::DataProcessingAgreement => "Data Processing Agreement",
            Self::LeaseAgreement => "Lease Agreement",
            Self::PurchaseAgreement => "Purchase Agreement",
            Self::PropertyManagement => "Property Management",
            Self::ConstructionContract => "Construction Contract",
            Self::LoanAgreement => "Loan Agreement",
            Self::InvestmentAgreement => "Investment Agreement",
            Self::FinancialServices => "Financial Services",
            Self::PartnershipAgreement => "Partnership Agreement",
            Self::JointVenture => "Joint Venture",
            Self::VendorAgreement => "Vendor Agreement",
            Self::DistributionAgreement => "Distribution Agreement",
            Self::SupplyAgreement => "Supply Agreement",
            Self::MedicalServices => "Medical Services",
            Self::ResearchAgreement => "Research Agreement",
            Self::ClinicalTrialAgreement => "Clinical Trial Agreement",
            Self::TrainingAgreement => "Training Agreement",
            Self::GovernmentContract => "Government Contract",
            Self::GrantAgreement => "Grant Agreement",
            Self::Other => "Other",
        }
    }

    /// Short disambiguation hint shown next to the label in prompts.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Employment => "employment terms, job duties, salary, benefits",
            Self::IndependentContractor => "contractor or freelance terms, payment for services",
            Self::ConsultingAgreement => "consulting services, expert advice, deliverables",
            Self::NonCompeteAgreement => "restrictive covenants, competition limits",
            Self::Nda => "non-disclosure or confidentiality of proprietary information",
            Self::IpAssignment => "transfer of patents, copyrights or other IP ownership",
            Self::TradeSecretAgreement => "protection of trade secrets",
            Self::Msa => "master service agreement, framework terms for future work",
            Self::StatementOfWork => "SOW, specific deliverables and project scope",
            Self::ProfessionalServices => "professional services engagement",
            Self::Saas => "software as a service subscription",
            Self::SoftwareLicense => "software usage rights and restrictions",
            Self::ApiAgreement => "API access and usage terms",
            Self::CloudServices => "cloud hosting or infrastructure services",
            Self::DataProcessingAgreement => "data processing, GDPR, privacy and security terms",
            Self::LeaseAgreement => "property rental, landlord and tenant",
            Self::PurchaseAgreement => "sale of goods or property, closing conditions",
            Self::PropertyManagement => "property oversight, maintenance, tenant relations",
            Self::ConstructionContract => "building work, timelines, specifications",
            Self::LoanAgreement => "lending, interest rates, repayment schedule",
            Self::InvestmentAgreement => "investment, equity, returns",
            Self::FinancialServices => "financial or banking services",
            Self::PartnershipAgreement => "business partnership, profit sharing",
            Self::JointVenture => "joint venture, shared resources for a common project",
            Self::VendorAgreement => "vendor or supplier terms, product delivery",
            Self::DistributionAgreement => "product distribution, territory, exclusivity",
            Self::SupplyAgreement => "supply chain, ongoing supply of goods",
            Self::MedicalServices => "healthcare provision, patient care",
            Self::ResearchAgreement => "research collaboration, academic or medical research",
            Self::ClinicalTrialAgreement => "clinical trial protocols and sponsorship",
            Self::TrainingAgreement => "training or educational services",
            Self::GovernmentContract => "public sector procurement, regulatory compliance",
            Self::GrantAgreement => "grant funding, reporting requirements",
            Self::Other => "only if none of the above match",
        }
    }

    /// Parse a label into the closed vocabulary.
    ///
    /// Matching is case-insensitive on the canonical label; anything else
    /// becomes [`ContractType::Other`].
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(label))
            .unwrap_or(Self::Other)
    }

    /// Whether `label` names a member of the vocabulary exactly (case-insensitive).
    pub fn is_known_label(label: &str) -> bool {
        let label = label.trim();
        Self::ALL.iter().any(|t| t.as_str().eq_ignore_ascii_case(label))
    }
}

impl std::fmt::Display for ContractType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ContractType {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

impl From<ContractType> for String {
    fn from(value: ContractType) -> Self {
        value.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Document & extraction
// ---------------------------------------------------------------------------

/// An uploaded contract, as known to the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Owning caller.
    pub owner: CallerId,
    /// Original filename.
    pub filename: String,
    /// SHA-256 of the extracted text.
    pub content_hash: String,
    /// Denormalized contract type, set once by the first stage that determines it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_type: Option<ContractType>,
    /// The party the owner represents, if they picked one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_party: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable extracted text of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub document_id: DocumentId,
    pub text: String,
    pub pages: u32,
}

impl Extraction {
    /// SHA-256 hex digest of the text.
    pub fn content_hash(&self) -> String {
        hash_text(&self.text)
    }
}

/// SHA-256 hex digest of a document's text.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Analysis record
// ---------------------------------------------------------------------------

/// A contracting party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub role: String,
    pub description: String,
}

impl Party {
    pub fn new(name: impl Into<String>, role: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            description: description.into(),
        }
    }
}

/// Risk severity. Inference output is case-folded before it reaches this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// An identified risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub excerpt: String,
    pub note: String,
}

/// An identified opportunity. Opportunities carry no severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    #[serde(rename = "type")]
    pub kind: String,
    pub excerpt: String,
    pub note: String,
}

/// Payment terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentClause {
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub late_fees: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiabilityClause {
    #[serde(default)]
    pub cap: Option<String>,
    #[serde(default)]
    pub exclusions: Option<String>,
    #[serde(default)]
    pub indemnity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminationClause {
    #[serde(default)]
    pub notice: Option<String>,
    #[serde(default)]
    pub for_cause: Option<String>,
    #[serde(default)]
    pub without_cause: Option<String>,
    #[serde(default)]
    pub auto_renewal: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidentialityClause {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub carve_outs: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpClause {
    #[serde(default)]
    pub ownership: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub derivatives: Option<String>,
}

/// Governing law and dispute resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LawClause {
    #[serde(default)]
    pub governing_law: Option<String>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub dispute_resolution: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenewalClause {
    #[serde(default)]
    pub term_length: Option<String>,
    #[serde(default)]
    pub renewal_window: Option<String>,
    #[serde(default)]
    pub conditions: Option<String>,
}

/// The seven clause groups extracted by full analysis.
///
/// Absent values are `None` and render as `"unspecified"`, never as an
/// empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clauses {
    pub payment: PaymentClause,
    pub liability: LiabilityClause,
    pub termination: TerminationClause,
    pub confidentiality: ConfidentialityClause,
    pub ip: IpClause,
    #[serde(alias = "governing_law", alias = "governing-law")]
    pub law: LawClause,
    pub renewal: RenewalClause,
}

impl Clauses {
    /// Display helper for a nullable clause field.
    pub fn unspecified(value: &Option<String>) -> &str {
        value.as_deref().unwrap_or("unspecified")
    }
}

/// The structured outcome of classification and/or full analysis for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub document_id: DocumentId,
    #[serde(default)]
    pub detected_type: Option<ContractType>,
    #[serde(default)]
    pub parties: Vec<Party>,
    /// `None` while the record is partial.
    #[serde(default)]
    pub score: Option<u8>,
    #[serde(default)]
    pub favorable: Option<bool>,
    #[serde(default)]
    pub clauses: Clauses,
    #[serde(default)]
    pub risks: Vec<Risk>,
    #[serde(default)]
    pub opportunities: Vec<Opportunity>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub recommendations: Option<String>,
    #[serde(default)]
    pub negotiation_points: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// A fresh partial record, as created by classification.
    pub fn partial(
        document_id: DocumentId,
        detected_type: Option<ContractType>,
        parties: Vec<Party>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            document_id,
            detected_type,
            parties,
            score: None,
            favorable: None,
            clauses: Clauses::default(),
            risks: Vec::new(),
            opportunities: Vec::new(),
            summary: None,
            recommendations: None,
            negotiation_points: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A record is terminal once full analysis has assigned a score.
    pub fn is_terminal(&self) -> bool {
        self.score.is_some()
    }
}

/// Derive `favorable` from a score.
pub fn is_favorable(score: u8) -> bool {
    score >= FAVORABLE_THRESHOLD
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One turn of a conversational transcript. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
