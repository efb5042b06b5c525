//! Prompt templates for every inference call.

use std::fmt::Write;

use pactlens_shared::{AnalysisRecord, ChatTurn, ContractType, Document};

/// The leading `max_chars` characters of `text`, cut on a char boundary.
pub fn leading_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn vocabulary() -> String {
    let mut out = String::new();
    for t in ContractType::ALL {
        let _ = writeln!(out, "- {}: {}", t.as_str(), t.hint());
    }
    out
}

/// Joint type + party detection.
pub fn classification(text: &str) -> String {
    format!(
        r#"You are an expert contract analyst. Analyze the contract text below and provide:

1. CONTRACT TYPE DETECTION
Choose the single best match from this list:
{vocabulary}
2. PARTY DETECTION
Identify every party to the contract. Look for names near the start ("This Agreement is between [Party A] and [Party B]"), company names, individual names, and roles such as Employer, Employee, Client, Vendor, Licensor, Licensee, Buyer, Seller.

Return ONLY a JSON object with this structure:
{{
  "detected_type": "Employment",
  "confidence": 0.95,
  "reasoning": "Employment terms, job duties, salary and an employer-employee relationship",
  "parties": [
    {{"name": "Full legal name", "role": "Employer", "description": "Brief description of this party's role"}}
  ]
}}

Rules:
- "detected_type" must be exactly one label from the list above.
- Use full legal names for parties.
- If no parties are found, return "parties": [].
- No markdown and no text outside the JSON object.

Contract text:
{text}"#,
        vocabulary = vocabulary(),
    )
}

/// Full analysis, optionally from the perspective of one party.
pub fn analysis(text: &str, selected_party: Option<&str>) -> String {
    let perspective = selected_party
        .map(|party| {
            format!(
                r#"

PERSPECTIVE: The user represents "{party}" in this contract.
- Risks are risks TO "{party}"; opportunities are opportunities FOR "{party}".
- Negotiation points are suggestions for "{party}" to improve the contract.
- The score reflects how favorable the contract is FOR "{party}"."#
            )
        })
        .unwrap_or_default();

    format!(
        r#"You are an expert contract analyst.

FIRST decide whether the text is a contract. If it is random text, spam, incomplete or corrupted, not a legal document, or another kind of document (invoice, receipt, ...), return exactly:
{{"error": "This document does not appear to be a valid contract. Please upload a proper contract document."}}

Otherwise return ONE JSON object with these fields:
- detected_type: exactly one label from this list:
{vocabulary}- parties: array of {{"name", "role", "description"}} for every party you can identify
- score: number from 0 (extremely risky) to 100 (very favorable)
- summary: 2-3 sentences on the key points and overall assessment
- recommendations: 2-3 actionable recommendations
- clauses: object with exactly these groups, each field a string or null when the contract is silent:
  payment {{amount, schedule, late_fees}}
  liability {{cap, exclusions, indemnity}}
  termination {{notice, for_cause, without_cause, auto_renewal (boolean or null)}}
  confidentiality {{scope, duration, carve_outs}}
  ip {{ownership, license, derivatives}}
  law {{governing_law, jurisdiction, dispute_resolution}}
  renewal {{term_length, renewal_window, conditions}}
- risks: array of {{"type", "severity", "excerpt", "note"}}
- opportunities: array of {{"type", "excerpt", "note"}}
- negotiation_points: array of strings, each a specific piece of advice

RISKS: you MUST identify at least one risk. Risks are terms that could harm the client or create liability: unfavorable payment terms, weak liability protection, harsh termination, restrictive dispute resolution, weak IP protection, unreasonable confidentiality, unfavorable renewal.

OPPORTUNITIES: you MUST identify at least one opportunity. Opportunities are terms that benefit the client or give leverage. If none are obvious, name areas where the contract could be improved to create one.

FORMAT:
- severity is exactly "high", "medium" or "low" (lowercase only)
- opportunities have no severity
- valid, parseable JSON only; no HTML or markdown

CONTRACT TEXT:
{text}{perspective}"#,
        vocabulary = vocabulary(),
    )
}

/// Yes/no check for whether a question needs information outside the contract.
pub fn augmentation_check(question: &str) -> String {
    format!(
        "Does answering the following question about a contract require information that is \
         NOT contained in the contract itself (current rates, laws, regulations, market data, \
         recent events, calculations against external figures)?\n\n\
         Question: {question}\n\n\
         Answer with exactly one word: YES or NO."
    )
}

/// Inputs for a conversational turn.
pub struct ChatContext<'a> {
    pub document: &'a Document,
    pub text: &'a str,
    pub analysis: Option<&'a AnalysisRecord>,
    pub history: &'a [ChatTurn],
    pub question: &'a str,
    /// Rendered retrieval results, present only when augmentation succeeded.
    pub sources: Option<&'a str>,
}

/// Conversational answer prompt.
pub fn chat(ctx: &ChatContext<'_>) -> String {
    let type_label = ctx
        .document
        .detected_type
        .map(|t| t.as_str())
        .unwrap_or("Unknown");

    let mut out = String::new();
    let _ = write!(
        out,
        "You are an expert contract analyst assistant with access to a complete {} document \
         and its analysis.\n\n\
         CONTRACT INFORMATION:\n\
         - Contract Type: {type_label}\n\
         - Filename: {}\n\
         - Analysis Score: {}\n\n\
         CONTRACT TEXT:\n{}\n",
        ctx.document
            .detected_type
            .map(|t| t.as_str())
            .unwrap_or("contract"),
        ctx.document.filename,
        ctx.analysis
            .and_then(|a| a.score)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "Not analyzed yet".into()),
        ctx.text,
    );

    if let Some(analysis) = ctx.analysis {
        out.push_str(&analysis_summary(analysis));
    }

    out.push_str("\nCHAT HISTORY:\n");
    for turn in ctx.history {
        let _ = writeln!(out, "{}: {}", turn.role.as_str(), turn.content);
    }

    let _ = write!(out, "\nUSER QUESTION: {}\n", ctx.question);

    if let Some(sources) = ctx.sources {
        let _ = write!(
            out,
            "\nEXTERNAL SEARCH RESULTS:\n{sources}\n\n\
             You HAVE been given current information from an external search above. \
             Use it to answer. Do NOT say that you cannot access the internet, real-time data, \
             or external information. Cite the results by their \"Source N\" label.\n"
        );
    }

    out.push_str(
        "\nINSTRUCTIONS:\n\
         1. Answer from the actual contract content and analysis.\n\
         2. Quote or cite specific sections or clauses when possible.\n\
         3. If the contract does not address the question, say so clearly.\n\
         4. If the question is unrelated to this contract, politely redirect to contract topics.\n\
         5. Be professional and accurate.\n",
    );
    out
}

fn analysis_summary(analysis: &AnalysisRecord) -> String {
    let Some(score) = analysis.score else {
        return String::new();
    };
    let risks = join_or_none(
        analysis
            .risks
            .iter()
            .map(|r| format!("{} ({})", r.kind, r.severity.as_str())),
    );
    let opportunities = join_or_none(
        analysis
            .opportunities
            .iter()
            .map(|o| format!("{}: {}", o.kind, o.note)),
    );
    let negotiation = join_or_none(analysis.negotiation_points.iter().cloned());

    format!(
        "\nANALYSIS RESULTS:\n\
         - Overall Score: {score}/100\n\
         - Favorable: {}\n\
         - Summary: {}\n\
         - Key Risks: {risks}\n\
         - Key Opportunities: {opportunities}\n\
         - Negotiation Points: {negotiation}\n",
        if analysis.favorable == Some(true) { "Yes" } else { "No" },
        analysis.summary.as_deref().unwrap_or(""),
    )
}

fn join_or_none(items: impl Iterator<Item = String>) -> String {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "None identified".into()
    } else {
        joined
    }
}
