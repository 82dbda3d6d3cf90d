//! Prompt templates for the analyst and reviewer roles.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever template content changes.
//! Cache entries are stamped with it, and entries from another version are
//! re-screened instead of reused.

use coordination::debate::{format_evidence, EvidenceSnippet};
use coordination::AnalysisRecord;

/// Prompt version. Bump on any template change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Analyst system preamble.
pub const ANALYST_PREAMBLE: &str = "\
You are a research student screening papers for a researcher. \
You read carefully, quote the text when you make a claim, and answer with a single JSON object only.";

/// Reviewer system preamble.
pub const REVIEWER_PREAMBLE: &str = "\
You are a highly critical, top-tier conference reviewer (NeurIPS, ICML). \
You check every claim against the text and answer with a single JSON object only.";

const ANALYSIS_FIELDS: &str = "\
Required fields:
- scores: {
    \"relevance\": (0-10) how strictly it addresses the user's core problem,
    \"innovation\": (0-10) novelty of the proposed method,
    \"reliability\": (0-10) experimental rigor and reproducibility,
    \"potential\": (0-10) value for future work or application,
    \"total\": (0-10) overall weighted score
  }
- match_reasoning: detailed explanation of the scores
- sub_field
- problem_def
- methodology
- method_keywords
- algorithm_summary
- experiments
- limitations
- critique
- datasets
- others
- evidence_quotes: [direct quotes supporting your analysis]";

/// Longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Initial deep analysis of one document.
pub fn initial_analysis(viewpoint: &str, title: &str, text: &str) -> String {
    format!(
        "Analyze this paper against the user's research context.\n\n\
         Context: {viewpoint}\n\
         Paper: {title}\n\
         Content: {text}\n...\n\n\
         Task: perform a deep analysis and extract every required field. \
         Evaluate the paper on multiple dimensions (scale 0-10).\n\n\
         {ANALYSIS_FIELDS}\n\n\
         Constraints:\n\
         - \"relevance\" is the most important score. Below 5 the paper is likely useless.\n\
         - Be critical. 9-10 is reserved for seminal works.\n\
         - All scores MUST be integers between 0 and 10.\n\n\
         Output JSON only."
    )
}

/// Revision of a record against the reviewer's critique.
pub fn revision(
    record: &AnalysisRecord,
    critique: &str,
    text: &str,
    evidence: &[EvidenceSnippet],
) -> String {
    let record_json = serde_json::to_string(record).unwrap_or_default();
    let evidence_block = if evidence.is_empty() {
        String::new()
    } else {
        format!(
            "\nNew evidence from a follow-up search:\n{}\n",
            format_evidence(evidence)
        )
    };
    format!(
        "Your advisor has critiqued your analysis.\n\n\
         Original analysis: {record_json}\n\
         Advisor critique: {critique}\n\
         Paper content fragment: {text}\n\
         {evidence_block}\n\
         Step 1: REFLECTION. Is the advisor right? Did you overclaim relevance? Did you miss a fatal flaw?\n\
         Step 2: REVISION. Update the fields based on your reflection.\n\n\
         Guidelines:\n\
         - You MUST output a 'defense' field explaining your response to the critique.\n\
         - If the advisor shows the paper is IRRELEVANT or lacks evidence, lower 'scores.relevance' (e.g. to 2 or 3).\n\
         - Update the other scores if needed and recalculate 'scores.total'.\n\
         - If the advisor demands more evidence and you find it, update 'evidence_quotes'.\n\
         - Be honest: if you cannot defend the relevance, accept the advisor's view.\n\
         - All scores MUST be integers between 0 and 10.\n\n\
         Output the full updated JSON, including 'defense' and the 'scores' object."
    )
}

/// Reviewer evaluation of the current record.
pub fn review(viewpoint: &str, record: &AnalysisRecord, text: &str, round: u32) -> String {
    let record_json = serde_json::to_string(record).unwrap_or_default();
    format!(
        "User research context: {viewpoint}\n\
         Debate round: {}\n\
         Student analysis: {record_json}\n\
         Paper content fragment: {text}\n\n\
         Task:\n\
         1. EVIDENCE CHECK: verify every claim in 'problem_def' and 'methodology' against the text. If unsupported, do not approve.\n\
         2. RELEVANCE CHECK: does the paper TRULY address the user's core problem? If only tangential, downgrade the score severely.\n\
         3. HALLUCINATION CHECK: ensure 'evidence_quotes' exist in the fragment.\n\n\
         Constraints:\n\
         - If relevance > 3, demand at least 2 direct quotes as evidence.\n\
         - If the methodology is vague, do not approve.\n\
         - If a fact outside the fragment would settle your doubt, list it under 'questions' instead of rejecting.\n\n\
         Output JSON:\n\
         {{\n  \"is_approved\": boolean,\n  \"critique\": \"specific, evidence-based feedback\",\n  \
         \"score_correction\": integer 0-10 or null (1 or 2 if irrelevant),\n  \
         \"questions\": [\"open question\", ...]\n}}",
        round + 1
    )
}

/// Turn reviewer questions into search queries.
pub fn follow_up_queries(viewpoint: &str, questions: &[String], max_queries: usize) -> String {
    let listed = questions
        .iter()
        .map(|q| format!("- {q}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "A reviewer raised open questions while screening a paper for this research context:\n\
         {viewpoint}\n\n\
         Questions:\n{listed}\n\n\
         Write at most {max_queries} short English search queries that would answer them.\n\n\
         Output JSON: {{\"queries\": [\"query\", ...]}}"
    )
}

/// Chain-of-thought analysis of the user's own research idea.
pub fn viewpoint_analysis(text: &str) -> String {
    format!(
        "Analyze this research idea step by step.\n\n\
         Input: {text}\n\n\
         Step 1: deconstruct the input. Identify the core problem, proposed solution and key innovation claims.\n\
         Step 2: determine the specific sub-field and technical keywords.\n\
         Step 3: formulate a 'key viewpoint' that captures the user's unique stance.\n\
         Step 4: generate 5 diverse ENGLISH search queries from the <Domain>, <Methodology> and <Specific Problem>:\n\
           1. <Methodology> x <Domain>\n\
           2. a specific technical approach applied to the <Specific Problem>\n\
           3. problem-solving focus (\"improving <Metric> in <Domain> using <Methodology>\")\n\
           4. similar existing systems or state of the art in this niche\n\
           5. a distinct aspect, alternative phrasing, or sub-task keyword\n\
         Step 5: extract 3-5 critical English keywords for filtering.\n\n\
         Do NOT introduce unrelated concepts, languages or domains.\n\n\
         Output JSON:\n\
         {{\n  \"cot_reasoning\": \"...\",\n  \"core_contribution\": \"...\",\n  \
         \"key_viewpoint\": \"...\",\n  \"search_queries\": [\"...\"],\n  \
         \"english_keywords\": [\"...\"]\n}}"
    )
}

/// Literature synthesis over accepted documents, optionally revising a
/// previous draft against a critique.
pub fn synthesis(viewpoint: &str, papers: &str, previous: Option<(&str, &str)>) -> String {
    let task = match previous {
        Some((draft, critique)) => format!(
            "Previous synthesis: {draft}\n\
             Advisor critique: {critique}\n\
             Task: revise the synthesis to address the critique. Be more critical and specific."
        ),
        None => "Task: create a comprehensive literature synthesis. Focus on CONTRASTING the \
                 user's idea with existing work."
            .to_string(),
    };
    format!(
        "Synthesize the findings from these papers relative to the user's research idea.\n\n\
         User context: {viewpoint}\n\
         Analyzed papers:\n{papers}\n\n\
         {task}\n\n\
         Strictly base the summary on the analyzed papers. Do NOT invent topics, languages or domains.\n\n\
         Output JSON:\n\
         {{\n  \"state_of_art_summary\": \"...\",\n  \"gap_analysis\": \"...\",\n  \
         \"strategic_recommendations\": \"...\"\n}}"
    )
}

/// Reviewer pass over a synthesis draft.
pub fn synthesis_review(draft: &str, titles: &[String]) -> String {
    let listed = titles
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Review the student's literature synthesis.\n\n\
         Student synthesis: {draft}\n\
         Available papers:\n{listed}\n\n\
         Task:\n\
         1. CRITICAL REVIEW: does 'gap_analysis' identify a REAL gap or a trivial one?\n\
         2. ACTIONABILITY: are 'strategic_recommendations' specific enough to implement?\n\
         3. COVERAGE: was any major paper from the list missed?\n\n\
         Output JSON:\n\
         {{\n  \"is_approved\": boolean,\n  \"critique\": \"constructive but strict feedback\"\n}}"
    )
}
