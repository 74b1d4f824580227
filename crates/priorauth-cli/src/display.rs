//! Terminal rendering for decisions, search results and progress.

use priorauth_core::{CriterionStatus, Verdict};
use priorauth_pipeline::{
    DecisionOutcome, ExtractionOutcome, ExtractionPlan, GenerationOutcome, IndexOutcome,
    SimilarCase, StatusReport,
};

const WIDTH: usize = 70;
const LABEL: usize = 22;

fn heavy_rule() -> String {
    "=".repeat(WIDTH)
}

fn light_rule() -> String {
    "-".repeat(WIDTH)
}

fn banner(title: &str) {
    println!("\n{}", heavy_rule());
    println!("{title}");
    println!("{}", heavy_rule());
}

fn section(title: &str) {
    println!("\n{}", light_rule());
    println!("{title}");
    println!("{}", light_rule());
}

fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {label:<LABEL$} {value}");
}

// ── Decisions ──

/// Print a decision as a card: verdict, criteria, reasoning, gaps.
pub fn print_decision(outcome: &DecisionOutcome) {
    let d = &outcome.decision;
    banner("AUTHORIZATION DECISION");

    let verdict = match d.decision {
        Verdict::Approved => "APPROVED",
        Verdict::Denied => "DENIED",
        Verdict::AdditionalInfoNeeded => "ADDITIONAL INFORMATION NEEDED",
    };
    println!("\n{verdict}");
    println!("Confidence: {}", d.confidence);
    if outcome.policy.is_fallback() {
        println!("Policy: standard criteria (no matching policy)");
    } else {
        println!(
            "Policy: {} (CPT {})",
            outcome.policy.procedure_name, outcome.policy.cpt_code
        );
    }

    section(&format!(
        "CRITERIA EVALUATION ({}/{} met)",
        d.met_count(),
        d.criteria_met.len()
    ));
    for c in &d.criteria_met {
        let mark = match c.status {
            CriterionStatus::Met => "✓",
            CriterionStatus::NotMet => "✗",
        };
        println!("\n{mark} {}", c.criterion);
        println!("  Status: {}", c.status.as_str());
        if !c.evidence.is_empty() {
            println!("  Evidence: {}", c.evidence);
        }
    }

    section("REASONING");
    println!("{}", d.reasoning);

    if !d.missing_documentation.is_empty() {
        section("MISSING DOCUMENTATION");
        for item in &d.missing_documentation {
            println!("  - {item}");
        }
    }

    if !d.recommendation.is_empty() {
        section("RECOMMENDATION");
        println!("{}", d.recommendation);
    }

    if !outcome.similar_cases.is_empty() {
        section("SIMILAR CASES");
        print_similar(&outcome.similar_cases);
    }
    println!("\n{}", heavy_rule());
}

// ── Search ──

pub fn print_similar(results: &[SimilarCase]) {
    if results.is_empty() {
        println!("  (no similar cases)");
        return;
    }
    for (rank, r) in results.iter().enumerate() {
        println!(
            "  {:>2}. {:<12} {:.4}  {}",
            rank + 1,
            r.case_id,
            r.similarity,
            r.specialty.as_deref().unwrap_or("-")
        );
        if let Some(dx) = &r.diagnosis {
            println!("      diagnosis: {}", truncate(dx, 60));
        }
        if let Some(px) = &r.procedure {
            println!("      procedure: {}", truncate(px, 60));
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 3).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

// ── Batch jobs ──

pub fn print_extraction_plan(plan: &ExtractionPlan) {
    banner("EXTRACTION STATUS");
    field("Eligible records", plan.eligible);
    field("Below length floor", plan.ineligible);
    field("Already processed", plan.already_done);
    field("To process", plan.pending);
    field(
        "Estimated time",
        format!("{:.1} hours", plan.estimated_hours()),
    );
}

pub fn print_extraction_outcome(outcome: &ExtractionOutcome) {
    banner("EXTRACTION COMPLETE");
    field("Newly processed", outcome.processed);
    field("Skipped (already done)", outcome.skipped);
    field("Errors", outcome.errors);
    field("Total processed", outcome.processed + outcome.skipped);
}

pub fn print_generation_outcome(outcome: &GenerationOutcome) {
    banner("POLICY GENERATION COMPLETE");
    field("Generated", outcome.generated);
    field("Already present", outcome.skipped);
    field("Errors", outcome.errors);
}

pub fn print_index_outcome(outcome: &IndexOutcome, published: &std::path::Path) {
    banner("INDEX PUBLISHED");
    field("Indexed cases", outcome.indexed);
    field("Too little text", outcome.too_short);
    field("Embedding failures", outcome.failed);
    field("Snapshot", published.display());
}

// ── Status ──

pub fn print_status(report: &StatusReport) {
    banner("PIPELINE STATUS");

    println!("\nPolicies");
    field(
        "Generated",
        format!("{}/{}", report.policies, report.policy_catalogue),
    );
    field("Complete", yes_no(report.policies_complete()));

    println!("\nCases");
    match report.eligible_records {
        Some(n) => field("Extracted", format!("{}/{n}", report.cases)),
        None => field("Extracted", report.cases),
    }
    field("Complete", yes_no(report.cases_complete()));
    if let Some(run) = &report.last_run {
        field("Last run", &run.timestamp);
        field("Last run errors", run.errors);
    }

    println!("\nIndex");
    match &report.snapshot {
        Some(info) => {
            field("Vectors", info.count);
            field("Model", format!("{} ({}d)", info.model_id, info.dim));
            field("Generation", &info.generation);
        }
        None => field("Published", "no"),
    }
    println!();
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}
