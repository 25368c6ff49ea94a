//! Narrative request building and the text-generation collaborator.

use std::fmt::Write as _;

use rust_decimal::Decimal;

use crate::report::{FeatureContribution, NarrativeFactors, RiskReport};
use crate::RiskScopeResult;

/// Stands in for the risk factor list when no feature raises risk.
pub const NO_RISK_FACTORS: &str = "(none: no indicator is currently raising the predicted default risk)";
/// Stands in for the mitigating factor list when no feature lowers risk.
pub const NO_MITIGATING_FACTORS: &str = "(none: no indicator is currently lowering the predicted default risk)";
/// Returned in place of a narrative when the generator fails.
pub const NARRATIVE_FAILED: &str = "Narrative generation failed.";

const WEIGHT_DP: u32 = 4;

/// Prompt in, text out. Implementations may fail.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> RiskScopeResult<String>;
}

fn signed(weight: Decimal) -> String {
    let w = weight.round_dp(WEIGHT_DP).normalize();
    if w.is_sign_negative() {
        w.to_string()
    } else {
        format!("+{}", w)
    }
}

fn write_factors(out: &mut String, factors: &[FeatureContribution], placeholder: &str) {
    if factors.is_empty() {
        let _ = writeln!(out, "{}", placeholder);
        return;
    }
    for (i, f) in factors.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} ({}): weight {}, value {}",
            i + 1,
            f.name,
            f.description,
            signed(f.weight),
            f.raw_value.normalize()
        );
    }
}

/// Format the report and its factor subsets into a single prompt.
pub fn build_prompt(report: &RiskReport, factors: &NarrativeFactors) -> String {
    let mut out = String::new();
    out.push_str(
        "You are a credit analyst specialising in corporate restructuring and default prediction. \
         Combine the financial indicators and the text analysis results below into an insightful report.\n\n",
    );
    let _ = writeln!(out, "- Company code: {}", report.entity_id);
    let _ = writeln!(out, "- Company name: {}", report.company_name);
    let _ = writeln!(out, "- Overall AI default risk: {}%", report.risk_score);

    out.push_str("\n[Risk factors]\n");
    write_factors(&mut out, &factors.top_risk, NO_RISK_FACTORS);
    out.push_str("\n[Mitigating factors]\n");
    write_factors(&mut out, &factors.top_mitigating, NO_MITIGATING_FACTORS);

    out.push_str(
        "\nWriting guide: explain the causal links between the indicators and keep a professional tone. \
         Close with an investment caution statement.\n",
    );
    out
}

/// Submit `prompt` verbatim. The response comes back unmodified; any
/// failure becomes [`NARRATIVE_FAILED`].
pub fn generate_narrative(generator: &dyn TextGenerator, prompt: &str) -> String {
    match generator.generate(prompt) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "narrative generation failed");
            NARRATIVE_FAILED.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[cfg(feature = "gemini")]
pub use gemini::GeminiClient;

#[cfg(feature = "gemini")]
mod gemini {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    use super::TextGenerator;
    use crate::{RiskScopeError, RiskScopeResult};

    const ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
    const SERVICE: &str = "gemini";

    #[derive(Serialize)]
    struct Part<'a> {
        text: &'a str,
    }

    #[derive(Serialize)]
    struct Content<'a> {
        parts: Vec<Part<'a>>,
    }

    #[derive(Serialize)]
    struct GenerateRequest<'a> {
        contents: Vec<Content<'a>>,
    }

    #[derive(Deserialize)]
    struct GenerateResponse {
        #[serde(default)]
        candidates: Vec<Candidate>,
    }

    #[derive(Deserialize)]
    struct Candidate {
        content: CandidateContent,
    }

    #[derive(Deserialize)]
    struct CandidateContent {
        #[serde(default)]
        parts: Vec<CandidatePart>,
    }

    #[derive(Deserialize)]
    struct CandidatePart {
        #[serde(default)]
        text: String,
    }

    fn service_error(reason: impl Into<String>) -> RiskScopeError {
        RiskScopeError::ExternalService {
            service: SERVICE.to_string(),
            reason: reason.into(),
        }
    }

    /// Blocking client for the `generateContent` REST endpoint.
    pub struct GeminiClient {
        api_key: String,
        model: String,
        http_client: reqwest::blocking::Client,
    }

    impl GeminiClient {
        pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> RiskScopeResult<Self> {
            let http_client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|e| service_error(e.to_string()))?;
            Ok(Self {
                api_key: api_key.into(),
                model: model.into(),
                http_client,
            })
        }
    }

    impl std::fmt::Debug for GeminiClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("GeminiClient")
                .field("model", &self.model)
                .finish_non_exhaustive()
        }
    }

    impl TextGenerator for GeminiClient {
        fn generate(&self, prompt: &str) -> RiskScopeResult<String> {
            let url = format!("{}/{}:generateContent", ENDPOINT, self.model);
            let body = GenerateRequest {
                contents: vec![Content {
                    parts: vec![Part { text: prompt }],
                }],
            };

            let response = self
                .http_client
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body)
                .send()
                .map_err(|e| service_error(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(service_error(format!("HTTP {}", status.as_u16())));
            }

            let parsed: GenerateResponse = response
                .json()
                .map_err(|e| service_error(e.to_string()))?;
            parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content.parts.into_iter().next())
                .map(|p| p.text)
                .ok_or_else(|| service_error("response had no candidates"))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::route;
    use crate::features::{self, Direction};
    use crate::report::Effect;
    use crate::tables::BaselineBasis;
    use crate::RiskScopeError;
    use rust_decimal_macros::dec;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    struct Failing;

    impl TextGenerator for Failing {
        fn generate(&self, _prompt: &str) -> RiskScopeResult<String> {
            Err(RiskScopeError::ExternalService {
                service: "test".into(),
                reason: "unreachable".into(),
            })
        }
    }

    #[derive(Default)]
    struct Recording {
        seen: RefCell<Vec<String>>,
    }

    impl TextGenerator for Recording {
        fn generate(&self, prompt: &str) -> RiskScopeResult<String> {
            self.seen.borrow_mut().push(prompt.to_string());
            Ok("  analysis text\n".to_string())
        }
    }

    fn factor(name: &str, weight: Decimal, raw: Decimal) -> FeatureContribution {
        FeatureContribution {
            name: name.to_string(),
            category: route(name),
            kind: features::find_feature(name).map(|f| f.kind),
            direction: Direction::HigherIsBetter,
            weight,
            effect: if weight > Decimal::ZERO { Effect::Risk } else { Effect::Mitigating },
            entity_score: dec!(50),
            industry_score: dec!(50),
            population_score: dec!(50),
            raw_value: raw,
            industry_value: Decimal::ZERO,
            population_value: Decimal::ZERO,
            description: features::describe(name).to_string(),
            bar_width: Decimal::ZERO,
        }
    }

    fn report() -> RiskReport {
        RiskReport {
            entity_id: "005930".into(),
            company_name: "Samsung Electronics".into(),
            sector: Some("Semiconductors".into()),
            price: dec!(58900),
            probability: dec!(0.734),
            risk_score: 73,
            model: "logistic".into(),
            category_verdicts: BTreeMap::new(),
            dashboard: BTreeMap::new(),
            features: Vec::new(),
            industry_basis: BaselineBasis::NonDefaultSegment,
            population_basis: BaselineBasis::NonDefaultSegment,
        }
    }

    #[test]
    fn test_prompt_lists_factors() {
        let factors = NarrativeFactors {
            top_risk: vec![factor("F1_Debt_Ratio", dec!(0.156), dec!(1.8))],
            top_mitigating: vec![factor("F3_Z_Score", dec!(-0.0421), dec!(3.1))],
        };
        let prompt = build_prompt(&report(), &factors);
        assert!(prompt.contains("Company code: 005930"));
        assert!(prompt.contains("Samsung Electronics"));
        assert!(prompt.contains("73%"));
        assert!(prompt.contains("1. F1_Debt_Ratio"));
        assert!(prompt.contains("weight +0.156, value 1.8"));
        assert!(prompt.contains("weight -0.0421, value 3.1"));
        assert!(prompt.contains(features::describe("F1_Debt_Ratio")));
        assert!(prompt.contains("causal links"));
        assert!(prompt.contains("investment caution"));
    }

    #[test]
    fn test_empty_risk_subset_uses_placeholder() {
        let factors = NarrativeFactors {
            top_risk: Vec::new(),
            top_mitigating: vec![factor("F3_Z_Score", dec!(-0.2), dec!(3))],
        };
        let prompt = build_prompt(&report(), &factors);
        assert!(prompt.contains(NO_RISK_FACTORS));
        assert!(!prompt.contains(NO_MITIGATING_FACTORS));
    }

    #[test]
    fn test_both_subsets_empty() {
        let prompt = build_prompt(&report(), &NarrativeFactors::default());
        assert!(prompt.contains(NO_RISK_FACTORS));
        assert!(prompt.contains(NO_MITIGATING_FACTORS));
    }

    #[test]
    fn test_failed_generation_returns_fixed_string() {
        assert_eq!(generate_narrative(&Failing, "prompt"), NARRATIVE_FAILED);
    }

    #[test]
    fn test_prompt_is_sent_verbatim_and_reply_unmodified() {
        let recorder = Recording::default();
        let prompt = build_prompt(&report(), &NarrativeFactors::default());
        let text = generate_narrative(&recorder, &prompt);
        assert_eq!(text, "  analysis text\n");
        assert_eq!(recorder.seen.borrow().as_slice(), &[prompt]);
    }

    #[test]
    fn test_signed_weight_format() {
        assert_eq!(signed(dec!(0.15600)), "+0.156");
        assert_eq!(signed(dec!(-0.123456)), "-0.1235");
        assert_eq!(signed(Decimal::ZERO), "+0");
    }
}
