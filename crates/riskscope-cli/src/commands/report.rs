use clap::Args;
use serde_json::{json, Value};

use riskscope_core::config::RiskConfig;
use riskscope_core::narrative::{self, GeminiClient, TextGenerator, NARRATIVE_FAILED};
use riskscope_core::report::{self, ReportAssembler, RiskReport};
use riskscope_core::{ComputationOutput, RiskScopeResult};

use super::DataArgs;

/// Arguments for a full entity report
#[derive(Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Entity identifier (stock code); zero-padded automatically
    #[arg(long)]
    pub entity: String,

    /// Also request a natural-language narrative
    #[arg(long)]
    pub narrative: bool,

    /// API key for the text-generation service
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

/// Arguments for commands that only need an entity
#[derive(Args)]
pub struct EntityArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Entity identifier (stock code); zero-padded automatically
    #[arg(long)]
    pub entity: String,
}

fn assemble(
    data: &DataArgs,
    entity: &str,
    config: &RiskConfig,
) -> Result<ComputationOutput<RiskReport>, Box<dyn std::error::Error>> {
    let ws = data.open(config);
    let output = ReportAssembler::new(&ws.models, &ws.source, ws.prices.as_ref(), config).assemble(entity)?;
    Ok(output)
}

/// Serialise the envelope with a different `result` payload.
fn with_result(
    output: &ComputationOutput<RiskReport>,
    result: Value,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut value = serde_json::to_value(output)?;
    value["result"] = result;
    Ok(value)
}

pub fn run_report(args: ReportArgs, config: &RiskConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let mut output = assemble(&args.data, &args.entity, config)?;
    if !args.narrative {
        return Ok(serde_json::to_value(&output)?);
    }

    let factors = report::narrative_factors(&output.result, config.narrative.top_factor_limit);
    let prompt = narrative::build_prompt(&output.result, &factors);
    let text = match args.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => narrate(
            GeminiClient::new(key, config.narrative.model.clone()),
            &prompt,
            &mut output.warnings,
        ),
        None => {
            let msg = "No GEMINI_API_KEY set; narrative skipped";
            tracing::warn!("{}", msg);
            output.warnings.push(msg.to_string());
            NARRATIVE_FAILED.to_string()
        }
    };

    let mut value = serde_json::to_value(&output)?;
    value["result"]["narrative"] = Value::String(text);
    Ok(value)
}

/// A client that cannot be built degrades to the fixed failure text,
/// the same as a failed request.
fn narrate<G: TextGenerator>(client: RiskScopeResult<G>, prompt: &str, warnings: &mut Vec<String>) -> String {
    match client {
        Ok(client) => narrative::generate_narrative(&client, prompt),
        Err(e) => {
            let msg = format!("Narrative client unavailable: {}", e);
            tracing::warn!("{}", msg);
            warnings.push(msg);
            NARRATIVE_FAILED.to_string()
        }
    }
}

pub fn run_factors(args: EntityArgs, config: &RiskConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let output = assemble(&args.data, &args.entity, config)?;
    let factors = report::narrative_factors(&output.result, config.narrative.top_factor_limit);
    with_result(
        &output,
        json!({
            "entity_id": output.result.entity_id,
            "company_name": output.result.company_name,
            "risk_score": output.result.risk_score,
            "top_risk": factors.top_risk,
            "top_mitigating": factors.top_mitigating,
        }),
    )
}

pub fn run_prompt(args: EntityArgs, config: &RiskConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let output = assemble(&args.data, &args.entity, config)?;
    let factors = report::narrative_factors(&output.result, config.narrative.top_factor_limit);
    let prompt = narrative::build_prompt(&output.result, &factors);
    with_result(
        &output,
        json!({
            "entity_id": output.result.entity_id,
            "prompt": prompt,
        }),
    )
}
