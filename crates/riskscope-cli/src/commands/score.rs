use clap::Args;
use serde_json::Value;
use std::path::PathBuf;

use riskscope_core::config::RiskConfig;
use riskscope_core::model::ModelContext;
use riskscope_core::report;
use riskscope_core::tables::FeatureVector;

use crate::input;

/// Arguments for scoring a raw feature vector
#[derive(Args)]
pub struct ScoreArgs {
    /// Path to a JSON object of feature name to value (or pipe it on stdin)
    #[arg(long)]
    pub input: Option<String>,

    /// Classifier artifact
    #[arg(long, env = "RISKSCOPE_MODEL", default_value = "data/model.json")]
    pub model: PathBuf,
}

pub fn run_score(args: ScoreArgs, config: &RiskConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let features = if let Some(ref path) = args.input {
        input::feature_map(input::file::read_json_value(path)?)?
    } else if let Some(features) = input::stdin::read_piped_features()? {
        features
    } else {
        return Err("--input <file> or a JSON object on stdin is required".into());
    };

    let vector = FeatureVector::from_json_map(&features);
    let models = ModelContext::from_path(&args.model);
    let output = report::score_vector(&models, &vector, config)?;
    Ok(serde_json::to_value(output)?)
}
