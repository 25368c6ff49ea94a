use std::collections::BTreeMap;
use std::path::PathBuf;

use napi::Result as NapiResult;
use napi_derive::napi;
use rust_decimal::Decimal;
use serde::Deserialize;

use riskscope_core::aggregator::{self, RiskCategory};
use riskscope_core::config::RiskConfig;
use riskscope_core::features::Direction;
use riskscope_core::model::{LogisticModel, ModelContext};
use riskscope_core::narrative;
use riskscope_core::normalizer::{self, ReferenceColumn};
use riskscope_core::pricing::{CsvPriceHistory, DateRange, NoPriceSource, PriceSource};
use riskscope_core::report::{self, ReportAssembler, RiskReport};
use riskscope_core::tables::{CsvDirectorySource, InMemorySource};
use riskscope_core::RiskScopeResult;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn config_or_default(config: Option<RiskConfig>) -> NapiResult<RiskConfig> {
    match config {
        Some(c) => {
            c.validate().map_err(to_napi_error)?;
            Ok(c)
        }
        None => Ok(RiskConfig::default()),
    }
}

/// A price handed over by the caller instead of looked up.
struct QuotedPrice(Option<Decimal>);

impl PriceSource for QuotedPrice {
    fn latest_close(&self, _entity_id: &str, _range: DateRange) -> RiskScopeResult<Option<Decimal>> {
        Ok(self.0)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AssembleRequest {
    entity_id: String,
    tables: InMemorySource,
    model: LogisticModel,
    #[serde(default)]
    config: Option<RiskConfig>,
    #[serde(default)]
    price: Option<Decimal>,
}

#[napi]
pub fn assemble_report(request_json: String) -> NapiResult<String> {
    let request: AssembleRequest = serde_json::from_str(&request_json).map_err(to_napi_error)?;
    request.model.validate().map_err(to_napi_error)?;
    let config = config_or_default(request.config)?;
    let models = ModelContext::preloaded(request.model);
    let prices = QuotedPrice(request.price);
    let output = ReportAssembler::new(&models, &request.tables, &prices, &config)
        .assemble(&request.entity_id)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

/// Accepts a bare report or a full output envelope.
#[napi]
pub fn build_narrative_prompt(report_json: String) -> NapiResult<String> {
    let mut value: serde_json::Value = serde_json::from_str(&report_json).map_err(to_napi_error)?;
    if let Some(result) = value.get_mut("result") {
        value = result.take();
    }
    let report: RiskReport = serde_json::from_value(value).map_err(to_napi_error)?;
    let limit = RiskConfig::default().narrative.top_factor_limit;
    let factors = report::narrative_factors(&report, limit);
    Ok(narrative::build_prompt(&report, &factors))
}

// ---------------------------------------------------------------------------
// Aggregation and scoring
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AggregateRequest {
    weights: BTreeMap<String, Option<Decimal>>,
    #[serde(default)]
    config: Option<RiskConfig>,
}

#[napi]
pub fn aggregate_categories(input_json: String) -> NapiResult<String> {
    let request: AggregateRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let config = config_or_default(request.config)?;
    let verdicts = aggregator::aggregate(
        request.weights.iter().map(|(name, w)| (name.as_str(), *w)),
        &config,
    );
    let lights = aggregator::dashboard_lights(&verdicts);
    let routes: BTreeMap<&str, RiskCategory> = request
        .weights
        .keys()
        .map(|name| (name.as_str(), aggregator::route(name)))
        .collect();
    serde_json::to_string(&serde_json::json!({
        "category_verdicts": verdicts,
        "dashboard": lights,
        "routes": routes,
    }))
    .map_err(to_napi_error)
}

#[derive(Deserialize)]
struct NormalizeRequest {
    value: Decimal,
    reference: Vec<Decimal>,
    #[serde(default)]
    feature: Option<String>,
    #[serde(default)]
    direction: Option<Direction>,
}

/// Explicit `direction` wins; otherwise the feature's configured one.
#[napi]
pub fn normalize_score(input_json: String) -> NapiResult<String> {
    let request: NormalizeRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let config = RiskConfig::default();
    let direction = request.direction.unwrap_or_else(|| {
        request
            .feature
            .as_deref()
            .map_or(Direction::HigherIsBetter, |f| config.direction(f))
    });
    let reference = ReferenceColumn::new(request.reference);
    let score = normalizer::score(request.value, &reference, direction);
    serde_json::to_string(&serde_json::json!({
        "score": score,
        "direction": direction,
        "reference_size": reference.len(),
    }))
    .map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Long-lived handle: the classifier is loaded on the first report and
/// kept for the life of the object.
#[napi]
pub struct RiskEngine {
    config: RiskConfig,
    source: CsvDirectorySource,
    models: ModelContext,
    prices: Option<CsvPriceHistory>,
}

#[napi]
impl RiskEngine {
    #[napi(constructor)]
    pub fn new(data_dir: String, model_path: String, config_path: Option<String>) -> napi::Result<Self> {
        let config = match config_path {
            Some(p) => RiskConfig::load(&PathBuf::from(p)).map_err(to_napi_error)?,
            None => RiskConfig::default(),
        };
        let dir = PathBuf::from(data_dir);
        let price_file = dir.join("prices.csv");
        let prices = price_file
            .is_file()
            .then(|| CsvPriceHistory::new(price_file, config.table.identifier_width));
        Ok(Self {
            source: CsvDirectorySource::new(dir, config.table.clone()),
            models: ModelContext::from_path(model_path),
            prices,
            config,
        })
    }

    fn assembler(&self) -> ReportAssembler<'_> {
        let prices: &dyn PriceSource = match &self.prices {
            Some(p) => p,
            None => &NoPriceSource,
        };
        ReportAssembler::new(&self.models, &self.source, prices, &self.config)
    }

    #[napi]
    pub fn report(&self, entity_id: String) -> NapiResult<String> {
        let output = self.assembler().assemble(&entity_id).map_err(to_napi_error)?;
        serde_json::to_string(&output).map_err(to_napi_error)
    }

    #[napi]
    pub fn narrative_prompt(&self, entity_id: String) -> NapiResult<String> {
        let output = self.assembler().assemble(&entity_id).map_err(to_napi_error)?;
        let factors = report::narrative_factors(&output.result, self.config.narrative.top_factor_limit);
        Ok(narrative::build_prompt(&output.result, &factors))
    }
}
