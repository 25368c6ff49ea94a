pub mod percentile;
pub mod report;
pub mod rules;
pub mod score;

use clap::Args;
use std::path::{Path, PathBuf};

use riskscope_core::config::RiskConfig;
use riskscope_core::model::ModelContext;
use riskscope_core::pricing::{CsvPriceHistory, NoPriceSource, PriceSource};
use riskscope_core::tables::CsvDirectorySource;

/// Where the feature tables, classifier artifact and price history live.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory holding the company, industry and population tables
    #[arg(long, env = "RISKSCOPE_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Classifier artifact (defaults to <data-dir>/model.json)
    #[arg(long, env = "RISKSCOPE_MODEL")]
    pub model: Option<PathBuf>,

    /// Daily close history CSV (defaults to <data-dir>/prices.csv when present)
    #[arg(long, env = "RISKSCOPE_PRICES")]
    pub prices: Option<PathBuf>,
}

/// Tables, model and prices wired up for one invocation.
pub struct Workspace {
    pub source: CsvDirectorySource,
    pub models: ModelContext,
    pub prices: Box<dyn PriceSource>,
}

impl DataArgs {
    pub fn model_path(&self) -> PathBuf {
        self.model
            .clone()
            .unwrap_or_else(|| self.data_dir.join("model.json"))
    }

    pub fn open(&self, config: &RiskConfig) -> Workspace {
        let prices: Box<dyn PriceSource> = match self.price_path() {
            Some(path) => Box::new(CsvPriceHistory::new(path, config.table.identifier_width)),
            None => {
                tracing::debug!("no price history configured");
                Box::new(NoPriceSource)
            }
        };
        Workspace {
            source: CsvDirectorySource::new(&self.data_dir, config.table.clone()),
            models: ModelContext::from_path(self.model_path()),
            prices,
        }
    }

    fn price_path(&self) -> Option<PathBuf> {
        match &self.prices {
            Some(p) => Some(p.clone()),
            None => {
                let default = self.data_dir.join("prices.csv");
                default.is_file().then_some(default)
            }
        }
    }
}

/// The config file when one is given, otherwise the built-in table.
pub fn load_config(path: Option<&Path>) -> Result<RiskConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(RiskConfig::load(p)?),
        None => Ok(RiskConfig::default()),
    }
}
