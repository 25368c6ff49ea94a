use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskScopeError {
    #[error("Entity not found: {entity_id}")]
    NotFound { entity_id: String },

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Model artifact error: {0}")]
    ModelArtifact(String),

    #[error("Feature order mismatch at position {position}: expected '{expected}', model has '{found}'")]
    FeatureOrderMismatch {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("External service error: {service} — {reason}")]
    ExternalService { service: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl RiskScopeError {
    pub fn not_found(entity_id: impl Into<String>) -> Self {
        RiskScopeError::NotFound {
            entity_id: entity_id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RiskScopeError::NotFound { .. })
    }
}

impl From<serde_json::Error> for RiskScopeError {
    fn from(e: serde_json::Error) -> Self {
        RiskScopeError::Serialization(e.to_string())
    }
}

impl From<csv::Error> for RiskScopeError {
    fn from(e: csv::Error) -> Self {
        RiskScopeError::DataSource(e.to_string())
    }
}

impl From<toml::de::Error> for RiskScopeError {
    fn from(e: toml::de::Error) -> Self {
        RiskScopeError::Config(e.to_string())
    }
}

impl From<std::io::Error> for RiskScopeError {
    fn from(e: std::io::Error) -> Self {
        RiskScopeError::Io(e.to_string())
    }
}
