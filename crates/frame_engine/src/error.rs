use contracts::ContractError;
use thiserror::Error;

/// Frame engine errors
///
/// Decoding itself never fails; only construction does.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid decoder config: {0}")]
    InvalidConfig(#[from] ContractError),
}
