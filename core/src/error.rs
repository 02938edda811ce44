use thiserror::Error;

/// Error type for gas, exposure and profile computations.
#[derive(Error, Debug, Clone, PartialEq, uniffi::Error)]
#[uniffi(flat_error)]
pub enum PlanError {
    #[error("maximum pO2 exceeded: {po2:.3} bar")]
    MaxPo2Exceeded { po2: f64 },

    #[error("invalid gas composition: fO2 {o2}, fHe {he}")]
    InvalidGasComposition { o2: f64, he: f64 },

    #[error("invalid setpoint: {0} bar")]
    InvalidSetpoint(f64),

    #[error("maximum operating depth is undefined for a mix without oxygen")]
    ModUndefined,

    #[error("deco algorithm failure: {0}")]
    DecoAlgorithm(String),

    #[error("profile inconsistency: {0}")]
    ProfileInconsistency(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),
}

/// Error type for the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("the back-gas decoset cannot be modified")]
    BackGasImmutable,

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_error_display() {
        let err = PlanError::MaxPo2Exceeded { po2: 1.65 };
        assert_eq!(err.to_string(), "maximum pO2 exceeded: 1.650 bar");

        let err = PlanError::InvalidGasComposition { o2: 0.6, he: 0.5 };
        assert_eq!(err.to_string(), "invalid gas composition: fO2 0.6, fHe 0.5");

        let err = PlanError::DecoAlgorithm("ceiling violated at 12 m".to_string());
        assert_eq!(err.to_string(), "deco algorithm failure: ceiling violated at 12 m");

        let err = PlanError::ProfileInconsistency("no active items".to_string());
        assert_eq!(err.to_string(), "profile inconsistency: no active items");
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: PlanError = StorageError::BackGasImmutable.into();
        assert_eq!(
            err.to_string(),
            "persistence failure: the back-gas decoset cannot be modified"
        );

        let err = StorageError::NotFound { kind: "dive", id: 7 };
        assert_eq!(err.to_string(), "dive 7 not found");
    }
}
