use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] utl_compare_core::ValidationError),

    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Warehouse(#[from] utl_compare_warehouse::WarehouseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Serialization(_) => 4,
            Self::RateLimited { .. } => 7,
            Self::Warehouse(_) => 10,
            Self::Io(_) => 10,
        }
    }
}

impl From<utl_compare_core::CompareRejection> for CliError {
    fn from(rejection: utl_compare_core::CompareRejection) -> Self {
        match rejection {
            utl_compare_core::CompareRejection::RateLimited {
                retry_after_seconds,
            } => Self::RateLimited {
                retry_after_seconds,
            },
            utl_compare_core::CompareRejection::InvalidParameter(error) => Self::Validation(error),
        }
    }
}
