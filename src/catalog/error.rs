use thiserror::Error;

/// Errors raised while validating a client catalog.
///
/// Validation happens once at ingestion; every downstream phase assumes a
/// well-formed catalog.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Invalid time string '{0}': expected HH:MM")]
    InvalidTime(String),

    #[error("Service '{service}' declares weekday {weekday}: must be 0 (Monday) .. 6 (Sunday)")]
    InvalidWeekday { service: String, weekday: u8 },

    #[error("Unknown regime tag: '{0}'")]
    UnknownRegime(String),

    #[error("Catalog contains no services")]
    NoServices,

    #[error("Service '{0}' has an empty id")]
    EmptyServiceId(String),

    #[error("Invalid month {0}: must be 1 .. 12")]
    InvalidMonth(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_time_display() {
        let e = CatalogError::InvalidTime("25:99".to_string());
        assert_eq!(e.to_string(), "Invalid time string '25:99': expected HH:MM");
    }

    #[test]
    fn invalid_weekday_display() {
        let e = CatalogError::InvalidWeekday {
            service: "S1".to_string(),
            weekday: 7,
        };
        assert!(e.to_string().contains("weekday 7"));
    }

    #[test]
    fn unknown_regime_display() {
        let e = CatalogError::UnknownRegime("Espacial".to_string());
        assert_eq!(e.to_string(), "Unknown regime tag: 'Espacial'");
    }
}
