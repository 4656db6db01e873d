//! Client catalog: the normalized input bundle consumed by the planner.
//!
//! A [`Catalog`] describes the services a client operates (routes with
//! weekly frequencies, vehicle counts and per-service shift templates)
//! together with the regime hint that selects the legal rule set for the
//! run. Catalogs arrive from an external ingestion collaborator already
//! normalized; this module only validates and answers derived questions
//! (group identity, vehicle category).

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::CatalogError;

use crate::regime::RegimeKind;

/// The input bundle of services, templates, regime hint and parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub client_name: String,
    /// One of `Interurbano`, `Industrial`, `Urbano`, `Interno`,
    /// `Interurbano Bisemanal`, `Faena Minera`, `Minera`.
    pub regime_hint: String,
    #[serde(default)]
    pub parameters: ClientParameters,
    pub services: Vec<Service>,
}

/// Client-level tuning knobs forwarded by the ingestion layer.
///
/// All fields are optional; absent values fall back to regime defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientParameters {
    pub min_rest_hours: Option<f64>,
    pub preparation_time_min: Option<u32>,
    pub closing_time_min: Option<u32>,
    pub allows_penalties: Option<bool>,
    pub allows_overtime: Option<bool>,
    pub backup_drivers_percent: Option<f64>,
}

/// A route operated for the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub service_type: String,
    /// Geographic cluster. Drivers may not change group on the same day.
    /// Falls back to the service name, then the id, when absent.
    pub service_group: Option<String>,
    pub vehicles: VehicleSpec,
    pub frequency: Frequency,
    pub shifts: Vec<ShiftTemplate>,
}

impl Service {
    /// Group identity: explicit group, else name, else id. Never empty.
    pub fn group(&self) -> &str {
        match &self.service_group {
            Some(g) if !g.is_empty() => g,
            _ if !self.name.is_empty() => &self.name,
            _ => &self.id,
        }
    }
}

/// Vehicle fleet backing one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSpec {
    /// A quantity of zero means the service contributes no shifts.
    pub quantity: u32,
    #[serde(rename = "type", default)]
    pub vehicle_type: Option<String>,
}

/// Operating weekdays, Monday = 0 .. Sunday = 6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frequency {
    pub days: Vec<u8>,
}

/// One daily shift slot of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftTemplate {
    pub shift_number: u32,
    /// "HH:MM". An end earlier than or equal to the start crosses midnight;
    /// "00:00" reads as end-of-day.
    pub start_time: String,
    pub end_time: String,
    pub duration_hours: f64,
}

/// Which period to roster: a single month, or the full year when `month`
/// is `None`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunSpec {
    pub year: i32,
    pub month: Option<u32>,
}

impl RunSpec {
    pub fn monthly(year: i32, month: u32) -> Self {
        Self {
            year,
            month: Some(month),
        }
    }

    pub fn annual(year: i32) -> Self {
        Self { year, month: None }
    }
}

/// Parses a "HH:MM" clock string into minutes since midnight.
///
/// Hours up to 24 are accepted so "24:00" reads as end-of-day; anything
/// else out of range is rejected.
pub fn parse_hhmm(value: &str) -> Result<u32, CatalogError> {
    let invalid = || CatalogError::InvalidTime(value.to_string());

    let (h, m) = value.split_once(':').ok_or_else(invalid)?;
    let hours: u32 = h.trim().parse().map_err(|_| invalid())?;
    let minutes: u32 = m.trim().parse().map_err(|_| invalid())?;

    if minutes >= 60 || hours > 24 || (hours == 24 && minutes > 0) {
        return Err(invalid());
    }

    Ok((hours * 60 + minutes) % 1440)
}

impl Catalog {
    /// Validates the catalog. Called once at ingestion; downstream phases
    /// assume well-formed input.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.services.is_empty() {
            return Err(CatalogError::NoServices);
        }

        if RegimeKind::from_hint(&self.regime_hint).is_none() {
            return Err(CatalogError::UnknownRegime(self.regime_hint.clone()));
        }

        for service in &self.services {
            if service.id.is_empty() {
                return Err(CatalogError::EmptyServiceId(service.name.clone()));
            }
            for &day in &service.frequency.days {
                if day > 6 {
                    return Err(CatalogError::InvalidWeekday {
                        service: service.id.clone(),
                        weekday: day,
                    });
                }
            }
            for template in &service.shifts {
                parse_hhmm(&template.start_time)?;
                parse_hhmm(&template.end_time)?;
            }
        }

        Ok(())
    }

    /// The regime governing this catalog's run.
    pub fn regime(&self) -> Result<RegimeKind, CatalogError> {
        RegimeKind::from_hint(&self.regime_hint)
            .ok_or_else(|| CatalogError::UnknownRegime(self.regime_hint.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(num: u32, start: &str, end: &str, hours: f64) -> ShiftTemplate {
        ShiftTemplate {
            shift_number: num,
            start_time: start.to_string(),
            end_time: end.to_string(),
            duration_hours: hours,
        }
    }

    fn service(id: &str, days: Vec<u8>) -> Service {
        Service {
            id: id.to_string(),
            name: format!("Servicio {id}"),
            service_type: "Industrial".to_string(),
            service_group: None,
            vehicles: VehicleSpec {
                quantity: 1,
                vehicle_type: Some("minibus".to_string()),
            },
            frequency: Frequency { days },
            shifts: vec![template(1, "08:00", "14:00", 6.0)],
        }
    }

    fn catalog() -> Catalog {
        Catalog {
            client_name: "Cliente".to_string(),
            regime_hint: "Industrial".to_string(),
            parameters: ClientParameters::default(),
            services: vec![service("S1", vec![0, 1, 2, 3, 4])],
        }
    }

    // ── parse_hhmm ────────────────────────────────────────────────────

    #[test]
    fn parses_plain_times() {
        assert_eq!(parse_hhmm("08:00").unwrap(), 480);
        assert_eq!(parse_hhmm("23:59").unwrap(), 1439);
        assert_eq!(parse_hhmm("00:00").unwrap(), 0);
    }

    #[test]
    fn end_of_day_wraps_to_zero() {
        assert_eq!(parse_hhmm("24:00").unwrap(), 0);
    }

    #[test]
    fn rejects_malformed_times() {
        assert!(parse_hhmm("8h30").is_err());
        assert!(parse_hhmm("08:60").is_err());
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("").is_err());
    }

    // ── validation ────────────────────────────────────────────────────

    #[test]
    fn valid_catalog_passes() {
        assert!(catalog().validate().is_ok());
    }

    #[test]
    fn empty_service_list_fails() {
        let mut c = catalog();
        c.services.clear();
        assert_eq!(c.validate(), Err(CatalogError::NoServices));
    }

    #[test]
    fn unknown_regime_fails() {
        let mut c = catalog();
        c.regime_hint = "Orbital".to_string();
        assert_eq!(
            c.validate(),
            Err(CatalogError::UnknownRegime("Orbital".to_string()))
        );
    }

    #[test]
    fn weekday_out_of_range_fails() {
        let mut c = catalog();
        c.services[0].frequency.days.push(7);
        assert!(matches!(
            c.validate(),
            Err(CatalogError::InvalidWeekday { weekday: 7, .. })
        ));
    }

    #[test]
    fn bad_template_time_fails() {
        let mut c = catalog();
        c.services[0].shifts[0].end_time = "26:00".to_string();
        assert!(matches!(c.validate(), Err(CatalogError::InvalidTime(_))));
    }

    #[test]
    fn group_falls_back_to_name_then_id() {
        let mut s = service("S9", vec![0]);
        assert_eq!(s.group(), "Servicio S9");
        s.service_group = Some("Norte".to_string());
        assert_eq!(s.group(), "Norte");
        s.service_group = None;
        s.name = String::new();
        assert_eq!(s.group(), "S9");
    }
}
