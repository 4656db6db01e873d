//! Concrete shift expansion.
//!
//! Materializes service templates × operating weekdays × vehicle count ×
//! date range into the dated [`Shift`] records every downstream phase
//! works on. Expansion is the only place clock strings are parsed; from
//! here on all time arithmetic is integer minutes.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::catalog::{parse_hhmm, Catalog, CatalogError, Service};

/// Dense shift identifier assigned in expansion order.
pub type ShiftId = u32;

/// Vehicle complexity class, derived from the vehicle type string.
///
/// Categories carry a salary surcharge; see [`VehicleCategory::recargo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VehicleCategory {
    #[serde(rename = "minibus")]
    Minibus,
    #[serde(rename = "taxibus")]
    Taxibus,
    #[serde(rename = "bus")]
    Bus,
    #[serde(rename = "bus_electrico")]
    BusElectrico,
    #[serde(rename = "bus_2piso")]
    Bus2Piso,
    #[serde(rename = "taxibus_4x4")]
    Taxibus4x4,
    #[serde(rename = "other")]
    Other,
}

impl VehicleCategory {
    /// Infers the category from a raw vehicle type (falling back to the
    /// service type when the fleet record carries none). Most specific
    /// match first.
    pub fn infer(raw: &str) -> Self {
        let normalized = raw.to_lowercase();
        if normalized.is_empty() {
            return Self::Minibus;
        }
        if normalized.contains("4x4") && normalized.contains("taxi") {
            Self::Taxibus4x4
        } else if normalized.contains('2') && normalized.contains("piso") {
            Self::Bus2Piso
        } else if normalized.contains("electric") || normalized.contains("eléctric") {
            Self::BusElectrico
        } else if normalized.contains("taxi") {
            Self::Taxibus
        } else if normalized.contains("mini") || normalized.contains("van") {
            Self::Minibus
        } else if normalized.contains("bus") {
            Self::Bus
        } else {
            Self::Minibus
        }
    }

    /// Salary surcharge factor over the base hourly rate.
    pub fn recargo(self) -> f64 {
        match self {
            Self::Minibus => 0.00,
            Self::Taxibus => 0.10,
            Self::BusElectrico => 0.20,
            Self::Bus => 0.25,
            Self::Bus2Piso => 0.30,
            Self::Taxibus4x4 => 0.40,
            Self::Other => 0.00,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minibus => "minibus",
            Self::Taxibus => "taxibus",
            Self::Bus => "bus",
            Self::BusElectrico => "bus_electrico",
            Self::Bus2Piso => "bus_2piso",
            Self::Taxibus4x4 => "taxibus_4x4",
            Self::Other => "other",
        }
    }
}

/// A concrete dated instance of a service template on one vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shift {
    pub id: ShiftId,
    pub date: NaiveDate,
    pub service_id: String,
    pub service_name: String,
    pub service_type: String,
    /// Geographic group; never empty.
    pub group: String,
    /// Vehicle index within the service fleet, `0..quantity`.
    pub vehicle: u32,
    /// Ordinal of the template within the service's shift list.
    pub ordinal: u32,
    /// Minutes since midnight, `0..1440`.
    pub start_minutes: u32,
    /// Normalized to `>= start_minutes`; crosses midnight when `> 1440`.
    pub end_minutes: u32,
    pub duration_hours: f64,
    pub vehicle_type: String,
    pub vehicle_category: VehicleCategory,
    pub is_sunday: bool,
    /// Week-of-month, `⌊(day−1)/7⌋ + 1`.
    pub week_num: u32,
}

impl Shift {
    pub fn duration_minutes(&self) -> u32 {
        (self.duration_hours * 60.0).round() as u32
    }

    /// "HH:MM" rendering of the start clock.
    pub fn start_time(&self) -> String {
        format_hhmm(self.start_minutes)
    }

    /// "HH:MM" rendering of the end clock (wrapped past midnight).
    pub fn end_time(&self) -> String {
        format_hhmm(self.end_minutes % 1440)
    }
}

pub fn format_hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", (minutes / 60) % 24, minutes % 60)
}

// ── calendar helpers ──────────────────────────────────────────────────

/// Number of days in a calendar month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid month");
    (next - first).num_days() as u32
}

/// All dates of one calendar month, ascending.
pub fn month_dates(year: i32, month: u32) -> impl Iterator<Item = NaiveDate> {
    let days = days_in_month(year, month);
    (1..=days).map(move |d| NaiveDate::from_ymd_opt(year, month, d).expect("valid day"))
}

/// Number of Sundays in a calendar month.
pub fn sundays_in_month(year: i32, month: u32) -> u32 {
    month_dates(year, month)
        .filter(|d| d.weekday() == chrono::Weekday::Sun)
        .count() as u32
}

/// Week-of-month index, 1-based.
pub fn week_num(date: NaiveDate) -> u32 {
    (date.day() - 1) / 7 + 1
}

/// Weekday index with Monday = 0 .. Sunday = 6.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

// ── expansion ─────────────────────────────────────────────────────────

/// Expands a catalog into the concrete shift set for one month.
///
/// Shifts come out sorted by `(date, start, service, vehicle, ordinal)`
/// with dense ids in that order, so every stage processes them in a
/// deterministic order.
pub fn expand_month(catalog: &Catalog, year: i32, month: u32) -> Result<Vec<Shift>, CatalogError> {
    if !(1..=12).contains(&month) {
        return Err(CatalogError::InvalidMonth(month));
    }

    let mut shifts = Vec::new();
    for date in month_dates(year, month) {
        let weekday = weekday_index(date);
        for service in &catalog.services {
            if !service.frequency.days.contains(&weekday) {
                continue;
            }
            expand_service_day(service, date, &mut shifts)?;
        }
    }

    sort_and_index(&mut shifts);
    Ok(shifts)
}

/// Expands a catalog over all twelve months of a year (annual mode).
pub fn expand_year(catalog: &Catalog, year: i32) -> Result<Vec<Shift>, CatalogError> {
    let mut shifts = Vec::new();
    for month in 1..=12 {
        for date in month_dates(year, month) {
            let weekday = weekday_index(date);
            for service in &catalog.services {
                if !service.frequency.days.contains(&weekday) {
                    continue;
                }
                expand_service_day(service, date, &mut shifts)?;
            }
        }
    }

    sort_and_index(&mut shifts);
    Ok(shifts)
}

fn expand_service_day(
    service: &Service,
    date: NaiveDate,
    out: &mut Vec<Shift>,
) -> Result<(), CatalogError> {
    let vehicle_type = service
        .vehicles
        .vehicle_type
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| service.service_type.clone());
    let category = VehicleCategory::infer(&vehicle_type);

    for template in &service.shifts {
        let start = parse_hhmm(&template.start_time)?;
        let mut end = parse_hhmm(&template.end_time)?;
        if end <= start {
            // Crosses midnight; "00:00" reads as end of calendar day.
            end += 1440;
        }

        for vehicle in 0..service.vehicles.quantity {
            out.push(Shift {
                id: 0,
                date,
                service_id: service.id.clone(),
                service_name: service.name.clone(),
                service_type: service.service_type.clone(),
                group: service.group().to_string(),
                vehicle,
                ordinal: template.shift_number,
                start_minutes: start,
                end_minutes: end,
                duration_hours: template.duration_hours,
                vehicle_type: vehicle_type.clone(),
                vehicle_category: category,
                is_sunday: date.weekday() == chrono::Weekday::Sun,
                week_num: week_num(date),
            });
        }
    }

    Ok(())
}

fn sort_and_index(shifts: &mut [Shift]) {
    shifts.sort_by(|a, b| {
        (a.date, a.start_minutes, &a.service_id, a.vehicle, a.ordinal).cmp(&(
            b.date,
            b.start_minutes,
            &b.service_id,
            b.vehicle,
            b.ordinal,
        ))
    });
    for (idx, shift) in shifts.iter_mut().enumerate() {
        shift.id = idx as ShiftId;
    }
}
