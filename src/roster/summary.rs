//! Output assembly: assignment records, driver summaries, metrics.
//!
//! Everything here is recomputed from the final shift → driver table;
//! the rolling state drivers carry during search is never trusted for
//! reporting.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::pattern;
use crate::regime::RegimeRules;
use crate::roster::cost::{self, CostDetails};
use crate::roster::{format_driver_id, DriverId, Roster};
use crate::shift::{Shift, VehicleCategory};

/// Outcome of a run. Partial best-effort results are never reported as
/// success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Success,
    Failed,
}

/// How the winning solution was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverStatus {
    /// The exact solver proved optimality.
    Optimal,
    /// The exact solver found a solution without an optimality proof.
    Feasible,
    /// Greedy/LNS result; no optimality claim.
    Heuristic,
}

/// One denormalized assignment on the output stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub date: NaiveDate,
    pub service: String,
    pub service_name: String,
    pub service_type: String,
    pub service_group: String,
    pub shift: u32,
    pub vehicle: u32,
    pub driver_id: String,
    pub driver_name: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_hours: f64,
    pub vehicle_type: String,
    pub vehicle_category: VehicleCategory,
}

/// Per-driver report row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSummary {
    pub name: String,
    pub pattern: String,
    pub work_start_date: Option<NaiveDate>,
    pub total_hours: f64,
    pub total_shifts: u32,
    pub days_worked: u32,
    pub sundays_worked: u32,
    pub utilization_pct: f64,
    pub services_worked: Vec<String>,
    pub vehicle_categories: Vec<VehicleCategory>,
    pub contract_type: String,
    pub salary: f64,
    pub cost_details: CostDetails,
}

/// Aggregate run metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub drivers_used: u32,
    pub total_shifts: u32,
    pub total_hours: f64,
    pub total_cost: f64,
    pub avg_hours_per_driver: f64,
    pub coverage_percentage: f64,
}

/// Regime parameter snapshot echoed on the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConstraintsOut {
    pub name: String,
    pub max_daily_hours: f64,
    pub max_weekly_hours: Option<f64>,
    pub max_monthly_hours: Option<f64>,
    pub max_continuous_driving: Option<f64>,
    pub max_consecutive_days: u32,
    pub min_free_sundays: Option<u32>,
}

impl RegimeConstraintsOut {
    pub fn from_rules(rules: &RegimeRules) -> Self {
        Self {
            name: rules.name.to_string(),
            max_daily_hours: rules.max_daily.value(),
            max_weekly_hours: rules.max_weekly.map(|q| q.value()),
            max_monthly_hours: rules.max_monthly.map(|q| q.value()),
            max_continuous_driving: rules.max_continuous_driving.map(|q| q.value()),
            max_consecutive_days: rules.max_consecutive_days,
            min_free_sundays: rules.min_free_sundays,
        }
    }
}

/// A single-service date whose continuous coverage exceeds one ordinary
/// working day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanWarning {
    pub service_id: String,
    pub service_name: String,
    pub date: NaiveDate,
    pub span_hours: f64,
    pub message: String,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Warnings {
    pub service_spans: Vec<SpanWarning>,
}

/// The solution structure returned by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterSolution {
    pub status: SolveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver_status: Option<SolverStatus>,
    pub year: i32,
    /// `None` for annual solutions.
    pub month: Option<u32>,
    pub regime: String,
    pub regime_constraints: RegimeConstraintsOut,
    pub assignments: Vec<AssignmentRecord>,
    pub driver_summary: BTreeMap<String, DriverSummary>,
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Warnings>,
    /// Per-month metrics, present on annual solutions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_metrics: Option<Vec<Metrics>>,
    /// Set when the global wall-clock budget ran out before the
    /// pipeline finished; the solution is the best seen so far.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub budget_exhausted: bool,
}

impl RosterSolution {
    /// A failure outcome carrying no assignments.
    pub fn failed(
        reason: impl Into<String>,
        year: i32,
        month: Option<u32>,
        rules: &RegimeRules,
    ) -> Self {
        Self {
            status: SolveStatus::Failed,
            reason: Some(reason.into()),
            solver_status: None,
            year,
            month,
            regime: rules.name.to_string(),
            regime_constraints: RegimeConstraintsOut::from_rules(rules),
            assignments: Vec::new(),
            driver_summary: BTreeMap::new(),
            metrics: Metrics {
                drivers_used: 0,
                total_shifts: 0,
                total_hours: 0.0,
                total_cost: 0.0,
                avg_hours_per_driver: 0.0,
                coverage_percentage: 0.0,
            },
            warnings: None,
            monthly_metrics: None,
            budget_exhausted: false,
        }
    }
}

/// Utilization basis in hours per month: 180 for Interurbano, 44 h × 4
/// weeks otherwise.
fn utilization_basis(rules: &RegimeRules) -> f64 {
    if rules.kind == crate::regime::RegimeKind::Interurbano {
        180.0
    } else {
        176.0
    }
}

/// Assembles the boundary solution for one month from a completed (or
/// partial) roster.
pub fn build_monthly_solution(
    shifts: &[Shift],
    roster: &Roster,
    rules: &RegimeRules,
    year: i32,
    month: u32,
    solver_status: SolverStatus,
) -> RosterSolution {
    let records = assignment_records(shifts, roster);
    let driver_summary = summarize_drivers(shifts, roster, rules, year, month);
    let metrics = compute_metrics(shifts, &records, &driver_summary);
    let warnings = span_warnings(shifts);

    let status = if roster.is_complete() {
        SolveStatus::Success
    } else {
        SolveStatus::Failed
    };
    let reason = (status == SolveStatus::Failed).then(|| {
        format!(
            "{} of {} shifts left uncovered",
            shifts.len() - roster.assigned_count(),
            shifts.len()
        )
    });

    RosterSolution {
        status,
        reason,
        solver_status: Some(solver_status),
        year,
        month: Some(month),
        regime: rules.name.to_string(),
        regime_constraints: RegimeConstraintsOut::from_rules(rules),
        assignments: records,
        driver_summary,
        metrics,
        warnings: (!warnings.service_spans.is_empty()).then_some(warnings),
        monthly_metrics: None,
        budget_exhausted: false,
    }
}

/// Denormalizes the shift → driver table into output records, in shift
/// order.
pub fn assignment_records(shifts: &[Shift], roster: &Roster) -> Vec<AssignmentRecord> {
    shifts
        .iter()
        .filter_map(|shift| {
            let driver_id = roster.driver_of(shift.id)?;
            Some(record_for(shift, driver_id))
        })
        .collect()
}

pub fn record_for(shift: &Shift, driver_id: DriverId) -> AssignmentRecord {
    let formatted = format_driver_id(driver_id);
    AssignmentRecord {
        date: shift.date,
        service: shift.service_id.clone(),
        service_name: shift.service_name.clone(),
        service_type: shift.service_type.clone(),
        service_group: shift.group.clone(),
        shift: shift.ordinal,
        vehicle: shift.vehicle,
        driver_name: format!("Conductor {formatted}"),
        driver_id: formatted,
        start_time: shift.start_time(),
        end_time: shift.end_time(),
        duration_hours: shift.duration_hours,
        vehicle_type: shift.vehicle_type.clone(),
        vehicle_category: shift.vehicle_category,
    }
}

fn summarize_drivers(
    shifts: &[Shift],
    roster: &Roster,
    rules: &RegimeRules,
    year: i32,
    month: u32,
) -> BTreeMap<String, DriverSummary> {
    struct Acc {
        total_hours: f64,
        total_shifts: u32,
        dates: BTreeSet<NaiveDate>,
        sundays: BTreeSet<NaiveDate>,
        services: BTreeSet<String>,
        categories: BTreeSet<VehicleCategory>,
    }

    let mut by_driver: BTreeMap<DriverId, Acc> = BTreeMap::new();
    for shift in shifts {
        let Some(driver_id) = roster.driver_of(shift.id) else {
            continue;
        };
        let acc = by_driver.entry(driver_id).or_insert_with(|| Acc {
            total_hours: 0.0,
            total_shifts: 0,
            dates: BTreeSet::new(),
            sundays: BTreeSet::new(),
            services: BTreeSet::new(),
            categories: BTreeSet::new(),
        });
        acc.total_hours += shift.duration_hours;
        acc.total_shifts += 1;
        acc.dates.insert(shift.date);
        if shift.is_sunday {
            acc.sundays.insert(shift.date);
        }
        acc.services.insert(shift.service_id.clone());
        acc.categories.insert(shift.vehicle_category);
    }

    let basis = utilization_basis(rules);
    by_driver
        .into_iter()
        .map(|(driver_id, acc)| {
            let formatted = format_driver_id(driver_id);
            let pattern = pattern::detect(rules.kind, &acc.dates, year, month);
            let work_start = roster
                .drivers
                .get(&driver_id)
                .and_then(|d| d.cycle)
                .map(|c| c.work_start);
            let cost_details = cost::compute(acc.total_hours, &acc.categories, acc.services.len());
            let salary = cost_details.total().round();

            let summary = DriverSummary {
                name: format!("Conductor {formatted}"),
                pattern,
                work_start_date: work_start,
                total_hours: acc.total_hours,
                total_shifts: acc.total_shifts,
                days_worked: acc.dates.len() as u32,
                sundays_worked: acc.sundays.len() as u32,
                utilization_pct: (acc.total_hours / basis * 1000.0).round() / 10.0,
                services_worked: acc.services.into_iter().collect(),
                vehicle_categories: acc.categories.into_iter().collect(),
                contract_type: "fixed_term".to_string(),
                salary,
                cost_details,
            };
            (formatted, summary)
        })
        .collect()
}

fn compute_metrics(
    shifts: &[Shift],
    records: &[AssignmentRecord],
    driver_summary: &BTreeMap<String, DriverSummary>,
) -> Metrics {
    let total_hours: f64 = records.iter().map(|r| r.duration_hours).sum();
    let total_cost: f64 = driver_summary.values().map(|d| d.salary).sum();
    let drivers_used = driver_summary.len() as u32;
    let coverage = if shifts.is_empty() {
        100.0
    } else {
        records.len() as f64 / shifts.len() as f64 * 100.0
    };

    Metrics {
        drivers_used,
        total_shifts: records.len() as u32,
        total_hours,
        total_cost,
        avg_hours_per_driver: if drivers_used > 0 {
            total_hours / drivers_used as f64
        } else {
            0.0
        },
        coverage_percentage: coverage,
    }
}

/// Flags single-service dates whose earliest-start to latest-end span
/// exceeds 12 h. Faena services within the 14 h exceptional ceiling get
/// a regime-change recommendation.
pub fn span_warnings(shifts: &[Shift]) -> Warnings {
    let mut spans: BTreeMap<(&str, NaiveDate), (u32, u32, &Shift)> = BTreeMap::new();
    for shift in shifts {
        let entry = spans
            .entry((shift.service_id.as_str(), shift.date))
            .or_insert((shift.start_minutes, shift.end_minutes, shift));
        entry.0 = entry.0.min(shift.start_minutes);
        entry.1 = entry.1.max(shift.end_minutes);
    }

    let mut warnings = Vec::new();
    for ((service_id, date), (start, end, sample)) in spans {
        let span_hours = (end - start) as f64 / 60.0;
        if span_hours <= 12.0 {
            continue;
        }
        let recommendation = (sample.service_type.to_lowercase().contains("faena")
            && span_hours <= 14.0)
            .then(|| "Cambiar a régimen excepcional (2x2, 7x7).".to_string());
        warnings.push(SpanWarning {
            service_id: service_id.to_string(),
            service_name: sample.service_name.clone(),
            date,
            span_hours: (span_hours * 10.0).round() / 10.0,
            message: format!(
                "Cobertura continua de {span_hours:.1}h requiere más de una jornada ordinaria."
            ),
            recommendation,
        });
    }

    Warnings {
        service_spans: warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::RegimeRules;

    fn shift(id: u32, day: u32, start: u32, end: u32, service: &str) -> Shift {
        let date = NaiveDate::from_ymd_opt(2025, 2, day).unwrap();
        Shift {
            id,
            date,
            service_id: service.to_string(),
            service_name: format!("Servicio {service}"),
            service_type: "Industrial".to_string(),
            group: "Centro".to_string(),
            vehicle: 0,
            ordinal: 1,
            start_minutes: start,
            end_minutes: end,
            duration_hours: (end - start) as f64 / 60.0,
            vehicle_type: "minibus".to_string(),
            vehicle_category: VehicleCategory::Minibus,
            is_sunday: chrono::Datelike::weekday(&date) == chrono::Weekday::Sun,
            week_num: (day - 1) / 7 + 1,
        }
    }

    fn roster_covering(shifts: &[Shift]) -> Roster {
        let mut roster = Roster::new(shifts.len());
        let d = roster.create_driver();
        for s in shifts {
            roster.assign(d, s);
        }
        roster
    }

    #[test]
    fn records_follow_shift_order_and_format_ids() {
        let shifts = vec![shift(0, 3, 480, 840, "S1"), shift(1, 4, 480, 840, "S1")];
        let roster = roster_covering(&shifts);
        let records = assignment_records(&shifts, &roster);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].driver_id, "D001");
        assert_eq!(records[0].driver_name, "Conductor D001");
        assert_eq!(records[0].start_time, "08:00");
        assert_eq!(records[0].end_time, "14:00");
    }

    #[test]
    fn metrics_and_summary_agree() {
        let shifts = vec![shift(0, 3, 480, 840, "S1"), shift(1, 4, 480, 840, "S1")];
        let roster = roster_covering(&shifts);
        let solution = build_monthly_solution(
            &shifts,
            &roster,
            &RegimeRules::urbano_industrial(),
            2025,
            2,
            SolverStatus::Heuristic,
        );

        assert_eq!(solution.status, SolveStatus::Success);
        assert_eq!(solution.metrics.drivers_used, 1);
        assert_eq!(solution.metrics.total_shifts, 2);
        assert_eq!(solution.metrics.total_hours, 12.0);
        assert_eq!(solution.metrics.coverage_percentage, 100.0);

        let summary = &solution.driver_summary["D001"];
        assert_eq!(summary.total_shifts, 2);
        assert_eq!(summary.days_worked, 2);
        assert_eq!(summary.salary, 120_000.0);
        assert_eq!(summary.contract_type, "fixed_term");
    }

    #[test]
    fn partial_coverage_is_a_failure() {
        let shifts = vec![shift(0, 3, 480, 840, "S1"), shift(1, 4, 480, 840, "S1")];
        let mut roster = Roster::new(shifts.len());
        let d = roster.create_driver();
        roster.assign(d, &shifts[0]);

        let solution = build_monthly_solution(
            &shifts,
            &roster,
            &RegimeRules::urbano_industrial(),
            2025,
            2,
            SolverStatus::Heuristic,
        );
        assert_eq!(solution.status, SolveStatus::Failed);
        assert!(solution.reason.unwrap().contains("1 of 2"));
        assert_eq!(solution.metrics.coverage_percentage, 50.0);
    }

    #[test]
    fn span_warning_over_12h() {
        // One service covering 06:00-20:00 on one date.
        let shifts = vec![
            shift(0, 3, 360, 840, "S1"),
            shift(1, 3, 900, 1200, "S1"),
        ];
        let warnings = span_warnings(&shifts);
        assert_eq!(warnings.service_spans.len(), 1);
        let w = &warnings.service_spans[0];
        assert_eq!(w.span_hours, 14.0);
        assert!(w.recommendation.is_none());
    }

    #[test]
    fn faena_span_recommendation() {
        let mut a = shift(0, 3, 360, 840, "S1");
        let mut b = shift(1, 3, 900, 1200, "S1");
        a.service_type = "Faena Minera".to_string();
        b.service_type = "Faena Minera".to_string();
        let warnings = span_warnings(&[a, b]);
        assert!(warnings.service_spans[0].recommendation.is_some());
    }

    #[test]
    fn no_warning_at_exactly_12h() {
        let shifts = vec![shift(0, 3, 360, 1080, "S1")];
        assert!(span_warnings(&shifts).service_spans.is_empty());
    }
}
