//! Annual replication.
//!
//! February is the base month: 28 days are an exact multiple of the 7-
//! and 14-day cycles, so a February roster fixes each driver's phase for
//! the whole year. Every driver's cycle anchor is rolled back in whole
//! 2N steps to on-or-before January 1, February's assignments are
//! indexed by (driver, day-in-cycle, service, ordinal, vehicle), and the
//! year's shifts are then filled by looking each one up against that
//! index. A driver on day 3 of its work block on Feb 28 is on day 4 on
//! Mar 1 by construction.
//!
//! When February produces any driver without a recognizable N×N pattern
//! the cycle index cannot be rolled back; the year falls back to twelve
//! independent monthly optimizations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate};
use log::{info, warn};

use crate::catalog::CatalogError;
use crate::pattern;
use crate::roster::summary::{
    self, AssignmentRecord, DriverSummary, Metrics, RegimeConstraintsOut, RosterSolution,
    SolveStatus, SolverStatus,
};
use crate::roster::{cost, format_driver_id, Cycle, Roster};
use crate::shift::{self, Shift, VehicleCategory};

use super::Planner;

pub fn optimize_year(planner: &Planner, year: i32) -> Result<RosterSolution, CatalogError> {
    info!("annual: optimizing {year}, base month February");

    let base = planner.solve_month_roster(year, 2)?;
    if !base.roster.is_complete() {
        return Ok(RosterSolution::failed(
            format!("February {year} base month could not be fully covered"),
            year,
            None,
            planner.rules(),
        ));
    }

    let replicable = planner.rules().kind.is_cyclic()
        && base.roster.drivers.values().filter(|d| !d.is_idle()).all(|d| {
            let dates: BTreeSet<NaiveDate> = d
                .shift_ids
                .iter()
                .map(|&s| base.shifts[s as usize].date)
                .collect();
            d.cycle.is_some()
                && pattern::detect(planner.rules().kind, &dates, year, 2) != pattern::FLEXIBLE
        });

    if !replicable {
        warn!("annual: February contains non-replicable patterns, re-optimizing per month");
        return per_month_fallback(planner, year);
    }

    replicate_cycles(planner, year, &base)
}

/// Cycle-anchored replication of the February base month.
fn replicate_cycles(
    planner: &Planner,
    year: i32,
    base: &super::MonthRun,
) -> Result<RosterSolution, CatalogError> {
    let jan_first = NaiveDate::from_ymd_opt(year, 1, 1).expect("January 1st");

    // Anchored cycles per driver.
    let anchored: BTreeMap<u32, Cycle> = base
        .roster
        .drivers
        .values()
        .filter(|d| !d.is_idle())
        .map(|d| {
            let cycle = d.cycle.expect("replicable drivers carry a cycle");
            (d.id, cycle.anchored_before(jan_first))
        })
        .collect();

    // February assignments keyed by the replication tuple.
    let mut index: HashMap<(u32, u32, &str, u32, u32), ()> = HashMap::new();
    for (s, assigned) in base.roster.assigned.iter().enumerate() {
        let Some(driver_id) = assigned else { continue };
        let shift = &base.shifts[s];
        let cycle = anchored[driver_id];
        index.insert(
            (
                *driver_id,
                cycle.day_in_cycle(shift.date),
                shift.service_id.as_str(),
                shift.ordinal,
                shift.vehicle,
            ),
            (),
        );
    }

    // Fill the whole year against the index.
    let year_shifts = shift::expand_year(planner.catalog(), year)?;
    let mut roster = Roster::new(year_shifts.len());
    for (&driver_id, &cycle) in &anchored {
        let mut driver = crate::roster::Driver::new(driver_id);
        driver.cycle = Some(cycle);
        roster.drivers.insert(driver_id, driver);
    }

    for shift in &year_shifts {
        for (&driver_id, cycle) in &anchored {
            let key = (
                driver_id,
                cycle.day_in_cycle(shift.date),
                shift.service_id.as_str(),
                shift.ordinal,
                shift.vehicle,
            );
            if !index.contains_key(&key) {
                continue;
            }
            // A driver that swapped vehicles between February's two
            // cycles matches more than one key per day; never hand it
            // two shifts that run at the same time.
            let clashes = roster.drivers[&driver_id].shift_ids.iter().any(|&h| {
                let held = &year_shifts[h as usize];
                held.date == shift.date
                    && held.start_minutes < shift.end_minutes
                    && shift.start_minutes < held.end_minutes
            });
            if !clashes {
                roster.assign(driver_id, shift);
                break;
            }
        }
    }

    if !roster.is_complete() {
        let uncovered = year_shifts.len() - roster.assigned_count();
        return Ok(RosterSolution::failed(
            format!(
                "annual replication left {uncovered} of {} shifts without a cycle match",
                year_shifts.len()
            ),
            year,
            None,
            planner.rules(),
        ));
    }

    let records = summary::assignment_records(&year_shifts, &roster);
    let monthly = monthly_metrics(&year_shifts, &roster);
    let driver_summary = annual_driver_summary(planner, year, &year_shifts, &roster);
    let solution = consolidate(planner, year, base.status, records, driver_summary, monthly);
    Ok(solution)
}

/// Twelve independent monthly runs, concatenated.
fn per_month_fallback(planner: &Planner, year: i32) -> Result<RosterSolution, CatalogError> {
    let mut all_records = Vec::new();
    let mut monthly = Vec::new();
    let mut merged: BTreeMap<String, DriverSummary> = BTreeMap::new();
    let mut worst_status = SolverStatus::Optimal;

    for month in 1..=12 {
        let solution = planner.optimize_month(year, month)?;
        if solution.status == SolveStatus::Failed {
            return Ok(RosterSolution::failed(
                format!("month {month}/{year} could not be covered"),
                year,
                None,
                planner.rules(),
            ));
        }
        if solution.solver_status == Some(SolverStatus::Heuristic) {
            worst_status = SolverStatus::Heuristic;
        } else if solution.solver_status == Some(SolverStatus::Feasible)
            && worst_status == SolverStatus::Optimal
        {
            worst_status = SolverStatus::Feasible;
        }

        all_records.extend(solution.assignments);
        monthly.push(solution.metrics);
        for (id, month_summary) in solution.driver_summary {
            merge_summary(&mut merged, id, month_summary, planner);
        }
    }

    Ok(consolidate(
        planner,
        year,
        worst_status,
        all_records,
        merged,
        monthly,
    ))
}

fn merge_summary(
    merged: &mut BTreeMap<String, DriverSummary>,
    id: String,
    month_summary: DriverSummary,
    planner: &Planner,
) {
    match merged.get_mut(&id) {
        None => {
            merged.insert(id, month_summary);
        }
        Some(existing) => {
            existing.total_hours += month_summary.total_hours;
            existing.total_shifts += month_summary.total_shifts;
            existing.days_worked += month_summary.days_worked;
            existing.sundays_worked += month_summary.sundays_worked;
            existing.salary += month_summary.salary;
            for service in month_summary.services_worked {
                if !existing.services_worked.contains(&service) {
                    existing.services_worked.push(service);
                }
            }
            for category in month_summary.vehicle_categories {
                if !existing.vehicle_categories.contains(&category) {
                    existing.vehicle_categories.push(category);
                }
            }
            existing.cost_details.base_cost += month_summary.cost_details.base_cost;
            existing.cost_details.vehicle_adjusted_cost +=
                month_summary.cost_details.vehicle_adjusted_cost;
            existing.utilization_pct = annual_utilization(planner, existing.total_hours);
        }
    }
}

/// Per-month metrics over one annual roster: each month repriced with
/// the monthly salary model.
fn monthly_metrics(year_shifts: &[Shift], roster: &Roster) -> Vec<Metrics> {
    (1..=12u32)
        .map(|month| {
            let mut total_hours = 0.0;
            let mut total_shifts = 0u32;
            let mut month_total_shifts = 0u32;
            struct Acc {
                hours: f64,
                categories: BTreeSet<VehicleCategory>,
                services: BTreeSet<String>,
            }
            let mut per_driver: BTreeMap<u32, Acc> = BTreeMap::new();

            for shift in year_shifts.iter().filter(|s| s.date.month() == month) {
                month_total_shifts += 1;
                let Some(driver_id) = roster.driver_of(shift.id) else {
                    continue;
                };
                total_hours += shift.duration_hours;
                total_shifts += 1;
                let acc = per_driver.entry(driver_id).or_insert_with(|| Acc {
                    hours: 0.0,
                    categories: BTreeSet::new(),
                    services: BTreeSet::new(),
                });
                acc.hours += shift.duration_hours;
                acc.categories.insert(shift.vehicle_category);
                acc.services.insert(shift.service_id.clone());
            }

            let total_cost: f64 = per_driver
                .values()
                .map(|acc| {
                    cost::compute(acc.hours, &acc.categories, acc.services.len())
                        .total()
                        .round()
                })
                .sum();
            let drivers_used = per_driver.len() as u32;

            Metrics {
                drivers_used,
                total_shifts,
                total_hours,
                total_cost,
                avg_hours_per_driver: if drivers_used > 0 {
                    total_hours / drivers_used as f64
                } else {
                    0.0
                },
                coverage_percentage: if month_total_shifts > 0 {
                    total_shifts as f64 / month_total_shifts as f64 * 100.0
                } else {
                    100.0
                },
            }
        })
        .collect()
}

fn annual_utilization(planner: &Planner, total_hours: f64) -> f64 {
    let basis = if planner.rules().kind == crate::regime::RegimeKind::Interurbano {
        180.0
    } else {
        176.0
    } * 12.0;
    (total_hours / basis * 1000.0).round() / 10.0
}

/// Annual per-driver rows: February's pattern label, salary summed from
/// the monthly pricing.
fn annual_driver_summary(
    planner: &Planner,
    year: i32,
    year_shifts: &[Shift],
    roster: &Roster,
) -> BTreeMap<String, DriverSummary> {
    struct Acc {
        hours: f64,
        shifts: u32,
        dates: BTreeSet<NaiveDate>,
        sundays: BTreeSet<NaiveDate>,
        services: BTreeSet<String>,
        categories: BTreeSet<VehicleCategory>,
        monthly: BTreeMap<u32, (f64, BTreeSet<VehicleCategory>, BTreeSet<String>)>,
    }
    let mut per_driver: BTreeMap<u32, Acc> = BTreeMap::new();

    for shift in year_shifts {
        let Some(driver_id) = roster.driver_of(shift.id) else {
            continue;
        };
        let acc = per_driver.entry(driver_id).or_insert_with(|| Acc {
            hours: 0.0,
            shifts: 0,
            dates: BTreeSet::new(),
            sundays: BTreeSet::new(),
            services: BTreeSet::new(),
            categories: BTreeSet::new(),
            monthly: BTreeMap::new(),
        });
        acc.hours += shift.duration_hours;
        acc.shifts += 1;
        acc.dates.insert(shift.date);
        if shift.is_sunday {
            acc.sundays.insert(shift.date);
        }
        acc.services.insert(shift.service_id.clone());
        acc.categories.insert(shift.vehicle_category);
        let month_entry = acc
            .monthly
            .entry(shift.date.month())
            .or_insert_with(|| (0.0, BTreeSet::new(), BTreeSet::new()));
        month_entry.0 += shift.duration_hours;
        month_entry.1.insert(shift.vehicle_category);
        month_entry.2.insert(shift.service_id.clone());
    }

    per_driver
        .into_iter()
        .map(|(driver_id, acc)| {
            let formatted = format_driver_id(driver_id);
            // Pattern from the February slice, matching the base month.
            let feb_dates: BTreeSet<NaiveDate> = acc
                .dates
                .iter()
                .copied()
                .filter(|d| d.month() == 2)
                .collect();
            let pattern = pattern::detect(planner.rules().kind, &feb_dates, year, 2);

            let salary: f64 = acc
                .monthly
                .values()
                .map(|(hours, categories, services)| {
                    cost::compute(*hours, categories, services.len()).total().round()
                })
                .sum();
            let mut cost_details = cost::compute(acc.hours, &acc.categories, acc.services.len());
            // Echo the summed monthly pricing in the aggregate rows.
            cost_details.base_cost = cost_details.base_cost.round();
            cost_details.vehicle_adjusted_cost = cost_details.vehicle_adjusted_cost.round();

            let work_start = roster
                .drivers
                .get(&driver_id)
                .and_then(|d| d.cycle)
                .map(|c| c.work_start);

            let summary = DriverSummary {
                name: format!("Conductor {formatted}"),
                pattern,
                work_start_date: work_start,
                total_hours: acc.hours,
                total_shifts: acc.shifts,
                days_worked: acc.dates.len() as u32,
                sundays_worked: acc.sundays.len() as u32,
                utilization_pct: annual_utilization(planner, acc.hours),
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

fn consolidate(
    planner: &Planner,
    year: i32,
    status: SolverStatus,
    records: Vec<AssignmentRecord>,
    driver_summary: BTreeMap<String, DriverSummary>,
    monthly: Vec<Metrics>,
) -> RosterSolution {
    let total_hours: f64 = records.iter().map(|r| r.duration_hours).sum();
    let total_cost: f64 = monthly.iter().map(|m| m.total_cost).sum();
    let drivers_used = driver_summary.len() as u32;
    let coverage = if monthly.is_empty() {
        100.0
    } else {
        monthly.iter().map(|m| m.coverage_percentage).sum::<f64>() / monthly.len() as f64
    };

    RosterSolution {
        status: SolveStatus::Success,
        reason: None,
        solver_status: Some(status),
        year,
        month: None,
        regime: planner.rules().name.to_string(),
        regime_constraints: RegimeConstraintsOut::from_rules(planner.rules()),
        assignments: records,
        driver_summary,
        metrics: Metrics {
            drivers_used,
            total_shifts: monthly.iter().map(|m| m.total_shifts).sum(),
            total_hours,
            total_cost,
            avg_hours_per_driver: if drivers_used > 0 {
                total_hours / drivers_used as f64
            } else {
                0.0
            },
            coverage_percentage: coverage,
        },
        warnings: None,
        monthly_metrics: Some(monthly),
        budget_exhausted: false,
    }
}
