//! Constructive greedy phase.
//!
//! Both regime families share one day-by-day outer loop: process dates in
//! ascending order, offer each day's shifts (by start time) to the
//! available drivers least-loaded first, and open new drivers one at a
//! time for whatever remains. What "available" means is the only real
//! difference between the variants: an N×N cycle mask for Faena Minera,
//! rolling streak/weekly/Sunday limits for everyone else.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{debug, warn};

use crate::conflict::ConflictOracle;
use crate::regime::{RegimeKind, RegimeRules};
use crate::roster::{Driver, DriverId, Roster};
use crate::shift::{sundays_in_month, Shift, ShiftId};

/// Availability policy of the greedy pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreedyMode {
    /// Fixed N-work / N-rest cycles; new drivers anchor their cycle on
    /// the first day they serve.
    Cycle { n: u32 },
    /// No cycle; consecutive-day, weekly-hour and Sunday quotas gate
    /// availability instead.
    Flexible,
}

/// Day-by-day constructive builder.
pub struct GreedyBuilder<'a> {
    shifts: &'a [Shift],
    oracle: &'a ConflictOracle,
    rules: &'a RegimeRules,
    mode: GreedyMode,
    /// Safety valve: new drivers opened per day.
    max_new_per_day: usize,
    /// Optional hard cap on the pool size.
    max_drivers: Option<usize>,
    total_sundays: u32,
}

impl<'a> GreedyBuilder<'a> {
    pub fn new(
        shifts: &'a [Shift],
        oracle: &'a ConflictOracle,
        rules: &'a RegimeRules,
        mode: GreedyMode,
        year: i32,
        month: u32,
        max_new_per_day: usize,
        max_drivers: Option<usize>,
    ) -> Self {
        Self {
            shifts,
            oracle,
            rules,
            mode,
            max_new_per_day,
            max_drivers,
            total_sundays: sundays_in_month(year, month),
        }
    }

    /// Builds an initial roster. Coverage below 100% is possible when the
    /// driver caps bite; the caller decides whether a downstream phase
    /// can repair it.
    pub fn build(&self) -> Roster {
        let mut roster = Roster::new(self.shifts.len());

        let mut by_date: BTreeMap<NaiveDate, Vec<ShiftId>> = BTreeMap::new();
        for shift in self.shifts {
            by_date.entry(shift.date).or_default().push(shift.id);
        }
        // Expansion order already sorts each day by start time.

        for (&date, day_shifts) in &by_date {
            let mut unassigned: Vec<ShiftId> = day_shifts.clone();

            // Available pool, least monthly load first.
            let mut available: Vec<DriverId> = roster
                .drivers
                .values()
                .filter(|d| self.driver_available(d, date))
                .map(|d| d.id)
                .collect();
            available.sort_by_key(|id| (roster.drivers[id].monthly_minutes, *id));

            unassigned.retain(|&shift_id| {
                let shift = &self.shifts[shift_id as usize];
                for &driver_id in &available {
                    if self.can_take(&roster.drivers[&driver_id], shift, date) {
                        roster.assign(driver_id, shift);
                        return false;
                    }
                }
                true
            });

            // Open new drivers for the leftovers.
            let mut opened = 0usize;
            while !unassigned.is_empty() && opened < self.max_new_per_day {
                if let Some(cap) = self.max_drivers {
                    if roster.drivers.len() >= cap {
                        warn!(
                            "driver cap {cap} reached on {date}; {} shifts left",
                            unassigned.len()
                        );
                        return roster;
                    }
                }

                let driver_id = match self.mode {
                    GreedyMode::Cycle { n } => roster.create_cyclic_driver(n, date),
                    GreedyMode::Flexible => roster.create_driver(),
                };
                opened += 1;

                let before = unassigned.len();
                unassigned.retain(|&shift_id| {
                    let shift = &self.shifts[shift_id as usize];
                    if self.can_take(&roster.drivers[&driver_id], shift, date) {
                        roster.assign(driver_id, shift);
                        false
                    } else {
                        true
                    }
                });

                if unassigned.len() == before {
                    // A fresh driver could not take anything: the
                    // remaining shifts are individually unassignable.
                    warn!(
                        "{} shifts on {date} unassignable even to a fresh driver",
                        unassigned.len()
                    );
                    break;
                }
            }

            if !unassigned.is_empty() {
                debug!("{date}: {} shifts left uncovered", unassigned.len());
            }
        }

        roster
    }

    /// Day-level availability (variant-specific).
    fn driver_available(&self, driver: &Driver, date: NaiveDate) -> bool {
        match self.mode {
            GreedyMode::Cycle { .. } => driver.available_on(date),
            GreedyMode::Flexible => {
                // Consecutive-day ceiling: only binds coming off a worked
                // yesterday; a rested driver may return.
                if let Some(last) = driver.last_worked {
                    if (date - last).num_days() == 1
                        && driver.consecutive_days >= self.rules.max_consecutive_days
                    {
                        return false;
                    }
                }
                if is_sunday(date) && !self.sunday_allowed(driver, date) {
                    return false;
                }
                true
            }
        }
    }

    fn sunday_allowed(&self, driver: &Driver, date: NaiveDate) -> bool {
        let Some(min_free) = self.rules.min_free_sundays else {
            return true;
        };
        if driver.sundays_worked.contains(&date) {
            return true;
        }
        let allowed = self.total_sundays.saturating_sub(min_free);
        (driver.sundays_worked.len() as u32) < allowed
    }

    /// Local feasibility of adding one shift to one driver.
    fn can_take(&self, driver: &Driver, shift: &Shift, date: NaiveDate) -> bool {
        // (a) precomputed conflicts with anything already held
        if self.oracle.conflicts_with_any(shift.id, &driver.shift_ids) {
            return false;
        }

        // (b) intra-day group change
        let todays: Vec<&Shift> = driver
            .shift_ids
            .iter()
            .map(|&s| &self.shifts[s as usize])
            .filter(|s| s.date == date)
            .collect();
        if todays.iter().any(|s| s.group != shift.group) {
            return false;
        }

        // (c) day span and daily hour ceiling
        let start = todays
            .iter()
            .map(|s| s.start_minutes)
            .chain([shift.start_minutes])
            .min()
            .expect("at least the candidate");
        let end = todays
            .iter()
            .map(|s| s.end_minutes)
            .chain([shift.end_minutes])
            .max()
            .expect("at least the candidate");
        if end - start > self.span_ceiling_minutes() {
            return false;
        }
        let day_hours: f64 =
            todays.iter().map(|s| s.duration_hours).sum::<f64>() + shift.duration_hours;
        if day_hours > self.rules.max_daily.value() {
            return false;
        }

        // (d) weekly cap by week-of-month
        if let Some(max_weekly) = self.rules.max_weekly_minutes() {
            let week_total = driver.weekly_minutes.get(&shift.week_num).copied().unwrap_or(0);
            if week_total + shift.duration_minutes() > max_weekly {
                return false;
            }
        }

        // (e) monthly cap
        if let Some(max_monthly) = self.rules.max_monthly_minutes() {
            if driver.monthly_minutes + shift.duration_minutes() > max_monthly {
                return false;
            }
        }

        // (f) consecutive-day streak
        if !driver.dates_worked.contains(&date) {
            let streak = match driver.last_worked {
                Some(prev) if (date - prev).num_days() == 1 => driver.consecutive_days + 1,
                _ => 1,
            };
            if streak > self.rules.max_consecutive_days {
                return false;
            }
        }

        // (g) Sunday quota
        if shift.is_sunday && !self.sunday_allowed(driver, date) {
            return false;
        }

        true
    }

    /// The non-cycle regimes bound the working day by their span limit;
    /// the cycle regimes by their daily ceiling (span and daily coincide
    /// at 14 h for minera).
    fn span_ceiling_minutes(&self) -> u32 {
        if self.rules.kind == RegimeKind::FaenaMinera {
            self.rules.max_daily_minutes()
        } else {
            self.rules.max_span_minutes()
        }
    }
}

fn is_sunday(date: NaiveDate) -> bool {
    chrono::Datelike::weekday(&date) == chrono::Weekday::Sun
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ClientParameters, Frequency, Service, ShiftTemplate, VehicleSpec};
    use crate::shift::expand_month;

    fn service(
        id: &str,
        days: Vec<u8>,
        quantity: u32,
        group: &str,
        templates: Vec<(&str, &str, f64)>,
    ) -> Service {
        Service {
            id: id.to_string(),
            name: format!("Servicio {id}"),
            service_type: "Industrial".to_string(),
            service_group: Some(group.to_string()),
            vehicles: VehicleSpec {
                quantity,
                vehicle_type: Some("minibus".to_string()),
            },
            frequency: Frequency { days },
            shifts: templates
                .into_iter()
                .enumerate()
                .map(|(i, (start, end, hours))| ShiftTemplate {
                    shift_number: (i + 1) as u32,
                    start_time: start.to_string(),
                    end_time: end.to_string(),
                    duration_hours: hours,
                })
                .collect(),
        }
    }

    fn catalog(regime: &str, services: Vec<Service>) -> Catalog {
        Catalog {
            client_name: "Cliente".to_string(),
            regime_hint: regime.to_string(),
            parameters: ClientParameters::default(),
            services,
        }
    }

    fn build(
        catalog: &Catalog,
        rules: &RegimeRules,
        mode: GreedyMode,
    ) -> (Vec<Shift>, Roster) {
        let shifts = expand_month(catalog, 2025, 2).unwrap();
        let oracle = ConflictOracle::build(&shifts, rules);
        let builder = GreedyBuilder::new(&shifts, &oracle, rules, mode, 2025, 2, 50, None);
        let roster = builder.build();
        (shifts, roster)
    }

    // ── flexible variant ──────────────────────────────────────────────

    #[test]
    fn single_weekday_service_fits_one_driver() {
        let cat = catalog(
            "Urbano",
            vec![service("S1", vec![0, 1, 2, 3, 4], 1, "Centro", vec![(
                "08:00", "14:00", 6.0,
            )])],
        );
        let rules = RegimeRules::urbano_industrial();
        let (shifts, roster) = build(&cat, &rules, GreedyMode::Flexible);

        assert_eq!(shifts.len(), 20);
        assert!(roster.is_complete());
        assert_eq!(roster.drivers_used(), 1);
    }

    #[test]
    fn overlapping_services_need_two_drivers_per_day() {
        let cat = catalog(
            "Urbano",
            vec![
                service("S1", vec![0, 1, 2, 3, 4], 1, "Centro", vec![("08:00", "14:00", 6.0)]),
                service("S2", vec![0, 1, 2, 3, 4], 1, "Centro", vec![("09:00", "15:00", 6.0)]),
            ],
        );
        let rules = RegimeRules::urbano_industrial();
        let (shifts, roster) = build(&cat, &rules, GreedyMode::Flexible);

        assert!(roster.is_complete());
        // Each weekday both shifts overlap: no single driver may hold both.
        for day_shifts in shifts.chunks(2) {
            let a = roster.driver_of(day_shifts[0].id).unwrap();
            let b = roster.driver_of(day_shifts[1].id).unwrap();
            assert_ne!(a, b);
        }
    }

    #[test]
    fn sunday_quota_forces_extra_drivers() {
        let cat = catalog(
            "Urbano",
            vec![service(
                "S1",
                vec![0, 1, 2, 3, 4, 5, 6],
                1,
                "Centro",
                vec![("08:00", "14:00", 6.0)],
            )],
        );
        let rules = RegimeRules::urbano_industrial();
        let (shifts, roster) = build(&cat, &rules, GreedyMode::Flexible);

        assert!(roster.is_complete());
        // 4 Sundays, 2 must stay free per driver: nobody works more than 2.
        for driver in roster.drivers.values() {
            let sundays = driver
                .shift_ids
                .iter()
                .filter(|&&s| shifts[s as usize].is_sunday)
                .count();
            assert!(sundays <= 2, "driver {} works {sundays} Sundays", driver.id);
        }
        assert!(roster.drivers_used() >= 2);
    }

    #[test]
    fn consecutive_day_streak_is_bounded() {
        let cat = catalog(
            "Urbano",
            vec![service(
                "S1",
                vec![0, 1, 2, 3, 4, 5, 6],
                1,
                "Centro",
                vec![("08:00", "14:00", 6.0)],
            )],
        );
        let rules = RegimeRules::urbano_industrial();
        let (shifts, roster) = build(&cat, &rules, GreedyMode::Flexible);

        for driver in roster.drivers.values() {
            let mut dates: Vec<NaiveDate> = driver
                .shift_ids
                .iter()
                .map(|&s| shifts[s as usize].date)
                .collect();
            dates.sort_unstable();
            dates.dedup();
            let mut streak = 1u32;
            let mut longest = 1u32;
            for pair in dates.windows(2) {
                if (pair[1] - pair[0]).num_days() == 1 {
                    streak += 1;
                    longest = longest.max(streak);
                } else {
                    streak = 1;
                }
            }
            assert!(longest <= 6, "driver {} streak {longest}", driver.id);
        }
    }

    #[test]
    fn weekly_cap_respected() {
        // Two long shifts per weekday would exceed 44h if one driver took
        // every one of them in a week.
        let cat = catalog(
            "Urbano",
            vec![service(
                "S1",
                vec![0, 1, 2, 3, 4],
                1,
                "Centro",
                vec![("06:00", "14:00", 8.0), ("15:00", "23:00", 8.0)],
            )],
        );
        let rules = RegimeRules::urbano_industrial();
        let (shifts, roster) = build(&cat, &rules, GreedyMode::Flexible);

        assert!(roster.is_complete());
        for driver in roster.drivers.values() {
            let mut weekly: BTreeMap<u32, f64> = BTreeMap::new();
            for &s in &driver.shift_ids {
                *weekly.entry(shifts[s as usize].week_num).or_default() +=
                    shifts[s as usize].duration_hours;
            }
            for (&week, &hours) in &weekly {
                assert!(hours <= 44.0, "driver {} week {week}: {hours}h", driver.id);
            }
        }
    }

    #[test]
    fn driver_cap_leaves_shifts_uncovered() {
        let cat = catalog(
            "Urbano",
            vec![
                service("S1", vec![0, 1, 2, 3, 4], 1, "Centro", vec![("08:00", "14:00", 6.0)]),
                service("S2", vec![0, 1, 2, 3, 4], 1, "Centro", vec![("08:00", "14:00", 6.0)]),
            ],
        );
        let rules = RegimeRules::urbano_industrial();
        let shifts = expand_month(&cat, 2025, 2).unwrap();
        let oracle = ConflictOracle::build(&shifts, &rules);
        let builder = GreedyBuilder::new(
            &shifts,
            &oracle,
            &rules,
            GreedyMode::Flexible,
            2025,
            2,
            50,
            Some(1),
        );
        let roster = builder.build();
        assert!(!roster.is_complete());
    }

    // ── cycle variant ─────────────────────────────────────────────────

    #[test]
    fn minera_daily_shift_builds_staggered_7x7() {
        let cat = catalog(
            "Faena Minera",
            vec![service(
                "M1",
                vec![0, 1, 2, 3, 4, 5, 6],
                1,
                "Mina",
                vec![("06:00", "18:00", 12.0)],
            )],
        );
        let rules = RegimeRules::faena_minera();
        let cat_shifts = expand_month(&cat, 2025, 2).unwrap();
        let oracle = ConflictOracle::build(&cat_shifts, &rules);
        let builder = GreedyBuilder::new(
            &cat_shifts,
            &oracle,
            &rules,
            GreedyMode::Cycle { n: 7 },
            2025,
            2,
            50,
            None,
        );
        let roster = builder.build();

        assert!(roster.is_complete());
        assert_eq!(roster.drivers_used(), 2);

        // Every driver only works inside its cycle mask.
        for driver in roster.drivers.values() {
            let cycle = driver.cycle.expect("cyclic driver");
            for &s in &driver.shift_ids {
                assert!(cycle.works_on(cat_shifts[s as usize].date));
            }
        }
        // The second driver starts 7 days after the first.
        let starts: Vec<NaiveDate> = roster
            .drivers
            .values()
            .map(|d| d.cycle.unwrap().work_start)
            .collect();
        assert_eq!((starts[1] - starts[0]).num_days(), 7);
    }

    #[test]
    fn minera_two_vehicles_need_four_drivers() {
        let cat = catalog(
            "Faena Minera",
            vec![service(
                "M1",
                vec![0, 1, 2, 3, 4, 5, 6],
                2,
                "Mina",
                vec![("06:00", "18:00", 12.0)],
            )],
        );
        let rules = RegimeRules::faena_minera();
        let shifts = expand_month(&cat, 2025, 2).unwrap();
        let oracle = ConflictOracle::build(&shifts, &rules);
        let builder = GreedyBuilder::new(
            &shifts,
            &oracle,
            &rules,
            GreedyMode::Cycle { n: 7 },
            2025,
            2,
            50,
            None,
        );
        let roster = builder.build();

        assert!(roster.is_complete());
        assert_eq!(roster.drivers_used(), 4);
    }
}
