//! Drivers, assignments and the working roster.
//!
//! Drivers are synthesized on demand while solving, so they live in a
//! growing arena keyed by a stable integer id; nothing forces an a-priori
//! headcount except the exact model, which rebuilds its own slots per
//! attempt. The [`Roster`] is the mutable solution a phase owns: a
//! shift → driver table plus the driver arena. Rolling per-driver
//! statistics are maintained for the greedy phase's feasibility checks;
//! summaries for output are always recomputed from the final assignment
//! table.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::shift::{Shift, ShiftId, VehicleCategory};

pub mod cost;
pub mod summary;

/// Stable driver identifier, rendered `D<NNN>` (1-based) at the boundary.
pub type DriverId = u32;

/// Formats a driver id the way reports expect it.
pub fn format_driver_id(id: DriverId) -> String {
    format!("D{:03}", id)
}

/// N-work / N-rest cycle anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    pub n: u32,
    /// Date the driver's work phase begins.
    pub work_start: NaiveDate,
}

impl Cycle {
    pub fn new(n: u32, work_start: NaiveDate) -> Self {
        Self { n, work_start }
    }

    /// `(date − work_start) mod 2N`, non-negative for dates before the
    /// anchor as well.
    pub fn day_in_cycle(&self, date: NaiveDate) -> u32 {
        let len = (2 * self.n) as i64;
        (date - self.work_start).num_days().rem_euclid(len) as u32
    }

    /// The driver is available on the first N days of each 2N window.
    pub fn works_on(&self, date: NaiveDate) -> bool {
        self.day_in_cycle(date) < self.n
    }

    /// Rolls the anchor back whole cycles until it is on or before
    /// `bound`, preserving the phase.
    pub fn anchored_before(&self, bound: NaiveDate) -> Cycle {
        let len = (2 * self.n) as i64;
        let mut start = self.work_start;
        while start > bound {
            start = start - chrono::Duration::days(len);
        }
        Cycle {
            n: self.n,
            work_start: start,
        }
    }
}

/// One synthesized driver with its rolling month state.
#[derive(Debug, Clone)]
pub struct Driver {
    pub id: DriverId,
    /// Set for N×N regimes; `None` for flexible drivers.
    pub cycle: Option<Cycle>,
    pub shift_ids: Vec<ShiftId>,
    pub last_shift_end: Option<(NaiveDate, u32)>,
    pub last_worked: Option<NaiveDate>,
    pub consecutive_days: u32,
    /// Minutes per week-of-month.
    pub weekly_minutes: BTreeMap<u32, u32>,
    pub monthly_minutes: u32,
    pub sundays_worked: BTreeSet<NaiveDate>,
    pub dates_worked: BTreeSet<NaiveDate>,
    pub categories: BTreeSet<VehicleCategory>,
    pub services: BTreeSet<String>,
}

impl Driver {
    pub fn new(id: DriverId) -> Self {
        Self {
            id,
            cycle: None,
            shift_ids: Vec::new(),
            last_shift_end: None,
            last_worked: None,
            consecutive_days: 0,
            weekly_minutes: BTreeMap::new(),
            monthly_minutes: 0,
            sundays_worked: BTreeSet::new(),
            dates_worked: BTreeSet::new(),
            categories: BTreeSet::new(),
            services: BTreeSet::new(),
        }
    }

    pub fn new_cyclic(id: DriverId, n: u32, work_start: NaiveDate) -> Self {
        let mut driver = Self::new(id);
        driver.cycle = Some(Cycle::new(n, work_start));
        driver
    }

    /// Availability on a date: the cycle mask for N×N drivers, always
    /// true otherwise (flexible limits are per-check, not per-day).
    pub fn available_on(&self, date: NaiveDate) -> bool {
        match self.cycle {
            Some(cycle) => cycle.works_on(date),
            None => true,
        }
    }

    /// Folds a newly assigned shift into the rolling state.
    pub fn record(&mut self, shift: &Shift) {
        self.shift_ids.push(shift.id);

        let minutes = shift.duration_minutes();
        *self.weekly_minutes.entry(shift.week_num).or_insert(0) += minutes;
        self.monthly_minutes += minutes;

        if !self.dates_worked.contains(&shift.date) {
            self.consecutive_days = match self.last_worked {
                Some(prev) if (shift.date - prev).num_days() == 1 => self.consecutive_days + 1,
                Some(prev) if prev == shift.date => self.consecutive_days,
                _ => 1,
            };
            self.last_worked = Some(shift.date);
        }
        self.dates_worked.insert(shift.date);

        match self.last_shift_end {
            Some((date, end)) if (date, end) >= (shift.date, shift.end_minutes) => {}
            _ => self.last_shift_end = Some((shift.date, shift.end_minutes)),
        }

        if shift.is_sunday {
            self.sundays_worked.insert(shift.date);
        }
        self.categories.insert(shift.vehicle_category);
        self.services.insert(shift.service_id.clone());
    }

    pub fn is_idle(&self) -> bool {
        self.shift_ids.is_empty()
    }
}

/// The working solution owned by one solver phase.
#[derive(Debug, Clone)]
pub struct Roster {
    pub drivers: BTreeMap<DriverId, Driver>,
    /// Shift id → assigned driver, dense over the shift set.
    pub assigned: Vec<Option<DriverId>>,
    next_driver: DriverId,
}

impl Roster {
    pub fn new(num_shifts: usize) -> Self {
        Self {
            drivers: BTreeMap::new(),
            assigned: vec![None; num_shifts],
            next_driver: 1,
        }
    }

    pub fn create_driver(&mut self) -> DriverId {
        let id = self.next_driver;
        self.next_driver += 1;
        self.drivers.insert(id, Driver::new(id));
        id
    }

    pub fn create_cyclic_driver(&mut self, n: u32, work_start: NaiveDate) -> DriverId {
        let id = self.next_driver;
        self.next_driver += 1;
        self.drivers.insert(id, Driver::new_cyclic(id, n, work_start));
        id
    }

    /// Assigns a shift, updating the driver's rolling state.
    pub fn assign(&mut self, driver_id: DriverId, shift: &Shift) {
        debug_assert!(self.assigned[shift.id as usize].is_none());
        self.assigned[shift.id as usize] = Some(driver_id);
        if let Some(driver) = self.drivers.get_mut(&driver_id) {
            driver.record(shift);
        }
    }

    /// Detaches a shift from its driver. Rolling statistics are not
    /// rewound; only the cycle phases mutate rosters this way and their
    /// checks read `shift_ids` and the cycle mask alone.
    pub fn unassign(&mut self, shift_id: ShiftId) -> Option<DriverId> {
        let driver_id = self.assigned[shift_id as usize].take()?;
        if let Some(driver) = self.drivers.get_mut(&driver_id) {
            driver.shift_ids.retain(|&s| s != shift_id);
        }
        Some(driver_id)
    }

    /// Removes a driver entirely, releasing its shifts. Returns them.
    pub fn remove_driver(&mut self, driver_id: DriverId) -> Vec<ShiftId> {
        let Some(driver) = self.drivers.remove(&driver_id) else {
            return Vec::new();
        };
        for &shift_id in &driver.shift_ids {
            self.assigned[shift_id as usize] = None;
        }
        driver.shift_ids
    }

    pub fn driver_of(&self, shift_id: ShiftId) -> Option<DriverId> {
        self.assigned[shift_id as usize]
    }

    /// Drivers holding at least one shift.
    pub fn drivers_used(&self) -> usize {
        self.drivers.values().filter(|d| !d.is_idle()).count()
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.iter().filter(|a| a.is_some()).count()
    }

    pub fn coverage(&self) -> f64 {
        if self.assigned.is_empty() {
            return 1.0;
        }
        self.assigned_count() as f64 / self.assigned.len() as f64
    }

    pub fn is_complete(&self) -> bool {
        self.assigned.iter().all(|a| a.is_some())
    }

    /// Search cost: driver count dominates, total hours break ties.
    pub fn cost(&self, shifts: &[Shift]) -> u64 {
        let hours: f64 = self
            .assigned
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_some())
            .map(|(s, _)| shifts[s].duration_hours)
            .sum();
        self.drivers_used() as u64 * 1_000_000 + (hours * 5_000.0) as u64
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shift::VehicleCategory;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, day).unwrap()
    }

    fn shift(id: ShiftId, day: u32, start: u32, end: u32) -> Shift {
        Shift {
            id,
            date: date(day),
            service_id: "S1".to_string(),
            service_name: "Servicio".to_string(),
            service_type: "Faena Minera".to_string(),
            group: "Mina".to_string(),
            vehicle: 0,
            ordinal: 1,
            start_minutes: start,
            end_minutes: end,
            duration_hours: (end - start) as f64 / 60.0,
            vehicle_type: "bus".to_string(),
            vehicle_category: VehicleCategory::Bus,
            is_sunday: date(day).weekday() == chrono::Weekday::Sun,
            week_num: (day - 1) / 7 + 1,
        }
    }

    use chrono::Datelike;

    // ── cycle arithmetic ──────────────────────────────────────────────

    #[test]
    fn cycle_mask_works_first_n_days() {
        let cycle = Cycle::new(7, date(1));
        for day in 1..=7 {
            assert!(cycle.works_on(date(day)), "day {day} should work");
        }
        for day in 8..=14 {
            assert!(!cycle.works_on(date(day)), "day {day} should rest");
        }
        assert!(cycle.works_on(date(15)));
    }

    #[test]
    fn day_in_cycle_is_non_negative_before_anchor() {
        let cycle = Cycle::new(7, date(15));
        // Feb 1 is 14 days before the anchor: 14 mod 14 = 0, a work day.
        assert_eq!(cycle.day_in_cycle(date(1)), 0);
        assert!(cycle.works_on(date(1)));
    }

    #[test]
    fn anchoring_preserves_phase() {
        let cycle = Cycle::new(7, date(10));
        let anchored = cycle.anchored_before(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(anchored.work_start <= NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        for day in 1..=28 {
            assert_eq!(anchored.works_on(date(day)), cycle.works_on(date(day)));
        }
    }

    // ── rolling driver state ──────────────────────────────────────────

    #[test]
    fn record_accumulates_totals() {
        let mut driver = Driver::new(1);
        driver.record(&shift(0, 3, 480, 840));
        driver.record(&shift(1, 3, 960, 1200));
        driver.record(&shift(2, 4, 480, 840));

        assert_eq!(driver.monthly_minutes, 360 + 240 + 360);
        assert_eq!(driver.weekly_minutes[&1], 960);
        assert_eq!(driver.dates_worked.len(), 2);
        assert_eq!(driver.consecutive_days, 2);
        assert_eq!(driver.last_shift_end, Some((date(4), 840)));
    }

    #[test]
    fn consecutive_streak_resets_after_gap() {
        let mut driver = Driver::new(1);
        driver.record(&shift(0, 3, 480, 840));
        driver.record(&shift(1, 4, 480, 840));
        assert_eq!(driver.consecutive_days, 2);
        driver.record(&shift(2, 6, 480, 840));
        assert_eq!(driver.consecutive_days, 1);
    }

    // ── roster bookkeeping ────────────────────────────────────────────

    #[test]
    fn assign_and_unassign_round_trip() {
        let shifts = vec![shift(0, 1, 480, 840), shift(1, 2, 480, 840)];
        let mut roster = Roster::new(shifts.len());
        let d = roster.create_driver();
        roster.assign(d, &shifts[0]);
        roster.assign(d, &shifts[1]);

        assert_eq!(roster.drivers_used(), 1);
        assert!(roster.is_complete());

        assert_eq!(roster.unassign(0), Some(d));
        assert!(!roster.is_complete());
        assert_eq!(roster.drivers[&d].shift_ids, vec![1]);
    }

    #[test]
    fn remove_driver_releases_all_shifts() {
        let shifts = vec![shift(0, 1, 480, 840), shift(1, 2, 480, 840)];
        let mut roster = Roster::new(shifts.len());
        let d = roster.create_cyclic_driver(7, date(1));
        roster.assign(d, &shifts[0]);
        roster.assign(d, &shifts[1]);

        let released = roster.remove_driver(d);
        assert_eq!(released, vec![0, 1]);
        assert_eq!(roster.assigned_count(), 0);
        assert_eq!(roster.drivers_used(), 0);
    }

    #[test]
    fn cost_is_dominated_by_driver_count() {
        let shifts = vec![shift(0, 1, 480, 840), shift(1, 2, 480, 840)];
        let mut one = Roster::new(shifts.len());
        let d = one.create_driver();
        one.assign(d, &shifts[0]);
        one.assign(d, &shifts[1]);

        let mut two = Roster::new(shifts.len());
        let a = two.create_driver();
        let b = two.create_driver();
        two.assign(a, &shifts[0]);
        two.assign(b, &shifts[1]);

        assert!(one.cost(&shifts) < two.cost(&shifts));
    }

    #[test]
    fn idle_drivers_do_not_count_as_used() {
        let mut roster = Roster::new(1);
        roster.create_driver();
        assert_eq!(roster.drivers_used(), 0);
        assert_eq!(roster.coverage(), 0.0);
    }
}
