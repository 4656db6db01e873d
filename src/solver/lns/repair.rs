//! Shared repair step and the per-day occupancy bitmap.

use crate::conflict::ConflictOracle;
use crate::roster::Roster;
use crate::shift::{Shift, ShiftId};

/// 1440-slot occupancy bitmap for one (driver, date).
///
/// Rebuilt lazily during repair. The span check scans for the first and
/// last set bits instead of counting.
#[derive(Debug, Clone)]
pub struct DayOccupancy {
    words: [u64; 23],
}

impl DayOccupancy {
    pub fn new() -> Self {
        Self { words: [0; 23] }
    }

    /// Marks `[start, end)` minutes, wrapping past midnight.
    pub fn add(&mut self, start_minutes: u32, end_minutes: u32) {
        let start = (start_minutes % 1440) as usize;
        let end = (end_minutes % 1440) as usize;
        if end <= start {
            self.set_range(start, 1440);
            self.set_range(0, end);
        } else {
            self.set_range(start, end);
        }
    }

    /// True when `[start, end)` neither overlaps occupied minutes nor
    /// stretches the day's span past `max_span_minutes`.
    pub fn can_fit(&self, start_minutes: u32, end_minutes: u32, max_span_minutes: u32) -> bool {
        let start = (start_minutes % 1440) as usize;
        let end = (end_minutes % 1440) as usize;

        if end <= start {
            if self.any_set(start, 1440) || self.any_set(0, end) {
                return false;
            }
        } else if self.any_set(start, end) {
            return false;
        }

        let mut widened = self.clone();
        widened.add(start_minutes, end_minutes);
        widened.span_minutes() <= max_span_minutes
    }

    /// Minutes from first to last occupied slot.
    pub fn span_minutes(&self) -> u32 {
        let Some(first) = self.first_set() else {
            return 0;
        };
        let last = self.last_set().expect("non-empty when first is");
        (last - first) as u32
    }

    fn set_range(&mut self, start: usize, end: usize) {
        for minute in start..end {
            self.words[minute / 64] |= 1 << (minute % 64);
        }
    }

    fn any_set(&self, start: usize, end: usize) -> bool {
        (start..end).any(|m| self.words[m / 64] & (1 << (m % 64)) != 0)
    }

    fn first_set(&self) -> Option<usize> {
        for (i, &word) in self.words.iter().enumerate() {
            if word != 0 {
                return Some(i * 64 + word.trailing_zeros() as usize);
            }
        }
        None
    }

    fn last_set(&self) -> Option<usize> {
        for (i, &word) in self.words.iter().enumerate().rev() {
            if word != 0 {
                return Some(i * 64 + 63 - word.leading_zeros() as usize);
            }
        }
        None
    }
}

impl Default for DayOccupancy {
    fn default() -> Self {
        Self::new()
    }
}

/// Reinserts released shifts. Existing drivers are tried in id order
/// (cycle availability, conflict sets, daily occupancy, group); a fresh
/// driver anchored on the shift's date takes anything that does not fit,
/// so repair never leaves a shift uncovered.
pub fn repair(
    roster: &mut Roster,
    released: &[ShiftId],
    shifts: &[Shift],
    oracle: &ConflictOracle,
    max_span_minutes: u32,
    cycle_n: u32,
) {
    for &shift_id in released {
        let shift = &shifts[shift_id as usize];
        let target = find_driver(roster, shift, shifts, oracle, max_span_minutes);

        match target {
            Some(driver_id) => roster.assign(driver_id, shift),
            None => {
                let driver_id = roster.create_cyclic_driver(cycle_n, shift.date);
                roster.assign(driver_id, shift);
            }
        }
    }
}

fn find_driver(
    roster: &Roster,
    shift: &Shift,
    shifts: &[Shift],
    oracle: &ConflictOracle,
    max_span_minutes: u32,
) -> Option<crate::roster::DriverId> {
    for driver in roster.drivers.values() {
        if !driver.available_on(shift.date) {
            continue;
        }
        if oracle.conflicts_with_any(shift.id, &driver.shift_ids) {
            continue;
        }

        let mut occupancy = DayOccupancy::new();
        let mut group_clash = false;
        for &held in &driver.shift_ids {
            let held_shift = &shifts[held as usize];
            if held_shift.date != shift.date {
                continue;
            }
            if held_shift.group != shift.group {
                group_clash = true;
                break;
            }
            occupancy.add(held_shift.start_minutes, held_shift.end_minutes);
        }
        if group_clash {
            continue;
        }
        if !occupancy.can_fit(shift.start_minutes, shift.end_minutes, max_span_minutes) {
            continue;
        }

        return Some(driver.id);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::RegimeRules;
    use crate::shift::VehicleCategory;
    use chrono::NaiveDate;

    fn shift(id: u32, day: u32, start: u32, end: u32) -> Shift {
        let date = NaiveDate::from_ymd_opt(2025, 2, day).unwrap();
        Shift {
            id,
            date,
            service_id: "M1".to_string(),
            service_name: "Mina".to_string(),
            service_type: "Faena Minera".to_string(),
            group: "Mina".to_string(),
            vehicle: 0,
            ordinal: 1,
            start_minutes: start,
            end_minutes: end,
            duration_hours: (end - start) as f64 / 60.0,
            vehicle_type: "bus".to_string(),
            vehicle_category: VehicleCategory::Bus,
            is_sunday: false,
            week_num: (day - 1) / 7 + 1,
        }
    }

    // ── occupancy bitmap ──────────────────────────────────────────────

    #[test]
    fn empty_day_fits_anything() {
        let occ = DayOccupancy::new();
        assert!(occ.can_fit(360, 1080, 840));
        assert_eq!(occ.span_minutes(), 0);
    }

    #[test]
    fn overlap_is_rejected() {
        let mut occ = DayOccupancy::new();
        occ.add(360, 1080);
        assert!(!occ.can_fit(600, 700, 840));
        assert!(!occ.can_fit(1079, 1081, 840));
    }

    #[test]
    fn adjacent_slot_fits_within_span() {
        let mut occ = DayOccupancy::new();
        occ.add(360, 720);
        // 06:00-12:00 occupied; 12:00-14:00 keeps span at 8h.
        assert!(occ.can_fit(720, 840, 840));
    }

    #[test]
    fn span_limit_rejects_wide_days() {
        let mut occ = DayOccupancy::new();
        occ.add(360, 720);
        // Adding 19:00-21:00 spans 06:00-21:00 = 15h > 14h.
        assert!(!occ.can_fit(1140, 1260, 840));
    }

    #[test]
    fn midnight_wrap_marks_both_ends() {
        let mut occ = DayOccupancy::new();
        occ.add(1320, 1740); // 22:00-05:00
        assert!(!occ.can_fit(240, 360, 840)); // 04:00 collides
        assert!(occ.span_minutes() > 0);
    }

    // ── repair ────────────────────────────────────────────────────────

    #[test]
    fn repair_prefers_existing_available_driver() {
        let shifts = vec![shift(0, 1, 360, 1080), shift(1, 2, 360, 1080)];
        let rules = RegimeRules::faena_minera();
        let oracle = ConflictOracle::build(&shifts, &rules);

        let mut roster = Roster::new(shifts.len());
        let d = roster.create_cyclic_driver(7, shifts[0].date);
        roster.assign(d, &shifts[0]);

        repair(&mut roster, &[1], &shifts, &oracle, 840, 7);
        assert_eq!(roster.driver_of(1), Some(d));
        assert_eq!(roster.drivers_used(), 1);
    }

    #[test]
    fn repair_creates_driver_when_cycle_blocks() {
        // Day 8 falls in the rest half of a cycle anchored on day 1.
        let shifts = vec![shift(0, 1, 360, 1080), shift(1, 8, 360, 1080)];
        let rules = RegimeRules::faena_minera();
        let oracle = ConflictOracle::build(&shifts, &rules);

        let mut roster = Roster::new(shifts.len());
        let d = roster.create_cyclic_driver(7, shifts[0].date);
        roster.assign(d, &shifts[0]);

        repair(&mut roster, &[1], &shifts, &oracle, 840, 7);
        let other = roster.driver_of(1).unwrap();
        assert_ne!(other, d);
        assert_eq!(
            roster.drivers[&other].cycle.unwrap().work_start,
            shifts[1].date
        );
    }

    #[test]
    fn repair_never_leaves_shifts_uncovered() {
        let shifts: Vec<Shift> = (0..6).map(|i| shift(i, 1, 360, 1080)).collect();
        let rules = RegimeRules::faena_minera();
        let oracle = ConflictOracle::build(&shifts, &rules);

        let mut roster = Roster::new(shifts.len());
        let released: Vec<ShiftId> = (0..6).collect();
        repair(&mut roster, &released, &shifts, &oracle, 840, 7);

        assert!(roster.is_complete());
        // All six overlap: six distinct drivers.
        assert_eq!(roster.drivers_used(), 6);
    }
}
