//! Search-bound estimation.
//!
//! Lower bounds on the driver headcount feed the exact-phase search range
//! and the infeasibility diagnostics. Two estimates are combined: the
//! sweep-line maximum of simultaneously running shifts (a hard coverage
//! floor) and hour-quotient bounds from the regime's monthly/weekly caps
//! or its N×N cycles.

use crate::regime::{RegimeKind, RegimeRules};
use crate::shift::Shift;

/// Maximum number of shifts running at any instant, across the whole
/// range. Any valid roster needs at least this many drivers on duty.
pub fn max_simultaneous(shifts: &[Shift]) -> usize {
    if shifts.is_empty() {
        return 0;
    }

    let base_date = shifts.iter().map(|s| s.date).min().expect("non-empty");
    let mut events: Vec<(i64, i32)> = Vec::with_capacity(shifts.len() * 2);
    for shift in shifts {
        let day_offset = (shift.date - base_date).num_days();
        let base = day_offset * 1440;
        events.push((base + shift.start_minutes as i64, 1));
        events.push((base + shift.end_minutes as i64, -1));
    }
    // Ends sort before starts at the same instant: half-open intervals.
    events.sort_unstable_by_key(|&(t, delta)| (t, delta));

    let mut current = 0i32;
    let mut max = 0i32;
    for (_, delta) in events {
        current += delta;
        max = max.max(current);
    }
    max as usize
}

/// Regime-aware lower bound on the driver count.
pub fn minimum_drivers(shifts: &[Shift], rules: &RegimeRules) -> usize {
    let simultaneous = max_simultaneous(shifts);
    if shifts.is_empty() {
        return 0;
    }

    if rules.kind == RegimeKind::FaenaMinera {
        // Half of every N×N pool is resting on any given day.
        return simultaneous * 2;
    }

    let total_hours: f64 = shifts.iter().map(|s| s.duration_hours).sum();
    let by_hours = if let Some(monthly) = rules.max_monthly {
        (total_hours / monthly.value()) as usize + 1
    } else if let Some(weekly) = rules.max_weekly {
        (total_hours / (weekly.value() * 4.3)) as usize + 1
    } else {
        (total_hours / 180.0) as usize + 1
    };

    by_hours.max(simultaneous)
}
