//! Pairwise shift-compatibility oracle.
//!
//! For every pair of shifts on the same or consecutive calendar days the
//! oracle precomputes whether one driver may hold both. Two relations are
//! kept, matching how the solver phases consume them:
//!
//! - `overlap`: same-day pairs whose half-open time intervals intersect.
//!   Symmetric and always disqualifying.
//! - `rest_violation`: pairs that break the regime's rest, transfer,
//!   working-day-span or group rules.
//!
//! Both relations are immutable once built and exposed as per-shift
//! sorted id vectors, so membership is a binary search and iteration is
//! O(|conflict set|).

use crate::regime::{RegimeRules, TRANSFER_MINUTES};
use crate::shift::{Shift, ShiftId};

/// Precomputed conflict relations over a shift set.
#[derive(Debug, Clone)]
pub struct ConflictOracle {
    overlap: Vec<Vec<ShiftId>>,
    rest: Vec<Vec<ShiftId>>,
}

impl ConflictOracle {
    /// Classifies every same-day and consecutive-day pair.
    ///
    /// Shifts must be sorted by date (expansion order), ids dense.
    pub fn build(shifts: &[Shift], rules: &RegimeRules) -> Self {
        let mut overlap = vec![Vec::new(); shifts.len()];
        let mut rest = vec![Vec::new(); shifts.len()];

        // Buckets of shift indices per date, in expansion (date) order.
        let mut days: Vec<(chrono::NaiveDate, Vec<usize>)> = Vec::new();
        for (idx, shift) in shifts.iter().enumerate() {
            match days.last_mut() {
                Some((date, bucket)) if *date == shift.date => bucket.push(idx),
                _ => days.push((shift.date, vec![idx])),
            }
        }

        for (day_idx, (date, bucket)) in days.iter().enumerate() {
            // Same-day pairs.
            for (i, &a) in bucket.iter().enumerate() {
                for &b in &bucket[i + 1..] {
                    classify_same_day(&shifts[a], &shifts[b], rules, &mut overlap, &mut rest);
                }
            }

            // Pairs with the next calendar day, if present.
            if let Some((next_date, next_bucket)) = days.get(day_idx + 1) {
                if (*next_date - *date).num_days() == 1 {
                    for &a in bucket {
                        for &b in next_bucket {
                            classify_consecutive(&shifts[a], &shifts[b], rules, &mut rest);
                        }
                    }
                }
            }
        }

        for set in overlap.iter_mut().chain(rest.iter_mut()) {
            set.sort_unstable();
        }

        Self { overlap, rest }
    }

    /// Same-day shifts whose intervals intersect `shift`.
    pub fn overlaps(&self, shift: ShiftId) -> &[ShiftId] {
        &self.overlap[shift as usize]
    }

    /// Shifts that would break rest/span/group rules together with `shift`.
    pub fn rest_violations(&self, shift: ShiftId) -> &[ShiftId] {
        &self.rest[shift as usize]
    }

    /// True when one driver may not hold both shifts.
    pub fn in_conflict(&self, a: ShiftId, b: ShiftId) -> bool {
        self.overlap[a as usize].binary_search(&b).is_ok()
            || self.rest[a as usize].binary_search(&b).is_ok()
    }

    /// True when `shift` conflicts with any shift already held.
    pub fn conflicts_with_any(&self, shift: ShiftId, held: &[ShiftId]) -> bool {
        held.iter().any(|&h| self.in_conflict(shift, h))
    }

    pub fn len(&self) -> usize {
        self.overlap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlap.is_empty()
    }
}

fn push_pair(sets: &mut [Vec<ShiftId>], a: &Shift, b: &Shift) {
    sets[a.id as usize].push(b.id);
    sets[b.id as usize].push(a.id);
}

fn classify_same_day(
    a: &Shift,
    b: &Shift,
    rules: &RegimeRules,
    overlap: &mut [Vec<ShiftId>],
    rest: &mut [Vec<ShiftId>],
) {
    // Half-open intervals; identical slots on different vehicles overlap.
    if a.start_minutes < b.end_minutes && b.start_minutes < a.end_minutes {
        push_pair(overlap, a, b);
        return;
    }

    // Geographic separation makes intra-day transfer infeasible.
    if a.group != b.group {
        push_pair(rest, a, b);
        return;
    }

    let (first, second) = if a.start_minutes <= b.start_minutes {
        (a, b)
    } else {
        (b, a)
    };
    let gap = second.start_minutes as i64 - first.end_minutes as i64;
    if gap < TRANSFER_MINUTES as i64 {
        push_pair(rest, a, b);
        return;
    }

    // Working-day span rule only binds the non-cycle regimes; the cycle
    // regimes get their span check from the daily occupancy bitmap.
    if !rules.kind.is_cyclic() {
        let span = a.end_minutes.max(b.end_minutes) - a.start_minutes.min(b.start_minutes);
        if span > rules.max_span_minutes() {
            push_pair(rest, a, b);
        }
    }
}

fn classify_consecutive(earlier: &Shift, later: &Shift, rules: &RegimeRules, rest: &mut [Vec<ShiftId>]) {
    // Signed gap between the earlier shift's end and the later shift's
    // start, in minutes across the day boundary. Negative when an
    // overnight shift runs into the next day's shift.
    let gap = 1440 + later.start_minutes as i64 - earlier.end_minutes as i64;
    if gap < rules.min_rest_minutes() as i64 {
        push_pair(rest, earlier, later);
    }
}
