//! Exact assignment model on a constraint-programming solver.
//!
//! The assignment problem is encoded with 0/1 integer variables
//! `x[d][s]` ("driver slot d covers shift s") and purely linear
//! constraints, then minimized with a linear SAT-UNSAT search. The
//! adapter runs a descending search on the slot count: starting one
//! below the heuristic seed, each attempt either proves the count
//! feasible (and the search continues downward) or fails, in which case
//! the last feasible count is the answer.
//!
//! The conflict oracle already encodes overlap, rest, transfer, span and
//! group rules as pairwise exclusions, so the model mostly restates the
//! oracle per driver slot; only the interurbano continuous-driving rule
//! needs extra pairs of its own, and the N×N regimes get their hybrid
//! cycle encoding (fixed offsets for most slots, a choose-one pattern
//! variable for the rest) without which the search has no structural
//! hint that a rest pattern exists.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use log::{debug, info};
use pumpkin_solver::constraints as cp;
use pumpkin_solver::optimisation::linear_sat_unsat::LinearSatUnsat;
use pumpkin_solver::optimisation::OptimisationDirection;
use pumpkin_solver::results::{OptimisationResult, ProblemSolution};
use pumpkin_solver::termination::TimeBudget;
use pumpkin_solver::variables::TransformableVariable;
use pumpkin_solver::Solver;

use crate::conflict::ConflictOracle;
use crate::regime::{RegimeKind, RegimeRules};
use crate::roster::summary::SolverStatus;
use crate::roster::Roster;
use crate::shift::Shift;

/// Exact-phase tuning. Defaults carry the production strategy: 60 s per
/// attempt, at most 15 attempts, accept after three feasible-not-optimal
/// results, exact refinement off for the cycle regimes.
#[derive(Debug, Clone)]
pub struct ExactConfig {
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    /// Stop descending after this many consecutive attempts that were
    /// feasible but not proven optimal.
    pub accept_after_feasible: u32,
    /// Whether the exact phase also runs for N×N regimes.
    pub enabled_for_cycles: bool,
    /// Share of slots pre-bound to fixed cycles in the hybrid encoding.
    pub hybrid_fixed_share: f64,
}

impl Default for ExactConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(60),
            max_attempts: 15,
            accept_after_feasible: 3,
            enabled_for_cycles: false,
            hybrid_fixed_share: 0.6,
        }
    }
}

/// Candidate cycle lengths offered to flexible hybrid slots, in the
/// model's variable order.
const FLEX_CYCLES: [u32; 4] = [7, 8, 10, 14];

/// One attempt's verdict.
enum Attempt {
    /// Proven optimal assignment.
    Optimal(SlotSolution),
    /// Valid assignment without an optimality proof.
    Feasible(SlotSolution),
    /// No assignment exists for this slot count.
    Infeasible,
    /// The attempt's time budget ran out undecided.
    Undecided,
}

/// Extracted slot assignment plus each slot's resolved cycle.
struct SlotSolution {
    /// Shift index → slot index.
    shift_to_slot: Vec<u32>,
    /// Resolved (cycle length, offset) per slot: the pre-bound cycle of
    /// a fixed hybrid slot, or the pattern the solver chose for a
    /// flexible one. `None` for idle flexible slots and for non-cycle
    /// regimes.
    slot_cycles: Vec<Option<(u32, u32)>>,
}

/// Pre-assigned or solver-chosen cycle of one hybrid slot.
#[derive(Debug, Clone, Copy)]
struct HybridSlot {
    fixed: bool,
    cycle: u32,
    offset: u32,
}

pub struct ExactSolver<'a> {
    shifts: &'a [Shift],
    oracle: &'a ConflictOracle,
    rules: &'a RegimeRules,
    config: ExactConfig,
}

impl<'a> ExactSolver<'a> {
    pub fn new(
        shifts: &'a [Shift],
        oracle: &'a ConflictOracle,
        rules: &'a RegimeRules,
        config: ExactConfig,
    ) -> Self {
        Self {
            shifts,
            oracle,
            rules,
            config,
        }
    }

    /// Descending search below a heuristic seed of `seed_drivers`.
    /// Returns the best roster found, if any attempt succeeded.
    pub fn refine_descending(
        &self,
        seed_drivers: usize,
        estimated_min: usize,
        deadline: Instant,
    ) -> Option<(Roster, SolverStatus)> {
        if seed_drivers <= 1 {
            return None;
        }
        let floor = estimated_min.max(seed_drivers / 2).max(1);

        let mut best: Option<(SlotSolution, SolverStatus)> = None;
        let mut feasible_streak = 0u32;
        let mut attempts = 0u32;

        for slots in (floor..seed_drivers).rev() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("exact: global budget exhausted");
                break;
            }
            attempts += 1;
            if attempts > self.config.max_attempts {
                break;
            }

            let budget = self.attempt_budget(slots, estimated_min).min(remaining);
            debug!("exact: trying {slots} slots with {budget:?} budget");

            match self.attempt(slots, budget) {
                Attempt::Optimal(solution) => {
                    info!("exact: {slots} slots optimal");
                    best = Some((solution, SolverStatus::Optimal));
                    break;
                }
                Attempt::Feasible(solution) => {
                    info!("exact: {slots} slots feasible");
                    best = Some((solution, SolverStatus::Feasible));
                    feasible_streak += 1;
                    if feasible_streak >= self.config.accept_after_feasible {
                        break;
                    }
                }
                Attempt::Infeasible => {
                    debug!("exact: {slots} slots infeasible, stopping");
                    break;
                }
                Attempt::Undecided => {
                    debug!("exact: {slots} slots undecided, stopping");
                    break;
                }
            }
        }

        best.map(|(solution, status)| (self.to_roster(&solution), status))
    }

    /// Ascending fallback when no heuristic seed exists: try increasing
    /// slot counts until one fits.
    pub fn solve_ascending(
        &self,
        start: usize,
        max_attempts: u32,
        deadline: Instant,
    ) -> Option<(Roster, SolverStatus)> {
        for slots in (start.max(1)..).take(max_attempts as usize) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let budget = self.config.attempt_timeout.min(remaining);
            debug!("exact: ascending attempt with {slots} slots");

            match self.attempt(slots, budget) {
                Attempt::Optimal(s) => return Some((self.to_roster(&s), SolverStatus::Optimal)),
                Attempt::Feasible(s) => return Some((self.to_roster(&s), SolverStatus::Feasible)),
                Attempt::Infeasible | Attempt::Undecided => continue,
            }
        }
        None
    }

    /// Adaptive per-attempt budget: far from the estimated minimum the
    /// attempt should fail fast; near it, it deserves time.
    fn attempt_budget(&self, slots: usize, estimated_min: usize) -> Duration {
        if self.rules.kind != RegimeKind::FaenaMinera {
            return self.config.attempt_timeout;
        }
        let reference = estimated_min.max(1) as f64;
        let distance = (slots as f64 - estimated_min as f64).abs() / reference;
        if distance > 0.5 {
            Duration::from_secs(10)
        } else if distance > 0.2 {
            Duration::from_secs(20)
        } else {
            Duration::from_secs(45)
        }
    }

    /// Builds and minimizes the model for a fixed slot count.
    fn attempt(&self, num_slots: usize, budget: Duration) -> Attempt {
        let shifts = self.shifts;
        let n = shifts.len();

        let mut solver = Solver::default();
        let tag = solver.new_constraint_tag();

        let x: Vec<Vec<_>> = (0..num_slots)
            .map(|_| (0..n).map(|_| solver.new_bounded_integer(0, 1)).collect())
            .collect();

        // Coverage: every shift on exactly one slot.
        for s in 0..n {
            let terms: Vec<_> = (0..num_slots).map(|d| x[d][s].scaled(1)).collect();
            let _ = solver.add_constraint(cp::equals(terms, 1, tag)).post();
        }

        // Oracle pairs: overlap and rest/transfer/span/group exclusions.
        for slot in &x {
            for s1 in 0..n as u32 {
                for set in [self.oracle.overlaps(s1), self.oracle.rest_violations(s1)] {
                    for &s2 in set.iter().filter(|&&s2| s2 > s1) {
                        let terms =
                            vec![slot[s1 as usize].scaled(1), slot[s2 as usize].scaled(1)];
                        let _ = solver
                            .add_constraint(cp::less_than_or_equals(terms, 1, tag))
                            .post();
                    }
                }
            }
        }

        // Hour caps.
        if let Some(max_weekly) = self.rules.max_weekly_minutes() {
            let mut weeks: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
            for (s, shift) in shifts.iter().enumerate() {
                weeks.entry(shift.week_num).or_default().push(s);
            }
            for slot in &x {
                for members in weeks.values() {
                    let terms: Vec<_> = members
                        .iter()
                        .map(|&s| slot[s].scaled(shifts[s].duration_minutes() as i32))
                        .collect();
                    let _ = solver
                        .add_constraint(cp::less_than_or_equals(terms, max_weekly as i32, tag))
                        .post();
                }
            }
        }
        if let Some(max_monthly) = self.rules.max_monthly_minutes() {
            for slot in &x {
                let terms: Vec<_> = (0..n)
                    .map(|s| slot[s].scaled(shifts[s].duration_minutes() as i32))
                    .collect();
                let _ = solver
                    .add_constraint(cp::less_than_or_equals(terms, max_monthly as i32, tag))
                    .post();
            }
        }

        // Dates present in the range, with their shift indices.
        let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for (s, shift) in shifts.iter().enumerate() {
            by_date.entry(shift.date).or_default().push(s);
        }
        let dates: Vec<NaiveDate> = by_date.keys().copied().collect();

        let plans = if self.rules.kind.is_cyclic() {
            hybrid_slots(num_slots, self.config.hybrid_fixed_share)
        } else {
            Vec::new()
        };
        // Pattern variable handles per flexible slot, kept so the chosen
        // cycle can be read back out of the solution; empty for fixed
        // slots and non-cycle regimes.
        let mut flex_patterns: Vec<Vec<_>> = (0..num_slots).map(|_| Vec::new()).collect();

        if self.rules.kind.is_cyclic() {
            // Hybrid N×N encoding: most slots get a deterministic
            // (cycle, offset) with rest days pinned to zero; the rest
            // carry one choose-one pattern variable per cycle length.
            for (d, (slot, plan)) in x.iter().zip(&plans).enumerate() {
                if plan.fixed {
                    for (day_idx, date) in dates.iter().enumerate() {
                        let position = (day_idx as u32 + plan.offset) % (2 * plan.cycle);
                        if position >= plan.cycle {
                            for &s in &by_date[date] {
                                let _ = solver
                                    .add_constraint(cp::equals(vec![slot[s].scaled(1)], 0, tag))
                                    .post();
                            }
                        }
                    }
                    continue;
                }

                // Flexible slot: works[date] ≥ x, any_work ≥ works, and
                // the chosen pattern pins its rest days.
                let any_work = solver.new_bounded_integer(0, 1);
                for date in &dates {
                    let w = solver.new_bounded_integer(0, 1);
                    for &s in &by_date[date] {
                        let terms = vec![slot[s].scaled(1), w.scaled(-1)];
                        let _ = solver
                            .add_constraint(cp::less_than_or_equals(terms, 0, tag))
                            .post();
                    }
                    let terms = vec![w.scaled(1), any_work.scaled(-1)];
                    let _ = solver
                        .add_constraint(cp::less_than_or_equals(terms, 0, tag))
                        .post();
                }

                let mut pattern_vars = Vec::with_capacity(FLEX_CYCLES.len());
                for cycle in FLEX_CYCLES {
                    let pattern = solver.new_bounded_integer(0, 1);
                    for (day_idx, date) in dates.iter().enumerate() {
                        if (day_idx as u32) % (2 * cycle) >= cycle {
                            for &s in &by_date[date] {
                                let terms = vec![slot[s].scaled(1), pattern.scaled(1)];
                                let _ = solver
                                    .add_constraint(cp::less_than_or_equals(terms, 1, tag))
                                    .post();
                            }
                        }
                    }
                    pattern_vars.push(pattern);
                }

                // Exactly one pattern iff the slot works at all.
                let mut terms: Vec<_> = pattern_vars.iter().map(|p| p.scaled(1)).collect();
                terms.push(any_work.scaled(-1));
                let _ = solver.add_constraint(cp::equals(terms, 0, tag)).post();
                flex_patterns[d] = pattern_vars;
            }
        } else {
            // works[d, date] ≥ x[d, s]; sliding windows bound the streak.
            let window = self.rules.max_consecutive_days as usize + 1;
            for slot in &x {
                let works: Vec<_> = dates
                    .iter()
                    .map(|date| {
                        let w = solver.new_bounded_integer(0, 1);
                        for &s in &by_date[date] {
                            let terms = vec![slot[s].scaled(1), w.scaled(-1)];
                            let _ = solver
                                .add_constraint(cp::less_than_or_equals(terms, 0, tag))
                                .post();
                        }
                        w
                    })
                    .collect();

                if dates.len() >= window {
                    for window_vars in works.windows(window) {
                        let terms: Vec<_> = window_vars.iter().map(|w| w.scaled(1)).collect();
                        let _ = solver
                            .add_constraint(cp::less_than_or_equals(
                                terms,
                                self.rules.max_consecutive_days as i32,
                                tag,
                            ))
                            .post();
                    }
                }

                // Sunday quota.
                if let Some(min_free) = self.rules.min_free_sundays {
                    let sundays: Vec<NaiveDate> = dates
                        .iter()
                        .copied()
                        .filter(|d| chrono::Datelike::weekday(d) == chrono::Weekday::Sun)
                        .collect();
                    if sundays.len() as u32 > min_free {
                        let quota = sundays.len() as i32 - min_free as i32;
                        let ws_vars: Vec<_> = sundays
                            .iter()
                            .map(|date| {
                                let ws = solver.new_bounded_integer(0, 1);
                                for &s in &by_date[date] {
                                    let terms = vec![slot[s].scaled(1), ws.scaled(-1)];
                                    let _ = solver
                                        .add_constraint(cp::less_than_or_equals(terms, 0, tag))
                                        .post();
                                }
                                ws
                            })
                            .collect();
                        let terms: Vec<_> = ws_vars.iter().map(|w| w.scaled(1)).collect();
                        let _ = solver
                            .add_constraint(cp::less_than_or_equals(terms, quota, tag))
                            .post();
                    }
                }
            }

            // Interurbano: two same-day shifts with less than 2 h between
            // them may not exceed 5 h of combined driving on one slot.
            if self.rules.kind == RegimeKind::Interurbano {
                for members in by_date.values() {
                    for (i, &a) in members.iter().enumerate() {
                        for &b in &members[i + 1..] {
                            let (first, second) =
                                if shifts[a].start_minutes <= shifts[b].start_minutes {
                                    (&shifts[a], &shifts[b])
                                } else {
                                    (&shifts[b], &shifts[a])
                                };
                            let gap = second.start_minutes as i64 - first.end_minutes as i64;
                            if gap < 0 {
                                continue; // overlap pairs already excluded
                            }
                            let combined = first.duration_hours + second.duration_hours;
                            if gap < 120 && combined > 5.0 {
                                for slot in &x {
                                    let terms = vec![slot[a].scaled(1), slot[b].scaled(1)];
                                    let _ = solver
                                        .add_constraint(cp::less_than_or_equals(terms, 1, tag))
                                        .post();
                                }
                            }
                        }
                    }
                }
            }
        }

        // used[d] ≥ x[d, s]; the objective charges slots first, hours of
        // workload to break ties.
        let used: Vec<_> = x
            .iter()
            .map(|slot| {
                let u = solver.new_bounded_integer(0, 1);
                for s in 0..n {
                    let terms = vec![slot[s].scaled(1), u.scaled(-1)];
                    let _ = solver
                        .add_constraint(cp::less_than_or_equals(terms, 0, tag))
                        .post();
                }
                u
            })
            .collect();

        let total_hours: i32 = shifts
            .iter()
            .map(|s| s.duration_hours.round() as i32)
            .sum();
        let objective =
            solver.new_bounded_integer(0, num_slots as i32 * 1_000_000 + total_hours.max(1));
        let mut objective_terms = vec![objective.scaled(1)];
        for u in &used {
            objective_terms.push(u.scaled(-1_000_000));
        }
        for slot in &x {
            for (s, shift) in shifts.iter().enumerate() {
                objective_terms.push(slot[s].scaled(-(shift.duration_hours.round() as i32)));
            }
        }
        let _ = solver
            .add_constraint(cp::equals(objective_terms, 0, tag))
            .post();

        let mut brancher = solver.default_brancher();
        let mut termination = TimeBudget::starting_now(budget);

        fn noop_callback<B>(_: &Solver, _: pumpkin_solver::results::SolutionReference, _: &B) {}
        let result = solver.optimise(
            &mut brancher,
            &mut termination,
            LinearSatUnsat::new(OptimisationDirection::Minimise, objective, noop_callback),
        );

        let resolve = |value_x: &dyn Fn(usize, usize) -> i32,
                       value_pattern: &dyn Fn(usize, usize) -> i32|
         -> SlotSolution {
            let mut shift_to_slot = vec![0u32; n];
            for (s, entry) in shift_to_slot.iter_mut().enumerate() {
                for d in 0..num_slots {
                    if value_x(d, s) == 1 {
                        *entry = d as u32;
                        break;
                    }
                }
            }

            let slot_cycles = (0..num_slots)
                .map(|d| {
                    if let Some(plan) = plans.get(d) {
                        if plan.fixed {
                            return Some((plan.cycle, plan.offset));
                        }
                    }
                    if flex_patterns[d].is_empty() {
                        return None;
                    }
                    FLEX_CYCLES
                        .iter()
                        .enumerate()
                        .find(|&(i, _)| value_pattern(d, i) == 1)
                        .map(|(_, &cycle)| (cycle, 0))
                })
                .collect();

            SlotSolution {
                shift_to_slot,
                slot_cycles,
            }
        };

        match result {
            OptimisationResult::Optimal(solution) => Attempt::Optimal(resolve(
                &|d, s| solution.get_integer_value(x[d][s]),
                &|d, i| solution.get_integer_value(flex_patterns[d][i]),
            )),
            OptimisationResult::Satisfiable(solution) => Attempt::Feasible(resolve(
                &|d, s| solution.get_integer_value(x[d][s]),
                &|d, i| solution.get_integer_value(flex_patterns[d][i]),
            )),
            OptimisationResult::Unsatisfiable => Attempt::Infeasible,
            OptimisationResult::Unknown => Attempt::Undecided,
        }
    }

    /// Materializes an extracted slot assignment as a roster with dense
    /// driver ids in slot order. Each cyclic slot carries the cycle the
    /// model actually bound it to; the anchor is the range's first date
    /// shifted back by the slot's offset, matching the model's
    /// day-index encoding.
    fn to_roster(&self, solution: &SlotSolution) -> Roster {
        let mut roster = Roster::new(self.shifts.len());
        let mut slot_to_driver: BTreeMap<u32, crate::roster::DriverId> = BTreeMap::new();

        let mut slots_in_use: Vec<u32> = solution.shift_to_slot.to_vec();
        slots_in_use.sort_unstable();
        slots_in_use.dedup();

        let first_date = self.shifts.first().map(|s| s.date);
        for slot in slots_in_use {
            let resolved = solution
                .slot_cycles
                .get(slot as usize)
                .copied()
                .flatten();
            let id = match (resolved, first_date) {
                (Some((cycle_len, offset)), Some(date)) => {
                    let anchor = date - chrono::Duration::days(offset as i64);
                    roster.create_cyclic_driver(cycle_len, anchor)
                }
                _ => roster.create_driver(),
            };
            slot_to_driver.insert(slot, id);
        }

        for (s, &slot) in solution.shift_to_slot.iter().enumerate() {
            let driver_id = slot_to_driver[&slot];
            roster.assign(driver_id, &self.shifts[s]);
        }

        roster
    }
}

/// Deterministic 60/40 fixed/flexible split: fixed slots alternate the
/// candidate cycles and stagger their offsets so coverage never collapses
/// onto one phase.
fn hybrid_slots(num_slots: usize, fixed_share: f64) -> Vec<HybridSlot> {
    let cycles = [7u32, 14, 10, 8];
    let num_fixed = (num_slots as f64 * fixed_share) as usize;

    (0..num_slots)
        .map(|d| {
            if d < num_fixed {
                let cycle = cycles[d % cycles.len()];
                let per_cycle = num_fixed / cycles.len() + 1;
                let offset_step = (2 * cycle / per_cycle as u32).max(1);
                let offset = (d / cycles.len()) as u32 * offset_step % (2 * cycle);
                HybridSlot {
                    fixed: true,
                    cycle,
                    offset,
                }
            } else {
                HybridSlot {
                    fixed: false,
                    cycle: 0,
                    offset: 0,
                }
            }
        })
        .collect()
}
