//! Large Neighborhood Search with adaptive operator selection.
//!
//! Runs over a feasible greedy roster for the N×N regimes with one goal:
//! fewer drivers. Each iteration destroys part of the current solution
//! with a roulette-selected operator, repairs it, and accepts the result
//! under simulated annealing. The repair step creates drivers freely, so
//! candidates are complete by construction; a candidate that still leaves
//! a shift uncovered is rejected outright rather than cost-penalized.

mod operators;
mod repair;

pub use operators::{Operator, OperatorStats};
pub use repair::{repair, DayOccupancy};

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::conflict::ConflictOracle;
use crate::regime::RegimeRules;
use crate::roster::{DriverId, Roster};
use crate::shift::{Shift, ShiftId};

/// Tuning knobs of the annealer. Defaults carry the production values.
#[derive(Debug, Clone)]
pub struct LnsConfig {
    pub max_time: Duration,
    pub temperature_init: f64,
    pub cooling_rate: f64,
    /// Run one consolidation (drop-driver against current) every this
    /// many iterations.
    pub consolidate_every: u64,
    /// Early stop after this many iterations without a new best.
    pub stall_limit: u64,
    /// Hard iteration ceiling; tests pin this for determinism.
    pub max_iterations: Option<u64>,
    /// Consecutive dates released by the window operator.
    pub window_size: usize,
}

impl Default for LnsConfig {
    fn default() -> Self {
        Self {
            max_time: Duration::from_secs(600),
            temperature_init: 100.0,
            cooling_rate: 0.95,
            consolidate_every: 50,
            stall_limit: 500,
            max_iterations: None,
            window_size: 3,
        }
    }
}

/// The destroy–repair annealer.
pub struct LnsOptimizer<'a> {
    shifts: &'a [Shift],
    oracle: &'a ConflictOracle,
    config: LnsConfig,
    cycle_n: u32,
    max_span_minutes: u32,
    rng: StdRng,
    stats: OperatorStats,
}

impl<'a> LnsOptimizer<'a> {
    pub fn new(
        shifts: &'a [Shift],
        oracle: &'a ConflictOracle,
        rules: &'a RegimeRules,
        cycle_n: u32,
        config: LnsConfig,
        seed: u64,
    ) -> Self {
        Self {
            shifts,
            oracle,
            config,
            cycle_n,
            max_span_minutes: rules.max_daily_minutes(),
            rng: StdRng::seed_from_u64(seed),
            stats: OperatorStats::default(),
        }
    }

    /// Improves a complete roster; returns the best one seen. The
    /// initial roster is returned unchanged when it is already partial.
    pub fn optimize(&mut self, initial: Roster, deadline: Option<Instant>) -> Roster {
        if !initial.is_complete() {
            return initial;
        }

        let started = Instant::now();
        let local_deadline = started + self.config.max_time;
        let deadline = match deadline {
            Some(global) => global.min(local_deadline),
            None => local_deadline,
        };

        let mut current = initial;
        let mut best = current.clone();
        let mut best_cost = best.cost(self.shifts);
        let mut temperature = self.config.temperature_init;
        let mut iteration: u64 = 0;
        let mut stalled: u64 = 0;

        info!(
            "lns: starting from {} drivers, T={temperature}",
            current.drivers_used()
        );

        while Instant::now() < deadline {
            if let Some(cap) = self.config.max_iterations {
                if iteration >= cap {
                    break;
                }
            }
            iteration += 1;

            let operator = self.stats.select(&mut self.rng);
            self.stats.record_attempt(operator);

            let mut candidate = current.clone();
            self.destroy_and_repair(&mut candidate, operator);

            if !candidate.is_complete() {
                continue;
            }

            let current_cost = current.cost(self.shifts);
            let candidate_cost = candidate.cost(self.shifts);
            let delta = candidate_cost as f64 - current_cost as f64;

            let accept = if delta < 0.0 {
                self.stats.record_improvement(operator);
                true
            } else {
                self.rng.gen::<f64>() < (-delta / temperature).exp()
            };

            if accept {
                self.stats.record_accept(operator);
                current = candidate;

                let cost = current.cost(self.shifts);
                if cost < best_cost {
                    best = current.clone();
                    best_cost = cost;
                    stalled = 0;
                    debug!(
                        "lns: iteration {iteration}: {} drivers (via {operator:?})",
                        best.drivers_used()
                    );
                } else {
                    stalled += 1;
                }
            } else {
                stalled += 1;
            }

            temperature *= self.config.cooling_rate;

            if iteration % self.config.consolidate_every == 0 {
                let mut consolidated = current.clone();
                self.drop_driver(&mut consolidated);
                if consolidated.is_complete()
                    && consolidated.cost(self.shifts) < current.cost(self.shifts)
                {
                    debug!("lns: iteration {iteration}: consolidation accepted");
                    current = consolidated;
                }
            }

            if stalled > self.config.stall_limit {
                debug!("lns: early stop after {stalled} stale iterations");
                break;
            }
        }

        let final_cost = best.cost(self.shifts);
        if current.is_complete() && current.cost(self.shifts) < final_cost {
            best = current;
        }

        info!(
            "lns: finished after {iteration} iterations with {} drivers",
            best.drivers_used()
        );
        best
    }

    pub fn stats(&self) -> &OperatorStats {
        &self.stats
    }

    fn destroy_and_repair(&mut self, roster: &mut Roster, operator: Operator) {
        match operator {
            Operator::DropDriver => self.drop_driver(roster),
            Operator::DestroyWindow => self.destroy_window(roster),
            Operator::DestroyService => self.destroy_service(roster),
        }
    }

    /// Releases the driver with the lowest assigned minutes and repairs.
    fn drop_driver(&mut self, roster: &mut Roster) {
        let lightest: Option<DriverId> = roster
            .drivers
            .values()
            .filter(|d| !d.is_idle())
            .min_by_key(|d| {
                let minutes: u32 = d
                    .shift_ids
                    .iter()
                    .map(|&s| self.shifts[s as usize].duration_minutes())
                    .sum();
                (minutes, d.id)
            })
            .map(|d| d.id);

        let Some(driver_id) = lightest else {
            return;
        };
        let released = roster.remove_driver(driver_id);
        self.repair(roster, &released);
    }

    /// Releases all assignments inside a random window of consecutive
    /// dates and repairs.
    fn destroy_window(&mut self, roster: &mut Roster) {
        let mut dates: Vec<NaiveDate> = roster
            .assigned
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_some())
            .map(|(s, _)| self.shifts[s].date)
            .collect();
        dates.sort_unstable();
        dates.dedup();
        if dates.is_empty() {
            return;
        }

        let window = self.config.window_size.min(dates.len());
        let start = if dates.len() == window {
            0
        } else {
            self.rng.gen_range(0..=dates.len() - window)
        };
        let selected = &dates[start..start + window];

        let released: Vec<ShiftId> = (0..self.shifts.len() as u32)
            .filter(|&s| {
                roster.driver_of(s).is_some() && selected.contains(&self.shifts[s as usize].date)
            })
            .collect();
        for &s in &released {
            roster.unassign(s);
        }
        self.repair(roster, &released);
    }

    /// Releases one random service's assignments and repairs.
    fn destroy_service(&mut self, roster: &mut Roster) {
        let mut services: Vec<&str> = roster
            .assigned
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_some())
            .map(|(s, _)| self.shifts[s].service_id.as_str())
            .collect();
        services.sort_unstable();
        services.dedup();
        if services.is_empty() {
            return;
        }

        let target = services[self.rng.gen_range(0..services.len())].to_string();
        let released: Vec<ShiftId> = (0..self.shifts.len() as u32)
            .filter(|&s| {
                roster.driver_of(s).is_some() && self.shifts[s as usize].service_id == target
            })
            .collect();
        for &s in &released {
            roster.unassign(s);
        }
        self.repair(roster, &released);
    }

    fn repair(&mut self, roster: &mut Roster, released: &[ShiftId]) {
        repair(
            roster,
            released,
            self.shifts,
            self.oracle,
            self.max_span_minutes,
            self.cycle_n,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ClientParameters, Frequency, Service, ShiftTemplate, VehicleSpec};
    use crate::roster::Cycle;
    use crate::shift::expand_month;
    use crate::solver::greedy::{GreedyBuilder, GreedyMode};

    fn minera_catalog(vehicles: u32) -> Catalog {
        Catalog {
            client_name: "Minera".to_string(),
            regime_hint: "Faena Minera".to_string(),
            parameters: ClientParameters::default(),
            services: vec![Service {
                id: "M1".to_string(),
                name: "Faena".to_string(),
                service_type: "Faena Minera".to_string(),
                service_group: Some("Mina".to_string()),
                vehicles: VehicleSpec {
                    quantity: vehicles,
                    vehicle_type: Some("bus".to_string()),
                },
                frequency: Frequency {
                    days: vec![0, 1, 2, 3, 4, 5, 6],
                },
                shifts: vec![ShiftTemplate {
                    shift_number: 1,
                    start_time: "06:00".to_string(),
                    end_time: "18:00".to_string(),
                    duration_hours: 12.0,
                }],
            }],
        }
    }

    fn optimized(vehicles: u32, iterations: u64, seed: u64) -> (Vec<Shift>, Roster) {
        let catalog = minera_catalog(vehicles);
        let rules = RegimeRules::faena_minera();
        let shifts = expand_month(&catalog, 2025, 2).unwrap();
        let oracle = ConflictOracle::build(&shifts, &rules);
        let greedy = GreedyBuilder::new(
            &shifts,
            &oracle,
            &rules,
            GreedyMode::Cycle { n: 7 },
            2025,
            2,
            50,
            None,
        )
        .build();

        let config = LnsConfig {
            max_iterations: Some(iterations),
            max_time: Duration::from_secs(3600),
            ..LnsConfig::default()
        };
        let mut optimizer = LnsOptimizer::new(&shifts, &oracle, &rules, 7, config, seed);
        let roster = optimizer.optimize(greedy, None);
        (shifts, roster)
    }

    #[test]
    fn keeps_full_coverage() {
        let (_, roster) = optimized(2, 150, 42);
        assert!(roster.is_complete());
    }

    #[test]
    fn never_worse_than_greedy() {
        let catalog = minera_catalog(2);
        let rules = RegimeRules::faena_minera();
        let shifts = expand_month(&catalog, 2025, 2).unwrap();
        let oracle = ConflictOracle::build(&shifts, &rules);
        let greedy = GreedyBuilder::new(
            &shifts,
            &oracle,
            &rules,
            GreedyMode::Cycle { n: 7 },
            2025,
            2,
            50,
            None,
        )
        .build();
        let greedy_cost = greedy.cost(&shifts);

        let config = LnsConfig {
            max_iterations: Some(100),
            max_time: Duration::from_secs(3600),
            ..LnsConfig::default()
        };
        let mut optimizer = LnsOptimizer::new(&shifts, &oracle, &rules, 7, config, 1);
        let roster = optimizer.optimize(greedy, None);

        assert!(roster.cost(&shifts) <= greedy_cost);
    }

    #[test]
    fn cycle_invariant_survives_search() {
        let (shifts, roster) = optimized(2, 150, 7);
        for driver in roster.drivers.values() {
            let cycle: Cycle = driver.cycle.expect("cyclic driver");
            for &s in &driver.shift_ids {
                assert!(
                    cycle.works_on(shifts[s as usize].date),
                    "driver {} assigned outside its cycle",
                    driver.id
                );
            }
        }
    }

    #[test]
    fn no_conflicting_pair_survives_search() {
        let catalog = minera_catalog(2);
        let rules = RegimeRules::faena_minera();
        let shifts = expand_month(&catalog, 2025, 2).unwrap();
        let oracle = ConflictOracle::build(&shifts, &rules);
        let (_, roster) = optimized(2, 150, 3);

        for driver in roster.drivers.values() {
            for (i, &a) in driver.shift_ids.iter().enumerate() {
                for &b in &driver.shift_ids[i + 1..] {
                    assert!(!oracle.in_conflict(a, b));
                }
            }
        }
    }

    #[test]
    fn same_seed_same_result() {
        let (shifts_a, a) = optimized(2, 120, 99);
        let (_, b) = optimized(2, 120, 99);
        assert_eq!(a.drivers_used(), b.drivers_used());
        assert_eq!(a.cost(&shifts_a), b.cost(&shifts_a));
        assert_eq!(a.assigned, b.assigned);
    }

    #[test]
    fn partial_input_is_returned_untouched() {
        let catalog = minera_catalog(1);
        let rules = RegimeRules::faena_minera();
        let shifts = expand_month(&catalog, 2025, 2).unwrap();
        let oracle = ConflictOracle::build(&shifts, &rules);

        let partial = Roster::new(shifts.len());
        let mut optimizer =
            LnsOptimizer::new(&shifts, &oracle, &rules, 7, LnsConfig::default(), 0);
        let out = optimizer.optimize(partial, None);
        assert_eq!(out.assigned_count(), 0);
    }
}
