//! Solver orchestration.
//!
//! A [`Planner`] owns one validated catalog plus the regime rules the
//! catalog's hint selects, and runs the phase pipeline per request:
//! expand → conflict oracle → greedy → (LNS for cycle regimes) → exact
//! refinement → solution assembly. Phases run strictly one at a time,
//! each owning its working roster; the global wall-clock budget is
//! checked cooperatively at phase boundaries and inside the LNS loop.

pub mod annual;
pub mod estimate;
pub mod exact;
pub mod greedy;
pub mod lns;


use std::time::{Duration, Instant};

use log::{info, warn};

use crate::catalog::{Catalog, CatalogError, RunSpec};
use crate::conflict::ConflictOracle;
use crate::regime::RegimeRules;
use crate::roster::summary::{build_monthly_solution, RosterSolution, SolveStatus, SolverStatus};
use crate::roster::Roster;
use crate::shift::{self, Shift};

use exact::{ExactConfig, ExactSolver};
use greedy::{GreedyBuilder, GreedyMode};
use lns::{LnsConfig, LnsOptimizer};

/// Run-wide tuning. Defaults carry the observed production values.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Global wall-clock budget for one monthly optimization.
    pub max_time: Duration,
    /// Cycle length N used by the constructive phase for N×N regimes.
    pub cycle_length: u32,
    /// PRNG seed; a fixed seed makes the LNS phase reproducible.
    pub seed: u64,
    /// New drivers the greedy phase may open per day.
    pub max_new_drivers_per_day: usize,
    /// Optional hard ceiling on the driver pool.
    pub max_drivers: Option<usize>,
    pub lns: LnsConfig,
    pub exact: ExactConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_time: Duration::from_secs(600),
            cycle_length: 7,
            seed: 0,
            max_new_drivers_per_day: 50,
            max_drivers: None,
            lns: LnsConfig::default(),
            exact: ExactConfig::default(),
        }
    }
}

/// One month's raw result before boundary assembly.
pub(crate) struct MonthRun {
    pub(crate) shifts: Vec<Shift>,
    pub(crate) roster: Roster,
    pub(crate) status: SolverStatus,
    pub(crate) budget_exhausted: bool,
}

/// The library entry point: one catalog, any number of runs.
pub struct Planner {
    catalog: Catalog,
    rules: RegimeRules,
    config: SolverConfig,
}

impl Planner {
    /// Validates the catalog and fixes the regime for the run.
    pub fn new(catalog: Catalog) -> Result<Self, CatalogError> {
        Self::with_config(catalog, SolverConfig::default())
    }

    pub fn with_config(catalog: Catalog, config: SolverConfig) -> Result<Self, CatalogError> {
        catalog.validate()?;
        let rules = RegimeRules::for_kind(catalog.regime()?);
        Ok(Self {
            catalog,
            rules,
            config,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn rules(&self) -> &RegimeRules {
        &self.rules
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Produces one solution for the requested period. Catalog problems
    /// are fatal errors; infeasibility is a structured outcome inside
    /// the returned solution.
    pub fn solve(&self, run: RunSpec) -> Result<RosterSolution, CatalogError> {
        match run.month {
            Some(month) => self.optimize_month(run.year, month),
            None => annual::optimize_year(self, run.year),
        }
    }

    pub(crate) fn optimize_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<RosterSolution, CatalogError> {
        let run = self.solve_month_roster(year, month)?;
        let mut solution = build_monthly_solution(
            &run.shifts,
            &run.roster,
            &self.rules,
            year,
            month,
            run.status,
        );
        solution.budget_exhausted = run.budget_exhausted;

        if solution.status == SolveStatus::Failed {
            let simultaneous = estimate::max_simultaneous(&run.shifts);
            let mut reason = solution.reason.take().unwrap_or_default();
            reason.push_str(&format!(
                "; peak simultaneous demand is {simultaneous} shifts"
            ));
            if let Some(cap) = self.config.max_drivers {
                reason.push_str(&format!(" against a driver cap of {cap}"));
            }
            solution.reason = Some(reason);
        }

        Ok(solution)
    }

    /// The phase pipeline for one month.
    pub(crate) fn solve_month_roster(
        &self,
        year: i32,
        month: u32,
    ) -> Result<MonthRun, CatalogError> {
        let shifts = shift::expand_month(&self.catalog, year, month)?;
        info!(
            "{}-{month:02}: {} shifts to assign under {}",
            year,
            shifts.len(),
            self.rules.name
        );

        if shifts.is_empty() {
            return Ok(MonthRun {
                roster: Roster::new(0),
                shifts,
                status: SolverStatus::Heuristic,
                budget_exhausted: false,
            });
        }

        let deadline = Instant::now() + self.config.max_time;
        let oracle = ConflictOracle::build(&shifts, &self.rules);

        let run = if self.rules.kind.is_cyclic() {
            self.solve_cyclic(shifts, &oracle, year, month, deadline)
        } else {
            self.solve_flexible(shifts, &oracle, year, month, deadline)
        };
        Ok(run)
    }

    /// Faena Minera: greedy on a fixed cycle, LNS to shed drivers, exact
    /// verification only when enabled.
    fn solve_cyclic(
        &self,
        shifts: Vec<Shift>,
        oracle: &ConflictOracle,
        year: i32,
        month: u32,
        deadline: Instant,
    ) -> MonthRun {
        let n = self.config.cycle_length;
        let mut roster = GreedyBuilder::new(
            &shifts,
            oracle,
            &self.rules,
            GreedyMode::Cycle { n },
            year,
            month,
            self.config.max_new_drivers_per_day,
            self.config.max_drivers,
        )
        .build();
        info!(
            "greedy ({n}x{n}): {} drivers, coverage {:.1}%",
            roster.drivers_used(),
            roster.coverage() * 100.0
        );

        let mut status = SolverStatus::Heuristic;
        if roster.is_complete() {
            let mut optimizer = LnsOptimizer::new(
                &shifts,
                oracle,
                &self.rules,
                n,
                self.config.lns.clone(),
                self.config.seed,
            );
            roster = optimizer.optimize(roster, Some(deadline));

            if self.config.exact.enabled_for_cycles {
                let estimated = estimate::minimum_drivers(&shifts, &self.rules);
                let solver =
                    ExactSolver::new(&shifts, oracle, &self.rules, self.config.exact.clone());
                if let Some((refined, refined_status)) =
                    solver.refine_descending(roster.drivers_used(), estimated, deadline)
                {
                    if refined.is_complete() && refined.cost(&shifts) < roster.cost(&shifts) {
                        info!("exact refinement: {} drivers", refined.drivers_used());
                        roster = refined;
                        status = refined_status;
                    }
                }
            }
        } else {
            warn!("greedy left coverage at {:.1}%", roster.coverage() * 100.0);
        }

        MonthRun {
            budget_exhausted: Instant::now() >= deadline,
            shifts,
            roster,
            status,
        }
    }

    /// Non-cycle regimes: greedy seed, then exact descending refinement;
    /// if greedy cannot cover, the exact solver gets a chance from the
    /// estimated minimum upward.
    fn solve_flexible(
        &self,
        shifts: Vec<Shift>,
        oracle: &ConflictOracle,
        year: i32,
        month: u32,
        deadline: Instant,
    ) -> MonthRun {
        let greedy = GreedyBuilder::new(
            &shifts,
            oracle,
            &self.rules,
            GreedyMode::Flexible,
            year,
            month,
            self.config.max_new_drivers_per_day,
            self.config.max_drivers,
        )
        .build();
        info!(
            "greedy (flexible): {} drivers, coverage {:.1}%",
            greedy.drivers_used(),
            greedy.coverage() * 100.0
        );

        let estimated = estimate::minimum_drivers(&shifts, &self.rules);
        let solver = ExactSolver::new(&shifts, oracle, &self.rules, self.config.exact.clone());

        if greedy.is_complete() {
            let seed = greedy.drivers_used();
            match solver.refine_descending(seed, estimated, deadline) {
                Some((refined, status))
                    if refined.is_complete() && refined.drivers_used() < seed =>
                {
                    info!("exact: improved to {} drivers", refined.drivers_used());
                    MonthRun {
                        budget_exhausted: Instant::now() >= deadline,
                        shifts,
                        roster: refined,
                        status,
                    }
                }
                _ => MonthRun {
                    budget_exhausted: Instant::now() >= deadline,
                    shifts,
                    roster: greedy,
                    status: SolverStatus::Heuristic,
                },
            }
        } else {
            // The exact fallback honors the driver cap: slot counts past
            // the cap are not attempted.
            let attempts = match self.config.max_drivers {
                Some(cap) if cap < estimated => 0,
                Some(cap) => 10.min((cap - estimated + 1) as u32),
                None => 10,
            };
            match solver.solve_ascending(estimated, attempts, deadline) {
                Some((roster, status)) if roster.is_complete() => MonthRun {
                    budget_exhausted: Instant::now() >= deadline,
                    shifts,
                    roster,
                    status,
                },
                _ => {
                    warn!("no phase reached full coverage");
                    MonthRun {
                        budget_exhausted: Instant::now() >= deadline,
                        shifts,
                        roster: greedy,
                        status: SolverStatus::Heuristic,
                    }
                }
            }
        }
    }
}
