//! Destroy operators and adaptive selection.

use rand::rngs::StdRng;
use rand::Rng;

/// The three destroy moves. Repair is common to all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Release the lowest-loaded driver entirely.
    DropDriver,
    /// Release every assignment inside a random window of consecutive
    /// dates.
    DestroyWindow,
    /// Release every assignment of one random service.
    DestroyService,
}

const OPERATORS: [Operator; 3] = [
    Operator::DropDriver,
    Operator::DestroyWindow,
    Operator::DestroyService,
];

/// Base roulette weights before adaptation.
fn base_weight(op: Operator) -> f64 {
    match op {
        Operator::DropDriver => 0.3,
        Operator::DestroyWindow => 0.4,
        Operator::DestroyService => 0.3,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpCounters {
    pub attempts: u64,
    pub accepts: u64,
    pub improvements: u64,
}

/// Raw attempt/accept/improvement counters per operator; weights are
/// recomputed on demand rather than kept normalized.
#[derive(Debug, Clone, Default)]
pub struct OperatorStats {
    counters: [OpCounters; 3],
}

impl OperatorStats {
    fn index(op: Operator) -> usize {
        match op {
            Operator::DropDriver => 0,
            Operator::DestroyWindow => 1,
            Operator::DestroyService => 2,
        }
    }

    pub fn counters(&self, op: Operator) -> OpCounters {
        self.counters[Self::index(op)]
    }

    pub fn record_attempt(&mut self, op: Operator) {
        self.counters[Self::index(op)].attempts += 1;
    }

    pub fn record_accept(&mut self, op: Operator) {
        self.counters[Self::index(op)].accepts += 1;
    }

    pub fn record_improvement(&mut self, op: Operator) {
        self.counters[Self::index(op)].improvements += 1;
    }

    /// Current roulette weight: from 10 attempts on the base weight
    /// scales by (1 + success rate). This is the "adaptive" in ALNS.
    pub fn weight(&self, op: Operator) -> f64 {
        let counters = self.counters(op);
        let mut weight = base_weight(op);
        if counters.attempts >= 10 {
            let success = counters.improvements as f64 / counters.attempts as f64;
            weight *= 1.0 + success;
        }
        weight
    }

    /// Weighted roulette selection.
    pub fn select(&self, rng: &mut StdRng) -> Operator {
        let total: f64 = OPERATORS.iter().map(|&op| self.weight(op)).sum();
        let mut roll = rng.gen::<f64>() * total;
        for &op in &OPERATORS {
            roll -= self.weight(op);
            if roll <= 0.0 {
                return op;
            }
        }
        Operator::DropDriver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn weights_start_at_base() {
        let stats = OperatorStats::default();
        assert_eq!(stats.weight(Operator::DropDriver), 0.3);
        assert_eq!(stats.weight(Operator::DestroyWindow), 0.4);
        assert_eq!(stats.weight(Operator::DestroyService), 0.3);
    }

    #[test]
    fn successful_operator_gains_weight() {
        let mut stats = OperatorStats::default();
        for _ in 0..20 {
            stats.record_attempt(Operator::DropDriver);
            stats.record_improvement(Operator::DropDriver);
        }
        // 100% success: weight doubles.
        assert!((stats.weight(Operator::DropDriver) - 0.6).abs() < 1e-12);
        // Others untouched.
        assert_eq!(stats.weight(Operator::DestroyWindow), 0.4);
    }

    #[test]
    fn no_adaptation_before_ten_attempts() {
        let mut stats = OperatorStats::default();
        for _ in 0..9 {
            stats.record_attempt(Operator::DestroyService);
            stats.record_improvement(Operator::DestroyService);
        }
        assert_eq!(stats.weight(Operator::DestroyService), 0.3);
    }

    #[test]
    fn adaptation_kicks_in_at_exactly_ten_attempts() {
        let mut stats = OperatorStats::default();
        for _ in 0..10 {
            stats.record_attempt(Operator::DropDriver);
            stats.record_improvement(Operator::DropDriver);
        }
        // 10 attempts, 100% success: base weight doubles.
        assert!((stats.weight(Operator::DropDriver) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn selection_is_deterministic_under_a_seed() {
        let stats = OperatorStats::default();
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(stats.select(&mut a), stats.select(&mut b));
        }
    }

    #[test]
    fn selection_covers_all_operators() {
        let stats = OperatorStats::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = [false; 3];
        for _ in 0..200 {
            match stats.select(&mut rng) {
                Operator::DropDriver => seen[0] = true,
                Operator::DestroyWindow => seen[1] = true,
                Operator::DestroyService => seen[2] = true,
            }
        }
        assert!(seen.iter().all(|&s| s));
    }
}
