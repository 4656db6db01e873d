//! Driver salary model.
//!
//! A driver's month is priced at the rate of the hardest vehicle class
//! they touched: one shift on a taxibus 4x4 re-rates the whole month at
//! +40%. A second multiplier stacks for drivers spread across several
//! services. The resulting objective is not monotonic in hours: adding
//! one shift on a harder vehicle can raise every already-worked hour's
//! price.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::shift::VehicleCategory;

/// Base hourly rate, in payroll units.
pub const BASE_HOURLY_RATE: f64 = 10_000.0;

/// Cost breakdown reported per driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostDetails {
    pub base_cost: f64,
    pub vehicle_adjusted_cost: f64,
    pub driver_multiplier: f64,
    pub service_multiplier: f64,
    pub service_count: u32,
}

impl CostDetails {
    pub fn zero() -> Self {
        Self {
            base_cost: 0.0,
            vehicle_adjusted_cost: 0.0,
            driver_multiplier: 1.0,
            service_multiplier: 1.0,
            service_count: 0,
        }
    }

    pub fn total(&self) -> f64 {
        self.base_cost * self.driver_multiplier * self.service_multiplier
    }
}

/// Monthly multiplier: 1 + the maximum surcharge among touched classes.
pub fn driver_multiplier(categories: &BTreeSet<VehicleCategory>) -> f64 {
    let max_recargo = categories
        .iter()
        .map(|c| c.recargo())
        .fold(0.0_f64, f64::max);
    1.0 + max_recargo
}

/// 1 + 20% per distinct service beyond the first.
pub fn service_multiplier(service_count: usize) -> f64 {
    1.0 + 0.20 * service_count.saturating_sub(1) as f64
}

/// Prices one driver's month.
pub fn compute(
    total_hours: f64,
    categories: &BTreeSet<VehicleCategory>,
    service_count: usize,
) -> CostDetails {
    if total_hours <= 0.0 {
        return CostDetails::zero();
    }

    let base_cost = total_hours * BASE_HOURLY_RATE;
    let driver_mult = driver_multiplier(categories);

    CostDetails {
        base_cost,
        vehicle_adjusted_cost: base_cost * driver_mult,
        driver_multiplier: driver_mult,
        service_multiplier: service_multiplier(service_count),
        service_count: service_count as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats(list: &[VehicleCategory]) -> BTreeSet<VehicleCategory> {
        list.iter().copied().collect()
    }

    #[test]
    fn hardest_vehicle_prices_the_month() {
        // 29 minibus shifts plus 1 taxibus 4x4 shift: everything at +40%.
        let categories = cats(&[VehicleCategory::Minibus, VehicleCategory::Taxibus4x4]);
        assert_eq!(driver_multiplier(&categories), 1.4);

        let details = compute(160.0, &categories, 1);
        assert_eq!(details.base_cost, 1_600_000.0);
        assert_eq!(details.vehicle_adjusted_cost, 2_240_000.0);
        assert_eq!(details.total(), 2_240_000.0);
    }

    #[test]
    fn service_multiplier_stacks() {
        let categories = cats(&[VehicleCategory::Bus]);
        let details = compute(100.0, &categories, 3);
        assert_eq!(details.service_multiplier, 1.4);
        // 100h × 10000 × 1.25 × 1.4
        assert!((details.total() - 1_750_000.0).abs() < 1e-6);
    }

    #[test]
    fn single_service_has_no_stack() {
        assert_eq!(service_multiplier(1), 1.0);
        assert_eq!(service_multiplier(0), 1.0);
        assert_eq!(service_multiplier(2), 1.2);
    }

    #[test]
    fn zero_hours_zero_cost() {
        let details = compute(0.0, &cats(&[VehicleCategory::Bus]), 2);
        assert_eq!(details, CostDetails::zero());
        assert_eq!(details.total(), 0.0);
    }

    #[test]
    fn no_categories_means_base_rate() {
        let details = compute(10.0, &BTreeSet::new(), 1);
        assert_eq!(details.driver_multiplier, 1.0);
        assert_eq!(details.total(), 100_000.0);
    }
}
