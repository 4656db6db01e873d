//! Chilean labor regimes and their constraint parameters.
//!
//! Each regime is a value holding the full parameter block the solver
//! phases consult: hour caps, rest floors, consecutive-day and Sunday
//! limits, working-day spans and the authorized special cycles. The four
//! rule sets mirror the articles of the Chilean labor code that govern
//! fleet drivers:
//!
//! - Interurbano (Art. 25): continuous-driving cap, 180 monthly hours.
//! - Urbano/Industrial: ordinary workday, 44 weekly hours.
//! - Interurbano Bisemanal (Art. 39): two-week cycles, 44 h average.
//! - Faena Minera (Art. 38): exceptional N×N cycles, no Sunday quota.

use qtty::{Hour, Quantity};

/// The regime families the planner distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegimeKind {
    Interurbano,
    UrbanoIndustrial,
    InterurbanoBisemanal,
    FaenaMinera,
}

impl RegimeKind {
    /// Maps a catalog regime hint onto a rule set. `Urbano`, `Industrial`
    /// and `Interno` share the ordinary-workday rules; `Minera` aliases
    /// `Faena Minera`.
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim() {
            "Interurbano" => Some(Self::Interurbano),
            "Industrial" | "Urbano" | "Interno" => Some(Self::UrbanoIndustrial),
            "Interurbano Bisemanal" => Some(Self::InterurbanoBisemanal),
            "Faena Minera" | "Minera" => Some(Self::FaenaMinera),
            _ => None,
        }
    }

    /// True for regimes whose drivers follow fixed N×N work/rest cycles.
    pub fn is_cyclic(self) -> bool {
        matches!(self, Self::FaenaMinera)
    }
}

/// The full constraint parameter block of one regime.
///
/// Hour-valued limits are typed quantities; shift clock arithmetic stays
/// in integer minutes, converting at the comparison site.
#[derive(Debug, Clone)]
pub struct RegimeRules {
    pub kind: RegimeKind,
    pub name: &'static str,
    /// Maximum continuous driving without a reset rest. `None` = no limit.
    pub max_continuous_driving: Option<Quantity<Hour>>,
    /// Rest that resets the continuous-driving counter.
    pub rest_to_reset_driving: Option<Quantity<Hour>>,
    /// Maximum worked hours on one calendar day.
    pub max_daily: Quantity<Hour>,
    pub max_weekly: Option<Quantity<Hour>>,
    pub max_monthly: Option<Quantity<Hour>>,
    /// Minimum rest between the end of one working day and the next.
    pub min_rest_between_shifts: Quantity<Hour>,
    pub max_consecutive_days: u32,
    /// Minimum free Sundays per month; `None` when cycles waive the quota.
    pub min_free_sundays: Option<u32>,
    /// Maximum span from first start to last end on one calendar day.
    pub max_working_day_span: Quantity<Hour>,
    /// Authorized (work_days, rest_days) cycles.
    pub special_cycles: &'static [(u32, u32)],
    pub allows_split_shift: bool,
}

/// Minimum transfer time between same-day shifts of the same group.
pub const TRANSFER_MINUTES: u32 = 60;

impl RegimeRules {
    pub fn for_kind(kind: RegimeKind) -> Self {
        match kind {
            RegimeKind::Interurbano => Self::interurbano_art25(),
            RegimeKind::UrbanoIndustrial => Self::urbano_industrial(),
            RegimeKind::InterurbanoBisemanal => Self::interurbano_bisemanal(),
            RegimeKind::FaenaMinera => Self::faena_minera(),
        }
    }

    /// Interurbano (Art. 25). Monthly driving hours govern; the weekly
    /// cap is intentionally absent (monthly 180 only).
    pub fn interurbano_art25() -> Self {
        Self {
            kind: RegimeKind::Interurbano,
            name: "Interurbano (Art. 25)",
            max_continuous_driving: Some(Quantity::new(5.0)),
            rest_to_reset_driving: Some(Quantity::new(2.0)),
            max_daily: Quantity::new(16.0),
            max_weekly: None,
            max_monthly: Some(Quantity::new(180.0)),
            min_rest_between_shifts: Quantity::new(8.0),
            max_consecutive_days: 6,
            min_free_sundays: Some(2),
            max_working_day_span: Quantity::new(16.0),
            special_cycles: &[(9, 5), (10, 4)],
            allows_split_shift: true,
        }
    }

    /// Urbano/Industrial ordinary workday.
    pub fn urbano_industrial() -> Self {
        Self {
            kind: RegimeKind::UrbanoIndustrial,
            name: "Urbano/Industrial",
            max_continuous_driving: None,
            rest_to_reset_driving: None,
            max_daily: Quantity::new(10.0),
            max_weekly: Some(Quantity::new(44.0)),
            max_monthly: None,
            min_rest_between_shifts: Quantity::new(10.0),
            max_consecutive_days: 6,
            min_free_sundays: Some(2),
            max_working_day_span: Quantity::new(12.0),
            special_cycles: &[],
            allows_split_shift: true,
        }
    }

    /// Interurbano Bisemanal (Art. 39).
    pub fn interurbano_bisemanal() -> Self {
        Self {
            kind: RegimeKind::InterurbanoBisemanal,
            name: "Interurbano Bisemanal (Art. 39)",
            max_continuous_driving: None,
            rest_to_reset_driving: None,
            max_daily: Quantity::new(14.0),
            max_weekly: Some(Quantity::new(44.0)),
            max_monthly: None,
            min_rest_between_shifts: Quantity::new(10.0),
            max_consecutive_days: 14,
            min_free_sundays: None,
            max_working_day_span: Quantity::new(14.0),
            special_cycles: &[(4, 3), (7, 7), (14, 14), (10, 5)],
            allows_split_shift: true,
        }
    }

    /// Faena Minera (Art. 38). N×N cycles imply weekly and Sunday
    /// compliance, so neither cap is carried.
    pub fn faena_minera() -> Self {
        Self {
            kind: RegimeKind::FaenaMinera,
            name: "Faena Minera (Art. 38)",
            max_continuous_driving: None,
            rest_to_reset_driving: None,
            max_daily: Quantity::new(14.0),
            max_weekly: None,
            max_monthly: None,
            min_rest_between_shifts: Quantity::new(10.0),
            max_consecutive_days: 14,
            min_free_sundays: None,
            max_working_day_span: Quantity::new(14.0),
            special_cycles: &[(7, 7), (8, 8), (10, 10), (14, 14)],
            allows_split_shift: true,
        }
    }

    pub fn max_daily_minutes(&self) -> u32 {
        to_minutes(self.max_daily)
    }

    pub fn max_span_minutes(&self) -> u32 {
        to_minutes(self.max_working_day_span)
    }

    pub fn min_rest_minutes(&self) -> u32 {
        to_minutes(self.min_rest_between_shifts)
    }

    pub fn max_weekly_minutes(&self) -> Option<u32> {
        self.max_weekly.map(to_minutes)
    }

    pub fn max_monthly_minutes(&self) -> Option<u32> {
        self.max_monthly.map(to_minutes)
    }

    /// Candidate cycle lengths N for N×N regimes, largest first.
    pub fn cycle_lengths(&self) -> Vec<u32> {
        let mut lengths: Vec<u32> = self
            .special_cycles
            .iter()
            .filter(|(work, rest)| work == rest)
            .map(|&(work, _)| work)
            .collect();
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        lengths
    }
}

fn to_minutes(q: Quantity<Hour>) -> u32 {
    (q.value() * 60.0).round() as u32
}
