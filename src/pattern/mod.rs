//! Work-pattern labeling for reporting.
//!
//! A driver's month is labeled by the lengths of its consecutive rest
//! runs: a 7×7 miner rests in blocks of exactly 7, a 6×1 urban driver in
//! blocks of 1, a 5×2 driver in blocks of 2. Anything unrecognized is
//! `Flexible`.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};

use crate::regime::RegimeKind;
use crate::shift::days_in_month;

/// Label for a schedule matching no recognized pattern.
pub const FLEXIBLE: &str = "Flexible";

/// Lengths of consecutive rest runs within the month, leading and
/// trailing runs included.
pub fn rest_runs(worked_days: &BTreeSet<u32>, days_in_month: u32) -> Vec<u32> {
    let mut runs = Vec::new();
    let mut current = 0u32;
    for day in 1..=days_in_month {
        if worked_days.contains(&day) {
            if current > 0 {
                runs.push(current);
                current = 0;
            }
        } else {
            current += 1;
        }
    }
    if current > 0 {
        runs.push(current);
    }
    runs
}

/// Labels a driver's worked dates for the month.
pub fn detect(kind: RegimeKind, dates: &BTreeSet<NaiveDate>, year: i32, month: u32) -> String {
    let worked_days: BTreeSet<u32> = dates
        .iter()
        .filter(|d| d.year() == year && d.month() == month)
        .map(|d| d.day())
        .collect();

    if worked_days.is_empty() {
        return FLEXIBLE.to_string();
    }

    let num_days = days_in_month(year, month);
    let runs = rest_runs(&worked_days, num_days);
    if runs.is_empty() {
        return FLEXIBLE.to_string();
    }

    if kind.is_cyclic() {
        detect_cyclic(&runs, num_days)
    } else {
        detect_regular(&runs, num_days)
    }
}

/// N×N candidates, largest first: the pattern matches when at least as
/// many exact-length rest runs appear as complete cycles fit the month.
fn detect_cyclic(runs: &[u32], num_days: u32) -> String {
    for n in [14u32, 10, 8, 7] {
        let expected = num_days / (2 * n);
        if expected == 0 {
            continue;
        }
        let actual = runs.iter().filter(|&&r| r == n).count() as u32;
        if actual >= expected {
            return format!("{n}x{n}");
        }
    }
    FLEXIBLE.to_string()
}

fn detect_regular(runs: &[u32], num_days: u32) -> String {
    let weeks = num_days / 7;
    let ones = runs.iter().filter(|&&r| r == 1).count() as u32;
    let twos = runs.iter().filter(|&&r| r == 2).count() as u32;
    let only = |len: u32| runs.iter().all(|&r| r == len);

    if only(1) && ones >= weeks {
        return "6x1".to_string();
    }
    if only(2) && twos >= weeks {
        return "5x2".to_string();
    }
    if ones > 0 && twos > 0 && ones + twos >= weeks {
        return "Combinado (6x1/5x2)".to_string();
    }
    FLEXIBLE.to_string()
}
