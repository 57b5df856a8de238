use serde::Serialize;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use crate::models::{Client, PaymentPolicy, TimesheetEntry};

/// Hours, earnings and the paid share of those earnings, in base units (USD).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Amounts {
    pub hours: f64,
    pub earnings: f64,
    pub paid: f64,
}

impl Amounts {
    pub fn pending(&self) -> f64 {
        self.earnings - self.paid
    }
}

impl Add for Amounts {
    type Output = Amounts;

    fn add(self, other: Amounts) -> Amounts {
        Amounts {
            hours: self.hours + other.hours,
            earnings: self.earnings + other.earnings,
            paid: self.paid + other.paid,
        }
    }
}

impl AddAssign for Amounts {
    fn add_assign(&mut self, other: Amounts) {
        *self = *self + other;
    }
}

impl Sum for Amounts {
    fn sum<I: Iterator<Item = Amounts>>(iter: I) -> Amounts {
        iter.fold(Amounts::default(), Add::add)
    }
}

impl<'a> Sum<&'a Amounts> for Amounts {
    fn sum<I: Iterator<Item = &'a Amounts>>(iter: I) -> Amounts {
        iter.copied().sum()
    }
}

/// Flat policies charge the full amount for every entry with positive hours,
/// so two entries in one month bill the amount twice.
pub fn entry_earnings(policy: PaymentPolicy, amount: f64, hours: f64) -> f64 {
    if policy.is_flat() && hours > 0.0 {
        amount
    } else {
        hours * amount
    }
}

pub fn entry_amounts(entry: &TimesheetEntry, client: &Client) -> Amounts {
    let earnings = entry_earnings(client.payment_policy, client.payment_amount, entry.hours);
    Amounts {
        hours: entry.hours,
        earnings,
        paid: if entry.paid { earnings } else { 0.0 },
    }
}
