//! Amortization schedules and the month-addition rule.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use coffer_core::{TransactionId, UnixTime};

use crate::transaction::{NewTransaction, Transaction};

/// Billing duration of a purchase.
///
/// `Monthly` applies immediately (no split); the others spread the amount
/// over 2, 3, 6 or 12 monthly installments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingDuration {
    Monthly,
    TwoMonth,
    ThreeMonth,
    SixMonth,
    Yearly,
}

impl BillingDuration {
    /// Number of installments, or `None` when the amount applies at once.
    pub fn installments(self) -> Option<u32> {
        match self {
            BillingDuration::Monthly => None,
            BillingDuration::TwoMonth => Some(2),
            BillingDuration::ThreeMonth => Some(3),
            BillingDuration::SixMonth => Some(6),
            BillingDuration::Yearly => Some(12),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BillingDuration::Monthly => "monthly",
            BillingDuration::TwoMonth => "two_month",
            BillingDuration::ThreeMonth => "three_month",
            BillingDuration::SixMonth => "six_month",
            BillingDuration::Yearly => "yearly",
        }
    }
}

/// Add whole months to a unix timestamp.
///
/// Calendar rule: add the offset to the month field, carry one year when
/// the month exceeds 12, and clamp the day-of-month — day > 30 in a
/// 30-day month becomes 30, day > 28 in February becomes 28 (no
/// leap-year-aware clamping). Time of day is preserved.
pub fn add_months(ts: UnixTime, months: u32) -> UnixTime {
    let Some(dt) = DateTime::<Utc>::from_timestamp(ts, 0) else {
        return ts;
    };

    let mut year = dt.year();
    let mut month = dt.month() + months;
    let mut day = dt.day();

    if month > 12 {
        year += 1;
        month -= 12;
    }

    if day > 30 && matches!(month, 4 | 6 | 9 | 11) {
        day = 30;
    } else if day > 28 && month == 2 {
        day = 28;
    }

    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
        return ts;
    };

    date.and_hms_opt(dt.hour(), dt.minute(), dt.second())
        .map(|naive| naive.and_utc().timestamp())
        .unwrap_or(ts)
}

/// Fan a purchase out into its stored rows.
///
/// Immediate durations yield a single row with `applied_at` as given. A
/// multi-month duration yields the parent row with `applied_at = NULL`
/// plus N installments, installment `i` dated `add_months(applied_at, i)`
/// and carrying `price/N` and `takehome_amount/N`. Division is plain
/// floating division; drift on non-divisible amounts is accepted.
pub fn expand_installments(new: &NewTransaction) -> Vec<Transaction> {
    let parent_id = TransactionId::new();

    let mut rows = vec![Transaction {
        id: parent_id,
        user_id: new.user_id,
        source: new.source.clone(),
        external_id: new.external_id.clone(),
        product_id: new.product_id.clone(),
        price: new.price,
        tax_percentage: new.tax_percentage,
        commission_percentage: new.commission_percentage,
        takehome_percentage: Some(new.takehome_percentage),
        takehome_amount: new.takehome_amount,
        created_at: new.created_at,
        transacted_at: new.created_at,
        applied_at: Some(new.applied_at),
        currency: new.currency.clone(),
        amortized_transaction_id: None,
    }];

    if let Some(count) = new.duration.installments() {
        rows[0].applied_at = None;

        for i in 0..count {
            rows.push(Transaction {
                id: TransactionId::new(),
                user_id: new.user_id,
                source: format!("{}.amortized", new.source),
                external_id: format!("{}.{}", new.external_id, i),
                product_id: new.product_id.clone(),
                price: new.price / count as f64,
                tax_percentage: new.tax_percentage,
                commission_percentage: new.commission_percentage,
                takehome_percentage: Some(new.takehome_percentage),
                takehome_amount: new.takehome_amount / count as f64,
                created_at: new.created_at,
                transacted_at: new.created_at,
                applied_at: Some(add_months(new.applied_at, i)),
                currency: new.currency.clone(),
                amortized_transaction_id: Some(parent_id),
            });
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn ts(year: i32, month: u32, day: u32) -> UnixTime {
        Utc.with_ymd_and_hms(year, month, day, 9, 30, 0)
            .unwrap()
            .timestamp()
    }

    fn ymd(ts: UnixTime) -> (i32, u32, u32) {
        let dt = DateTime::<Utc>::from_timestamp(ts, 0).unwrap();
        (dt.year(), dt.month(), dt.day())
    }

    fn purchase(duration: BillingDuration) -> NewTransaction {
        NewTransaction {
            user_id: None,
            source: "stripe".to_string(),
            external_id: "txn-1".to_string(),
            product_id: Some("prod-1".to_string()),
            price: 300.0,
            tax_percentage: 20.0,
            commission_percentage: 10.0,
            takehome_percentage: 90.0,
            takehome_amount: 270.0,
            created_at: ts(2024, 5, 1),
            applied_at: ts(2024, 5, 1),
            duration,
            currency: Some("EUR".to_string()),
        }
    }

    #[test]
    fn january_31_plus_one_month_clamps_to_february_28() {
        assert_eq!(ymd(add_months(ts(2023, 1, 31), 1)), (2023, 2, 28));
    }

    #[test]
    fn january_30_plus_one_month_clamps_to_february_28() {
        assert_eq!(ymd(add_months(ts(2023, 1, 30), 1)), (2023, 2, 28));
    }

    #[test]
    fn december_31_plus_two_months_carries_year_and_clamps() {
        assert_eq!(ymd(add_months(ts(2023, 12, 31), 2)), (2024, 2, 28));
    }

    #[test]
    fn february_clamp_ignores_leap_years() {
        // 2024 is a leap year; the rule still clamps to 28.
        assert_eq!(ymd(add_months(ts(2024, 1, 31), 1)), (2024, 2, 28));
    }

    #[test]
    fn may_31_plus_one_month_clamps_to_june_30() {
        assert_eq!(ymd(add_months(ts(2023, 5, 31), 1)), (2023, 6, 30));
    }

    #[test]
    fn day_within_range_is_untouched() {
        assert_eq!(ymd(add_months(ts(2023, 1, 15), 3)), (2023, 4, 15));
    }

    #[test]
    fn zero_offset_is_identity() {
        let t = ts(2023, 7, 31);
        assert_eq!(add_months(t, 0), t);
    }

    #[test]
    fn time_of_day_is_preserved() {
        let shifted = add_months(ts(2023, 3, 10), 5);
        let dt = DateTime::<Utc>::from_timestamp(shifted, 0).unwrap();
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (9, 30, 0));
    }

    #[test]
    fn monthly_purchase_is_a_single_immediate_row() {
        let new = purchase(BillingDuration::Monthly);
        let rows = expand_installments(&new);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].applied_at, Some(new.applied_at));
        assert_eq!(rows[0].amortized_transaction_id, None);
    }

    #[test]
    fn three_month_purchase_splits_into_parent_and_three_installments() {
        let new = purchase(BillingDuration::ThreeMonth);
        let rows = expand_installments(&new);

        assert_eq!(rows.len(), 4);

        let parent = &rows[0];
        assert_eq!(parent.applied_at, None);
        assert_eq!(parent.price, 300.0);

        for (i, row) in rows[1..].iter().enumerate() {
            assert_eq!(row.price, 100.0);
            assert_eq!(row.takehome_amount, 90.0);
            assert_eq!(row.source, "stripe.amortized");
            assert_eq!(row.external_id, format!("txn-1.{i}"));
            assert_eq!(row.amortized_transaction_id, Some(parent.id));
            assert_eq!(
                row.applied_at,
                Some(add_months(new.applied_at, i as u32))
            );
        }
    }

    proptest! {
        /// Every split produces N+1 rows whose installment prices sum back
        /// to the parent price (up to float error), all referencing the
        /// parent row.
        #[test]
        fn installments_cover_the_parent_amount(
            price in 0.01f64..1_000_000.0,
            takehome in 0.01f64..1_000_000.0,
            duration in prop_oneof![
                Just(BillingDuration::TwoMonth),
                Just(BillingDuration::ThreeMonth),
                Just(BillingDuration::SixMonth),
                Just(BillingDuration::Yearly),
            ],
        ) {
            let mut new = purchase(duration);
            new.price = price;
            new.takehome_amount = takehome;

            let rows = expand_installments(&new);
            let count = duration.installments().unwrap() as usize;

            prop_assert_eq!(rows.len(), count + 1);

            let parent = &rows[0];
            let sum: f64 = rows[1..].iter().map(|r| r.price).sum();
            prop_assert!((sum - parent.price).abs() < 1e-6 * parent.price.max(1.0));

            for row in &rows[1..] {
                prop_assert_eq!(row.amortized_transaction_id, Some(parent.id));
                prop_assert!(row.applied_at.is_some());
            }
        }

        /// The schedule is monotone: each installment applies no earlier
        /// than the previous one.
        #[test]
        fn schedule_dates_are_monotone(day in 1u32..=28, month in 1u32..=12) {
            let start = Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0)
                .unwrap()
                .timestamp();

            let mut prev = start;
            for i in 0..12 {
                let next = add_months(start, i);
                prop_assert!(next >= prev);
                prev = next;
            }
        }
    }
}
