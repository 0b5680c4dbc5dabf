//! Driver earnings: derivation from a delivered order, ledger adjustments,
//! and per-driver reporting.
//!
//! Amounts are computed with `Decimal` and stored as `f64` rounded to two
//! decimal places.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::prelude::*;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::earnings::{
    Commission, EarningsPeriod, EarningsRecord, EarningsSummary, PaymentStatus, PayoutMethod,
    PeriodBucket, PeriodGranularity,
};
use crate::models::notification::NotificationKind;
use crate::models::order::Order;
use crate::notify::NotificationSink;
use crate::observability::metrics::Metrics;
use crate::store::{EarningsLedger, Records};

/// Platform commission, in percent of the order total.
pub const COMMISSION_RATE: u8 = 20;

const DECIMAL_PLACES: u32 = 2;
const MAX_WEEK: u32 = 53;
const YEARS_IN_REPORT: i32 = 5;

/// Largest single amount (order total, tip, bonus, deduction) accepted.
pub const MAX_AMOUNT: f64 = 1_000_000_000.0;

/// Years a period report may be requested for.
pub const REPORT_YEARS: std::ops::RangeInclusive<i32> = 1970..=9999;

pub fn to_decimal(value: f64) -> Result<Decimal, AppError> {
    Decimal::from_f64(value)
        .ok_or_else(|| AppError::BadRequest(format!("amount {value} is not representable")))
}

fn checked_sum(a: Decimal, b: Decimal) -> Result<Decimal, AppError> {
    a.checked_add(b)
        .ok_or_else(|| AppError::BadRequest("amount overflows the earnings total".to_string()))
}

pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy)]
pub struct EarningsInput {
    pub order_total: f64,
    pub tip: f64,
    pub bonus: f64,
    pub deductions: f64,
    pub delivered_at: DateTime<Utc>,
}

impl EarningsInput {
    pub fn for_total(order_total: f64, delivered_at: DateTime<Utc>) -> Self {
        Self {
            order_total,
            tip: 0.0,
            bonus: 0.0,
            deductions: 0.0,
            delivered_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarningsBreakdown {
    pub base_amount: f64,
    pub commission: Commission,
    pub tip: f64,
    pub bonus: f64,
    pub deductions: f64,
    pub total_earned: f64,
    pub period: EarningsPeriod,
}

fn require_amount(value: f64, field: &str) -> Result<Decimal, AppError> {
    if !value.is_finite() || !(0.0..=MAX_AMOUNT).contains(&value) {
        return Err(AppError::BadRequest(format!(
            "{field} must be between 0 and {MAX_AMOUNT}, got {value}"
        )));
    }
    to_decimal(value)
}

fn total_of(base: Decimal, tip: Decimal, bonus: Decimal, deductions: Decimal) -> Result<Decimal, AppError> {
    let total = checked_sum(checked_sum(base, tip)?, bonus)?
        .checked_sub(deductions)
        .ok_or_else(|| AppError::BadRequest("deductions overflow the earnings total".to_string()))?;
    if total.is_sign_negative() && !total.is_zero() {
        return Err(AppError::NegativeEarnings(to_f64(total)));
    }
    Ok(total)
}

/// Splits an order total between driver (80%) and platform (20%).
pub fn derive(input: EarningsInput) -> Result<EarningsBreakdown, AppError> {
    let total = require_amount(input.order_total, "order total")?;
    let tip = require_amount(input.tip, "tip")?;
    let bonus = require_amount(input.bonus, "bonus")?;
    let deductions = require_amount(input.deductions, "deductions")?;

    let rate = Decimal::from(COMMISSION_RATE) / Decimal::ONE_HUNDRED;
    let commission = total * rate;
    let base = total - commission;
    let earned = total_of(base, tip, bonus, deductions)?;

    Ok(EarningsBreakdown {
        base_amount: to_f64(base),
        commission: Commission {
            rate: COMMISSION_RATE,
            amount: to_f64(commission),
        },
        tip: to_f64(tip),
        bonus: to_f64(bonus),
        deductions: to_f64(deductions),
        total_earned: to_f64(earned),
        period: period_of(input.delivered_at),
    })
}

/// Calendar bucket of a delivery. `week` counts Sunday-started weeks with
/// week 1 containing January 1st.
pub fn period_of(at: DateTime<Utc>) -> EarningsPeriod {
    let date = at.date_naive();
    let jan1_weekday = NaiveDate::from_ymd_opt(date.year(), 1, 1)
        .map(|jan1| jan1.weekday().num_days_from_sunday())
        .unwrap_or(0);
    let week = (date.ordinal0() + jan1_weekday + 1).div_ceil(7);

    EarningsPeriod {
        year: date.year(),
        month: date.month(),
        week: week.clamp(1, MAX_WEEK),
    }
}

/// Builds the one earnings record owed for a delivered order.
pub fn record_for(order: &Order, driver_id: Uuid, now: DateTime<Utc>) -> Result<EarningsRecord, AppError> {
    let delivered_at = order.delivered_at.unwrap_or(now);
    let breakdown = derive(EarningsInput::for_total(order.total_amount, delivered_at))?;

    Ok(EarningsRecord {
        id: Uuid::new_v4(),
        driver_id,
        order_id: order.id,
        order_number: order.order_number.clone(),
        base_amount: breakdown.base_amount,
        commission: breakdown.commission,
        tip: breakdown.tip,
        bonus: breakdown.bonus,
        deductions: breakdown.deductions,
        total_earned: breakdown.total_earned,
        payment_status: PaymentStatus::Pending,
        payment_method: PayoutMethod::default(),
        paid_at: None,
        transaction_id: None,
        period: breakdown.period,
        delivered_at,
        created_at: now,
    })
}

fn recompute_total(record: &mut EarningsRecord) -> Result<(), AppError> {
    let total = total_of(
        to_decimal(record.base_amount)?,
        to_decimal(record.tip)?,
        to_decimal(record.bonus)?,
        to_decimal(record.deductions)?,
    )?;
    record.total_earned = to_f64(total);
    Ok(())
}

#[derive(Default)]
struct Tally {
    total: Decimal,
    orders: u64,
    paid: Decimal,
    pending: Decimal,
}

impl Tally {
    fn add(&mut self, record: &EarningsRecord) -> Result<(), AppError> {
        let earned = to_decimal(record.total_earned)?;
        self.total = checked_sum(self.total, earned)?;
        self.orders += 1;
        match record.payment_status {
            PaymentStatus::Paid => self.paid = checked_sum(self.paid, earned)?,
            PaymentStatus::Pending => self.pending = checked_sum(self.pending, earned)?,
            PaymentStatus::Processing | PaymentStatus::Failed => {}
        }
        Ok(())
    }

    fn average(&self) -> f64 {
        if self.orders == 0 {
            return 0.0;
        }
        to_f64(self.total / Decimal::from(self.orders))
    }
}

pub fn summarize(records: &[EarningsRecord], now: DateTime<Utc>) -> Result<EarningsSummary, AppError> {
    let today = now.date_naive();
    let mut all = Tally::default();
    let mut month = Tally::default();
    let mut day = Tally::default();

    for record in records {
        all.add(record)?;
        if record.period.year == today.year() && record.period.month == today.month() {
            month.add(record)?;
        }
        if record.created_at.date_naive() == today {
            day.add(record)?;
        }
    }

    Ok(EarningsSummary {
        total_earned: to_f64(all.total),
        total_orders: all.orders,
        average_earning: all.average(),
        total_paid: to_f64(all.paid),
        total_pending: to_f64(all.pending),
        monthly_total: to_f64(month.total),
        monthly_orders: month.orders,
        today_total: to_f64(day.total),
        today_orders: day.orders,
    })
}

/// Groups records into zero-filled buckets: 53 weeks or 12 months of `year`,
/// or the five years ending with `year`.
pub fn bucket_by_period(
    records: &[EarningsRecord],
    granularity: PeriodGranularity,
    year: i32,
) -> Result<Vec<PeriodBucket>, AppError> {
    if !REPORT_YEARS.contains(&year) {
        return Err(AppError::BadRequest(format!(
            "year must be between {} and {}, got {year}",
            REPORT_YEARS.start(),
            REPORT_YEARS.end()
        )));
    }

    let mut tallies: HashMap<(i32, u32), Tally> = HashMap::new();
    for record in records {
        let key = match granularity {
            PeriodGranularity::Weekly if record.period.year == year => (year, record.period.week),
            PeriodGranularity::Monthly if record.period.year == year => (year, record.period.month),
            PeriodGranularity::Yearly => (record.period.year, 0),
            _ => continue,
        };
        tallies.entry(key).or_default().add(record)?;
    }

    let keys: Vec<(i32, u32)> = match granularity {
        PeriodGranularity::Weekly => (1..=MAX_WEEK).map(|week| (year, week)).collect(),
        PeriodGranularity::Monthly => (1..=12).map(|month| (year, month)).collect(),
        PeriodGranularity::Yearly => ((year - YEARS_IN_REPORT + 1)..=year).map(|y| (y, 0)).collect(),
    };

    let buckets = keys
        .into_iter()
        .map(|key| {
            let tally = tallies.remove(&key).unwrap_or_default();
            PeriodBucket {
                year: key.0,
                month: (granularity == PeriodGranularity::Monthly).then_some(key.1),
                week: (granularity == PeriodGranularity::Weekly).then_some(key.1),
                total_earned: to_f64(tally.total),
                total_orders: tally.orders,
                average_earning: tally.average(),
                total_paid: to_f64(tally.paid),
                total_pending: to_f64(tally.pending),
            }
        })
        .collect();
    Ok(buckets)
}

/// Post-delivery ledger operations: tips, bonuses, payouts, reports.
#[derive(Clone)]
pub struct EarningsService {
    records: Arc<Records>,
    ledger: Arc<EarningsLedger>,
    notifications: Arc<dyn NotificationSink>,
    metrics: Metrics,
}

impl EarningsService {
    pub fn new(
        records: Arc<Records>,
        ledger: Arc<EarningsLedger>,
        notifications: Arc<dyn NotificationSink>,
        metrics: Metrics,
    ) -> Self {
        Self {
            records,
            ledger,
            notifications,
            metrics,
        }
    }

    pub fn get(&self, record_id: Uuid) -> Result<EarningsRecord, AppError> {
        self.ledger.get(record_id)
    }

    pub fn for_order(&self, order_id: Uuid) -> Option<EarningsRecord> {
        self.ledger.for_order(order_id)
    }

    pub async fn add_tip(&self, record_id: Uuid, amount: f64) -> Result<EarningsRecord, AppError> {
        let record = self
            .adjust(record_id, amount, "tip", |record, amount| {
                record.tip = to_f64(checked_sum(to_decimal(record.tip)?, amount)?);
                Ok(())
            })
            .await?;

        self.notifications.notify(
            record.driver_id,
            NotificationKind::PaymentReceived,
            json!({
                "title": "Tip Received",
                "orderId": record.order_id,
                "orderNumber": record.order_number,
                "tipAmount": amount,
            }),
        );
        Ok(record)
    }

    pub async fn add_bonus(
        &self,
        record_id: Uuid,
        amount: f64,
        reason: Option<String>,
    ) -> Result<EarningsRecord, AppError> {
        let record = self
            .adjust(record_id, amount, "bonus", |record, amount| {
                record.bonus = to_f64(checked_sum(to_decimal(record.bonus)?, amount)?);
                Ok(())
            })
            .await?;

        self.notifications.notify(
            record.driver_id,
            NotificationKind::PaymentReceived,
            json!({
                "title": "Bonus Received",
                "orderId": record.order_id,
                "orderNumber": record.order_number,
                "bonusAmount": amount,
                "reason": reason.unwrap_or_else(|| "Performance bonus".to_string()),
            }),
        );
        Ok(record)
    }

    async fn adjust<F>(&self, record_id: Uuid, amount: f64, field: &str, apply: F) -> Result<EarningsRecord, AppError>
    where
        F: FnOnce(&mut EarningsRecord, Decimal) -> Result<(), AppError>,
    {
        if amount == 0.0 {
            return Err(AppError::BadRequest(format!(
                "{field} must be a positive amount, got {amount}"
            )));
        }
        let delta = require_amount(amount, field)?;

        let _guard = self.ledger.lock(record_id).await;
        let mut record = self.ledger.get(record_id)?;
        apply(&mut record, delta)?;
        recompute_total(&mut record)?;
        self.ledger.update(record.clone())?;

        info!(
            record_id = %record_id,
            driver_id = %record.driver_id,
            field,
            amount,
            total_earned = record.total_earned,
            "earnings adjusted"
        );
        Ok(record)
    }

    pub async fn set_payment_status(
        &self,
        record_id: Uuid,
        status: PaymentStatus,
    ) -> Result<EarningsRecord, AppError> {
        let _guard = self.ledger.lock(record_id).await;
        let mut record = self.ledger.get(record_id)?;

        if !record.payment_status.can_advance_to(status) {
            return Err(AppError::BadRequest(format!(
                "payment status cannot move from {:?} to {:?}",
                record.payment_status, status
            )));
        }

        record.payment_status = status;
        if status == PaymentStatus::Paid {
            record.paid_at = Some(Utc::now());
        }
        self.ledger.update(record.clone())?;

        info!(record_id = %record_id, status = ?status, "payment status updated");
        Ok(record)
    }

    /// Marks every still-pending record among `record_ids` as paid.
    pub async fn mark_paid(
        &self,
        record_ids: &[Uuid],
        method: PayoutMethod,
        transaction_id: Option<String>,
    ) -> Result<Vec<EarningsRecord>, AppError> {
        let mut seen = HashSet::new();
        let unique: Vec<Uuid> = record_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        let _guards = self.ledger.lock_many(&unique).await;

        let pending: Vec<EarningsRecord> = unique
            .iter()
            .filter_map(|id| self.ledger.get(*id).ok())
            .filter(|record| record.payment_status == PaymentStatus::Pending)
            .collect();

        if pending.is_empty() {
            return Err(AppError::BadRequest(
                "no pending earnings records found".to_string(),
            ));
        }

        let now = Utc::now();
        let mut paid = Vec::with_capacity(pending.len());
        for mut record in pending {
            record.payment_status = PaymentStatus::Paid;
            record.payment_method = method;
            record.paid_at = Some(now);
            record.transaction_id = transaction_id.clone();
            paid.push(record);
        }

        for record in &paid {
            self.ledger.update(record.clone())?;
        }

        for record in &paid {
            self.notifications.notify(
                record.driver_id,
                NotificationKind::PaymentReceived,
                json!({
                    "title": "Payment Processed",
                    "orderId": record.order_id,
                    "orderNumber": record.order_number,
                    "amount": record.total_earned,
                    "transactionId": record.transaction_id,
                }),
            );
        }

        let skipped = unique.len() - paid.len();
        if skipped > 0 {
            warn!(skipped, "payout skipped records that were missing or not pending");
        }
        info!(count = paid.len(), method = ?method, "earnings marked as paid");
        self.metrics.payouts_total.inc_by(paid.len() as u64);

        Ok(paid)
    }

    pub fn history(&self, driver_id: Uuid) -> Result<Vec<EarningsRecord>, AppError> {
        self.records.driver(driver_id)?;
        Ok(self.ledger.for_driver(driver_id))
    }

    pub fn summary(&self, driver_id: Uuid, now: DateTime<Utc>) -> Result<EarningsSummary, AppError> {
        let records = self.history(driver_id)?;
        summarize(&records, now)
    }

    pub fn by_period(
        &self,
        driver_id: Uuid,
        granularity: PeriodGranularity,
        year: i32,
    ) -> Result<Vec<PeriodBucket>, AppError> {
        let records = self.history(driver_id)?;
        bucket_by_period(&records, granularity, year)
    }
}
