use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Paid,
    Failed,
}

impl PaymentStatus {
    /// Payout progression driven by the external payment process.
    pub fn can_advance_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Processing)
                | (PaymentStatus::Processing, PaymentStatus::Paid)
                | (PaymentStatus::Processing, PaymentStatus::Failed)
                | (PaymentStatus::Failed, PaymentStatus::Processing)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    #[default]
    BankTransfer,
    Cash,
    DigitalWallet,
    Check,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Commission {
    pub rate: u8,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EarningsPeriod {
    pub year: i32,
    pub month: u32,
    pub week: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsRecord {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub order_id: Uuid,
    pub order_number: String,
    pub base_amount: f64,
    pub commission: Commission,
    pub tip: f64,
    pub bonus: f64,
    pub deductions: f64,
    pub total_earned: f64,
    pub payment_status: PaymentStatus,
    pub payment_method: PayoutMethod,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
    pub period: EarningsPeriod,
    pub delivered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EarningsSummary {
    pub total_earned: f64,
    pub total_orders: u64,
    pub average_earning: f64,
    pub total_paid: f64,
    pub total_pending: f64,
    pub monthly_total: f64,
    pub monthly_orders: u64,
    pub today_total: f64,
    pub today_orders: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGranularity {
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodBucket {
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week: Option<u32>,
    pub total_earned: f64,
    pub total_orders: u64,
    pub average_earning: f64,
    pub total_paid: f64,
    pub total_pending: f64,
}

#[cfg(test)]
mod tests {
    use super::PaymentStatus;

    #[test]
    fn paid_records_are_final() {
        for next in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Failed,
        ] {
            assert!(!PaymentStatus::Paid.can_advance_to(next));
        }
    }

    #[test]
    fn pending_records_go_through_processing() {
        assert!(PaymentStatus::Pending.can_advance_to(PaymentStatus::Processing));
        assert!(!PaymentStatus::Pending.can_advance_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Processing.can_advance_to(PaymentStatus::Paid));
    }

    #[test]
    fn failed_payouts_can_be_retried() {
        assert!(PaymentStatus::Failed.can_advance_to(PaymentStatus::Processing));
        assert!(!PaymentStatus::Failed.can_advance_to(PaymentStatus::Paid));
    }
}
