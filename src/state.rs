use std::sync::Arc;

use crate::config::Config;
use crate::engine::dispatch::DispatchEngine;
use crate::engine::earnings::EarningsService;
use crate::engine::lifecycle::OrderLifecycle;
use crate::notify::{BroadcastNotifier, NotificationInbox};
use crate::observability::metrics::Metrics;
use crate::store::{EarningsLedger, Records};

pub struct AppState {
    pub records: Arc<Records>,
    pub ledger: Arc<EarningsLedger>,
    pub dispatch: DispatchEngine,
    pub lifecycle: OrderLifecycle,
    pub earnings: EarningsService,
    pub events: BroadcastNotifier,
    pub inbox: Arc<NotificationInbox>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let records = Arc::new(Records::new(config.lock_retry_limit));
        let ledger = Arc::new(EarningsLedger::new());
        let events = BroadcastNotifier::new(config.event_buffer_size);
        let inbox = Arc::new(NotificationInbox::new());
        let metrics = Metrics::new();

        let lifecycle = OrderLifecycle::new(
            records.clone(),
            ledger.clone(),
            Arc::new(events.clone()),
            inbox.clone(),
            metrics.clone(),
        );
        let dispatch = DispatchEngine::new(
            records.clone(),
            lifecycle.clone(),
            Arc::new(events.clone()),
            inbox.clone(),
            metrics.clone(),
            config.default_max_queue_size,
        );
        let earnings = EarningsService::new(
            records.clone(),
            ledger.clone(),
            inbox.clone(),
            metrics.clone(),
        );

        Self {
            records,
            ledger,
            dispatch,
            lifecycle,
            earnings,
            events,
            inbox,
            metrics,
        }
    }
}
