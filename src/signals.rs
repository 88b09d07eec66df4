//! Model lifecycle events.
//!
//! Handlers emit an event after a product or order is saved or deleted;
//! every connected receiver runs synchronously before the handler returns.

use std::sync::Arc;

use crate::cache::ResponseCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Product,
    Order,
}

impl Model {
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Product => "product",
            Model::Order => "order",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEvent {
    PostSave { model: Model, created: bool },
    PostDelete { model: Model },
}

impl ModelEvent {
    pub fn model(&self) -> Model {
        match self {
            ModelEvent::PostSave { model, .. } | ModelEvent::PostDelete { model } => *model,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            ModelEvent::PostSave { created: true, .. } => "created",
            ModelEvent::PostSave { created: false, .. } => "updated",
            ModelEvent::PostDelete { .. } => "deleted",
        }
    }
}

pub trait SignalReceiver: Send + Sync {
    fn receive(&self, event: &ModelEvent);
}

impl<F> SignalReceiver for F
where
    F: Fn(&ModelEvent) + Send + Sync,
{
    fn receive(&self, event: &ModelEvent) {
        self(event)
    }
}

#[derive(Default, Clone)]
pub struct Signals {
    receivers: Vec<Arc<dyn SignalReceiver>>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, receiver: Arc<dyn SignalReceiver>) {
        self.receivers.push(receiver);
    }

    pub fn send(&self, event: ModelEvent) {
        tracing::debug!(?event, receivers = self.receivers.len(), "Dispatching model event");
        for receiver in &self.receivers {
            receiver.receive(&event);
        }
    }
}

/// Drops cached list pages showing the model that changed. Order pages
/// embed product names and prices, so product events clear them too.
pub struct CacheInvalidator {
    cache: Arc<ResponseCache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }
}

impl SignalReceiver for CacheInvalidator {
    fn receive(&self, event: &ModelEvent) {
        let patterns: &[&str] = match event.model() {
            Model::Product => &["*product_list*", "*order_list*"],
            Model::Order => &["*order_list*"],
        };
        for pattern in patterns {
            let removed = self.cache.delete_pattern(pattern);
            tracing::info!(
                model = event.model().as_str(),
                action = event.action(),
                pattern,
                removed,
                "Cleared cached list pages"
            );
        }
    }
}
