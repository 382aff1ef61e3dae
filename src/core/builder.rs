use std::sync::Arc;

use crate::{
    core::{Config, GuardedScheduler, SchedulerTrigger},
    events::Bus,
    notify::{NotificationDispatcher, NotificationSink},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a [`GuardedScheduler`] wired to subscribers and a notifier.
///
/// The bus exists from [`new`](Self::new) on, so triggers and dispatchers
/// built before [`build`](Self::build) can publish to it.
pub struct SchedulerBuilder {
    cfg: Config,
    bus: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
    triggers: Vec<SchedulerTrigger>,
}

impl SchedulerBuilder {
    /// Creates a builder and its event bus.
    pub fn new(cfg: Config) -> Self {
        Self {
            bus: Bus::new(cfg.bus_capacity),
            cfg,
            subscribers: Vec::new(),
            triggers: Vec::new(),
        }
    }

    /// The bus every component of this scheduler publishes to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Creates a dispatcher on this builder's bus using the configured notification policy.
    pub fn notifier(&self, sink: Option<Arc<dyn NotificationSink>>) -> Arc<NotificationDispatcher> {
        Arc::new(NotificationDispatcher::new(
            sink,
            self.cfg.notify,
            self.bus.clone(),
        ))
    }

    /// Appends a trigger; triggers are evaluated in insertion order.
    pub fn trigger(mut self, trigger: SchedulerTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Builds the scheduler and starts the subscriber workers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> GuardedScheduler {
        let mut sched = GuardedScheduler::new(self.cfg.scheduler, self.bus.clone());
        if !self.subscribers.is_empty() {
            sched.attach_subscribers(SubscriberSet::new(self.subscribers, self.bus));
        }
        for t in self.triggers {
            sched.add_trigger(t);
        }
        sched
    }
}
