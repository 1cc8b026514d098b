//! # Guidance Engine
//!
//! Ties the components of one navigation together:
//! - `NavigationSession` - state owned by this engine alone
//! - `PositionUpdateProcessor` - per-fix pipeline
//! - `RecalculationCoordinator` - one recalculation at a time
//! - `GuidanceEventSink` - host side effects
//!
//! Fixes are handled one at a time in arrival order. [`GuidanceEngine::run`]
//! is the single consumer of a command channel and keeps processing fixes
//! while a recalculation is being fetched.

mod runner;

pub use runner::NavigationCommand;

use std::sync::Arc;

use log::{debug, info};

use crate::clock::ClockSource;
use crate::error::Result;
use crate::processor::{FixOutcome, PositionUpdateProcessor};
use crate::recalc::{RecalcOutcome, RecalcTicket, RecalculationCoordinator, RouteProvider};
use crate::route::RouteModel;
use crate::session::{NavigationSession, NavigationState};
use crate::sink::{GuidanceEventSink, dispatch_update};
use crate::{GeoPoint, GpsFix, GuidanceConfig};

/// One navigation with its collaborators.
pub struct GuidanceEngine {
    session: NavigationSession,
    processor: PositionUpdateProcessor,
    coordinator: RecalculationCoordinator,
    provider: Arc<dyn RouteProvider>,
    sink: Box<dyn GuidanceEventSink>,
    clock: Arc<dyn ClockSource>,
    /// Clock time of the last failed recalculation while still off route.
    last_recalc_failure: Option<u64>,
}

impl GuidanceEngine {
    /// Create an engine with an idle session.
    pub fn new(
        config: GuidanceConfig,
        provider: Arc<dyn RouteProvider>,
        sink: Box<dyn GuidanceEventSink>,
        clock: Arc<dyn ClockSource>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            session: NavigationSession::new(),
            coordinator: RecalculationCoordinator::new(config.routing_profile.clone()),
            processor: PositionUpdateProcessor::new(config),
            provider,
            sink,
            clock,
            last_recalc_failure: None,
        })
    }

    pub fn start(&mut self, route: RouteModel, destination: GeoPoint) -> Result<()> {
        self.session.start(route, destination)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.session.pause()
    }

    pub fn resume(&mut self) -> Result<()> {
        self.session.resume()
    }

    pub fn cancel(&mut self) {
        self.session.cancel();
        self.last_recalc_failure = None;
    }

    pub fn session(&self) -> &NavigationSession {
        &self.session
    }

    pub fn state(&self) -> NavigationState {
        self.session.state()
    }

    pub fn config(&self) -> &GuidanceConfig {
        self.processor.config()
    }

    /// Process one fix and forward the result to the sink.
    ///
    /// Returns a ticket when this fix should trigger a recalculation: a new
    /// deviation, or a deviation that outlived a failed attempt by the retry
    /// interval. The caller fetches with the ticket and hands the result to
    /// [`finish_recalculation`](Self::finish_recalculation).
    pub fn handle_fix(&mut self, fix: GpsFix) -> (FixOutcome, Option<RecalcTicket>) {
        let outcome = self
            .processor
            .process(&mut self.session, fix, self.clock.as_ref());

        let FixOutcome::Updated(update) = &outcome else {
            return (outcome, None);
        };

        if let Some(route) = self.session.route() {
            dispatch_update(update, route, self.sink.as_mut());
        }

        if update.deviation_cleared {
            self.last_recalc_failure = None;
        }

        let now = self.clock.now();
        let retry_due = self.last_recalc_failure.is_some_and(|failed_at| {
            now.saturating_sub(failed_at) >= self.config().recalculation_retry_interval_ms
        });
        let wants_recalc =
            update.deviation_started || (update.deviation_active && retry_due);
        if !wants_recalc || self.session.state() != NavigationState::Active {
            return (outcome, None);
        }

        match self.coordinator.begin(&mut self.session, &fix) {
            Ok(ticket) => {
                self.last_recalc_failure = None;
                (outcome, Some(ticket))
            }
            Err(e) => {
                debug!("[Engine] Not recalculating: {}", e);
                (outcome, None)
            }
        }
    }

    /// Apply the provider's answer for `ticket` and notify the sink.
    pub fn finish_recalculation(
        &mut self,
        ticket: RecalcTicket,
        result: Result<RouteModel>,
    ) -> RecalcOutcome {
        let outcome = self.coordinator.complete(&mut self.session, ticket, result);
        match &outcome {
            RecalcOutcome::Applied { .. } => {
                self.last_recalc_failure = None;
                if let Some(route) = self.session.route() {
                    self.sink.on_route_replaced(route);
                }
            }
            RecalcOutcome::Failed(reason) => {
                self.last_recalc_failure = Some(self.clock.now());
                self.sink.on_recalculation_failed(reason);
            }
            RecalcOutcome::Discarded => {}
        }
        outcome
    }

    /// Recalculate from `fix` right away, waiting for the provider.
    pub async fn recalculate_now(&mut self, fix: &GpsFix) -> Result<RecalcOutcome> {
        let ticket = self.coordinator.begin(&mut self.session, fix)?;
        let (ticket, result) =
            RecalculationCoordinator::fetch(Arc::clone(&self.provider), ticket).await;
        let outcome = self.finish_recalculation(ticket, result);
        info!("[Engine] Manual recalculation finished: {:?}", outcome);
        Ok(outcome)
    }

    pub(crate) fn provider(&self) -> Arc<dyn RouteProvider> {
        Arc::clone(&self.provider)
    }
}
