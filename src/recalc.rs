//! Recalculation coordination.
//!
//! At most one recalculation is in flight per session. The attempt is split
//! in two phases around the network wait, so the session stays usable
//! (fixes keep flowing against the old route) and a cancelled session can
//! drop a late result instead of awaiting it:
//!
//! ```text
//! begin(session, fix) ──▶ RecalcTicket ──▶ provider.fetch_route(..).await
//!                                                   │
//! complete(session, ticket, result) ◀───────────────┘
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::error::{GuidanceError, Result};
use crate::route::RouteModel;
use crate::session::NavigationSession;
use crate::{GeoPoint, GpsFix};

/// Source of new routes, typically an HTTP routing service.
///
/// Implementations must be `Send + Sync` so the engine can hold them as
/// `Arc<dyn RouteProvider>` and fetch from a spawned future.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Fetch a route from `origin` to `destination`.
    ///
    /// Network and parsing failures should be reported as
    /// [`GuidanceError::RouteUnavailable`].
    async fn fetch_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        profile: &str,
    ) -> Result<RouteModel>;
}

/// Handle for one recalculation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RecalcTicket {
    generation: u64,
    /// Fix that triggered the attempt; the new route starts here.
    pub origin: GpsFix,
    pub destination: GeoPoint,
    pub profile: String,
}

impl RecalcTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// How a recalculation attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RecalcOutcome {
    /// The new route is active; progress restarted against it.
    Applied { progress_percent: u8 },
    /// The provider failed; the previous route and cursor are untouched.
    Failed(String),
    /// The session moved on (cancelled, arrived or superseded); result dropped.
    Discarded,
}

/// Serializes recalculation attempts for a session.
#[derive(Debug, Clone)]
pub struct RecalculationCoordinator {
    profile: String,
}

impl RecalculationCoordinator {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Start an attempt. Fails with [`GuidanceError::AlreadyInProgress`] while
    /// another attempt is pending; never queues a second one.
    pub fn begin(&self, session: &mut NavigationSession, fix: &GpsFix) -> Result<RecalcTicket> {
        if let Err(reason) = fix.check() {
            return Err(GuidanceError::invalid_input(format!(
                "recalculation origin rejected: {reason}"
            )));
        }
        let destination = session.destination().ok_or(GuidanceError::InvalidState {
            operation: "recalculate",
            state: session.state(),
        })?;

        let generation = session.begin_recalculation()?;
        info!(
            "[Recalc] Attempt {} from ({:.6}, {:.6})",
            generation, fix.point.latitude, fix.point.longitude
        );
        Ok(RecalcTicket {
            generation,
            origin: *fix,
            destination,
            profile: self.profile.clone(),
        })
    }

    /// Finish an attempt with the provider's result.
    pub fn complete(
        &self,
        session: &mut NavigationSession,
        ticket: RecalcTicket,
        result: Result<RouteModel>,
    ) -> RecalcOutcome {
        if !session.awaits(ticket.generation) {
            warn!(
                "[Recalc] Discarding result of attempt {} (session is {:?})",
                ticket.generation,
                session.state()
            );
            return RecalcOutcome::Discarded;
        }

        match result {
            Ok(route) => {
                // Fixes kept arriving during the fetch; measure from the latest.
                let position = session
                    .last_fix()
                    .map(|f| f.point)
                    .unwrap_or(ticket.origin.point);
                let distance = route.total_distance();
                if !session.apply_route(ticket.generation, route, &position) {
                    return RecalcOutcome::Discarded;
                }
                info!(
                    "[Recalc] Attempt {} applied: {:.0}m route, progress {}%",
                    ticket.generation,
                    distance,
                    session.progress_percent()
                );
                RecalcOutcome::Applied {
                    progress_percent: session.progress_percent(),
                }
            }
            Err(e) => {
                session.abort_recalculation(ticket.generation);
                warn!(
                    "[Recalc] Attempt {} failed, keeping previous route: {}",
                    ticket.generation, e
                );
                RecalcOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run a whole attempt against a provider, holding the session throughout.
    ///
    /// Suitable for serial callers; hosts that must keep processing fixes
    /// during the fetch use [`begin`](Self::begin) and [`complete`](Self::complete)
    /// directly, as [`GuidanceEngine`](crate::engine::GuidanceEngine) does.
    pub async fn request_recalculation(
        &self,
        session: &mut NavigationSession,
        fix: &GpsFix,
        provider: &dyn RouteProvider,
    ) -> Result<RecalcOutcome> {
        let ticket = self.begin(session, fix)?;
        let result = provider
            .fetch_route(ticket.origin.point, ticket.destination, &ticket.profile)
            .await;
        Ok(self.complete(session, ticket, result))
    }

    /// Owned fetch future for a ticket, independent of the session borrow.
    pub fn fetch(
        provider: Arc<dyn RouteProvider>,
        ticket: RecalcTicket,
    ) -> impl Future<Output = (RecalcTicket, Result<RouteModel>)> + Send + 'static {
        async move {
            let result = provider
                .fetch_route(ticket.origin.point, ticket.destination, &ticket.profile)
                .await;
            (ticket, result)
        }
    }
}
