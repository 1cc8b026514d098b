//! Tests for recalculation coordination

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use stridepath::geo_utils::haversine_distance;
use stridepath::{
    GeoPoint, GpsFix, GuidanceConfig, GuidanceError, ManeuverType, ManualClock,
    NavigationSession, NavigationState, PositionUpdateProcessor, RecalcOutcome,
    RecalculationCoordinator, RouteInstruction, RouteModel, RouteProvider,
};

const M_PER_DEG: f64 = 111_194.93;

// ============================================================================
// Test Helpers
// ============================================================================

fn route_through(points: &[GeoPoint]) -> RouteModel {
    let last = points.len() - 1;
    let instructions = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let distance = points
                .get(i + 1)
                .map(|next| haversine_distance(p, next))
                .unwrap_or(0.0);
            let maneuver = match i {
                0 => ManeuverType::Depart,
                i if i == last => ManeuverType::Arrive,
                _ => ManeuverType::Right,
            };
            RouteInstruction::new(i, *p, format!("step {i}"), maneuver, distance, distance / 1.4)
        })
        .collect();
    RouteModel::new(points.to_vec(), instructions, None).unwrap()
}

fn destination() -> GeoPoint {
    GeoPoint::new(0.0, 0.01)
}

fn planned_route() -> RouteModel {
    route_through(&[GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.005), destination()])
}

fn active_session() -> NavigationSession {
    let mut session = NavigationSession::new();
    session.start(planned_route(), destination()).unwrap();
    session
}

/// A fix 80 m north of the route.
fn off_route_fix(ts: u64) -> GpsFix {
    GpsFix::new(80.0 / M_PER_DEG, 0.003, ts).with_accuracy(15.0)
}

/// Provider that answers with a straight line from the origin, or always fails.
struct MockProvider {
    fail: bool,
    calls: AtomicUsize,
}

impl MockProvider {
    fn working() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RouteProvider for MockProvider {
    async fn fetch_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        profile: &str,
    ) -> Result<RouteModel, GuidanceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(profile, "foot-walking");
        if self.fail {
            return Err(GuidanceError::RouteUnavailable("HTTP 503".to_string()));
        }
        Ok(route_through(&[origin, destination]))
    }
}

fn coordinator() -> RecalculationCoordinator {
    RecalculationCoordinator::new(GuidanceConfig::default().routing_profile)
}

// ============================================================================
// request_recalculation
// ============================================================================

#[tokio::test]
async fn test_success_replaces_route_and_resets_cursor() {
    let mut session = active_session();
    let clock = ManualClock::new(0);
    let processor = PositionUpdateProcessor::new(GuidanceConfig::default());

    // Advance to step 1 and reach some tiers before leaving the route
    processor.process(&mut session, GpsFix::new(0.0, 0.0049, 0), &clock);
    assert_eq!(session.current_step_index(), 1);
    let fix = off_route_fix(10_000);
    clock.set(10_000);
    processor.process(&mut session, fix, &clock);
    assert!(session.deviation_active());

    let provider = MockProvider::working();
    let outcome = coordinator()
        .request_recalculation(&mut session, &fix, &provider)
        .await
        .unwrap();

    assert_eq!(outcome, RecalcOutcome::Applied { progress_percent: 0 });
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), NavigationState::Active);
    assert_eq!(session.current_step_index(), 0);
    assert!(!session.deviation_active());
    assert!(!session.tier_flags(1).any());
    assert_eq!(session.progress_percent(), 0);

    let route = session.route().unwrap();
    assert_eq!(route.len(), 2);
    assert_eq!(route.polyline()[0], fix.point);
}

#[tokio::test]
async fn test_failure_keeps_previous_route() {
    let mut session = active_session();
    let clock = ManualClock::new(0);
    let processor = PositionUpdateProcessor::new(GuidanceConfig::default());

    processor.process(&mut session, GpsFix::new(0.0, 0.0049, 0), &clock);
    let before = session.route().cloned().unwrap();
    let step_before = session.current_step_index();
    let progress_before = session.progress_percent();

    let provider = MockProvider::failing();
    let outcome = coordinator()
        .request_recalculation(&mut session, &off_route_fix(5_000), &provider)
        .await
        .unwrap();

    assert!(matches!(outcome, RecalcOutcome::Failed(ref reason) if reason.contains("503")));
    assert_eq!(session.state(), NavigationState::Active);
    assert_eq!(session.route(), Some(&before));
    assert_eq!(session.current_step_index(), step_before);
    assert_eq!(session.progress_percent(), progress_before);
}

#[tokio::test]
async fn test_requires_active_session() {
    let provider = MockProvider::working();

    let mut idle = NavigationSession::new();
    let err = coordinator()
        .request_recalculation(&mut idle, &off_route_fix(0), &provider)
        .await
        .unwrap_err();
    assert!(matches!(err, GuidanceError::InvalidState { .. }));

    let mut paused = active_session();
    paused.pause().unwrap();
    let err = coordinator()
        .request_recalculation(&mut paused, &off_route_fix(0), &provider)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GuidanceError::InvalidState {
            state: NavigationState::Paused,
            ..
        }
    ));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_origin_rejected() {
    let mut session = active_session();
    let provider = MockProvider::working();

    let err = coordinator()
        .request_recalculation(&mut session, &GpsFix::new(f64::NAN, 0.0, 0), &provider)
        .await
        .unwrap_err();
    assert!(matches!(err, GuidanceError::InvalidInput { .. }));
    assert_eq!(session.state(), NavigationState::Active);
}

// ============================================================================
// Two-phase begin/complete
// ============================================================================

#[test]
fn test_second_attempt_is_refused() {
    let mut session = active_session();
    let coordinator = coordinator();

    let ticket = coordinator.begin(&mut session, &off_route_fix(0)).unwrap();
    assert_eq!(session.state(), NavigationState::Recalculating);
    assert_eq!(ticket.destination, destination());
    assert_eq!(ticket.profile, "foot-walking");

    assert_eq!(
        coordinator.begin(&mut session, &off_route_fix(1_000)),
        Err(GuidanceError::AlreadyInProgress)
    );
    assert!(session.is_recalculating());
}

#[test]
fn test_cancel_discards_late_result() {
    let mut session = active_session();
    let coordinator = coordinator();
    let fix = off_route_fix(0);

    let ticket = coordinator.begin(&mut session, &fix).unwrap();
    session.cancel();

    let late = route_through(&[fix.point, destination()]);
    let outcome = coordinator.complete(&mut session, ticket, Ok(late));
    assert_eq!(outcome, RecalcOutcome::Discarded);
    assert_eq!(session.state(), NavigationState::Cancelled);
    assert!(session.route().is_none());
}

#[test]
fn test_superseded_ticket_is_discarded() {
    let mut session = active_session();
    let coordinator = coordinator();
    let fix = off_route_fix(0);

    let first = coordinator.begin(&mut session, &fix).unwrap();
    let stale = first.clone();
    let failed = coordinator.complete(
        &mut session,
        first,
        Err(GuidanceError::RouteUnavailable("timeout".into())),
    );
    assert!(matches!(failed, RecalcOutcome::Failed(_)));

    let second = coordinator.begin(&mut session, &fix).unwrap();
    assert!(second.generation() > stale.generation());

    let route = route_through(&[fix.point, destination()]);
    assert_eq!(
        coordinator.complete(&mut session, stale, Ok(route.clone())),
        RecalcOutcome::Discarded
    );
    assert!(session.is_recalculating());

    let applied = coordinator.complete(&mut session, second, Ok(route));
    assert!(matches!(applied, RecalcOutcome::Applied { .. }));
    assert_eq!(session.state(), NavigationState::Active);
}

#[test]
fn test_fixes_keep_flowing_during_recalculation() {
    let mut session = active_session();
    let coordinator = coordinator();
    let processor = PositionUpdateProcessor::new(GuidanceConfig::default());
    let clock = ManualClock::new(0);

    let ticket = coordinator.begin(&mut session, &off_route_fix(0)).unwrap();

    // Back on the old route near the middle anchor
    let update = processor
        .process(&mut session, GpsFix::new(0.0, 0.0049, 1_000), &clock)
        .update()
        .cloned()
        .unwrap();
    assert_eq!(update.step_advanced, Some(1));
    assert_eq!(update.state, NavigationState::Recalculating);

    // The new route is measured from the latest fix, not the ticket origin
    let latest = session.last_fix().unwrap().point;
    let route = route_through(&[latest, destination()]);
    let outcome = coordinator.complete(&mut session, ticket, Ok(route));
    assert_eq!(outcome, RecalcOutcome::Applied { progress_percent: 0 });
}

#[test]
fn test_arrival_during_recalculation_discards_result() {
    let mut session = active_session();
    let coordinator = coordinator();
    let processor = PositionUpdateProcessor::new(GuidanceConfig::default());
    let clock = ManualClock::new(0);

    let ticket = coordinator.begin(&mut session, &off_route_fix(0)).unwrap();

    processor.process(&mut session, GpsFix::new(0.0, 0.0049, 1_000), &clock);
    clock.set(20_000);
    let update = processor
        .process(&mut session, GpsFix::new(0.0, 0.0099, 20_000), &clock)
        .update()
        .cloned()
        .unwrap();
    assert!(update.arrived);
    assert_eq!(session.state(), NavigationState::Arrived);

    let route = route_through(&[GeoPoint::new(0.0, 0.0099), destination()]);
    assert_eq!(
        coordinator.complete(&mut session, ticket, Ok(route)),
        RecalcOutcome::Discarded
    );
    assert_eq!(session.state(), NavigationState::Arrived);
}

#[tokio::test]
async fn test_owned_fetch_future() {
    let mut session = active_session();
    let coordinator = coordinator();
    let provider: Arc<dyn RouteProvider> = Arc::new(MockProvider::working());

    let ticket = coordinator.begin(&mut session, &off_route_fix(0)).unwrap();
    let generation = ticket.generation();
    let handle = tokio::spawn(RecalculationCoordinator::fetch(provider, ticket));
    let (ticket, result) = handle.await.unwrap();

    assert_eq!(ticket.generation(), generation);
    let outcome = coordinator.complete(&mut session, ticket, result);
    assert!(matches!(outcome, RecalcOutcome::Applied { .. }));
}
