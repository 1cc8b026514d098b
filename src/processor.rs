//! Per-fix guidance pipeline.
//!
//! Each accepted fix runs, in order:
//! 1. Debounce (tiny moves shortly after the last update are dropped)
//! 2. Step advancement (forward-only cursor)
//! 3. Arrival check (fires once per session)
//! 4. Progress and time estimate
//! 5. Turn-approach tiers for the upcoming maneuver
//! 6. Deviation detection (latched until the user is back on the route)
//! 7. Record the fix
//!
//! The processor only mutates the session. Forwarding the resulting
//! [`SessionUpdate`] to a sink or the recalculation coordinator is the
//! caller's job.

use log::{debug, info, warn};
use serde::Serialize;

use crate::clock::ClockSource;
use crate::geo_utils::{haversine_distance, nearest_point_on_polyline, point_ahead};
use crate::route::RouteModel;
use crate::session::{ApproachTier, NavigationSession, NavigationState};
use crate::{GeoPoint, GpsFix, GuidanceConfig, RejectReason};

/// A tier newly reached for one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierCrossing {
    pub instruction_index: usize,
    pub tier: ApproachTier,
    /// Distance to the instruction anchor when the tier fired.
    pub distance: f64,
}

/// Everything that changed during one pipeline pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUpdate {
    pub timestamp: u64,
    pub state: NavigationState,
    pub current_step_index: usize,
    /// New step index when the cursor advanced this pass.
    pub step_advanced: Option<usize>,
    pub arrived: bool,
    pub tier_crossings: Vec<TierCrossing>,
    pub deviation_started: bool,
    pub deviation_cleared: bool,
    pub deviation_active: bool,
    pub progress_percent: u8,
    /// Meters to the destination along the remaining instructions.
    pub remaining_distance: f64,
    /// Seconds to the destination at the effective walking speed.
    pub estimated_time_remaining: f64,
    /// Meters from the fix to the nearest point of the route polyline.
    pub distance_from_route: f64,
}

/// Result of offering one fix to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    /// Fix refused; the session is unchanged.
    Rejected(RejectReason),
    /// Fix too close in space and time to the last update.
    NoSignificantChange,
    /// Session not guiding; the fix was recorded when the state allows it.
    Suspended(NavigationState),
    Updated(SessionUpdate),
}

impl FixOutcome {
    pub fn update(&self) -> Option<&SessionUpdate> {
        match self {
            FixOutcome::Updated(update) => Some(update),
            _ => None,
        }
    }
}

/// Percentage of the route completed, 0..=100.
pub fn compute_progress(total_distance: f64, remaining_distance: f64) -> u8 {
    if !(total_distance.is_finite() && total_distance > 0.0) || !remaining_distance.is_finite() {
        return 0;
    }
    let percent = (100.0 * (total_distance - remaining_distance) / total_distance).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Runs the per-fix pipeline against a session.
#[derive(Debug, Clone, Default)]
pub struct PositionUpdateProcessor {
    config: GuidanceConfig,
}

impl PositionUpdateProcessor {
    pub fn new(config: GuidanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    /// Offer one fix to the session.
    pub fn process(
        &self,
        session: &mut NavigationSession,
        fix: GpsFix,
        clock: &dyn ClockSource,
    ) -> FixOutcome {
        if let Err(reason) = fix.check() {
            warn!("[Processor] Rejected fix: {}", reason);
            return FixOutcome::Rejected(reason);
        }

        let state = session.state;
        if !state.has_route() {
            return FixOutcome::Suspended(state);
        }

        if let Some(last) = session.last_fix {
            if fix.timestamp < last.timestamp {
                warn!(
                    "[Processor] Rejected out-of-order fix ({} < {})",
                    fix.timestamp, last.timestamp
                );
                return FixOutcome::Rejected(RejectReason::Stale);
            }
        }

        if matches!(state, NavigationState::Paused | NavigationState::Arrived) {
            session.last_fix = Some(fix);
            return FixOutcome::Suspended(state);
        }

        let now = clock.now();
        if self.is_insignificant(session, &fix, now) {
            debug!("[Processor] Debounced fix at {}", fix.timestamp);
            return FixOutcome::NoSignificantChange;
        }

        // Taken out for the pass so the session's other fields stay mutable;
        // the route is never observable half-updated.
        let Some(route) = session.route.take() else {
            return FixOutcome::Suspended(state);
        };
        let update = self.run_pipeline(session, &route, &fix, now);
        session.route = Some(route);
        FixOutcome::Updated(update)
    }

    fn is_insignificant(&self, session: &NavigationSession, fix: &GpsFix, now: u64) -> bool {
        let (Some(last), Some(updated_at)) = (session.last_fix, session.last_update_at) else {
            return false;
        };
        let moved = haversine_distance(&last.point, &fix.point);
        let elapsed = now.saturating_sub(updated_at);
        moved < self.config.debounce_distance && elapsed < self.config.force_refresh_interval_ms
    }

    fn run_pipeline(
        &self,
        session: &mut NavigationSession,
        route: &RouteModel,
        fix: &GpsFix,
        now: u64,
    ) -> SessionUpdate {
        let position = fix.point;
        let previous_step = session.current_step_index;

        // Step advancement: forward only, one anchor per fix
        let mut step_advanced = None;
        let next = previous_step + 1;
        if let Some(next_instruction) = route.instructions().get(next) {
            let d = haversine_distance(&position, &next_instruction.anchor);
            if d <= self.config.step_advance_radius {
                session.current_step_index = next;
                step_advanced = Some(next);
                info!(
                    "[Processor] Advanced to step {} ({:.1}m from anchor): {}",
                    next, d, next_instruction.text
                );
            }
        }
        let step = session.current_step_index;

        // Arrival
        let mut arrived = false;
        if step == route.last_index() && !session.arrival_notified {
            let destination = session.destination.unwrap_or_else(|| route.end_point());
            if haversine_distance(&position, &destination) <= self.config.arrival_radius {
                session.mark_arrived();
                arrived = true;
            }
        }

        // Progress
        let remaining_distance = if arrived {
            0.0
        } else {
            route
                .remaining_distance_from(&position, step)
                .unwrap_or(f64::INFINITY)
        };
        let computed = if arrived {
            100
        } else {
            compute_progress(route.total_distance(), remaining_distance)
        };
        session.progress_percent = session.progress_percent.max(computed);
        let estimated_time_remaining =
            remaining_distance / self.config.effective_speed(fix.speed);

        // Turn-approach tiers
        let mut tier_crossings = Vec::new();
        if !arrived {
            // The anchor just reached still gets its final tier before the
            // cursor moves on to the next maneuver.
            let mut candidates = vec![step + 1];
            if step_advanced.is_some() {
                candidates.insert(0, step);
            }
            for index in candidates {
                if let Some(crossing) = self.update_tiers(session, route, index, &position) {
                    tier_crossings.push(crossing);
                }
            }
        }

        // Deviation
        let nearest = nearest_point_on_polyline(&position, route.polyline());
        let mut deviation_started = false;
        let mut deviation_cleared = false;
        if !arrived {
            let threshold = self.config.deviation_threshold(fix.accuracy);
            let moving = fix
                .speed
                .filter(|s| s.is_finite() && *s >= 0.0)
                .is_none_or(|speed| speed >= self.config.stationary_speed);
            if nearest.distance > threshold && moving && !session.deviation_active {
                session.deviation_active = true;
                deviation_started = true;
                info!(
                    "[Processor] Deviation started: {:.1}m from route (threshold {:.1}m)",
                    nearest.distance, threshold
                );
            } else if nearest.distance <= threshold && session.deviation_active {
                session.deviation_active = false;
                deviation_cleared = true;
                debug!("[Processor] Back on route ({:.1}m)", nearest.distance);
            }
        } else if session.deviation_active {
            session.deviation_active = false;
            deviation_cleared = true;
        }

        session.last_fix = Some(*fix);
        session.last_update_at = Some(now);

        debug!(
            "[Processor] step={} progress={}% remaining={:.0}m off_route={:.1}m",
            session.current_step_index,
            session.progress_percent,
            remaining_distance,
            nearest.distance
        );

        SessionUpdate {
            timestamp: fix.timestamp,
            state: session.state,
            current_step_index: session.current_step_index,
            step_advanced,
            arrived,
            tier_crossings,
            deviation_started,
            deviation_cleared,
            deviation_active: session.deviation_active,
            progress_percent: session.progress_percent,
            remaining_distance,
            estimated_time_remaining,
            distance_from_route: nearest.distance,
        }
    }

    /// Update tier flags for one instruction, returning the most urgent tier
    /// newly reached, if any. Tiers re-arm once the user is far away again.
    fn update_tiers(
        &self,
        session: &mut NavigationSession,
        route: &RouteModel,
        index: usize,
        position: &GeoPoint,
    ) -> Option<TierCrossing> {
        let instruction = route.instructions().get(index)?;
        let distance = haversine_distance(position, &instruction.anchor);

        if distance > self.config.tier_reset_distance {
            if session.turn_notification_levels.remove(&index).is_some() {
                debug!("[Processor] Tiers re-armed for instruction {}", index);
            }
            return None;
        }

        let [t1, t2, t3] = self.config.tier_thresholds;
        let tier = if distance < t3 {
            ApproachTier::Tier3
        } else if distance < t2 {
            ApproachTier::Tier2
        } else if distance < t1 {
            ApproachTier::Tier1
        } else {
            return None;
        };

        let flags = session.turn_notification_levels.entry(index).or_default();
        if flags.has(tier) {
            return None;
        }
        flags.mark_through(tier);
        debug!(
            "[Processor] Instruction {} reached {:?} at {:.1}m",
            index, tier, distance
        );
        Some(TierCrossing {
            instruction_index: index,
            tier,
            distance,
        })
    }

    /// Point the map camera should look at: ahead of the user along their
    /// heading, or along the route when no heading is reported.
    pub fn camera_target(&self, session: &NavigationSession, fix: &GpsFix) -> GeoPoint {
        let heading = fix.heading.filter(|h| h.is_finite()).or_else(|| {
            let route = session.route()?;
            let nearest = nearest_point_on_polyline(&fix.point, route.polyline());
            route.segment_bearing(nearest.segment_index)
        });
        match heading {
            Some(h) => point_ahead(&fix.point, h, self.config.camera_lookahead),
            None => fix.point,
        }
    }
}
