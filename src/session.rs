//! Navigation session state machine.
//!
//! ```text
//!   Idle ──start──▶ Active ◀──pause/resume──▶ Paused
//!                    │  ▲
//!       deviation    │  │ success (new route) / failure (old route)
//!                    ▼  │
//!                Recalculating
//!                    │
//!   Active ──within arrival radius on last step──▶ Arrived
//!   any ──cancel──▶ Cancelled
//! ```
//!
//! The session owns every piece of per-navigation state; nothing lives in
//! globals. Only the processor and the recalculation coordinator mutate it
//! beyond the explicit lifecycle calls.

use std::collections::HashMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{GuidanceError, Result};
use crate::processor::compute_progress;
use crate::route::{RouteInstruction, RouteModel};
use crate::{GeoPoint, GpsFix};

/// Lifecycle state of a navigation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationState {
    Idle,
    Active,
    Paused,
    Recalculating,
    Arrived,
    Cancelled,
}

impl NavigationState {
    /// States in which a route is loaded and the step cursor is meaningful.
    pub fn has_route(&self) -> bool {
        matches!(
            self,
            NavigationState::Active
                | NavigationState::Paused
                | NavigationState::Recalculating
                | NavigationState::Arrived
        )
    }
}

/// Turn-approach urgency levels, least urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproachTier {
    Tier1,
    Tier2,
    Tier3,
}

impl ApproachTier {
    pub const ALL: [ApproachTier; 3] = [ApproachTier::Tier1, ApproachTier::Tier2, ApproachTier::Tier3];

    pub fn level(&self) -> usize {
        match self {
            ApproachTier::Tier1 => 1,
            ApproachTier::Tier2 => 2,
            ApproachTier::Tier3 => 3,
        }
    }
}

/// Which tiers have already fired for one instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierFlags {
    pub tier1: bool,
    pub tier2: bool,
    pub tier3: bool,
}

impl TierFlags {
    pub fn has(&self, tier: ApproachTier) -> bool {
        match tier {
            ApproachTier::Tier1 => self.tier1,
            ApproachTier::Tier2 => self.tier2,
            ApproachTier::Tier3 => self.tier3,
        }
    }

    /// Mark `tier` and every less urgent tier as reached.
    pub fn mark_through(&mut self, tier: ApproachTier) {
        self.tier1 = true;
        if tier >= ApproachTier::Tier2 {
            self.tier2 = true;
        }
        if tier >= ApproachTier::Tier3 {
            self.tier3 = true;
        }
    }

    pub fn any(&self) -> bool {
        self.tier1 || self.tier2 || self.tier3
    }
}

/// Serializable view of a session for host UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: NavigationState,
    pub current_step_index: usize,
    pub instruction_count: usize,
    pub progress_percent: u8,
    pub deviation_active: bool,
    pub route_distance: Option<f64>,
    pub destination: Option<GeoPoint>,
    pub last_fix: Option<GpsFix>,
}

/// State of one navigation from start to arrival or cancellation.
#[derive(Debug, Clone)]
pub struct NavigationSession {
    pub(crate) state: NavigationState,
    pub(crate) route: Option<RouteModel>,
    pub(crate) destination: Option<GeoPoint>,
    pub(crate) current_step_index: usize,
    pub(crate) last_fix: Option<GpsFix>,
    /// Clock time of the last fix that went through the full pipeline.
    pub(crate) last_update_at: Option<u64>,
    pub(crate) turn_notification_levels: HashMap<usize, TierFlags>,
    pub(crate) deviation_active: bool,
    pub(crate) progress_percent: u8,
    pub(crate) arrival_notified: bool,
    /// Bumped on every recalculation attempt and on cancel.
    recalc_generation: u64,
    recalc_in_flight: Option<u64>,
}

impl Default for NavigationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationSession {
    /// Create an idle session.
    pub fn new() -> Self {
        Self {
            state: NavigationState::Idle,
            route: None,
            destination: None,
            current_step_index: 0,
            last_fix: None,
            last_update_at: None,
            turn_notification_levels: HashMap::new(),
            deviation_active: false,
            progress_percent: 0,
            arrival_notified: false,
            recalc_generation: 0,
            recalc_in_flight: None,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Begin guiding along `route` towards `destination`.
    pub fn start(&mut self, route: RouteModel, destination: GeoPoint) -> Result<()> {
        if self.state != NavigationState::Idle {
            return Err(GuidanceError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        if !destination.is_valid() {
            return Err(GuidanceError::InvalidDestination);
        }
        if route.is_empty() {
            return Err(GuidanceError::EmptyRoute);
        }

        info!(
            "[Session] Navigation started: {} instructions, {:.0}m",
            route.len(),
            route.total_distance()
        );
        self.route = Some(route);
        self.destination = Some(destination);
        self.current_step_index = 0;
        self.turn_notification_levels.clear();
        self.deviation_active = false;
        self.progress_percent = 0;
        self.arrival_notified = false;
        self.state = NavigationState::Active;
        Ok(())
    }

    /// Suspend guidance. Fixes are still recorded but not processed.
    pub fn pause(&mut self) -> Result<()> {
        self.transition("pause", NavigationState::Active, NavigationState::Paused)
    }

    pub fn resume(&mut self) -> Result<()> {
        self.transition("resume", NavigationState::Paused, NavigationState::Active)
    }

    /// End the session. Safe in any state, including mid-recalculation:
    /// the in-flight attempt is invalidated and its result will be discarded.
    pub fn cancel(&mut self) {
        if self.state != NavigationState::Cancelled {
            info!("[Session] Navigation cancelled from {:?}", self.state);
        }
        self.state = NavigationState::Cancelled;
        self.route = None;
        self.destination = None;
        self.current_step_index = 0;
        self.last_fix = None;
        self.last_update_at = None;
        self.turn_notification_levels.clear();
        self.deviation_active = false;
        self.progress_percent = 0;
        self.arrival_notified = false;
        self.recalc_generation += 1;
        self.recalc_in_flight = None;
    }

    fn transition(
        &mut self,
        operation: &'static str,
        from: NavigationState,
        to: NavigationState,
    ) -> Result<()> {
        if self.state != from {
            return Err(GuidanceError::InvalidState {
                operation,
                state: self.state,
            });
        }
        info!("[Session] {:?} -> {:?}", from, to);
        self.state = to;
        Ok(())
    }

    pub(crate) fn mark_arrived(&mut self) {
        info!("[Session] Arrived at destination");
        self.state = NavigationState::Arrived;
        self.arrival_notified = true;
        self.progress_percent = 100;
        // An attempt still in flight is now irrelevant
        self.recalc_in_flight = None;
    }

    // ========================================================================
    // Recalculation bookkeeping
    // ========================================================================

    /// Enter `Recalculating`, returning the attempt's generation.
    pub(crate) fn begin_recalculation(&mut self) -> Result<u64> {
        match self.state {
            NavigationState::Recalculating => Err(GuidanceError::AlreadyInProgress),
            NavigationState::Active => {
                self.recalc_generation += 1;
                self.recalc_in_flight = Some(self.recalc_generation);
                self.state = NavigationState::Recalculating;
                Ok(self.recalc_generation)
            }
            state => Err(GuidanceError::InvalidState {
                operation: "recalculate",
                state,
            }),
        }
    }

    /// Whether `generation` is the attempt this session is waiting for.
    pub(crate) fn awaits(&self, generation: u64) -> bool {
        self.state == NavigationState::Recalculating && self.recalc_in_flight == Some(generation)
    }

    /// Swap in a recalculated route. All dependent fields change together.
    pub(crate) fn apply_route(&mut self, generation: u64, route: RouteModel, position: &GeoPoint) -> bool {
        if !self.awaits(generation) {
            return false;
        }

        let remaining = route
            .remaining_distance_from(position, 0)
            .unwrap_or(f64::INFINITY);
        self.progress_percent = compute_progress(route.total_distance(), remaining);
        self.route = Some(route);
        self.current_step_index = 0;
        self.turn_notification_levels.clear();
        self.deviation_active = false;
        self.recalc_in_flight = None;
        self.state = NavigationState::Active;
        true
    }

    /// Leave `Recalculating` keeping the previous route and cursor.
    pub(crate) fn abort_recalculation(&mut self, generation: u64) -> bool {
        if !self.awaits(generation) {
            return false;
        }
        self.recalc_in_flight = None;
        self.state = NavigationState::Active;
        true
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn route(&self) -> Option<&RouteModel> {
        self.route.as_ref()
    }

    pub fn destination(&self) -> Option<GeoPoint> {
        self.destination
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn last_fix(&self) -> Option<&GpsFix> {
        self.last_fix.as_ref()
    }

    pub fn deviation_active(&self) -> bool {
        self.deviation_active
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn arrival_notified(&self) -> bool {
        self.arrival_notified
    }

    pub fn is_recalculating(&self) -> bool {
        self.state == NavigationState::Recalculating
    }

    /// Tier flags recorded for an instruction (all false if none fired yet).
    pub fn tier_flags(&self, instruction_index: usize) -> TierFlags {
        self.turn_notification_levels
            .get(&instruction_index)
            .copied()
            .unwrap_or_default()
    }

    /// The instruction whose anchor was reached most recently.
    pub fn current_instruction(&self) -> Option<&RouteInstruction> {
        self.route.as_ref()?.instructions().get(self.current_step_index)
    }

    /// The next maneuver ahead, if any.
    pub fn upcoming_instruction(&self) -> Option<&RouteInstruction> {
        self.route
            .as_ref()?
            .instructions()
            .get(self.current_step_index + 1)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            current_step_index: self.current_step_index,
            instruction_count: self.route.as_ref().map_or(0, RouteModel::len),
            progress_percent: self.progress_percent,
            deviation_active: self.deviation_active,
            route_distance: self.route.as_ref().map(RouteModel::total_distance),
            destination: self.destination,
            last_fix: self.last_fix,
        }
    }
}
