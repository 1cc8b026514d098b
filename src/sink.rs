//! Outbound guidance side effects.
//!
//! Banners, speech, vibration and notifications live in the host. The core
//! only calls this trait; every call is fire-and-forget.

use log::debug;

use crate::processor::SessionUpdate;
use crate::route::{RouteInstruction, RouteModel};
use crate::session::ApproachTier;

/// Receiver of guidance events.
pub trait GuidanceEventSink: Send {
    /// The step cursor moved to `instruction`.
    fn on_step_changed(&mut self, instruction: &RouteInstruction);
    /// Progress, remaining distance and time after an update.
    fn on_progress(&mut self, update: &SessionUpdate);
    /// The user came within `tier` of `instruction`'s anchor.
    fn on_turn_approach(&mut self, instruction: &RouteInstruction, tier: ApproachTier);
    fn on_deviation_started(&mut self);
    fn on_deviation_cleared(&mut self);
    fn on_arrived(&mut self);

    /// A recalculated route replaced the previous one.
    fn on_route_replaced(&mut self, _route: &RouteModel) {}
    /// Recalculation failed; guidance continues on the previous route.
    fn on_recalculation_failed(&mut self, _reason: &str) {}
}

/// Sink that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl GuidanceEventSink for NoopSink {
    fn on_step_changed(&mut self, _instruction: &RouteInstruction) {}
    fn on_progress(&mut self, _update: &SessionUpdate) {}
    fn on_turn_approach(&mut self, _instruction: &RouteInstruction, _tier: ApproachTier) {}
    fn on_deviation_started(&mut self) {}
    fn on_deviation_cleared(&mut self) {}
    fn on_arrived(&mut self) {}
}

/// Forward the relevant parts of an update to a sink.
///
/// Order: step change, turn approaches, deviation, arrival, progress.
pub fn dispatch_update(update: &SessionUpdate, route: &RouteModel, sink: &mut dyn GuidanceEventSink) {
    if let Some(index) = update.step_advanced {
        if let Ok(instruction) = route.step_at(index) {
            sink.on_step_changed(instruction);
        }
    }
    for crossing in &update.tier_crossings {
        match route.step_at(crossing.instruction_index) {
            Ok(instruction) => sink.on_turn_approach(instruction, crossing.tier),
            Err(e) => debug!("[Sink] Skipping tier crossing: {}", e),
        }
    }
    if update.deviation_started {
        sink.on_deviation_started();
    }
    if update.deviation_cleared {
        sink.on_deviation_cleared();
    }
    if update.arrived {
        sink.on_arrived();
    }
    sink.on_progress(update);
}
