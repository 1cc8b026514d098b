//! Route geometry and the turn-by-turn instruction list.
//!
//! A [`RouteModel`] is immutable once built. Recalculation replaces it
//! wholesale, so a position update never observes a half-updated route.

use geo::{Coord, LineString, algorithm::simplify::Simplify};
use serde::{Deserialize, Serialize};

use crate::error::{GuidanceError, OptionExt, Result};
use crate::geo_utils::{bearing_delta, haversine_distance, initial_bearing, polyline_length};
use crate::{Bounds, GeoPoint};

/// Kind of maneuver announced by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverType {
    Depart,
    Straight,
    SlightLeft,
    Left,
    SharpLeft,
    SlightRight,
    Right,
    SharpRight,
    UTurn,
    Arrive,
}

impl ManeuverType {
    /// Classify a signed change of direction (degrees, positive = right).
    pub fn classify_turn(delta: f64) -> Self {
        let abs = delta.abs();
        if abs > 170.0 {
            ManeuverType::UTurn
        } else if abs > 120.0 {
            if delta > 0.0 { ManeuverType::SharpRight } else { ManeuverType::SharpLeft }
        } else if abs > 60.0 {
            if delta > 0.0 { ManeuverType::Right } else { ManeuverType::Left }
        } else if abs > 20.0 {
            if delta > 0.0 { ManeuverType::SlightRight } else { ManeuverType::SlightLeft }
        } else {
            ManeuverType::Straight
        }
    }

    pub fn as_text(&self) -> &'static str {
        match self {
            ManeuverType::Depart => "Depart",
            ManeuverType::Straight => "Continue straight",
            ManeuverType::SlightLeft => "Keep slightly left",
            ManeuverType::Left => "Turn left",
            ManeuverType::SharpLeft => "Turn sharp left",
            ManeuverType::SlightRight => "Keep slightly right",
            ManeuverType::Right => "Turn right",
            ManeuverType::SharpRight => "Turn sharp right",
            ManeuverType::UTurn => "Make a U-turn",
            ManeuverType::Arrive => "Arrive at destination",
        }
    }
}

/// One turn-by-turn instruction, anchored to the point where it applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInstruction {
    /// Position in the instruction list.
    pub index: usize,
    /// Where the maneuver happens.
    pub anchor: GeoPoint,
    /// Human-readable text.
    pub text: String,
    pub maneuver: ManeuverType,
    /// Meters from this anchor to the next one (0 for the arrival instruction).
    pub distance_to_next: f64,
    /// Seconds from this anchor to the next one.
    pub duration_to_next: f64,
}

impl RouteInstruction {
    pub fn new(
        index: usize,
        anchor: GeoPoint,
        text: impl Into<String>,
        maneuver: ManeuverType,
        distance_to_next: f64,
        duration_to_next: f64,
    ) -> Self {
        Self {
            index,
            anchor,
            text: text.into(),
            maneuver,
            distance_to_next,
            duration_to_next,
        }
    }
}

/// Serde shape of a route; converted into a validated [`RouteModel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteData {
    pub polyline: Vec<GeoPoint>,
    pub instructions: Vec<RouteInstruction>,
    /// Summary distance reported by the routing provider, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_distance: Option<f64>,
}

/// Immutable view over a route's geometry and instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RouteData", into = "RouteData")]
pub struct RouteModel {
    polyline: Vec<GeoPoint>,
    instructions: Vec<RouteInstruction>,
    provider_distance: Option<f64>,
    total_distance: f64,
    total_duration: f64,
    /// `distance_after[i]` = sum of `distance_to_next` over instructions with index > i.
    distance_after: Vec<f64>,
    bounds: Bounds,
}

impl RouteModel {
    /// Build a route, validating geometry and instructions.
    ///
    /// `provider_distance` is the routing provider's summary distance. When
    /// present it is authoritative for progress, since the polyline may have
    /// been simplified and per-step distances may drift from the true length.
    pub fn new(
        polyline: Vec<GeoPoint>,
        instructions: Vec<RouteInstruction>,
        provider_distance: Option<f64>,
    ) -> Result<Self> {
        if polyline.len() < 2 || instructions.is_empty() {
            return Err(GuidanceError::EmptyRoute);
        }
        if let Some(i) = polyline.iter().position(|p| !p.is_valid()) {
            return Err(GuidanceError::invalid_input(format!(
                "polyline point {i} is not a valid coordinate"
            )));
        }
        for (position, instruction) in instructions.iter().enumerate() {
            if instruction.index != position {
                return Err(GuidanceError::invalid_input(format!(
                    "instruction at position {position} has index {}",
                    instruction.index
                )));
            }
            if !instruction.anchor.is_valid() {
                return Err(GuidanceError::invalid_input(format!(
                    "instruction {position} has an invalid anchor"
                )));
            }
            let valid_measure = |v: f64| v.is_finite() && v >= 0.0;
            if !valid_measure(instruction.distance_to_next)
                || !valid_measure(instruction.duration_to_next)
            {
                return Err(GuidanceError::invalid_input(format!(
                    "instruction {position} has a negative or non-finite distance/duration"
                )));
            }
        }

        let mut distance_after = vec![0.0; instructions.len()];
        for i in (0..instructions.len().saturating_sub(1)).rev() {
            distance_after[i] = distance_after[i + 1] + instructions[i + 1].distance_to_next;
        }
        let step_sum = distance_after[0] + instructions[0].distance_to_next;
        let provider_distance = provider_distance.filter(|d| d.is_finite() && *d > 0.0);
        let total_distance = provider_distance.unwrap_or(step_sum);
        let total_duration = instructions.iter().map(|i| i.duration_to_next).sum();
        let bounds = Bounds::from_points(&polyline).ok_or(GuidanceError::EmptyRoute)?;

        Ok(Self {
            polyline,
            instructions,
            provider_distance,
            total_distance,
            total_duration,
            distance_after,
            bounds,
        })
    }

    /// Build a walking route from a raw track (for example a recorded GPX file).
    ///
    /// The track is simplified with Douglas-Peucker (`tolerance` in degrees),
    /// a turn instruction is placed at every vertex whose change of direction
    /// is a real maneuver, and straight vertices are folded into the
    /// preceding leg. Durations assume `walking_speed` m/s.
    pub fn from_track(points: &[GeoPoint], tolerance: f64, walking_speed: f64) -> Result<Self> {
        let coords: Vec<Coord> = points
            .iter()
            .filter(|p| p.is_valid())
            .map(|p| Coord {
                x: p.longitude,
                y: p.latitude,
            })
            .collect();
        if coords.len() < 2 {
            return Err(GuidanceError::EmptyRoute);
        }

        let simplified = LineString::new(coords).simplify(&tolerance);
        let mut vertices: Vec<GeoPoint> = simplified
            .0
            .iter()
            .map(|c| GeoPoint::new(c.y, c.x))
            .collect();
        vertices.dedup();
        if vertices.len() < 2 {
            return Err(GuidanceError::EmptyRoute);
        }

        // (vertex index, maneuver) for every instruction
        let mut maneuvers = vec![(0, ManeuverType::Depart)];
        for i in 1..vertices.len() - 1 {
            let incoming = initial_bearing(&vertices[i - 1], &vertices[i]);
            let outgoing = initial_bearing(&vertices[i], &vertices[i + 1]);
            if let (Some(from), Some(to)) = (incoming, outgoing) {
                let maneuver = ManeuverType::classify_turn(bearing_delta(from, to));
                if maneuver != ManeuverType::Straight {
                    maneuvers.push((i, maneuver));
                }
            }
        }
        maneuvers.push((vertices.len() - 1, ManeuverType::Arrive));

        let speed = if walking_speed > 0.0 { walking_speed } else { 1.4 };
        let instructions = maneuvers
            .iter()
            .enumerate()
            .map(|(index, &(vertex, maneuver))| {
                let distance = maneuvers
                    .get(index + 1)
                    .map(|&(next, _)| polyline_length(&vertices[vertex..=next]))
                    .unwrap_or(0.0);
                let heading = vertices
                    .get(vertex + 1)
                    .and_then(|next| initial_bearing(&vertices[vertex], next));
                RouteInstruction::new(
                    index,
                    vertices[vertex],
                    instruction_text(maneuver, heading, distance),
                    maneuver,
                    distance,
                    distance / speed,
                )
            })
            .collect();

        Self::new(vertices, instructions, None)
    }

    /// Instruction at `index`, bounds-checked.
    pub fn step_at(&self, index: usize) -> Result<&RouteInstruction> {
        self.instructions
            .get(index)
            .ok_or_index_out_of_range(index, self.instructions.len())
    }

    /// Distance from `position` to the destination, given that the user has
    /// reached the anchor of instruction `step_index`.
    ///
    /// Measures to the anchor the user is heading to (the next instruction,
    /// or the last one once it is current) and adds the precomputed
    /// `distance_to_next` of every later instruction. Never re-walks the
    /// polyline. An invalid position yields `f64::INFINITY`.
    pub fn remaining_distance_from(&self, position: &GeoPoint, step_index: usize) -> Result<f64> {
        self.step_at(step_index)?;
        let target = (step_index + 1).min(self.last_index());
        let to_anchor = haversine_distance(position, &self.instructions[target].anchor);
        Ok(to_anchor + self.distance_after[step_index])
    }

    pub fn polyline(&self) -> &[GeoPoint] {
        &self.polyline
    }

    pub fn instructions(&self) -> &[RouteInstruction] {
        &self.instructions
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Always false for a constructed route; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.instructions.len() - 1
    }

    /// Route length in meters, fixed at construction.
    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    /// Sum of the per-instruction durations, in seconds.
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn provider_distance(&self) -> Option<f64> {
        self.provider_distance
    }

    /// Final polyline point.
    pub fn end_point(&self) -> GeoPoint {
        self.polyline[self.polyline.len() - 1]
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Direction of travel along segment `segment_index`, if it has one.
    pub fn segment_bearing(&self, segment_index: usize) -> Option<f64> {
        let a = self.polyline.get(segment_index)?;
        let b = self.polyline.get(segment_index + 1)?;
        initial_bearing(a, b)
    }
}

impl TryFrom<RouteData> for RouteModel {
    type Error = GuidanceError;

    fn try_from(data: RouteData) -> Result<Self> {
        RouteModel::new(data.polyline, data.instructions, data.provider_distance)
    }
}

impl From<RouteModel> for RouteData {
    fn from(route: RouteModel) -> Self {
        RouteData {
            polyline: route.polyline,
            instructions: route.instructions,
            provider_distance: route.provider_distance,
        }
    }
}

/// Format a distance for instruction text.
///
/// Rounds to tens of meters below one kilometer, one decimal above.
pub fn format_distance(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.1} km", meters / 1000.0)
    } else {
        format!("{} m", (meters / 10.0).round() as i64 * 10)
    }
}

/// Eight-way compass name for a bearing.
pub fn cardinal_direction(bearing: f64) -> &'static str {
    const NAMES: [&str; 8] = [
        "north",
        "northeast",
        "east",
        "southeast",
        "south",
        "southwest",
        "west",
        "northwest",
    ];
    let sector = ((bearing.rem_euclid(360.0) + 22.5) / 45.0) as usize % 8;
    NAMES[sector]
}

fn instruction_text(maneuver: ManeuverType, heading: Option<f64>, distance: f64) -> String {
    match maneuver {
        ManeuverType::Arrive => maneuver.as_text().to_string(),
        ManeuverType::Depart => match heading {
            Some(h) => format!(
                "Head {} for {}",
                cardinal_direction(h),
                format_distance(distance)
            ),
            None => format!("Walk for {}", format_distance(distance)),
        },
        _ => format!(
            "{}, then continue for {}",
            maneuver.as_text(),
            format_distance(distance)
        ),
    }
}
