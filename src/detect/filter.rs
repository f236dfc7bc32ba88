//! Vehicle filter: maps raw detector output onto the vehicle domain.

use super::result::{BoundingBox, Detection, RawDetection, VehicleClass};

/// Detections at or below this confidence are rejected.
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Admit the subset of `raw` that belongs to a vehicle class, clears the
/// confidence threshold, and keeps a non-empty box once clamped to the frame.
///
/// Output order mirrors input order. Malformed boxes are dropped, never reported.
pub fn admit(raw: &[RawDetection], frame_width: u32, frame_height: u32) -> Vec<Detection> {
    raw.iter()
        .filter_map(|det| admit_one(det, frame_width, frame_height))
        .collect()
}

#[allow(clippy::neg_cmp_op_on_partial_ord)]
fn admit_one(raw: &RawDetection, frame_width: u32, frame_height: u32) -> Option<Detection> {
    let class = VehicleClass::from_class_id(raw.class_id)?;
    // NaN fails this comparison as well.
    if !(raw.confidence > CONFIDENCE_THRESHOLD) {
        return None;
    }
    let bbox = clamp_to_frame(&raw.bbox, frame_width as f32, frame_height as f32)?;
    Some(Detection::new(class, raw.confidence.min(1.0), bbox))
}

fn clamp_to_frame(bbox: &BoundingBox, width: f32, height: f32) -> Option<BoundingBox> {
    let coords = [bbox.x1, bbox.y1, bbox.x2, bbox.y2];
    if coords.iter().any(|c| !c.is_finite()) {
        return None;
    }
    let (x1, x2) = (bbox.x1.min(bbox.x2), bbox.x1.max(bbox.x2));
    let (y1, y2) = (bbox.y1.min(bbox.y2), bbox.y1.max(bbox.y2));

    let x1 = x1.clamp(0.0, width);
    let x2 = x2.clamp(0.0, width);
    let y1 = y1.clamp(0.0, height);
    let y2 = y2.clamp(0.0, height);

    if x1 < x2 && y1 < y2 {
        Some(BoundingBox::new(x1, y1, x2, y2))
    } else {
        None
    }
}
