use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of vehicle classes admitted by the filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Motorcycle,
    Bus,
    Truck,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 4] = [
        VehicleClass::Car,
        VehicleClass::Motorcycle,
        VehicleClass::Bus,
        VehicleClass::Truck,
    ];

    /// Maps the detector's native (COCO) class id onto the vehicle domain.
    pub fn from_class_id(class_id: u32) -> Option<Self> {
        match class_id {
            2 => Some(VehicleClass::Car),
            3 => Some(VehicleClass::Motorcycle),
            5 => Some(VehicleClass::Bus),
            7 => Some(VehicleClass::Truck),
            _ => None,
        }
    }

    pub fn class_id(self) -> u32 {
        match self {
            VehicleClass::Car => 2,
            VehicleClass::Motorcycle => 3,
            VehicleClass::Bus => 5,
            VehicleClass::Truck => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VehicleClass::Car => "car",
            VehicleClass::Motorcycle => "motorcycle",
            VehicleClass::Bus => "bus",
            VehicleClass::Truck => "truck",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            VehicleClass::Car => "Car",
            VehicleClass::Motorcycle => "Motorcycle",
            VehicleClass::Bus => "Bus",
            VehicleClass::Truck => "Truck",
        }
    }

    fn slot(self) -> usize {
        match self {
            VehicleClass::Car => 0,
            VehicleClass::Motorcycle => 1,
            VehicleClass::Bus => 2,
            VehicleClass::Truck => 3,
        }
    }
}

impl std::fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-class counters. Serializes as `{car, motorcycle, bus, truck}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub car: u64,
    pub motorcycle: u64,
    pub bus: u64,
    pub truck: u64,
}

impl ClassCounts {
    pub fn get(&self, class: VehicleClass) -> u64 {
        self.as_array()[class.slot()]
    }

    pub fn add(&mut self, class: VehicleClass, n: u64) {
        let slot = match class {
            VehicleClass::Car => &mut self.car,
            VehicleClass::Motorcycle => &mut self.motorcycle,
            VehicleClass::Bus => &mut self.bus,
            VehicleClass::Truck => &mut self.truck,
        };
        *slot = slot.saturating_add(n);
    }

    pub fn merge(&mut self, other: &ClassCounts) {
        for class in VehicleClass::ALL {
            self.add(class, other.get(class));
        }
    }

    pub fn total(&self) -> u64 {
        self.as_array().iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Classes with a non-zero count, in class order.
    pub fn non_zero(&self) -> impl Iterator<Item = (VehicleClass, u64)> + '_ {
        VehicleClass::ALL
            .into_iter()
            .map(|class| (class, self.get(class)))
            .filter(|(_, n)| *n > 0)
    }

    fn as_array(&self) -> [u64; 4] {
        [self.car, self.motorcycle, self.bus, self.truck]
    }
}

impl FromIterator<VehicleClass> for ClassCounts {
    fn from_iter<I: IntoIterator<Item = VehicleClass>>(iter: I) -> Self {
        let mut counts = ClassCounts::default();
        for class in iter {
            counts.add(class, 1);
        }
        counts
    }
}

/// Axis-aligned box in source-frame pixel coordinates.
///
/// Serializes as `[x1, y1, x2, y2]` rounded to whole pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [
            b.x1.round() as i32,
            b.y1.round() as i32,
            b.x2.round() as i32,
            b.y2.round() as i32,
        ]
    }
}

/// Detector output before admission. Not owned by the core.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }
}

/// An admitted vehicle detection.
///
/// Only the vehicle filter constructs these, so every instance satisfies
/// `confidence > 0.5` and `0 <= x1 < x2 <= width`, `0 <= y1 < y2 <= height`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Detection {
    #[serde(rename = "class")]
    vehicle_class: VehicleClass,
    confidence: f32,
    bbox: BoundingBox,
}

impl Detection {
    pub(crate) fn new(vehicle_class: VehicleClass, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            vehicle_class,
            confidence,
            bbox,
        }
    }

    pub fn vehicle_class(&self) -> VehicleClass {
        self.vehicle_class
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }
}

/// Admitted detections for one frame.
#[derive(Clone, Debug)]
pub struct DetectionBatch {
    pub timestamp: DateTime<Utc>,
    pub frame_index: u64,
    pub detections: Vec<Detection>,
}

impl DetectionBatch {
    pub fn new(frame_index: u64, timestamp: DateTime<Utc>, detections: Vec<Detection>) -> Self {
        Self {
            timestamp,
            frame_index,
            detections,
        }
    }

    pub fn counts(&self) -> ClassCounts {
        self.detections.iter().map(|d| d.vehicle_class()).collect()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
