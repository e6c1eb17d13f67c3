use serde::{Deserialize, Serialize};

/// Caja alineada a los ejes, en píxeles del frame de origen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersección sobre unión con otra caja.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x_min.max(other.x_min);
        let iy1 = self.y_min.max(other.y_min);
        let ix2 = self.x_max.min(other.x_max);
        let iy2 = self.y_max.min(other.y_max);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Qué dice un objeto detectado sobre el uso de casco.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelmetCategory {
    HelmetPresent,
    HelmetAbsent,
    Other,
}

const ABSENT_MARKERS: [&str; 5] = ["without", "no_helmet", "nohelmet", "no_hardhat", "no_hard_hat"];
const PRESENT_MARKERS: [&str; 3] = ["helmet", "hardhat", "hard_hat"];

impl HelmetCategory {
    /// Resuelve la categoría a partir del nombre de clase del modelo.
    ///
    /// Los marcadores negativos ganan a los positivos: `without_helmet` y
    /// `NO-Hardhat` son ambos `HelmetAbsent`. Una clase `head` a secas (como en
    /// los datasets helmet/head/person) también significa sin casco.
    pub fn from_class_name(name: &str) -> Self {
        let norm: String = name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        if norm == "head" || ABSENT_MARKERS.iter().any(|m| norm.contains(m)) {
            HelmetCategory::HelmetAbsent
        } else if PRESENT_MARKERS.iter().any(|m| norm.contains(m)) {
            HelmetCategory::HelmetPresent
        } else {
            HelmetCategory::Other
        }
    }
}

/// Un objeto detectado en un frame. Sin identidad entre frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub class_name: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
    pub category: HelmetCategory,
}

impl DetectionRecord {
    pub fn new(class_name: impl Into<String>, confidence: f32, bounding_box: BoundingBox) -> Self {
        let class_name = class_name.into();
        let category = HelmetCategory::from_class_name(&class_name);
        Self {
            class_name,
            confidence,
            bounding_box,
            category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> BoundingBox {
        BoundingBox { x_min, y_min, x_max, y_max }
    }

    #[test]
    fn category_from_common_class_names() {
        assert_eq!(HelmetCategory::from_class_name("with_helmet"), HelmetCategory::HelmetPresent);
        assert_eq!(HelmetCategory::from_class_name("without_helmet"), HelmetCategory::HelmetAbsent);
        assert_eq!(HelmetCategory::from_class_name("no_helmet"), HelmetCategory::HelmetAbsent);
        assert_eq!(HelmetCategory::from_class_name("Hardhat"), HelmetCategory::HelmetPresent);
        assert_eq!(HelmetCategory::from_class_name("NO-Hardhat"), HelmetCategory::HelmetAbsent);
        assert_eq!(HelmetCategory::from_class_name("head"), HelmetCategory::HelmetAbsent);
        assert_eq!(HelmetCategory::from_class_name("Safety Vest"), HelmetCategory::Other);
        assert_eq!(HelmetCategory::from_class_name("person"), HelmetCategory::Other);
    }

    #[test]
    fn record_resolves_category_once() {
        let rec = DetectionRecord::new("without_helmet", 0.8, bbox(0.0, 0.0, 10.0, 10.0));
        assert_eq!(rec.category, HelmetCategory::HelmetAbsent);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(5.0, 0.0, 15.0, 10.0);
        // inter 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_box_has_zero_iou() {
        let a = bbox(5.0, 5.0, 5.0, 5.0);
        assert_eq!(a.iou(&a), 0.0);
    }
}
