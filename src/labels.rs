//! PPE label vocabulary and the display mapping (colors, buckets).
//!
//! Both mappings are total: a label outside the table falls back to the
//! `OtherObjects` bucket and the `White` color.

/// Labels the detector emits, indexed by model class id.
pub const MODEL_LABELS: [&str; 10] = [
    "Hardhat",
    "Mask",
    "NO-Hardhat",
    "NO-Mask",
    "NO-Safety Vest",
    "Person",
    "Safety Cone",
    "Safety Vest",
    "Machinery",
    "Vehicle",
];

/// Labels that count as equipment being worn.
pub const EQUIPMENT_LABELS: [&str; 3] = ["Hardhat", "Mask", "Safety Vest"];

/// Prefix marking a missing-equipment violation.
pub const VIOLATION_PREFIX: &str = "NO-";

/// Display name for a model class id. Ids beyond the vocabulary get a
/// synthesized name so the mapping stays total.
pub fn label_for_class(class_id: usize) -> String {
    match MODEL_LABELS.get(class_id) {
        Some(name) => (*name).to_string(),
        None => format!("class_{class_id}"),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayColor {
    Green,
    Red,
    Yellow,
    White,
}

impl DisplayColor {
    /// CSS color name used in rendered HTML fragments.
    pub fn css_name(self) -> &'static str {
        match self {
            DisplayColor::Green => "green",
            DisplayColor::Red => "red",
            DisplayColor::Yellow => "yellow",
            DisplayColor::White => "white",
        }
    }

    /// RGB triple used when drawing bounding boxes.
    pub fn rgb(self) -> [u8; 3] {
        match self {
            DisplayColor::Green => [0, 200, 60],
            DisplayColor::Red => [220, 40, 40],
            DisplayColor::Yellow => [235, 200, 0],
            DisplayColor::White => [255, 255, 255],
        }
    }
}

/// Fixed label-to-color table. Equipment present is green, missing equipment
/// is red, contextual objects are yellow, anything unknown is white.
pub fn color_for(label: &str) -> DisplayColor {
    match label {
        "Hardhat" | "Mask" | "Safety Vest" => DisplayColor::Green,
        "NO-Hardhat" | "NO-Mask" | "NO-Safety Vest" => DisplayColor::Red,
        "Person" | "Safety Cone" | "Machinery" | "Vehicle" => DisplayColor::Yellow,
        _ => DisplayColor::White,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    SafeEquipment,
    OtherObjects,
    UnsafeConditions,
}

impl Bucket {
    /// Display order on the results page.
    pub const ORDER: [Bucket; 3] = [
        Bucket::SafeEquipment,
        Bucket::OtherObjects,
        Bucket::UnsafeConditions,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Bucket::SafeEquipment => "Safe Equipment",
            Bucket::OtherObjects => "Other Objects",
            Bucket::UnsafeConditions => "Unsafe Conditions",
        }
    }
}

/// Bucket assignment, evaluated in priority order: violation prefix first,
/// then the equipment table, then the contextual fallback.
pub fn bucket_for(label: &str) -> Bucket {
    if label.starts_with(VIOLATION_PREFIX) {
        Bucket::UnsafeConditions
    } else if EQUIPMENT_LABELS.contains(&label) {
        Bucket::SafeEquipment
    } else {
        Bucket::OtherObjects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equipment_labels_are_green_and_safe() {
        for label in EQUIPMENT_LABELS {
            assert_eq!(color_for(label), DisplayColor::Green);
            assert_eq!(bucket_for(label), Bucket::SafeEquipment);
        }
    }

    #[test]
    fn violation_prefix_always_maps_to_unsafe() {
        for label in ["NO-Hardhat", "NO-Mask", "NO-Safety Vest", "NO-Gloves"] {
            assert_eq!(bucket_for(label), Bucket::UnsafeConditions);
        }
    }

    #[test]
    fn unknown_labels_fall_back_to_other_and_white() {
        assert_eq!(bucket_for("Forklift"), Bucket::OtherObjects);
        assert_eq!(color_for("Forklift"), DisplayColor::White);
        assert_eq!(bucket_for("class_37"), Bucket::OtherObjects);
        assert_eq!(color_for("class_37"), DisplayColor::White);
    }

    #[test]
    fn out_of_vocabulary_class_ids_get_synthesized_names() {
        assert_eq!(label_for_class(0), "Hardhat");
        assert_eq!(label_for_class(9), "Vehicle");
        assert_eq!(label_for_class(37), "class_37");
    }
}
