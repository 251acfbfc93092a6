//! Facing-mode classification.
//!
//! Platform-reported facing is authoritative. Labels are only consulted when
//! nothing is reported, and are matched against rear/front cues in the
//! languages device vendors commonly localize labels into.

use crate::types::Facing;

/// Substrings marking an environment-facing camera, lowercase
const REAR_KEYWORDS: &[&str] = &[
    "back",
    "rear",
    "environment",
    "world",
    "arrière",
    "arriere",
    "trasera",
    "trasero",
    "traseira",
    "posteriore",
    "rück",
    "rueck",
    "hinten",
    "achter",
    "bakre",
    "bagside",
    "tylny",
    "tylna",
    "zadní",
    "задн",
    "тыл",
    "πίσω",
    "arka",
    "belakang",
    "mặt sau",
    "หลัง",
    "后",
    "後",
    "背面",
    "リア",
    "후면",
    "后置",
    "אחורית",
    "خلفية",
    "पीछे",
];

/// Substrings marking a user-facing camera, lowercase
const FRONT_KEYWORDS: &[&str] = &[
    "front",
    "user",
    "face",
    "selfie",
    "avant",
    "frontal",
    "frontale",
    "anteriore",
    "vorder",
    "voorkant",
    "främre",
    "forside",
    "przedni",
    "przednia",
    "přední",
    "передн",
    "фронт",
    "μπροστ",
    "ön kamera",
    "depan",
    "mặt trước",
    "หน้า",
    "前",
    "正面",
    "フロント",
    "전면",
    "קדמית",
    "أمامية",
    "सामने",
];

/// Classify a label by keyword. Rear cues win over front cues.
pub fn classify_label(label: &str) -> Facing {
    let label = label.to_lowercase();
    if REAR_KEYWORDS.iter().any(|k| label.contains(k)) {
        Facing::Back
    } else if FRONT_KEYWORDS.iter().any(|k| label.contains(k)) {
        Facing::Front
    } else {
        Facing::Unknown
    }
}

/// Classify using the reported facing mode first, the label second
pub fn classify(reported: Option<Facing>, label: &str) -> Facing {
    match reported {
        Some(facing) if facing.is_known() => facing,
        _ => classify_label(label),
    }
}

/// Whether a feed should be mirrored for display.
///
/// Anything not positively identified as rear-facing is treated as a selfie
/// camera.
pub fn should_mirror(facing: Facing) -> bool {
    facing != Facing::Back
}
