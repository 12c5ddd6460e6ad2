//! Label id -> category, subcategory and style.
//!
//! Lookups cover the ten clothing label ids of the primary classifier's
//! vocabulary (398..=407). Everything else maps to `OTHER`, or to the
//! `casual` base style.
//!
//! The style color heuristic looks only at the first two hex digits of the
//! red channel. It is deliberately coarse; it is not a perceptual model.

use crate::color::ColorSwatch;

pub const OTHER: &str = "other";
pub const DEFAULT_STYLE: &str = "casual";

/// `(label id, category, subcategory, base style)`.
static CLOTHING_LABELS: [(u32, &str, &str, &str); 10] = [
    (398, "top-wear", "t-shirt", "casual"),
    (399, "top-wear", "coat", "formal"),
    (400, "top-wear", "sweatshirt", "sporty"),
    (401, "bottom-wear", "trousers", "classic"),
    (402, "bottom-wear", "shorts", "sporty"),
    (403, "footwear", "dress shoes", "formal"),
    (404, "footwear", "sneakers", "sporty"),
    (405, "accessory", "hat", "casual"),
    (406, "accessory", "bag", "accessory"),
    (407, "accessory", "sunglasses", "accessory"),
];

/// Red-channel prefixes treated as dark.
const DARK_PREFIXES: [&str; 2] = ["#00", "#11"];
/// Red-channel prefixes treated as light.
const LIGHT_PREFIXES: [&str; 2] = ["#ff", "#ee"];

fn lookup(label_id: u32) -> Option<&'static (u32, &'static str, &'static str, &'static str)> {
    CLOTHING_LABELS.iter().find(|(id, ..)| *id == label_id)
}

/// Label ids with a known category.
pub fn known_labels() -> impl Iterator<Item = u32> {
    CLOTHING_LABELS.iter().map(|(id, ..)| *id)
}

pub fn is_known_label(label_id: u32) -> bool {
    lookup(label_id).is_some()
}

pub fn category(label_id: u32) -> &'static str {
    lookup(label_id).map_or(OTHER, |(_, category, ..)| *category)
}

pub fn subcategory(label_id: u32) -> &'static str {
    lookup(label_id).map_or(OTHER, |(_, _, subcategory, _)| *subcategory)
}

pub fn base_style(label_id: u32) -> &'static str {
    lookup(label_id).map_or(DEFAULT_STYLE, |(.., style)| *style)
}

/// Base style adjusted by the dominant color, if any.
///
/// - dark red channel: `casual` -> `smart-casual`, `sporty` -> `athleisure`
/// - light red channel: `formal` -> `business-casual`
pub fn style(label_id: u32, color: Option<&ColorSwatch>) -> &'static str {
    let base = base_style(label_id);
    let Some(color) = color else {
        return base;
    };
    let hex = color.as_str();

    if DARK_PREFIXES.iter().any(|prefix| hex.starts_with(prefix)) {
        match base {
            "casual" => "smart-casual",
            "sporty" => "athleisure",
            other => other,
        }
    } else if LIGHT_PREFIXES.iter().any(|prefix| hex.starts_with(prefix)) {
        match base {
            "formal" => "business-casual",
            other => other,
        }
    } else {
        base
    }
}
