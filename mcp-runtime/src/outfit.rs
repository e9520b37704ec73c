//! Static day-of-week outfit recommendations.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::ToolError;

static OUTFITS: LazyLock<BTreeMap<&'static str, &'static str>> = LazyLock::new(|| {
    BTreeMap::from([
        ("monday", "Casual shirt + jeans + sneakers"),
        ("tuesday", "Business suit + tie + leather shoes"),
        ("wednesday", "Polo shirt + chinos + loafers"),
        ("thursday", "T-shirt + joggers + trainers"),
        ("friday", "Casual jacket + jeans + boots"),
        ("saturday", "Relaxed hoodie + shorts + sneakers"),
        ("sunday", "Smart-casual sweater + trousers + loafers"),
    ])
});

/// Look up the outfit for a weekday name, case-insensitively. An unrecognized
/// day is a defined `unknown_day` error, not a panic.
pub fn outfit_for_day(day: &str) -> Result<String, ToolError> {
    let key = day.trim().to_ascii_lowercase();
    match OUTFITS.get(key.as_str()) {
        Some(outfit) => Ok((*outfit).to_string()),
        None => Err(ToolError::new(
            "unknown_day",
            format!("No outfit recommendation for '{day}'."),
        )
        .with_docs_hint("Use a full weekday name like 'monday' or 'sunday'.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_weekday_has_an_outfit() {
        for day in [
            "monday",
            "tuesday",
            "wednesday",
            "thursday",
            "friday",
            "saturday",
            "sunday",
        ] {
            assert!(outfit_for_day(day).is_ok(), "missing outfit for {day}");
        }
    }

    #[test]
    fn lookup_is_case_insensitive_and_trimmed() {
        assert_eq!(
            outfit_for_day(" MONDAY ").unwrap(),
            "Casual shirt + jeans + sneakers"
        );
    }

    #[test]
    fn unknown_day_is_a_defined_error() {
        let err = outfit_for_day("someday").unwrap_err();
        assert_eq!(err.code(), "unknown_day");
    }
}
