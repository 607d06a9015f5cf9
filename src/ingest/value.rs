//! Parameter value parsing: scientific notation and SI-prefixed units
//!
//! `"4.7 nF"` -> `("4.7", Some(4.7e-9))`, `"1.2 kΩ"` -> `("1.2", Some(1200.0))`,
//! `"3.3e-6"` -> `("3.3e-6", Some(3.3e-6))`. Unparseable strings keep their
//! display form with no numeric value; a `str` unit disables parsing.

use std::sync::LazyLock;

use regex::Regex;

static VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)\s*([μumkKMGTnpf]?)([A-Za-zΩ°%]*)$")
        .expect("value pattern is valid")
});

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)").expect("number pattern is valid")
});

fn si_multiplier(prefix: &str) -> f64 {
    match prefix {
        "T" => 1e12,
        "G" => 1e9,
        "M" => 1e6,
        "k" | "K" => 1e3,
        "m" => 1e-3,
        "μ" | "u" => 1e-6,
        "n" => 1e-9,
        "p" => 1e-12,
        "f" => 1e-15,
        _ => 1.0,
    }
}

/// Parse a raw cell into `(display_value, numeric_value)`.
///
/// The display value is what gets stored as the parameter's `data`; the
/// numeric value feeds `data_numeric` for range filtering in the backend.
pub fn parse_parameter_value(raw: &str, unit: &str) -> (String, Option<f64>) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ("-".to_string(), None);
    }
    // A "str" unit marks free-text columns; pass them through untouched.
    if unit == "str" {
        return (raw.to_string(), None);
    }

    if let Some(caps) = VALUE_RE.captures(trimmed) {
        let number = &caps[1];
        if let Ok(base) = number.parse::<f64>() {
            let numeric = base * si_multiplier(&caps[2]);
            return (number.to_string(), Some(numeric));
        }
    }

    // No full match: salvage a leading number if there is one.
    if let Some(caps) = NUMBER_RE.captures(trimmed) {
        if let Ok(numeric) = caps[1].parse::<f64>() {
            return (caps[1].to_string(), Some(numeric));
        }
    }

    (trimmed.to_string(), None)
}
