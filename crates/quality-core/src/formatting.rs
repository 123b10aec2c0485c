use regex::Regex;
use std::sync::OnceLock;

/// Name a correlation coefficient by the strength bands used in the quality
/// reviews. The sign is ignored.
///
/// # Examples
///
/// ```
/// use quality_core::formatting::describe_strength;
///
/// assert_eq!(describe_strength(0.95), "Near perfect");
/// assert_eq!(describe_strength(-0.44), "Moderate");
/// assert_eq!(describe_strength(0.06), "Trivial");
/// ```
pub fn describe_strength(r: f64) -> &'static str {
    let a = r.abs();
    if a >= 0.90 {
        "Near perfect"
    } else if a >= 0.70 {
        "Very strong"
    } else if a >= 0.50 {
        "Substantial"
    } else if a >= 0.30 {
        "Moderate"
    } else if a >= 0.10 {
        "Low"
    } else if a >= 0.01 {
        "Trivial"
    } else {
        "Negligible"
    }
}

fn slug_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("regex is valid"))
}

/// Lower-case `title` and collapse every run of other characters into `-`.
///
/// ```
/// use quality_core::formatting::slugify;
///
/// assert_eq!(slugify("Temp vs. Defects (time)"), "temp-vs-defects-time");
/// ```
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    slug_separator()
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

/// File name for a chart: two-digit step number, slug and extension.
///
/// ```
/// use quality_core::formatting::artifact_file_name;
///
/// assert_eq!(artifact_file_name(3, "waste-defects", "svg"), "03-waste-defects.svg");
/// ```
pub fn artifact_file_name(step: u32, slug: &str, extension: &str) -> String {
    format!("{:02}-{}.{}", step, slugify(slug), extension)
}

/// Format a metric value for summaries, dropping a `.00` tail.
pub fn format_metric(value: f64) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    let s = format!("{:.2}", value);
    match s.strip_suffix(".00") {
        Some(whole) => whole.to_string(),
        None => s,
    }
}
