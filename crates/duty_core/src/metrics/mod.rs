use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::{Incident, ValidationWarning};

/// Deterministic per-incident timing, shown on the incident card.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ResolutionMetrics {
    pub resolution_seconds: Option<i64>,
}

fn parse_ts(
    field: &str,
    value: Option<&str>,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<OffsetDateTime> {
    let s = value?;
    match OffsetDateTime::parse(s, &Rfc3339) {
        Ok(dt) => Some(dt),
        Err(e) => {
            warnings.push(
                ValidationWarning::new(
                    "METRICS_TS_PARSE_FAILED",
                    format!("Failed to parse {field} for metrics"),
                )
                .with_details(format!("value={s}; err={e}")),
            );
            None
        }
    }
}

/// Compute time-to-resolution when both endpoints are present and parseable.
///
/// An ordering violation yields `None` and a warning (no silent correction).
pub fn compute_resolution(incident: &Incident) -> (ResolutionMetrics, Vec<ValidationWarning>) {
    let mut warnings = Vec::new();

    let created = parse_ts("created_at", Some(&incident.created_at), &mut warnings);
    let closed = parse_ts("closed_at", incident.closed_at.as_deref(), &mut warnings);

    let resolution_seconds = match (created, closed) {
        (Some(created), Some(closed)) => {
            let secs = (closed - created).whole_seconds();
            if secs < 0 {
                warnings.push(
                    ValidationWarning::new(
                        "METRICS_TS_ORDER_VIOLATION",
                        "Cannot compute resolution time: created_at must be <= closed_at",
                    )
                    .with_details(format!(
                        "created_at={created}; closed_at={closed}"
                    )),
                );
                None
            } else {
                Some(secs)
            }
        }
        _ => None,
    };

    (ResolutionMetrics { resolution_seconds }, warnings)
}

/// Human formatting for the card: "3h 12m", "5m 40s" or "25s".
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formatting_picks_the_right_unit() {
        assert_eq!(format_duration(25), "25s");
        assert_eq!(format_duration(5 * 60 + 40), "5m 40s");
        assert_eq!(format_duration(3 * 3600 + 12 * 60 + 5), "3h 12m");
    }
}
