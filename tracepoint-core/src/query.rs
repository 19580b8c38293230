use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use tracepoint_filter::{CompareOp, Expr, Literal};

use crate::CoreError;

/// Query parameters shared by the device listing endpoints.
///
/// Empty strings count as absent.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceQuery {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub computer_name: Option<String>,
    #[serde(default)]
    pub logged_user: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
}

impl DeviceQuery {
    fn prefix_ranges(&self) -> Vec<Expr> {
        [
            ("RowKey", &self.device_id),
            ("computerName", &self.computer_name),
            ("loggedOnUser", &self.logged_user),
        ]
        .into_iter()
        .filter_map(|(field, value)| present(value).map(|v| Expr::range(field, v)))
        .collect()
    }

    /// Filter for the raw snapshot listing: dates compare the `timestamp` column as instants.
    pub fn snapshot_filter(&self) -> Result<Expr, CoreError> {
        let mut exprs = self.prefix_ranges();
        if let Some(from) = present(&self.date_from) {
            let from = instant("dateFrom", from)?;
            exprs.push(Expr::compare("timestamp", CompareOp::Ge, Literal::DateTime(from)));
        }
        if let Some(to) = present(&self.date_to) {
            let to = instant("dateTo", to)?;
            exprs.push(Expr::compare("timestamp", CompareOp::Le, Literal::DateTime(to)));
        }
        Ok(Expr::and(exprs))
    }

    /// Filter for the latest-status listing: dates compare the coarse `date` column as
    /// plain strings, exactly as supplied.
    pub fn latest_status_filter(&self) -> Expr {
        let mut exprs = self.prefix_ranges();
        if let Some(from) = present(&self.date_from) {
            exprs.push(Expr::compare("date", CompareOp::Ge, Literal::Str(from.to_string())));
        }
        if let Some(to) = present(&self.date_to) {
            exprs.push(Expr::compare("date", CompareOp::Le, Literal::Str(to.to_string())));
        }
        Expr::and(exprs)
    }
}

/// Exact match on one device's row key. Row keys are stored lower-cased.
pub fn device_log_filter(device_id: &str) -> Expr {
    let row_key = device_id.to_lowercase();
    if row_key.is_empty() {
        return Expr::and(Vec::new());
    }
    Expr::and([Expr::eq_str("RowKey", row_key)])
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn instant(param: &'static str, value: &str) -> Result<DateTime<Utc>, CoreError> {
    parse_instant(value).ok_or_else(|| CoreError::InvalidDate {
        param,
        value: value.to_string(),
    })
}

/// Accepts RFC 3339, a zone-less date-time (taken as UTC) or a bare `YYYY-MM-DD` (UTC midnight).
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> DeviceQuery {
        let mut q = DeviceQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "deviceId" => q.device_id = v,
                "computerName" => q.computer_name = v,
                "loggedUser" => q.logged_user = v,
                "dateFrom" => q.date_from = v,
                "dateTo" => q.date_to = v,
                other => panic!("unknown param {other}"),
            }
        }
        q
    }

    #[test]
    fn no_parameters_give_empty_filter() {
        let q = DeviceQuery::default();
        assert_eq!(q.snapshot_filter().unwrap().render(), "");
        assert_eq!(q.latest_status_filter().render(), "");
    }

    #[test]
    fn empty_strings_are_ignored() {
        let q = query(&[("deviceId", ""), ("computerName", ""), ("dateFrom", "")]);
        assert_eq!(q.snapshot_filter().unwrap().render(), "");
    }

    #[test]
    fn device_id_is_a_row_key_prefix_range() {
        let q = query(&[("deviceId", "abc")]);
        assert_eq!(
            q.snapshot_filter().unwrap().render(),
            "RowKey ge 'abc' and RowKey lt 'abc~'"
        );
    }

    #[test]
    fn snapshot_dates_are_normalized_instants() {
        let q = query(&[("dateFrom", "2025-01-01T00:00:00.000Z"), ("dateTo", "2025-01-31")]);
        let rendered = q.snapshot_filter().unwrap().render();
        assert!(rendered.contains("timestamp ge datetime'2025-01-01T00:00:00.000Z'"));
        assert!(rendered.contains("timestamp le datetime'2025-01-31T00:00:00.000Z'"));
    }

    #[test]
    fn snapshot_filter_keeps_parameter_order() {
        let q = query(&[
            ("dateFrom", "2025-03-01T12:30:00+01:00"),
            ("loggedUser", "alice"),
            ("computerName", "WS"),
            ("deviceId", "d"),
        ]);
        assert_eq!(
            q.snapshot_filter().unwrap().render(),
            "RowKey ge 'd' and RowKey lt 'd~' and computerName ge 'WS' and computerName lt 'WS~' \
             and loggedOnUser ge 'alice' and loggedOnUser lt 'alice~' \
             and timestamp ge datetime'2025-03-01T11:30:00.000Z'"
        );
    }

    #[test]
    fn bad_date_is_rejected() {
        let q = query(&[("dateTo", "last tuesday")]);
        match q.snapshot_filter() {
            Err(CoreError::InvalidDate { param, .. }) => assert_eq!(param, "dateTo"),
            other => panic!("expected invalid date, got {other:?}"),
        }
    }

    #[test]
    fn latest_status_dates_compare_date_column_verbatim() {
        let q = query(&[("dateFrom", "2025-01-01"), ("dateTo", "2025-01-31T23:59:59.000Z")]);
        assert_eq!(
            q.latest_status_filter().render(),
            "date ge '2025-01-01' and date le '2025-01-31T23:59:59.000Z'"
        );
    }

    #[test]
    fn device_log_lower_cases_the_id() {
        assert_eq!(device_log_filter("ABC123").render(), "RowKey eq 'abc123'");
        assert!(device_log_filter("").is_empty());
    }

    #[test]
    fn instants_accept_common_shapes() {
        let midnight = parse_instant("2025-05-12").unwrap();
        assert_eq!(midnight.to_rfc3339(), "2025-05-12T00:00:00+00:00");
        assert_eq!(parse_instant("2025-05-12T08:00:00").unwrap().to_rfc3339(), "2025-05-12T08:00:00+00:00");
        assert!(parse_instant("2025-13-01").is_none());
        assert!(parse_instant("").is_none());
    }
}
