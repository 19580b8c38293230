//! Fleet-wide security posture, aggregated from each device's latest snapshot.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use tracepoint_types::{DeviceSnapshot, ProtectionStatus};

pub mod catalog;
pub use catalog::{AsrRule, ASR_RULES};

/// Device counts per network protection state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionCounts {
    pub disabled: usize,
    pub block: usize,
    pub audit: usize,
    pub off: usize,
    /// Unrecognized code or not reported.
    pub unknown: usize,
}

impl ProtectionCounts {
    fn record(&mut self, status: Option<ProtectionStatus>) {
        match status {
            Some(ProtectionStatus::Disabled) => self.disabled += 1,
            Some(ProtectionStatus::Block) => self.block += 1,
            Some(ProtectionStatus::Audit) => self.audit += 1,
            Some(ProtectionStatus::Off) => self.off += 1,
            Some(ProtectionStatus::Other(_)) | None => self.unknown += 1,
        }
    }
}

/// Compliance of one ASR rule across the fleet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCompliance {
    pub rule_id: &'static str,
    pub label: &'static str,
    pub short_label: &'static str,
    /// Status 0, or the rule is missing from the device's report.
    pub not_configured: usize,
    pub block: usize,
    pub audit: usize,
    pub off: usize,
}

impl RuleCompliance {
    fn new(rule: &AsrRule) -> Self {
        Self {
            rule_id: rule.id,
            label: rule.label,
            short_label: rule.short_label,
            not_configured: 0,
            block: 0,
            audit: 0,
            off: 0,
        }
    }

    fn record(&mut self, status: Option<ProtectionStatus>) {
        match status {
            None | Some(ProtectionStatus::Disabled) => self.not_configured += 1,
            Some(ProtectionStatus::Block) => self.block += 1,
            Some(ProtectionStatus::Audit) => self.audit += 1,
            Some(ProtectionStatus::Off) => self.off += 1,
            Some(ProtectionStatus::Other(_)) => {}
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDistribution {
    pub windows11: usize,
    pub windows10: usize,
    pub other: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostureSummary {
    pub total_devices: usize,
    pub connected_today: usize,
    pub offline: usize,
    pub total_crashes: u64,
    pub network_protection: ProtectionCounts,
    pub asr_rules: Vec<RuleCompliance>,
    pub os_distribution: OsDistribution,
    pub last_updated: Option<DeviceSnapshot>,
}

/// Aggregate `devices` (one latest snapshot per device) as of `today` (UTC).
pub fn summarize(devices: &[DeviceSnapshot], today: NaiveDate) -> PostureSummary {
    let mut network_protection = ProtectionCounts::default();
    let mut asr_rules: Vec<RuleCompliance> = ASR_RULES.iter().map(RuleCompliance::new).collect();
    let mut os_distribution = OsDistribution::default();
    let mut connected_today = 0;
    let mut offline = 0;
    let mut total_crashes = 0u64;
    let mut last_updated: Option<(DateTime<Utc>, &DeviceSnapshot)> = None;

    for device in devices {
        network_protection.record(device.network_protection);

        for compliance in asr_rules.iter_mut() {
            let status = device
                .asr_rules
                .as_ref()
                .and_then(|rules| rules.status(compliance.rule_id));
            compliance.record(status);
        }

        match device.os_version.as_deref() {
            Some("Windows 11") => os_distribution.windows11 += 1,
            Some("Windows 10") => os_distribution.windows10 += 1,
            _ => os_distribution.other += 1,
        }

        total_crashes += device.crashes_cnt.unwrap_or(0);

        if let Some(seen) = device.timestamp.as_deref().and_then(parse_timestamp) {
            if seen.date_naive() >= today {
                connected_today += 1;
            } else {
                offline += 1;
            }
            if last_updated.map_or(true, |(best, _)| seen > best) {
                last_updated = Some((seen, device));
            }
        }
    }

    PostureSummary {
        total_devices: devices.len(),
        connected_today,
        offline,
        total_crashes,
        network_protection,
        asr_rules,
        os_distribution,
        last_updated: last_updated.map(|(_, device)| device.clone()),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
