use serde::Serialize;

/// An Attack Surface Reduction rule tracked on the dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AsrRule {
    pub id: &'static str,
    pub label: &'static str,
    pub short_label: &'static str,
}

const fn rule(id: &'static str, label: &'static str, short_label: &'static str) -> AsrRule {
    AsrRule {
        id,
        label,
        short_label,
    }
}

pub const ASR_RULES: [AsrRule; 19] = [
    rule("56a863a9-875e-4185-98a7-b882c64b5ce5", "Block abuse of exploited vulnerable signed drivers", "Signed Drivers"),
    rule("7674ba52-37eb-4a4f-a9a1-f0f9a1619a2c", "Block Adobe Reader from creating child processes", "Adobe"),
    rule("d4f940ab-401b-4efc-aadc-ad5f3c50688a", "Block all Office applications from creating child processes", "Office Child"),
    rule("9e6c4e1f-7d60-472f-ba1a-a39ef669e4b2", "Block credential stealing from LSASS", "LSASS"),
    rule("be9ba2d9-53ea-4cdc-84e5-9b1eeee46550", "Block executable content from email client and webmail", "Email Executable"),
    rule("01443614-cd74-433a-b99e-2ecdc07bfc25", "Block executables unless they meet trust criteria", "Trust Executable"),
    rule("5beb7efe-fd9a-4556-801d-275e5ffc04cc", "Block obfuscated scripts", "Obfuscated Scripts"),
    rule("d3e037e1-3eb8-44c8-a917-57927947596d", "Block JS or VBScript from launching downloaded executables", "Script EXEs"),
    rule("3b576869-a4ec-4529-8536-b80a7769e899", "Block Office applications from creating executables", "Office EXE"),
    rule("75668c1f-73b5-4cf0-bb93-3ecf5cb7cc84", "Block Office applications from injecting code into other processes", "Office Inject"),
    rule("26190899-1602-49e8-8b27-eb1d0a1ce869", "Block Office comms app from creating child processes", "Office Comms"),
    rule("e6db77e5-3df2-4cf1-b95a-636979351e5b", "Block persistence via WMI event subscription", "WMI Persistence"),
    rule("d1e49aac-8f56-4280-b9ba-993a6d77406c", "Block process creation via PSExec and WMI", "PSExec/WMI"),
    rule("33ddedf1-c6e0-47cb-833e-de6133960387", "Block Safe Mode rebooting", "Safe Mode"),
    rule("b2b3f03d-6a65-4f7b-a9c7-1c7ef74a9ba4", "Block unsigned processes from USB", "USB Unsigned"),
    rule("c0033c00-d16d-4114-a5a0-dc9b3a7d2ceb", "Block copied or impersonated system tools", "Fake Tools"),
    rule("a8f5898e-1dc8-49a9-9878-85004b8a61e6", "Block Webshell creation on Servers", "Webshells"),
    rule("92e97fa1-2edf-4476-bdd6-9dd0b4dddc7b", "Block Win32 API calls from Office macros", "Win32 Macros"),
    rule("c1db55ab-c21a-4637-bb3f-a12568109d35", "Use advanced ransomware protection", "Ransomware Prot."),
];
