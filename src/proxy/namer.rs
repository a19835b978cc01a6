//! Geo-label based display names shared by all workers of a run

use parking_lot::Mutex;
use std::collections::HashMap;

/// Marker used for labels that are not an ISO 3166-1 alpha-2 code
pub const UNKNOWN_FLAG: &str = "❓Other";

/// Label used when a proxy's location could not be resolved
pub const UNRESOLVED_LABEL: &str = "未识别";

/// Per-label counters turning a geo label into `<flag><label>_<n>`.
///
/// Every call to [`Namer::rename`] is one critical section, so names are
/// unique across concurrent callers.
#[derive(Debug, Default)]
pub struct Namer {
    counters: Mutex<HashMap<String, usize>>,
}

impl Namer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next display name for `label`
    pub fn rename(&self, label: &str) -> String {
        let mut counters = self.counters.lock();
        let count = counters.entry(label.to_string()).or_insert(0);
        *count += 1;
        format!("{}{}_{}", country_flag(label), label, count)
    }

    /// Forget every issued count. Called once at the start of each run.
    pub fn reset(&self) {
        self.counters.lock().clear();
    }
}

/// Officially assigned ISO 3166-1 alpha-2 codes, sorted
const ISO_3166_ALPHA2: [&str; 249] = [
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX", "AZ",
    "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS",
    "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN",
    "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE",
    "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF",
    "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM",
    "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM",
    "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC",
    "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK",
    "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA",
    "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG",
    "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW",
    "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS",
    "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO",
    "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

/// Map an ISO 3166-1 alpha-2 country code to its flag emoji, or [`UNKNOWN_FLAG`]
pub fn country_flag(code: &str) -> String {
    let code = code.trim().to_ascii_uppercase();
    if ISO_3166_ALPHA2.binary_search(&code.as_str()).is_err() {
        return UNKNOWN_FLAG.to_string();
    }

    code.bytes()
        .filter_map(|b| char::from_u32(0x1F1E6 + u32::from(b - b'A')))
        .collect()
}
