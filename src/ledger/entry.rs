//! Ledger Entry
//!
//! Defines the immutable, hash-chained ledger entry and the canonical
//! hash input used to commit to its identity, action and timestamp.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LedgerError;

/// Separator used by the delimited hash scheme.
pub const HASH_FIELD_DELIMITER: char = '|';

/// Data classification of the resource an entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataClassification {
    #[serde(rename = "PHI")]
    Phi,
    Confidential,
    Internal,
    Public,
}

impl DataClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataClassification::Phi => "PHI",
            DataClassification::Confidential => "Confidential",
            DataClassification::Internal => "Internal",
            DataClassification::Public => "Public",
        }
    }
}

impl FromStr for DataClassification {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PHI" => Ok(DataClassification::Phi),
            "Confidential" => Ok(DataClassification::Confidential),
            "Internal" => Ok(DataClassification::Internal),
            "Public" => Ok(DataClassification::Public),
            other => Err(LedgerError::Validation(format!(
                "unknown data classification: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }

    pub fn is_high_risk(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl FromStr for RiskLevel {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(RiskLevel::Low),
            "Medium" => Ok(RiskLevel::Medium),
            "High" => Ok(RiskLevel::High),
            "Critical" => Ok(RiskLevel::Critical),
            other => Err(LedgerError::Validation(format!("unknown risk level: {}", other))),
        }
    }
}

/// Compliance regime an entry is relevant to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComplianceFlag {
    #[serde(rename = "SOC2")]
    Soc2,
    #[serde(rename = "HIPAA")]
    Hipaa,
}

impl ComplianceFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceFlag::Soc2 => "SOC2",
            ComplianceFlag::Hipaa => "HIPAA",
        }
    }
}

impl FromStr for ComplianceFlag {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOC2" => Ok(ComplianceFlag::Soc2),
            "HIPAA" => Ok(ComplianceFlag::Hipaa),
            other => Err(LedgerError::Validation(format!("unknown compliance flag: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Active,
    Archived,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Active => "active",
            EntryStatus::Archived => "archived",
        }
    }
}

impl FromStr for EntryStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EntryStatus::Active),
            "archived" => Ok(EntryStatus::Archived),
            other => Err(LedgerError::Validation(format!("unknown entry status: {}", other))),
        }
    }
}

/// Encoding of the hash input.
///
/// `Delimited` joins fields with `|` and matches chains written by earlier
/// deployments. `LengthPrefixed` writes every field as `<len>:<bytes>` so a
/// separator inside free text cannot make two distinct inputs collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashScheme {
    #[default]
    Delimited,
    LengthPrefixed,
}

impl HashScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashScheme::Delimited => "delimited",
            HashScheme::LengthPrefixed => "length_prefixed",
        }
    }
}

impl FromStr for HashScheme {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delimited" => Ok(HashScheme::Delimited),
            "length_prefixed" => Ok(HashScheme::LengthPrefixed),
            other => Err(LedgerError::Validation(format!("unknown hash scheme: {}", other))),
        }
    }
}

impl fmt::Display for HashScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current time at the precision entries are stored with.
pub fn ledger_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-precision round-trip timestamp format (microseconds, `Z` suffix).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| LedgerError::Corrupt(format!("invalid timestamp {:?}: {}", s, e)))
}

/// Tamper-evident ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub description: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub session_id: Option<String>,
    pub sequence_number: i64,
    pub previous_event_hash: Option<String>,
    pub event_hash: String,
    pub hash_scheme: HashScheme,
    pub data_classification: DataClassification,
    pub risk_level: RiskLevel,
    pub compliance_flags: BTreeSet<ComplianceFlag>,
    pub status: EntryStatus,
    pub retention_days: i64,
    pub retention_expiry: DateTime<Utc>,
}

impl LedgerEntry {
    /// Fields committed to by the event hash, in canonical order
    fn hashed_fields(&self) -> [String; 7] {
        [
            self.id.to_string(),
            self.tenant_id.to_string(),
            self.actor_id.to_string(),
            self.action.clone(),
            self.resource_type.clone(),
            self.resource_id.map(|id| id.to_string()).unwrap_or_default(),
            format_timestamp(&self.timestamp),
        ]
    }

    /// Canonical hash input for the entry's stored scheme
    pub fn canonical_string(&self) -> String {
        let fields = self.hashed_fields();
        match self.hash_scheme {
            HashScheme::Delimited => fields.join(&HASH_FIELD_DELIMITER.to_string()),
            HashScheme::LengthPrefixed => fields
                .iter()
                .map(|field| format!("{}:{}", field.len(), field))
                .collect(),
        }
    }

    /// SHA-256 of the canonical string, base64 encoded
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_string().as_bytes());
        STANDARD.encode(hasher.finalize())
    }

    pub fn verify_hash(&self) -> bool {
        self.event_hash == self.calculate_hash()
    }

    pub fn is_archived(&self) -> bool {
        self.status == EntryStatus::Archived
    }

    pub fn summary(&self) -> String {
        format!(
            "#{} {} {} by {} ({})",
            self.sequence_number,
            self.action,
            self.resource_type,
            self.actor_id,
            self.risk_level.as_str()
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub(crate) fn sample_entry(sequence_number: i64, previous: Option<&LedgerEntry>) -> LedgerEntry {
        let tenant_id = previous
            .map(|p| p.tenant_id)
            .unwrap_or_else(|| Uuid::from_u128(0x7e4a_0000_0000_0000_0000_0000_0000_0001));
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
            + Duration::microseconds(sequence_number * 1_500);

        let mut entry = LedgerEntry {
            id: Uuid::new_v4(),
            tenant_id,
            actor_id: Uuid::new_v4(),
            action: "Update".to_string(),
            resource_type: "Patient".to_string(),
            resource_id: Some(Uuid::new_v4()),
            description: None,
            old_value: None,
            new_value: None,
            timestamp,
            ip_address: Some("10.0.0.7".to_string()),
            session_id: None,
            sequence_number,
            previous_event_hash: previous.map(|p| p.event_hash.clone()),
            event_hash: String::new(),
            hash_scheme: HashScheme::Delimited,
            data_classification: DataClassification::Phi,
            risk_level: RiskLevel::Medium,
            compliance_flags: [ComplianceFlag::Soc2, ComplianceFlag::Hipaa].into_iter().collect(),
            status: EntryStatus::Active,
            retention_days: 2555,
            retention_expiry: timestamp + Duration::days(2555),
        };
        entry.event_hash = entry.calculate_hash();
        entry
    }

    pub(crate) fn sample_chain(len: i64) -> Vec<LedgerEntry> {
        let mut chain: Vec<LedgerEntry> = Vec::new();
        for seq in 1..=len {
            let entry = sample_entry(seq, chain.last());
            chain.push(entry);
        }
        chain
    }

    #[test]
    fn test_canonical_string_delimited() {
        let entry = sample_entry(1, None);
        let canonical = entry.canonical_string();
        let parts: Vec<&str> = canonical.split('|').collect();

        assert_eq!(parts.len(), 7);
        assert_eq!(parts[0], entry.id.to_string());
        assert_eq!(parts[3], "Update");
        assert_eq!(parts[4], "Patient");
        assert_eq!(parts[6], "2024-03-01T09:30:00.001500Z");
    }

    #[test]
    fn test_missing_resource_id_hashes_as_empty_field() {
        let mut entry = sample_entry(1, None);
        entry.resource_id = None;
        assert!(entry.canonical_string().contains("|Patient||2024-"));
    }

    #[test]
    fn test_hash_is_base64_sha256() {
        let entry = sample_entry(1, None);
        let decoded = STANDARD.decode(&entry.event_hash).unwrap();
        assert_eq!(decoded.len(), 32);
        assert!(entry.verify_hash());
    }

    #[test]
    fn test_unhashed_fields_do_not_affect_hash() {
        let mut entry = sample_entry(1, None);
        let original = entry.event_hash.clone();

        entry.status = EntryStatus::Archived;
        entry.description = Some("context".to_string());
        entry.risk_level = RiskLevel::Critical;

        assert_eq!(entry.calculate_hash(), original);
    }

    #[test]
    fn test_hashed_field_mutation_is_detected() {
        let mut entry = sample_entry(1, None);
        entry.action = "Delete".to_string();
        assert!(!entry.verify_hash());
    }

    #[test]
    fn test_length_prefixed_scheme_separates_ambiguous_inputs() {
        let mut a = sample_entry(1, None);
        a.action = "View|Patient".to_string();
        a.resource_type = String::new();

        let mut b = a.clone();
        b.action = "View".to_string();
        b.resource_type = "Patient|".to_string();

        // Both join to the same delimited string.
        assert_eq!(a.canonical_string(), b.canonical_string());

        a.hash_scheme = HashScheme::LengthPrefixed;
        b.hash_scheme = HashScheme::LengthPrefixed;
        assert_ne!(a.calculate_hash(), b.calculate_hash());
    }

    #[test]
    fn test_timestamp_round_trip() {
        let now = ledger_now();
        let text = format_timestamp(&now);
        assert_eq!(parse_timestamp(&text).unwrap(), now);
        assert!(text.ends_with('Z'));
    }

    #[test]
    fn test_enum_string_round_trips() {
        for class in [
            DataClassification::Phi,
            DataClassification::Confidential,
            DataClassification::Internal,
            DataClassification::Public,
        ] {
            assert_eq!(class.as_str().parse::<DataClassification>().unwrap(), class);
        }
        assert_eq!("Critical".parse::<RiskLevel>().unwrap(), RiskLevel::Critical);
        assert!("Severe".parse::<RiskLevel>().is_err());
        assert_eq!(serde_json::to_string(&ComplianceFlag::Hipaa).unwrap(), "\"HIPAA\"");
    }
}
