//! Risk Classification
//!
//! Pure lookups mapping a resource type and action to a data
//! classification, a risk level and the applicable compliance regimes.
//! Unknown inputs fall through to the least sensitive defaults; nothing
//! here can fail.

use std::collections::BTreeSet;

use crate::ledger::entry::{ComplianceFlag, DataClassification, RiskLevel};

/// Resource types holding protected health information.
pub const PHI_RESOURCE_TYPES: &[&str] = &[
    "Patient",
    "ClinicalExamination",
    "Prescription",
    "MedicalRecord",
    "LabReport",
    "Diagnosis",
];

pub fn classify(resource_type: &str) -> DataClassification {
    if PHI_RESOURCE_TYPES.contains(&resource_type) {
        DataClassification::Phi
    } else if ["User", "Role", "Permission"]
        .iter()
        .any(|marker| resource_type.contains(marker))
    {
        DataClassification::Confidential
    } else if ["System", "Configuration"]
        .iter()
        .any(|marker| resource_type.contains(marker))
    {
        DataClassification::Internal
    } else {
        DataClassification::Public
    }
}

/// Action rules are evaluated before the classification fallback.
pub fn risk_level(action: &str, resource_type: &str) -> RiskLevel {
    risk_level_for(action, classify(resource_type))
}

pub(crate) fn risk_level_for(action: &str, classification: DataClassification) -> RiskLevel {
    if action.contains("Delete") || action == "PermissionChange" {
        RiskLevel::High
    } else if action.contains("Update") || action.contains("Create") {
        RiskLevel::Medium
    } else if classification == DataClassification::Phi {
        RiskLevel::High
    } else {
        RiskLevel::Low
    }
}

pub fn compliance_flags(resource_type: &str) -> BTreeSet<ComplianceFlag> {
    compliance_flags_for(classify(resource_type))
}

pub(crate) fn compliance_flags_for(classification: DataClassification) -> BTreeSet<ComplianceFlag> {
    let mut flags = BTreeSet::from([ComplianceFlag::Soc2]);
    if classification == DataClassification::Phi {
        flags.insert(ComplianceFlag::Hipaa);
    }
    flags
}

/// Classification, risk and compliance tags for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub classification: DataClassification,
    pub risk_level: RiskLevel,
    pub compliance_flags: BTreeSet<ComplianceFlag>,
}

pub fn assess(action: &str, resource_type: &str) -> Assessment {
    let classification = classify(resource_type);
    Assessment {
        classification,
        risk_level: risk_level_for(action, classification),
        compliance_flags: compliance_flags_for(classification),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phi_resource_types() {
        for resource_type in PHI_RESOURCE_TYPES {
            assert_eq!(classify(resource_type), DataClassification::Phi);
        }
        // Exact match only; substrings of PHI types are not PHI.
        assert_eq!(classify("PatientPortalBanner"), DataClassification::Public);
    }

    #[test]
    fn test_substring_classifications() {
        assert_eq!(classify("UserAccount"), DataClassification::Confidential);
        assert_eq!(classify("RolePermission"), DataClassification::Confidential);
        assert_eq!(classify("SystemSetting"), DataClassification::Internal);
        assert_eq!(classify("TenantConfiguration"), DataClassification::Internal);
        assert_eq!(classify("Appointment"), DataClassification::Public);
        assert_eq!(classify(""), DataClassification::Public);
    }

    #[test]
    fn test_patient_action_scenario() {
        let actions = ["Create", "View", "Update", "Delete", "PermissionChange"];
        let expected = [
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::High,
        ];

        for (action, risk) in actions.iter().zip(expected) {
            let assessment = assess(action, "Patient");
            assert_eq!(assessment.classification, DataClassification::Phi);
            assert_eq!(assessment.risk_level, risk, "action {}", action);
        }
    }

    #[test]
    fn test_non_phi_reads_are_low_risk() {
        assert_eq!(risk_level("View", "Appointment"), RiskLevel::Low);
        assert_eq!(risk_level("Read", "UserAccount"), RiskLevel::Low);
        assert_eq!(risk_level("SoftDelete", "Appointment"), RiskLevel::High);
    }

    #[test]
    fn test_compliance_flags() {
        assert_eq!(
            compliance_flags("LabReport"),
            BTreeSet::from([ComplianceFlag::Soc2, ComplianceFlag::Hipaa])
        );
        assert_eq!(compliance_flags("Branch"), BTreeSet::from([ComplianceFlag::Soc2]));
    }
}
