//! Compatibility checks, alternatives and OTC recommendations.

use crate::catalog::{Catalog, Interaction, Severity};
use crate::validators::normalize_symptom;
use serde::Serialize;
use std::collections::BTreeSet;

pub const NO_INTERACTIONS: &str = "No known interactions detected. Medication appears compatible.";
pub const MAJOR_INTERACTIONS: &str =
    "MAJOR INTERACTIONS DETECTED. Do not prescribe without consultation.";
pub const MODERATE_INTERACTIONS: &str =
    "Moderate interactions found. Monitor patient closely and consider alternatives.";
pub const MINOR_INTERACTIONS: &str =
    "Minor interactions present. Adjust dosage or timing as needed.";

#[derive(Debug, Clone, Serialize)]
pub struct Compatibility {
    pub new_medication: String,
    pub is_compatible: bool,
    pub interactions_found: usize,
    pub interactions: Vec<Interaction>,
    pub current_medications: Vec<String>,
    pub recommendation: &'static str,
}

impl Compatibility {
    pub fn has_major(&self) -> bool {
        self.interactions.iter().any(|i| i.severity == Severity::Major)
    }
}

pub fn recommendation(interactions: &[Interaction]) -> &'static str {
    match interactions.iter().map(|i| i.severity).max() {
        None => NO_INTERACTIONS,
        Some(Severity::Major) => MAJOR_INTERACTIONS,
        Some(Severity::Moderate) => MODERATE_INTERACTIONS,
        Some(Severity::Minor) => MINOR_INTERACTIONS,
    }
}

/// Check `new_medication` against the patient's current medications.
/// Only pairs involving the new medication count.
pub fn check_compatibility(catalog: &Catalog, current: &[String], new_medication: &str) -> Compatibility {
    let new_name = catalog.canonical_name(new_medication);
    let mut all = current.to_vec();
    all.push(new_name.clone());
    let interactions: Vec<Interaction> = catalog
        .check_interactions(&all)
        .into_iter()
        .filter(|i| i.drug1 == new_name || i.drug2 == new_name)
        .collect();
    Compatibility {
        recommendation: recommendation(&interactions),
        is_compatible: interactions.is_empty(),
        interactions_found: interactions.len(),
        new_medication: new_name,
        interactions,
        current_medications: current.to_vec(),
    }
}

/// Catalog medications of `category` not already taken and free of
/// interactions with the current ones.
pub fn safe_alternatives(catalog: &Catalog, current: &[String], category: &str) -> Vec<String> {
    catalog
        .by_category(category)
        .into_iter()
        .filter(|m| !current.iter().any(|c| c.eq_ignore_ascii_case(&m.name)))
        .filter(|m| current.iter().all(|c| catalog.interaction(c, &m.name).is_none()))
        .map(|m| m.name.clone())
        .collect()
}

/// OTC products for a normalized symptom.
pub fn otc_for_symptom(symptom: &str) -> &'static [&'static str] {
    match symptom {
        "headache" | "fever" | "sore_throat" => &["Acetaminophen", "Ibuprofen"],
        "cough" => &["Dextromethorphan"],
        "runny_nose" => &["Pseudoephedrine"],
        "nausea" => &["Bismuth subsalicylate"],
        "diarrhea" => &["Loperamide"],
        "allergies" => &["Cetirizine", "Loratadine"],
        _ => &[],
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OtcItem {
    pub medication: String,
    pub status: &'static str,
    pub interactions: Vec<Interaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtcReport {
    pub symptoms: Vec<String>,
    pub safe_otc_recommendations: Vec<OtcItem>,
    pub medications_with_warnings: Vec<OtcItem>,
    pub total_checked: usize,
    pub safe_count: usize,
}

pub fn recommend_otc(catalog: &Catalog, current: &[String], symptoms: &[String]) -> OtcReport {
    let candidates: BTreeSet<&'static str> = symptoms
        .iter()
        .flat_map(|s| otc_for_symptom(&normalize_symptom(s)).iter().copied())
        .collect();

    let mut safe = Vec::new();
    let mut warnings = Vec::new();
    for med in &candidates {
        let check = check_compatibility(catalog, current, med);
        if check.is_compatible {
            safe.push(OtcItem {
                medication: check.new_medication,
                status: "safe",
                interactions: Vec::new(),
            });
        } else {
            warnings.push(OtcItem {
                medication: check.new_medication,
                status: "warning",
                interactions: check.interactions,
            });
        }
    }

    OtcReport {
        symptoms: symptoms.to_vec(),
        total_checked: candidates.len(),
        safe_count: safe.len(),
        safe_otc_recommendations: safe,
        medications_with_warnings: warnings,
    }
}
