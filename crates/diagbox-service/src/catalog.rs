//! Medication catalog and interaction lookup.
//!
//! Interactions are declared per medication and are symmetric: a pair
//! interacts when either side declares the other, at the higher severity.

use crate::error::ServiceResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SEED_CATALOG: &str = include_str!("seed/catalog.yaml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRule {
    /// Medication name, category (singular or plural) or substance.
    pub with: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub generic_name: String,
    pub category: String,
    #[serde(default)]
    pub dosage_forms: Vec<String>,
    #[serde(default)]
    pub side_effects: Vec<String>,
    #[serde(default)]
    pub interactions: Vec<InteractionRule>,
    #[serde(default)]
    pub is_otc: bool,
}

impl Medication {
    fn rule_for(&self, other: &str, other_category: Option<&str>) -> Option<&InteractionRule> {
        self.interactions
            .iter()
            .filter(|r| rule_matches(&r.with, other, other_category))
            .max_by_key(|r| r.severity)
    }
}

fn rule_matches(with: &str, name: &str, category: Option<&str>) -> bool {
    let with = with.trim().to_lowercase();
    if with == name.trim().to_lowercase() {
        return true;
    }
    match category {
        Some(cat) => {
            let cat = cat.to_lowercase();
            with == cat || with == format!("{cat}s")
        }
        None => false,
    }
}

/// An interacting pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interaction {
    pub drug1: String,
    pub drug2: String,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedPatient {
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(default)]
    pub medical_history: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    medications: Vec<Medication>,
    #[serde(default)]
    patients: Vec<SeedPatient>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    medications: Vec<Medication>,
    index: HashMap<String, usize>,
    seed_patients: Vec<SeedPatient>,
    edge_count: usize,
}

impl Catalog {
    /// The built-in catalog.
    pub fn seed() -> ServiceResult<Self> {
        Self::from_yaml(SEED_CATALOG)
    }

    pub fn from_yaml(yaml: &str) -> ServiceResult<Self> {
        let file: SeedFile = serde_yaml::from_str(yaml)?;
        let index = file
            .medications
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.to_lowercase(), i))
            .collect();
        let mut catalog = Self {
            medications: file.medications,
            index,
            seed_patients: file.patients,
            edge_count: 0,
        };
        let names: Vec<String> = catalog.medications.iter().map(|m| m.name.clone()).collect();
        catalog.edge_count = catalog.check_interactions(&names).len();
        Ok(catalog)
    }

    pub fn medications(&self) -> &[Medication] {
        &self.medications
    }

    pub fn seed_patients(&self) -> &[SeedPatient] {
        &self.seed_patients
    }

    pub fn len(&self) -> usize {
        self.medications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.medications.is_empty()
    }

    /// Interacting pairs among catalog medications.
    pub fn interaction_edges(&self) -> usize {
        self.edge_count
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Medication> {
        self.index
            .get(&name.trim().to_lowercase())
            .map(|&i| &self.medications[i])
    }

    /// Catalog spelling of `name`, or `name` itself when unknown.
    pub fn canonical_name(&self, name: &str) -> String {
        self.get(name)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| name.trim().to_string())
    }

    pub fn by_category(&self, category: &str) -> Vec<&Medication> {
        let category = category.trim().to_lowercase();
        self.medications
            .iter()
            .filter(|m| m.category.to_lowercase() == category)
            .collect()
    }

    /// Interaction between two medications, if any.
    pub fn interaction(&self, a: &str, b: &str) -> Option<Interaction> {
        if a.trim().eq_ignore_ascii_case(b.trim()) {
            return None;
        }
        let ma = self.get(a);
        let mb = self.get(b);
        let from_a = ma.and_then(|m| m.rule_for(b, mb.map(|x| x.category.as_str())));
        let from_b = mb.and_then(|m| m.rule_for(a, ma.map(|x| x.category.as_str())));
        let rule = match (from_a, from_b) {
            (Some(x), Some(y)) => Some(if y.severity > x.severity { y } else { x }),
            (x, y) => x.or(y),
        }?;
        let drug1 = self.canonical_name(a);
        let drug2 = self.canonical_name(b);
        let description = match &rule.note {
            Some(note) => format!("{drug1} + {drug2}: {note}"),
            None => format!("{drug1} interacts with {drug2}"),
        };
        Some(Interaction {
            drug1,
            drug2,
            severity: rule.severity,
            description,
        })
    }

    /// Every interacting pair in `names`, each pair once.
    pub fn check_interactions(&self, names: &[String]) -> Vec<Interaction> {
        let mut out = Vec::new();
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                if let Some(found) = self.interaction(a, b) {
                    out.push(found);
                }
            }
        }
        out
    }
}
