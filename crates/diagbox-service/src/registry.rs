//! In-memory patient and prescription registry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct Patient {
    pub id: u64,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub medical_history: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Prescription {
    pub id: u64,
    pub patient_id: u64,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub prescribed_date: DateTime<Utc>,
    pub active: bool,
}

/// Fields of a new prescription.
#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub patient_id: u64,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
}

#[derive(Debug, Default)]
pub struct Registry {
    patients: BTreeMap<u64, Patient>,
    prescriptions: Vec<Prescription>,
    last_patient_id: u64,
    last_prescription_id: u64,
    uploads: u64,
}

impl Registry {
    pub fn add_patient(
        &mut self,
        name: &str,
        age: u32,
        gender: &str,
        medical_history: Vec<String>,
    ) -> Patient {
        self.last_patient_id += 1;
        let patient = Patient {
            id: self.last_patient_id,
            name: name.trim().to_string(),
            age,
            gender: gender.trim().to_string(),
            medical_history,
            created_at: Utc::now(),
        };
        self.patients.insert(patient.id, patient.clone());
        patient
    }

    pub fn patient(&self, id: u64) -> Option<&Patient> {
        self.patients.get(&id)
    }

    pub fn active_prescriptions(&self, patient_id: u64) -> Vec<&Prescription> {
        self.prescriptions
            .iter()
            .filter(|p| p.patient_id == patient_id && p.active)
            .collect()
    }

    /// Names of the patient's active medications, in prescription order.
    pub fn current_medications(&self, patient_id: u64) -> Vec<String> {
        self.active_prescriptions(patient_id)
            .into_iter()
            .map(|p| p.medication_name.clone())
            .collect()
    }

    pub fn add_prescription(&mut self, new: NewPrescription) -> Prescription {
        self.last_prescription_id += 1;
        let prescription = Prescription {
            id: self.last_prescription_id,
            patient_id: new.patient_id,
            medication_name: new.medication_name,
            dosage: new.dosage,
            frequency: new.frequency,
            duration: new.duration,
            prescribed_date: Utc::now(),
            active: true,
        };
        self.prescriptions.push(prescription.clone());
        prescription
    }

    pub fn record_upload(&mut self) {
        self.uploads += 1;
    }

    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    pub fn prescription_count(&self) -> usize {
        self.prescriptions.len()
    }

    pub fn upload_count(&self) -> u64 {
        self.uploads
    }
}
