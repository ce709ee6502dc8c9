//! HTTP route handlers.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{ServiceError, ServiceResult};
use crate::medication::{self, Compatibility, OtcReport};
use crate::registry::{NewPrescription, Patient, Prescription};
use crate::server::AppState;
use crate::validators;

pub const SERVICE_NAME: &str = "Medical Diagnostic System";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
pub struct CreatePatient {
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(default)]
    pub medical_history: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MedicationCheck {
    pub patient_id: u64,
    pub medication_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AlternativesQuery {
    pub patient_id: u64,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct OtcRequest {
    pub patient_id: u64,
    pub symptoms: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrescribeRequest {
    pub patient_id: u64,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub filename: String,
    pub stored_as: String,
    pub size_bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelFile {
    pub name: String,
    pub size_bytes: u64,
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": format!("{SERVICE_NAME} API"),
        "version": VERSION,
        "docs": "/api/v1",
        "features": [
            "Patient Registry",
            "Medication Compatibility Checking",
            "Safe Alternative Lookup",
            "OTC Recommendation Engine",
            "Upload Storage",
            "Model Artifact Listing",
        ],
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": VERSION,
    }))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    let registry = state.registry.read().await;
    Json(json!({
        "total_patients": registry.patient_count(),
        "total_prescriptions": registry.prescription_count(),
        "total_uploads": registry.upload_count(),
        "catalog_size": state.catalog.len(),
        "interaction_edges": state.catalog.interaction_edges(),
    }))
}

pub async fn create_patient(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePatient>,
) -> ServiceResult<(StatusCode, Json<Patient>)> {
    validators::validate_patient(&req.name, req.age)?;
    let patient = state
        .registry
        .write()
        .await
        .add_patient(&req.name, req.age, &req.gender, req.medical_history);
    tracing::info!(patient_id = patient.id, "patient registered");
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ServiceResult<Json<Patient>> {
    state
        .registry
        .read()
        .await
        .patient(id)
        .cloned()
        .map(Json)
        .ok_or_else(|| patient_not_found(id))
}

pub async fn list_medications(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "total": state.catalog.len(),
        "medications": state.catalog.medications(),
    }))
}

pub async fn check_compatibility(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MedicationCheck>,
) -> ServiceResult<Json<Compatibility>> {
    let name = validators::validate_medication_name(&req.medication_name)?;
    let registry = state.registry.read().await;
    if registry.patient(req.patient_id).is_none() {
        return Err(patient_not_found(req.patient_id));
    }
    let current = registry.current_medications(req.patient_id);
    Ok(Json(medication::check_compatibility(&state.catalog, &current, name)))
}

pub async fn alternatives(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AlternativesQuery>,
) -> ServiceResult<Json<Value>> {
    let registry = state.registry.read().await;
    if registry.patient(q.patient_id).is_none() {
        return Err(patient_not_found(q.patient_id));
    }
    let current = registry.current_medications(q.patient_id);
    let alternatives = medication::safe_alternatives(&state.catalog, &current, &q.category);
    Ok(Json(json!({
        "patient_id": q.patient_id,
        "category": q.category,
        "alternatives": alternatives,
    })))
}

pub async fn recommend_otc(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OtcRequest>,
) -> ServiceResult<Json<OtcReport>> {
    let registry = state.registry.read().await;
    if registry.patient(req.patient_id).is_none() {
        return Err(patient_not_found(req.patient_id));
    }
    let current = registry.current_medications(req.patient_id);
    Ok(Json(medication::recommend_otc(&state.catalog, &current, &req.symptoms)))
}

pub async fn prescribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PrescribeRequest>,
) -> ServiceResult<(StatusCode, Json<Prescription>)> {
    let name = validators::validate_medication_name(&req.medication_name)?;
    let medication = state
        .catalog
        .get(name)
        .ok_or_else(|| ServiceError::NotFound(format!("Medication '{name}'")))?;

    let mut registry = state.registry.write().await;
    if registry.patient(req.patient_id).is_none() {
        return Err(patient_not_found(req.patient_id));
    }
    let current = registry.current_medications(req.patient_id);
    let check = medication::check_compatibility(&state.catalog, &current, &medication.name);
    if check.has_major() {
        let with: Vec<String> = check
            .interactions
            .iter()
            .filter(|i| i.severity == crate::catalog::Severity::Major)
            .map(|i| {
                if i.drug1 == check.new_medication {
                    i.drug2.clone()
                } else {
                    i.drug1.clone()
                }
            })
            .collect();
        tracing::warn!(patient_id = req.patient_id, medication = %check.new_medication, "prescription blocked");
        return Err(ServiceError::Conflict(format!(
            "Cannot prescribe {}: major interaction with {}",
            check.new_medication,
            with.join(", ")
        )));
    }

    let prescription = registry.add_prescription(NewPrescription {
        patient_id: req.patient_id,
        medication_name: medication.name.clone(),
        dosage: req.dosage,
        frequency: req.frequency,
        duration: req.duration,
    });
    tracing::info!(
        patient_id = req.patient_id,
        prescription_id = prescription.id,
        medication = %prescription.medication_name,
        "prescription created"
    );
    Ok((StatusCode::CREATED, Json(prescription)))
}

pub async fn patient_medications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ServiceResult<Json<Value>> {
    let registry = state.registry.read().await;
    if registry.patient(id).is_none() {
        return Err(patient_not_found(id));
    }
    let prescriptions: Vec<Value> = registry
        .active_prescriptions(id)
        .into_iter()
        .map(|p| {
            json!({
                "prescription_id": p.id,
                "medication_name": p.medication_name,
                "dosage": p.dosage,
                "frequency": p.frequency,
                "duration": p.duration,
                "prescribed_date": p.prescribed_date,
            })
        })
        .collect();
    Ok(Json(json!({ "patient_id": id, "prescriptions": prescriptions })))
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UploadQuery>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ServiceResult<(StatusCode, Json<UploadResponse>)> {
    let limit = state.config.max_upload_bytes;
    // The route's body limit stops reading one byte past `limit`.
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            let size = declared_length(&headers)
                .unwrap_or_else(|| usize::try_from(limit).unwrap_or(usize::MAX).saturating_add(1));
            return Err(ServiceError::PayloadTooLarge { size, limit });
        }
        Err(rejection) => return Err(ServiceError::BadRequest(rejection.body_text())),
    };
    if body.len() as u64 > limit {
        return Err(ServiceError::PayloadTooLarge {
            size: body.len(),
            limit,
        });
    }
    if body.is_empty() {
        return Err(ServiceError::BadRequest("Upload body is empty".into()));
    }
    let filename = validators::sanitize_filename(&q.filename)?;
    let id = uuid::Uuid::new_v4().to_string();
    let stored_as = format!("{id}_{filename}");
    let path = state.config.uploads_dir.join(&stored_as);
    tokio::fs::write(&path, &body).await?;

    state.registry.write().await.record_upload();
    tracing::info!(file = %path.display(), bytes = body.len(), "upload stored");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id,
            filename,
            stored_as,
            size_bytes: body.len(),
        }),
    ))
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> ServiceResult<Json<Value>> {
    let dir = &state.config.models_dir;
    let mut models = Vec::new();
    if dir.is_dir() {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                models.push(ModelFile {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size_bytes: meta.len(),
                });
            }
        }
    }
    models.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(json!({
        "models_dir": dir.display().to_string(),
        "models": models,
    })))
}

fn patient_not_found(id: u64) -> ServiceError {
    ServiceError::NotFound(format!("Patient {id}"))
}
