use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::criteria::FeatureValue;
use crate::error::ScreeningError;
use crate::patients::{Dataset, PatientRecord};

const ID_COLUMNS: [&str; 4] = ["patient_id", "patientid", "id", "patient"];

/// Loads a dataset from disk. `.json` files hold an array of patient records; anything
/// else is read as CSV with a header row.
pub fn load_dataset_file(path: &Path) -> Result<Dataset> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let dataset = if is_json {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed reading dataset: {}", path.display()))?;
        let patients: Vec<PatientRecord> = serde_json::from_str(&data)
            .with_context(|| format!("failed parsing dataset: {}", path.display()))?;
        Dataset::new(patients)?
    } else {
        let file = fs::File::open(path)
            .with_context(|| format!("failed opening dataset: {}", path.display()))?;
        read_csv_dataset(file).with_context(|| format!("failed parsing dataset: {}", path.display()))?
    };
    info!(path = %path.display(), patients = dataset.len(), "loaded patient dataset");
    Ok(dataset)
}

/// Reads CSV rows into patient records. The id column is matched case-insensitively,
/// blank cells are left out of the record and numeric cells become numbers.
pub fn read_csv_dataset<R: Read>(reader: R) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();
    let id_column = headers
        .iter()
        .position(|h| {
            let normalized = h.to_ascii_lowercase().replace([' ', '-'], "_");
            ID_COLUMNS.contains(&normalized.as_str())
        })
        .unwrap_or(0);

    let mut patients = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row?;
        let patient_id = row.get(id_column).unwrap_or_default().to_string();
        if patient_id.is_empty() {
            return Err(ScreeningError::MissingPatientId { row: idx + 1 }.into());
        }
        let mut patient = PatientRecord::new(patient_id);
        for (pos, (column, cell)) in headers.iter().zip(row.iter()).enumerate() {
            if pos == id_column {
                continue;
            }
            if let Some(value) = parse_cell(cell) {
                patient.features.insert(column.to_string(), value);
            }
        }
        patients.push(patient);
    }
    Ok(Dataset::new(patients)?)
}

pub fn parse_cell(cell: &str) -> Option<FeatureValue> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(FeatureValue::Numeric(v)),
        _ => Some(FeatureValue::Text(trimmed.to_string())),
    }
}
