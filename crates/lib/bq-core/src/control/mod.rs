use std::{error::Error, fmt, sync::Arc};

use crate::warehouse::{Warehouse, WarehouseError};

pub mod catalog;
pub mod query;
pub mod smoke;

pub use smoke::{SmokeDatasetReport, SmokeReport, TableDescription};

#[derive(Debug)]
pub enum ControlError {
    InvalidInput(String),
    Warehouse(WarehouseError),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Warehouse(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ControlError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInput(_) => None,
            Self::Warehouse(err) => Some(err),
        }
    }
}

impl From<WarehouseError> for ControlError {
    fn from(err: WarehouseError) -> Self {
        Self::Warehouse(err)
    }
}

/// Administrative operations over a warehouse, one request per call.
pub struct WarehouseControlPlane<W: Warehouse> {
    warehouse: Arc<W>,
    dataset_filter: Option<String>,
}

impl<W: Warehouse> Clone for WarehouseControlPlane<W> {
    fn clone(&self) -> Self {
        Self {
            warehouse: self.warehouse.clone(),
            dataset_filter: self.dataset_filter.clone(),
        }
    }
}

impl<W: Warehouse> WarehouseControlPlane<W> {
    pub fn new(warehouse: W) -> Self {
        Self {
            warehouse: Arc::new(warehouse),
            dataset_filter: None,
        }
    }

    /// Restricts dataset listings to the dataset with exactly this id.
    #[must_use]
    pub fn with_dataset_filter(mut self, dataset_filter: Option<String>) -> Self {
        self.dataset_filter = dataset_filter
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn dataset_filter(&self) -> Option<&str> {
        self.dataset_filter.as_deref()
    }

    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }
}

pub(crate) fn require_identifier(value: &str, name: &str) -> Result<String, ControlError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ControlError::InvalidInput(format!("{name} is required")));
    }
    Ok(trimmed.to_string())
}
