//! Error types for loading and analysing employee workbooks.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning an upload into a [`crate::models::Dataset`].
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to read the input file.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to download the input.
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// The byte stream is not a workbook, HTML table export or delimited text.
    #[error("unsupported input format for {source_name}")]
    UnsupportedFormat { source_name: String },

    /// The workbook container could not be parsed.
    #[error("failed to parse workbook {source_name}: {message}")]
    Workbook {
        source_name: String,
        message: String,
    },

    /// Delimited text could not be parsed.
    #[error("failed to parse delimited text {source_name}: {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },

    /// The workbook parsed but contains no sheets.
    #[error("{source_name} contains no sheets")]
    NoSheets { source_name: String },

    /// The requested sheet does not exist.
    #[error("sheet '{sheet}' not found (available: {available})")]
    UnknownSheet { sheet: String, available: String },
}

/// A column a component cannot work without is absent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("required column '{column}' not found in sheet '{sheet}'")]
pub struct SchemaError {
    pub column: String,
    pub sheet: String,
}

/// Errors returned by the analysis pipeline.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Branding asset lookup failures. The caller picks the fallback.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read asset {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which derived subset came out empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    /// The selected sheet after scope filtering.
    Table,
    Citizens,
    NonCitizens,
    /// Rows eligible for the document-completeness check.
    Eligible,
}

/// Non-fatal notice that a subset had no rows, so its percentages are undefined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptySubsetWarning {
    pub sheet: String,
    pub subset: Subset,
}

impl fmt::Display for EmptySubsetWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.subset {
            Subset::Table => "no rows left after filtering",
            Subset::Citizens => "no citizen rows",
            Subset::NonCitizens => "no non-citizen rows",
            Subset::Eligible => "no applicable records",
        };
        write!(f, "{}: {}", self.sheet, what)
    }
}
