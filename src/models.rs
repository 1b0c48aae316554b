use crate::error::LoadError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Nationality value denoting local citizens.
    pub citizen_marker: String,
    /// Organizational units removed before any report is computed.
    pub excluded_departments: Vec<String>,
    // Several entries are spelling variants of one institution; matched exactly after trim.
    pub excluded_institutions: Vec<String>,
    pub allowed_education_levels: Vec<String>,
    /// Dropped from the citizen subset before profiling missing values.
    pub residency_columns: Vec<String>,
    /// A record is documented when all three are present.
    pub identifier_fields: [String; 3],
    pub output_directory: Option<String>,
    pub logo_path: Option<String>,
    pub columns: ColumnNames,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnNames {
    pub nationality: String,
    pub department: String,
    pub education_level: String,
    pub institution: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            nationality: "الجنسية".to_string(),
            department: "الدائرة".to_string(),
            education_level: "المستوى التعليمي".to_string(),
            institution: "المؤسسة التعليمية".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            citizen_marker: "إماراتي".to_string(),
            excluded_departments: vec![
                "HC.نادي عجمان للفروسية".to_string(),
                "PD.الشرطة المحلية لإمارة عجمان".to_string(),
                "RC.الديوان الأميري".to_string(),
            ],
            excluded_institutions: vec![
                "جامعة الامارات".to_string(),
                "كلية التقنية العيا -الشارقة".to_string(),
                "كلية التقنية العليا".to_string(),
                "كليات التقنية".to_string(),
                "كليات التقنية العيا".to_string(),
                "كليات التقنية العليا".to_string(),
                "كليات التقنية العليا-الشارقة".to_string(),
                "كليات التقية العليا".to_string(),
                "كلية التقنيات العليا".to_string(),
                "كليات التقنية العليا - الشارقة".to_string(),
                "كلية تقنيات العليا دبي".to_string(),
            ],
            allowed_education_levels: vec![
                "ماجستير".to_string(),
                "دكتوراه".to_string(),
                "بكالوريوس".to_string(),
                "إنجاز".to_string(),
                "دبلوم".to_string(),
                "دبلوم عالي".to_string(),
            ],
            residency_columns: vec![
                "رقم الإقامة".to_string(),
                "تاريخ إصدار الإقامة".to_string(),
                "تاريخ انتهاء الإقامة".to_string(),
                "مكان إصدار الإقامة".to_string(),
            ],
            identifier_fields: [
                "رقم المستند".to_string(),
                "رقم التحقق".to_string(),
                "رقم التصديق".to_string(),
            ],
            output_directory: Some("output".to_string()),
            logo_path: Some("logo.png".to_string()),
            columns: ColumnNames::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }
}

/// A single cell. `None` is a missing value.
pub type Cell = Option<String>;

/// One sheet: unique column names and rows aligned to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Builds a table, padding short rows with nulls and truncating long ones.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Returns a new table with only the rows matching `keep`.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[Cell]) -> bool,
    {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }

    /// Returns a new table without the named columns. Unknown names are ignored.
    pub fn drop_columns(&self, names: &[String]) -> Table {
        let kept: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !names.contains(&self.columns[i]))
            .collect();

        Table {
            columns: kept.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| kept.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }
}

/// Sheets of one upload, in workbook order.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    sheets: Vec<(String, Table)>,
}

impl Dataset {
    pub fn new(sheets: Vec<(String, Table)>) -> Self {
        Self { sheets }
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Looks a sheet up by exact name.
    pub fn sheet(&self, name: &str) -> Option<(&str, &Table)> {
        self.sheets
            .iter()
            .find(|(sheet, _)| sheet == name)
            .map(|(sheet, table)| (sheet.as_str(), table))
    }

    pub fn sheets(&self) -> &[(String, Table)] {
        &self.sheets
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

/// One loaded upload. Everything derived from it is recomputed per request.
#[derive(Debug, Clone)]
pub struct Session {
    pub source: String,
    pub dataset: Dataset,
}

impl Session {
    pub fn new(source: impl Into<String>, dataset: Dataset) -> Self {
        Self {
            source: source.into(),
            dataset,
        }
    }

    /// Picks a sheet by exact name, or the first sheet when none is given.
    pub fn select_sheet(&self, name: Option<&str>) -> Result<(&str, &Table), LoadError> {
        let found = match name {
            Some(name) => self.dataset.sheet(name),
            None => self
                .dataset
                .sheets()
                .first()
                .map(|(sheet, table)| (sheet.as_str(), table)),
        };

        found.ok_or_else(|| match name {
            Some(name) => LoadError::UnknownSheet {
                sheet: name.to_string(),
                available: self.dataset.sheet_names().join(", "),
            },
            None => LoadError::NoSheets {
                source_name: self.source.clone(),
            },
        })
    }
}

/// Rounds a percentage to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
