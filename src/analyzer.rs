use crate::error::{AnalysisError, EmptySubsetWarning, SchemaError, Subset};
use crate::models::{round1, Cell, Config, Table};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct NationalityCount {
    /// `None` groups rows whose nationality cell is empty.
    pub nationality: Option<String>,
    pub count: usize,
    /// Share of all rows, rounded to one decimal.
    pub percentage: f64,
}

pub type NationalityReport = Vec<NationalityCount>;

#[derive(Debug, Clone, PartialEq)]
pub struct MissingValue {
    pub column: String,
    pub missing_count: usize,
    pub missing_percentage: f64,
}

/// Only columns with at least one missing cell are listed.
pub type MissingValueReport = Vec<MissingValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct MissingValueProfile {
    pub citizen_rows: usize,
    pub non_citizen_rows: usize,
    pub citizens: MissingValueReport,
    pub non_citizens: MissingValueReport,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletenessSummary {
    pub eligible: usize,
    pub complete: usize,
    pub incomplete: usize,
    /// `None` when nothing was eligible.
    pub complete_percentage: Option<f64>,
    pub incomplete_percentage: Option<f64>,
}

impl CompletenessSummary {
    pub fn no_applicable_records(&self) -> bool {
        self.eligible == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletenessClassification {
    pub complete: Table,
    pub incomplete: Table,
    pub summary: CompletenessSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub total: usize,
    pub citizens: usize,
    pub non_citizens: usize,
    pub citizen_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardReport {
    pub sheet: String,
    /// The selected sheet after scope filtering.
    pub filtered: Table,
    pub overview: Overview,
    pub nationalities: NationalityReport,
    pub missing: MissingValueProfile,
    pub completeness: CompletenessClassification,
    pub warnings: Vec<EmptySubsetWarning>,
}

/// Removes rows whose `column` value is in `excluded`. Values are compared
/// exactly, without trimming. A table lacking the column passes through.
pub fn scope_filter(table: &Table, column: &str, excluded: &[String]) -> Table {
    let Some(idx) = table.column_index(column) else {
        tracing::debug!(column, "Scope column absent; table left unchanged");
        return table.clone();
    };

    table.filter_rows(|row| match &row[idx] {
        Some(value) => !excluded.contains(value),
        None => true,
    })
}

/// Counts rows per nationality, most frequent first. Ties keep first-seen order.
pub fn nationality_report(table: &Table, column: &str) -> NationalityReport {
    let Some(idx) = table.column_index(column) else {
        return Vec::new();
    };
    if table.is_empty() {
        return Vec::new();
    }

    let mut positions: HashMap<Option<&str>, usize> = HashMap::new();
    let mut counts: Vec<(Option<&str>, usize)> = Vec::new();
    for row in table.rows() {
        let key = row[idx].as_deref();
        match positions.get(&key) {
            Some(&pos) => counts[pos].1 += 1,
            None => {
                positions.insert(key, counts.len());
                counts.push((key, 1));
            }
        }
    }

    // stable: equal counts stay in first-seen order
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let total = table.len() as f64;
    counts
        .into_iter()
        .map(|(nationality, count)| NationalityCount {
            nationality: nationality.map(str::to_string),
            count,
            percentage: round1(count as f64 / total * 100.0),
        })
        .collect()
}

/// Per-column null counts for `table`, skipping columns with none missing.
pub fn missing_value_report(table: &Table) -> MissingValueReport {
    if table.is_empty() {
        return Vec::new();
    }

    let size = table.len() as f64;
    table
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(idx, column)| {
            let missing_count = table.rows().iter().filter(|row| row[idx].is_none()).count();
            (missing_count > 0).then(|| MissingValue {
                column: column.clone(),
                missing_count,
                missing_percentage: missing_count as f64 / size * 100.0,
            })
        })
        .collect()
}

/// Splits rows on `nationality == citizen_marker` and profiles missing values
/// in each half. Residency columns are dropped from the citizen half only.
pub fn missing_value_profile(
    table: &Table,
    nationality_column: &str,
    citizen_marker: &str,
    citizen_excluded_columns: &[String],
) -> MissingValueProfile {
    let Some(idx) = table.column_index(nationality_column) else {
        return MissingValueProfile {
            citizen_rows: 0,
            non_citizen_rows: 0,
            citizens: Vec::new(),
            non_citizens: Vec::new(),
        };
    };

    let is_citizen = |row: &[Cell]| row[idx].as_deref() == Some(citizen_marker);
    let citizens = table
        .filter_rows(|row| is_citizen(row))
        .drop_columns(citizen_excluded_columns);
    let non_citizens = table.filter_rows(|row| !is_citizen(row));

    MissingValueProfile {
        citizen_rows: citizens.len(),
        non_citizen_rows: non_citizens.len(),
        citizens: missing_value_report(&citizens),
        non_citizens: missing_value_report(&non_citizens),
    }
}

fn trimmed(cell: &Cell) -> Option<&str> {
    cell.as_deref().map(str::trim)
}

/// Columns and value lists driving [`classify_completeness`].
#[derive(Debug, Clone, Copy)]
pub struct CompletenessRules<'a> {
    pub education_column: &'a str,
    pub institution_column: &'a str,
    pub allowed_levels: &'a [String],
    pub excluded_institutions: &'a [String],
    pub identifier_fields: &'a [String],
}

/// Keeps rows with an allowed education level from a non-excluded institution
/// (both compared after trimming), then splits them on whether every
/// identifier field is filled in.
///
/// A blank sheet (no header row, no data) has no applicable records rather
/// than a schema error.
pub fn classify_completeness(
    table: &Table,
    sheet: &str,
    rules: &CompletenessRules<'_>,
) -> Result<CompletenessClassification, SchemaError> {
    if table.columns().is_empty() && table.is_empty() {
        tracing::debug!(sheet, "Blank sheet; nothing to classify");
        return Ok(CompletenessClassification::default());
    }

    let required = |column: &str| {
        table.column_index(column).ok_or_else(|| SchemaError {
            column: column.to_string(),
            sheet: sheet.to_string(),
        })
    };
    let education_idx = required(rules.education_column)?;
    let institution_idx = required(rules.institution_column)?;

    let identifier_idx: Vec<Option<usize>> = rules
        .identifier_fields
        .iter()
        .map(|field| {
            let idx = table.column_index(field);
            if idx.is_none() {
                tracing::warn!(sheet, column = %field, "Identifier column absent; every row counts as incomplete");
            }
            idx
        })
        .collect();

    let eligible = table.filter_rows(|row| {
        let level_allowed = trimmed(&row[education_idx])
            .is_some_and(|level| rules.allowed_levels.iter().any(|allowed| allowed == level));
        let institution_excluded = trimmed(&row[institution_idx]).is_some_and(|institution| {
            rules
                .excluded_institutions
                .iter()
                .any(|excluded| excluded == institution)
        });
        level_allowed && !institution_excluded
    });

    let is_complete = |row: &[Cell]| {
        identifier_idx
            .iter()
            .all(|&idx| idx.is_some_and(|i| row[i].is_some()))
    };
    let complete = eligible.filter_rows(|row| is_complete(row));
    let incomplete = eligible.filter_rows(|row| !is_complete(row));

    let total = eligible.len();
    let share = |n: usize| (total > 0).then(|| round1(n as f64 / total as f64 * 100.0));
    let summary = CompletenessSummary {
        eligible: total,
        complete: complete.len(),
        incomplete: incomplete.len(),
        complete_percentage: share(complete.len()),
        incomplete_percentage: share(incomplete.len()),
    };

    Ok(CompletenessClassification {
        complete,
        incomplete,
        summary,
    })
}

pub fn overview(table: &Table, nationality_column: &str, citizen_marker: &str) -> Overview {
    let total = table.len();
    let citizens = table
        .column_index(nationality_column)
        .map(|idx| {
            table
                .rows()
                .iter()
                .filter(|row| row[idx].as_deref() == Some(citizen_marker))
                .count()
        });

    match citizens {
        Some(citizens) => Overview {
            total,
            citizens,
            non_citizens: total - citizens,
            citizen_percentage: (total > 0).then(|| round1(citizens as f64 / total as f64 * 100.0)),
        },
        None => Overview {
            total,
            citizens: 0,
            non_citizens: 0,
            citizen_percentage: None,
        },
    }
}

/// Runs every report over one sheet. Holds no state beyond the borrowed
/// configuration and the sheet name, so each call recomputes from scratch.
pub struct DashboardAnalyzer<'a> {
    pub config: &'a Config,
    pub sheet: &'a str,
}

impl<'a> DashboardAnalyzer<'a> {
    pub fn new(config: &'a Config, sheet: &'a str) -> Self {
        Self { config, sheet }
    }

    pub fn run_pipeline(&self, table: &Table) -> Result<DashboardReport, AnalysisError> {
        let config = self.config;
        let columns = &config.columns;
        let _span = tracing::info_span!("pipeline", sheet = self.sheet).entered();

        // Step 1: drop excluded organizational units
        let filtered = scope_filter(table, &columns.department, &config.excluded_departments);
        tracing::debug!(
            before = table.len(),
            after = filtered.len(),
            "Applied scope filter"
        );

        // Step 2: headline counts and nationality breakdown
        let overview = overview(&filtered, &columns.nationality, &config.citizen_marker);
        let nationalities = nationality_report(&filtered, &columns.nationality);
        if !filtered.has_column(&columns.nationality) {
            tracing::info!(column = %columns.nationality, "Nationality column absent; skipping nationality reports");
        }

        // Step 3: missing values per citizenship subset
        let missing = missing_value_profile(
            &filtered,
            &columns.nationality,
            &config.citizen_marker,
            &config.residency_columns,
        );
        tracing::debug!(
            citizens = missing.citizen_rows,
            non_citizens = missing.non_citizen_rows,
            "Profiled missing values"
        );

        // Step 4: document completeness over the eligible subset
        let rules = CompletenessRules {
            education_column: &columns.education_level,
            institution_column: &columns.institution,
            allowed_levels: &config.allowed_education_levels,
            excluded_institutions: &config.excluded_institutions,
            identifier_fields: &config.identifier_fields,
        };
        let completeness = classify_completeness(&filtered, self.sheet, &rules)?;
        tracing::debug!(
            eligible = completeness.summary.eligible,
            complete = completeness.summary.complete,
            "Classified document completeness"
        );

        let warnings = self.collect_warnings(&filtered, &missing, &completeness.summary);
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        Ok(DashboardReport {
            sheet: self.sheet.to_string(),
            filtered,
            overview,
            nationalities,
            missing,
            completeness,
            warnings,
        })
    }

    fn collect_warnings(
        &self,
        filtered: &Table,
        missing: &MissingValueProfile,
        summary: &CompletenessSummary,
    ) -> Vec<EmptySubsetWarning> {
        let mut empty = Vec::new();
        if filtered.is_empty() {
            empty.push(Subset::Table);
        }
        if filtered.has_column(&self.config.columns.nationality) {
            if missing.citizen_rows == 0 {
                empty.push(Subset::Citizens);
            }
            if missing.non_citizen_rows == 0 {
                empty.push(Subset::NonCitizens);
            }
        }
        if summary.no_applicable_records() {
            empty.push(Subset::Eligible);
        }

        empty
            .into_iter()
            .map(|subset| EmptySubsetWarning {
                sheet: self.sheet.to_string(),
                subset,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NATIONALITY: &str = "الجنسية";
    const UNIT: &str = "الدائرة";
    const LEVEL: &str = "المستوى التعليمي";
    const INSTITUTION: &str = "المؤسسة التعليمية";
    const DOC: &str = "رقم المستند";
    const VERIFY: &str = "رقم التحقق";
    const CERT: &str = "رقم التصديق";

    fn s(v: &str) -> Cell {
        Some(v.to_string())
    }

    fn table(columns: &[&str], rows: Vec<Vec<Cell>>) -> Table {
        Table::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    fn single_column(column: &str, values: &[&str]) -> Table {
        table(&[column], values.iter().map(|v| vec![s(v)]).collect())
    }

    fn rules<'a>(config: &'a Config) -> CompletenessRules<'a> {
        CompletenessRules {
            education_column: &config.columns.education_level,
            institution_column: &config.columns.institution,
            allowed_levels: &config.allowed_education_levels,
            excluded_institutions: &config.excluded_institutions,
            identifier_fields: &config.identifier_fields,
        }
    }

    fn staff_table() -> Table {
        table(
            &[NATIONALITY, UNIT, LEVEL, INSTITUTION, DOC, VERIFY, CERT, "رقم الإقامة"],
            vec![
                vec![s("إماراتي"), s("FIN.المالية"), s("بكالوريوس"), s("جامعة عجمان"), s("1"), s("2"), s("3"), None],
                vec![s("هندي"), s("FIN.المالية"), s(" ماجستير "), s("كليات التقنية "), s("1"), s("2"), s("3"), s("784")],
                vec![s("إماراتي"), s("RC.الديوان الأميري"), s("بكالوريوس"), s("جامعة عجمان"), s("1"), None, s("3"), None],
                vec![s("مصري"), s("HR.الموارد البشرية"), s("دكتوراه"), None, None, s("2"), s("3"), None],
                vec![None, s("HR.الموارد البشرية"), s("ثانوية"), s("مدرسة"), None, None, None, None],
            ],
        )
    }

    #[test]
    fn test_nationality_report_counts_and_percentages() {
        let report = nationality_report(&single_column(NATIONALITY, &["A", "B", "A", "A"]), NATIONALITY);
        assert_eq!(
            report,
            vec![
                NationalityCount { nationality: Some("A".to_string()), count: 3, percentage: 75.0 },
                NationalityCount { nationality: Some("B".to_string()), count: 1, percentage: 25.0 },
            ]
        );
    }

    #[test]
    fn test_nationality_report_ties_keep_first_seen_order() {
        let report = nationality_report(&single_column(NATIONALITY, &["C", "B", "B", "C", "A"]), NATIONALITY);
        let order: Vec<_> = report.iter().map(|r| r.nationality.as_deref().unwrap()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_nationality_counts_sum_to_rows() {
        let table = staff_table();
        let report = nationality_report(&table, NATIONALITY);
        assert_eq!(report.iter().map(|r| r.count).sum::<usize>(), table.len());
        let pct: f64 = report.iter().map(|r| r.percentage).sum();
        assert!((pct - 100.0).abs() <= 0.1 * report.len() as f64);
        assert!(report.iter().any(|r| r.nationality.is_none()));
    }

    #[test]
    fn test_nationality_report_degrades_gracefully() {
        assert!(nationality_report(&single_column("other", &["x"]), NATIONALITY).is_empty());
        assert!(nationality_report(&table(&[NATIONALITY], vec![]), NATIONALITY).is_empty());
    }

    #[test]
    fn test_scope_filter_removes_exactly_excluded_rows() {
        let table = single_column(UNIT, &["A", "B", "A ", "C", "B"]);
        let excluded = vec!["B".to_string(), "A".to_string()];
        let filtered = scope_filter(&table, UNIT, &excluded);

        // "A " is not trimmed, so it survives
        let values: Vec<_> = filtered.rows().iter().map(|r| r[0].clone().unwrap()).collect();
        assert_eq!(values, vec!["A ", "C"]);
        let removed = table
            .rows()
            .iter()
            .filter(|r| excluded.contains(r[0].as_ref().unwrap()))
            .count();
        assert_eq!(filtered.len() + removed, table.len());
    }

    #[test]
    fn test_scope_filter_without_column_is_identity() {
        let table = single_column("other", &["B"]);
        assert_eq!(scope_filter(&table, UNIT, &["B".to_string()]), table);
    }

    #[test]
    fn test_missing_profile_splits_on_citizen_marker() {
        let config = Config::default();
        let profile = missing_value_profile(&staff_table(), NATIONALITY, "إماراتي", &config.residency_columns);

        assert_eq!(profile.citizen_rows, 2);
        assert_eq!(profile.non_citizen_rows, 3);
        // residency column is dropped for citizens even though it is empty there
        assert!(profile.citizens.iter().all(|m| m.column != "رقم الإقامة"));
        assert_eq!(
            profile.citizens,
            vec![MissingValue { column: VERIFY.to_string(), missing_count: 1, missing_percentage: 50.0 }]
        );
        let residency = profile
            .non_citizens
            .iter()
            .find(|m| m.column == "رقم الإقامة")
            .unwrap();
        assert_eq!(residency.missing_count, 2);
        assert!((residency.missing_percentage - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_report_never_lists_zero_counts() {
        let profile = missing_value_profile(&staff_table(), NATIONALITY, "إماراتي", &[]);
        for entry in profile.citizens.iter().chain(&profile.non_citizens) {
            assert!(entry.missing_count > 0);
        }
    }

    #[test]
    fn test_missing_profile_without_nationality_is_empty() {
        let profile = missing_value_profile(&single_column("x", &["1"]), NATIONALITY, "إماراتي", &[]);
        assert!(profile.citizens.is_empty());
        assert!(profile.non_citizens.is_empty());
    }

    #[test]
    fn test_classify_two_rows_one_missing_identifier() {
        let config = Config::default();
        let table = table(
            &[LEVEL, INSTITUTION, DOC, VERIFY, CERT],
            vec![
                vec![s("بكالوريوس"), s("جامعة عجمان"), s("1"), None, s("3")],
                vec![s("بكالوريوس"), s("جامعة عجمان"), s("1"), s("2"), s("3")],
            ],
        );
        let result = classify_completeness(&table, "Sheet1", &rules(&config)).unwrap();

        assert_eq!(result.summary.eligible, 2);
        assert_eq!(result.complete.rows(), &table.rows()[1..2]);
        assert_eq!(result.incomplete.rows(), &table.rows()[0..1]);
        assert_eq!(result.summary.complete_percentage, Some(50.0));
    }

    #[test]
    fn test_classify_trims_level_and_institution() {
        let config = Config::default();
        let result = classify_completeness(&staff_table(), "Sheet1", &rules(&config)).unwrap();

        // row 2 is excluded via trimmed "كليات التقنية", row 5 has a disallowed level
        assert_eq!(result.summary.eligible, 3);
        assert_eq!(result.summary.complete, 1);
        assert_eq!(result.summary.incomplete, 2);
        assert_eq!(result.summary.complete_percentage, Some(33.3));
        assert_eq!(result.summary.incomplete_percentage, Some(66.7));
    }

    #[test]
    fn test_classification_is_a_partition() {
        let config = Config::default();
        let result = classify_completeness(&staff_table(), "Sheet1", &rules(&config)).unwrap();
        let idx: Vec<usize> = config
            .identifier_fields
            .iter()
            .map(|f| result.complete.column_index(f).unwrap())
            .collect();

        for row in result.complete.rows() {
            assert!(idx.iter().all(|&i| row[i].is_some()));
        }
        for row in result.incomplete.rows() {
            assert!(idx.iter().any(|&i| row[i].is_none()));
            assert!(!result.complete.rows().contains(row));
        }
        assert_eq!(
            result.complete.len() + result.incomplete.len(),
            result.summary.eligible
        );
    }

    #[test]
    fn test_classify_requires_level_and_institution() {
        let config = Config::default();
        let table = table(&[LEVEL, DOC], vec![vec![s("دبلوم"), s("1")]]);
        let err = classify_completeness(&table, "Finance", &rules(&config)).unwrap_err();
        assert_eq!(
            err,
            SchemaError { column: INSTITUTION.to_string(), sheet: "Finance".to_string() }
        );
    }

    #[test]
    fn test_classify_missing_identifier_column_marks_incomplete() {
        let config = Config::default();
        let table = table(&[LEVEL, INSTITUTION, DOC, VERIFY], vec![vec![s("دبلوم"), s("x"), s("1"), s("2")]]);
        let result = classify_completeness(&table, "Sheet1", &rules(&config)).unwrap();
        assert_eq!(result.summary.incomplete, 1);
    }

    #[test]
    fn test_overview_counts_citizens() {
        let result = overview(&staff_table(), NATIONALITY, "إماراتي");
        assert_eq!(result.total, 5);
        assert_eq!(result.citizens, 2);
        assert_eq!(result.non_citizens, 3);
        assert_eq!(result.citizen_percentage, Some(40.0));
    }

    #[test]
    fn test_pipeline_applies_scope_filter_first() {
        let config = Config::default();
        let report = DashboardAnalyzer::new(&config, "Sheet1")
            .run_pipeline(&staff_table())
            .unwrap();

        assert_eq!(report.filtered.len(), 4);
        assert_eq!(report.overview.citizens, 1);
        assert_eq!(report.nationalities.iter().map(|n| n.count).sum::<usize>(), 4);
        assert_eq!(report.completeness.summary.eligible, 2);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_pipeline_on_empty_table() {
        let config = Config::default();
        let empty = table(&[NATIONALITY, UNIT, LEVEL, INSTITUTION, DOC, VERIFY, CERT], vec![]);
        let report = DashboardAnalyzer::new(&config, "Empty").run_pipeline(&empty).unwrap();

        assert!(report.nationalities.is_empty());
        assert!(report.missing.citizens.is_empty());
        assert!(report.missing.non_citizens.is_empty());
        assert!(report.completeness.summary.no_applicable_records());
        assert_eq!(report.completeness.summary.complete_percentage, None);
        assert!(report.warnings.iter().any(|w| w.subset == Subset::Eligible));
        assert!(report.warnings.iter().any(|w| w.subset == Subset::Table));
    }

    #[test]
    fn test_pipeline_on_blank_sheet_has_no_applicable_records() {
        let config = Config::default();
        let report = DashboardAnalyzer::new(&config, "Empty")
            .run_pipeline(&Table::default())
            .unwrap();

        assert!(report.completeness.summary.no_applicable_records());
        assert_eq!(report.completeness.summary.incomplete_percentage, None);
        assert!(report.warnings.iter().any(|w| w.subset == Subset::Eligible));
    }

    #[test]
    fn test_classify_header_only_sheet_still_requires_columns() {
        let config = Config::default();
        let table = table(&[NATIONALITY], vec![]);
        assert!(classify_completeness(&table, "Sheet1", &rules(&config)).is_err());
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let config = Config::default();
        let analyzer = DashboardAnalyzer::new(&config, "Sheet1");
        let table = staff_table();
        assert_eq!(
            analyzer.run_pipeline(&table).unwrap(),
            analyzer.run_pipeline(&table).unwrap()
        );
    }

    #[test]
    fn test_pipeline_surfaces_schema_error() {
        let config = Config::default();
        let err = DashboardAnalyzer::new(&config, "Sheet1")
            .run_pipeline(&single_column(NATIONALITY, &["A"]))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(SchemaError { ref column, .. }) if column == LEVEL));
    }
}
