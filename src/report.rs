use crate::analyzer::{DashboardReport, MissingValueReport, NationalityReport};
use crate::models::Table;
use anyhow::{Context, Result};
use csv::Writer;
use std::fs;
use std::path::Path;

/// Column appended to the document-completeness exports.
pub const COMPLETE_FLAG_COLUMN: &str = "مكتمل؟";

const BLANK_LABEL: &str = "(blank)";

/// File stem of the branding logo copied next to the reports.
pub const LOGO_STEM: &str = "logo";

pub const REPORT_FILES: [&str; 7] = [
    "nationality.csv",
    "missing_citizens.csv",
    "missing_non_citizens.csv",
    "documents_complete.csv",
    "documents_incomplete.csv",
    "filtered_data.csv",
    "summary.txt",
];

fn format_percentage(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}%", v))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Writes every report for one sheet into `output_dir`.
pub fn write_reports(report: &DashboardReport, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    write_nationality_csv(&report.nationalities, &output_dir.join("nationality.csv"))?;
    write_missing_csv(&report.missing.citizens, &output_dir.join("missing_citizens.csv"))?;
    write_missing_csv(&report.missing.non_citizens, &output_dir.join("missing_non_citizens.csv"))?;
    write_table_csv(
        &report.completeness.complete,
        Some(true),
        &output_dir.join("documents_complete.csv"),
    )?;
    write_table_csv(
        &report.completeness.incomplete,
        Some(false),
        &output_dir.join("documents_incomplete.csv"),
    )?;
    write_table_csv(&report.filtered, None, &output_dir.join("filtered_data.csv"))?;
    fs::write(output_dir.join("summary.txt"), summary_text(report))?;

    tracing::info!(dir = %output_dir.display(), sheet = %report.sheet, "Reports written");
    Ok(())
}

fn write_nationality_csv(report: &NationalityReport, path: &Path) -> Result<()> {
    let mut writer = Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(["Nationality", "Count", "Percentage"])?;
    for entry in report {
        let count = entry.count.to_string();
        let percentage = format!("{:.1}", entry.percentage);
        writer.write_record([
            entry.nationality.as_deref().unwrap_or(BLANK_LABEL),
            count.as_str(),
            percentage.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn write_missing_csv(report: &MissingValueReport, path: &Path) -> Result<()> {
    let mut writer = Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(["Column", "Missing Count", "Missing Percentage"])?;
    for entry in report {
        let count = entry.missing_count.to_string();
        let percentage = format!("{:.1}", entry.missing_percentage);
        writer.write_record([entry.column.as_str(), count.as_str(), percentage.as_str()])?;
    }

    writer.flush()?;
    Ok(())
}

/// Dumps a table, optionally with a constant completeness flag column.
fn write_table_csv(table: &Table, complete_flag: Option<bool>, path: &Path) -> Result<()> {
    let mut writer = Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut header: Vec<&str> = table.columns().iter().map(String::as_str).collect();
    if complete_flag.is_some() {
        header.push(COMPLETE_FLAG_COLUMN);
    }
    writer.write_record(&header)?;

    let flag = complete_flag.map(|f| f.to_string());
    for row in table.rows() {
        let mut record: Vec<&str> = row.iter().map(|cell| cell.as_deref().unwrap_or("")).collect();
        if let Some(flag) = &flag {
            record.push(flag);
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn summary_text(report: &DashboardReport) -> String {
    let mut content = String::new();
    content.push_str(&format!("Employee Data Summary: {}\n", report.sheet));
    content.push_str("==========================================\n\n");

    let overview = &report.overview;
    content.push_str(&format!(
        "Employees: {}\n\
        Citizens: {} ({})\n\
        Non-citizens: {}\n\n",
        overview.total,
        overview.citizens,
        format_percentage(overview.citizen_percentage),
        overview.non_citizens,
    ));

    content.push_str("Nationalities:\n");
    if report.nationalities.is_empty() {
        content.push_str("   (not available)\n");
    }
    for entry in &report.nationalities {
        content.push_str(&format!(
            "   - {}: {} ({:.1}%)\n",
            entry.nationality.as_deref().unwrap_or(BLANK_LABEL),
            entry.count,
            entry.percentage
        ));
    }

    for (title, entries) in [
        ("Missing values (citizens)", &report.missing.citizens),
        ("Missing values (non-citizens)", &report.missing.non_citizens),
    ] {
        content.push_str(&format!("\n{}:\n", title));
        if entries.is_empty() {
            content.push_str("   none\n");
        }
        for entry in entries {
            content.push_str(&format!(
                "   - {}: {} ({:.1}%)\n",
                entry.column, entry.missing_count, entry.missing_percentage
            ));
        }
    }

    let summary = &report.completeness.summary;
    content.push_str("\nDocument completeness:\n");
    if summary.no_applicable_records() {
        content.push_str("   No applicable records.\n");
    } else {
        content.push_str(&format!(
            "   Eligible: {}\n   Complete: {} ({})\n   Incomplete: {} ({})\n",
            summary.eligible,
            summary.complete,
            format_percentage(summary.complete_percentage),
            summary.incomplete,
            format_percentage(summary.incomplete_percentage),
        ));
    }

    if !report.warnings.is_empty() {
        content.push_str("\nNotes:\n");
        for warning in &report.warnings {
            content.push_str(&format!("   - {}\n", warning));
        }
    }

    content
}

pub fn print_summary(report: &DashboardReport) {
    println!("\n📊 SUMMARY: {}", report.sheet);
    println!("==========\n");

    let overview = &report.overview;
    println!(
        "👥 Employees: {} (citizens: {}, {})",
        overview.total,
        overview.citizens,
        format_percentage(overview.citizen_percentage)
    );

    if report.nationalities.is_empty() {
        println!("🌍 Nationality breakdown not available");
    } else {
        println!("🌍 Nationalities:");
        for (i, entry) in report.nationalities.iter().enumerate() {
            println!(
                "   {}. {} - {} ({:.1}%)",
                i + 1,
                entry.nationality.as_deref().unwrap_or(BLANK_LABEL),
                entry.count,
                entry.percentage
            );
        }
    }

    println!(
        "\n🔎 Columns with missing values: {} (citizens), {} (non-citizens)",
        report.missing.citizens.len(),
        report.missing.non_citizens.len()
    );

    let summary = &report.completeness.summary;
    if summary.no_applicable_records() {
        println!("\nℹ️  No applicable records for document completeness.");
    } else {
        println!(
            "\n✅ Complete documentation: {} ({})",
            summary.complete,
            format_percentage(summary.complete_percentage)
        );
        println!(
            "⚠️  Incomplete documentation: {} ({})",
            summary.incomplete,
            format_percentage(summary.incomplete_percentage)
        );
    }
}

/// Removes report files left by a previous run.
pub fn clean_output_directory(output_dir: &Path) -> Result<()> {
    if !output_dir.exists() {
        return Ok(());
    }

    println!("🧹 Cleaning previous results...");

    for item in REPORT_FILES {
        let item_path = output_dir.join(item);
        if item_path.is_file() {
            fs::remove_file(&item_path)?;
            println!("   🗑️  Removed file: {}", item);
        }
    }

    // The copied logo keeps its source extension, which may differ between runs.
    for entry in fs::read_dir(output_dir)? {
        let item_path = entry?.path();
        let is_logo = item_path.file_stem().is_some_and(|stem| stem == LOGO_STEM);
        if is_logo && item_path.is_file() {
            fs::remove_file(&item_path)?;
            println!("   🗑️  Removed file: {}", item_path.display());
        }
    }

    Ok(())
}
