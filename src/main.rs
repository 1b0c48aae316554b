mod analyzer;
mod assets;
mod error;
mod loader;
mod logging;
mod models;
mod report;

use analyzer::DashboardAnalyzer;
use anyhow::{Context, Result};
use assets::{load_branding, BrandingAsset};
use clap::{Arg, ArgAction, Command};
use error::AssetError;
use loader::WorkbookLoader;
use models::{Config, Session, Table};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Directory name for a sheet when every sheet gets its own report folder.
fn sheet_directory_name(sheet: &str) -> String {
    let name = sheet.trim().replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
    if name.is_empty() {
        "sheet".to_string()
    } else {
        name
    }
}

/// Like [`sheet_directory_name`], with `_2`, `_3`, ... appended when two
/// sheets would otherwise share a folder.
fn unique_directory_name(sheet: &str, used: &mut HashSet<String>) -> String {
    let base = sheet_directory_name(sheet);
    let name = if used.contains(&base) {
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !used.contains(candidate))
            .unwrap_or_else(|| base.clone())
    } else {
        base
    };
    used.insert(name.clone());
    name
}

fn load_logo(config: &Config) -> Result<Option<BrandingAsset>> {
    let Some(logo_path) = config.logo_path.as_deref() else {
        return Ok(None);
    };

    match load_branding(Path::new(logo_path)) {
        Ok(asset) => Ok(Some(asset)),
        Err(AssetError::NotFound { path }) => {
            println!("⚠️  Logo not available: {}", path.display());
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("hr-dashboard")
        .version("0.1")
        .about("Nationality, missing-data and document-completeness statistics for employee workbooks")
        .arg(
            Arg::new("input")
                .value_name("WORKBOOK")
                .help("Workbook path or http(s) URL (xlsx, xls, ods, HTML export or CSV)")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("sheet")
                .short('s')
                .long("sheet")
                .value_name("NAME")
                .help("Sheet to analyze (defaults to the first sheet)")
                .conflicts_with("all-sheets"),
        )
        .arg(
            Arg::new("all-sheets")
                .long("all-sheets")
                .help("Analyze every sheet into its own output folder")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-sheets")
                .long("list-sheets")
                .help("Print sheet names and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory (overrides the configuration file)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (-v, -vv, -vvv)")
                .action(ArgAction::Count),
        )
        .get_matches();

    logging::init(matches.get_count("verbose"))?;

    let config_file = matches
        .get_one::<String>("config")
        .context("missing --config value")?;

    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration: {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default().save_to_file(config_file)?;
        println!(
            "⚠️  Please review the exclusion lists in {}, then run the program again.",
            config_file
        );
        return Ok(());
    };

    let input = matches
        .get_one::<String>("input")
        .context("missing WORKBOOK argument")?;

    let loader = WorkbookLoader::new()?;
    let dataset = if is_url(input) {
        println!("🌐 Fetching workbook from: {}", input);
        loader.load_url(input).await?
    } else {
        println!("📂 Reading workbook: {}", input);
        loader.load_file(Path::new(input))?
    };
    let session = Session::new(input.as_str(), dataset);

    if matches.get_flag("list-sheets") {
        for name in session.dataset.sheet_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let output_dir: PathBuf = matches
        .get_one::<String>("output")
        .map(String::as_str)
        .or(config.output_directory.as_deref())
        .unwrap_or("output")
        .into();

    let logo = load_logo(&config)?;
    let all_sheets = matches.get_flag("all-sheets");

    let targets: Vec<(&str, &Table)> = if all_sheets {
        session
            .dataset
            .sheets()
            .iter()
            .map(|(name, table)| (name.as_str(), table))
            .collect()
    } else {
        let requested = matches.get_one::<String>("sheet").map(String::as_str);
        vec![session.select_sheet(requested)?]
    };

    let mut failures = 0;
    let mut used_directories = HashSet::new();
    for (sheet, table) in targets {
        let sheet_dir = if all_sheets {
            output_dir.join(unique_directory_name(sheet, &mut used_directories))
        } else {
            output_dir.clone()
        };

        println!("\n🔍 Analyzing sheet: {} ({} rows)", sheet, table.len());
        let report = match DashboardAnalyzer::new(&config, sheet).run_pipeline(table) {
            Ok(report) => report,
            Err(e) if all_sheets => {
                println!("   ❌ Skipping sheet: {}", e);
                failures += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        report::clean_output_directory(&sheet_dir)?;
        report::write_reports(&report, &sheet_dir)?;
        if let Some(logo) = &logo {
            logo.copy_to(&sheet_dir)
                .with_context(|| format!("Failed to copy logo into {}", sheet_dir.display()))?;
        }

        report::print_summary(&report);
        println!("📄 Reports written to: {}", sheet_dir.display());
    }

    if failures > 0 {
        println!("\n⚠️  {} sheet(s) could not be analyzed", failures);
    }
    println!("\n✅ Analysis complete!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/staff.xlsx"));
        assert!(is_url("http://intranet/hr.xls"));
        assert!(!is_url("data/staff.xlsx"));
    }

    #[test]
    fn test_sheet_directory_name() {
        assert_eq!(sheet_directory_name("HR/2024"), "HR_2024");
        assert_eq!(sheet_directory_name(" الموارد "), "الموارد");
        assert_eq!(sheet_directory_name("  "), "sheet");
    }

    #[test]
    fn test_unique_directory_name_separates_colliding_sheets() {
        let mut used = HashSet::new();
        assert_eq!(unique_directory_name("HR/1", &mut used), "HR_1");
        assert_eq!(unique_directory_name("HR_1", &mut used), "HR_1_2");
        assert_eq!(unique_directory_name("HR:1", &mut used), "HR_1_3");
        assert_eq!(unique_directory_name("Finance", &mut used), "Finance");
    }

    #[test]
    fn test_load_logo_missing_falls_back() {
        let config = Config {
            logo_path: Some("/definitely/not/here/logo.png".to_string()),
            ..Config::default()
        };
        assert!(load_logo(&config).unwrap().is_none());
    }
}
