// src/cli.rs

use crate::config::{Config, LabelColor, PlacementConfig};
use crate::dataset::{self, LoadOptions, TabularDataset};
use crate::labels::{self, BadRowPolicy, ColumnRoles, MatchOrder};
use crate::pipeline::{self, NumberingOptions};
use crate::saved;
use crate::templates::{self, TemplateFit, TemplateStore};
use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_TOOL: &str = "Driver Run Sheet Processor";

#[derive(Parser)]
#[command(name = "runsheet_labels")]
#[command(about = "Number shipping labels with their delivery stop from a driver run sheet", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// App config file (missing file means defaults)
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Which table inside a workbook or archive to read.
#[derive(Args, Clone, Default)]
pub(crate) struct TableArgs {
    /// Worksheet name (default: first sheet)
    #[arg(long)]
    sheet: Option<String>,
    /// Member of a ZIP archive (default: the only CSV/Excel file in it)
    #[arg(long)]
    member: Option<String>,
}

impl From<&TableArgs> for LoadOptions {
    fn from(args: &TableArgs) -> Self {
        LoadOptions {
            sheet: args.sheet.clone(),
            member: args.member.clone(),
        }
    }
}

/// Placement overrides on top of the saved defaults.
#[derive(Args, Clone, Default)]
pub(crate) struct PlacementArgs {
    /// Font size in points (20-200)
    #[arg(long)]
    font_size: Option<u32>,
    /// Distance from the left edge in points (0-600)
    #[arg(long = "x")]
    x_position: Option<u32>,
    /// Distance down from the top edge in points (0-800)
    #[arg(long = "y")]
    y_offset: Option<u32>,
    /// Red, Black, Blue, Green or Orange
    #[arg(long)]
    color: Option<LabelColor>,
}

impl PlacementArgs {
    fn apply(&self, base: PlacementConfig) -> PlacementConfig {
        PlacementConfig {
            font_size: self.font_size.unwrap_or(base.font_size),
            x_position: self.x_position.unwrap_or(base.x_position),
            y_offset: self.y_offset.unwrap_or(base.y_offset),
            color: self.color.unwrap_or(base.color),
        }
        .clamped()
    }
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Load a run sheet or order list, trim it to a template, optionally save it.
    Process {
        input: PathBuf,
        #[command(flatten)]
        table: TableArgs,
        /// Apply a saved template
        #[arg(short, long)]
        template: Option<String>,
        /// Keep only these columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Keep rows whose "type" column is one of these (repeatable)
        #[arg(long = "type")]
        types: Vec<String>,
        /// Template store to use
        #[arg(long, default_value = DEFAULT_TOOL)]
        tool: String,
        /// Save the processed sheet under saved_files_dir
        #[arg(long)]
        save: bool,
        /// Base of the saved file name
        #[arg(long, default_value = "run_sheet")]
        base_name: String,
    },

    /// Manage column templates.
    Templates {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// List the worksheets of a workbook or the tables inside a ZIP archive.
    Sheets { input: PathBuf },

    /// List previously saved run sheets.
    Saved {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which columns look like stop number, order reference and driver.
    Detect {
        input: PathBuf,
        #[command(flatten)]
        table: TableArgs,
    },

    /// Stamp each label in a PDF with its stop number from a run sheet.
    Number {
        /// Label PDF
        labels: PathBuf,
        /// Run sheet (CSV, Excel or ZIP)
        run_sheet: PathBuf,
        #[command(flatten)]
        table: TableArgs,
        /// Column holding stop numbers (default: detected)
        #[arg(long)]
        stop_column: Option<String>,
        /// Column holding order references (default: detected)
        #[arg(long)]
        order_column: Option<String>,
        /// Column holding driver names (default: detected when --driver is set)
        #[arg(long)]
        driver_column: Option<String>,
        /// Only use rows for this driver
        #[arg(long)]
        driver: Option<String>,
        #[command(flatten)]
        placement: PlacementArgs,
        /// insertion | longest_first
        #[arg(long, value_parser = parse_match_order)]
        match_order: Option<MatchOrder>,
        /// Leave out rows with a malformed stop number instead of failing
        #[arg(long)]
        skip_bad_rows: bool,
        /// Where to write the numbered PDF (default: <labels>_numbered.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also store the placement values as the new defaults
        #[arg(long)]
        save_settings: bool,
        /// Output JSON report
        #[arg(long)]
        json: bool,
    },

    /// Show or change the default stop-number placement.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum TemplateAction {
    /// List templates; with --input, show how well each fits that file.
    List {
        #[arg(long, default_value = DEFAULT_TOOL)]
        tool: String,
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        table: TableArgs,
    },
    /// Create a template, or replace one with --update.
    Save {
        name: String,
        /// Columns to keep, in order (comma separated)
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
        #[arg(long, default_value = DEFAULT_TOOL)]
        tool: String,
        /// Overwrite an existing template
        #[arg(long)]
        update: bool,
        /// New name when updating
        #[arg(long, requires = "update")]
        rename: Option<String>,
    },
    /// Delete a template.
    Delete {
        name: String,
        #[arg(long, default_value = DEFAULT_TOOL)]
        tool: String,
    },
    /// Print a template's columns.
    Show {
        name: String,
        #[arg(long, default_value = DEFAULT_TOOL)]
        tool: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum SettingsAction {
    /// Print the current defaults.
    Show,
    /// Store new defaults; unset values keep their current setting.
    Save {
        #[command(flatten)]
        placement: PlacementArgs,
    },
}

fn parse_match_order(s: &str) -> Result<MatchOrder, String> {
    match s.trim().to_lowercase().replace('-', "_").as_str() {
        "insertion" => Ok(MatchOrder::Insertion),
        "longest_first" | "longest" => Ok(MatchOrder::LongestFirst),
        other => Err(format!("unknown match order '{other}' (expected insertion or longest_first)")),
    }
}

pub(crate) fn run(cli: Cli, cfg: &Config) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Process {
            input,
            table,
            template,
            columns,
            types,
            tool,
            save,
            base_name,
        } => {
            let mut data = dataset::load_table(&input, &(&table).into())?;
            let store = TemplateStore::new(&cfg.template_dir, &tool);
            if let Some(name) = template {
                let template = store.get(&name)?;
                info!(template = %name, fit = %TemplateFit::of(&template, data.columns()), "Applying template");
                data = templates::project(&data, &template.columns)?;
            }
            if !columns.is_empty() {
                data = templates::project(&data, &columns)?;
            }
            if !types.is_empty() {
                data = templates::filter_by_type(&data, &types);
            }

            print_table(&data)?;
            if save {
                let driver = saved::infer_driver_name(&data);
                let path = saved::save_processed(&data, &cfg.saved_files_dir, &base_name, driver.as_deref())?;
                println!("Saved to {}", path.display());
            }
        }

        Command::Templates { action } => run_templates(action, cfg)?,

        Command::Sheets { input } => {
            let is_zip = input
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
            let names = if is_zip {
                dataset::list_archive_members(&input)?
            } else {
                dataset::list_sheets(&input)?
            };
            for name in names {
                println!("{name}");
            }
        }

        Command::Saved { json } => {
            let files = saved::list_saved(&cfg.saved_files_dir)?;
            if json {
                let entries: Vec<serde_json::Value> = files
                    .iter()
                    .map(|p| {
                        serde_json::json!({
                            "path": p.display().to_string(),
                            "name": saved::display_name(p),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if files.is_empty() {
                println!("No saved run sheets in {}", cfg.saved_files_dir);
            } else {
                for path in &files {
                    println!("{}\t{}", saved::display_name(path), path.display());
                }
            }
        }

        Command::Detect { input, table } => {
            let data = dataset::load_table(&input, &(&table).into())?;
            match labels::detect_roles(&data) {
                Some(roles) => {
                    println!("Stop number column: {}", roles.stop_column);
                    println!("Order reference column: {}", roles.order_column);
                }
                None => println!("No columns to choose from"),
            }
            if let Some(column) = labels::detect_driver_column(&data) {
                let drivers = labels::driver_values(&data, &column)?;
                println!("Driver column: {column} ({} driver(s))", drivers.len());
                for driver in drivers {
                    println!("  {driver}");
                }
            }
        }

        Command::Number {
            labels: labels_path,
            run_sheet,
            table,
            stop_column,
            order_column,
            driver_column,
            driver,
            placement,
            match_order,
            skip_bad_rows,
            output,
            save_settings,
            json,
        } => {
            let data = dataset::load_table(&run_sheet, &(&table).into())?;
            let roles = resolve_roles(&data, stop_column, order_column, driver_column, driver)?;

            let placement = placement.apply(PlacementConfig::load(&cfg.settings_path)?);
            let options = NumberingOptions {
                bad_rows: if skip_bad_rows {
                    BadRowPolicy::Skip
                } else {
                    cfg.matching.bad_rows
                },
                match_order: match_order.unwrap_or(cfg.matching.order),
                placement,
            };

            let pdf_bytes = fs::read(&labels_path)?;
            let numbered = pipeline::number_labels(&pdf_bytes, &data, &roles, &options)?;
            // only a successful run may change the stored defaults
            if save_settings {
                placement.save(&cfg.settings_path)?;
            }
            let output = output.unwrap_or_else(|| numbered_path(&labels_path));
            fs::write(&output, &numbered.pdf)?;
            info!(path = %output.display(), "Wrote numbered labels");

            if json {
                let out = serde_json::json!({
                    "output": output.display().to_string(),
                    "roles": roles,
                    "report": numbered.report,
                    "pages": numbered.pages,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", numbered.report);
                println!("Wrote {}", output.display());
            }
        }

        Command::Settings { action } => match action {
            SettingsAction::Show => {
                let current = PlacementConfig::load(&cfg.settings_path)?;
                println!("font_size  = {}", current.font_size);
                println!("x_position = {}", current.x_position);
                println!("y_offset   = {}", current.y_offset);
                println!("color      = {}", current.color);
            }
            SettingsAction::Save { placement } => {
                let updated = placement.apply(PlacementConfig::load(&cfg.settings_path)?);
                updated.save(&cfg.settings_path)?;
                println!("Saved placement defaults to {}", cfg.settings_path);
            }
        },
    }
    Ok(())
}

fn run_templates(action: TemplateAction, cfg: &Config) -> Result<(), Box<dyn Error>> {
    match action {
        TemplateAction::List { tool, input, table } => {
            let store = TemplateStore::new(&cfg.template_dir, &tool);
            let columns = match input {
                Some(path) => Some(dataset::load_table(&path, &(&table).into())?.columns().to_vec()),
                None => None,
            };
            let all = store.load()?;
            if all.is_empty() {
                println!("No templates in {}", store.path().display());
            }
            for (name, template) in &all {
                match &columns {
                    Some(columns) => println!("{name}\t{}", TemplateFit::of(template, columns)),
                    None => println!("{name}\t{} column(s)", template.columns.len()),
                }
            }
        }
        TemplateAction::Save {
            name,
            columns,
            tool,
            update,
            rename,
        } => {
            let store = TemplateStore::new(&cfg.template_dir, &tool);
            if update {
                store.update(&name, rename.as_deref(), columns)?;
            } else {
                store.create(&name, columns)?;
            }
        }
        TemplateAction::Delete { name, tool } => {
            TemplateStore::new(&cfg.template_dir, &tool).delete(&name)?;
        }
        TemplateAction::Show { name, tool } => {
            let template = TemplateStore::new(&cfg.template_dir, &tool).get(&name)?;
            for column in template.columns {
                println!("{column}");
            }
        }
    }
    Ok(())
}

/// Explicit column choices win; anything left open comes from detection.
fn resolve_roles(
    data: &TabularDataset,
    stop_column: Option<String>,
    order_column: Option<String>,
    driver_column: Option<String>,
    driver: Option<String>,
) -> Result<ColumnRoles, Box<dyn Error>> {
    let (stop, order) = match (stop_column, order_column) {
        (Some(stop), Some(order)) => (stop, order),
        (stop, order) => {
            let detected = labels::detect_roles(data).ok_or("run sheet has no columns")?;
            info!(
                stop_column = %detected.stop_column,
                order_column = %detected.order_column,
                "Detected run sheet columns"
            );
            (
                stop.unwrap_or(detected.stop_column),
                order.unwrap_or(detected.order_column),
            )
        }
    };

    let mut roles = ColumnRoles::new(stop, order);
    if let Some(driver) = driver {
        let column = match driver_column {
            Some(column) => column,
            None => labels::detect_driver_column(data).ok_or("run sheet has no driver column")?,
        };
        roles = roles.with_driver(column, driver);
    }
    Ok(roles)
}

fn numbered_path(labels: &Path) -> PathBuf {
    let stem = labels
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "labels".to_string());
    labels.with_file_name(format!("{stem}_numbered.pdf"))
}

fn print_table(data: &TabularDataset) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(data.columns())?;
    for row in data.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::text_table;
    use pretty_assertions::assert_eq;
    use std::ffi::OsString;

    #[test]
    fn test_parse_number_command() {
        let cli = Cli::try_parse_from([
            "runsheet_labels",
            "number",
            "labels.pdf",
            "sheet.csv",
            "--x",
            "40",
            "--color",
            "blue",
            "--match-order",
            "longest-first",
            "--skip-bad-rows",
        ])
        .unwrap();
        let Command::Number {
            placement,
            match_order,
            skip_bad_rows,
            ..
        } = cli.command
        else {
            panic!("expected the number subcommand");
        };
        assert_eq!(match_order, Some(MatchOrder::LongestFirst));
        assert!(skip_bad_rows);
        assert_eq!(
            placement.apply(PlacementConfig::default()),
            PlacementConfig {
                x_position: 40,
                color: LabelColor::Blue,
                ..PlacementConfig::default()
            }
        );
    }

    #[test]
    fn test_placement_args_are_clamped() {
        let args = PlacementArgs {
            font_size: Some(1000),
            ..PlacementArgs::default()
        };
        assert_eq!(args.apply(PlacementConfig::default()).font_size, 200);
    }

    #[test]
    fn test_resolve_roles_fills_gaps() {
        let data = text_table(
            &["Driver", "Stop #", "Order ID"],
            &[&["Ann", "1", "A1"], &["Bob", "2", "B2"]],
        );
        let roles = resolve_roles(&data, None, Some("Order ID".into()), None, Some("Ann".into()))
            .unwrap();
        assert_eq!(
            roles,
            ColumnRoles::new("Stop #", "Order ID").with_driver("Driver", "Ann")
        );
    }

    #[test]
    fn test_failed_run_keeps_saved_settings() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            settings_path: dir.path().join("labels.toml").display().to_string(),
            ..Config::default()
        };
        let labels_pdf = dir.path().join("labels.pdf");
        fs::write(&labels_pdf, crate::pdf_labels::tests::label_pdf(&["Order A1"])).unwrap();
        let bad_sheet = dir.path().join("bad.csv");
        fs::write(&bad_sheet, "Stop,Order\nabc,A1\n").unwrap();
        let good_sheet = dir.path().join("good.csv");
        fs::write(&good_sheet, "Stop,Order\n4,A1\n").unwrap();

        let number = |sheet: &Path| {
            let mut args: Vec<OsString> = vec!["runsheet_labels".into(), "number".into()];
            args.push(labels_pdf.clone().into_os_string());
            args.push(sheet.as_os_str().to_owned());
            for flag in [
                "--stop-column",
                "Stop",
                "--order-column",
                "Order",
                "--font-size",
                "40",
                "--save-settings",
            ] {
                args.push(flag.into());
            }
            let cli = Cli::try_parse_from(args).unwrap();
            run(cli, &cfg)
        };

        assert!(number(&bad_sheet).is_err());
        assert!(!Path::new(&cfg.settings_path).exists());

        number(&good_sheet).unwrap();
        assert_eq!(PlacementConfig::load(&cfg.settings_path).unwrap().font_size, 40);
        assert!(dir.path().join("labels_numbered.pdf").exists());
    }

    #[test]
    fn test_numbered_path() {
        assert_eq!(
            numbered_path(Path::new("in/labels.pdf")),
            PathBuf::from("in/labels_numbered.pdf")
        );
    }
}
