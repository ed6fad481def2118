//! Operator CLI for the report template engine.
//!
//! Usage:
//!   reportkit [--config <file>] [--db <path>] <command>
//!
//! Examples:
//!   reportkit template create --title "Quarterly headcount"
//!   reportkit template add-table <template> --title Q1
//!   reportkit template add-entry <table> --axis row --title A
//!   reportkit report create --template <template> --date 2025-01-01
//!   reportkit report set-cell <report> --row <row> --column <column> --value 12
//!   reportkit report set-status <report> for_approval

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use log::error;
use reportkit_core::{
    init_logging, open_db_with_timeout, parse_report_date, Axis, NewEntry, NewGroup, NewReport,
    NewTable, ReportPatch, ReportService, ReportServiceOptions, ReportStatus, ReportkitConfig,
    SqliteReportRepository, SqliteTemplateRepository, TemplateListQuery, TemplateService,
};
use rusqlite::Connection;
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "reportkit")]
#[command(about = "Report templates, materialized report cells and their lifecycle")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides `storage.db_path`)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the core library is linked and print its version
    Ping,

    /// Author and inspect report templates
    #[command(subcommand)]
    Template(TemplateCommand),

    /// Create reports, edit cells and change status
    #[command(subcommand)]
    Report(ReportCommand),
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// List templates with their full table structure
    List {
        /// Keep only templates with this active flag
        #[arg(long)]
        active: Option<bool>,
    },
    /// Show one template with its full table structure
    Show { template: Uuid },
    /// Create a template
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Activate or deactivate a template
    SetActive {
        template: Uuid,
        #[arg(action = ArgAction::Set)]
        active: bool,
    },
    /// Add a table to a template
    AddTable {
        template: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        order: Option<u32>,
    },
    /// Add a row or column group to a table
    AddGroup {
        table: Uuid,
        #[command(flatten)]
        node: NodeArgs,
        /// Parent group on the same axis
        #[arg(long)]
        parent: Option<Uuid>,
    },
    /// Add a row or column entry to a table
    AddEntry {
        table: Uuid,
        #[command(flatten)]
        node: NodeArgs,
        /// Owning group on the same axis
        #[arg(long)]
        group: Option<Uuid>,
    },
    /// Move a group under another parent (omit --parent for top level)
    MoveGroup {
        group: Uuid,
        #[arg(long, value_enum)]
        axis: AxisArg,
        #[arg(long)]
        parent: Option<Uuid>,
    },
    /// Move an entry into another group (omit --group to detach)
    MoveEntry {
        entry: Uuid,
        #[arg(long, value_enum)]
        axis: AxisArg,
        #[arg(long)]
        group: Option<Uuid>,
    },
    /// Activate or deactivate an entry
    SetEntryActive {
        entry: Uuid,
        #[arg(long, value_enum)]
        axis: AxisArg,
        #[arg(action = ArgAction::Set)]
        active: bool,
    },
}

#[derive(Args)]
struct NodeArgs {
    #[arg(long, value_enum)]
    axis: AxisArg,
    #[arg(long)]
    title: String,
    /// Explicit sibling order (appended after existing siblings when omitted)
    #[arg(long)]
    order: Option<u32>,
}

#[derive(Subcommand)]
enum ReportCommand {
    /// Create a draft report and materialize its cells
    Create {
        #[arg(long)]
        template: Uuid,
        /// Report date, YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long)]
        owner: Option<String>,
    },
    /// List reports
    List {
        #[arg(long)]
        template: Option<Uuid>,
    },
    /// Print every cell of a report
    Data { report: Uuid },
    /// Print a report as per-table row x column matrices
    Grid { report: Uuid },
    /// Create cells that are missing (safe to re-run)
    Materialize { report: Uuid },
    /// Change the report status
    SetStatus {
        report: Uuid,
        #[arg(value_enum)]
        status: StatusArg,
    },
    /// Change one cell value of a draft report
    SetCell {
        report: Uuid,
        #[arg(long)]
        row: Uuid,
        #[arg(long)]
        column: Uuid,
        #[arg(long, conflicts_with = "clear", required_unless_present = "clear")]
        value: Option<String>,
        /// Store a null value
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AxisArg {
    Row,
    Column,
}

impl From<AxisArg> for Axis {
    fn from(arg: AxisArg) -> Self {
        match arg {
            AxisArg::Row => Axis::Row,
            AxisArg::Column => Axis::Column,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Draft,
    #[value(name = "for_approval")]
    ForApproval,
    Approved,
}

impl From<StatusArg> for ReportStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Draft => ReportStatus::Draft,
            StatusArg::ForApproval => ReportStatus::ForApproval,
            StatusArg::Approved => ReportStatus::Approved,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult {
    if let Commands::Ping = cli.command {
        return print_json(&serde_json::json!({
            "ping": reportkit_core::ping(),
            "version": reportkit_core::core_version(),
        }));
    }

    let mut config = match &cli.config {
        Some(path) => ReportkitConfig::load(path)?,
        None => ReportkitConfig::default(),
    };
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }
    config.validate()?;
    init_logging(&config.logging)?;

    let conn = open_db_with_timeout(&config.storage.db_path, config.storage.busy_timeout_ms)?;
    match cli.command {
        Commands::Ping => Ok(()),
        Commands::Template(command) => cmd_template(&conn, command),
        Commands::Report(command) => cmd_report(&conn, &config, command),
    }
}

fn cmd_template(conn: &Connection, command: TemplateCommand) -> CliResult {
    let service = TemplateService::new(SqliteTemplateRepository::try_new(conn)?);
    match command {
        TemplateCommand::List { active } => {
            print_json(&service.list_templates(&TemplateListQuery { active })?)
        }
        TemplateCommand::Show { template } => print_json(&service.get_template_detail(template)?),
        TemplateCommand::Create { title, description } => {
            print_json(&service.create_template(&title, description.as_deref())?)
        }
        TemplateCommand::SetActive { template, active } => {
            service.set_template_active(template, active)?;
            print_json(&service.get_template(template)?)
        }
        TemplateCommand::AddTable {
            template,
            title,
            description,
            order,
        } => print_json(&service.create_table(&NewTable {
            template_uuid: template,
            title,
            description,
            order,
        })?),
        TemplateCommand::AddGroup {
            table,
            node,
            parent,
        } => print_json(&service.create_group(&NewGroup {
            table_uuid: table,
            axis: node.axis.into(),
            parent_uuid: parent,
            title: node.title,
            order: node.order,
        })?),
        TemplateCommand::AddEntry { table, node, group } => {
            print_json(&service.create_entry(&NewEntry {
                table_uuid: table,
                axis: node.axis.into(),
                group_uuid: group,
                title: node.title,
                order: node.order,
            })?)
        }
        TemplateCommand::MoveGroup {
            group,
            axis,
            parent,
        } => print_json(&service.move_group(axis.into(), group, parent)?),
        TemplateCommand::MoveEntry { entry, axis, group } => {
            print_json(&service.move_entry(axis.into(), entry, group)?)
        }
        TemplateCommand::SetEntryActive {
            entry,
            axis,
            active,
        } => {
            service.set_entry_active(axis.into(), entry, active)?;
            print_json(&serde_json::json!({ "entry": entry, "is_active": active }))
        }
    }
}

fn cmd_report(conn: &Connection, config: &ReportkitConfig, command: ReportCommand) -> CliResult {
    let service = ReportService::with_options(
        SqliteTemplateRepository::try_new(conn)?,
        SqliteReportRepository::try_new(conn)?,
        ReportServiceOptions {
            materialize: config.materialize,
            status_policy: config.lifecycle.status_policy,
        },
    );
    match command {
        ReportCommand::Create {
            template,
            date,
            owner,
        } => print_json(&service.create_report(&NewReport {
            template_uuid: template,
            date: parse_report_date(&date)?,
            owner,
        })?),
        ReportCommand::List { template } => print_json(&service.list_reports(template)?),
        ReportCommand::Data { report } => print_json(&service.get_report_data(report)?),
        ReportCommand::Grid { report } => print_json(&service.get_report_grid(report)?),
        ReportCommand::Materialize { report } => print_json(&service.materialize(report)?),
        ReportCommand::SetStatus { report, status } => {
            print_json(&service.update_report(report, &ReportPatch::status(status.into()))?)
        }
        ReportCommand::SetCell {
            report,
            row,
            column,
            value,
            clear,
        } => {
            let value = if clear { None } else { value };
            print_json(&service.update_cell(report, row, column, value.as_deref())?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
