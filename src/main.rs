use clap::{Args, Parser, Subcommand};
use questionnaire_bridge::cli;
use questionnaire_bridge::config::{
    StorageConfig, DEFAULT_DATABASE, DEFAULT_DATA_DIR, DEFAULT_TEMPLATE_RETENTION,
};
use questionnaire_bridge::service::Questionnaire;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qbridge")]
#[command(about = "Import, answer and export spreadsheet security questionnaires")]
#[command(long_about = "qbridge - spreadsheet questionnaire bridge

Imports a multi-tab questionnaire workbook into a local database, lets you
answer the questions, and writes the answers back into a copy of the
original workbook at the cells they came from.

COMMANDS:
  import     - Replace the stored questionnaire with a workbook
  export     - Write a completed copy of the template
  sheets     - List imported sheets
  questions  - List the questions of a sheet
  respond    - Answer a question
  templates  - List stored template versions
  mapping    - Show or save the sheet mapping

WARNING: import is destructive. Every stored answer is deleted before the
new workbook is read in.

EXAMPLES:
  qbridge import vendor-questionnaire.xlsx
  qbridge questions 2 --search data
  qbridge respond 14 \"Yes, annually\"
  qbridge export -o completed.xlsx")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    storage: StorageArgs,

    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StorageArgs {
    /// SQLite database file
    #[arg(long, global = true, env = "QBRIDGE_DATABASE", default_value = DEFAULT_DATABASE)]
    database: PathBuf,

    /// Directory holding the template mirror
    #[arg(long, global = true, env = "QBRIDGE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// YAML sheet mapping used instead of the built-in one
    #[arg(long, global = true, env = "QBRIDGE_MAPPING")]
    mapping: Option<PathBuf>,

    /// Template versions to keep (at least one); older ones are pruned on import
    #[arg(
        long,
        global = true,
        env = "QBRIDGE_KEEP_TEMPLATES",
        default_value_t = DEFAULT_TEMPLATE_RETENTION
    )]
    keep_templates: usize,
}

impl From<StorageArgs> for StorageConfig {
    fn from(args: StorageArgs) -> Self {
        StorageConfig {
            database_path: args.database,
            data_dir: args.data_dir,
            mapping_path: args.mapping,
            template_retention: args.keep_templates,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the stored questionnaire with a workbook (.xlsx, .xlsm, .xls, .ods)
    Import {
        /// Workbook to import
        file: PathBuf,
    },

    /// Write a completed copy of the template
    Export {
        /// Output file or directory (default: dated name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Template version to fill (default: latest)
        #[arg(long = "template", value_name = "VERSION")]
        version: Option<i64>,
    },

    /// List imported sheets
    Sheets,

    /// List the questions of a sheet with their answers
    Questions {
        /// Sheet id (see 'qbridge sheets')
        sheet_id: i64,

        /// Only questions whose title, description or text contains this
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Answer a question, replacing any previous answer
    Respond {
        /// Question id
        question_id: i64,

        /// Answer text
        text: String,
    },

    /// List stored template versions
    Templates,

    /// Show the sheet mapping, or save it as YAML for editing
    Mapping {
        /// Write the mapping to this file instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "questionnaire_bridge=debug,qbridge=debug"
    } else {
        "questionnaire_bridge=warn,qbridge=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = StorageConfig::from(cli.storage);
    let open = || Questionnaire::open(&config);

    match cli.command {
        Commands::Import { file } => cli::import(&open()?, &file, cli.verbose)?,
        Commands::Export { output, version } => cli::export(&open()?, output, version)?,
        Commands::Sheets => cli::sheets(&open()?)?,
        Commands::Questions { sheet_id, search } => cli::questions(&open()?, sheet_id, search)?,
        Commands::Respond { question_id, text } => cli::respond(&open()?, question_id, text)?,
        Commands::Templates => cli::templates(&open()?)?,
        Commands::Mapping { output } => cli::mapping(&config.load_registry()?, output)?,
    }

    Ok(())
}
