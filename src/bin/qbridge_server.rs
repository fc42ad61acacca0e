//! Questionnaire API server binary

use clap::Parser;
use questionnaire_bridge::api::{run_api_server, ApiConfig};
use questionnaire_bridge::config::{
    StorageConfig, DEFAULT_DATABASE, DEFAULT_DATA_DIR, DEFAULT_TEMPLATE_RETENTION,
};
use questionnaire_bridge::service::Questionnaire;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "qbridge-server")]
#[command(version)]
#[command(about = "Questionnaire API server - HTTP access to import, answers and export")]
#[command(long_about = r#"
Questionnaire API server

Endpoints:
  - GET  /api/v1/sheets                    - Imported sheets
  - GET  /api/v1/sheets/:id/questions      - Questions of a sheet (?search=)
  - GET  /api/v1/questions/:id             - One question with its answer
  - POST /api/v1/questions/:id/response    - Save an answer
  - POST /api/v1/import                    - Import a workbook by path
  - GET  /api/v1/export                    - Download the completed workbook (?version=)
  - GET  /api/v1/templates                 - Stored template versions

Additional endpoints:
  - GET  /health           - Health check
  - GET  /version          - Server version info
  - GET  /                 - API documentation

Example usage:
  qbridge-server                           # Start on localhost:8080
  qbridge-server --host 0.0.0.0 --port 3000

  curl -X POST http://localhost:8080/api/v1/import \
    -H "Content-Type: application/json" \
    -d '{"file_path": "questionnaire.xlsx"}'
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "QBRIDGE_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "QBRIDGE_PORT")]
    port: u16,

    /// SQLite database file
    #[arg(long, env = "QBRIDGE_DATABASE", default_value = DEFAULT_DATABASE)]
    database: PathBuf,

    /// Directory holding the template mirror
    #[arg(long, env = "QBRIDGE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// YAML sheet mapping used instead of the built-in one
    #[arg(long, env = "QBRIDGE_MAPPING")]
    mapping: Option<PathBuf>,

    /// Template versions to keep (at least one); older ones are pruned on import
    #[arg(
        long,
        env = "QBRIDGE_KEEP_TEMPLATES",
        default_value_t = DEFAULT_TEMPLATE_RETENTION
    )]
    keep_templates: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "questionnaire_bridge=info,qbridge=info,tower_http=info".into()
            }),
        )
        .init();

    let storage = StorageConfig {
        database_path: args.database,
        data_dir: args.data_dir,
        mapping_path: args.mapping,
        template_retention: args.keep_templates,
    };
    let questionnaire = Arc::new(Questionnaire::open(&storage)?);

    let config = ApiConfig {
        host: args.host,
        port: args.port,
    };

    run_api_server(config, questionnaire).await
}
