use std::collections::HashMap;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use github_wdc::models::TableRequest;
use github_wdc::{Config, ConnectionData, Connector, RowBuffer};

#[derive(Parser, Debug)]
#[command(name = "github-wdc")]
#[command(version = "0.1.0")]
#[command(about = "Fetch GitHub issues, pull requests or traffic as flat joinable tables")]
struct Args {
    /// Data type to fetch (issue, pr, traffic)
    #[arg(short, long)]
    data_type: String,

    /// Query relative to the API base, e.g. repos/acme/[api,web]/issues
    #[arg(short, long)]
    query: String,

    /// Tables to fetch (defaults to every table of the data type)
    #[arg(short, long)]
    table: Vec<String>,

    /// Stop after this many records per table
    #[arg(long)]
    max_rows: Option<usize>,

    /// Wall-clock budget per table, in minutes
    #[arg(long)]
    timeout: Option<f64>,

    /// Only issues carrying these labels (comma-separated)
    #[arg(long)]
    label_filter: Option<String>,

    /// Include closed issues and pull requests
    #[arg(long)]
    include_closed: bool,

    /// Only keep rows past this value of an incremental table's increment column
    #[arg(long)]
    since: Option<String>,

    /// Output format (json, text)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("github_wdc=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::from_env()?;
    let connection = ConnectionData::from_map(&connection_values(&args))?;

    let mut connector = Connector::from_config(&config, connection)?;
    connector.init().await?;
    let schema = connector.get_schema().await?;

    let tables: Vec<String> = if args.table.is_empty() {
        schema.table_ids().map(str::to_string).collect()
    } else {
        args.table.clone()
    };

    let pb = ProgressBar::new(tables.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tables {msg}")?
            .progress_chars("#>-"),
    );

    let mut buffer = RowBuffer::new();
    for table_id in &tables {
        pb.set_message(table_id.clone());

        let increment_column = schema
            .table(table_id)
            .and_then(|t| t.increment_column_id.clone());
        let request = match (increment_column, &args.since) {
            (Some(column), Some(since)) => TableRequest::incremental(table_id, column, since.as_str()),
            _ => TableRequest::new(table_id),
        };

        connector.get_data(&request, &mut buffer).await?;
        pb.inc(1);
    }
    pb.finish_with_message("done");

    connector.shutdown();

    output_tables(&buffer, &args)?;

    Ok(())
}

fn connection_values(args: &Args) -> HashMap<String, String> {
    let mut values = HashMap::new();
    values.insert("dataType".to_string(), args.data_type.clone());
    values.insert("query".to_string(), args.query.clone());
    values.insert("includeClosed".to_string(), args.include_closed.to_string());

    if let Some(max_rows) = args.max_rows {
        values.insert("maxNumberOfRows".to_string(), max_rows.to_string());
    }
    if let Some(timeout) = args.timeout {
        values.insert("timeout".to_string(), timeout.to_string());
    }
    if let Some(ref labels) = args.label_filter {
        values.insert("labelFilter".to_string(), labels.clone());
    }

    values
}

fn output_tables(buffer: &RowBuffer, args: &Args) -> anyhow::Result<()> {
    let output = match args.format.as_str() {
        "json" => serde_json::to_string_pretty(buffer)?,
        _ => format_text(buffer),
    };

    if let Some(ref path) = args.output {
        std::fs::write(path, &output)?;
        tracing::info!("Output written to: {}", path);
    } else {
        println!("{}", output);
    }

    Ok(())
}

fn format_text(buffer: &RowBuffer) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "\n=== {} rows across {} tables ===\n",
        buffer.total_rows(),
        buffer.tables().count()
    ));

    for (name, table) in buffer.tables() {
        output.push_str(&format!("\n{} ({} rows)\n", name, table.rows.len()));
        for header in &table.headers {
            output.push_str(&format!("  - {}: {}\n", header.name, header.data_type));
        }
    }

    output
}
