use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde_json::json;

use plugin_forms::{load_all, HeaderLayout, LoadConfig, Plugin, WriteConfig};

#[derive(Parser)]
#[command(name = "plugin-dump")]
#[command(about = "List the records and groups of master/plugin files")]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Re-serialize each file and compare with the bytes on disk
    #[arg(long)]
    check_roundtrip: bool,

    #[arg(long, value_enum, default_value_t = Layout::Auto)]
    layout: Layout,

    #[arg(long, default_value_t = 16)]
    max_depth: usize,

    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,

    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    Auto,
    Oblivion,
    Skyrim,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    let mut builder = LoadConfig::builder().max_depth(cli.max_depth);
    match cli.layout {
        Layout::Auto => {}
        Layout::Oblivion => builder = builder.layout(HeaderLayout::Oblivion),
        Layout::Skyrim => builder = builder.layout(HeaderLayout::Skyrim),
    }
    let config = builder.build();

    let results = load_all(&cli.files, &config).await;
    let mut failed = false;
    for (path, result) in cli.files.iter().zip(results) {
        let plugin = match result {
            Ok(plugin) => plugin,
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                failed = true;
                continue;
            }
        };
        let roundtrip = if cli.check_roundtrip {
            match check_roundtrip(&plugin, path) {
                Ok(same) => {
                    failed |= !same;
                    Some(same)
                }
                Err(e) => {
                    eprintln!("{}: {e}", path.display());
                    failed = true;
                    None
                }
            }
        } else {
            None
        };
        print_plugin(&plugin, path, cli.format, roundtrip);
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn check_roundtrip(plugin: &Plugin, path: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let original = std::fs::read(path)?;
    let written = plugin.to_bytes(&WriteConfig::default())?;
    Ok(original == written)
}

fn print_plugin(plugin: &Plugin, path: &Path, format: Format, roundtrip: Option<bool>) {
    let rows = plugin.display_rows();
    match format {
        Format::Json => {
            let doc = json!({
                "path": path.display().to_string(),
                "file_index": plugin.file_index(),
                "master": plugin.is_master(),
                "masters": plugin
                    .header_form()
                    .map(|h| h.masters().keys().cloned().collect::<Vec<_>>())
                    .unwrap_or_default(),
                "roundtrip": roundtrip,
                "rows": rows,
            });
            println!("{doc}");
        }
        Format::Text => {
            let kind = if plugin.is_master() { "master" } else { "plugin" };
            println!("== {} ({kind}, {} records)", path.display(), plugin.records().count());
            if let Some(header) = plugin.header_form() {
                println!("   version {:.2}, next id {:#x}", header.version(), header.next_id());
                for (index, name) in header.masters().keys().enumerate() {
                    println!("   master {index:02X} {name}");
                }
            }
            for row in &rows {
                let indent = "  ".repeat(row.depth);
                match row.form_id {
                    Some(id) => println!(
                        "{indent}{} {id:08X} size={} {}",
                        row.tag, row.size, row.label
                    ),
                    None => println!(
                        "{indent}{} size={} children={} {}",
                        row.tag, row.size, row.child_count, row.label
                    ),
                }
            }
            match roundtrip {
                Some(true) => println!("   roundtrip: identical"),
                Some(false) => println!("   roundtrip: DIFFERS"),
                None => {}
            }
        }
    }
}
