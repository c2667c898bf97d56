use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use crate::database::{Database, OpenOptions};
use crate::export::{ExportDocument, TableSelector};
use crate::paged::PagedCache;
use crate::provider::TableProvider;
use crate::row::Value;
use crate::ui::tui;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Page size, page count, encoding and table count
    Info,
    /// List tables with their row counts
    Tables,
    /// Describe the columns of a table
    Columns { table: String },
    /// Describe the indexes of a table
    Indexes { table: String },
    /// Print rows of TABLE or TABLE/INDEX as tab-separated text
    Rows {
        selector: String,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Export tables as XML; with no selectors every table is exported
    Dump {
        selectors: Vec<String>,
        /// Merge into this file instead of writing to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Interactive terminal browser
    Browse,
}

pub fn execute(database_path: &Path, options: OpenOptions, command: Command) -> Result<()> {
    if command == Command::Browse {
        return tui::run_tui(database_path.to_path_buf(), options);
    }

    let db = Database::open(database_path, options)
        .with_context(|| format!("cannot open {}", database_path.display()))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute_on(&db, command, &mut out)
}

/// Run a non-interactive command against an open database.
pub fn execute_on<W: Write>(db: &Database, command: Command, out: &mut W) -> Result<()> {
    match command {
        Command::Info => handle_info(db, out),
        Command::Tables => handle_tables(db, out),
        Command::Columns { table } => handle_columns(db, &table, out),
        Command::Indexes { table } => handle_indexes(db, &table, out),
        Command::Rows {
            selector,
            start,
            count,
        } => handle_rows(db, &selector, start, count, out),
        Command::Dump { selectors, output } => handle_dump(db, &selectors, output.as_deref(), out),
        Command::Browse => anyhow::bail!("the browser needs a terminal"),
    }
}

fn handle_info<W: Write>(db: &Database, out: &mut W) -> Result<()> {
    writeln!(out, "database page size: {}", db.page_size())?;
    writeln!(out, "number of pages: {}", db.page_count())?;
    writeln!(out, "text encoding: {}", db.encoding().name())?;
    writeln!(out, "number of tables: {}", db.table_names()?.len())?;
    if db.recovered() {
        writeln!(out, "opened in recovery mode: journal ignored")?;
    }
    Ok(())
}

fn handle_tables<W: Write>(db: &Database, out: &mut W) -> Result<()> {
    for table in db.table_names()? {
        let rows = db
            .row_count(&table, None)
            .with_context(|| format!("cannot count rows of {}", table))?;
        writeln!(out, "{}\t{}", table, rows)?;
    }
    Ok(())
}

fn handle_columns<W: Write>(db: &Database, table: &str, out: &mut W) -> Result<()> {
    let columns = db.column_set(table)?;
    let infos = db.columns(table)?;
    for (descriptor, info) in columns.iter().zip(&infos) {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            descriptor.name,
            if info.declared_type.is_empty() { "-" } else { &info.declared_type },
            descriptor.column_type,
            descriptor.semantic_type
        )?;
    }
    Ok(())
}

fn handle_indexes<W: Write>(db: &Database, table: &str, out: &mut W) -> Result<()> {
    for index in db.index_info(table)? {
        let mut flags = Vec::new();
        if index.unique {
            flags.push("unique");
        }
        if index.partial {
            flags.push("partial");
        }
        if index.automatic {
            flags.push("automatic");
        }
        writeln!(
            out,
            "{}\t({})\tentries={}\tkeys={}\tcode_page={}\t{}",
            index.name,
            index.columns.join(", "),
            index.entries,
            index.unique_keys,
            index.code_page,
            flags.join(",")
        )?;
    }
    Ok(())
}

fn handle_rows<W: Write>(
    db: &Database,
    selector: &str,
    start: usize,
    count: usize,
    out: &mut W,
) -> Result<()> {
    let selector: TableSelector = selector.parse()?;
    let provider = TableProvider::new(db, &selector.table, selector.index.as_deref())?;
    let headers: Vec<String> = provider.columns().iter().map(|c| c.name.clone()).collect();
    writeln!(out, "{}", headers.join("\t"))?;

    let mut cache = PagedCache::new(provider);
    let end = start.saturating_add(count).min(cache.len()?);
    for i in start..end {
        let row = cache.get(i)?;
        let values: Vec<String> = row.values().iter().map(cell_text).collect();
        writeln!(out, "{}", values.join("\t"))?;
    }
    Ok(())
}

/// One-line rendering of a value for tab-separated output.
fn cell_text(value: &Option<Value>) -> String {
    let Some(value) = value else {
        return "NULL".to_string();
    };
    let mut text = String::new();
    for c in value.to_string().chars() {
        match c {
            '\t' => text.push_str("\\t"),
            '\n' => text.push_str("\\n"),
            '\r' => text.push_str("\\r"),
            c => text.push(c),
        }
    }
    text
}

fn handle_dump<W: Write>(
    db: &Database,
    selectors: &[String],
    output: Option<&Path>,
    out: &mut W,
) -> Result<()> {
    let selectors = selectors
        .iter()
        .map(|s| s.parse::<TableSelector>())
        .collect::<Result<Vec<_>, _>>()?;

    match output {
        None => {
            let mut document = ExportDocument::new();
            document.append_tables(db, &selectors)?;
            document.write_to(out)?;
        }
        Some(path) => {
            let mut file = fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .with_context(|| format!("cannot open {}", path.display()))?;
            let mut document = ExportDocument::load_or_empty(&mut file);
            let before = document.tables.len();
            document.append_tables(db, &selectors)?;
            document
                .rewrite(&mut file)
                .with_context(|| format!("cannot write {}", path.display()))?;
            info!(
                path = %path.display(),
                added = document.tables.len() - before,
                total = document.tables.len(),
                "wrote dump"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_text_keeps_rows_on_one_line() {
        assert_eq!(cell_text(&None), "NULL");
        assert_eq!(cell_text(&Some(Value::Text("a\tb\nc".into()))), "a\\tb\\nc");
        assert_eq!(cell_text(&Some(Value::Int32(-4))), "-4");
    }
}
