use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_studio_core::{
    Color, EditorSession, RunId, SessionError, TextAlign, TextFormat, TextRun,
};
use pdf_studio_engine::{DocumentHandle, DocumentStore, PageDescriptor, PageId, Rotation};
use pdf_studio_scheduler::{TaskPool, TaskPoolConfig};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "pdf-studio")]
#[command(about = "PDF Studio CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document info.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Merge documents into one, in argument order.
    Merge {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Reorder pages; pages not named keep their relative order at the end.
    Reorder {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// 1-based page numbers, comma separated (e.g. 3,1)
        #[arg(long, value_delimiter = ',', required = true)]
        order: Vec<u32>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete pages by 1-based page number.
    DeletePages {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        pages: Vec<u32>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Extract pages into a new document, in the order given.
    Extract {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        pages: Vec<u32>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Set the absolute rotation of one page.
    Rotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        page: u32,
        /// One of 0, 90, 180, 270
        #[arg(long)]
        angle: i64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the text runs of a page.
    TextRuns {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        page: u32,
        /// Only list runs matching this regex
        #[arg(long = "match", value_name = "REGEX")]
        pattern: Option<String>,
    },
    /// Replace one text run's content in place.
    EditText {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        page: u32,
        /// Run id as printed by text-runs (e.g. run-1-0)
        #[arg(long)]
        run: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        font: Option<String>,
        #[arg(long)]
        size: Option<f32>,
        #[arg(long)]
        bold: bool,
        #[arg(long)]
        italic: bool,
        /// Hex color like #cc0000
        #[arg(long)]
        color: Option<String>,
        /// One of left, center, right
        #[arg(long)]
        align: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Search and replace text across every page.
    ReplaceAll {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "REGEX")]
        pattern: String,
        #[arg(long)]
        replacement: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Serialize a document, optionally compressing streams.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        compress: bool,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    title: Option<String>,
    author: Option<String>,
    pages: Vec<PageDescriptor>,
}

#[derive(Debug, Serialize)]
struct RunOutput {
    id: String,
    page: u32,
    text: String,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    font_name: String,
    font_size: f32,
}

impl From<TextRun> for RunOutput {
    fn from(run: TextRun) -> Self {
        Self {
            id: run.id.to_string(),
            page: run.page,
            text: run.text,
            x: run.x,
            y: run.y,
            width: run.width,
            height: run.height,
            font_name: run.font_name,
            font_size: run.font_size,
        }
    }
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let _ = env_logger::try_init();
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Merge { files, output } => run_merge(&files, &output),
        Commands::Reorder {
            file,
            order,
            output,
        } => run_reorder(&file, &order, output.as_deref()),
        Commands::DeletePages {
            file,
            pages,
            output,
        } => run_delete(&file, &pages, output.as_deref()),
        Commands::Extract {
            file,
            pages,
            output,
        } => run_extract(&file, &pages, &output),
        Commands::Rotate {
            file,
            page,
            angle,
            output,
        } => run_rotate(&file, page, angle, output.as_deref()),
        Commands::TextRuns {
            file,
            page,
            pattern,
        } => run_text_runs(&file, page, pattern.as_deref()),
        Commands::EditText {
            file,
            page,
            run,
            text,
            font,
            size,
            bold,
            italic,
            color,
            align,
            output,
        } => run_edit_text(
            &file,
            page,
            &run,
            &text,
            font,
            size,
            bold,
            italic,
            color.as_deref(),
            align.as_deref(),
            output.as_deref(),
        ),
        Commands::ReplaceAll {
            file,
            pattern,
            replacement,
            output,
        } => run_replace_all(&file, &pattern, &replacement, output.as_deref()),
        Commands::Export {
            file,
            compress,
            output,
        } => run_export(&file, compress, &output),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    let (mut store, handle) = open_document(file)?;

    let metadata = store.metadata(handle)?;
    let pages = store.page_descriptors(handle)?;
    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count: metadata.page_count,
        title: metadata.title,
        author: metadata.author,
        pages,
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    store.release(handle)?;
    Ok(())
}

fn run_merge(files: &[PathBuf], output: &Path) -> Result<()> {
    let mut store = DocumentStore::new();
    let mut handles = Vec::with_capacity(files.len());

    for file in files {
        ensure_pdf_exists(file)?;
        let bytes = fs::read(file)?;
        let handle = store
            .load(&bytes)
            .with_context(|| format!("failed to open {}", file.display()))?;
        handles.push(handle);
    }

    let merged = store.merge_documents(&handles)?;
    write_document(&mut store, merged, output)?;
    println!("{}", output.display());
    Ok(())
}

fn run_reorder(file: &Path, order: &[u32], output: Option<&Path>) -> Result<()> {
    let (mut store, handle) = open_document(file)?;
    let ids = resolve_pages(&store, handle, order)?;

    store.reorder_pages(handle, &ids)?;

    let output = output_path(file, output);
    write_document(&mut store, handle, &output)?;
    println!("{}", output.display());
    Ok(())
}

fn run_delete(file: &Path, pages: &[u32], output: Option<&Path>) -> Result<()> {
    let (mut store, handle) = open_document(file)?;
    let ids = resolve_pages(&store, handle, pages)?;

    store.delete_pages(handle, &ids)?;

    let output = output_path(file, output);
    write_document(&mut store, handle, &output)?;
    println!("{}", output.display());
    Ok(())
}

fn run_extract(file: &Path, pages: &[u32], output: &Path) -> Result<()> {
    let (mut store, handle) = open_document(file)?;
    let ids = resolve_pages(&store, handle, pages)?;

    let extracted = store.extract_pages(handle, &ids)?;
    write_document(&mut store, extracted, output)?;
    println!("{}", output.display());
    Ok(())
}

fn run_rotate(file: &Path, page: u32, angle: i64, output: Option<&Path>) -> Result<()> {
    let (mut store, handle) = open_document(file)?;
    let rotation = Rotation::from_degrees(angle)?;
    let page_id = store.page_id_at(handle, page)?;

    store.rotate_page(handle, page_id, rotation)?;

    let output = output_path(file, output);
    write_document(&mut store, handle, &output)?;
    println!("{}", output.display());
    Ok(())
}

fn run_text_runs(file: &Path, page: u32, pattern: Option<&str>) -> Result<()> {
    let mut session = open_session(file)?;

    let runs = match pattern {
        Some(pattern) => match session.search_runs(pattern) {
            Ok(matches) => matches.into_iter().filter(|run| run.page == page).collect(),
            Err(SessionError::InvalidPattern(message)) => {
                // An invalid pattern is a validation problem, not a crash:
                // report it and match nothing.
                eprintln!("invalid search pattern: {message}");
                Vec::new()
            }
            Err(err) => return Err(err.into()),
        },
        None => session.text_runs(page)?,
    };

    let payload: Vec<RunOutput> = runs.into_iter().map(RunOutput::from).collect();
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_edit_text(
    file: &Path,
    page: u32,
    run: &str,
    text: &str,
    font: Option<String>,
    size: Option<f32>,
    bold: bool,
    italic: bool,
    color: Option<&str>,
    align: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let run_id = RunId::from_str(run).map_err(anyhow::Error::msg)?;
    let format = TextFormat {
        font_family: font,
        font_size: size,
        bold,
        italic,
        color: color.map(|hex| {
            let (r, g, b) = Color::from_hex(hex).to_normalized();
            [r, g, b]
        }),
        align: parse_align(align)?,
    };

    let mut session = open_session(file)?;
    session.replace_text_runs(page, &[(run_id, text.to_string())], &format)?;

    let output = output_path(file, output);
    let bytes = session.export_pdf(false)?;
    fs::write(&output, bytes)?;
    println!("{}", output.display());
    Ok(())
}

fn run_replace_all(
    file: &Path,
    pattern: &str,
    replacement: &str,
    output: Option<&Path>,
) -> Result<()> {
    let mut session = open_session(file)?;

    let replaced = match session.replace_all(pattern, replacement) {
        Ok(replaced) => replaced,
        Err(SessionError::InvalidPattern(message)) => {
            eprintln!("invalid search pattern: {message}");
            0
        }
        Err(err) => return Err(err.into()),
    };

    let output = output_path(file, output);
    let bytes = session.export_pdf(false)?;
    fs::write(&output, bytes)?;
    println!("replaced {replaced} occurrence(s) -> {}", output.display());
    Ok(())
}

fn run_export(file: &Path, compress: bool, output: &Path) -> Result<()> {
    let mut session = open_session(file)?;

    let bytes = if compress {
        session.compress_to_bytes()?
    } else {
        session.export_pdf(false)?
    };

    fs::write(output, bytes)?;
    println!("{}", output.display());
    Ok(())
}

fn open_document(file: &Path) -> Result<(DocumentStore, DocumentHandle)> {
    ensure_pdf_exists(file)?;
    let bytes = fs::read(file)?;
    let mut store = DocumentStore::new();
    let handle = store
        .load(&bytes)
        .with_context(|| format!("failed to open {}", file.display()))?;
    Ok((store, handle))
}

fn open_session(file: &Path) -> Result<EditorSession> {
    ensure_pdf_exists(file)?;
    let bytes = fs::read(file)?;
    let pool = Arc::new(TaskPool::new(TaskPoolConfig::default()));
    let mut session = EditorSession::new(pool);

    let name = file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document.pdf");
    session
        .open_bytes(&bytes, name)
        .with_context(|| format!("failed to open {}", file.display()))?;
    Ok(session)
}

/// Resolve 1-based page numbers to stable page ids
fn resolve_pages(
    store: &DocumentStore,
    handle: DocumentHandle,
    pages: &[u32],
) -> Result<Vec<PageId>> {
    pages
        .iter()
        .map(|&page| store.page_id_at(handle, page).map_err(Into::into))
        .collect()
}

fn parse_align(align: Option<&str>) -> Result<TextAlign> {
    match align {
        None | Some("left") => Ok(TextAlign::Left),
        Some("center") => Ok(TextAlign::Center),
        Some("right") => Ok(TextAlign::Right),
        Some(other) => anyhow::bail!("unknown alignment {other:?} (expected left/center/right)"),
    }
}

fn write_document(store: &mut DocumentStore, handle: DocumentHandle, output: &Path) -> Result<()> {
    let bytes = store.serialize(handle)?;
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output, bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(())
}

fn output_path(file: &Path, output: Option<&Path>) -> PathBuf {
    if let Some(output) = output {
        return output.to_path_buf();
    }

    let stem = file
        .file_stem()
        .and_then(|name| name.to_str())
        .unwrap_or("document");
    file.with_file_name(format!("{stem}-edited.pdf"))
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }
    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }
    Ok(())
}
