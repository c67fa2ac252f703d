//! marimocad mesh interchange command line

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mcad_core::{FileFormat, ImportResult, MeshIo, MeshIoConfig, detect_format, validate_file};

#[derive(Parser)]
#[command(name = "mcad")]
#[command(about = "Detect, validate and convert STEP/STL/OBJ files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RON configuration file (import/export options)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the detected format of a file
    Detect { file: PathBuf },

    /// Check a file's structure without importing it
    Validate {
        file: PathBuf,

        /// Format the file is expected to have (step, stl, obj)
        #[arg(short, long)]
        expect: Option<FileFormat>,
    },

    /// Import a file and print what it contains
    Info {
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a file and export it again, possibly to another format
    Convert {
        input: PathBuf,
        output: PathBuf,

        /// Input format, detected when omitted
        #[arg(long)]
        from: Option<FileFormat>,

        /// Output format, taken from the output extension when omitted
        #[arg(short, long)]
        format: Option<FileFormat>,
    },
}

fn main() -> Result<ExitCode> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcad=info,mcad_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MeshIoConfig::load(path)?,
        None => MeshIoConfig::default(),
    };
    let io = MeshIo::new(config);

    match cli.command {
        Commands::Detect { file } => {
            let format = detect_format(&file)?;
            println!("{}", format);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { file, expect } => {
            if validate_file(&file, expect)? {
                println!("{}: valid", file.display());
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{}: invalid", file.display());
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Info { file, json } => {
            info_command(&io, &file, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Convert {
            input,
            output,
            from,
            format,
        } => {
            convert_command(&io, &input, &output, from, format)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn info_command(io: &MeshIo, file: &Path, json: bool) -> Result<()> {
    let result = io
        .import_file(file, None)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if json {
        let metadata = match &result {
            ImportResult::Stl { metadata, .. } => serde_json::to_value(metadata)?,
            ImportResult::Obj { metadata, .. } => serde_json::to_value(metadata)?,
            ImportResult::Step(document) => serde_json::to_value(document.metadata)?,
        };
        let summary = serde_json::json!({
            "path": file.display().to_string(),
            "format": result.format(),
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("File:      {}", file.display());
    println!("Format:    {}", result.format());
    match &result {
        ImportResult::Stl { metadata, .. } => {
            println!("Encoding:  {}", if metadata.binary { "binary" } else { "ASCII" });
            println!("Triangles: {}", metadata.num_triangles);
            println!("Vertices:  {}", metadata.num_vertices);
        }
        ImportResult::Obj { metadata, .. } => {
            println!("Vertices:  {}", metadata.num_vertices);
            println!("Normals:   {}", metadata.num_normals);
            println!("Texcoords: {}", metadata.num_texcoords);
            println!("Faces:     {}", metadata.num_faces);
        }
        ImportResult::Step(document) => {
            println!("Size:      {} bytes", document.metadata.size);
            println!("Header:    {}", document.metadata.has_header);
            println!("Data:      {}", document.metadata.has_data);
        }
    }
    Ok(())
}

fn convert_command(
    io: &MeshIo,
    input: &Path,
    output: &Path,
    from: Option<FileFormat>,
    format: Option<FileFormat>,
) -> Result<()> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}%")?
            .progress_chars("#>-"),
    );

    pb.set_message("Importing");
    let mut on_import = |percent: u8| pb.set_position(percent as u64);
    let result = match from {
        Some(format) => io.import_file_as(input, format, Some(&mut on_import)),
        None => io.import_file(input, Some(&mut on_import)),
    }
    .with_context(|| format!("Failed to import {}", input.display()))?;

    pb.set_message("Exporting");
    pb.set_position(0);
    let mut on_export = |percent: u8| pb.set_position(percent as u64);
    io.export_file_with_progress(output, &result, format, Some(&mut on_export))
        .with_context(|| format!("Failed to export {}", output.display()))?;
    pb.finish_and_clear();

    tracing::info!(
        "Converted {} ({}) -> {}",
        input.display(),
        result.format(),
        output.display()
    );
    Ok(())
}
