use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use docsift::extraction::{PageSegmentation, PolicyKind};

#[derive(Parser, Debug)]
#[command(
    name = "docsift",
    version,
    about = "Quality-adaptive PDF text extraction with tiered OCR"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report quality tier and extraction method per file.
    Classify(FilesArgs),
    /// Extract and correct text, printing one outcome per file.
    Extract(ExtractArgs),
    /// Quick per-file facts and a direct-vs-OCR verdict.
    Diagnose(FilesArgs),
}

#[derive(Args, Debug, Clone)]
pub struct FilesArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Flags override the `DOCSIFT_*` environment.
#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub files: FilesArgs,

    #[arg(long)]
    pub policy: Option<PolicyKind>,

    #[arg(long)]
    pub page_cap: Option<NonZeroUsize>,

    /// Recognition languages, e.g. `rus+eng`.
    #[arg(long, value_delimiter = '+')]
    pub languages: Option<Vec<String>>,

    /// Tesseract page segmentation: `auto` or `block`.
    #[arg(long)]
    pub psm: Option<PageSegmentation>,
}
