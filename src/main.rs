mod cli;

use std::process::ExitCode;

use clap::Parser;
use docsift::config::{self, ExtractionConfig};
use docsift::extraction::pdfium::PdfiumSource;
use docsift::extraction::{
    summarize, BatchSummary, ClassificationResult, ExtractionError, ExtractionOutcome,
    ExtractionRouter, OcrEngine, UnavailableOcrEngine,
};
use serde::Serialize;

use cli::{Cli, Commands, ExtractArgs};

fn main() -> ExitCode {
    let cli = Cli::parse();

    docsift::init_tracing();
    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            eprintln!("{}: {e}", config::APP_NAME);
            ExitCode::FAILURE
        }
    }
}

#[derive(Serialize)]
struct ClassifyReport {
    files: Vec<ClassificationResult>,
    summary: BatchSummary,
}

#[derive(Serialize)]
struct ExtractReport {
    outcomes: Vec<ExtractionOutcome>,
    summary: BatchSummary,
}

fn run(command: Commands) -> Result<(), ExtractionError> {
    let mut config = ExtractionConfig::from_env()?;
    if let Commands::Extract(args) = &command {
        apply_overrides(&mut config, args);
    }

    let source = PdfiumSource::new()?;
    let ocr = ocr_engine(&config);
    let router = ExtractionRouter::new(Box::new(source), ocr, config);

    let json = match command {
        Commands::Classify(args) => {
            let files = router.classify_batch(&args.paths);
            let summary = summarize(&files);
            serde_json::to_string_pretty(&ClassifyReport { files, summary })?
        }
        Commands::Extract(args) => {
            let (outcomes, summary) = router.process_batch(&args.files.paths);
            serde_json::to_string_pretty(&ExtractReport { outcomes, summary })?
        }
        Commands::Diagnose(args) => serde_json::to_string_pretty(&router.diagnose_batch(&args.paths))?,
    };
    println!("{json}");
    Ok(())
}

fn apply_overrides(config: &mut ExtractionConfig, args: &ExtractArgs) {
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if let Some(cap) = args.page_cap {
        config.page_cap = Some(cap.get());
    }
    if let Some(languages) = &args.languages {
        config.languages = languages.clone();
    }
    if let Some(psm) = args.psm {
        config.segmentation = psm;
    }
}

#[cfg(feature = "ocr")]
fn ocr_engine(config: &ExtractionConfig) -> Box<dyn OcrEngine + Send + Sync> {
    use docsift::extraction::ocr::TesseractEngine;

    let Some(dir) = config.tessdata_dir.as_deref() else {
        tracing::warn!("No tessdata directory configured, OCR pages will fail");
        return Box::new(UnavailableOcrEngine::new(
            "no tessdata directory configured (set DOCSIFT_TESSDATA)",
        ));
    };
    match TesseractEngine::new(dir) {
        Ok(engine) => Box::new(engine),
        Err(e) => {
            tracing::warn!(error = %e, "Tesseract unavailable, OCR pages will fail");
            Box::new(UnavailableOcrEngine::new(&e.to_string()))
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn ocr_engine(_config: &ExtractionConfig) -> Box<dyn OcrEngine + Send + Sync> {
    tracing::warn!("Built without the `ocr` feature, OCR pages will fail");
    Box::new(UnavailableOcrEngine::new("built without OCR support"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsift::extraction::{PageSegmentation, PolicyKind};
    use std::path::PathBuf;

    #[test]
    fn flags_override_environment() {
        let cli = Cli::try_parse_from([
            "docsift", "extract", "--policy", "baseline", "--page-cap", "3", "--psm", "auto", "a.pdf",
        ])
        .unwrap();
        let Commands::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        let mut config = ExtractionConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.policy, PolicyKind::Baseline);
        assert_eq!(config.page_cap, Some(3));
        assert_eq!(config.segmentation, PageSegmentation::Auto);
        assert_eq!(config.languages, vec!["rus", "eng"]);
    }

    #[test]
    fn serialization_failure_is_output_error() {
        let err: ExtractionError = serde_json::from_str::<u8>("oops").unwrap_err().into();
        assert!(matches!(err, ExtractionError::Output(_)));
    }

    #[test]
    fn paths_are_plain_paths() {
        let cli = Cli::try_parse_from(["docsift", "classify", "dir/scan.pdf"]).unwrap();
        let Commands::Classify(args) = cli.command else {
            panic!("expected classify");
        };
        assert_eq!(args.paths, vec![PathBuf::from("dir/scan.pdf")]);
    }
}
