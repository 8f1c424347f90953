//! `render` subcommand: deserialize an IR bundle and run a backend.

use anyhow::{bail, Context};
use clap::ValueEnum;
use ds_gen::codegen::{self, ErrorHandling, RenderOptions};
use ds_gen::ir::Bundle;
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum IrInputFormat {
    /* Bundle serialized as JSON (the --print-ir export format) */
    Json,
    /* Bundle serialized as YAML (the Kaitai front-end surface) */
    Yaml,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum ErrorMode {
    /* Generated readers throw typed exceptions */
    Exceptions,
    /* Generated readers return result values */
    Results,
    /* Both entry points */
    Both,
}

impl From<ErrorMode> for ErrorHandling {
    fn from(mode: ErrorMode) -> Self {
        match mode {
            ErrorMode::Exceptions => ErrorHandling::ExceptionsOnly,
            ErrorMode::Results => ErrorHandling::ResultsOnly,
            ErrorMode::Both => ErrorHandling::Both,
        }
    }
}

fn load_bundle(path: &Path, format: IrInputFormat) -> anyhow::Result<Bundle> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let bundle = match format {
        IrInputFormat::Json => serde_json::from_str(&text)
            .with_context(|| format!("invalid IR bundle in {}", path.display()))?,
        IrInputFormat::Yaml => serde_yml::from_str(&text)
            .with_context(|| format!("invalid IR bundle in {}", path.display()))?,
    };
    Ok(bundle)
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    file: PathBuf,
    format: IrInputFormat,
    language: String,
    output_dir: PathBuf,
    namespace: Option<String>,
    error_mode: ErrorMode,
    library_mode: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let bundle = load_bundle(&file, format)?;
    if verbose {
        println!(
            "[*] Loaded bundle '{}': {} struct(s), {} enum(s), {} choice(s)",
            bundle.name,
            bundle.structs.len(),
            bundle.enums.len(),
            bundle.choices.len()
        );
    }

    let options = RenderOptions {
        namespace: namespace.unwrap_or_else(|| bundle.name.clone()),
        error_handling: error_mode.into(),
        library_mode,
    };

    let files = match codegen::generate(&bundle, &language, &options) {
        Ok(files) => files,
        Err(err) => bail!("code generation failed: {}", err),
    };

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    for file in &files {
        let path = output_dir.join(&file.path);
        std::fs::write(&path, &file.content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("[✓] Generated {}", path.display());
    }
    Ok(())
}
