//! `languages` subcommand: list registered backends.

use ds_gen::codegen::registry::BackendRegistry;

pub fn run() -> anyhow::Result<()> {
    let registry = BackendRegistry::global()
        .read()
        .expect("backend registry poisoned");
    for language in registry.available_languages() {
        if let Some(backend) = registry.get(&language) {
            let meta = backend.metadata();
            println!(
                "{:<12} {:<6} extension {:<4} exceptions: {}",
                meta.name, meta.version, meta.file_extension, meta.supports_exceptions
            );
        }
    }
    Ok(())
}
