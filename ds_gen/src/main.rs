use clap::{Parser, Subcommand};
use cmds::render::{ErrorMode, IrInputFormat};
use std::path::PathBuf;

mod cmds;

#[derive(Parser)]
#[command(name = "ds-gen")]
#[command(about = "DataScript parser generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /* Generate parser code from a serialized IR bundle */
    Render {
        /* Input file containing the IR bundle */
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: PathBuf,

        /* Serialization format of the bundle */
        #[arg(long = "ir-format", value_enum, default_value = "json")]
        ir_format: IrInputFormat,

        /* Target language for code generation */
        #[arg(short = 'l', long = "language", default_value = "cpp")]
        language: String,

        /* Output directory for generated code */
        #[arg(
            short = 'o',
            long = "output",
            value_name = "DIR",
            default_value = "generated"
        )]
        output_dir: PathBuf,

        /* Namespace for the generated module (defaults to the bundle name) */
        #[arg(long = "namespace", value_name = "NS")]
        namespace: Option<String>,

        /* Error handling style of the generated readers */
        #[arg(long = "error-handling", value_enum, default_value = "both")]
        error_handling: ErrorMode,

        /* Produce the three-artifact library bundle */
        #[arg(long = "library-mode")]
        library_mode: bool,

        /* Enable verbose output */
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },

    /* List registered language backends */
    Languages,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            file,
            ir_format,
            language,
            output_dir,
            namespace,
            error_handling,
            library_mode,
            verbose,
        } => {
            cmds::render::run(
                file,
                ir_format,
                language,
                output_dir,
                namespace,
                error_handling,
                library_mode,
                verbose,
            )?;
        }

        Commands::Languages => {
            cmds::languages::run()?;
        }
    }

    Ok(())
}
