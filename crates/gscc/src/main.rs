//! GSC Compiler CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gsc_core::assembler::disassemble_functions;
use gsc_core::{compile, ArtifactMetadata, OpcodeTable, Pipeline, ScriptArtifact};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gscc")]
#[command(author, version, about = "GSC Compiler", long_about = None)]
struct Cli {
    /// Opcode table to assemble against (defaults to the built-in v1 table)
    #[arg(long, global = true)]
    opcodes: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a script into a packed artifact
    Compile {
        /// Input script
        file: PathBuf,

        /// Output buffer; metadata is written next to it as `<out>.json`
        #[arg(short, long)]
        output: PathBuf,

        /// Canonical script name (defaults to the file stem)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Parse and dump AST
    Ast {
        /// Input file to parse
        file: PathBuf,

        /// Pretty print
        #[arg(short, long)]
        pretty: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Dump the lowered IR
    Ir {
        /// Input file to compile
        file: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Check scripts for errors
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Verify a packed artifact and print its function table
    Inspect {
        /// Packed buffer
        buffer: PathBuf,

        /// Metadata sidecar (defaults to `<buffer>.json`)
        meta: Option<PathBuf>,

        /// Disassemble every function
        #[arg(short, long)]
        disasm: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let opcodes = load_opcodes(cli.opcodes.as_deref())?;

    match cli.command {
        Commands::Compile { file, output, name } => compile_file(&file, &output, name, opcodes),
        Commands::Ast { file, pretty, json } => dump_ast(&file, pretty, json),
        Commands::Ir { file, json } => dump_ir(&file, json),
        Commands::Check { files } => check(&files),
        Commands::Inspect { buffer, meta, disasm } => inspect(&buffer, meta, disasm, &opcodes),
    }
}

fn load_opcodes(path: Option<&Path>) -> Result<OpcodeTable> {
    let Some(path) = path else {
        return Ok(OpcodeTable::v1());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read opcode table: {}", path.display()))?;
    OpcodeTable::from_toml(&text).with_context(|| format!("Invalid opcode table: {}", path.display()))
}

fn read_source(file: &Path) -> Result<Vec<u8>> {
    fs::read(file).with_context(|| format!("Failed to read file: {}", file.display()))
}

fn script_name(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn sidecar(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

fn compile_file(file: &Path, output: &Path, name: Option<String>, opcodes: OpcodeTable) -> Result<()> {
    let name = name.unwrap_or_else(|| script_name(file));
    let source = read_source(file)?;

    let artifact = match Pipeline::new(opcodes).build(&name, &source) {
        Ok(artifact) => artifact,
        Err(e) => {
            eprintln!("{e}");
            bail!("Failed to compile '{name}'");
        }
    };

    fs::write(output, artifact.buffer())
        .with_context(|| format!("Failed to write output: {}", output.display()))?;
    let meta_path = sidecar(output);
    let meta = serde_json::to_string_pretty(&artifact.metadata()).context("Failed to serialize metadata")?;
    fs::write(&meta_path, meta)
        .with_context(|| format!("Failed to write metadata: {}", meta_path.display()))?;

    eprintln!(
        "OK: {} ({} bytes bytecode, {} -> {} bytes stack)",
        name,
        artifact.bytecode_len(),
        artifact.len(),
        artifact.compressed_len()
    );
    Ok(())
}

fn dump_ast(file: &Path, pretty: bool, json: bool) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let ast = gsc_core::parse(&source).map_err(|e| {
        eprintln!("Parse error: {}", e);
        anyhow::anyhow!("Failed to parse")
    })?;

    if json {
        let text = if pretty {
            serde_json::to_string_pretty(&ast)
        } else {
            serde_json::to_string(&ast)
        };
        println!("{}", text.context("Failed to serialize AST to JSON")?);
    } else if pretty {
        println!("{:#?}", ast);
    } else {
        println!("{:?}", ast);
    }

    Ok(())
}

fn dump_ir(file: &Path, json: bool) -> Result<()> {
    let source = read_source(file)?;
    let module = compile(&script_name(file), &source).map_err(|e| {
        eprintln!("{e}");
        anyhow::anyhow!("Failed to compile")
    })?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&module).context("Failed to serialize IR to JSON")?
        );
    } else {
        print!("{module}");
    }
    Ok(())
}

fn check(files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for file in files {
        let source = read_source(file)?;
        if let Err(e) = compile(&script_name(file), &source) {
            eprintln!("{e}");
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("Check failed: {failed} of {} script(s) have errors", files.len());
    }
    eprintln!("OK: {} script(s) checked", files.len());
    Ok(())
}

fn inspect(buffer: &Path, meta: Option<PathBuf>, disasm: bool, opcodes: &OpcodeTable) -> Result<()> {
    let meta_path = meta.unwrap_or_else(|| sidecar(buffer));
    let meta_text = fs::read_to_string(&meta_path)
        .with_context(|| format!("Failed to read metadata: {}", meta_path.display()))?;
    let metadata: ArtifactMetadata = serde_json::from_str(&meta_text)
        .with_context(|| format!("Invalid metadata: {}", meta_path.display()))?;
    let bytes = fs::read(buffer).with_context(|| format!("Failed to read buffer: {}", buffer.display()))?;

    let artifact = ScriptArtifact::from_parts(metadata, bytes).context("Artifact layout check failed")?;
    println!("name:           {}", artifact.name());
    println!("len:            {}", artifact.len());
    println!("bytecode_len:   {}", artifact.bytecode_len());
    println!("compressed_len: {}", artifact.compressed_len());
    println!("stack_offset:   {}", artifact.stack_offset());

    let stack = artifact.inflate_stack().context("Failed to inflate stack")?;
    let functions = disassemble_functions(artifact.bytecode(), &stack, opcodes)
        .context("Bytecode does not match its stack region")?;
    println!("\nFunctions ({}):", functions.len());
    for function in &functions {
        println!("  {:#06x} {:>6}  {}", function.offset, function.size, function.name);
        if disasm {
            for inst in &function.instructions {
                println!("      {inst}");
            }
        }
    }
    Ok(())
}
