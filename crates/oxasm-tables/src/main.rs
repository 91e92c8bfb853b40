//! CLI driver for the table generator.

use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;

/// Compile the instruction database into assembler and disassembler tables.
#[derive(Debug, Parser)]
#[command(name = "oxasm-tables", version, about)]
struct Args {
    /// The instruction database (insns.dat).
    database: PathBuf,

    /// Write the byte-code pool.
    #[arg(short = 'b', value_name = "FILE")]
    bytecodes: Option<PathBuf>,

    /// Write the per-mnemonic template tables.
    #[arg(short = 'a', value_name = "FILE")]
    templates: Option<PathBuf>,

    /// Write the disassembly decision tables.
    #[arg(short = 'd', value_name = "FILE")]
    disasm: Option<PathBuf>,

    /// Write the opcode enumeration header.
    #[arg(short = 'i', value_name = "FILE")]
    opcodes: Option<PathBuf>,

    /// Write the mnemonic name strings.
    #[arg(short = 'n', value_name = "FILE")]
    names: Option<PathBuf>,

    /// Write the instruction-flag enumeration header.
    #[arg(long = "fh", value_name = "FILE")]
    flag_header: Option<PathBuf>,

    /// Write the instruction-flag combination table.
    #[arg(long = "fc", value_name = "FILE")]
    flag_init: Option<PathBuf>,
}

fn write_artifact(path: &PathBuf, what: &str, text: String) -> std::io::Result<()> {
    std::fs::write(path, text)?;
    info!("wrote {} to {}", what, path.display());
    Ok(())
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let dbname = args.database.display().to_string();
    let input = std::fs::read_to_string(&args.database)?;
    let gen = oxasm_tables::generate(&input, &dbname)?;

    use oxasm_tables::emit;
    if let Some(path) = &args.bytecodes {
        write_artifact(path, "byte-code pool", emit::emit_bytecodes(&gen, &dbname))?;
    }
    if let Some(path) = &args.templates {
        write_artifact(path, "template tables", emit::emit_templates(&gen, &dbname))?;
    }
    if let Some(path) = &args.disasm {
        write_artifact(path, "disassembly tables", emit::emit_disasm(&gen, &dbname))?;
    }
    if let Some(path) = &args.opcodes {
        write_artifact(path, "opcode enumeration", emit::emit_opcode_enum(&gen, &dbname))?;
    }
    if let Some(path) = &args.names {
        write_artifact(path, "name strings", emit::emit_names(&gen, &dbname))?;
    }
    if let Some(path) = &args.flag_header {
        write_artifact(path, "flag enumeration", emit::emit_flag_header(&dbname))?;
    }
    if let Some(path) = &args.flag_init {
        write_artifact(path, "flag combinations", emit::emit_flag_init(&gen, &dbname))?;
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("oxasm-tables: {}", err);
            ExitCode::FAILURE
        }
    }
}
