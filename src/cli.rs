//! Command-line argument definitions for `hlslowc`. Grounded in
//! SPEC_FULL.md §6 and the teacher's `clap`-derive conventions.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "hlslowc", version, about = "Lowers a transactional SSA IR into staged synchronous Verilog")]
pub struct Cli {
    /// Input textual-IR file.
    pub input: PathBuf,

    /// Output Verilog path (defaults to the input path with `.v` appended).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Dump the parsed (pre-lowering) IR to stdout.
    #[arg(long)]
    pub print_ir: bool,

    /// Dump the per-stage pipeline form (post-lowering) to stdout.
    #[arg(long)]
    pub print_lowered: bool,

    /// Override the emitted Verilog module name.
    #[arg(long, default_value = "main")]
    pub module_name: String,

    /// Raise log verbosity; repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(p) => p.clone(),
            None => {
                let mut p = self.input.clone();
                let mut name = p
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                name.push_str(".v");
                p.set_file_name(name);
                p
            }
        }
    }
}
