use std::fs;
use std::process::ExitCode;

use clap::Parser;
use hlslow::backend::verilog::{self, EmitOptions};
use hlslow::cli::Cli;
use hlslow::diag::Diagnostics;
use hlslow::parse;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(diags) => {
            let stderr = std::io::stderr();
            let _ = diags.write_to(stderr.lock());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Diagnostics> {
    let mut diags = Diagnostics::new();

    let input = fs::read_to_string(&cli.input).map_err(|e| {
        let mut d = Diagnostics::new();
        d.error(
            hlslow::diag::Location::nowhere(),
            format!("failed to read '{}': {}", cli.input.display(), e),
        );
        d
    })?;

    let filename = cli.input.to_string_lossy().to_string();
    let Some(mut program) = parse::parse(&filename, &input, &mut diags) else {
        return Err(diags);
    };

    if cli.print_ir {
        println!("{:#?}", program);
    }

    let Some(systems) = hlslow::compile(&mut program, &mut diags) else {
        return Err(diags);
    };

    if cli.print_lowered {
        for sys in &systems {
            for pipe in &sys.pipes {
                for stage in &pipe.stages {
                    println!("stage {}: {:?}", stage.index, stage.stmts);
                }
            }
        }
    }

    let opts = EmitOptions {
        module_name: cli.module_name.clone(),
    };
    let verilog_text = verilog::emit(&program, &systems, &opts);

    let out_path = cli.output_path();
    fs::write(&out_path, verilog_text).map_err(|e| {
        let mut d = Diagnostics::new();
        d.error(
            hlslow::diag::Location::nowhere(),
            format!("failed to write '{}': {}", out_path.display(), e),
        );
        d
    })?;

    tracing::info!("wrote {}", out_path.display());
    Ok(())
}
