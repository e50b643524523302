use std::{io, process::exit};

use args::Cli;
use clap::Parser;
use interpreter::Interpreter;
use runtime::{
    error::VmError,
    vm::{BootOptions, VM},
};
use tracing::{error, info, Level};
use tracing_subscriber::fmt;

mod args;
mod dump;

fn print_failure(interpreter: &mut Interpreter, err: &VmError) {
    eprintln!("Uncaught error ({}): {}", err.status(), err);

    if let Some(trace) = interpreter.take_trace() {
        for site in trace {
            eprintln!("  {}", site);
        }
    }
}

fn run(args: &Cli, interpreter: &mut Interpreter) -> Result<(), VmError> {
    let entry = interpreter.load_entry(&args.path).map_err(|err| {
        error!("Could not load {}", args.path.display());
        err
    })?;

    for root in &args.classpath {
        interpreter.class_loader().add_path(root);
    }

    let class_file = entry
        .class
        .class_file
        .as_ref()
        .ok_or_else(|| runtime::internal!("{} has no class file", entry.class.name))?;

    if args.contents {
        dump::dump_class(class_file, &mut io::stdout().lock())?;
    }

    if !args.contents && !args.execute {
        println!(
            "{}: ok (version {}.{})",
            entry.class.name,
            class_file.meta_data.major_version,
            class_file.meta_data.minor_version
        );
    }

    if args.execute {
        info!("Entering main");
        interpreter.execute_main(Some(&entry.class.name))?;
        info!("Execution concluded without error");
    }

    Ok(())
}

fn main() {
    let args = Cli::parse();

    let format = fmt::format()
        .with_ansi(true)
        .without_time()
        .with_level(true)
        .with_target(false)
        .with_thread_names(false)
        .with_source_location(true)
        .compact();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .event_format(format)
        .with_writer(io::stderr)
        .init();

    if args.bom {
        print!("\u{feff}");
    }

    let vm = match VM::new(BootOptions {
        max_stack: args.max_stack,
    }) {
        Ok(vm) => vm,
        Err(err) => {
            error!("Could not boot the VM: {}", err);
            exit(1);
        }
    };

    let mut interpreter = Interpreter::new(vm);
    if let Err(err) = run(&args, &mut interpreter) {
        print_failure(&mut interpreter, &err);
        exit(1);
    }
}
