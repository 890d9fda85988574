// main.rs - The unshackled CLI: load a program, run it to hlt or a fatal error.

use std::env;
use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use unshackled_core::{load, Machine, Memory};

struct Args {
    program_path: Option<String>,
    seed: Option<u64>,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Args, String> {
    argv.next(); // argv[0]
    let mut program_path = None;
    let mut seed = None;
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--seed" => {
                let value = argv
                    .next()
                    .ok_or_else(|| "--seed requires a value".to_string())?;
                seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("--seed value must be a u64: {value}"))?,
                );
            }
            other if program_path.is_none() => program_path = Some(other.to_string()),
            other => return Err(format!("unexpected argument: {other}")),
        }
    }
    Ok(Args { program_path, seed })
}

fn read_program(path: Option<&str>) -> io::Result<Vec<u8>> {
    match path {
        Some(path) => fs::read(path),
        None => {
            let mut buf = Vec::new();
            io::stdin().lock().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(env::args()) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let seed = args.seed.or_else(|| {
        env::var("UNSHACKLED_SEED")
            .ok()
            .and_then(|s| s.parse().ok())
    });

    let bytes = match read_program(args.program_path.as_deref()) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let memory = Memory::new();
    let result = load(&bytes, &memory).and_then(|initial_values| {
        let mut machine = Machine::new(memory, initial_values, seed);
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut input = stdin.lock();
        let mut output = stdout.lock();
        machine.run(&mut input, &mut output)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
