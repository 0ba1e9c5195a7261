use std::env;
use std::process;
use std::time::Instant;

use log::debug;

use rshell::config::Config;
use rshell::logging;
use rshell::shell::Shell;

fn print_help() {
    println!("rshell - custom shell");
    println!();
    println!("Usage: rshell [OPTIONS]");
    println!("  -h, --help       Print this help");
    println!("  -v, --version    Print version");
    println!("  -c COMMAND       Run COMMAND and exit with its status");
}

fn print_version() {
    println!("RShell v {}", env!("CARGO_PKG_VERSION"));
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // respond to common flags quickly so external tools (neofetch) don't hang
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        process::exit(0);
    }

    if args.iter().any(|a| a == "-v" || a == "--version" || a == "-V" || a == "-version") {
        print_version();
        process::exit(0);
    }

    let command = match args.iter().position(|a| a == "-c") {
        Some(i) => match args.get(i + 1) {
            Some(line) => Some(line.clone()),
            None => {
                eprintln!("rshell: -c: option requires an argument");
                process::exit(2);
            }
        },
        None => None,
    };

    let start = Instant::now();
    let config = Config::load();
    logging::init(&config);
    let mut shell = Shell::new(&config);
    debug!("startup took {:?}", start.elapsed());

    let code = match command {
        Some(line) => shell.run_command(&line),
        None => shell.run(),
    };
    drop(shell);
    process::exit(code);
}
