extern crate env_logger;
extern crate rustyline;

use std::error::Error;
use log::{info, warn};
use compact_scheme::{Interpreter, LispError};

const BOOTSTRAP_FILE: &str = "init.scm";

/// Prints the outcome of one batch of forms. Returns `false` when the
/// interpreter can no longer be used.
fn report(interp: &Interpreter, result: compact_scheme::Result<compact_scheme::LispValue>) -> bool {
    match result {
        Ok(value) => {
            println!("{}", interp.display(value));
            true
        },
        Err(LispError::Exit(code)) => std::process::exit(code as i32),
        Err(err) => {
            println!("Err: {}", err);
            !err.is_fatal()
        },
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let mut interp = Interpreter::new()?;

    match interp.load_file(BOOTSTRAP_FILE) {
        Ok(_) => info!("loaded {}", BOOTSTRAP_FILE),
        Err(LispError::Exit(code)) => std::process::exit(code as i32),
        Err(err) if err.is_fatal() => return Err(err.into()),
        Err(err) => warn!("could not load {}: {}; the base library is unavailable", BOOTSTRAP_FILE, err),
    }

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && &args[1] != "--" {
        return match interp.load_file(&args[1]) {
            Err(LispError::Exit(code)) => std::process::exit(code as i32),
            result => result.map(|_| ()).map_err(Into::into),
        };
    }

    let mut rl = rustyline::DefaultEditor::new()?;
    loop {
        let Ok(line) = rl.readline("> ") else {
            // eof
            break Ok(());
        };
        if let Some(command) = line.trim_start().strip_prefix(',') {
            if command.starts_with('q') {
                break Ok(());
            }
            continue;
        }
        rl.add_history_entry(line.as_str())?;
        let result = interp.eval_str(&line);
        if !report(&interp, result) {
            std::process::exit(1);
        }
    }
}
