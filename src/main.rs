use std::io::{self, BufRead, Write};

use arithcore::{eval, Environment};

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut env = Environment::new();

    if args.is_empty() {
        repl(&mut env);
        return;
    }

    let expr = args.join(" ");
    match eval(&expr, &mut env) {
        Ok((value, domain)) => println!("{value} ({domain:?})"),
        Err(e) => {
            eprintln!("arithcore: {e}");
            std::process::exit(1);
        }
    }
}

/// A minimal read-eval-print loop over stdin, one expression per line.
fn repl(env: &mut Environment) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("arith> ");
        let _ = stdout.flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match eval(line, env) {
            Ok((value, domain)) => println!("{value} ({domain:?})"),
            Err(e) => eprintln!("arithcore: {e}"),
        }
    }
}
