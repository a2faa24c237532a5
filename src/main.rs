use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use rustyline::error::ReadlineError;

use gscript::{Exec, ParamTable, ScriptQueue};

fn main() -> Result<()> {
    let mut args: Vec<_> = std::env::args().skip(1).collect();

    let mut table = ParamTable::new();
    while let Some(binding) =
        consume_arg(&mut args, |arg| arg.strip_prefix("--set=").map(str::to_string))
    {
        match binding.split_once('=') {
            Some((name, value)) => table.set(name, value),
            None => {
                eprintln!("--set expects name=value, got {:?}", binding);
                std::process::exit(1);
            }
        }
    }
    let file = consume_arg(&mut args, |arg| {
        if arg.starts_with("--") {
            None
        } else {
            Some(arg.to_string())
        }
    });
    if !args.is_empty() {
        eprintln!("Unrecognized arguments: {:?}", args);
        eprintln!("Usage: gscript [--set=name=value]... [file]");
        std::process::exit(1);
    }

    let mut queue = ScriptQueue::new(table);
    queue.on_emergency_stop(|statement| {
        eprintln!("{} {}", "!! emergency stop".red().bold(), statement);
    });

    if let Some(file) = file {
        run_file(queue, file)
    } else {
        run_prompt(queue)
    }
}

fn consume_arg<T, F: Fn(&str) -> Option<T>>(args: &mut Vec<String>, predicate: F) -> Option<T> {
    let found = args
        .iter()
        .enumerate()
        .filter_map(|(idx, arg)| predicate(arg).map(|val| (idx, val)))
        .next();

    if let Some((idx, val)) = found {
        args.remove(idx);
        Some(val)
    } else {
        None
    }
}

fn drain(queue: &mut ScriptQueue<ParamTable>) -> bool {
    let mut had_error = false;
    loop {
        match queue.exec_next() {
            Exec::Empty => return had_error,
            Exec::Error(message) => {
                had_error = true;
                eprintln!("{} {}", "error:".red().bold(), message);
            }
            Exec::Command(command) => {
                println!("{} {}", command.name.bold(), command.params.join(" "));
            }
        }
    }
}

fn run_file(mut queue: ScriptQueue<ParamTable>, file_name: String) -> Result<()> {
    let source = std::fs::read_to_string(&file_name).into_diagnostic()?;

    // feed line by line the way a serial link would
    for chunk in source.split_inclusive('\n') {
        queue.parse(chunk);
    }
    queue.finish();

    if drain(&mut queue) {
        std::process::exit(70);
    }
    Ok(())
}

fn run_prompt(mut queue: ScriptQueue<ParamTable>) -> Result<()> {
    let mut rl = rustyline::Editor::<()>::new();
    loop {
        match rl.readline("gscript> ") {
            Ok(line) => {
                rl.add_history_entry(&line);
                queue.parse(&line);
                queue.parse("\n");
                drain(&mut queue);
            }
            Err(ReadlineError::Interrupted) => return Ok(()),
            Err(ReadlineError::Eof) => return Ok(()),
            Err(err) => return Err(err).into_diagnostic(),
        }
    }
}
