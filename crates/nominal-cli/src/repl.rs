//! The interactive `:>` prompt (spec.md §6): reads a line, evaluates it
//! through a `State`, and prints the result. A line beginning with `^`
//! is a bytecode-dump command instead — `^` alone dumps the whole
//! accumulated program, `^<expr>` compiles (without running) `<expr>`
//! and dumps just the instructions it emitted.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use nominal_compiler::State;

pub fn run(state: &mut State) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Error: failed to start REPL: {e}");
            return;
        }
    };

    loop {
        match editor.readline(":> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                handle_line(state, &line);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {e}");
                break;
            }
        }
    }
}

fn handle_line(state: &mut State, line: &str) {
    if let Some(rest) = line.strip_prefix('^') {
        let rest = rest.trim();
        let src = if rest.is_empty() { None } else { Some(rest) };
        match state.dump_bytecode(src) {
            Ok(listing) => print!("{listing}"),
            Err(e) => eprintln!("Error: {e}"),
        }
        return;
    }

    if line.trim().is_empty() {
        return;
    }

    match state.evaluate(line) {
        Ok(value) => println!("{}", state.as_string(value)),
        Err(e) => eprintln!("Error: {e}"),
    }
}
