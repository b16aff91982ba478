use std::{env, error::Error, io, io::Write};

use terminfo_text::{BUILTIN_TERM, Terminal, setup_terminal};

fn main() -> Result<(), Box<dyn Error>> {
    setup_terminal(BUILTIN_TERM, 1);
    let terminal = Terminal::from_env()?;
    let Some(cup) = terminal.get_capability("cup") else {
        println!("Your terminal has no cursor addressing capability");
        return Ok(());
    };
    println!("Found cursor addressing capability cup={cup:?}");

    let (row, column): (i32, i32) = match env::args().nth(1).zip(env::args().nth(2)) {
        Some((row, column)) => (row.parse()?, column.parse()?),
        None => (5, 10),
    };

    let mut stdout = io::stdout();
    for (name, params) in [
        ("sc", vec![]),
        ("cup", vec![row, column]),
        ("setaf", vec![2]),
    ] {
        if let Some(expanded) = terminal.evaluate(name, &params)? {
            stdout.write_all(&expanded)?;
        }
    }
    print!("Hello from row {row}, column {column}");
    for name in ["sgr0", "rc"] {
        if let Some(expanded) = terminal.evaluate(name, &[])? {
            stdout.write_all(&expanded)?;
        }
    }
    stdout.flush()?;
    println!();

    Ok(())
}
