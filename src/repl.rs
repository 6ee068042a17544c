//! Interactive shell.

use crate::commands::{self, CommandError, Invocation, OutputOptions};
use crate::items::{parse_item, UsageError};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use xrapc_client::Client;
use xrapc_protocol::Verb;

const HELP_TEXT: &str = r#"
Available commands:
  help                                Show this help
  GET <resource> [item...]            Get a resource
  POST <resource> [item...]           Create a resource under <resource>
  PUT <resource> [item...]            Replace a resource
  DELETE <resource> [item...]         Delete a resource
  quit, exit                          Exit the shell

Items:
  name:value      header field (e.g. if-none-match:abc)
  name=value      string parameter / body field
  name=@file      string read from a file
  name:=json      raw JSON body field
  name:=@file     JSON read from a file

End a line with \ to continue it on the next line.
"#;

/// Splits a command line into tokens.
///
/// Tokens are separated by whitespace. A token starting with `'` or `"` runs
/// to the matching quote, or to the end of the line if there is none.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut token = String::new();
        if first == '\'' || first == '"' {
            chars.next();
            for c in chars.by_ref() {
                if c == first {
                    break;
                }
                token.push(c);
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                token.push(c);
            }
        }
        tokens.push(token);
    }

    tokens
}

enum Outcome {
    Output(String),
    Exit,
}

fn execute_line(client: &Client, line: &str) -> Result<Outcome, CommandError> {
    let tokens = tokenize(line);
    let Some((command, args)) = tokens.split_first() else {
        return Ok(Outcome::Output(String::new()));
    };

    if command.eq_ignore_ascii_case("quit") || command.eq_ignore_ascii_case("exit") {
        return Ok(Outcome::Exit);
    }
    if command.eq_ignore_ascii_case("help") || command == "?" {
        return Ok(Outcome::Output(HELP_TEXT.to_string()));
    }

    let verb: Verb = command
        .parse()
        .map_err(|_| UsageError(format!("Unrecognised command '{}'", command)))?;
    let (resource, items) = args
        .split_first()
        .ok_or_else(|| UsageError(format!("Must supply resource with '{}'", verb)))?;

    let mut invocation = Invocation::new(verb, resource.as_str());
    for item in items {
        invocation.add_item(parse_item(item)?);
    }
    // No stdin body in the shell; POST and PUT without data send `{}`.
    let output = commands::execute(client, &invocation, None, &OutputOptions::default())?;
    Ok(Outcome::Output(output))
}

pub fn run(client: Client, endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "xrapc shell".bold().cyan());
    println!("Connected to {}", endpoint);

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".xrapc_history"))
        .unwrap_or_else(|_| ".xrapc_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    let mut pending = String::new();
    loop {
        let prompt = if pending.is_empty() { "> " } else { "... " };
        match rl.readline(prompt) {
            Ok(line) => {
                if let Some(head) = line.strip_suffix('\\') {
                    pending.push_str(head);
                    pending.push(' ');
                    continue;
                }
                pending.push_str(&line);
                let command = std::mem::take(&mut pending);

                match execute_line(&client, &command) {
                    Ok(Outcome::Output(output)) => print!("{}", output),
                    Ok(Outcome::Exit) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                pending.clear();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}
