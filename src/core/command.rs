use std::path::Path;

use crate::core::domain::{Language, RunRequest};

/// Builds the command line for a request. Paths are wrapped in double
/// quotes; empty parts are skipped.
pub fn command_line(request: &RunRequest, java_class_name: &str) -> String {
    let parts = match request.language {
        Language::Cpp => vec![quote(&request.executable_path), request.extra_args.clone()],
        Language::Java => vec![
            request.run_command.clone(),
            "-classpath".to_string(),
            quote(&request.executable_path),
            java_class_name.to_string(),
            request.extra_args.clone(),
        ],
        Language::Python => vec![
            request.run_command.clone(),
            quote(&request.source_path),
            request.extra_args.clone(),
        ],
    };

    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

/// Splits a command line into program and arguments.
///
/// Whitespace separates arguments unless it is inside double quotes.
/// Three consecutive quotes stand for one literal quote. Empty arguments
/// are dropped.
pub fn split_command(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_count = 0;

    for c in command.chars() {
        if c == '"' {
            quote_count += 1;
            if quote_count == 3 {
                quote_count = 0;
                current.push(c);
            }
            continue;
        }
        if quote_count == 1 {
            in_quotes = !in_quotes;
        }
        quote_count = 0;

        if !in_quotes && c.is_whitespace() {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        args.push(current);
    }

    args
}
