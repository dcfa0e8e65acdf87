//! User actions, one per shell line.

use std::path::PathBuf;

use crate::error::{VizError, VizResult};
use crate::geometry::CanvasSize;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Raw city count text; validated by the controller.
    Generate(String),
    /// Algorithm id or label. Empty deselects.
    SelectAlgorithm(String),
    SetParam { key: String, value: String },
    Solve,
    Clear,
    Resize(CanvasSize),
    /// Write the current frame to a file.
    Render(PathBuf),
    Status,
    Algorithms,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  generate <n>            ask the solver service for n random cities
  algorithm [<id>]        select ls, ts, sa, aco or pso (no id deselects)
  param <key> <value>     set a parameter of the selected algorithm
  solve                   solve the current graph
  clear                   drop the graph and any solution
  resize <w> <h>          change the canvas size and redraw
  render <file>           write the current frame (.svg, .png or .pdf)
  status                  show the session state
  algorithms              list algorithms and their parameters
  help                    show this text
  quit                    leave the shell";

/// Parse one shell line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> VizResult<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "generate" | "gen" => Command::Generate(rest.to_string()),
        "algorithm" | "algo" => Command::SelectAlgorithm(rest.to_string()),
        "param" | "set" => {
            let (key, value) = rest
                .split_once(char::is_whitespace)
                .map(|(k, v)| (k.trim(), v.trim()))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .ok_or_else(|| VizError::validation("Usage: param <key> <value>"))?;
            Command::SetParam {
                key: key.to_string(),
                value: value.to_string(),
            }
        }
        "solve" => Command::Solve,
        "clear" => Command::Clear,
        "resize" => Command::Resize(parse_size(rest)?),
        "render" | "save" => {
            if rest.is_empty() {
                return Err(VizError::validation("Usage: render <file>"));
            }
            Command::Render(PathBuf::from(rest))
        }
        "status" => Command::Status,
        "algorithms" | "list" => Command::Algorithms,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => {
            return Err(VizError::validation(format!(
                "Unknown command '{}'. Type 'help' for a list.",
                other
            )));
        }
    };
    Ok(Some(command))
}

/// Accepts `W H` or `WxH`.
fn parse_size(text: &str) -> VizResult<CanvasSize> {
    let usage = || VizError::validation("Usage: resize <width> <height>");
    let mut parts = text
        .split(|c: char| c.is_whitespace() || c == 'x' || c == 'X')
        .filter(|p| !p.is_empty());

    let width: u32 = parts.next().ok_or_else(usage)?.parse().map_err(|_| usage())?;
    let height: u32 = parts.next().ok_or_else(usage)?.parse().map_err(|_| usage())?;
    if parts.next().is_some() {
        return Err(usage());
    }
    Ok(CanvasSize::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse("# setup").unwrap(), None);
    }

    #[test]
    fn generate_keeps_raw_count() {
        assert_eq!(
            parse("generate  12 ").unwrap(),
            Some(Command::Generate("12".into()))
        );
        assert_eq!(parse("generate").unwrap(), Some(Command::Generate(String::new())));
        assert_eq!(parse("GEN 2.5").unwrap(), Some(Command::Generate("2.5".into())));
    }

    #[test]
    fn algorithm_may_be_a_label() {
        assert_eq!(
            parse("algorithm Simulated Annealing").unwrap(),
            Some(Command::SelectAlgorithm("Simulated Annealing".into()))
        );
    }

    #[test]
    fn param_needs_key_and_value() {
        assert_eq!(
            parse("param numIter 500").unwrap(),
            Some(Command::SetParam {
                key: "numIter".into(),
                value: "500".into()
            })
        );
        assert!(parse("param numIter").is_err());
    }

    #[test]
    fn resize_accepts_both_forms() {
        let expected = Some(Command::Resize(CanvasSize::new(1024, 768)));
        assert_eq!(parse("resize 1024 768").unwrap(), expected);
        assert_eq!(parse("resize 1024x768").unwrap(), expected);
        assert!(parse("resize 1024").is_err());
        assert!(parse("resize -1 5").is_err());
        assert!(parse("resize 1 2 3").is_err());
    }

    #[test]
    fn render_needs_path() {
        assert_eq!(
            parse("render out/tour.png").unwrap(),
            Some(Command::Render(PathBuf::from("out/tour.png")))
        );
        assert!(parse("render").is_err());
    }

    #[test]
    fn unknown_verb_is_reported() {
        let err = parse("dance").unwrap_err();
        assert_eq!(err.to_string(), "Unknown command 'dance'. Type 'help' for a list.");
    }
}
