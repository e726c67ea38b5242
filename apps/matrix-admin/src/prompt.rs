//! Interactive questions on stdin.

use std::io::{self, BufRead, Write};

use anyhow::{Context, bail};

/// Asks `question` and returns the trimmed answer. EOF yields an empty
/// answer.
pub fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<String> {
    write!(output, "{question} ")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Interprets a yes/no answer; anything unrecognised falls back to
/// `default`.
pub fn parse_yes_no(answer: &str, default: bool) -> bool {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str, default: bool) -> io::Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let answer = ask(input, output, &format!("{question} {hint}"))?;
    Ok(parse_yes_no(&answer, default))
}

/// Asks until the answer parses, giving up after a few tries.
pub fn ask_parsed<T, R, W>(input: &mut R, output: &mut W, question: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    R: BufRead,
    W: Write,
{
    for _ in 0..3 {
        let answer = ask(input, output, question)?;
        match answer.parse() {
            Ok(value) => return Ok(value),
            Err(e) => writeln!(output, "{e}").context("writing prompt")?,
        }
    }
    bail!("no valid answer to {question:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_pipeline::Framework;
    use std::io::Cursor;

    #[test]
    fn yes_no_answers() {
        assert!(parse_yes_no("Y", false));
        assert!(parse_yes_no(" yes ", false));
        assert!(!parse_yes_no("n", true));
        assert!(parse_yes_no("", true));
        assert!(!parse_yes_no("maybe", false));
    }

    #[test]
    fn confirm_shows_default() {
        let mut out = Vec::new();
        let yes = confirm(&mut Cursor::new("\n"), &mut out, "Resume?", true).unwrap();
        assert!(yes);
        assert_eq!(String::from_utf8(out).unwrap(), "Resume? [Y/n] ");
    }

    #[test]
    fn eof_is_empty_answer() {
        let mut out = Vec::new();
        assert_eq!(ask(&mut Cursor::new(""), &mut out, "Name?").unwrap(), "");
    }

    #[test]
    fn ask_parsed_retries() {
        let mut out = Vec::new();
        let framework: Framework =
            ask_parsed(&mut Cursor::new("torch\ntf\n"), &mut out, "Framework?").unwrap();
        assert_eq!(framework, Framework::TensorFlow);
        assert!(String::from_utf8(out).unwrap().contains("torch"));

        let err = ask_parsed::<Framework, _, _>(&mut Cursor::new("a\nb\nc\n"), &mut Vec::new(), "Framework?");
        assert!(err.is_err());
    }
}
