//! File loading and input/output-file discrimination.
//!
//! Standard TRANSPORT output files echo the input deck after an indicator
//! card line of the form `0    X` (X in 0..=2). For such files the echoed
//! lattice region is extracted, split type-12 entries are rejoined, and any
//! fit-result rows after SENTINEL are collected for the fitting registry.
//! Plain input decks are tokenized line by line with comments preserved.

use std::fs;
use std::path::Path;

use crate::domain::{FileKind, TransportError, TransportResult};
use crate::tokenizer;

/// One line of lattice source, raw text plus its tokenized fields.
#[derive(Debug, Clone)]
pub struct SourceLine {
    pub raw: String,
    pub fields: Vec<String>,
    /// 1-based line number in the original file.
    pub number: usize,
}

#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub kind: FileKind,
    pub lines: Vec<SourceLine>,
    /// Starred magnet rows (`*DRIFT*`, `*QUAD*`, `*BEND*`, ...) from the
    /// fit-result sections of an output file. Empty for input decks.
    pub fit_rows: Vec<Vec<String>>,
}

/// The indicator card echo: a line holding exactly `0` and a digit 0..=2.
fn is_indicator_line(raw: &str) -> bool {
    let fields: Vec<&str> = raw.split_whitespace().collect();
    fields.len() == 2 && fields[0] == "0" && matches!(fields[1], "0" | "1" | "2")
}

fn read_lines(path: &Path) -> TransportResult<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|err| {
        TransportError::io_system(
            "INPUT.FILE",
            format!("cannot open {}: {err}", path.display()),
        )
    })?;
    Ok(text
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect())
}

/// Load a lattice file, auto-detecting whether it is a plain input deck or
/// a standard output file.
pub fn load(path: &Path) -> TransportResult<LoadedFile> {
    let raw_lines = read_lines(path)?;
    if raw_lines.iter().any(|line| is_indicator_line(line)) {
        load_output(&raw_lines)
    } else {
        Ok(load_input(&raw_lines))
    }
}

fn load_input(raw_lines: &[String]) -> LoadedFile {
    let mut lines = Vec::with_capacity(raw_lines.len());
    for (index, raw) in raw_lines.iter().enumerate() {
        let fields = if tokenizer::is_comment(raw) {
            // comment lines keep their text untouched
            raw.split_whitespace().map(str::to_string).collect()
        } else {
            tokenizer::tokenize(raw)
        };
        lines.push(SourceLine {
            raw: raw.clone(),
            fields,
            number: index + 1,
        });
    }
    LoadedFile {
        kind: FileKind::Input,
        lines,
        fit_rows: Vec::new(),
    }
}

fn load_output(raw_lines: &[String]) -> TransportResult<LoadedFile> {
    let indicator = raw_lines
        .iter()
        .position(|line| is_indicator_line(line))
        .ok_or_else(|| {
            TransportError::internal("OUTPUT.SCAN", "indicator card vanished between scans")
        })?;

    // Echoed lattice: everything after the indicator card up to and
    // including the SENTINEL line.
    let mut lattice: Vec<String> = Vec::new();
    for raw in &raw_lines[indicator + 1..] {
        let fields = tokenizer::tokenize(raw);
        let done = tokenizer::is_sentinel(&fields);
        lattice.push(raw.clone());
        if done {
            break;
        }
    }

    let mut lines: Vec<SourceLine> = Vec::new();
    let mut skip_next = false;
    for (offset, raw) in lattice.iter().enumerate() {
        if skip_next {
            skip_next = false;
            continue;
        }
        let mut fields = tokenizer::tokenize(raw);
        let mut raw_line = raw.clone();
        // Type-12 entries in output echoes are split over two lines.
        if offset > 0
            && fields
                .first()
                .and_then(|field| tokenizer::type_code_value(field))
                .is_some_and(|code| code.abs() == 12.0)
        {
            if let Some(continuation) = lattice.get(offset + 1) {
                let continuation_fields = tokenizer::tokenize(continuation);
                fields = tokenizer::join_split_lines(&fields, &continuation_fields);
                raw_line = format!("{raw} {continuation}");
                skip_next = true;
            }
        }
        lines.push(SourceLine {
            raw: raw_line,
            fields,
            number: indicator + offset + 2,
        });
    }

    let fit_rows = extract_fit_rows(&raw_lines[indicator + 1 + lattice.len()..]);

    Ok(LoadedFile {
        kind: FileKind::Output,
        lines,
        fit_rows,
    })
}

/// Fit-result sections start with a line beginning `1`; within them the
/// rows of interest carry a starred element type in the first field. The
/// `*FIT*` marker itself is bookkeeping, not an element.
fn extract_fit_rows(tail: &[String]) -> Vec<Vec<String>> {
    let mut in_section = false;
    let mut rows = Vec::new();
    for raw in tail {
        if raw.starts_with('1') {
            in_section = true;
            continue;
        }
        if !in_section {
            continue;
        }
        let fields = tokenizer::tokenize(raw);
        let Some(first) = fields.first() else { continue };
        if first.len() > 1 && first.starts_with('*') && first.ends_with('*') && first != "*FIT*" {
            rows.push(fields);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::{is_indicator_line, load};
    use crate::domain::FileKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn indicator_lines_allow_digits_zero_to_two() {
        assert!(is_indicator_line("0    0"));
        assert!(is_indicator_line("0    2"));
        assert!(!is_indicator_line("0    3"));
        assert!(!is_indicator_line("0"));
        assert!(!is_indicator_line("10    0"));
    }

    #[test]
    fn plain_deck_loads_as_input() {
        let file = write_file("( test lattice )\n1. 0. 0. 0. 0. 0. 0. 0. 10. /BEAM/;\n3. 1.5 /D1/;\nSENTINEL\n");
        let loaded = load(file.path()).unwrap();
        assert_eq!(loaded.kind, FileKind::Input);
        assert_eq!(loaded.lines.len(), 4);
        assert!(loaded.fit_rows.is_empty());
        assert_eq!(loaded.lines[2].fields[0], "3.");
        assert_eq!(loaded.lines[2].number, 3);
    }

    #[test]
    fn output_file_extracts_echo_and_fit_rows() {
        let contents = "\
some header text
0    0
1. 0. 0. 0. 0. 0. 0. 0. 10. ;
3. 1.5 /D1/ ;
SENTINEL
optics output here
1 problem step
*DRIFT* 3.0000 1.7500 /D1/
*FIT* 0.1
*QUAD* 5.0000 0.5000 12.5000 5.0000 /Q1/
";
        let file = write_file(contents);
        let loaded = load(file.path()).unwrap();
        assert_eq!(loaded.kind, FileKind::Output);
        assert_eq!(loaded.lines.len(), 3);
        assert!(loaded.lines[2].fields[0].starts_with("SENTINEL"));
        assert_eq!(loaded.fit_rows.len(), 2);
        assert_eq!(loaded.fit_rows[0][0], "*DRIFT*");
        assert_eq!(loaded.fit_rows[1][0], "*QUAD*");
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = load(std::path::Path::new("/nonexistent/lattice.txt")).unwrap_err();
        assert!(err.to_string().contains("cannot open"));
    }
}
