//! CSV codec for tabular sources
//!
//! Sources are stored as `<csvDir>/<Display>.csv`. Each record is a CSV line
//! (quoted fields may span lines). Sheet metadata is carried in directive
//! records whose unquoted first field starts with `#!`:
//!
//! ```text
//! japanese,english,romaji,grp,subGrp
//! 人間,human,ningen,Noun,People
//! #!col,0,120
//! #!merge,A1:B1
//! #!style,"{""bold"":true}"
//! #!cell,A1,0
//! #!freeze,A2
//! ```
//!
//! Parsing is push-based: [`LineDecoder`] is fed one line at a time and only
//! holds the record being decoded, so large sources never sit in memory as
//! text. Serialization writes data rows first, then directives in a fixed
//! order, which makes `serialize(parse(x)) == x` for canonical input.

use std::io::{self, Write};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::domain::{CellRange, CellRef, CellRefError, ColumnMeta, SheetModel};

const DIRECTIVE_PREFIX: &str = "#!";
const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Debug, Error, PartialEq)]
pub enum CsvErrorKind {
    #[error("unexpected quote inside an unquoted field")]
    StrayQuote,

    #[error("unexpected character after closing quote")]
    TrailingAfterQuote,

    #[error("quoted field is never closed")]
    Unterminated,

    #[error("source is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown directive '{0}'")]
    UnknownDirective(String),

    #[error("directive '{directive}' has {got} fields, expected {expected}")]
    Arity {
        directive: String,
        expected: &'static str,
        got: usize,
    },

    #[error(transparent)]
    CellRef(#[from] CellRefError),

    #[error("invalid number '{0}'")]
    Number(String),

    #[error("invalid style JSON: {0}")]
    Style(String),

    #[error("cell {cell} references style {index}, but only {available} styles are defined")]
    DanglingStyle {
        cell: String,
        index: usize,
        available: usize,
    },
}

/// A decoding failure, with the 1-based line it occurred on
#[derive(Debug, Error, PartialEq)]
#[error("line {line}: {kind}")]
pub struct CsvError {
    pub line: usize,
    pub kind: CsvErrorKind,
}

/// Failure reading a source through an async reader
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] CsvError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    /// At the start of a field
    Start,
    /// Inside an unquoted field
    Unquoted,
    /// Inside a quoted field
    Quoted,
    /// Saw a quote inside a quoted field: either an escape or the closing quote
    QuoteSeen,
}

/// Incremental, line-driven CSV decoder
pub struct LineDecoder {
    sheet: SheetModel,
    line: usize,
    record_start: usize,
    fields: Vec<String>,
    field: String,
    first_quoted: bool,
    state: FieldState,
}

impl LineDecoder {
    /// Creates a decoder for a sheet with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            sheet: SheetModel::new(name, Vec::new()),
            line: 0,
            record_start: 0,
            fields: Vec::new(),
            field: String::new(),
            first_quoted: false,
            state: FieldState::Start,
        }
    }

    /// Number of lines consumed so far
    pub fn lines_read(&self) -> usize {
        self.line
    }

    fn error(&self, kind: CsvErrorKind) -> CsvError {
        CsvError {
            line: self.line,
            kind,
        }
    }

    fn end_field(&mut self) {
        self.fields.push(std::mem::take(&mut self.field));
        self.state = FieldState::Start;
    }

    /// Feeds one line, without its terminator
    pub fn push_line(&mut self, line: &str) -> Result<(), CsvError> {
        self.line += 1;

        let mut line = line;
        if self.line == 1 {
            line = line.strip_prefix(BYTE_ORDER_MARK).unwrap_or(line);
        }

        if self.state == FieldState::Quoted {
            // Continuation of a field that spans lines
            self.field.push('\n');
        } else {
            self.record_start = self.line;
            self.first_quoted = false;
        }

        for c in line.chars() {
            match (self.state, c) {
                (FieldState::Start, '"') => {
                    if self.fields.is_empty() {
                        self.first_quoted = true;
                    }
                    self.state = FieldState::Quoted;
                }
                (FieldState::Start, ',') | (FieldState::Unquoted, ',') => self.end_field(),
                (FieldState::Unquoted, '"') => return Err(self.error(CsvErrorKind::StrayQuote)),
                (FieldState::Start, c) | (FieldState::Unquoted, c) => {
                    self.field.push(c);
                    self.state = FieldState::Unquoted;
                }
                (FieldState::Quoted, '"') => self.state = FieldState::QuoteSeen,
                (FieldState::Quoted, c) => self.field.push(c),
                (FieldState::QuoteSeen, '"') => {
                    self.field.push('"');
                    self.state = FieldState::Quoted;
                }
                (FieldState::QuoteSeen, ',') => self.end_field(),
                (FieldState::QuoteSeen, _) => {
                    return Err(self.error(CsvErrorKind::TrailingAfterQuote))
                }
            }
        }

        match self.state {
            FieldState::Quoted => Ok(()),
            FieldState::Start if self.fields.is_empty() => {
                // An empty line is a row without cells
                self.finish_record(Vec::new())
            }
            FieldState::Start | FieldState::Unquoted | FieldState::QuoteSeen => {
                self.end_field();
                let fields = std::mem::take(&mut self.fields);
                self.finish_record(fields)
            }
        }
    }

    fn finish_record(&mut self, fields: Vec<String>) -> Result<(), CsvError> {
        let is_directive = !self.first_quoted
            && fields
                .first()
                .is_some_and(|first| first.starts_with(DIRECTIVE_PREFIX));

        if is_directive {
            self.apply_directive(fields)
                .map_err(|kind| CsvError {
                    line: self.record_start,
                    kind,
                })
        } else {
            self.sheet.rows.push(fields);
            Ok(())
        }
    }

    fn apply_directive(&mut self, fields: Vec<String>) -> Result<(), CsvErrorKind> {
        let arity = |expected: &'static str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(CsvErrorKind::Arity {
                    directive: fields[0].clone(),
                    expected,
                    got: fields.len(),
                })
            }
        };

        match &fields[0][DIRECTIVE_PREFIX.len()..] {
            "col" => {
                arity("3 or 4", fields.len() == 3 || fields.len() == 4)?;
                let index = parse_number::<usize>(&fields[1])?;
                let width = match fields[2].as_str() {
                    "" => None,
                    w => Some(parse_number::<u32>(w)?),
                };
                let kind = fields.get(3).filter(|k| !k.is_empty()).cloned();
                self.sheet.cols.insert(index, ColumnMeta { width, kind });
            }
            "merge" => {
                arity("2", fields.len() == 2)?;
                let range: CellRange = fields[1].parse()?;
                self.sheet.merges.push(range);
            }
            "style" => {
                arity("2", fields.len() == 2)?;
                let style: serde_json::Value = serde_json::from_str(&fields[1])
                    .map_err(|e| CsvErrorKind::Style(e.to_string()))?;
                self.sheet.styles.push(style);
            }
            "cell" => {
                arity("3", fields.len() == 3)?;
                let cell: CellRef = fields[1].parse()?;
                let index = parse_number::<usize>(&fields[2])?;
                self.sheet.cell_styles.insert(cell, index);
            }
            "freeze" => {
                arity("2", fields.len() == 2)?;
                self.sheet.freeze = Some(fields[1].parse()?);
            }
            _ => return Err(CsvErrorKind::UnknownDirective(fields[0].clone())),
        }

        Ok(())
    }

    /// Completes decoding and returns the sheet
    pub fn finish(self) -> Result<SheetModel, CsvError> {
        if self.state == FieldState::Quoted {
            return Err(CsvError {
                line: self.record_start,
                kind: CsvErrorKind::Unterminated,
            });
        }

        let available = self.sheet.styles.len();
        if let Some((cell, &index)) = self
            .sheet
            .cell_styles
            .iter()
            .find(|(_, index)| **index >= available)
        {
            return Err(CsvError {
                line: self.line,
                kind: CsvErrorKind::DanglingStyle {
                    cell: cell.to_string(),
                    index,
                    available,
                },
            });
        }

        Ok(self.sheet)
    }
}

fn parse_number<T: std::str::FromStr>(s: &str) -> Result<T, CsvErrorKind> {
    s.parse().map_err(|_| CsvErrorKind::Number(s.to_string()))
}

/// Parses a source held in memory
pub fn parse_str(text: &str, name: &str) -> Result<SheetModel, CsvError> {
    let mut decoder = LineDecoder::new(name);
    for line in text.lines() {
        decoder.push_line(line)?;
    }
    decoder.finish()
}

/// Parses a source line by line from an async reader
pub async fn parse_reader<R>(reader: R, name: &str) -> Result<SheetModel, ReadError>
where
    R: AsyncBufRead + Unpin,
{
    let mut decoder = LineDecoder::new(name);
    let mut lines = reader.lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => decoder.push_line(&line)?,
            Ok(None) => break,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(CsvError {
                    line: decoder.lines_read() + 1,
                    kind: CsvErrorKind::InvalidUtf8,
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(decoder.finish()?)
}

fn needs_quotes(field: &str) -> bool {
    field.contains([',', '"', '\n', '\r'])
}

fn write_field<W: Write>(out: &mut W, field: &str, quote: bool) -> io::Result<()> {
    if quote {
        write!(out, "\"{}\"", field.replace('"', "\"\""))
    } else {
        out.write_all(field.as_bytes())
    }
}

fn write_data_row<W: Write>(out: &mut W, row: &[String]) -> io::Result<()> {
    for (col, field) in row.iter().enumerate() {
        if col > 0 {
            out.write_all(b",")?;
        }
        let quote = needs_quotes(field)
            || (col == 0 && field.starts_with(DIRECTIVE_PREFIX))
            // a lone empty cell must not read back as an empty row
            || (row.len() == 1 && field.is_empty());
        write_field(out, field, quote)?;
    }
    out.write_all(b"\n")
}

fn write_directive<W: Write>(out: &mut W, name: &str, args: &[&str]) -> io::Result<()> {
    write!(out, "{}{}", DIRECTIVE_PREFIX, name)?;
    for arg in args {
        out.write_all(b",")?;
        write_field(out, arg, needs_quotes(arg))?;
    }
    out.write_all(b"\n")
}

/// Writes the canonical form of a sheet
pub fn serialize_to<W: Write>(sheet: &SheetModel, out: &mut W) -> io::Result<()> {
    for row in &sheet.rows {
        write_data_row(out, row)?;
    }

    for (index, meta) in &sheet.cols {
        let index = index.to_string();
        let width = meta.width.map(|w| w.to_string()).unwrap_or_default();
        match &meta.kind {
            Some(kind) => write_directive(out, "col", &[&index, &width, kind])?,
            None => write_directive(out, "col", &[&index, &width])?,
        }
    }

    for range in &sheet.merges {
        write_directive(out, "merge", &[&range.to_string()])?;
    }

    for style in &sheet.styles {
        let json = serde_json::to_string(style).map_err(io::Error::other)?;
        write_directive(out, "style", &[&json])?;
    }

    for (cell, index) in &sheet.cell_styles {
        write_directive(out, "cell", &[&cell.to_string(), &index.to_string()])?;
    }

    if let Some(freeze) = sheet.freeze {
        write_directive(out, "freeze", &[&freeze.to_string()])?;
    }

    Ok(())
}

/// Serializes a sheet to its canonical text
pub fn serialize(sheet: &SheetModel) -> io::Result<String> {
    let mut buf = Vec::new();
    serialize_to(sheet, &mut buf)?;
    String::from_utf8(buf).map_err(io::Error::other)
}
