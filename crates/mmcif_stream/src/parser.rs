use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
    str,
};

use flate2::read::GzDecoder;

use crate::{
    error::{ParseError, ParseErrorKind, Result},
    model::{MmcifExtract, Table},
    options::{NameRegistry, ParserOptions, RowFilter},
    pipeline,
    pool::BufferPool,
    scanner::{is_directive, starts_with_keyword, LineScanner, Step},
    tokenizer::tokenize,
};

/// Open `path` and parse it, transparently decompressing `.gz` files.
pub fn parse_file(path: impl AsRef<Path>, options: &ParserOptions) -> Result<MmcifExtract> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref).map_err(|err| ParseError::from(err).with_path(path_ref))?;
    let reader: Box<dyn Read> = if path_ref
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
    {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    parse_reader(BufReader::new(reader), options).map_err(|err| err.with_path(path_ref))
}

/// Parse an mmCIF stream, keeping only what `options` asks for.
pub fn parse_reader<R: BufRead>(reader: R, options: &ParserOptions) -> Result<MmcifExtract> {
    Parser::new(reader, options).run()
}

pub fn parse_str(input: &str, options: &ParserOptions) -> Result<MmcifExtract> {
    parse_reader(input.as_bytes(), options)
}

/// State shared by every stage of one parse: the line source with its
/// latched error, and the batch pool used by the `_atom_site` pipeline.
pub(crate) struct ParseSession<R> {
    pub(crate) scanner: LineScanner<R>,
    pub(crate) pool: BufferPool,
}

impl<R: BufRead> ParseSession<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            scanner: LineScanner::new(reader),
            pool: BufferPool::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Top,
    Loop,
    LoopHeader,
    GenericTable,
    AtomSiteTable,
    SkipTable,
    DataItem,
    Unknown,
    Done,
}

struct Parser<R> {
    session: ParseSession<R>,
    items: NameRegistry,
    tables: NameRegistry,
    filter: RowFilter,
    require_atom_site_loop: bool,
    extract: MmcifExtract,
    header: Vec<String>,
    table_key: Option<String>,
    saw_atom_site: bool,
}

impl<R: BufRead> Parser<R> {
    fn new(reader: R, options: &ParserOptions) -> Self {
        Self {
            session: ParseSession::new(reader),
            items: options.item_registry(),
            tables: options.table_registry(),
            filter: options.row_filter(),
            require_atom_site_loop: options.require_atom_site_loop,
            extract: MmcifExtract::new(),
            header: Vec::new(),
            table_key: None,
            saw_atom_site: false,
        }
    }

    fn run(mut self) -> Result<MmcifExtract> {
        let mut state = self.step();
        loop {
            state = match state {
                State::Top => self.top(),
                State::Loop => self.loop_header(),
                State::LoopHeader => self.classify_loop(),
                State::GenericTable => self.generic_table(),
                State::AtomSiteTable => self.atom_site_table(),
                State::SkipTable => self.skip_table(),
                State::DataItem => self.data_item(),
                State::Unknown => {
                    return Err(self.session.scanner.take_error().unwrap_or_else(|| {
                        ParseError::new(ParseErrorKind::UnknownConstruct, "parse stopped")
                    }));
                }
                State::Done => break,
            };
        }

        if self.require_atom_site_loop && !self.saw_atom_site {
            return Err(ParseError::new(
                ParseErrorKind::MissingAtomLoop,
                "_atom_site loop missing",
            ));
        }

        log::info!(
            "parsed {} items, {} tables, {} chains ({} atom positions)",
            self.extract.items.len(),
            self.extract.tables.len(),
            self.extract.chains.len(),
            self.extract.atom_count()
        );
        Ok(self.extract)
    }

    /// Advance to the next logical line and go back to the top level.
    fn step(&mut self) -> State {
        match self.session.scanner.advance() {
            Step::Line => State::Top,
            Step::Eof => State::Done,
            Step::Failed => State::Unknown,
        }
    }

    /// State to enter once a table has stopped consuming lines.
    fn after_table(&self) -> State {
        let scanner = &self.session.scanner;
        if scanner.failed() {
            State::Unknown
        } else if scanner.has_line() {
            State::Top
        } else {
            State::Done
        }
    }

    fn fail(&mut self, err: ParseError) -> State {
        self.session.scanner.fail(err);
        State::Unknown
    }

    fn top(&mut self) -> State {
        let line = self.session.scanner.line();
        if starts_with_keyword(line, b"loop_") {
            State::Loop
        } else if line.starts_with(b"_") {
            State::DataItem
        } else if starts_with_keyword(line, b"data_") {
            let name = line[5..]
                .split(|b| b.is_ascii_whitespace())
                .next()
                .unwrap_or_default();
            match str::from_utf8(name) {
                Ok(name) if self.extract.block_name.is_none() => {
                    self.extract.block_name = Some(name.to_string());
                }
                Ok(name) => log::debug!("ignoring header of additional block data_{name}"),
                Err(err) => return self.fail(err.into()),
            }
            self.step()
        } else if starts_with_keyword(line, b"save_") || starts_with_keyword(line, b"global_") {
            self.fail(ParseError::new(
                ParseErrorKind::UnknownConstruct,
                "save frames and global blocks are not supported",
            ))
        } else {
            self.fail(ParseError::new(
                ParseErrorKind::UnknownConstruct,
                "expected data_, loop_, or a data item name",
            ))
        }
    }

    fn loop_header(&mut self) -> State {
        self.header.clear();
        loop {
            match self.session.scanner.advance() {
                Step::Line => {}
                Step::Eof => break,
                Step::Failed => return State::Unknown,
            }
            let line = self.session.scanner.line();
            if !line.starts_with(b"_") {
                break;
            }
            let name = line
                .split(|b| b.is_ascii_whitespace())
                .next()
                .unwrap_or_default();
            match str::from_utf8(name) {
                Ok(name) => self.header.push(name.to_string()),
                Err(err) => return self.fail(err.into()),
            }
        }
        if self.header.is_empty() {
            return self.fail(ParseError::new(
                ParseErrorKind::LoopMismatch,
                "loop_ without tags",
            ));
        }
        State::LoopHeader
    }

    fn classify_loop(&mut self) -> State {
        let first = self.header[0].as_str();
        let category = first.split_once('.').map_or(first, |(category, _)| category);
        let next = if category.eq_ignore_ascii_case("_atom_site") {
            State::AtomSiteTable
        } else if let Some(key) = self.tables.lookup(category) {
            self.table_key = Some(key.to_string());
            State::GenericTable
        } else {
            State::SkipTable
        };
        log::debug!(
            "loop {category} with {} columns at line {}: {next:?}",
            self.header.len(),
            self.session.scanner.line_number()
        );
        next
    }

    fn atom_site_table(&mut self) -> State {
        self.saw_atom_site = true;
        match pipeline::stream_atom_site(
            &mut self.session,
            &self.header,
            &self.filter,
            &mut self.extract,
        ) {
            Ok(stats) => {
                log::debug!(
                    "_atom_site: {} rows, {} kept, standard layout: {}, batches {} new / {} reused",
                    stats.rows,
                    stats.kept,
                    stats.fast_path,
                    self.session.pool.allocated(),
                    self.session.pool.reused()
                );
                self.after_table()
            }
            Err(err) => self.fail(err),
        }
    }

    fn generic_table(&mut self) -> State {
        let Some(key) = self.table_key.take() else {
            return State::SkipTable;
        };
        let width = self.header.len();
        let mut rows = Vec::new();
        let mut pending: Vec<String> = Vec::with_capacity(width);

        while self.session.scanner.has_line() && !is_directive(self.session.scanner.line()) {
            let parsed = if self.session.scanner.line().starts_with(b";") {
                self.read_text_field(true).map(|text| pending.push(text))
            } else {
                owned_tokens(self.session.scanner.line()).map(|values| pending.extend(values))
            };
            if let Err(err) = parsed {
                return self.fail(err);
            }
            while pending.len() >= width {
                rows.push(pending.drain(..width).collect::<Vec<_>>());
            }
            if self.session.scanner.advance() == Step::Failed {
                return State::Unknown;
            }
        }

        if pending.is_empty() {
            self.extract.tables.insert(
                key,
                Table {
                    columns: self.header.clone(),
                    rows,
                },
            );
        } else {
            log::warn!(
                "dropping table {key}: {} trailing values do not fill a row of {width}",
                pending.len()
            );
        }
        self.after_table()
    }

    fn skip_table(&mut self) -> State {
        while self.session.scanner.has_line() && !is_directive(self.session.scanner.line()) {
            if self.session.scanner.line().starts_with(b";") {
                if let Err(err) = self.read_text_field(false) {
                    return self.fail(err);
                }
            }
            if self.session.scanner.advance() == Step::Failed {
                return State::Unknown;
            }
        }
        self.after_table()
    }

    fn data_item(&mut self) -> State {
        let (name, key, value) = match split_item(self.session.scanner.line(), &self.items) {
            Ok(parts) => parts,
            Err(err) => return self.fail(err),
        };

        let value = match value {
            Some(value) => value,
            None => match self.value_on_next_line(&name, key.is_some()) {
                Ok(value) => value,
                Err(err) => return self.fail(err),
            },
        };
        if let Some(key) = key {
            self.extract.items.insert(key, value);
        }
        self.step()
    }

    /// Read the value of `name` from the line after its name: either a plain
    /// token or a `;` text field.
    fn value_on_next_line(&mut self, name: &str, keep: bool) -> Result<String> {
        match self.session.scanner.advance() {
            Step::Line => {}
            Step::Eof => {
                return Err(ParseError::new(
                    ParseErrorKind::MissingValue,
                    format!("no value for {name} before end of input"),
                ))
            }
            Step::Failed => return Err(stream_failed()),
        }
        let line = self.session.scanner.line();
        if line.starts_with(b";") {
            return self.read_text_field(keep);
        }
        if is_directive(line) {
            return Err(ParseError::new(
                ParseErrorKind::MissingValue,
                format!("no value for {name}"),
            ));
        }
        let mut tokens = Vec::new();
        tokenize(line, &mut tokens)?;
        match tokens.first() {
            Some(value) => Ok(str::from_utf8(value)?.to_string()),
            None => Err(ParseError::new(
                ParseErrorKind::MissingValue,
                format!("no value for {name}"),
            )),
        }
    }

    /// Consume a `;` text field that opens on the current line, leaving the
    /// scanner on the closing `;` line. Interior lines are joined without a
    /// separator; the text is only collected when `keep` is set.
    fn read_text_field(&mut self, keep: bool) -> Result<String> {
        let scanner = &mut self.session.scanner;
        let opened = scanner.line_number();
        let mut text = String::new();
        if keep {
            text.push_str(str::from_utf8(&scanner.line()[1..])?);
        }
        loop {
            match scanner.advance() {
                Step::Line => {}
                Step::Eof => {
                    return Err(ParseError::new(
                        ParseErrorKind::TextField,
                        format!("text field opened at line {opened} is never closed"),
                    ))
                }
                Step::Failed => return Err(stream_failed()),
            }
            let line = scanner.line();
            if line.starts_with(b";") {
                return Ok(text);
            }
            if keep {
                text.push_str(str::from_utf8(line)?);
            }
        }
    }
}

/// Split a data item line into its name, the registered key when the item
/// is wanted, and the inline value when one follows the name.
fn split_item(
    line: &[u8],
    items: &NameRegistry,
) -> Result<(String, Option<String>, Option<String>)> {
    let mut tokens = Vec::new();
    tokenize(line, &mut tokens)?;
    let Some(name) = tokens.first() else {
        return Err(ParseError::new(ParseErrorKind::UnknownConstruct, "empty data item"));
    };
    let name = str::from_utf8(name)?;
    let key = items.lookup(name).map(str::to_string);
    let value = match tokens.get(1) {
        Some(value) => Some(str::from_utf8(value)?.to_string()),
        None => None,
    };
    Ok((name.to_string(), key, value))
}

fn owned_tokens(line: &[u8]) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    tokenize(line, &mut tokens)?;
    tokens
        .into_iter()
        .map(|token| Ok(str::from_utf8(token)?.to_string()))
        .collect()
}

/// Placeholder returned once the scanner has latched its own failure; the
/// latched error is what the caller eventually sees.
fn stream_failed() -> ParseError {
    ParseError::new(ParseErrorKind::Io, "input stream failed")
}
