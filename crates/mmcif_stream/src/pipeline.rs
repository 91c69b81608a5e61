//! Two-stage streaming of the `_atom_site` loop.
//!
//! The producer runs on the scanning thread: it copies cleaned lines into
//! pooled [`LineBatch`]es and sends full batches down a bounded queue. The
//! consumer runs on a scoped thread, decodes only the rows that pass the
//! filter, and grows the per-chain snapshots in place. Completion is reported
//! once, over a oneshot, after the queue has been drained.
//!
//! Each batch is owned by exactly one side at a time: the producer fills it,
//! the consumer reads it and hands it back over the recycle channel. The
//! result is touched only by the consumer while the table is streaming.

use std::io::BufRead;
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use futures::channel::{mpsc, oneshot};
use futures::executor::{block_on, block_on_stream};
use futures::SinkExt;
use once_cell::unsync::OnceCell;

use crate::atom::{parse_model, AtomRow};
use crate::columns::{AtomField, ColumnMap};
use crate::error::{ParseError, ParseErrorKind, Result};
use crate::model::{MmcifExtract, ModelSnapshot, ResidueLabels};
use crate::options::RowFilter;
use crate::parser::ParseSession;
use crate::pool::LineBatch;
use crate::scanner::{is_directive, Step};
use crate::tokenizer::tokenize;

/// Batches in flight between producer and consumer.
pub(crate) const QUEUE_DEPTH: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TableStats {
    pub rows: usize,
    pub kept: usize,
    pub fast_path: bool,
}

/// Stream one `_atom_site` loop into `extract`.
///
/// The scanner must sit on the first line after the loop header. On return
/// it sits on the first line that does not belong to the table, or has
/// latched a failure.
pub(crate) fn stream_atom_site<R: BufRead>(
    session: &mut ParseSession<R>,
    header: &[String],
    filter: &RowFilter,
    extract: &mut MmcifExtract,
) -> Result<TableStats> {
    let (batch_tx, batch_rx) = mpsc::channel::<LineBatch>(QUEUE_DEPTH);
    let (recycle_tx, recycle_rx) = mpsc::unbounded::<LineBatch>();
    let (done_tx, done_rx) = oneshot::channel::<Result<TableStats>>();
    let cancelled = AtomicBool::new(false);

    let (rows, outcome) = thread::scope(|scope| {
        let cancelled = &cancelled;
        scope.spawn(move || {
            let consumer = Consumer {
                header,
                columns: OnceCell::new(),
                filter,
                cancelled,
                assembler: Assembler {
                    extract,
                    building: None,
                },
                stats: TableStats::default(),
            };
            consumer.run(batch_rx, recycle_tx, done_tx);
        });
        let rows = produce(session, batch_tx, recycle_rx, cancelled);
        let outcome = block_on(done_rx).unwrap_or_else(|_| {
            Err(ParseError::new(
                ParseErrorKind::Io,
                "coordinate decoder stopped without reporting",
            ))
        });
        (rows, outcome)
    });

    let stats = outcome?;
    if rows == 0 && !session.scanner.failed() {
        return Err(ParseError::new(
            ParseErrorKind::EmptyTable,
            "_atom_site loop has no rows",
        ));
    }
    Ok(TableStats { rows, ..stats })
}

/// Copy table lines into batches until a directive, end of input, or a
/// scanner failure. Returns the number of rows seen.
fn produce<R: BufRead>(
    session: &mut ParseSession<R>,
    mut batches: mpsc::Sender<LineBatch>,
    mut recycled: mpsc::UnboundedReceiver<LineBatch>,
    cancelled: &AtomicBool,
) -> usize {
    let mut hint = 0;
    let mut batch = session.pool.acquire(hint);
    let mut rows = 0;
    let mut hung_up = false;

    while session.scanner.has_line() && !is_directive(session.scanner.line()) {
        rows += 1;
        if !hung_up {
            batch.push(session.scanner.line_number(), session.scanner.line());
            if batch.is_full() {
                hint = batch.byte_len();
                let full = std::mem::take(&mut batch);
                if block_on(batches.send(full)).is_err() {
                    // consumer gave up; keep walking to the end of the table
                    hung_up = true;
                } else {
                    while let Ok(returned) = recycled.try_recv() {
                        session.pool.release(returned);
                    }
                    batch = session.pool.acquire(hint);
                }
            }
        }
        match session.scanner.advance() {
            Step::Line => {}
            Step::Eof => break,
            Step::Failed => {
                cancelled.store(true, Ordering::Release);
                break;
            }
        }
    }

    if !hung_up && !batch.is_empty() && !cancelled.load(Ordering::Acquire) {
        let _ = block_on(batches.send(batch));
    } else {
        session.pool.release(batch);
    }
    drop(batches);
    while let Ok(returned) = recycled.try_recv() {
        session.pool.release(returned);
    }
    rows
}

struct Consumer<'a> {
    header: &'a [String],
    columns: OnceCell<ColumnMap>,
    filter: &'a RowFilter,
    cancelled: &'a AtomicBool,
    assembler: Assembler<'a>,
    stats: TableStats,
}

impl<'a> Consumer<'a> {
    fn run(
        mut self,
        batches: mpsc::Receiver<LineBatch>,
        recycle: mpsc::UnboundedSender<LineBatch>,
        done: oneshot::Sender<Result<TableStats>>,
    ) {
        for batch in block_on_stream(batches) {
            if !self.is_cancelled() {
                log::trace!("decoding batch of {} lines", batch.len());
                if let Err(err) = self.consume_batch(&batch) {
                    let _ = done.send(Err(err));
                    return;
                }
            }
            let _ = recycle.unbounded_send(batch);
        }
        if !self.is_cancelled() {
            self.assembler.flush();
        }
        self.stats.fast_path = self.columns.get().is_some_and(ColumnMap::used_fast_path);
        let _ = done.send(Ok(self.stats));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn consume_batch(&mut self, batch: &LineBatch) -> Result<()> {
        let mut tokens = Vec::with_capacity(self.header.len());
        for (line_number, line) in batch.lines() {
            if self.is_cancelled() {
                return Ok(());
            }
            self.consume_row(line, &mut tokens)
                .map_err(|err| err.at_line(line_number, line))?;
        }
        Ok(())
    }

    fn consume_row<'b>(&mut self, line: &'b [u8], tokens: &mut Vec<&'b [u8]>) -> Result<()> {
        tokenize(line, tokens)?;
        let header = self.header;
        let columns = self.columns.get_or_try_init(|| ColumnMap::resolve(header))?;
        if tokens.len() < columns.width() {
            return Err(ParseError::new(
                ParseErrorKind::LoopMismatch,
                format!(
                    "too few components: expected {} values, found {}",
                    columns.width(),
                    tokens.len()
                ),
            ));
        }

        let model = parse_model(tokens[columns.index(AtomField::Model)])?;
        if !self.filter.keeps_model(model)
            || !self.filter.keeps_chain(tokens[columns.index(AtomField::AuthAsym)])
            || !self.filter.keeps_atom(tokens[columns.index(AtomField::AuthAtom)])
        {
            return Ok(());
        }

        let row = AtomRow::decode(tokens, columns, model)?;
        self.stats.kept += 1;
        self.assembler.apply(&row)
    }
}

/// Turns decoded rows into snapshots and commits them to the result.
struct Assembler<'a> {
    extract: &'a mut MmcifExtract,
    building: Option<Building>,
}

impl Assembler<'_> {
    fn apply(&mut self, row: &AtomRow<'_>) -> Result<()> {
        let switched = self
            .building
            .as_ref()
            .map_or(true, |current| current.chain.as_bytes() != row.chain || current.model != row.model);
        if switched {
            self.flush();
            let chain = str::from_utf8(row.chain)?.to_string();
            let track_labels = self
                .extract
                .chain(&chain)
                .map_or(true, |known| known.first_model_number() == Some(row.model));
            self.building = Some(Building::new(chain, row.model, track_labels));
        }
        match self.building.as_mut() {
            Some(building) => building.add(row),
            None => Ok(()),
        }
    }

    fn flush(&mut self) {
        if let Some(done) = self.building.take() {
            self.extract.commit(&done.chain, done.snapshot, done.labels);
        }
    }
}

/// Snapshot of one chain/model under construction.
struct Building {
    chain: String,
    model: u32,
    snapshot: ModelSnapshot,
    labels: ResidueLabels,
    track_labels: bool,
    seq: Option<i32>,
    ins_code: Vec<u8>,
}

impl Building {
    fn new(chain: String, model: u32, track_labels: bool) -> Self {
        Self {
            chain,
            model,
            snapshot: ModelSnapshot::new(model),
            labels: ResidueLabels::default(),
            track_labels,
            seq: None,
            ins_code: Vec::new(),
        }
    }

    fn add(&mut self, row: &AtomRow<'_>) -> Result<()> {
        let atom = str::from_utf8(row.atom)?;
        let first = self.snapshot.residue_count == 0;
        // HETATM groups (waters, ligands) often share one sequence label;
        // a repeated atom name means the next molecule has begun.
        let repeated = row.is_hetatm() && self.snapshot.holds_current(atom);
        if first || row.seq != self.seq || row.ins_code != self.ins_code.as_slice() || repeated {
            self.snapshot.push_residue();
            self.seq = row.seq;
            self.ins_code.clear();
            self.ins_code.extend_from_slice(row.ins_code);
            if self.track_labels {
                self.labels.push(
                    row.seq,
                    str::from_utf8(row.ins_code)?,
                    str::from_utf8(row.residue)?,
                );
            }
        }
        self.snapshot.record(atom, row.position);
        Ok(())
    }
}
