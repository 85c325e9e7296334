use crate::batch::{StagingBatch, VectorRecord};
use crate::hash::ContentHash;
use crate::scope::{
    Document, DocumentMetadata, FlatL2Index, RankedDocument, ScopedHandle, SearchOutcome,
    Selector,
};
use serde::{Deserialize, Serialize};
use smartpick_core::{SmartpickError, SmartpickResult};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const LOG_FORMAT: &str = "smartpick-vectors";
const LOG_VERSION: u32 = 1;

/// Rows reserved at a time when the columns need to grow.
const GROWTH_CHUNK: usize = 1024;

#[derive(Debug, Serialize, Deserialize)]
struct LogHeader {
    format: String,
    version: u32,
    dimension: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RowOp {
    Append,
    Overwrite,
}

/// One row write as read back from the log.
#[derive(Debug, Deserialize)]
struct RowWrite {
    op: RowOp,
    row: usize,
    hash: i64,
    page: i64,
    metadata: String,
    text: String,
    vector: Vec<f32>,
}

/// One row write as appended to the log.
#[derive(Serialize)]
struct RowWriteRef<'a> {
    op: RowOp,
    row: usize,
    hash: i64,
    page: i64,
    metadata: &'a str,
    text: &'a str,
    vector: &'a [f32],
}

/// Outcome of a [`PersistentVectorStore::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Rows added at the end of the store.
    pub appended: usize,
    /// Existing rows replaced in place.
    pub overwritten: usize,
}

/// Parallel column storage; `vectors` is row-major `N × d`.
#[derive(Debug, Default)]
struct Columns {
    vectors: Vec<f32>,
    metadata: Vec<String>,
    hash_table: Vec<i64>,
    page: Vec<i64>,
    text: Vec<String>,
}

impl Columns {
    fn len(&self) -> usize {
        self.hash_table.len()
    }

    fn vector(&self, row: usize, dimension: usize) -> &[f32] {
        &self.vectors[row * dimension..(row + 1) * dimension]
    }

    /// Make room for `additional` rows, growing in whole chunks.
    fn reserve_rows(&mut self, additional: usize, dimension: usize) {
        let needed = self.len() + additional;
        if needed <= self.hash_table.capacity() {
            return;
        }
        let target = needed.div_ceil(GROWTH_CHUNK) * GROWTH_CHUNK;
        let extra = target - self.len();
        self.vectors.reserve_exact(extra * dimension);
        self.metadata.reserve_exact(extra);
        self.hash_table.reserve_exact(extra);
        self.page.reserve_exact(extra);
        self.text.reserve_exact(extra);
    }

    fn push(&mut self, hash: i64, page: i64, metadata: String, text: String, vector: &[f32]) {
        self.vectors.extend_from_slice(vector);
        self.metadata.push(metadata);
        self.hash_table.push(hash);
        self.page.push(page);
        self.text.push(text);
    }

    fn overwrite(&mut self, row: usize, dimension: usize, metadata: String, text: String, vector: &[f32]) {
        self.vectors[row * dimension..(row + 1) * dimension].copy_from_slice(vector);
        self.metadata[row] = metadata;
        self.text[row] = text;
    }
}

/// Durable, append-only, hash-addressed column store of embeddings.
///
/// Rows are keyed by [`ContentHash`] of `(metadata, page)`: flushing a record
/// whose hash and page already exist overwrites that row in place, anything
/// else appends. Rows are never deleted.
///
/// The backing file is a JSON-lines log: a header line carrying the fixed
/// dimension, then one line per row write. Opening the store replays the log.
///
/// One writer per file. Every mutating method takes `&mut self`, which keeps a
/// single process honest; two processes appending to the same file, or a
/// reader racing an append, are unsupported.
pub struct PersistentVectorStore {
    id: Uuid,
    path: PathBuf,
    dimension: usize,
    columns: Columns,
    /// First row stored under each hash.
    hash_rows: HashMap<i64, usize>,
    writer: Option<BufWriter<File>>,
}

impl PersistentVectorStore {
    /// Open the store at `path`, creating an empty one if the file is absent.
    ///
    /// Fails with a configuration error when the file was written with a
    /// different dimension or cannot be parsed.
    pub fn open(path: impl Into<PathBuf>, dimension: usize) -> SmartpickResult<Self> {
        if dimension == 0 {
            return Err(SmartpickError::Config(
                "Vector store dimension must be greater than zero".to_string(),
            ));
        }
        let mut store = Self {
            id: Uuid::new_v4(),
            path: path.into(),
            dimension,
            columns: Columns::default(),
            hash_rows: HashMap::new(),
            writer: None,
        };
        store.load()?;
        info!(
            path = %store.path.display(),
            rows = store.len(),
            dimension,
            "vector store opened"
        );
        Ok(store)
    }

    /// Flush pending writes and release the file. Every later call except
    /// [`reopen`](Self::reopen) fails with a precondition error.
    pub fn close(&mut self) -> SmartpickResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!(path = %self.path.display(), "vector store closed");
        }
        Ok(())
    }

    /// Re-read the log from disk and reacquire the file. No-op when open.
    ///
    /// Handles issued before the close stay valid, since rows are never removed.
    pub fn reopen(&mut self) -> SmartpickResult<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        self.load()?;
        info!(path = %self.path.display(), rows = self.len(), "vector store reopened");
        Ok(())
    }

    /// Whether the store accepts access.
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Fixed vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Backing log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no row is stored.
    pub fn is_empty(&self) -> bool {
        self.columns.len() == 0
    }

    /// Copy of row `row`, if it exists.
    pub fn record(&self, row: usize) -> SmartpickResult<Option<VectorRecord>> {
        self.ensure_open()?;
        if row >= self.len() {
            return Ok(None);
        }
        Ok(Some(self.row_record(row)))
    }

    /// Persist a staged batch, consuming it.
    ///
    /// For each record: if its content hash is already stored **and** the
    /// stored page matches, that row's vector, metadata and text are
    /// overwritten in place; otherwise the record is appended. Records later
    /// in the batch see the effect of earlier ones.
    pub fn flush(&mut self, batch: StagingBatch) -> SmartpickResult<FlushReport> {
        self.ensure_open()?;
        if batch.dimension() != self.dimension {
            return Err(SmartpickError::Config(format!(
                "Batch dimension {} does not match store dimension {}",
                batch.dimension(),
                self.dimension
            )));
        }

        // Plan every write before touching the file so a failed write leaves
        // the in-memory columns untouched.
        let records = batch.into_records();
        let mut plan: Vec<(RowOp, usize, i64)> = Vec::with_capacity(records.len());
        let mut pending: HashMap<i64, (usize, i64)> = HashMap::new();
        let mut next_row = self.len();

        for record in &records {
            let hash = record.content_hash().value();
            let existing = self
                .hash_rows
                .get(&hash)
                .map(|&row| (row, self.columns.page[row]))
                .or_else(|| pending.get(&hash).copied());

            match existing {
                Some((row, page)) if page == record.page => {
                    plan.push((RowOp::Overwrite, row, hash));
                }
                _ => {
                    plan.push((RowOp::Append, next_row, hash));
                    if existing.is_none() {
                        pending.insert(hash, (next_row, record.page));
                    }
                    next_row += 1;
                }
            }
        }

        let mut buf = String::new();
        for (record, &(op, row, hash)) in records.iter().zip(plan.iter()) {
            let line = serde_json::to_string(&RowWriteRef {
                op,
                row,
                hash,
                page: record.page,
                metadata: &record.metadata,
                text: &record.text,
                vector: &record.vector,
            })?;
            buf.push_str(&line);
            buf.push('\n');
        }
        let writer = self.writer_mut()?;
        writer.flush()?;
        let file = writer.get_mut();
        let start = file.metadata()?.len();
        if let Err(e) = write_or_rollback(file, buf.as_bytes(), |f| f.set_len(start)) {
            warn!(error = %e, "row write failed, log truncated to last complete row");
            return Err(e.into());
        }

        let mut report = FlushReport::default();
        let appends = plan.iter().filter(|p| p.0 == RowOp::Append).count();
        self.columns.reserve_rows(appends, self.dimension);

        for (record, (op, row, hash)) in records.into_iter().zip(plan) {
            match op {
                RowOp::Overwrite => {
                    info!(
                        metadata = %record.metadata,
                        page = record.page,
                        row,
                        "overwrote existing row"
                    );
                    self.columns.overwrite(
                        row,
                        self.dimension,
                        record.metadata,
                        record.text,
                        &record.vector,
                    );
                    report.overwritten += 1;
                }
                RowOp::Append => {
                    self.columns.push(
                        hash,
                        record.page,
                        record.metadata,
                        record.text,
                        &record.vector,
                    );
                    self.hash_rows.entry(hash).or_insert(row);
                    report.appended += 1;
                }
            }
        }

        if report.appended > 0 {
            info!(appended = report.appended, rows = self.len(), "appended new rows");
        }
        Ok(report)
    }

    /// Rows whose `(metadata, page)` is selected, as a batch.
    ///
    /// Scans the whole hash column, O(N) in the number of stored rows.
    pub fn load_by_hash(&self, selector: Selector<'_>) -> SmartpickResult<StagingBatch> {
        self.ensure_open()?;
        let rows = self.matching_rows(&selector)?;
        let mut batch = StagingBatch::new(self.dimension);
        batch.extend(rows.into_iter().map(|row| self.row_record(row)))?;
        Ok(batch)
    }

    /// Build the search universe for one logical query.
    ///
    /// Matching nothing is not an error: the returned handle is empty and a
    /// search on it yields [`SearchOutcome::NoCandidates`].
    pub fn scope(&self, selector: Selector<'_>) -> SmartpickResult<ScopedHandle> {
        self.ensure_open()?;
        let rows = self.matching_rows(&selector)?;
        if rows.is_empty() {
            info!("scope matched no stored rows");
        } else {
            debug!(rows = rows.len(), "scope established");
        }
        Ok(ScopedHandle::new(self.id, rows))
    }

    /// Exact k-nearest-neighbour search restricted to `handle`.
    ///
    /// A query vector whose length differs from the store dimension is a
    /// configuration error. An empty handle returns
    /// [`SearchOutcome::NoCandidates`]. Only rows in the handle can appear in
    /// the result, closest (smallest squared L2 distance) first.
    pub fn search(
        &self,
        handle: &ScopedHandle,
        query_vector: &[f32],
        k: usize,
    ) -> SmartpickResult<SearchOutcome> {
        self.ensure_open()?;
        self.check_handle(handle)?;
        if query_vector.len() != self.dimension {
            return Err(SmartpickError::Config(format!(
                "Vector dimension mismatch: store {}, query {}",
                self.dimension,
                query_vector.len()
            )));
        }
        if handle.is_empty() {
            return Ok(SearchOutcome::NoCandidates);
        }

        let mut index = FlatL2Index::with_capacity(self.dimension, handle.len());
        for &row in handle.rows() {
            index.add(row, self.columns.vector(row, self.dimension));
        }

        let ranked = index
            .search(query_vector, k)
            .into_iter()
            .map(|(row, distance)| RankedDocument {
                document: self.row_document(row),
                distance,
                row,
            })
            .collect();
        Ok(SearchOutcome::Ranked(ranked))
    }

    /// Convert the rows of `batch` into documents, reading stored content.
    ///
    /// Only rows inside `handle` are converted; batch rows whose key is
    /// outside the scope are skipped with a warning. This asymmetry with
    /// [`from_documents`](Self::from_documents) is intentional: documents
    /// always describe what the current query may see.
    pub fn to_document(
        &self,
        batch: &StagingBatch,
        handle: &ScopedHandle,
    ) -> SmartpickResult<Vec<Document>> {
        self.ensure_open()?;
        self.check_handle(handle)?;
        if handle.is_empty() {
            info!("no scoped rows to convert");
            return Ok(Vec::new());
        }

        let scoped: HashMap<i64, usize> = handle
            .rows()
            .iter()
            .map(|&row| (self.columns.hash_table[row], row))
            .collect();

        let mut docs = Vec::with_capacity(batch.len());
        for hash in batch.hashes() {
            match scoped.get(&hash.value()) {
                Some(&row) => docs.push(self.row_document(row)),
                None => warn!(hash = %hash, "row not in active scope, skipped"),
            }
        }
        Ok(docs)
    }

    /// Rebuild a batch from documents without re-embedding.
    ///
    /// Every document must carry its vector.
    pub fn from_documents(&self, docs: &[Document]) -> SmartpickResult<StagingBatch> {
        let mut batch = StagingBatch::new(self.dimension);
        for doc in docs {
            let vector = doc.metadata.vectors.clone().ok_or_else(|| {
                SmartpickError::InvalidRecord(format!(
                    "Document '{}' page {} carries no vector",
                    doc.metadata.index, doc.metadata.page
                ))
            })?;
            batch.push(VectorRecord::new(
                vector,
                doc.metadata.index.clone(),
                doc.metadata.page,
                doc.page_content.clone(),
            ))?;
        }
        Ok(batch)
    }

    /// Rewrite the log as a single append per row, dropping overwrite history.
    pub fn compact(&mut self) -> SmartpickResult<()> {
        self.ensure_open()?;
        self.close()?;

        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            write_header(&mut out, self.dimension)?;
            for row in 0..self.len() {
                let line = serde_json::to_string(&RowWriteRef {
                    op: RowOp::Append,
                    row,
                    hash: self.columns.hash_table[row],
                    page: self.columns.page[row],
                    metadata: &self.columns.metadata[row],
                    text: &self.columns.text[row],
                    vector: self.columns.vector(row, self.dimension),
                })?;
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        self.writer = Some(BufWriter::new(
            OpenOptions::new().append(true).open(&self.path)?,
        ));
        info!(path = %self.path.display(), rows = self.len(), "vector log compacted");
        Ok(())
    }

    // --- internals ---

    fn ensure_open(&self) -> SmartpickResult<()> {
        if self.writer.is_none() {
            return Err(SmartpickError::Precondition(format!(
                "Vector store '{}' is closed; call reopen() first",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn writer_mut(&mut self) -> SmartpickResult<&mut BufWriter<File>> {
        let path = self.path.display().to_string();
        self.writer.as_mut().ok_or_else(|| {
            SmartpickError::Precondition(format!("Vector store '{path}' is closed"))
        })
    }

    fn check_handle(&self, handle: &ScopedHandle) -> SmartpickResult<()> {
        if handle.store_id() != self.id {
            return Err(SmartpickError::Precondition(
                "Scoped handle was issued by a different vector store".to_string(),
            ));
        }
        if let Some(&last) = handle.rows().last() {
            if last >= self.len() {
                return Err(SmartpickError::Precondition(format!(
                    "Scoped handle refers to row {last} but the store holds {} rows",
                    self.len()
                )));
            }
        }
        Ok(())
    }

    fn matching_rows(&self, selector: &Selector<'_>) -> SmartpickResult<Vec<usize>> {
        let wanted: HashSet<i64> = selector
            .hashes()?
            .into_iter()
            .map(ContentHash::value)
            .collect();
        Ok(self
            .columns
            .hash_table
            .iter()
            .enumerate()
            .filter(|(_, h)| wanted.contains(h))
            .map(|(row, _)| row)
            .collect())
    }

    fn row_record(&self, row: usize) -> VectorRecord {
        VectorRecord::new(
            self.columns.vector(row, self.dimension).to_vec(),
            self.columns.metadata[row].clone(),
            self.columns.page[row],
            self.columns.text[row].clone(),
        )
    }

    fn row_document(&self, row: usize) -> Document {
        Document {
            page_content: self.columns.text[row].clone(),
            metadata: DocumentMetadata {
                index: self.columns.metadata[row].clone(),
                page: self.columns.page[row],
                vectors: Some(self.columns.vector(row, self.dimension).to_vec()),
            },
        }
    }

    /// Replay the log into fresh columns and open the file for appending.
    fn load(&mut self) -> SmartpickResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let fresh = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        self.columns = Columns::default();
        self.hash_rows.clear();

        if fresh {
            let mut out = BufWriter::new(File::create(&self.path)?);
            write_header(&mut out, self.dimension)?;
            out.flush()?;
        } else {
            self.replay()?;
        }

        self.writer = Some(BufWriter::new(
            OpenOptions::new().append(true).open(&self.path)?,
        ));
        Ok(())
    }

    fn replay(&mut self) -> SmartpickResult<()> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut lines = reader.lines().enumerate();

        let header_line = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err(self.corrupt(1, "missing header")),
            }
        };
        let header: LogHeader = serde_json::from_str(&header_line)
            .map_err(|e| self.corrupt(1, &format!("invalid header: {e}")))?;
        if header.format != LOG_FORMAT || header.version != LOG_VERSION {
            return Err(self.corrupt(
                1,
                &format!("unsupported format {} v{}", header.format, header.version),
            ));
        }
        if header.dimension != self.dimension {
            return Err(SmartpickError::Config(format!(
                "Vector store '{}' has dimension {}, but {} was requested",
                self.path.display(),
                header.dimension,
                self.dimension
            )));
        }

        for (idx, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let line_no = idx + 1;
            let write: RowWrite = serde_json::from_str(&line)
                .map_err(|e| self.corrupt(line_no, &e.to_string()))?;
            self.apply_replayed(write, line_no)?;
        }
        Ok(())
    }

    fn apply_replayed(&mut self, write: RowWrite, line_no: usize) -> SmartpickResult<()> {
        if write.vector.len() != self.dimension {
            return Err(self.corrupt(
                line_no,
                &format!("vector has {} floats", write.vector.len()),
            ));
        }
        if ContentHash::of(&write.metadata, write.page).value() != write.hash {
            return Err(self.corrupt(line_no, "hash does not match (metadata, page)"));
        }

        match write.op {
            RowOp::Append => {
                if write.row != self.len() {
                    return Err(self.corrupt(
                        line_no,
                        &format!("append to row {} with {} rows stored", write.row, self.len()),
                    ));
                }
                self.columns.reserve_rows(1, self.dimension);
                self.columns.push(
                    write.hash,
                    write.page,
                    write.metadata,
                    write.text,
                    &write.vector,
                );
                self.hash_rows.entry(write.hash).or_insert(write.row);
            }
            RowOp::Overwrite => {
                if write.row >= self.len() || self.columns.hash_table[write.row] != write.hash {
                    return Err(self.corrupt(
                        line_no,
                        &format!("overwrite of unknown row {}", write.row),
                    ));
                }
                self.columns.overwrite(
                    write.row,
                    self.dimension,
                    write.metadata,
                    write.text,
                    &write.vector,
                );
            }
        }
        Ok(())
    }

    fn corrupt(&self, line_no: usize, reason: &str) -> SmartpickError {
        SmartpickError::Config(format!(
            "Corrupt vector store '{}' at line {line_no}: {reason}",
            self.path.display()
        ))
    }
}

/// Write `bytes` in full, or run `rollback` so no torn line is left behind.
fn write_or_rollback<W: Write>(
    out: &mut W,
    bytes: &[u8],
    rollback: impl FnOnce(&mut W) -> std::io::Result<()>,
) -> std::io::Result<()> {
    if let Err(e) = out.write_all(bytes).and_then(|()| out.flush()) {
        rollback(out)?;
        return Err(e);
    }
    Ok(())
}

fn write_header(out: &mut impl Write, dimension: usize) -> SmartpickResult<()> {
    let header = serde_json::to_string(&LogHeader {
        format: LOG_FORMAT.to_string(),
        version: LOG_VERSION,
        dimension,
    })?;
    out.write_all(header.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
}
