use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use wb_schemas::{IndexedLocation, LedgerRecord, Order};

use crate::{LedgerStore, LocationIndex, OrderLease, OrderStore, Store};

const ORDERS_DIR: &str = "orders";
const LOCKS_DIR: &str = "locks";
const LEDGER_FILE: &str = "ledger.jsonl";
const LOCATIONS_FILE: &str = "locations.jsonl";
const STORE_LOCK_FILE: &str = "store.lock";

/// Directory-backed store, safe to share between processes.
///
/// Layout:
/// ```text
/// <root>/orders/<order_id>.json   one document per order (temp file + rename)
/// <root>/ledger.jsonl             one canonical JSON record per line
/// <root>/locations.jsonl          one canonical JSON entry per line
/// <root>/locks/<order_id>.lock    per-order advisory lock (see `lock_order`)
/// <root>/store.lock               exclusive while appending, shared while reading heads
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes appends from this process so lines never interleave.
    append_lock: Mutex<()>,
    heads: Mutex<HeadCache>,
}

impl FileStore {
    /// Opens (and creates, if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [root.join(ORDERS_DIR), root.join(LOCKS_DIR)] {
            fs::create_dir_all(&dir).with_context(|| format!("create_dir_all {:?}", dir))?;
        }
        Ok(Self {
            root,
            append_lock: Mutex::new(()),
            heads: Mutex::new(HeadCache::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    pub fn locations_path(&self) -> PathBuf {
        self.root.join(LOCATIONS_FILE)
    }

    fn order_path(&self, order_id: &str) -> Option<PathBuf> {
        is_safe_file_stem(order_id).then(|| self.root.join(ORDERS_DIR).join(format!("{order_id}.json")))
    }

    /// Store-wide flock. Released when the returned file drops.
    fn store_lock(&self, exclusive: bool) -> Result<File> {
        let path = self.root.join(STORE_LOCK_FILE);
        let f = open_lock_file(&path)?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&f)
        } else {
            FileExt::lock_shared(&f)
        };
        locked.with_context(|| format!("lock {:?}", path))?;
        Ok(f)
    }

    fn append_json_line<T: Serialize>(&self, path: &Path, v: &T) -> Result<()> {
        let line = encode_line(v)?;
        let _guard = self.append_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _store = self.store_lock(true)?;
        append_raw(path, &line)
    }

    fn write_order(&self, order: &Order) -> Result<()> {
        let path = self
            .order_path(&order.order_id)
            .with_context(|| format!("order id not usable as a file name: {:?}", order.order_id))?;
        let tmp = path.with_extension("json.tmp");

        let body = serde_json::to_string_pretty(order).context("serialize order failed")?;
        let written = (|| -> Result<()> {
            let mut f = File::create(&tmp).with_context(|| format!("create {:?}", tmp))?;
            f.write_all(body.as_bytes())
                .with_context(|| format!("write {:?}", tmp))?;
            f.sync_all().with_context(|| format!("sync {:?}", tmp))?;
            fs::rename(&tmp, &path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))
        })();
        if written.is_err() && tmp.is_file() {
            let _ = fs::remove_file(&tmp);
        }
        written?;
        debug!(order_id = %order.order_id, "order saved");
        Ok(())
    }
}

/// Order ids become file names; anything outside `[A-Za-z0-9_-]` is refused.
fn is_safe_file_stem(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 128
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("open lock {:?}", path))
}

fn encode_line<T: Serialize>(v: &T) -> Result<String> {
    let mut line = wb_codec::canonical_json_of(v)?;
    line.push('\n');
    Ok(line)
}

fn append_raw(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {:?}", path))?;
    f.write_all(line.as_bytes())
        .with_context(|| format!("append to {:?} failed", path))?;
    f.sync_data()
        .with_context(|| format!("sync {:?} failed", path))?;
    Ok(())
}

fn file_len(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(m) => Ok(m.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e).with_context(|| format!("stat {:?}", path)),
    }
}

/// Cut `path` back to `len` bytes, undoing appends made after `len` was read.
fn truncate_to(path: &Path, len: u64) -> Result<()> {
    if file_len(path)? == len {
        return Ok(());
    }
    let f = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("open {:?} for rollback", path))?;
    f.set_len(len)
        .with_context(|| format!("truncate {:?} to {len}", path))?;
    f.sync_data()
        .with_context(|| format!("sync {:?} failed", path))
}

fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("open {:?}", path)),
    };

    let mut out = Vec::new();
    for (i, line) in BufReader::new(f).lines().enumerate() {
        let line = line.with_context(|| format!("read {:?}", path))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let v = serde_json::from_str(trimmed)
            .with_context(|| format!("parse {:?} at line {}", path, i + 1))?;
        out.push(v);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Chain heads
// ---------------------------------------------------------------------------

/// Newest `record_hash` per order, built from `ledger.jsonl` incrementally.
/// Only complete lines are consumed, so `offset` always sits on a line start.
#[derive(Debug, Default)]
struct HeadCache {
    offset: u64,
    heads: HashMap<String, String>,
}

impl HeadCache {
    fn refresh(&mut self, path: &Path) -> Result<()> {
        if file_len(path)? < self.offset {
            *self = HeadCache::default();
        }
        if self.scan(path).is_err() {
            // The file was rewritten under us; start over.
            *self = HeadCache::default();
            self.scan(path)?;
        }
        Ok(())
    }

    fn scan(&mut self, path: &Path) -> Result<()> {
        let mut f = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("open {:?}", path)),
        };
        f.seek(SeekFrom::Start(self.offset))
            .with_context(|| format!("seek {:?}", path))?;

        let mut reader = BufReader::new(f);
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader
                .read_line(&mut line)
                .with_context(|| format!("read {:?}", path))?;
            if n == 0 || !line.ends_with('\n') {
                return Ok(());
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                let rec: LedgerRecord = serde_json::from_str(trimmed)
                    .with_context(|| format!("parse {:?} at byte {}", path, self.offset))?;
                self.heads.insert(rec.order_id, rec.record_hash);
            }
            self.offset += n as u64;
        }
    }
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

impl OrderStore for FileStore {
    fn load_order(&self, order_id: &str) -> Result<Option<Order>> {
        let Some(path) = self.order_path(order_id) else {
            return Ok(None);
        };
        let raw = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read order {:?}", path)),
        };
        let order = serde_json::from_str(&raw).with_context(|| format!("parse order {:?}", path))?;
        Ok(Some(order))
    }

    fn save_order(&self, order: &Order) -> Result<()> {
        self.write_order(order)
    }

    fn list_orders(&self) -> Result<Vec<Order>> {
        let dir = self.root.join(ORDERS_DIR);
        let mut orders: Vec<Order> = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read_dir {:?}", dir))? {
            let path = entry.with_context(|| format!("read_dir {:?}", dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).with_context(|| format!("read order {:?}", path))?;
            orders.push(
                serde_json::from_str(&raw).with_context(|| format!("parse order {:?}", path))?,
            );
        }
        orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        Ok(orders)
    }
}

impl LedgerStore for FileStore {
    fn append_ledger_record(&self, record: &LedgerRecord) -> Result<()> {
        self.append_json_line(&self.ledger_path(), record)
    }

    fn query_ledger(&self, order_id: &str) -> Result<Vec<LedgerRecord>> {
        let all: Vec<LedgerRecord> = read_json_lines(&self.ledger_path())?;
        Ok(all.into_iter().filter(|r| r.order_id == order_id).collect())
    }

    fn head_hash(&self, order_id: &str) -> Result<Option<String>> {
        let mut cache = self.heads.lock().unwrap_or_else(PoisonError::into_inner);
        let _store = self.store_lock(false)?;
        cache.refresh(&self.ledger_path())?;
        Ok(cache.heads.get(order_id).cloned())
    }
}

impl LocationIndex for FileStore {
    fn append_location(&self, entry: &IndexedLocation) -> Result<()> {
        self.append_json_line(&self.locations_path(), entry)
    }

    fn query_locations(&self, order_id: &str) -> Result<Vec<IndexedLocation>> {
        let all: Vec<IndexedLocation> = read_json_lines(&self.locations_path())?;
        Ok(all.into_iter().filter(|l| l.order_id == order_id).collect())
    }
}

impl Store for FileStore {
    /// Blocks until no other holder (thread or process) has the order.
    /// Ids that cannot name a file get an unguarded lease; they never load.
    fn lock_order(&self, order_id: &str) -> Result<OrderLease> {
        if !is_safe_file_stem(order_id) {
            return Ok(OrderLease::unguarded());
        }
        let path = self.root.join(LOCKS_DIR).join(format!("{order_id}.lock"));
        let f = open_lock_file(&path)?;
        FileExt::lock_exclusive(&f).with_context(|| format!("lock {:?}", path))?;
        Ok(OrderLease::holding(f))
    }

    /// Appends the ledger (and location) line, then replaces the order
    /// document. Any failure truncates both JSONL files back to where they
    /// were, under the exclusive store lock, so readers never see the lines.
    fn commit(
        &self,
        order: &Order,
        record: &LedgerRecord,
        location: Option<&IndexedLocation>,
    ) -> Result<()> {
        let record_line = encode_line(record)?;
        let location_line = location.map(encode_line).transpose()?;

        let _guard = self.append_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _store = self.store_lock(true)?;

        let ledger_path = self.ledger_path();
        let locations_path = self.locations_path();
        let ledger_mark = file_len(&ledger_path)?;
        let locations_mark = file_len(&locations_path)?;

        let written = append_raw(&ledger_path, &record_line)
            .and_then(|()| match &location_line {
                Some(line) => append_raw(&locations_path, line),
                None => Ok(()),
            })
            .and_then(|()| self.write_order(order));

        if let Err(e) = written {
            warn!(
                order_id = %order.order_id,
                transaction_id = %record.transaction_id,
                error = %format!("{e:#}"),
                "commit failed; rolling back"
            );
            let rolled_back = truncate_to(&ledger_path, ledger_mark)
                .and_then(|()| truncate_to(&locations_path, locations_mark));
            return match rolled_back {
                Ok(()) => Err(e),
                Err(rb) => Err(e.context(format!("rollback failed: {rb:#}"))),
            };
        }
        Ok(())
    }
}
