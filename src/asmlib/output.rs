//! The object byte stream: leader/trailer, origin pairs, data word
//! pairs and the BIN checksum.
//!
//! Every data byte flows through [`Assembler::punch_object`], which
//! folds it into the running checksum whether or not the stream is
//! currently connected.  NOPUNCH only detaches the writer; ENPUNCH
//! reattaches it.

use tracing::{event, Level};

use super::driver::Assembler;
use super::listing::LineStyle;
use super::literals::{LiteralPool, PoolKind, PAGE_SIZE};

/// Default leader/trailer length: two feet of tape at ten punches
/// per inch.
const LEADER_LEN: i32 = 240;

/// The object sink.  `Suppressed` holds the bytes punched so far
/// while NOPUNCH is in effect; `Disconnected` is pass 1, where no
/// object stream exists at all.
#[derive(Debug)]
pub(crate) enum ObjectSink {
    Disconnected,
    Writing(Vec<u8>),
    Suppressed(Vec<u8>),
}

impl ObjectSink {
    pub(crate) fn write(&mut self, byte: u8) {
        if let ObjectSink::Writing(buf) = self {
            buf.push(byte);
        }
    }

    pub(crate) fn suppress(&mut self) {
        let current = std::mem::replace(self, ObjectSink::Disconnected);
        *self = match current {
            ObjectSink::Writing(buf) => ObjectSink::Suppressed(buf),
            other => other,
        };
    }

    pub(crate) fn restore(&mut self) {
        let current = std::mem::replace(self, ObjectSink::Disconnected);
        *self = match current {
            ObjectSink::Suppressed(buf) => ObjectSink::Writing(buf),
            other => other,
        };
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        match self {
            ObjectSink::Disconnected => Vec::new(),
            ObjectSink::Writing(buf) | ObjectSink::Suppressed(buf) => buf,
        }
    }
}

impl Assembler {
    /// Punch `count` leader bytes; zero means the two-foot default.
    /// Leader bytes bypass the checksum.
    pub(crate) fn punch_leader(&mut self, count: i32) {
        let count = if count == 0 { LEADER_LEN } else { count };
        for _ in 0..count.max(0) {
            self.object.write(0o200);
        }
    }

    /// Put one byte to the object stream and fold it into the
    /// checksum.
    pub(crate) fn punch_object(&mut self, val: i32) {
        let val = val & 0o377;
        self.object.write(val as u8);
        self.checksum += val;
        self.data_emitted = true;
    }

    /// Punch an origin pair.  The marker bit distinguishes origins
    /// from data words.
    pub(crate) fn punch_origin(&mut self, loc: i32) {
        self.punch_object(((loc >> 6) & 0o77) | 0o100);
        self.punch_object(loc & 0o77);
    }

    /// Punch one word, tagged with its origin in RIM mode.
    pub(crate) fn punch_loc_object(&mut self, loc: i32, val: i32) {
        if self.rim_mode {
            self.punch_origin(loc);
        }
        self.punch_object((val >> 6) & 0o77);
        self.punch_object(val & 0o77);
    }

    /// List the current line against `loc`/`val`, then punch.
    pub(crate) fn punch_out_object(&mut self, loc: i32, val: i32) {
        self.print_line(self.field | loc, val, LineStyle::LineLocVal);
        self.punch_loc_object(loc, val);
    }

    /// Close a BIN segment with its checksum word.  RIM streams
    /// carry no checksum.
    pub(crate) fn punch_checksum(&mut self) {
        if self.data_emitted && !self.rim_mode {
            event!(
                Level::DEBUG,
                "punching checksum {:04o}",
                self.checksum & 0o7777
            );
            self.punch_loc_object(0, self.checksum);
        }
        self.data_emitted = false;
        self.checksum = 0;
    }

    /// Flush one literal pool: origin (BIN mode), then each slot in
    /// ascending address order, then reset the pool.
    pub(crate) fn punch_literal_pool(&mut self, which: PoolKind, lpool_page: i32) {
        let lpool_page = lpool_page & 0o7600;
        let pool = self.pool(which);
        if pool.is_empty() {
            return;
        }
        let start = pool.loc();
        let words: Vec<i32> = (start..PAGE_SIZE).map(|slot| pool.word(slot)).collect();
        event!(
            Level::DEBUG,
            "flushing {} literals to page {:04o}",
            words.len(),
            lpool_page
        );
        if !self.rim_mode {
            self.punch_origin(start | lpool_page);
        }
        for (slot, word) in words.into_iter().enumerate() {
            let tmplc = start + slot as i32 + lpool_page;
            self.print_line(self.field | tmplc, word, LineStyle::LocVal);
            self.punch_loc_object(tmplc, word);
        }
        self.pool_mut(which).reset();
    }

    fn pool(&self, which: PoolKind) -> &LiteralPool {
        match which {
            PoolKind::CurrentPage => &self.cp,
            PoolKind::PageZero => &self.pz,
        }
    }

    fn pool_mut(&mut self, which: PoolKind) -> &mut LiteralPool {
        match which {
            PoolKind::CurrentPage => &mut self.cp,
            PoolKind::PageZero => &mut self.pz,
        }
    }

    /// Add `value` to the named pool, reusing an existing slot when
    /// the value is already present.  While the location counter is
    /// in page zero every literal belongs to the page zero pool.
    pub(crate) fn insert_literal(&mut self, which: PoolKind, value: i32) -> i32 {
        let which = if (self.clc & 0o7600) == 0 {
            PoolKind::PageZero
        } else {
            which
        };
        self.pool_mut(which).insert(value)
    }
}
