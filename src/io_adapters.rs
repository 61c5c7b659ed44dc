use std::cell::RefCell;
use std::io::{BufRead, Cursor, Read, Result as IoResult, Write};
use std::rc::Rc;

/// Memory-backed input for sessions driven by tests or `-c` code.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            cursor: Cursor::new(buf.into()),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl BufRead for MemReader {
    fn fill_buf(&mut self) -> IoResult<&[u8]> {
        self.cursor.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.cursor.consume(amt)
    }
}

/// Memory-backed writer for capturing what a session prints.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }

    /// Return and clear everything written so far.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.buf.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}
