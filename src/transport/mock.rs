//! In-memory transport for tests and replaying captured byte streams

use super::ByteTransport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Mock transport. Clones share the same buffers, so a test can keep one
/// handle to inject bytes while a source owns the other.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    max_read: usize,
    fail_reads: bool,
    fail_writes: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                max_read: usize::MAX,
                fail_reads: false,
                fail_writes: false,
            })),
        }
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Limit how many bytes a single read returns (simulates slow links)
    pub fn set_max_read(&self, max: usize) {
        self.inner.lock().max_read = max.max(1);
    }

    /// Make every following read fail as if the device disappeared
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.lock().fail_reads = fail;
    }

    /// Make every following write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        self.inner.lock().write_buffer.clear();
    }

    /// Bytes injected but not yet read
    pub fn pending_read(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }
}

impl ByteTransport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fail_reads {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock device disconnected",
            )));
        }
        let available = inner.read_buffer.len().min(buffer.len()).min(inner.max_read);
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock device disconnected",
            )));
        }
        inner.write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.inner.lock().read_buffer.len())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_and_read() {
        let handle = MockTransport::new();
        let mut transport = handle.clone();
        handle.inject_read(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 3];
        assert_eq!(transport.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(transport.available().unwrap(), 2);
        assert_eq!(handle.pending_read(), 2);
    }

    #[test]
    fn test_max_read_limits_chunks() {
        let handle = MockTransport::new();
        let mut transport = handle.clone();
        handle.inject_read(&[9; 10]);
        handle.set_max_read(4);

        let mut buf = [0u8; 16];
        assert_eq!(transport.read(&mut buf).unwrap(), 4);
        assert_eq!(transport.read(&mut buf).unwrap(), 4);
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_all_records_bytes() {
        let handle = MockTransport::new();
        let mut transport = handle.clone();
        transport.write_all(b"RESET").unwrap();
        assert_eq!(handle.get_written(), b"RESET");
        handle.clear_written();
        assert!(handle.get_written().is_empty());
    }

    #[test]
    fn test_failing_reads() {
        let handle = MockTransport::new();
        let mut transport = handle.clone();
        handle.set_fail_reads(true);
        let mut buf = [0u8; 4];
        assert!(matches!(transport.read(&mut buf), Err(Error::Io(_))));
    }
}
