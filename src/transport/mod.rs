//! Byte transport abstraction for serial-attached trackers

use crate::error::Result;

mod mock;
#[cfg(feature = "serial")]
mod serial;

pub use mock::MockTransport;
#[cfg(feature = "serial")]
pub use serial::SerialTransport;

/// Raw byte I/O with a device
pub trait ByteTransport: Send {
    /// Read available bytes into buffer. `Ok(0)` means no data right now.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Write all of `data`, then flush
    fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = self.write(data)?;
            if n == 0 {
                return Err(crate::error::Error::HardwareFail(
                    "transport accepted no bytes".to_string(),
                ));
            }
            data = &data[n..];
        }
        self.flush()
    }

    /// Check if data is available to read
    fn available(&mut self) -> Result<usize> {
        Ok(0)
    }

    /// Drop received bytes that have not been read yet
    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: ByteTransport + ?Sized> ByteTransport for Box<T> {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        (**self).read(buffer)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn available(&mut self) -> Result<usize> {
        (**self).available()
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }
}
