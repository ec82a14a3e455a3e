//! Concurrent capture of a child's stdout/stderr into memory, with optional
//! tee to a caller-supplied sink.
//!
//! Grounded on `examples/original_source/spur/io.py`: a [`Channel`] pairs a
//! readable source with an optional sink, and is turned into a [`Handler`]
//! that either does one blocking read at the end (no sink, no PTY) or drains
//! continuously on a background thread (sink present, or PTY, where EOF can
//! only be observed by reading).

use std::io::{self, Read, Write};
use std::thread::JoinHandle;

use crate::result::Output;

/// One captured stream: the readable end of a pipe/PTY/SSH channel, and an
/// optional sink that should receive the same bytes as they arrive.
pub(crate) struct Channel {
    pub(crate) reader: Box<dyn Read + Send>,
    pub(crate) sink: Option<Box<dyn Write + Send>>,
    pub(crate) is_pty: bool,
}

impl Channel {
    pub(crate) fn new(reader: Box<dyn Read + Send>, sink: Option<Box<dyn Write + Send>>, is_pty: bool) -> Self {
        Self { reader, sink, is_pty }
    }
}

/// A running or finished capture of one stream.
pub(crate) enum Handler {
    ReadAtEnd(Option<Box<dyn Read + Send>>),
    Continuous {
        thread: Option<JoinHandle<io::Result<Vec<u8>>>>,
    },
}

impl Handler {
    pub(crate) fn spawn(channel: Channel) -> Self {
        let Channel { reader, sink, is_pty } = channel;
        if sink.is_none() && !is_pty {
            return Handler::ReadAtEnd(Some(reader));
        }

        let thread = std::thread::spawn(move || drain(reader, sink, is_pty));
        Handler::Continuous {
            thread: Some(thread),
        }
    }

    /// Block until the stream has been fully drained, returning the captured
    /// bytes.
    pub(crate) fn wait(&mut self) -> io::Result<Vec<u8>> {
        match self {
            Handler::ReadAtEnd(reader) => {
                let mut reader = reader.take().expect("ReadAtEnd::wait called twice");
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(buf)
            }
            Handler::Continuous { thread } => {
                let thread = thread.take().expect("Continuous::wait called twice");
                thread
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("capture thread panicked")))
            }
        }
    }
}

/// Read one byte at a time, appending to an in-memory buffer and mirroring to
/// `sink` if present, until EOF. On a PTY, an `EIO` raised once the slave side
/// has closed is swallowed and treated as EOF; on a non-PTY stream the same
/// error propagates.
fn drain(
    mut reader: Box<dyn Read + Send>,
    mut sink: Option<Box<dyn Write + Send>>,
    is_pty: bool,
) -> io::Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(output),
            Ok(_) => {
                if let Some(sink) = sink.as_mut() {
                    sink.write_all(&byte)?;
                }
                output.push(byte[0]);
            }
            Err(e) if is_pty && e.kind() == io::ErrorKind::Other => return Ok(output),
            Err(e) if is_pty && is_eio(&e) => return Ok(output),
            Err(e) => return Err(e),
        }
    }
}

#[cfg(unix)]
fn is_eio(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EIO)
}

#[cfg(not(unix))]
fn is_eio(_e: &io::Error) -> bool {
    false
}

/// Owns the stdout and stderr capture handlers for one process, and produces
/// the final `(output, stderr_output)` pair once both have drained.
pub(crate) struct IoHandler {
    stdout: Handler,
    stderr: Handler,
    encoding_utf8: bool,
}

impl IoHandler {
    pub(crate) fn new(stdout: Channel, stderr: Channel, encoding_utf8: bool) -> Self {
        Self {
            stdout: Handler::spawn(stdout),
            stderr: Handler::spawn(stderr),
            encoding_utf8,
        }
    }

    pub(crate) fn wait(&mut self) -> io::Result<(Output, Output)> {
        let out = self.stdout.wait()?;
        let err = self.stderr.wait()?;
        Ok((self.to_output(out), self.to_output(err)))
    }

    fn to_output(&self, bytes: Vec<u8>) -> Output {
        if self.encoding_utf8 {
            Output::Text(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Output::Bytes(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_at_end_with_no_sink() {
        let channel = Channel::new(Box::new(Cursor::new(b"hello".to_vec())), None, false);
        let mut handler = Handler::spawn(channel);
        assert!(matches!(handler, Handler::ReadAtEnd(_)));
        assert_eq!(handler.wait().unwrap(), b"hello");
    }

    #[test]
    fn continuous_reader_with_sink_mirrors_bytes() {
        let mut sink = Vec::new();
        let channel = Channel::new(
            Box::new(Cursor::new(b"hello\n".to_vec())),
            Some(Box::new(DummySink(&mut sink as *mut Vec<u8>))),
            false,
        );
        let mut handler = Handler::spawn(channel);
        assert!(matches!(handler, Handler::Continuous { .. }));
        let captured = handler.wait().unwrap();
        assert_eq!(captured, b"hello\n");
    }

    // A Write sink that writes into a Vec<u8> living on the test's stack,
    // valid for the lifetime of this test because `wait()` joins the thread
    // before the test function returns.
    struct DummySink(*mut Vec<u8>);
    unsafe impl Send for DummySink {}
    impl Write for DummySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            unsafe { (*self.0).extend_from_slice(buf) };
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn io_handler_decodes_utf8_when_requested() {
        let stdout = Channel::new(Box::new(Cursor::new(b"hello".to_vec())), None, false);
        let stderr = Channel::new(Box::new(Cursor::new(Vec::new())), None, false);
        let mut io = IoHandler::new(stdout, stderr, true);
        let (out, err) = io.wait().unwrap();
        assert_eq!(out, Output::Text("hello".to_string()));
        assert_eq!(err, Output::Text(String::new()));
    }
}
