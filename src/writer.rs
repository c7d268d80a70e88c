//! The output writer actor (§5): an optional worker thread that owns the
//! output file/stream so the main streaming loop never blocks on I/O
//! for longer than a channel send. Mirrors the teacher's own
//! `crawler.rs` pattern of handing work to a dedicated thread over an
//! `std::sync::mpsc` channel.

use std::io::Write;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use crate::error::LinkError;

const FLUSH_THRESHOLD: usize = 64 * 1024;

enum Message {
    Write(String),
    Flush(Sender<anyhow::Result<()>>),
    Close(Sender<anyhow::Result<()>>),
}

/// The handle the main thread keeps; only the send end of the channel,
/// per §5 ("writer state is owned solely by the writer actor").
pub struct Writer {
    sender: Sender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl Writer {
    pub fn spawn(mut sink: Box<dyn Write + Send>) -> Self {
        let (sender, receiver): (Sender<Message>, Receiver<Message>) = mpsc::channel();
        let handle = std::thread::spawn(move || run(&mut sink, receiver));
        Writer {
            sender,
            handle: Some(handle),
        }
    }

    /// Fire-and-forget: queues a line for writing.
    pub fn write_line(&self, line: String) -> anyhow::Result<()> {
        self.sender
            .send(Message::Write(line))
            .map_err(|_| LinkError::Writer("writer thread is gone".to_string()).into())
    }

    /// Awaitable: blocks until the writer has flushed its buffer.
    pub fn flush(&self) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.sender
            .send(Message::Flush(reply_tx))
            .map_err(|_| LinkError::Writer("writer thread is gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| LinkError::Writer("writer thread dropped the flush reply".to_string()))?
    }

    /// Awaitable: flushes, closes the underlying sink, and joins the
    /// worker thread.
    pub fn close(mut self) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.sender
            .send(Message::Close(reply_tx))
            .map_err(|_| LinkError::Writer("writer thread is gone".to_string()))?;
        let result = reply_rx
            .recv()
            .map_err(|_| LinkError::Writer("writer thread dropped the close reply".to_string()))?;
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| LinkError::Writer("writer thread panicked".to_string()))?;
        }
        result
    }
}

fn run(sink: &mut Box<dyn Write + Send>, receiver: Receiver<Message>) {
    let mut buffer = String::new();
    for message in receiver {
        match message {
            Message::Write(line) => {
                buffer.push_str(&line);
                buffer.push('\n');
                if buffer.len() >= FLUSH_THRESHOLD {
                    let _ = flush_buffer(sink, &mut buffer);
                }
            }
            Message::Flush(reply) => {
                let _ = reply.send(flush_buffer(sink, &mut buffer));
            }
            Message::Close(reply) => {
                let result = flush_buffer(sink, &mut buffer).and_then(|_| {
                    sink.flush()
                        .map_err(|e| LinkError::Writer(format!("final flush failed: {}", e)).into())
                });
                let _ = reply.send(result);
                return;
            }
        }
    }
}

fn flush_buffer(sink: &mut Box<dyn Write + Send>, buffer: &mut String) -> anyhow::Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    sink.write_all(buffer.as_bytes())
        .map_err(|e| LinkError::Writer(format!("write failed: {}", e)))?;
    buffer.clear();
    Ok(())
}
