//! 最近日志行的环形缓冲
//!
//! 作为 fmt layer 的 writer 挂到 tracing 上：每条事件写完后按行切分放入缓冲，
//! 超出容量时丢弃最旧的行。运维层通过 `recent(n)` 读取。

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone)]
pub struct LogTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogTail {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// 最近 n 行，从旧到新
    pub fn recent(&self, n: usize) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 单条事件的写入器，drop 时提交
pub struct LogTailWriter {
    tail: LogTail,
    buf: Vec<u8>,
}

impl io::Write for LogTailWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogTailWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            self.tail.push(line);
        }
    }
}

impl<'a> MakeWriter<'a> for LogTail {
    type Writer = LogTailWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogTailWriter {
            tail: self.clone(),
            buf: Vec::new(),
        }
    }
}
