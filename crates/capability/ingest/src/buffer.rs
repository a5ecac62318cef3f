use std::sync::Mutex;

/// 池中最多保留的空闲缓冲数。
const DEFAULT_MAX_RETAINED: usize = 64;

/// 可并发共享的接收缓冲池。
///
/// `get` 总是返回长度恰为 `buffer_size` 的缓冲；`put` 之后调用方不得再持有该缓冲。
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    max_retained: usize,
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(buffer_size: usize) -> Self {
        Self::with_capacity(buffer_size, DEFAULT_MAX_RETAINED)
    }

    pub fn with_capacity(buffer_size: usize, max_retained: usize) -> Self {
        Self {
            buffer_size,
            max_retained,
            buffers: Mutex::new(Vec::with_capacity(max_retained)),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// 取出一个缓冲（池空时新分配）。
    pub fn get(&self) -> Vec<u8> {
        let reused = self
            .buffers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        match reused {
            Some(mut buf) => {
                buf.resize(self.buffer_size, 0);
                buf
            }
            None => vec![0u8; self.buffer_size],
        }
    }

    /// 归还缓冲；容量不足或池已满时直接丢弃。
    pub fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() < self.buffer_size {
            return;
        }
        buf.clear();
        buf.resize(self.buffer_size, 0);
        let mut buffers = self
            .buffers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if buffers.len() < self.max_retained {
            buffers.push(buf);
        }
    }

    /// 当前空闲缓冲数量。
    pub fn idle(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
