// Bounded log buffer with a 1-based page index

use crate::config::PaginatorConfig;
use std::collections::VecDeque;

/// Lines kept while following a live log.
pub const STREAMING_CAPACITY: usize = 1000;
pub const STREAMING_PAGE_SIZE: usize = 50;
pub const STATIC_PAGE_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Live tail: ring buffer, always showing the newest page.
    Streaming,
    /// One-off snapshot: free navigation.
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageNav {
    PageUp,
    PageDown,
    Home,
    End,
}

/// One page of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPage<'a> {
    pub lines: Vec<&'a str>,
    pub current_page: usize,
    pub total_pages: usize,
    pub buffer_len: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone)]
pub struct LogPaginator {
    config: PaginatorConfig,
    mode: BufferMode,
    lines: VecDeque<String>,
    page_size: usize,
    current_page: usize,
}

impl Default for LogPaginator {
    fn default() -> Self {
        Self::new(PaginatorConfig::default())
    }
}

impl LogPaginator {
    /// An empty paginator in streaming mode.
    pub fn new(config: PaginatorConfig) -> Self {
        let page_size = config.streaming_page_size.max(1);
        Self {
            lines: VecDeque::with_capacity(config.streaming_capacity),
            config,
            mode: BufferMode::Streaming,
            page_size,
            current_page: 1,
        }
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Switch mode; the buffer is cleared and the page size reset for the new mode.
    pub fn set_mode(&mut self, mode: BufferMode) {
        self.mode = mode;
        self.lines.clear();
        self.page_size = match mode {
            BufferMode::Streaming => self.config.streaming_page_size,
            BufferMode::Static => self.config.static_page_size,
        }
        .max(1);
        self.current_page = 1;
    }

    /// Append a live line, evicting the oldest past capacity, and jump to the last page.
    /// Switches to streaming mode first if a snapshot was loaded.
    pub fn append(&mut self, line: impl Into<String>) {
        if self.mode != BufferMode::Streaming {
            self.set_mode(BufferMode::Streaming);
        }
        let capacity = self.config.streaming_capacity.max(1);
        while self.lines.len() >= capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
        self.current_page = self.total_pages();
    }

    /// Replace the buffer wholesale with a snapshot, starting on the last page.
    pub fn load_static(&mut self, lines: Vec<String>) {
        self.set_mode(BufferMode::Static);
        self.lines = lines.into();
        self.current_page = self.total_pages();
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.current_page = 1;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_pages(&self) -> usize {
        self.lines.len().div_ceil(self.page_size).max(1)
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Jump to a 1-based page, clamped into range.
    pub fn go_to(&mut self, page: usize) {
        self.current_page = page.clamp(1, self.total_pages());
    }

    pub fn navigate(&mut self, nav: PageNav) {
        let target = match nav {
            PageNav::PageUp => self.current_page.saturating_sub(1),
            PageNav::PageDown => self.current_page.saturating_add(1),
            PageNav::Home => 1,
            PageNav::End => self.total_pages(),
        };
        self.go_to(target);
    }

    pub fn page(&self) -> LogPage<'_> {
        let start = (self.current_page - 1) * self.page_size;
        LogPage {
            lines: self
                .lines
                .iter()
                .skip(start)
                .take(self.page_size)
                .map(String::as_str)
                .collect(),
            current_page: self.current_page,
            total_pages: self.total_pages(),
            buffer_len: self.lines.len(),
            page_size: self.page_size,
        }
    }

    /// All buffered lines, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}
