//! Explicit work-list for depth-first traversal
//!
//! The crawl never recurses on the call stack. Each pending visit is a
//! `VisitTask` on a LIFO stack; children are pushed in reverse so they pop
//! in discovery order, which reproduces a depth-first walk.

use crate::crawler::coordinator::CrawlMode;

/// How a popped task is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// A page or collection row: fetch metadata, persist, list children
    Node,

    /// A collection discovered as a child: probe, persist, list rows
    Collection,
}

/// A pending visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitTask {
    pub node_id: String,
    pub parent_id: Option<String>,
    pub mode: CrawlMode,
    pub kind: TaskKind,
}

impl VisitTask {
    pub fn node(node_id: &str, parent_id: Option<&str>, mode: CrawlMode) -> Self {
        Self {
            node_id: node_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            mode,
            kind: TaskKind::Node,
        }
    }

    pub fn collection(node_id: &str, parent_id: Option<&str>, mode: CrawlMode) -> Self {
        Self {
            kind: TaskKind::Collection,
            ..Self::node(node_id, parent_id, mode)
        }
    }
}

/// LIFO stack of pending visits
#[derive(Debug, Default)]
pub struct WorkList {
    stack: Vec<VisitTask>,
    total_pushed: u64,
    high_water: usize,
}

impl WorkList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a single task; it is the next one popped
    pub fn push(&mut self, task: VisitTask) {
        self.stack.push(task);
        self.total_pushed += 1;
        self.high_water = self.high_water.max(self.stack.len());
    }

    /// Pushes a batch so that its first element is popped first
    pub fn push_children<I>(&mut self, tasks: I)
    where
        I: IntoIterator<Item = VisitTask>,
        I::IntoIter: DoubleEndedIterator,
    {
        for task in tasks.into_iter().rev() {
            self.push(task);
        }
    }

    pub fn pop(&mut self) -> Option<VisitTask> {
        self.stack.pop()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Number of tasks ever pushed
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Largest number of tasks pending at once
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}
