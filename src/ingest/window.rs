//! Bounded subject window.

use std::collections::HashMap;

/// Buffers staged statements grouped by subject, oldest subject first.
///
/// The window holds at most `capacity` statements, and therefore at most
/// `capacity` distinct subjects. `push` reports when it is full; the caller
/// then drains it as one batch.
#[derive(Debug)]
pub struct SubjectWindow<T> {
    capacity: usize,
    groups: Vec<(String, Vec<T>)>,
    slots: HashMap<String, usize>,
    buffered: usize,
}

impl<T> SubjectWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            groups: Vec::new(),
            slots: HashMap::new(),
            buffered: 0,
        }
    }

    /// Buffer one item for `subject`. Returns true once the window is full.
    pub fn push(&mut self, subject: &str, item: T) -> bool {
        match self.slots.get(subject) {
            Some(&slot) => self.groups[slot].1.push(item),
            None => {
                self.slots.insert(subject.to_string(), self.groups.len());
                self.groups.push((subject.to_string(), vec![item]));
            }
        }
        self.buffered += 1;
        self.buffered >= self.capacity
    }

    /// Take every buffered group, oldest subject first.
    pub fn drain(&mut self) -> Vec<(String, Vec<T>)> {
        self.slots.clear();
        self.buffered = 0;
        std::mem::take(&mut self.groups)
    }

    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn subjects(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffered == 0
    }
}
