//! Append-only element registry with cumulative longitudinal positions.
//!
//! Every prepared element is pushed in lattice order; the registry keeps a
//! running total of machine length and exposes start positions derived from
//! the stored end positions. All S values are rounded to five decimal
//! places so that fit-result reconciliation can match on position without
//! floating-point drift.

use crate::domain::ElementRecord;

/// Round to the fixed five-decimal S resolution.
pub fn round_s(value: f64) -> f64 {
    (value * 1.0e5).round() / 1.0e5
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    elements: Vec<ElementRecord>,
    /// Cumulative S at the END of each element, same index space as `elements`.
    end_positions: Vec<f64>,
    total_length: f64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element. The running machine length grows by the element
    /// length and the rounded end position is recorded.
    pub fn push(&mut self, record: ElementRecord) {
        self.total_length += record.length;
        self.total_length = round_s(self.total_length);
        self.end_positions.push(self.total_length);
        self.elements.push(record);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ElementRecord> {
        self.elements.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ElementRecord> {
        self.elements.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ElementRecord> {
        self.elements.iter()
    }

    pub fn last(&self) -> Option<&ElementRecord> {
        self.elements.last()
    }

    pub fn total_length(&self) -> f64 {
        self.total_length
    }

    /// End-of-element S position, rounded.
    pub fn end_position(&self, index: usize) -> Option<f64> {
        self.end_positions.get(index).copied()
    }

    /// Start-of-element S position: end minus length, re-rounded.
    pub fn start_position(&self, index: usize) -> Option<f64> {
        let end = self.end_positions.get(index)?;
        let length = self.elements.get(index)?.length;
        Some(round_s(end - length))
    }

    /// Indices of all elements carrying the given name, in lattice order.
    pub fn indices_of(&self, name: &str) -> Vec<usize> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, record)| record.name.as_deref() == Some(name))
            .map(|(index, _)| index)
            .collect()
    }

    /// Grow the running machine length without recording an element, so
    /// later start positions stay correct when anonymous rows are dropped.
    pub fn advance_length(&mut self, length: f64) {
        self.total_length = round_s(self.total_length + length);
    }

    /// Ordered, deduplicated names of every named element.
    pub fn unique_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for record in &self.elements {
            if let Some(name) = &record.name {
                if !names.iter().any(|seen| seen == name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Change the stored length of one element and propagate the delta to
    /// every later end position and the machine total.
    pub fn update_length(&mut self, index: usize, new_length: f64) -> bool {
        let Some(record) = self.elements.get_mut(index) else {
            return false;
        };
        let delta = new_length - record.length;
        record.length = new_length;
        record.is_zero_length = new_length == 0.0;
        for end in self.end_positions.iter_mut().skip(index) {
            *end = round_s(*end + delta);
        }
        self.total_length = round_s(self.total_length + delta);
        true
    }
}
