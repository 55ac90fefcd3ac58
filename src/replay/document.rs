// src/replay/document.rs
//! Reconstructed document content
//!
//! `apply` is a pure state transition: the same event prefix always yields
//! the same content.

use crate::recording::event::{DeleteDirection, EventKind, Selection};
use crate::replay::timeline::ReplayEvent;
use serde::{Deserialize, Serialize};

/// How content edits are positioned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentModel {
    /// Inserts append, deletes trim the end; selections only move the cursor indicator
    #[default]
    AppendOnly,

    /// Edits happen at the cursor and replace the current selection
    Cursor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    model: ContentModel,
    chars: Vec<char>,
    cursor: usize,
    selection: Option<Selection>,
}

impl Document {
    pub fn new(model: ContentModel) -> Self {
        Self {
            model,
            ..Default::default()
        }
    }

    pub fn content(&self) -> String {
        self.chars.iter().collect()
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn model(&self) -> ContentModel {
        self.model
    }

    pub fn apply(&mut self, event: &ReplayEvent) {
        match self.model {
            ContentModel::AppendOnly => self.apply_append_only(event),
            ContentModel::Cursor => self.apply_at_cursor(event),
        }
    }

    fn apply_append_only(&mut self, event: &ReplayEvent) {
        let payload = &event.payload;
        match event.kind {
            EventKind::Insert | EventKind::Paste => {
                if let Some(text) = &payload.text {
                    self.chars.extend(text.chars());
                }
                self.cursor = self.chars.len();
            }
            EventKind::Delete => {
                let count = removal_count(payload.text.as_deref());
                self.truncate_end(count);
            }
            EventKind::Cut => {
                let count = payload.text.as_deref().map_or(0, |t| t.chars().count());
                self.truncate_end(count);
            }
            EventKind::SelectionChange => {
                if let Some(selection) = payload.selection {
                    let selection = self.clamp(selection);
                    self.cursor = selection.end;
                    self.selection = Some(selection);
                }
            }
            EventKind::KeyDown | EventKind::KeyUp => {}
        }
    }

    fn apply_at_cursor(&mut self, event: &ReplayEvent) {
        let payload = &event.payload;
        match event.kind {
            EventKind::Insert | EventKind::Paste => {
                self.remove_selection();
                if let Some(text) = &payload.text {
                    let at = self.cursor.min(self.chars.len());
                    let inserted: Vec<char> = text.chars().collect();
                    let count = inserted.len();
                    self.chars.splice(at..at, inserted);
                    self.cursor = at + count;
                }
            }
            EventKind::Delete => {
                if self.remove_selection() {
                    return;
                }
                let count = removal_count(payload.text.as_deref());
                let at = self.cursor.min(self.chars.len());
                match payload.direction.unwrap_or(DeleteDirection::Backward) {
                    DeleteDirection::Backward => {
                        let start = at.saturating_sub(count);
                        self.chars.drain(start..at);
                        self.cursor = start;
                    }
                    DeleteDirection::Forward => {
                        let end = (at + count).min(self.chars.len());
                        self.chars.drain(at..end);
                        self.cursor = at;
                    }
                }
            }
            EventKind::Cut => {
                self.remove_selection();
            }
            EventKind::SelectionChange => {
                if let Some(selection) = payload.selection {
                    let selection = self.clamp(selection);
                    self.cursor = selection.end;
                    self.selection = (!selection.is_collapsed()).then_some(selection);
                }
            }
            EventKind::KeyDown | EventKind::KeyUp => {}
        }
    }

    fn truncate_end(&mut self, count: usize) {
        let keep = self.chars.len().saturating_sub(count);
        self.chars.truncate(keep);
        self.cursor = self.chars.len();
        self.selection = None;
    }

    /// Remove a non-empty selection; true when something was removed
    fn remove_selection(&mut self) -> bool {
        match self.selection.take() {
            Some(selection) if !selection.is_collapsed() => {
                let selection = self.clamp(selection);
                self.chars.drain(selection.start..selection.end);
                self.cursor = selection.start;
                true
            }
            _ => false,
        }
    }

    fn clamp(&self, selection: Selection) -> Selection {
        let len = self.chars.len();
        Selection::new(selection.start.min(len), selection.end.min(len))
    }
}

/// Characters removed by a delete: the removed text if known, else one
fn removal_count(text: Option<&str>) -> usize {
    match text {
        Some(t) if !t.is_empty() => t.chars().count(),
        _ => 1,
    }
}
