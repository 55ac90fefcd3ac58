// src/recording/event.rs
//! Keystroke events and their normalization from raw editing-surface input

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest coarse target identifier kept on an event
const MAX_TARGET_LEN: usize = 64;

/// Event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    KeyDown,
    KeyUp,
    Insert,
    Delete,
    Paste,
    Cut,
    SelectionChange,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::KeyDown => "key_down",
            EventKind::KeyUp => "key_up",
            EventKind::Insert => "insert",
            EventKind::Delete => "delete",
            EventKind::Paste => "paste",
            EventKind::Cut => "cut",
            EventKind::SelectionChange => "selection_change",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "key_down" => Some(EventKind::KeyDown),
            "key_up" => Some(EventKind::KeyUp),
            "insert" => Some(EventKind::Insert),
            "delete" => Some(EventKind::Delete),
            "paste" => Some(EventKind::Paste),
            "cut" => Some(EventKind::Cut),
            "selection_change" => Some(EventKind::SelectionChange),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteDirection {
    Backward,
    Forward,
}

/// Selection bounds in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Event content; everything here is subject to privacy filtering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Inserted text, or removed text for delete/cut
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<DeleteDirection>,
}

impl EventPayload {
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.text.is_none() && self.selection.is_none() && self.direction.is_none()
    }

    pub fn key(key: String) -> Self {
        Self {
            key: Some(key),
            ..Default::default()
        }
    }

    pub fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Default::default()
        }
    }
}

/// Modifier key flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub meta: bool,
}

impl Modifiers {
    pub fn any(&self) -> bool {
        self.shift || self.ctrl || self.alt || self.meta
    }
}

/// Normalized keystroke event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeystrokeEvent {
    /// Unique event ID (ULID)
    pub id: String,

    pub session_id: String,

    /// Session-relative sequence number, strictly increasing from 1
    pub sequence: u64,

    /// Milliseconds since the session started
    pub relative_ms: u64,

    pub occurred_at: DateTime<Utc>,

    pub kind: EventKind,

    pub payload: EventPayload,

    pub modifiers: Modifiers,

    /// Named key such as `Backspace` or `Enter`
    pub functional_key: bool,

    /// Coarse identifier of the element that received the input
    pub target: Option<String>,
}

/// Raw input as delivered by the editing surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawInputEvent {
    KeyDown {
        key: String,
        #[serde(default)]
        modifiers: Modifiers,
        #[serde(default)]
        target: Option<String>,
    },
    KeyUp {
        key: String,
        #[serde(default)]
        modifiers: Modifiers,
        #[serde(default)]
        target: Option<String>,
    },
    /// DOM-style `input` notification (`insertText`, `deleteContentBackward`, ...)
    Input {
        input_type: String,
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        target: Option<String>,
    },
    Paste {
        text: String,
        #[serde(default)]
        target: Option<String>,
    },
    Cut {
        text: String,
        #[serde(default)]
        target: Option<String>,
    },
    SelectionChange {
        start: usize,
        end: usize,
        #[serde(default)]
        target: Option<String>,
    },
}

/// Normalized parts of a raw event, before sequencing and timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedInput {
    pub kind: EventKind,
    pub payload: EventPayload,
    pub modifiers: Modifiers,
    pub functional_key: bool,
    pub target: Option<String>,
}

impl RawInputEvent {
    /// Map raw input onto an event kind; `None` for input types we do not track
    pub fn normalize(self) -> Option<NormalizedInput> {
        let (kind, payload, modifiers, functional_key, target) = match self {
            RawInputEvent::KeyDown { key, modifiers, target } => {
                let functional = is_functional_key(&key);
                (EventKind::KeyDown, EventPayload::key(key), modifiers, functional, target)
            }
            RawInputEvent::KeyUp { key, modifiers, target } => {
                let functional = is_functional_key(&key);
                (EventKind::KeyUp, EventPayload::key(key), modifiers, functional, target)
            }
            RawInputEvent::Input { input_type, data, target } => {
                let (kind, payload) = normalize_input_type(&input_type, data)?;
                (kind, payload, Modifiers::default(), false, target)
            }
            RawInputEvent::Paste { text, target } => {
                (EventKind::Paste, EventPayload::text(text), Modifiers::default(), false, target)
            }
            RawInputEvent::Cut { text, target } => {
                (EventKind::Cut, EventPayload::text(text), Modifiers::default(), false, target)
            }
            RawInputEvent::SelectionChange { start, end, target } => (
                EventKind::SelectionChange,
                EventPayload {
                    selection: Some(Selection::new(start, end)),
                    ..Default::default()
                },
                Modifiers::default(),
                false,
                target,
            ),
        };

        Some(NormalizedInput {
            kind,
            payload,
            modifiers,
            functional_key,
            target: target.as_deref().and_then(coarse_target),
        })
    }
}

fn normalize_input_type(input_type: &str, data: Option<String>) -> Option<(EventKind, EventPayload)> {
    match input_type {
        "insertText" | "insertReplacementText" | "insertCompositionText" => {
            Some((EventKind::Insert, EventPayload::text(data?)))
        }
        "insertLineBreak" | "insertParagraph" => {
            Some((EventKind::Insert, EventPayload::text("\n".to_string())))
        }
        "insertFromPaste" | "insertFromDrop" => Some((EventKind::Paste, EventPayload::text(data?))),
        "deleteByCut" => Some((EventKind::Cut, EventPayload::text(data.unwrap_or_default()))),
        other if other.starts_with("delete") => {
            let direction = if other.ends_with("Forward") {
                DeleteDirection::Forward
            } else {
                DeleteDirection::Backward
            };
            Some((
                EventKind::Delete,
                EventPayload {
                    text: data,
                    direction: Some(direction),
                    ..Default::default()
                },
            ))
        }
        _ => None,
    }
}

/// Named key values from the UI Events `key` attribute
const NAMED_KEYS: &[&str] = &[
    "Backspace", "Delete", "Enter", "Tab", "Escape", "Insert", "Clear",
    "Shift", "Control", "Alt", "AltGraph", "Meta", "Fn", "CapsLock", "NumLock", "ScrollLock",
    "ArrowLeft", "ArrowRight", "ArrowUp", "ArrowDown", "Home", "End", "PageUp", "PageDown",
    "ContextMenu", "Pause", "PrintScreen", "Dead", "Compose", "Process", "Unidentified",
];

/// Named keys (`Enter`, `Backspace`, `ArrowLeft`, ...) as opposed to printable characters
///
/// Multi-character strings that are not named keys (IME output, emoji
/// sequences) count as content.
pub fn is_functional_key(key: &str) -> bool {
    NAMED_KEYS.contains(&key) || is_function_key(key)
}

/// `F1` through `F24`
fn is_function_key(key: &str) -> bool {
    match key.strip_prefix('F') {
        Some(n) if !n.starts_with('0') && n.bytes().all(|b| b.is_ascii_digit()) => {
            n.parse::<u8>().is_ok_and(|n| (1..=24).contains(&n))
        }
        _ => false,
    }
}

fn coarse_target(target: &str) -> Option<String> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TARGET_LEN).collect())
}
