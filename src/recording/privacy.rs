// src/recording/privacy.rs
//! Tiered privacy redaction
//!
//! A pure function of `(event, tier)`. The recorder applies it before
//! buffering and the storage pipeline applies it again before encryption.
//! Every tier is idempotent, so the second pass never changes the result.

use crate::recording::event::{EventPayload, KeystrokeEvent};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How much raw content survives capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyTier {
    /// All content retained (and encrypted at rest)
    #[default]
    Full,

    /// Letters → `X`, digits → `0`, punctuation → `*`, whitespace and named keys kept
    Anonymized,

    /// Only kind, timing and target survive
    #[serde(alias = "metadata-only")]
    MetadataOnly,
}

impl PrivacyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyTier::Full => "full",
            PrivacyTier::Anonymized => "anonymized",
            PrivacyTier::MetadataOnly => "metadata_only",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "full" => Some(PrivacyTier::Full),
            "anonymized" => Some(PrivacyTier::Anonymized),
            "metadata_only" | "metadata-only" => Some(PrivacyTier::MetadataOnly),
            _ => None,
        }
    }
}

impl fmt::Display for PrivacyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Redact `event` according to `tier`
pub fn apply_privacy(mut event: KeystrokeEvent, tier: PrivacyTier) -> KeystrokeEvent {
    match tier {
        PrivacyTier::Full => {}
        PrivacyTier::Anonymized => {
            if let Some(key) = event.payload.key.as_mut() {
                if !event.functional_key {
                    *key = mask_text(key);
                }
            }
            if let Some(text) = event.payload.text.as_mut() {
                *text = mask_text(text);
            }
        }
        PrivacyTier::MetadataOnly => {
            event.payload = EventPayload::default();
        }
    }
    event
}

/// Replace content characters with their class placeholder
pub fn mask_text(input: &str) -> String {
    input.chars().map(mask_char).collect()
}

fn mask_char(c: char) -> char {
    if c.is_whitespace() {
        c
    } else if c.is_alphabetic() {
        'X'
    } else if c.is_numeric() {
        '0'
    } else {
        '*'
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::MasterKey;
    use crate::crypto::keystore::KeyStore;
    use crate::recording::event::{
        is_functional_key, DeleteDirection, EventKind, Modifiers, RawInputEvent, Selection,
    };
    use crate::recording::recorder::{Recorder, RecorderConfig};
    use crate::storage::memory::MemorySessionStore;
    use crate::storage::pipeline::{PipelineConfig, StoragePipeline};
    use crate::storage::store::SessionStore;
    use crate::utils::clock::ManualClock;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn event(kind: EventKind, payload: EventPayload, functional_key: bool) -> KeystrokeEvent {
        KeystrokeEvent {
            id: "evt".into(),
            session_id: "s".into(),
            sequence: 1,
            relative_ms: 0,
            occurred_at: Utc::now(),
            kind,
            payload,
            modifiers: Modifiers::default(),
            functional_key,
            target: Some("textarea".into()),
        }
    }

    #[test]
    fn test_mask_text() {
        assert_eq!(mask_text("Hello, World 42!\n\tok"), "XXXXX* XXXXX 00*\n\tXX");
        assert_eq!(mask_text(""), "");
    }

    #[test]
    fn test_anonymized_keeps_functional_keys() {
        let backspace = event(
            EventKind::KeyDown,
            EventPayload { key: Some("Backspace".into()), ..Default::default() },
            true,
        );
        let out = apply_privacy(backspace, PrivacyTier::Anonymized);
        assert_eq!(out.payload.key.as_deref(), Some("Backspace"));

        let letter = event(
            EventKind::KeyDown,
            EventPayload { key: Some("q".into()), ..Default::default() },
            false,
        );
        let out = apply_privacy(letter, PrivacyTier::Anonymized);
        assert_eq!(out.payload.key.as_deref(), Some("X"));
    }

    #[test]
    fn test_anonymized_keeps_structure() {
        let payload = EventPayload {
            text: Some("a1 .".into()),
            selection: Some(Selection::new(1, 3)),
            direction: Some(DeleteDirection::Backward),
            ..Default::default()
        };
        let out = apply_privacy(event(EventKind::Delete, payload, false), PrivacyTier::Anonymized);
        assert_eq!(out.payload.text.as_deref(), Some("X0 *"));
        assert_eq!(out.payload.selection, Some(Selection::new(1, 3)));
        assert_eq!(out.payload.direction, Some(DeleteDirection::Backward));
    }

    #[test]
    fn test_metadata_only_strips_payload() {
        let payload = EventPayload { text: Some("secret".into()), ..Default::default() };
        let out = apply_privacy(event(EventKind::Paste, payload, false), PrivacyTier::MetadataOnly);
        assert!(out.payload.is_empty());
        assert_eq!(out.kind, EventKind::Paste);
        assert_eq!(out.target.as_deref(), Some("textarea"));
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!(PrivacyTier::parse("metadata-only"), Some(PrivacyTier::MetadataOnly));
        assert_eq!(PrivacyTier::parse(PrivacyTier::Anonymized.as_str()), Some(PrivacyTier::Anonymized));
        assert_eq!(PrivacyTier::parse("partial"), None);
    }

    #[test]
    fn test_anonymized_masks_composed_keys() {
        let composed = RawInputEvent::KeyDown {
            key: "日本".into(),
            modifiers: Modifiers::default(),
            target: None,
        }
        .normalize()
        .unwrap();
        assert!(!composed.functional_key);

        let out = apply_privacy(
            event(composed.kind, composed.payload, composed.functional_key),
            PrivacyTier::Anonymized,
        );
        assert_eq!(out.payload.key.as_deref(), Some("XX"));
    }

    /// Content marked with `~`, which never occurs in base64, ULIDs, hex or kind names
    fn arb_secret() -> impl Strategy<Value = String> {
        "[a-z0-9 ]{3,12}".prop_map(|s| format!("~{}", s))
    }

    fn arb_raw_event() -> impl Strategy<Value = (RawInputEvent, String)> {
        (0u8..6, arb_secret(), 0usize..40, 0usize..40).prop_map(|(variant, secret, a, b)| {
            let target = Some("editor".to_string());
            let raw = match variant {
                0 => RawInputEvent::KeyDown {
                    key: secret.clone(),
                    modifiers: Modifiers { shift: a % 2 == 0, ..Default::default() },
                    target,
                },
                1 => RawInputEvent::Input {
                    input_type: "insertText".into(),
                    data: Some(secret.clone()),
                    target,
                },
                2 => RawInputEvent::Paste { text: secret.clone(), target },
                3 => RawInputEvent::Cut { text: secret.clone(), target },
                4 => RawInputEvent::Input {
                    input_type: "deleteContentBackward".into(),
                    data: Some(secret.clone()),
                    target,
                },
                _ => RawInputEvent::SelectionChange { start: a, end: b, target },
            };
            (raw, secret)
        })
    }

    /// Record `events` under `metadata_only` and return what the store holds
    fn record_metadata_only(events: Vec<RawInputEvent>) -> (String, Vec<serde_json::Value>) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let store = Arc::new(MemorySessionStore::new());
            let keys = Arc::new(KeyStore::in_memory(&MasterKey::generate()).unwrap());
            let pipeline = Arc::new(StoragePipeline::new(
                store.clone(),
                Arc::clone(&keys),
                PipelineConfig::default(),
            ));
            let config = RecorderConfig {
                privacy_tier: PrivacyTier::MetadataOnly,
                buffer_size: 4,
                ..Default::default()
            };
            let recorder = Recorder::new(config, pipeline, Arc::new(ManualClock::new(Utc::now())));

            let id = recorder.start("owner", "doc", "Draft").await.unwrap();
            for raw in events {
                recorder.handle_input(raw);
            }
            recorder.stop().await.unwrap();

            let stored = store.fetch_session(&id).await.unwrap();
            let key = keys.get(&id).unwrap();
            let bodies = stored
                .events
                .iter()
                .map(|record| serde_json::to_value(record.open(&key).unwrap()).unwrap())
                .collect();
            (serde_json::to_string(&stored).unwrap(), bodies)
        })
    }

    fn arb_tier() -> impl Strategy<Value = PrivacyTier> {
        prop_oneof![
            Just(PrivacyTier::Full),
            Just(PrivacyTier::Anonymized),
            Just(PrivacyTier::MetadataOnly),
        ]
    }

    proptest! {
        #[test]
        fn prop_filter_is_idempotent(text in ".{0,40}", key in ".{1,12}", tier in arb_tier()) {
            let functional = is_functional_key(&key);
            let payload = EventPayload { key: Some(key), text: Some(text), ..Default::default() };
            let once = apply_privacy(event(EventKind::Insert, payload, functional), tier);
            let twice = apply_privacy(once.clone(), tier);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_anonymized_preserves_length(text in ".{0,40}") {
            let masked = mask_text(&text);
            prop_assert_eq!(masked.chars().count(), text.chars().count());
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_metadata_only_never_stores_content(
            inputs in prop::collection::vec(arb_raw_event(), 1..24)
        ) {
            let (events, secrets): (Vec<_>, Vec<_>) = inputs.into_iter().unzip();
            let (stored, bodies) = record_metadata_only(events);

            prop_assert!(!bodies.is_empty());
            prop_assert!(!stored.contains('~'));
            for secret in &secrets {
                prop_assert!(!stored.contains(secret.as_str()));
            }

            for body in &bodies {
                let rendered = body.to_string();
                prop_assert!(!rendered.contains('~'));
                let payload = &body["payload"];
                for field in ["key", "text", "selection", "direction"] {
                    prop_assert!(payload.get(field).map_or(true, |v| v.is_null()), "{} kept: {}", field, rendered);
                }
            }
        }
    }
}
