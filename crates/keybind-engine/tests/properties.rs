//! Property tests for chord text and sequence comparison.

use keybind_engine::{compare, parse_chord, CompareResult, Key, KeyCode, KeySequence, Platform};
use proptest::prelude::*;

/// Keys whose chord-text token parses back to the same key.
fn bindable_keys() -> Vec<&'static Key> {
    Key::all()
        .iter()
        .filter(|key| !key.is_modifier())
        .filter(|key| !key.easy_string.is_empty())
        .filter(|key| !key.easy_string.contains('+') && !key.easy_string.contains(char::is_whitespace))
        .filter(|key| {
            parse_chord(key.easy_string, Platform::Pc)
                .ok()
                .and_then(|chord| chord.key)
                .map(|k| k.code)
                == Some(key.code)
        })
        .collect()
}

fn chord() -> impl Strategy<Value = KeyCode> {
    let keys = bindable_keys();
    (
        prop::sample::select(keys),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(key, ctrl, alt, shift, meta)| KeyCode {
            ctrl,
            alt,
            shift,
            meta,
            ..KeyCode::new(key)
        })
}

fn sequence(len: impl Into<prop::collection::SizeRange>) -> impl Strategy<Value = Vec<KeyCode>> {
    prop::collection::vec(chord(), len)
}

proptest! {
    #[test]
    fn chord_text_round_trips(chord in chord()) {
        let text = chord.to_string();
        let parsed = parse_chord(&text, Platform::Pc).unwrap();
        prop_assert_eq!(&parsed, &chord);
        prop_assert_eq!(parsed.to_string(), text);
    }

    #[test]
    fn sequence_text_round_trips(keys in sequence(1..4)) {
        let sequence = KeySequence::from_keys(keys);
        let parsed = KeySequence::parse(&sequence.to_string(), Platform::Pc).unwrap();
        prop_assert_eq!(parsed.compare(&sequence), CompareResult::Full);
    }

    #[test]
    fn sequence_matches_itself(keys in sequence(1..5)) {
        prop_assert_eq!(compare(&keys, &keys), CompareResult::Full);
    }

    #[test]
    fn proper_prefix_is_partial_and_extension_shadows(
        prefix in sequence(1..4),
        rest in sequence(1..3),
    ) {
        let mut longer = prefix.clone();
        longer.extend(rest);
        prop_assert_eq!(compare(&prefix, &longer), CompareResult::Partial);
        prop_assert_eq!(compare(&longer, &prefix), CompareResult::Shadow);
    }

    #[test]
    fn diverging_first_chord_never_matches(
        a in chord(),
        b in chord(),
        tail_a in sequence(0..3),
        tail_b in sequence(0..3),
    ) {
        prop_assume!(a != b);
        let mut left = vec![a];
        left.extend(tail_a);
        let mut right = vec![b];
        right.extend(tail_b);
        prop_assert_eq!(compare(&left, &right), CompareResult::None);
    }

    #[test]
    fn ctrlcmd_follows_platform(key in prop::sample::select(bindable_keys())) {
        let text = format!("ctrlcmd+{}", key.easy_string);
        let pc = parse_chord(&text, Platform::Pc).unwrap();
        let mac = parse_chord(&text, Platform::Mac).unwrap();
        prop_assert!(pc.ctrl && !pc.meta);
        prop_assert!(mac.meta && !mac.ctrl);
        prop_assert_eq!(pc.key.map(|k| k.code), Some(key.code));
    }
}
