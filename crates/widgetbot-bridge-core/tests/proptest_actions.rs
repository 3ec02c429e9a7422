use proptest::prelude::*;
use widgetbot_bridge_core::actions::{parse_actions, strip_actions};

proptest! {
    /// Parsing and stripping never crash on arbitrary input.
    #[test]
    fn does_not_crash(s in "\\PC*") {
        let _ = parse_actions(&s);
        let _ = strip_actions(&s);
    }

    /// A valid tag is found with its data and removed from the display text.
    #[test]
    fn finds_and_strips_valid_tags(
        kind in "(navigate|notify|toggle|hide|show|open_url)",
        data in "[a-zA-Z0-9/:. ]*",
        prefix in "[a-zA-Z0-9 ]*",
        suffix in "[a-zA-Z0-9 ]*"
    ) {
        let tag = format!("[ACTION:{kind}:{data}]");
        let input = format!("{prefix}{tag}{suffix}");

        let actions = parse_actions(&input);
        prop_assert_eq!(actions.len(), 1);
        prop_assert_eq!(&actions[0].data, &data);

        let clean = strip_actions(&input);
        prop_assert!(!clean.contains("[ACTION:"), "tag survived in {}", clean);
        if !prefix.trim().is_empty() {
            prop_assert!(clean.contains(prefix.trim()));
        }
    }

    /// Unknown tag types are dropped but still stripped.
    #[test]
    fn ignores_unknown_kinds(kind in "x[a-z]{1,8}", data in "[a-z ]*") {
        let input = format!("hello [ACTION:{kind}:{data}]");
        prop_assert!(parse_actions(&input).is_empty());
        prop_assert_eq!(strip_actions(&input), "hello");
    }
}
