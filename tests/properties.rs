//! Property tests for the locator and applicator

use func_patcher::{apply, FunctionLocator};
use proptest::prelude::*;

/// Body lines with nested blocks; every block is closed.
fn body() -> impl Strategy<Value = String> {
    prop::collection::vec(0u8..3, 0..12).prop_map(|ops| {
        let mut out = String::new();
        let mut depth = 1usize;
        for op in ops {
            let indent = "    ".repeat(depth);
            match op {
                0 => out.push_str(&format!("{indent}x = x + {depth};\n")),
                1 => {
                    out.push_str(&format!("{indent}if (x > {depth}) {{\n"));
                    depth += 1;
                }
                _ if depth > 1 => {
                    depth -= 1;
                    out.push_str(&format!("{}}}\n", "    ".repeat(depth)));
                }
                _ => out.push_str(&format!("{indent}x--;\n")),
            }
        }
        while depth > 1 {
            depth -= 1;
            out.push_str(&format!("{}}}\n", "    ".repeat(depth)));
        }
        out
    })
}

fn function(name: String) -> impl Strategy<Value = String> {
    (prop_oneof![Just("int"), Just("void")], body()).prop_map(move |(ret, body)| {
        format!("{ret} {name}(int x) {{\n{body}}}\n")
    })
}

/// A translation unit with distinct function names, plus the names.
fn translation_unit() -> impl Strategy<Value = (String, Vec<String>)> {
    prop::collection::btree_set("fn_[a-z0-9]{1,6}", 1..5)
        .prop_flat_map(|names| {
            let names: Vec<String> = names.into_iter().collect();
            let functions: Vec<_> = names.iter().cloned().map(function).collect();
            (functions, Just(names))
        })
        .prop_map(|(functions, names)| {
            let mut text = String::from("#include <cstdio>\n\n");
            for f in functions {
                text.push_str(&f);
                text.push('\n');
            }
            (text, names)
        })
}

proptest! {
    #[test]
    fn located_span_is_brace_balanced((text, names) in translation_unit()) {
        let locator = FunctionLocator::default();
        for name in &names {
            let span = locator.locate(&text, name).unwrap();
            let (open, close) = span.brace_counts();
            prop_assert!(open > 0);
            prop_assert_eq!(open, close);
            prop_assert_eq!(&text[span.byte_start..span.byte_end], span.text.as_str());
            let expected = format!(" {name}(int x) {{");
            prop_assert!(span.text.contains(&expected));
        }
    }

    #[test]
    fn unmatched_original_leaves_text_untouched(
        file in "[a-z{}();=+ \n\t]{0,200}",
        original in "@[a-z{}(); \n]{1,40}",
    ) {
        let (patched, outcome) = apply(&file, &original, "int f() {\n}\n");
        prop_assert!(!outcome.applied);
        prop_assert_eq!(patched, file);
    }

    #[test]
    fn applied_patch_only_touches_the_span((text, names) in translation_unit()) {
        let locator = FunctionLocator::default();
        let name = &names[0];
        let span = locator.locate(&text, name).unwrap();
        let replacement = format!("int {name}(int x) {{\n    return x;\n}}");

        let (patched, outcome) = apply(&text, &span.text, &replacement);
        prop_assert!(outcome.applied);
        prop_assert!(patched.starts_with(&text[..span.byte_start]));
        prop_assert!(patched.ends_with(&text[span.byte_end..]));
        prop_assert!(patched.contains(&replacement));

        let again = locator.locate(&patched, name).unwrap();
        prop_assert_eq!(again.text.trim_end(), replacement.as_str());
    }
}
