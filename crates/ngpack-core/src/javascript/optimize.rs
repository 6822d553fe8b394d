use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::Path;

const PURE_ANNOTATION: &str = "/*#__PURE__*/ ";

/// Top-level variable initialized by a call: `const x = factory(` or
/// `var x = new Foo(`
static TOP_LEVEL_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^((?:export\s+)?(?:const|let|var)\s+[\w$]+\s*=\s*)((?:new\s+)?([\w$.]+)\s*\()")
        .expect("valid regex")
});

/// Framework calls that only attach metadata for development tooling
static CLASS_METADATA_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[\w$]+\.)?ɵ(?:setClassMetadata|setClassMetadataAsync|setClassDebugInfo)\s*\(")
        .expect("valid regex")
});

static SAFE_FRAMEWORK_PACKAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\\/]node_modules[\\/]@angular[\\/]").expect("valid regex"));

/// The server package's init entry point registers globals on import
static SERVER_INIT_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\\/]@angular[\\/]platform-server[\\/]f?esm20\d\d[\\/]init").expect("valid regex")
});

/// Framework packages are free of module-level side effects apart from the
/// server init entry point
pub fn is_side_effect_free_framework_package(path: &Path) -> bool {
    let path = path.to_string_lossy();
    SAFE_FRAMEWORK_PACKAGE.is_match(&path) && !SERVER_INIT_ENTRY.is_match(&path)
}

/// Mark top-level call initializers as pure so unused ones can be dropped
pub fn annotate_pure_top_level(source: &str) -> String {
    TOP_LEVEL_CALL
        .replace_all(source, |captures: &Captures| {
            if &captures[3] == "require" {
                return captures[0].to_string();
            }
            format!("{}{}{}", &captures[1], PURE_ANNOTATION, &captures[2])
        })
        .into_owned()
}

/// Replace class metadata calls with `void 0`
pub fn elide_class_metadata(source: &str) -> String {
    let mut output = String::with_capacity(source.len());
    let mut cursor = 0;

    while let Some(found) = CLASS_METADATA_CALL.find_at(source, cursor) {
        // `find` ends just past the opening parenthesis
        let Some(end) = find_closing_paren(source, found.end() - 1) else {
            break;
        };
        output.push_str(&source[cursor..found.start()]);
        output.push_str("void 0");
        cursor = end + 1;
    }

    output.push_str(&source[cursor..]);
    output
}

/// Index of the parenthesis closing the one at `open`, skipping strings and
/// comments
fn find_closing_paren(source: &str, open: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_pure_annotation() {
        let source = indoc! {"
            const token = new InjectionToken('token');
            export const factory = createFactory(a);
            let fs = require('fs');
              const nested = call();
            var already = /*#__PURE__*/ call();
        "};

        assert_eq!(
            annotate_pure_top_level(source),
            indoc! {"
                const token = /*#__PURE__*/ new InjectionToken('token');
                export const factory = /*#__PURE__*/ createFactory(a);
                let fs = require('fs');
                  const nested = call();
                var already = /*#__PURE__*/ call();
            "}
        );
    }

    #[test]
    fn test_metadata_calls_are_elided() {
        let source = indoc! {r#"
            (function () { (typeof ngDevMode === "undefined" || ngDevMode) && i0.ɵsetClassMetadata(Foo, [{ type: Component, args: [{ template: ")(" }] }], null, null); })();
            (() => { (typeof ngDevMode === "undefined" || ngDevMode) && i0.ɵsetClassDebugInfo(Foo, { className: "Foo" }); })();
            keep(Foo);
        "#};

        assert_eq!(
            elide_class_metadata(source),
            indoc! {r#"
                (function () { (typeof ngDevMode === "undefined" || ngDevMode) && void 0; })();
                (() => { (typeof ngDevMode === "undefined" || ngDevMode) && void 0; })();
                keep(Foo);
            "#}
        );
    }

    #[test]
    fn test_unbalanced_metadata_call_is_left_alone() {
        let source = "ɵsetClassMetadata(Foo, [";
        assert_eq!(elide_class_metadata(source), source);
    }

    #[test]
    fn test_side_effect_free_framework_packages() {
        assert!(is_side_effect_free_framework_package(Path::new(
            "/app/node_modules/@angular/core/fesm2022/core.mjs"
        )));
        assert!(!is_side_effect_free_framework_package(Path::new(
            "/app/node_modules/@angular/platform-server/fesm2022/init.mjs"
        )));
        assert!(!is_side_effect_free_framework_package(Path::new(
            "/app/node_modules/rxjs/dist/index.js"
        )));
    }
}
