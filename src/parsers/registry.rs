//! Language registry: file extension → (grammar, capture query).
//!
//! Adding a language means registering an entry here, not branching in the
//! extractor. Every query uses the same capture label convention:
//! `name.definition.<kind>` marks a definition site, `name.reference.<kind>`
//! marks a reference; any other label is ignored by the extractor.

use std::path::Path;

use std::sync::LazyLock;
use tree_sitter::Language;

/// Grammar plus capture query for one language.
pub struct LanguageSpec {
    /// Stable language identifier ("rust", "python", ...)
    pub id: &'static str,

    /// File extensions that map to this language
    pub extensions: &'static [&'static str],

    /// Compiled grammar
    pub language: Language,

    /// Declarative capture query source (tags.scm convention)
    pub query: &'static str,
}

const RUST_TAGS: &str = r#"
(function_item name: (identifier) @name.definition.function)
(struct_item name: (type_identifier) @name.definition.class)
(enum_item name: (type_identifier) @name.definition.class)
(trait_item name: (type_identifier) @name.definition.interface)
(mod_item name: (identifier) @name.definition.module)
(call_expression function: (identifier) @name.reference.call)
(call_expression function: (field_expression field: (field_identifier) @name.reference.call))
(call_expression function: (scoped_identifier name: (identifier) @name.reference.call))
"#;

const PYTHON_TAGS: &str = r#"
(function_definition name: (identifier) @name.definition.function)
(class_definition name: (identifier) @name.definition.class)
(call function: (identifier) @name.reference.call)
(call function: (attribute attribute: (identifier) @name.reference.call))
"#;

const JAVASCRIPT_TAGS: &str = r#"
(function_declaration name: (identifier) @name.definition.function)
(class_declaration name: (identifier) @name.definition.class)
(method_definition name: (property_identifier) @name.definition.method)
(call_expression function: (identifier) @name.reference.call)
(call_expression function: (member_expression property: (property_identifier) @name.reference.call))
"#;

const TYPESCRIPT_TAGS: &str = r#"
(function_declaration name: (identifier) @name.definition.function)
(class_declaration name: (type_identifier) @name.definition.class)
(interface_declaration name: (type_identifier) @name.definition.interface)
(method_definition name: (property_identifier) @name.definition.method)
(call_expression function: (identifier) @name.reference.call)
(call_expression function: (member_expression property: (property_identifier) @name.reference.call))
"#;

const GO_TAGS: &str = r#"
(function_declaration name: (identifier) @name.definition.function)
(method_declaration name: (field_identifier) @name.definition.method)
(type_declaration (type_spec name: (type_identifier) @name.definition.class))
(call_expression function: (identifier) @name.reference.call)
(call_expression function: (selector_expression field: (field_identifier) @name.reference.call))
"#;

const CPP_TAGS: &str = r#"
(function_definition declarator: (function_declarator declarator: (identifier) @name.definition.function))
(class_specifier name: (type_identifier) @name.definition.class)
(struct_specifier name: (type_identifier) @name.definition.class)
(call_expression function: (identifier) @name.reference.call)
(call_expression function: (field_expression field: (field_identifier) @name.reference.call))
"#;

static REGISTRY: LazyLock<Vec<LanguageSpec>> = LazyLock::new(|| {
    vec![
        LanguageSpec {
            id: "rust",
            extensions: &["rs"],
            language: tree_sitter_rust::LANGUAGE.into(),
            query: RUST_TAGS,
        },
        LanguageSpec {
            id: "python",
            extensions: &["py"],
            language: tree_sitter_python::LANGUAGE.into(),
            query: PYTHON_TAGS,
        },
        LanguageSpec {
            id: "javascript",
            extensions: &["js", "jsx", "mjs", "cjs"],
            language: tree_sitter_javascript::LANGUAGE.into(),
            query: JAVASCRIPT_TAGS,
        },
        LanguageSpec {
            id: "typescript",
            extensions: &["ts"],
            language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            query: TYPESCRIPT_TAGS,
        },
        LanguageSpec {
            id: "tsx",
            extensions: &["tsx"],
            language: tree_sitter_typescript::LANGUAGE_TSX.into(),
            query: TYPESCRIPT_TAGS,
        },
        LanguageSpec {
            id: "go",
            extensions: &["go"],
            language: tree_sitter_go::LANGUAGE.into(),
            query: GO_TAGS,
        },
        LanguageSpec {
            id: "cpp",
            extensions: &["cpp", "cxx", "cc", "hpp", "hxx", "c", "h"],
            language: tree_sitter_cpp::LANGUAGE.into(),
            query: CPP_TAGS,
        },
    ]
});

/// Look up the language spec for a file path by extension.
/// Returns `None` for unsupported languages; absence is not an error.
pub fn language_for(path: &Path) -> Option<&'static LanguageSpec> {
    let ext = path.extension()?.to_str()?.to_lowercase();

    REGISTRY
        .iter()
        .find(|spec| spec.extensions.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tree_sitter::Query;

    #[test]
    fn extension_dispatch() {
        assert_eq!(language_for(&PathBuf::from("a.rs")).unwrap().id, "rust");
        assert_eq!(language_for(&PathBuf::from("b.py")).unwrap().id, "python");
        assert_eq!(language_for(&PathBuf::from("c.tsx")).unwrap().id, "tsx");
        assert_eq!(language_for(&PathBuf::from("d.go")).unwrap().id, "go");
        assert!(language_for(&PathBuf::from("e.unknown")).is_none());
        assert!(language_for(&PathBuf::from("no_extension")).is_none());
    }

    #[test]
    fn all_queries_compile() {
        for spec in REGISTRY.iter() {
            Query::new(&spec.language, spec.query)
                .unwrap_or_else(|e| panic!("query for {} failed: {e}", spec.id));
        }
    }
}
