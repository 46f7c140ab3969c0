//! Contains the structured documentation of a namespace as produced by a
//! [SourceInspector](crate::inspector::SourceInspector).
//!
//! The record is plain data and is handed to the [Renderer](crate::render::Renderer). All types
//! are serializable so that the [TemplateRenderer](crate::render::TemplateRenderer) can expose
//! them to its template.
use serde::Serialize;

/// Describes a single documented declaration like a constant, a function or a method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Item {
    /// The name of the declaration.
    pub name: String,
    /// The declaration itself (e.g. the signature of a function).
    pub decl: String,
    /// The doc comment attached to the declaration.
    pub doc: String,
}

/// Describes a documented type along with its associated declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeDoc {
    /// The name of the type.
    pub name: String,
    /// The declaration of the type.
    pub decl: String,
    /// The doc comment attached to the type.
    pub doc: String,
    /// Associated constants.
    pub constants: Vec<Item>,
    /// Associated statics.
    pub variables: Vec<Item>,
    /// Associated functions which do not take a receiver (constructors and the like).
    pub functions: Vec<Item>,
    /// Associated functions which take a receiver.
    pub methods: Vec<Item>,
}

/// Represents the documentation of a whole namespace.
///
/// A package with an empty **name** is treated as unresolvable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Package {
    /// The short name of the namespace (its last path segment).
    pub name: String,
    /// The full name which was used to import the namespace.
    pub import_path: String,
    /// The first sentence of the namespace documentation.
    pub synopsis: String,
    /// The namespace documentation.
    pub doc: String,
    /// Public constants.
    pub constants: Vec<Item>,
    /// Public statics.
    pub variables: Vec<Item>,
    /// Public free functions.
    pub functions: Vec<Item>,
    /// Public types.
    pub types: Vec<TypeDoc>,
    /// The relative names of all nested namespaces.
    pub sub_packages: Vec<String>,
}

impl Package {
    /// Determines if this package actually describes a resolved namespace.
    pub fn is_resolved(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Extracts the first sentence of the given documentation text.
///
/// Only the first paragraph is considered. Line breaks are folded into spaces and the sentence
/// ends at the first period which is followed by whitespace or the end of the paragraph.
///
/// # Examples
///
/// ```
/// # use nsdoc::package::synopsis;
/// assert_eq!(synopsis("Provides a cache. It is fast."), "Provides a cache.");
/// assert_eq!(synopsis("Provides\na cache\n\nDetails follow."), "Provides a cache");
/// assert_eq!(synopsis("Version 1.2 is out. Really."), "Version 1.2 is out.");
/// assert_eq!(synopsis(""), "");
/// ```
pub fn synopsis(doc: &str) -> String {
    let paragraph = doc
        .trim()
        .lines()
        .map(str::trim)
        .take_while(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut chars = paragraph.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        if ch == '.' {
            match chars.peek() {
                None => return paragraph,
                Some((_, next)) if next.is_whitespace() => {
                    return paragraph[..=index].to_owned();
                }
                _ => (),
            }
        }
    }

    paragraph
}
