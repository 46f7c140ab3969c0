//! Extracts structured documentation for a namespace name.
//!
//! The cache only depends on the [SourceInspector](SourceInspector) trait. It is invoked
//! synchronously (on the blocking thread pool) and is expected to be idempotent. Returning
//! `Ok(None)` (or a package without a name) signals that the name doesn't resolve to a
//! documentable unit.
//!
//! The [DirectoryInspector](DirectoryInspector) provided here maps a namespace name onto a
//! directory below a base directory and parses the Rust sources within using **syn**. Only the
//! top level items of each file are inspected:
//!
//! * Inner doc comments (`//!`) make up the namespace documentation.
//! * `pub const` items are reported as constants, `pub static` items as variables.
//! * `pub fn` items are reported as functions. Their declaration is the signature without body.
//! * `pub struct`, `pub enum`, `pub trait`, `pub union` and `pub type` items are reported as
//!   types. Inherent `impl` blocks attach their public constants, functions and methods to the
//!   type they implement.
//! * Outer doc comments (`///` or `#[doc = "..."]`) are attached to their item. Items marked
//!   with `#[doc(hidden)]` are skipped, as are inline modules.
//!
//! Declarations are reported as they appear in the source. Files which fail to parse are logged
//! and skipped. Each sub directory which (transitively) contains Rust sources is reported as sub
//! package.
//!
//! # Example
//!
//! ```no_run
//! # use nsdoc::inspector::{DirectoryInspector, SourceInspector};
//! let inspector = DirectoryInspector::new("src");
//! if let Ok(Some(package)) = inspector.inspect("acme/net") {
//!     println!("{}: {}", package.import_path, package.synopsis);
//! }
//! ```
use std::path::{Path, PathBuf};

use anyhow::Context;
use proc_macro2::LineColumn;
use quote::ToTokens;
use syn::ext::IdentExt;
use syn::spanned::Spanned;
use syn::visit::Visit;
use syn::{
    Attribute, Block, Expr, ExprLit, Ident, ImplItem, ItemConst, ItemEnum, ItemFn, ItemImpl,
    ItemMod, ItemStatic, ItemStruct, ItemTrait, ItemType, ItemUnion, Lit, Meta, MetaNameValue,
    Type, Visibility,
};

use crate::package::{synopsis, Item, Package, TypeDoc};

/// Extracts the documentation of a namespace given its name.
pub trait SourceInspector: Send + Sync {
    /// Inspects the namespace with the given name.
    ///
    /// Returns `Ok(None)` if the name doesn't resolve to a documentable unit.
    fn inspect(&self, name: &str) -> anyhow::Result<Option<Package>>;
}

impl<F> SourceInspector for F
where
    F: Fn(&str) -> anyhow::Result<Option<Package>> + Send + Sync,
{
    fn inspect(&self, name: &str) -> anyhow::Result<Option<Package>> {
        self(name)
    }
}

/// Resolves namespace names to directories of Rust sources below a base directory.
pub struct DirectoryInspector {
    base_dir: PathBuf,
}

impl DirectoryInspector {
    /// Creates a new inspector which resolves names relative to the given directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        DirectoryInspector {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the directory for the given name or **None** if the name is malformed.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let mut path = self.base_dir.clone();
        for segment in name.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return None;
            }
            path.push(segment);
        }

        Some(path)
    }
}

impl SourceInspector for DirectoryInspector {
    fn inspect(&self, name: &str) -> anyhow::Result<Option<Package>> {
        let dir = match self.resolve(name) {
            Some(dir) if dir.is_dir() => dir,
            _ => return Ok(None),
        };

        let sources = source_files(&dir)?;
        if sources.is_empty() {
            return Ok(None);
        }

        let mut scanner = Scanner::default();
        for file in sources {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            scanner.scan(&file, &source);
        }

        let mut package = scanner.finish();
        package.name = name.rsplit('/').next().unwrap_or(name).replace('-', "_");
        package.import_path = name.to_owned();
        package.synopsis = synopsis(&package.doc);
        package.sub_packages = sub_packages(&dir)?;

        Ok(Some(package))
    }
}

/// Lists all Rust sources in the given directory. The crate or module root (**lib.rs**,
/// **main.rs** or **mod.rs**) comes first so that its docs lead the package documentation.
fn source_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Cannot list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|ext| ext == "rs").unwrap_or(false) {
            files.push(path);
        }
    }

    files.sort_by_key(|path| {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let is_root = matches!(file_name.as_str(), "lib.rs" | "main.rs" | "mod.rs");
        (!is_root, file_name)
    });

    Ok(files)
}

/// Lists the names of all sub directories which contain Rust sources.
fn sub_packages(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut result = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Cannot list {}", dir.display()))? {
        let path = entry?.path();
        if is_candidate_dir(&path) && contains_sources(&path) {
            if let Some(name) = path.file_name() {
                result.push(name.to_string_lossy().to_string());
            }
        }
    }

    result.sort();
    Ok(result)
}

fn is_candidate_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                !name.starts_with('.') && name != "target"
            })
            .unwrap_or(false)
}

fn contains_sources(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.flatten().any(|entry| {
            let path = entry.path();
            if path.is_file() {
                path.extension().map(|ext| ext == "rs").unwrap_or(false)
            } else {
                is_candidate_dir(&path) && contains_sources(&path)
            }
        }),
        Err(_) => false,
    }
}

/// Maps the line and column positions reported by spans back onto the source text.
struct SourceText<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceText<'a> {
    fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(index, _)| index + 1))
            .collect();

        SourceText {
            source,
            line_starts,
        }
    }

    /// Converts a position (1-based line, 0-based column in chars) into a byte offset.
    fn offset(&self, position: LineColumn) -> usize {
        let start = match position
            .line
            .checked_sub(1)
            .and_then(|line| self.line_starts.get(line))
        {
            Some(start) => *start,
            None => return self.source.len(),
        };

        let rest = &self.source[start..];
        rest.char_indices()
            .map(|(index, _)| index)
            .chain(std::iter::once(rest.len()))
            .nth(position.column)
            .map(|index| start + index)
            .unwrap_or(self.source.len())
    }

    fn slice(&self, start: LineColumn, end: LineColumn) -> String {
        let start = self.offset(start);
        let end = self.offset(end).max(start);
        self.source[start..end].trim_end().to_owned()
    }

    /// Returns the complete declaration of an item, starting at its visibility.
    fn declaration(&self, vis: &Visibility, item: &impl ToTokens) -> String {
        match item.to_token_stream().into_iter().last() {
            Some(last) => self.slice(vis.span().start(), last.span().end()),
            None => String::new(),
        }
    }

    /// Returns the signature of a function, which is everything up to its body.
    fn signature(&self, vis: &Visibility, body: &Block) -> String {
        self.slice(vis.span().start(), body.brace_token.span.open().start())
    }
}

/// Items found in the inherent impl blocks of a type.
#[derive(Default)]
struct Associated {
    constants: Vec<Item>,
    functions: Vec<Item>,
    methods: Vec<Item>,
}

/// Collects the documentation found in all sources of a namespace.
#[derive(Default)]
struct Scanner {
    doc: Vec<String>,
    constants: Vec<Item>,
    variables: Vec<Item>,
    functions: Vec<Item>,
    types: Vec<TypeDoc>,
    associated: Vec<(String, Associated)>,
}

impl Scanner {
    fn scan(&mut self, file: &Path, source: &str) {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        match syn::parse_file(source) {
            Ok(syntax) => {
                let doc = doc_text(&syntax.attrs);
                if !doc.is_empty() {
                    self.doc.push(doc);
                }

                let text = SourceText::new(source);
                Collector {
                    text: &text,
                    scanner: self,
                }
                .visit_file(&syntax);
            }
            Err(error) => log::warn!(
                "Skipping {} as it cannot be parsed (line {}): {}",
                file.display(),
                error.span().start().line,
                error
            ),
        }

        // The text of each parsed file is kept per thread until spans are invalidated...
        proc_macro2::extra::invalidate_current_thread_spans();
    }

    fn associated_for(&mut self, type_name: String) -> &mut Associated {
        let index = match self.associated.iter().position(|(name, _)| *name == type_name) {
            Some(index) => index,
            None => {
                self.associated.push((type_name, Associated::default()));
                self.associated.len() - 1
            }
        };

        &mut self.associated[index].1
    }

    /// Merges associated items into their types and sorts everything by name.
    fn finish(self) -> Package {
        let mut types = self.types;
        for (type_name, associated) in self.associated {
            if let Some(type_doc) = types.iter_mut().find(|t| t.name == type_name) {
                type_doc.constants.extend(associated.constants);
                type_doc.functions.extend(associated.functions);
                type_doc.methods.extend(associated.methods);
            }
        }

        for type_doc in types.iter_mut() {
            sort_items(&mut type_doc.constants);
            sort_items(&mut type_doc.functions);
            sort_items(&mut type_doc.methods);
        }
        types.sort_by(|a, b| a.name.cmp(&b.name));

        let mut package = Package {
            doc: self.doc.join("\n\n"),
            constants: self.constants,
            variables: self.variables,
            functions: self.functions,
            types,
            ..Package::default()
        };
        sort_items(&mut package.constants);
        sort_items(&mut package.variables);
        sort_items(&mut package.functions);

        package
    }
}

/// Walks the top level items of a single file.
struct Collector<'s, 'a> {
    text: &'s SourceText<'a>,
    scanner: &'s mut Scanner,
}

impl Collector<'_, '_> {
    fn item(&self, attrs: &[Attribute], vis: &Visibility, ident: &Ident, item: &impl ToTokens) -> Option<Item> {
        if !is_documented(attrs, vis) {
            return None;
        }

        Some(Item {
            name: ident.unraw().to_string(),
            decl: self.text.declaration(vis, item),
            doc: doc_text(attrs),
        })
    }

    fn push_type(&mut self, attrs: &[Attribute], vis: &Visibility, ident: &Ident, item: &impl ToTokens) {
        if let Some(item) = self.item(attrs, vis, ident, item) {
            self.scanner.types.push(TypeDoc {
                name: item.name,
                decl: item.decl,
                doc: item.doc,
                ..TypeDoc::default()
            });
        }
    }
}

impl<'ast> Visit<'ast> for Collector<'_, '_> {
    fn visit_item_const(&mut self, item: &'ast ItemConst) {
        if let Some(item) = self.item(&item.attrs, &item.vis, &item.ident, item) {
            self.scanner.constants.push(item);
        }
    }

    fn visit_item_static(&mut self, item: &'ast ItemStatic) {
        if let Some(item) = self.item(&item.attrs, &item.vis, &item.ident, item) {
            self.scanner.variables.push(item);
        }
    }

    fn visit_item_fn(&mut self, item: &'ast ItemFn) {
        if is_documented(&item.attrs, &item.vis) {
            self.scanner.functions.push(Item {
                name: item.sig.ident.unraw().to_string(),
                decl: self.text.signature(&item.vis, &item.block),
                doc: doc_text(&item.attrs),
            });
        }
    }

    fn visit_item_struct(&mut self, item: &'ast ItemStruct) {
        self.push_type(&item.attrs, &item.vis, &item.ident, item);
    }

    fn visit_item_enum(&mut self, item: &'ast ItemEnum) {
        self.push_type(&item.attrs, &item.vis, &item.ident, item);
    }

    fn visit_item_union(&mut self, item: &'ast ItemUnion) {
        self.push_type(&item.attrs, &item.vis, &item.ident, item);
    }

    fn visit_item_trait(&mut self, item: &'ast ItemTrait) {
        self.push_type(&item.attrs, &item.vis, &item.ident, item);
    }

    fn visit_item_type(&mut self, item: &'ast ItemType) {
        self.push_type(&item.attrs, &item.vis, &item.ident, item);
    }

    fn visit_item_impl(&mut self, item: &'ast ItemImpl) {
        // Trait impls are documented along with the trait...
        if item.trait_.is_some() {
            return;
        }

        let type_name = match &*item.self_ty {
            Type::Path(path) => match path.path.segments.last() {
                Some(segment) => segment.ident.unraw().to_string(),
                None => return,
            },
            _ => return,
        };

        let text = self.text;
        let associated = self.scanner.associated_for(type_name);
        for impl_item in &item.items {
            match impl_item {
                ImplItem::Const(constant) if is_documented(&constant.attrs, &constant.vis) => {
                    associated.constants.push(Item {
                        name: constant.ident.unraw().to_string(),
                        decl: text.declaration(&constant.vis, constant),
                        doc: doc_text(&constant.attrs),
                    })
                }
                ImplItem::Fn(function) if is_documented(&function.attrs, &function.vis) => {
                    let entry = Item {
                        name: function.sig.ident.unraw().to_string(),
                        decl: text.signature(&function.vis, &function.block),
                        doc: doc_text(&function.attrs),
                    };
                    if function.sig.receiver().is_some() {
                        associated.methods.push(entry);
                    } else {
                        associated.functions.push(entry);
                    }
                }
                _ => (),
            }
        }
    }

    fn visit_item_mod(&mut self, _item: &'ast ItemMod) {
        // Inline modules are namespaces of their own...
    }
}

fn is_documented(attrs: &[Attribute], vis: &Visibility) -> bool {
    matches!(vis, Visibility::Public(_)) && !is_hidden(attrs)
}

fn is_hidden(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|attr| {
        attr.path().is_ident("doc")
            && attr
                .parse_args::<Ident>()
                .map(|ident| ident == "hidden")
                .unwrap_or(false)
    })
}

/// Joins the text of all `#[doc = "..."]` attributes (which is what doc comments turn into).
fn doc_text(attrs: &[Attribute]) -> String {
    let mut lines = Vec::new();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("doc")) {
        if let Meta::NameValue(MetaNameValue {
            value: Expr::Lit(ExprLit {
                lit: Lit::Str(text),
                ..
            }),
            ..
        }) = &attr.meta
        {
            let text = text.value();
            for line in text.split('\n') {
                let line = line.trim_end_matches('\r');
                lines.push(line.strip_prefix(' ').unwrap_or(line).to_owned());
            }
        }
    }

    lines.join("\n").trim().to_owned()
}

fn sort_items(items: &mut [Item]) {
    items.sort_by(|a, b| a.name.cmp(&b.name));
}

#[cfg(test)]
mod tests {
    use crate::inspector::{DirectoryInspector, SourceInspector};
    use std::path::Path;

    const LIB: &str = r#"//! Provides networking helpers.
//!
//! Everything in here is async.

/// The default port.
pub const DEFAULT_PORT: u16 = 8080;

const PRIVATE: u16 = 1;

/// Counts all connections.
pub static CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Connects to the given address.
#[inline]
pub async fn connect(address: &str) -> Result<Connection> {
    let braces = "{{{";
    let ch = '{';
    todo!()
}

fn hidden() {}

/// Represents an open connection.
pub struct Connection {
    peer: String,
}

impl Connection {
    /// The maximal frame size.
    pub const MAX_FRAME: usize = 1024;

    /// Creates a new connection.
    pub fn new(peer: String) -> Self {
        Connection { peer }
    }

    /// Returns the peer address.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn internal(&mut self) {}
}

impl Display for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.peer)
    }
}
"#;

    const EXTRA: &str = r#"/// Supported protocols.
pub enum Protocol {
    Tcp,
    Udp,
}

pub type Port = u16;

pub fn parse_port(value: &str)
    -> Option<Port>
{
    value.parse().ok()
}
"#;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn scanning_a_directory_yields_all_public_declarations() {
        let base = tempfile::tempdir().unwrap();
        write(&base.path().join("acme/net/lib.rs"), LIB);
        write(&base.path().join("acme/net/extra.rs"), EXTRA);
        write(&base.path().join("acme/net/http/mod.rs"), "pub fn get() {}");
        write(&base.path().join("acme/net/assets/logo.svg"), "<svg/>");
        write(&base.path().join("acme/net/.hidden/x.rs"), "pub fn x() {}");

        let inspector = DirectoryInspector::new(base.path());
        let package = inspector.inspect("acme/net").unwrap().unwrap();

        assert_eq!(package.name, "net");
        assert_eq!(package.import_path, "acme/net");
        assert_eq!(package.synopsis, "Provides networking helpers.");
        assert_eq!(
            package.doc,
            "Provides networking helpers.\n\nEverything in here is async."
        );

        assert_eq!(package.constants.len(), 1);
        assert_eq!(package.constants[0].name, "DEFAULT_PORT");
        assert_eq!(package.constants[0].decl, "pub const DEFAULT_PORT: u16 = 8080;");
        assert_eq!(package.constants[0].doc, "The default port.");

        assert_eq!(package.variables.len(), 1);
        assert_eq!(package.variables[0].name, "CONNECTIONS");

        let functions: Vec<_> = package.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(functions, vec!["connect", "parse_port"]);
        assert_eq!(
            package.functions[0].decl,
            "pub async fn connect(address: &str) -> Result<Connection>"
        );
        assert_eq!(package.functions[0].doc, "Connects to the given address.");
        assert_eq!(
            package.functions[1].decl,
            "pub fn parse_port(value: &str)\n    -> Option<Port>"
        );

        let types: Vec<_> = package.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(types, vec!["Connection", "Port", "Protocol"]);

        let connection = &package.types[0];
        assert_eq!(connection.doc, "Represents an open connection.");
        assert_eq!(
            connection.decl,
            "pub struct Connection {\n    peer: String,\n}"
        );
        assert_eq!(connection.constants.len(), 1);
        assert_eq!(connection.constants[0].name, "MAX_FRAME");
        assert_eq!(connection.constants[0].decl, "pub const MAX_FRAME: usize = 1024;");
        assert_eq!(connection.functions.len(), 1);
        assert_eq!(connection.functions[0].name, "new");
        assert_eq!(connection.methods.len(), 1);
        assert_eq!(connection.methods[0].name, "peer");
        assert_eq!(connection.methods[0].decl, "pub fn peer(&self) -> &str");
        assert_eq!(connection.methods[0].doc, "Returns the peer address.");

        assert_eq!(package.types[1].decl, "pub type Port = u16;");
        assert_eq!(package.types[2].doc, "Supported protocols.");

        assert_eq!(package.sub_packages, vec!["http".to_owned()]);
    }

    #[test]
    fn multi_line_attributes_and_signatures_are_kept_intact() {
        let base = tempfile::tempdir().unwrap();
        write(
            &base.path().join("acme/lib.rs"),
            "/// Documented config.\n#[derive(\n    Debug,\n    Clone,\n)]\npub struct Config;\n\n\
             /// Takes four bytes.\npub fn take(\n    x: [u8; 4],\n) -> u8 {\n    x[0]\n}\n",
        );

        let package = DirectoryInspector::new(base.path())
            .inspect("acme")
            .unwrap()
            .unwrap();

        assert_eq!(package.types[0].name, "Config");
        assert_eq!(package.types[0].doc, "Documented config.");
        assert_eq!(package.types[0].decl, "pub struct Config;");
        assert_eq!(package.functions[0].doc, "Takes four bytes.");
        assert_eq!(
            package.functions[0].decl,
            "pub fn take(\n    x: [u8; 4],\n) -> u8"
        );
    }

    #[test]
    fn impl_blocks_are_attached_to_their_type() {
        let base = tempfile::tempdir().unwrap();
        write(
            &base.path().join("acme/lib.rs"),
            r#"
pub struct Cache<T>(Vec<T>);
pub struct Mapper<F>(F);

impl<T: Clone> Cache<T> {
    pub fn get<'a>(&'a self) -> &'a [T] { &self.0 }
    pub fn into_inner(mut self) -> Vec<T> { std::mem::take(&mut self.0) }
}

impl<F: Fn(u8) -> u8> crate::Mapper<F>
where
    F: Send,
{
    pub fn map<G: Fn(u8) -> u8>(self, g: G) -> u8 { g(1) }
    pub fn from_self_ref(selfish: u8) -> u8 { selfish }
    /// Multi line docs
    /// with a `code` span.
    pub fn with(
        f: F,
    ) -> Self {
        Mapper(f)
    }
}

impl Clone for Cache<u8> {
    fn clone(&self) -> Self { Cache(self.0.clone()) }
}
"#,
        );

        let package = DirectoryInspector::new(base.path())
            .inspect("acme")
            .unwrap()
            .unwrap();

        let cache = &package.types[0];
        assert_eq!(cache.name, "Cache");
        let methods: Vec<_> = cache.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["get", "into_inner"]);
        assert!(cache.functions.is_empty());

        let mapper = &package.types[1];
        assert_eq!(mapper.name, "Mapper");
        assert_eq!(mapper.methods.len(), 1);
        assert_eq!(mapper.methods[0].name, "map");
        let functions: Vec<_> = mapper.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(functions, vec!["from_self_ref", "with"]);
        assert_eq!(mapper.functions[1].decl, "pub fn with(\n        f: F,\n    ) -> Self");
        assert_eq!(
            mapper.functions[1].doc,
            "Multi line docs\nwith a `code` span."
        );
    }

    #[test]
    fn hidden_and_restricted_items_are_skipped() {
        let base = tempfile::tempdir().unwrap();
        write(
            &base.path().join("acme/lib.rs"),
            r#"
#[doc(hidden)]
pub fn internal() {}

pub(crate) fn crate_only() {}

#[doc = "Explicitly documented."]
pub fn r#match() {}

pub mod nested {
    pub fn inner() {}
}
"#,
        );
        write(&base.path().join("acme/broken.rs"), "pub fn broken( {");

        let package = DirectoryInspector::new(base.path())
            .inspect("acme")
            .unwrap()
            .unwrap();

        assert_eq!(package.functions.len(), 1);
        assert_eq!(package.functions[0].name, "match");
        assert_eq!(package.functions[0].doc, "Explicitly documented.");
    }

    #[test]
    fn unknown_or_empty_directories_do_not_resolve() {
        let base = tempfile::tempdir().unwrap();
        write(&base.path().join("acme/docs/readme.md"), "# Hello");
        write(&base.path().join("acme/net/lib.rs"), LIB);

        let inspector = DirectoryInspector::new(base.path());
        assert!(inspector.inspect("acme/missing").unwrap().is_none());
        assert!(inspector.inspect("acme/docs").unwrap().is_none());
        assert!(inspector.inspect("acme/../acme/net").unwrap().is_none());
        assert!(inspector.inspect("").unwrap().is_none());
        assert!(inspector.inspect("acme/net").unwrap().is_some());
    }
}
