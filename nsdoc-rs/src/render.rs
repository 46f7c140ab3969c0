//! Turns the structured documentation of a namespace into bytes.
//!
//! The cache only depends on the [Renderer](Renderer) trait, which is also implemented for plain
//! closures so that custom output formats can be plugged in easily. By default a
//! [TemplateRenderer](TemplateRenderer) is used which applies a **Tera** template to the
//! [Package](crate::package::Package).
//!
//! # Templates
//!
//! The template sees all fields of the package (`name`, `import_path`, `synopsis`, `doc`,
//! `constants`, `variables`, `functions`, `types` and `sub_packages`) along with the configured
//! `stylesheet_url`. Doc comments should be passed through the `doc_html` filter, which renders
//! their Markdown into HTML:
//!
//! ```text
//! <h1>{{ name }}</h1>
//! {{ doc | doc_html | safe }}
//! ```
//!
//! The template is compiled once, when the renderer is created, so that syntax errors are
//! reported at startup rather than for each request.
use std::collections::HashMap;

use anyhow::Context as _;
use pulldown_cmark::{html, Event, Options, Parser};
use tera::{Context, Tera, Value};

use crate::package::Package;

/// Converts the documentation of a namespace into its final representation.
pub trait Renderer: Send + Sync {
    /// Renders the given package.
    fn render(&self, package: &Package) -> anyhow::Result<Vec<u8>>;
}

impl<F> Renderer for F
where
    F: Fn(&Package) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    fn render(&self, package: &Package) -> anyhow::Result<Vec<u8>> {
        self(package)
    }
}

/// The name under which the template is registered. The suffix enables auto escaping.
const TEMPLATE_NAME: &str = "package.html";

/// The default stylesheet reference (none).
pub const DEFAULT_STYLESHEET: &str = "";

/// The default template which renders a simple HTML5 document.
pub const DEFAULT_TEMPLATE: &str = r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{ name }}</title>
<meta name="description" content="{{ synopsis }}">
<meta name="viewport" content="width=device-width, initial-scale=1">
{% if stylesheet_url %}<link rel="stylesheet" href="{{ stylesheet_url }}">
{% endif -%}
</head>
<body>
<h1>{{ name }}</h1>
<p>{{ import_path }}</p>
{{ doc | doc_html | safe }}

<h2 id="index">Index</h2>
<ul>
{%- if constants | length > 0 -%}
<li><a href="#constants">Constants</a></li>
{%- endif -%}
{%- if variables | length > 0 -%}
<li><a href="#variables">Variables</a></li>
{%- endif -%}
{%- for f in functions -%}
<li><a href="#{{ f.name }}">{{ f.decl }}</a></li>
{%- endfor -%}
{%- for t in types -%}
<li><a href="#{{ t.name }}">type {{ t.name }}</a></li>
{%- if t.functions | length > 0 or t.methods | length > 0 -%}
<ul>
{%- for f in t.functions -%}
<li><a href="#{{ t.name }}.{{ f.name }}">{{ f.decl }}</a></li>
{%- endfor -%}
{%- for m in t.methods -%}
<li><a href="#{{ t.name }}.{{ m.name }}">{{ m.decl }}</a></li>
{%- endfor -%}
</ul>
{%- endif -%}
{%- endfor -%}
</ul>

{%- if constants | length > 0 -%}
<h2 id="constants">Constants</h2>
{%- for c in constants -%}
<pre>{{ c.decl }}</pre>
{{ c.doc | doc_html | safe }}
{%- endfor -%}
{%- endif -%}

{%- if variables | length > 0 -%}
<h2 id="variables">Variables</h2>
{%- for v in variables -%}
<pre>{{ v.decl }}</pre>
{{ v.doc | doc_html | safe }}
{%- endfor -%}
{%- endif -%}

{%- for f in functions -%}
<h2 id="{{ f.name }}">{{ f.decl }}</h2>
{{ f.doc | doc_html | safe }}
{%- endfor -%}

{%- for t in types -%}
<h2 id="{{ t.name }}">type {{ t.name }}</h2>
<pre>{{ t.decl }}</pre>
{{ t.doc | doc_html | safe }}
{%- for c in t.constants -%}
<pre>{{ c.decl }}</pre>
{{ c.doc | doc_html | safe }}
{%- endfor -%}
{%- for v in t.variables -%}
<pre>{{ v.decl }}</pre>
{{ v.doc | doc_html | safe }}
{%- endfor -%}
{%- for f in t.functions -%}
<h3 id="{{ t.name }}.{{ f.name }}">{{ f.decl }}</h3>
{{ f.doc | doc_html | safe }}
{%- endfor -%}
{%- for m in t.methods -%}
<h3 id="{{ t.name }}.{{ m.name }}">{{ m.decl }}</h3>
{{ m.doc | doc_html | safe }}
{%- endfor -%}
{%- endfor -%}

{%- if sub_packages | length > 0 -%}
<h2 id="subpackages">Subpackages</h2>
<ul>
{%- for p in sub_packages -%}
<li><a href="{{ p }}/">{{ p }}</a></li>
{%- endfor -%}
</ul>
{%- endif -%}
</body>
</html>
"##;

/// Renders packages by applying a Tera template.
pub struct TemplateRenderer {
    tera: Tera,
    stylesheet_url: String,
}

impl TemplateRenderer {
    /// Compiles the given template.
    ///
    /// Returns an error if the template contains syntax errors.
    pub fn new(template: &str, stylesheet_url: impl Into<String>) -> anyhow::Result<Self> {
        let mut tera = Tera::default();
        tera.register_filter("doc_html", doc_html_filter);
        tera.add_raw_template(TEMPLATE_NAME, template)
            .context("Failed to compile the documentation template")?;

        Ok(TemplateRenderer {
            tera,
            stylesheet_url: stylesheet_url.into(),
        })
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, package: &Package) -> anyhow::Result<Vec<u8>> {
        let mut context = Context::from_serialize(package)?;
        context.insert("stylesheet_url", &self.stylesheet_url);

        let output = self
            .tera
            .render(TEMPLATE_NAME, &context)
            .with_context(|| format!("Failed to render the documentation of {}", package.import_path))?;

        Ok(output.into_bytes())
    }
}

fn doc_html_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    match value.as_str() {
        Some(text) => Ok(Value::String(doc_html(text))),
        None => Err(tera::Error::msg("The doc_html filter expects a string")),
    }
}

/// Converts a doc comment, which is Markdown, into HTML.
///
/// Tables, strikethrough, task lists and footnotes are supported like in rustdoc. Embedded HTML
/// is escaped and shown as text.
///
/// # Examples
///
/// ```
/// # use nsdoc::render::doc_html;
/// assert_eq!(doc_html("Hello\nWorld\n\nBye"), "<p>Hello\nWorld</p>\n<p>Bye</p>\n");
/// assert_eq!(
///     doc_html("Use:\n\n    a < b"),
///     "<p>Use:</p>\n<pre><code>a &lt; b\n</code></pre>\n"
/// );
/// assert_eq!(doc_html(""), "");
/// ```
pub fn doc_html(text: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;
    let events = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(markup) | Event::InlineHtml(markup) => Event::Text(markup),
        event => event,
    });

    let mut result = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut result, events);
    result
}
