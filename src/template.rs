use std::collections::BTreeMap;
use std::path::Path;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};

use crate::error::{Error, Result};

/// Substitution variables handed to a template, keyed by field name.
pub type TemplateData = BTreeMap<String, String>;

/// Load `path` from disk and render it against `data`.
///
/// The file is read and parsed on every call. Values are HTML-escaped before
/// substitution, and any field the template references but `data` lacks is
/// an error rather than an empty string.
pub fn render(path: &Path, data: &TemplateData) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::TemplateLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let source = normalize_field_refs(&raw);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("template.html");

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    // minijinja's html escaper also rewrites '/', which mangles urls
    env.set_auto_escape_callback(|_| AutoEscape::None);

    let template = env
        .template_from_named_str(name, &source)
        .map_err(|e| Error::TemplateLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let escaped: TemplateData = data
        .iter()
        .map(|(k, v)| (k.clone(), escape_html(v)))
        .collect();

    let body = template.render(&escaped).map_err(|source| Error::TemplateRender {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::trace!("Rendered {} ({} bytes)", path.display(), body.len());
    Ok(body)
}

/// Rewrite dotted field references (`{{.name}}`) into plain ones (`{{ name}}`).
fn normalize_field_refs(source: &str) -> String {
    source.replace("{{ .", "{{ ").replace("{{.", "{{ ")
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
