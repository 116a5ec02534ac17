//! Content types and charset detection
//!
//! Effective charset of a file, in order: its explicit charset, the
//! charset detected from its content (byte order mark, then the content
//! type's describer, then the content type default), the nearest
//! container default, and finally the workspace default.

use std::collections::HashMap;

pub const UTF_8: &str = "UTF-8";
pub const UTF_16: &str = "UTF-16";

/// Content sniffers attached to content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Describer {
    /// Reads `encoding="..."` from an XML prolog.
    XmlProlog,
}

#[derive(Debug, Clone)]
pub struct ContentType {
    pub id: String,
    pub extensions: Vec<String>,
    pub file_names: Vec<String>,
    pub default_charset: Option<String>,
    pub describer: Option<Describer>,
}

#[derive(Debug, Clone)]
pub struct ContentTypeRegistry {
    types: Vec<ContentType>,
    by_extension: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl Default for ContentTypeRegistry {
    fn default() -> Self {
        let mut registry = Self {
            types: Vec::new(),
            by_extension: HashMap::new(),
            by_name: HashMap::new(),
        };
        registry.register(ContentType {
            id: "text".to_string(),
            extensions: vec!["txt".to_string()],
            file_names: Vec::new(),
            default_charset: None,
            describer: None,
        });
        registry.register(ContentType {
            id: "xml".to_string(),
            extensions: vec!["xml".to_string()],
            file_names: vec![".classpath".to_string()],
            default_charset: Some(UTF_8.to_string()),
            describer: Some(Describer::XmlProlog),
        });
        registry.register(ContentType {
            id: "properties".to_string(),
            extensions: vec!["properties".to_string()],
            file_names: Vec::new(),
            default_charset: Some("ISO-8859-1".to_string()),
            describer: None,
        });
        registry
    }
}

impl ContentTypeRegistry {
    /// Register a content type. Later registrations win for shared
    /// extensions and names.
    pub fn register(&mut self, content_type: ContentType) {
        let index = self.types.len();
        for ext in &content_type.extensions {
            self.by_extension.insert(ext.to_ascii_lowercase(), index);
        }
        for name in &content_type.file_names {
            self.by_name.insert(name.clone(), index);
        }
        self.types.push(content_type);
    }

    pub fn find_for_name(&self, file_name: &str) -> Option<&ContentType> {
        if let Some(index) = self.by_name.get(file_name) {
            return self.types.get(*index);
        }
        let (_, ext) = file_name.rsplit_once('.')?;
        self.by_extension
            .get(&ext.to_ascii_lowercase())
            .and_then(|i| self.types.get(*i))
    }

    /// Charset implied by a file's content, or `None` to defer to its parent.
    pub fn detect(&self, file_name: &str, content: &[u8]) -> Option<String> {
        if let Some(bom) = detect_bom(content) {
            return Some(bom.to_string());
        }
        let content_type = self.find_for_name(file_name)?;
        if let Some(Describer::XmlProlog) = content_type.describer {
            if let Some(encoding) = sniff_xml_encoding(content) {
                return Some(encoding);
            }
        }
        content_type.default_charset.clone()
    }
}

/// Charset named by a leading byte order mark.
///
/// Both UTF-16 byte orders report plain `UTF-16`.
pub fn detect_bom(content: &[u8]) -> Option<&'static str> {
    if content.starts_with(b"\xEF\xBB\xBF") {
        Some(UTF_8)
    } else if content.starts_with(b"\xFF\xFE") || content.starts_with(b"\xFE\xFF") {
        Some(UTF_16)
    } else {
        None
    }
}

/// Value of the `encoding` pseudo-attribute of an XML declaration.
pub fn sniff_xml_encoding(content: &[u8]) -> Option<String> {
    let head = &content[..content.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    let prolog = text.strip_prefix("<?xml")?;
    let end = prolog.find("?>")?;
    let prolog = &prolog[..end];

    let at = prolog.find("encoding")?;
    let rest = prolog[at + "encoding".len()..].trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let close = value.find(quote)?;
    let encoding = value[..close].trim();
    if encoding.is_empty() {
        None
    } else {
        Some(encoding.to_string())
    }
}
