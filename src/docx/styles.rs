use std::collections::HashMap;

use super::{WML_NS, wml, wml_attr};

/// Paragraph style id -> display name, from `word/styles.xml`.
#[derive(Debug, Default)]
pub(super) struct StyleNames {
    names: HashMap<String, String>,
    default_paragraph: Option<String>,
}

impl StyleNames {
    /// Display name for a paragraph's `w:pStyle` value. Paragraphs without one
    /// take the document's default paragraph style.
    pub(super) fn display_name(&self, style_id: Option<&str>) -> String {
        match style_id {
            Some(id) => self
                .names
                .get(id)
                .cloned()
                .unwrap_or_else(|| display_from_id(id)),
            None => self
                .default_paragraph
                .clone()
                .unwrap_or_else(|| "Normal".to_string()),
        }
    }
}

/// Word stores built-in names in lower case ("heading 1"); surface them the
/// way the UI shows them ("Heading 1").
fn ui_name(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fallback for ids with no styles.xml entry: "Heading2" -> "Heading 2".
fn display_from_id(id: &str) -> String {
    let split = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);
    match split {
        Some(i) if i > 0 => format!("{} {}", &id[..i], &id[i..]),
        _ => id.to_string(),
    }
}

pub(super) fn parse_style_names(xml_content: Option<&str>) -> StyleNames {
    let mut styles = StyleNames::default();
    let Some(xml_content) = xml_content else {
        return styles;
    };
    let Ok(xml) = roxmltree::Document::parse(xml_content) else {
        log::warn!("styles.xml is not well-formed; using style ids as names");
        return styles;
    };

    for node in xml.root_element().children() {
        if node.tag_name().name() != "style" || node.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        if node.attribute((WML_NS, "type")) != Some("paragraph") {
            continue;
        }
        let Some(id) = node.attribute((WML_NS, "styleId")) else {
            continue;
        };
        let name = wml_attr(node, "name")
            .map(ui_name)
            .unwrap_or_else(|| display_from_id(id));
        let is_default = node
            .attribute((WML_NS, "default"))
            .is_some_and(|v| v == "1" || v == "true");
        if is_default {
            styles.default_paragraph = Some(name.clone());
        }
        styles.names.insert(id.to_string(), name);
    }
    styles
}

/// `w:pStyle` of a paragraph node, if any.
pub(super) fn paragraph_style_id<'a>(para: roxmltree::Node<'a, 'a>) -> Option<&'a str> {
    wml(para, "pPr").and_then(|ppr| wml_attr(ppr, "pStyle"))
}
