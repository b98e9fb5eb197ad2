//! Minimal XML element tree built from `quick-xml` events.
//!
//! The catalog only needs tag lookups and direct text content, so attributes,
//! namespaces and processing instructions are dropped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::CatalogError;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: String,
    children: Vec<Node>,
}

impl Element {
    fn new(start: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).to_string(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn child_elements(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.child_elements().rev().collect(),
        }
    }

    /// Descendants with the given tag name, in document order.
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.descendants().filter(move |el| el.name == name)
    }

    pub fn find(&self, name: &str) -> Option<&Element> {
        self.descendants().find(|el| el.name == name)
    }

    /// Direct text children, each trimmed, joined with a single space.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.trim()),
                Node::Element(_) => None,
            })
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Text of the first descendant named `name`, if there is one.
    pub fn find_text(&self, name: &str) -> Option<String> {
        self.find(name).map(Element::text)
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let el = self.stack.pop()?;
        self.stack.extend(el.child_elements().rev());
        Some(el)
    }
}

/// A parsed catalog response.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Self, CatalogError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(Element::new(&e)),
                Ok(Event::Empty(e)) => attach(&mut stack, &mut root, Element::new(&e))?,
                Ok(Event::End(_)) => {
                    let el = stack.pop().ok_or_else(|| {
                        CatalogError::MalformedXml("unexpected closing tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, el)?;
                }
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(|err| {
                        CatalogError::MalformedXml(format!(
                            "at position {}: {err}",
                            reader.buffer_position()
                        ))
                    })?;
                    push_text(&mut stack, &text)?;
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                    push_text(&mut stack, &text)?;
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(CatalogError::MalformedXml(format!(
                        "at position {}: {e}",
                        reader.buffer_position()
                    )));
                }
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(CatalogError::MalformedXml(format!(
                "unclosed element <{}>",
                open.name
            )));
        }

        root.map(|root| Self { root })
            .ok_or_else(|| CatalogError::MalformedXml("no root element".to_string()))
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Every element named `name`, root included, in document order.
    pub fn elements<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        std::iter::once(&self.root)
            .chain(self.root.descendants())
            .filter(move |el| el.name == name)
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), CatalogError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(el));
        Ok(())
    } else if root.is_none() {
        *root = Some(el);
        Ok(())
    } else {
        Err(CatalogError::MalformedXml(format!(
            "second root element <{}>",
            el.name
        )))
    }
}

fn push_text(stack: &mut [Element], text: &str) -> Result<(), CatalogError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Text(text.to_string()));
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(CatalogError::MalformedXml(
            "text outside of the root element".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_and_text() {
        let doc = Document::parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <ODEResults>
              <Products>
                <Product>
                  <pdsid>CN0266147010M_IF_4</pdsid>
                  <Product_files>
                    <Product_file><Type>Label</Type><URL>http://x/a.lbl</URL></Product_file>
                    <Product_file><Type>Product</Type><URL>http://x/a.img?a=1&amp;b=2</URL></Product_file>
                  </Product_files>
                </Product>
              </Products>
            </ODEResults>"#,
        )
        .unwrap();

        assert_eq!(doc.root().name(), "ODEResults");
        let products: Vec<_> = doc.elements("Product").collect();
        assert_eq!(products.len(), 1);
        assert_eq!(
            products[0].find_text("pdsid").as_deref(),
            Some("CN0266147010M_IF_4")
        );
        // first match in document order
        assert_eq!(products[0].find_text("Type").as_deref(), Some("Label"));
        let urls: Vec<_> = products[0].find_all("URL").map(Element::text).collect();
        assert_eq!(urls, vec!["http://x/a.lbl", "http://x/a.img?a=1&b=2"]);
        assert_eq!(products[0].find_text("Missing"), None);
    }

    #[test]
    fn test_text_joins_direct_text_nodes() {
        let doc = Document::parse("<Error>bad <b>inner</b> request</Error>").unwrap();
        assert_eq!(doc.root().text(), "bad request");
        assert_eq!(doc.elements("Error").count(), 1);
    }

    #[test]
    fn test_cdata_and_empty_elements() {
        let doc = Document::parse("<r><a><![CDATA[x < y]]></a><b/></r>").unwrap();
        assert_eq!(doc.root().find_text("a").as_deref(), Some("x < y"));
        assert_eq!(doc.root().find_text("b").as_deref(), Some(""));
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        let inputs = [
            "",
            "not xml at all",
            "<a><b></a>",
            "<a>",
            "<a></a><b></b>",
            "</a>",
        ];
        for input in inputs {
            assert!(
                matches!(Document::parse(input), Err(CatalogError::MalformedXml(_))),
                "accepted {input:?}"
            );
        }
    }
}
