//! Forward-only construction of [`Element`] trees from a quick-xml event
//! stream.
//!
//! [`TreeReader`] is shared by the whole-document parse ([`Document`]) and
//! the streaming building iterator. In streaming mode only building
//! subtrees and `gml:id`-bearing elements are kept; everything else is
//! dropped as soon as it closes. Ancestors of a building never hold
//! children, so memory follows the open depth of the document plus the
//! building currently being read.

use std::io::BufRead;
use std::rc::Rc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::NsReader;
use tracing::debug;

use crate::building::Building;
use crate::error::{Error, Result};
use crate::index::CrossReferenceIndex;
use crate::xml::{Attribute, Element, ElementKind, Namespace, QName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Retention {
    /// Keep every element; buildings stay attached to their parents.
    Full,
    /// Keep buildings and identified elements only; buildings are detached
    /// once handed out.
    Streaming,
}

struct Frame {
    element: Element,
    retained: bool,
    in_building: bool,
    is_building: bool,
    /// Streaming ancestor of a building; closed children are not attached.
    container: bool,
}

struct TreeBuilder {
    retention: Retention,
    stack: Vec<Frame>,
    root: Option<Rc<Element>>,
    index: CrossReferenceIndex,
    saw_root: bool,
}

impl TreeBuilder {
    fn new(retention: Retention) -> Self {
        Self {
            retention,
            stack: Vec::new(),
            root: None,
            index: CrossReferenceIndex::new(),
            saw_root: false,
        }
    }

    fn open(&mut self, element: Element) {
        let (parent_keeps_children, parent_in_building) = self
            .stack
            .last()
            .map(|f| (f.retained && !f.container, f.in_building))
            .unwrap_or((false, false));
        let is_building = !parent_in_building && element.kind() == ElementKind::Building;
        let in_building = parent_in_building || is_building;
        let retained = self.retention == Retention::Full
            || in_building
            || parent_keeps_children
            || element.id().is_some();

        if is_building && self.retention == Retention::Streaming {
            // 建物の祖先は以後子要素を持たない（外側ほど先に印が付く）
            for frame in self.stack.iter_mut().rev() {
                if frame.container {
                    break;
                }
                frame.container = true;
                frame.element.children.clear();
            }
        }

        self.saw_root = true;
        self.stack.push(Frame {
            element,
            retained,
            in_building,
            is_building,
            container: false,
        });
    }

    fn text(&mut self, text: &str) {
        if let Some(frame) = self.stack.last_mut() {
            if frame.retained {
                frame.element.text.push_str(text);
            }
        }
    }

    /// Closes the innermost open element. Returns it when it is a
    /// top-level building.
    fn close(&mut self) -> Option<Rc<Element>> {
        let frame = self.stack.pop()?;
        let element = Rc::new(frame.element);

        if frame.is_building && self.retention == Retention::Streaming {
            // 建物本体は呼び出し側へ渡し、索引には子要素を持たない写しだけ残す
            if let Some(id) = element.id() {
                self.index.register(id, Rc::new(element.stub()));
            }
            return Some(element);
        }

        if let Some(id) = element.id() {
            self.index.register(id, Rc::clone(&element));
        }
        match self.stack.last_mut() {
            Some(parent) if parent.retained && !parent.container => {
                parent.element.children.push(Rc::clone(&element))
            }
            Some(_) => {}
            None => self.root = Some(Rc::clone(&element)),
        }
        frame.is_building.then_some(element)
    }

    fn finish(&self) -> Result<()> {
        if !self.saw_root {
            return Err(Error::UnexpectedEof(
                "document has no root element".to_string(),
            ));
        }
        if let Some(frame) = self.stack.last() {
            return Err(Error::UnexpectedEof(format!(
                "{} unclosed element(s), innermost <{}>",
                self.stack.len(),
                frame.element.name
            )));
        }
        Ok(())
    }
}

/// Pulls events from a document and hands out top-level buildings as they
/// close.
pub(crate) struct TreeReader<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    builder: TreeBuilder,
    element_budget: Option<usize>,
    elements_read: usize,
    finished: bool,
}

impl<R: BufRead> TreeReader<R> {
    pub(crate) fn new(source: R, retention: Retention) -> Self {
        let mut reader = NsReader::from_reader(source);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            builder: TreeBuilder::new(retention),
            element_budget: None,
            elements_read: 0,
            finished: false,
        }
    }

    /// Stop reading after `max_elements` start tags and close whatever is
    /// still open at that point.
    pub(crate) fn with_element_budget(mut self, max_elements: usize) -> Self {
        self.element_budget = Some(max_elements);
        self
    }

    pub(crate) fn index(&self) -> &CrossReferenceIndex {
        &self.builder.index
    }

    /// Advances to the next top-level building, or `None` at the end of
    /// the document. After an error the reader yields nothing more.
    pub(crate) fn next_building(&mut self) -> Result<Option<Rc<Element>>> {
        if self.finished {
            return Ok(None);
        }
        let result = self.advance();
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    fn advance(&mut self) -> Result<Option<Rc<Element>>> {
        loop {
            if self
                .element_budget
                .is_some_and(|budget| self.elements_read >= budget)
            {
                return Ok(self.close_remaining());
            }

            let (resolved, event) = self.reader.read_resolved_event_into(&mut self.buf)?;
            let ns = Namespace::from_resolved(&resolved);

            let closed = match event {
                Event::Start(start) => {
                    let element = read_element(&self.reader, ns, &start)?;
                    self.elements_read += 1;
                    self.builder.open(element);
                    None
                }
                Event::Empty(start) => {
                    let element = read_element(&self.reader, ns, &start)?;
                    self.elements_read += 1;
                    self.builder.open(element);
                    self.builder.close()
                }
                Event::End(_) => self.builder.close(),
                Event::Text(text) => {
                    let text = text.unescape().map_err(quick_xml::Error::from)?;
                    self.builder.text(&text);
                    None
                }
                Event::CData(data) => {
                    self.builder.text(std::str::from_utf8(&data)?);
                    None
                }
                Event::Eof => {
                    debug!("Reached end of document after {} elements", self.elements_read);
                    self.builder.finish()?;
                    return Ok(None);
                }
                _ => None,
            };
            self.buf.clear();

            if closed.is_some() {
                return Ok(closed);
            }
        }
    }

    fn close_remaining(&mut self) -> Option<Rc<Element>> {
        debug!(
            "Element budget of {} reached, closing {} open element(s)",
            self.elements_read,
            self.builder.stack.len()
        );
        while !self.builder.stack.is_empty() {
            if let Some(building) = self.builder.close() {
                return Some(building);
            }
        }
        self.finished = true;
        None
    }

    pub(crate) fn into_parts(self) -> (Option<Rc<Element>>, CrossReferenceIndex) {
        (self.builder.root, self.builder.index)
    }
}

fn read_element<R>(reader: &NsReader<R>, ns: Namespace, start: &BytesStart<'_>) -> Result<Element> {
    let local_name = start.local_name();
    let local = std::str::from_utf8(local_name.as_ref())?;
    let mut element = Element::new(QName::new(ns, local));

    for attr in start.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        let name = QName::new(
            Namespace::from_resolved(&resolved),
            std::str::from_utf8(local.as_ref())?,
        );
        let value = attr
            .unescape_value()
            .map_err(quick_xml::Error::from)?
            .into_owned();
        element.attributes.push(Attribute { name, value });
    }
    Ok(element)
}

/// A fully parsed document together with its complete reference index.
#[derive(Debug, Clone)]
pub struct Document {
    root: Rc<Element>,
    index: CrossReferenceIndex,
}

impl Document {
    pub fn from_reader<R: BufRead>(source: R) -> Result<Self> {
        Self::read(TreeReader::new(source, Retention::Full))
    }

    pub fn parse_str(xml: &str) -> Result<Self> {
        Self::from_reader(xml.as_bytes())
    }

    /// Parses only the first `max_elements` elements of a document, closing
    /// anything still open at that point. Enough for the CRS scan on very
    /// large files.
    pub fn from_reader_prefix<R: BufRead>(source: R, max_elements: usize) -> Result<Self> {
        Self::read(TreeReader::new(source, Retention::Full).with_element_budget(max_elements))
    }

    fn read<R: BufRead>(mut reader: TreeReader<R>) -> Result<Self> {
        while reader.next_building()?.is_some() {}
        let (root, index) = reader.into_parts();
        let root = root.ok_or_else(|| {
            Error::UnexpectedEof("document has no root element".to_string())
        })?;
        debug!("Parsed document <{}> with {} indexed ids", root.name, index.len());
        Ok(Self { root, index })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn index(&self) -> &CrossReferenceIndex {
        &self.index
    }

    /// Top-level buildings in document order, identified by `gml:id`.
    pub fn buildings(&self) -> Vec<Building> {
        self.buildings_with(&QName::gml_id())
    }

    pub fn buildings_with(&self, filter_attribute: &QName) -> Vec<Building> {
        let mut buildings = Vec::new();
        let mut stack: Vec<&Rc<Element>> = vec![&self.root];
        while let Some(element) = stack.pop() {
            if element.kind() == ElementKind::Building {
                let ordinal = buildings.len() + 1;
                buildings.push(Building::new(Rc::clone(element), filter_attribute, ordinal));
                continue;
            }
            stack.extend(element.children.iter().rev());
        }
        buildings
    }
}
