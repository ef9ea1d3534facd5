//! Typed parsing of the helpdesk's XML documents.
//!
//! Documents are first read into a small element tree, then mapped onto the model with
//! explicit required fields. A required element or attribute that is absent fails with
//! [`HelpdeskError::MalformedRecord`] at the point it is looked up; nothing is defaulted.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use canoe_core::{Department, DepartmentId, Post, Ticket, TicketId};

use crate::HelpdeskError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// First element named `name` in document order, this element included.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Every element named `name` in document order, this element included.
    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        if self.name == name {
            out.push(self);
        }
        for c in &self.children {
            c.find_all(name, out);
        }
    }
}

pub fn parse_document(xml: &str) -> Result<Element, HelpdeskError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = vec![];
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(open_element(&e)?),
            Ok(Event::Empty(e)) => {
                let el = open_element(&e)?;
                close_element(&mut stack, &mut root, el)?;
            }
            Ok(Event::End(_)) => {
                let el = stack.pop().ok_or_else(|| HelpdeskError::Xml("unbalanced end tag".to_string()))?;
                close_element(&mut stack, &mut root, el)?;
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| HelpdeskError::Xml(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(HelpdeskError::Xml(format!(
                    "at position {}: {e}",
                    reader.error_position()
                )))
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(HelpdeskError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| HelpdeskError::Xml("document has no root element".to_string()))
}

fn open_element(e: &BytesStart<'_>) -> Result<Element, HelpdeskError> {
    let mut el = Element {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        ..Element::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|e| HelpdeskError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| HelpdeskError::Xml(e.to_string()))?;
        el.attributes.push((key, value.into_owned()));
    }
    Ok(el)
}

fn close_element(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<(), HelpdeskError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None if root.is_none() => *root = Some(el),
        None => return Err(HelpdeskError::Xml("multiple root elements".to_string())),
    }
    Ok(())
}

fn required_text(el: &Element, entity: &'static str, field: &'static str) -> Result<String, HelpdeskError> {
    el.child(field)
        .map(|c| c.text.clone())
        .ok_or_else(|| HelpdeskError::missing(entity, field))
}

fn required_int(el: &Element, entity: &'static str, field: &'static str) -> Result<i64, HelpdeskError> {
    let raw = required_text(el, entity, field)?;
    raw.trim().parse().map_err(|_| HelpdeskError::MalformedRecord {
        entity,
        field,
        detail: format!("is not an integer: {raw:?}"),
    })
}

/// `/Base/Department` listing.
pub fn parse_departments(xml: &str) -> Result<Vec<Department>, HelpdeskError> {
    let doc = parse_document(xml)?;
    let mut found = vec![];
    doc.find_all("department", &mut found);

    found
        .into_iter()
        .map(|el| {
            let id = required_text(el, "department", "id")?;
            let title = required_text(el, "department", "title")?;
            // top-level departments carry no parent, an empty one, or "0"
            let parent_id = el
                .child("parentdepartmentid")
                .map(|p| p.text.trim())
                .filter(|p| !p.is_empty() && *p != "0")
                .map(DepartmentId::from_str);
            Ok(Department { id: DepartmentId::from_str(id.trim()), title, parent_id })
        })
        .collect()
}

/// `/Tickets/Ticket/ListAll/...` listing; only the `id` attribute of each ticket is read.
pub fn parse_ticket_ids(xml: &str) -> Result<Vec<TicketId>, HelpdeskError> {
    let doc = parse_document(xml)?;
    let mut found = vec![];
    doc.find_all("ticket", &mut found);

    found
        .into_iter()
        .map(|el| {
            el.attribute("id")
                .map(|id| TicketId::from_str(id.trim()))
                .ok_or_else(|| HelpdeskError::missing("ticket", "id"))
        })
        .collect()
}

/// `/Tickets/Ticket/{id}` document. The returned ticket carries `ticket_id`, the id it was
/// requested under.
pub fn parse_ticket(ticket_id: &TicketId, xml: &str) -> Result<Ticket, HelpdeskError> {
    let doc = parse_document(xml)?;
    let el = doc.find("ticket").ok_or_else(|| HelpdeskError::missing("tickets", "ticket"))?;

    let posts = match el.child("posts") {
        Some(posts) => posts.children_named("post").map(parse_post).collect::<Result<Vec<_>, _>>()?,
        None => vec![],
    };

    Ok(Ticket {
        id: ticket_id.clone(),
        display_id: required_text(el, "ticket", "displayid")?,
        organization: required_text(el, "ticket", "userorganization")?,
        subject: required_text(el, "ticket", "subject")?,
        posts,
    })
}

fn parse_post(el: &Element) -> Result<Post, HelpdeskError> {
    Ok(Post {
        dateline: required_int(el, "post", "dateline")?,
        full_name: required_text(el, "post", "fullname")?,
        email: required_text(el, "post", "email")?,
        contents: required_text(el, "post", "contents")?,
    })
}
