//! Component nesting -- groups content lines into BEGIN/END delimited components.

use crate::error::{ReadError, Result};
use crate::lexer::ContentLine;

/// A `BEGIN:NAME` ... `END:NAME` block with its own properties and sub-components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub properties: Vec<ContentLine>,
    pub children: Vec<Component>,
    /// Line of the `BEGIN` marker.
    pub line: usize,
}

impl Component {
    fn new(name: String, line: usize) -> Self {
        Component {
            name,
            line,
            ..Default::default()
        }
    }

    /// First property with the given name.
    pub fn property(&self, name: &str) -> Option<&ContentLine> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// All properties with the given name, in document order.
    pub fn properties_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ContentLine> {
        self.properties.iter().filter(move |p| p.name == name)
    }

    /// Direct children with the given component name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Component> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Build the component forest from a flat list of content lines.
///
/// # Errors
/// Returns `ReadError::MalformedDocument` for properties outside any component,
/// an `END` that does not match the innermost open `BEGIN`, or components
/// still open at end of input.
pub fn nest(lines: Vec<ContentLine>) -> Result<Vec<Component>> {
    let mut roots = Vec::new();
    let mut stack: Vec<Component> = Vec::new();

    for line in lines {
        match line.name.as_str() {
            "BEGIN" => {
                let name = line.value.trim().to_ascii_uppercase();
                if name.is_empty() {
                    return Err(ReadError::malformed(line.line, "BEGIN without component name"));
                }
                stack.push(Component::new(name, line.line));
            }
            "END" => {
                let name = line.value.trim().to_ascii_uppercase();
                let open = stack.pop().ok_or_else(|| {
                    ReadError::malformed(line.line, format!("END:{name} without matching BEGIN"))
                })?;
                if open.name != name {
                    return Err(ReadError::malformed(
                        line.line,
                        format!("END:{name} closes BEGIN:{} from line {}", open.name, open.line),
                    ));
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(open),
                    None => roots.push(open),
                }
            }
            _ => match stack.last_mut() {
                Some(current) => current.properties.push(line),
                None => {
                    return Err(ReadError::malformed(
                        line.line,
                        format!("property {} outside of any component", line.name),
                    ))
                }
            },
        }
    }

    if let Some(open) = stack.pop() {
        return Err(ReadError::malformed(
            open.line,
            format!("BEGIN:{} is never closed", open.name),
        ));
    }

    Ok(roots)
}
