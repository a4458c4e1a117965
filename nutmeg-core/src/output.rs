//! Tree output in the formats the stage drivers expose.
//!
//! JSON is the stage-boundary format: stages read and write it over
//! stdin/stdout and it round-trips exactly. The remaining formats (XML,
//! YAML, Mermaid, DOT, ASCII tree) are display renderings keyed by a
//! case-insensitive format name.

use std::io::{self, Read, Write};
use std::str::FromStr;

use serde_json::value::Value;

use crate::error::CoreError;
use crate::node::{trim_value, Node, OPTION_NAME, OPTION_VALUE};
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Xml,
    Yaml,
    Mermaid,
    AsciiTree,
    Dot,
}

impl FromStr for Format {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Format, CoreError> {
        match s.to_uppercase().as_str() {
            "JSON" => Ok(Format::Json),
            "XML" => Ok(Format::Xml),
            "YAML" => Ok(Format::Yaml),
            "MERMAID" => Ok(Format::Mermaid),
            "ASCIITREE" => Ok(Format::AsciiTree),
            "DOT" => Ok(Format::Dot),
            other => Err(CoreError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PrintOptions {
    /// Indent width for the nested formats.
    pub indent: usize,
    /// Whether spans appear in the output.
    pub include_spans: bool,
    /// Trim length for `value` options; 0 disables trimming.
    pub trim: usize,
}

impl Default for PrintOptions {
    fn default() -> PrintOptions {
        PrintOptions {
            indent: 2,
            include_spans: true,
            trim: 0,
        }
    }
}

/// Read a tree from the JSON stage-boundary format.
pub fn read_tree_json(input: impl Read) -> Result<Node, CoreError> {
    Ok(serde_json::from_reader(input)?)
}

/// Print a tree in the requested format.
pub fn print_tree(
    node: &Node,
    format: Format,
    options: &PrintOptions,
    output: &mut dyn Write,
) -> io::Result<()> {
    match format {
        Format::Json => print_json(node, options, output),
        Format::Xml => {
            print_xml(node, options, 0, output)?;
            Ok(())
        }
        Format::Yaml => print_yaml(node, options, 0, false, output),
        Format::Mermaid => print_mermaid(node, options, output),
        Format::AsciiTree => print_ascii_tree(node, options, output),
        Format::Dot => print_dot(node, options, output),
    }
}

fn span_included(node: &Node, options: &PrintOptions) -> bool {
    options.include_spans && node.span != Span::default()
}

// ---------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------

fn json_value(node: &Node, options: &PrintOptions) -> Value {
    let mut object = serde_json::Map::new();
    object.insert("name".to_string(), Value::String(node.name.clone()));
    if span_included(node, options) {
        object.insert(
            "span".to_string(),
            serde_json::to_value(node.span).expect("span serializes"),
        );
    }
    if !node.options.is_empty() {
        let mut opts = serde_json::Map::new();
        for (key, value) in &node.options {
            opts.insert(
                key.clone(),
                Value::String(trim_value(key, value, options.trim)),
            );
        }
        object.insert("options".to_string(), Value::Object(opts));
    }
    if !node.children.is_empty() {
        let children = node
            .children
            .iter()
            .map(|child| json_value(child, options))
            .collect();
        object.insert("children".to_string(), Value::Array(children));
    }
    Value::Object(object)
}

fn print_json(node: &Node, options: &PrintOptions, output: &mut dyn Write) -> io::Result<()> {
    let value = json_value(node, options);
    let indent = vec![b' '; options.indent];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
    let mut serializer = serde_json::Serializer::with_formatter(&mut *output, formatter);
    serde::Serialize::serialize(&value, &mut serializer)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    writeln!(output)
}

// ---------------------------------------------------------------------
// XML
// ---------------------------------------------------------------------

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn print_xml(
    node: &Node,
    options: &PrintOptions,
    depth: usize,
    output: &mut dyn Write,
) -> io::Result<()> {
    let pad = " ".repeat(depth * options.indent);
    write!(output, "{pad}<{}", node.name)?;
    for (key, value) in &node.options {
        let trimmed = trim_value(key, value, options.trim);
        write!(output, " {key}=\"{}\"", escape_xml(&trimmed))?;
    }
    if span_included(node, options) {
        write!(output, " span=\"{}\"", node.span.render())?;
    }
    if node.children.is_empty() {
        writeln!(output, "/>")
    } else {
        writeln!(output, ">")?;
        for child in &node.children {
            print_xml(child, options, depth + 1, output)?;
        }
        writeln!(output, "{pad}</{}>", node.name)
    }
}

// ---------------------------------------------------------------------
// YAML
// ---------------------------------------------------------------------

fn escape_yaml(value: &str) -> String {
    // Always quote: option values are arbitrary source fragments.
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped.push('"');
    escaped
}

fn print_yaml(
    node: &Node,
    options: &PrintOptions,
    depth: usize,
    list_item: bool,
    output: &mut dyn Write,
) -> io::Result<()> {
    let pad = " ".repeat(depth * options.indent);
    let lead = if list_item {
        format!("{pad}- ")
    } else {
        pad.clone()
    };
    // Continuation lines of a list item indent past the dash.
    let follow = if list_item {
        format!("{pad}{}", " ".repeat(2))
    } else {
        pad
    };
    writeln!(output, "{lead}name: {}", escape_yaml(&node.name))?;
    if span_included(node, options) {
        let Span {
            start_line,
            start_col,
            end_line,
            end_col,
        } = node.span;
        writeln!(
            output,
            "{follow}span: [{start_line}, {start_col}, {end_line}, {end_col}]"
        )?;
    }
    if !node.options.is_empty() {
        writeln!(output, "{follow}options:")?;
        let value_pad = " ".repeat(options.indent);
        for (key, value) in &node.options {
            let trimmed = trim_value(key, value, options.trim);
            writeln!(output, "{follow}{value_pad}{key}: {}", escape_yaml(&trimmed))?;
        }
    }
    if !node.children.is_empty() {
        writeln!(output, "{follow}children:")?;
        for child in &node.children {
            print_yaml(child, options, depth + 1, true, output)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Mermaid and DOT
// ---------------------------------------------------------------------

/// Label used by the graph renderings: the node name, refined by its most
/// interesting option.
fn graph_label(node: &Node, options: &PrintOptions) -> String {
    if node.options.len() == 1 {
        let (key, value) = node.options.iter().next().expect("one option");
        return format!("{}: {}", node.name, trim_value(key, value, options.trim));
    }
    for key in [OPTION_VALUE, OPTION_NAME] {
        if let Some(value) = node.option(key) {
            return format!("{}: {}", node.name, trim_value(key, value, options.trim));
        }
    }
    node.name.clone()
}

fn print_mermaid(node: &Node, options: &PrintOptions, output: &mut dyn Write) -> io::Result<()> {
    writeln!(output, "graph TD")?;
    let mut counter = 0usize;
    print_mermaid_node(node, None, &mut counter, options, output)
}

fn print_mermaid_node(
    node: &Node,
    parent: Option<usize>,
    counter: &mut usize,
    options: &PrintOptions,
    output: &mut dyn Write,
) -> io::Result<()> {
    let id = *counter;
    *counter += 1;
    let label = graph_label(node, options).replace('"', "#quot;");
    writeln!(output, "    n{id}[\"{label}\"]")?;
    if let Some(parent) = parent {
        writeln!(output, "    n{parent} --> n{id}")?;
    }
    for child in &node.children {
        print_mermaid_node(child, Some(id), counter, options, output)?;
    }
    Ok(())
}

fn dot_fill_color(name: &str) -> &'static str {
    match name {
        "form" => "lightpink",
        "part" => "#FFD8E1",
        "apply" => "lightgreen",
        "id" => "Honeydew",
        "arguments" => "PaleTurquoise",
        "operator" => "#C0FFC0",
        "number" => "lightgoldenrodyellow",
        _ => "lightgray",
    }
}

fn print_dot(node: &Node, options: &PrintOptions, output: &mut dyn Write) -> io::Result<()> {
    writeln!(output, "digraph G {{")?;
    writeln!(output, "  bgcolor=\"transparent\";")?;
    writeln!(
        output,
        "  node [shape=\"box\", style=\"filled\", fontname=\"Ubuntu Mono\"];"
    )?;
    let mut counter = 0usize;
    print_dot_node(node, None, &mut counter, options, output)?;
    writeln!(output, "}}")
}

fn print_dot_node(
    node: &Node,
    parent: Option<usize>,
    counter: &mut usize,
    options: &PrintOptions,
    output: &mut dyn Write,
) -> io::Result<()> {
    let id = *counter;
    *counter += 1;
    let label = graph_label(node, options).replace('"', "\\\"");
    writeln!(
        output,
        "  \"n{id}\" [label=\"{label}\", fillcolor=\"{}\"];",
        dot_fill_color(&node.name)
    )?;
    if let Some(parent) = parent {
        writeln!(output, "  \"n{parent}\" -> \"n{id}\";")?;
    }
    for child in &node.children {
        print_dot_node(child, Some(id), counter, options, output)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------
// ASCII tree
// ---------------------------------------------------------------------

fn ascii_label(node: &Node, options: &PrintOptions) -> String {
    let mut props: Vec<String> = node
        .options
        .iter()
        .map(|(key, value)| format!("{key}: {}", trim_value(key, value, options.trim)))
        .collect();
    if span_included(node, options) {
        props.push(format!("span: {}", node.span.render()));
    }
    if props.is_empty() {
        node.name.clone()
    } else {
        format!("{} [{}]", node.name, props.join(", "))
    }
}

fn print_ascii_tree(node: &Node, options: &PrintOptions, output: &mut dyn Write) -> io::Result<()> {
    writeln!(output, "{}", ascii_label(node, options))?;
    print_ascii_children(node, "", options, output)
}

fn print_ascii_children(
    node: &Node,
    prefix: &str,
    options: &PrintOptions,
    output: &mut dyn Write,
) -> io::Result<()> {
    let count = node.children.len();
    for (index, child) in node.children.iter().enumerate() {
        let last = index + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        writeln!(
            output,
            "{prefix}{connector}{}",
            ascii_label(child, options)
        )?;
        let extension = if last { "    " } else { "│   " };
        let child_prefix = format!("{prefix}{extension}");
        print_ascii_children(child, &child_prefix, options, output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NAME_BIND, NAME_IDENTIFIER, NAME_NUMBER, NAME_UNIT};

    fn sample_tree() -> Node {
        let mut unit = Node::with_span(NAME_UNIT, Span::new(1, 1, 1, 8));
        let mut bind = Node::with_span(NAME_BIND, Span::new(1, 1, 1, 8));
        let mut id = Node::with_span(NAME_IDENTIFIER, Span::new(1, 1, 1, 2));
        id.set_option("name", "x");
        bind.add_child(id);
        bind.add_child(Node::with_options(
            NAME_NUMBER,
            &[("base", "10"), ("mantissa", "1")],
        ));
        unit.add_child(bind);
        unit
    }

    fn render(format: Format, options: &PrintOptions) -> String {
        let mut out = Vec::new();
        print_tree(&sample_tree(), format, options, &mut out).expect("print");
        String::from_utf8(out).expect("utf-8 output")
    }

    #[test]
    fn format_names_are_case_insensitive() {
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("AsciiTree".parse::<Format>().unwrap(), Format::AsciiTree);
        assert!(matches!(
            "svg".parse::<Format>(),
            Err(CoreError::UnknownFormat(_))
        ));
    }

    #[test]
    fn json_output_round_trips() {
        let text = render(Format::Json, &PrintOptions::default());
        let back = read_tree_json(text.as_bytes()).expect("parse back");
        assert_eq!(back, sample_tree());
    }

    #[test]
    fn no_spans_flag_suppresses_spans() {
        let options = PrintOptions {
            include_spans: false,
            ..PrintOptions::default()
        };
        let text = render(Format::Json, &options);
        assert!(!text.contains("span"));
        let xml = render(Format::Xml, &options);
        assert!(!xml.contains("span="));
    }

    #[test]
    fn xml_nests_children_and_escapes_values() {
        let mut node = Node::new("string");
        node.set_option("value", "a<b&\"c\"");
        let mut out = Vec::new();
        print_tree(&node, Format::Xml, &PrintOptions::default(), &mut out).expect("print");
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("value=\"a&lt;b&amp;&quot;c&quot;\""));

        let tree = render(Format::Xml, &PrintOptions::default());
        assert!(tree.contains("<unit"));
        assert!(tree.contains("</unit>"));
        assert!(tree.contains("<id name=\"x\""));
    }

    #[test]
    fn ascii_tree_uses_box_drawing() {
        let text = render(Format::AsciiTree, &PrintOptions::default());
        assert!(text.starts_with("unit"));
        assert!(text.contains("└── "));
        assert!(text.contains("├── "));
    }

    #[test]
    fn dot_and_mermaid_emit_edges() {
        let dot = render(Format::Dot, &PrintOptions::default());
        assert!(dot.contains("digraph G {"));
        assert!(dot.contains("\"n0\" -> \"n1\";"));

        let mermaid = render(Format::Mermaid, &PrintOptions::default());
        assert!(mermaid.starts_with("graph TD"));
        assert!(mermaid.contains("n0 --> n1"));
    }

    #[test]
    fn trim_shortens_value_options_in_output() {
        let mut node = Node::new("string");
        node.set_option("value", "abcdefghijkl");
        let mut out = Vec::new();
        let options = PrintOptions {
            trim: 6,
            ..PrintOptions::default()
        };
        print_tree(&node, Format::Json, &options, &mut out).expect("print");
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("abcde\u{2026}"));
    }
}
