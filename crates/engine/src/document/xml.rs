//! XML codec for assistant documents.
//!
//! Parsing produces the generic node shape the rest of the engine works on:
//!
//! - attributes are stored under `@name` keys with their string value,
//! - element text that shares an element with attributes or children lives under `#text`,
//! - leaf text is coerced to numbers and booleans where it parses as one,
//! - repeated sibling elements collapse into an array, and `skill`, `step`, and
//!   `workflow` are always arrays so single-item collections look like multi-item ones.
//!
//! Writing is the inverse and is used to serialize entities into system prompts.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map as JsonMap, Number, Value};

use crate::error::{EngineError, Result};

/// Element names that always parse into arrays.
pub const ALWAYS_SEQUENCE: &[&str] = &["skill", "step", "workflow"];

pub const ATTRIBUTE_PREFIX: char = '@';
pub const TEXT_KEY: &str = "#text";

struct Frame {
    name: String,
    attributes: JsonMap<String, Value>,
    children: JsonMap<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>, location: &str) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = JsonMap::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|error| EngineError::malformed(location, format!("invalid attribute on <{name}>: {error}")))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|error| EngineError::malformed(location, format!("invalid attribute value on <{name}>: {error}")))?;
            attributes.insert(format!("{ATTRIBUTE_PREFIX}{key}"), Value::String(value.into_owned()));
        }
        Ok(Self {
            name,
            attributes,
            children: JsonMap::new(),
            text: String::new(),
        })
    }

    fn into_value(self) -> Value {
        if self.attributes.is_empty() && self.children.is_empty() {
            return coerce_scalar(&self.text);
        }
        let mut node = self.attributes;
        node.extend(self.children);
        if !self.text.is_empty() {
            node.insert(TEXT_KEY.to_string(), coerce_scalar(&self.text));
        }
        Value::Object(node)
    }
}

fn attach(children: &mut JsonMap<String, Value>, name: String, value: Value) {
    let always_sequence = ALWAYS_SEQUENCE.contains(&name.as_str());
    match children.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
        None if always_sequence => {
            children.insert(name, Value::Array(vec![value]));
        }
        None => {
            children.insert(name, value);
        }
    }
}

/// Parses an XML document into a node keyed by its root element name.
pub fn parse_xml(content: &str, location: &str) -> Result<Value> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root = JsonMap::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(error) => {
                return Err(EngineError::malformed(
                    location,
                    format!("invalid XML at byte {}: {error}", reader.buffer_position()),
                ));
            }
        };
        match event {
            Event::Start(start) => stack.push(Frame::open(&start, location)?),
            Event::Empty(start) => {
                let frame = Frame::open(&start, location)?;
                let name = frame.name.clone();
                let value = frame.into_value();
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.children, name, value),
                    None => attach(&mut root, name, value),
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|error| EngineError::malformed(location, format!("invalid text content: {error}")))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    return Err(EngineError::malformed(location, "unbalanced closing tag"));
                };
                let name = frame.name.clone();
                let value = frame.into_value();
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.children, name, value),
                    None => attach(&mut root, name, value),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(frame) = stack.last() {
        return Err(EngineError::malformed(location, format!("element <{}> is never closed", frame.name)));
    }
    if root.is_empty() {
        return Err(EngineError::malformed(location, "document has no root element"));
    }
    Ok(Value::Object(root))
}

/// Converts leaf text into a boolean or number when it is one, otherwise keeps it as a string.
///
/// Decimals are only converted when the number prints back as the same text,
/// so `3.10` stays a string.
pub fn coerce_scalar(text: &str) -> Value {
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if is_integer_literal(text)
        && let Ok(number) = text.parse::<i64>()
    {
        return Value::Number(number.into());
    }
    if is_decimal_literal(text)
        && let Some(number) = text.parse::<f64>().ok().and_then(Number::from_f64)
        && number.to_string() == text
    {
        return Value::Number(number);
    }
    Value::String(text.to_string())
}

fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit()) && (digits == "0" || !digits.starts_with('0'))
}

fn is_decimal_literal(text: &str) -> bool {
    let Some((whole, fraction)) = text.split_once('.') else {
        return false;
    };
    is_integer_literal(whole) && !fraction.is_empty() && fraction.bytes().all(|byte| byte.is_ascii_digit())
}

/// Renders a node as an XML element named `tag`, indented by two spaces.
///
/// `@name` keys become attributes, `#text` becomes element text, arrays become
/// repeated elements, and `null` values are omitted.
pub fn write_xml(tag: &str, node: &Value) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_element(&mut writer, tag, node).map_err(|reason| EngineError::malformed(format!("<{tag}>"), reason))?;
    String::from_utf8(writer.into_inner()).map_err(|error| EngineError::malformed(format!("<{tag}>"), error.to_string()))
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, node: &Value) -> std::result::Result<(), String> {
    match node {
        Value::Null => Ok(()),
        Value::Array(items) => items.iter().try_for_each(|item| write_element(writer, name, item)),
        Value::Object(map) => {
            let mut start = BytesStart::new(name);
            for (key, value) in map {
                if let Some(attribute) = key.strip_prefix(ATTRIBUTE_PREFIX)
                    && let Some(text) = scalar_text(value)
                {
                    start.push_attribute((attribute, text.as_str()));
                }
            }
            let text = map.get(TEXT_KEY).and_then(scalar_text).filter(|text| !text.is_empty());
            let children: Vec<(&String, &Value)> = map
                .iter()
                .filter(|(key, value)| !key.starts_with(ATTRIBUTE_PREFIX) && key.as_str() != TEXT_KEY && !value.is_null())
                .collect();

            if text.is_none() && children.is_empty() {
                return writer.write_event(Event::Empty(start)).map_err(|error| error.to_string());
            }
            writer.write_event(Event::Start(start)).map_err(|error| error.to_string())?;
            if let Some(text) = text {
                write_text(writer, &text)?;
            }
            for (key, value) in children {
                write_element(writer, key, value)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name))).map_err(|error| error.to_string())
        }
        scalar => {
            let text = scalar_text(scalar).unwrap_or_default();
            if text.is_empty() {
                return writer.write_event(Event::Empty(BytesStart::new(name))).map_err(|error| error.to_string());
            }
            writer.write_event(Event::Start(BytesStart::new(name))).map_err(|error| error.to_string())?;
            write_text(writer, &text)?;
            writer.write_event(Event::End(BytesEnd::new(name))).map_err(|error| error.to_string())
        }
    }
}

fn write_text(writer: &mut Writer<Vec<u8>>, text: &str) -> std::result::Result<(), String> {
    let escaped = quick_xml::escape::partial_escape(text);
    writer
        .write_event(Event::Text(BytesText::from_escaped(escaped)))
        .map_err(|error| error.to_string())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_attributes_text_and_sequences() {
        let xml = r#"
<assistant id="movie">
  <name>Movie builder</name>
  <skills>
    <skill id="characters">
      <name>Characters</name>
    </skill>
  </skills>
  <prompt lang="en">Hello</prompt>
</assistant>"#;
        let node = parse_xml(xml, "inline").expect("parse");
        let assistant = &node["assistant"];
        assert_eq!(assistant["@id"], "movie");
        assert_eq!(assistant["name"], "Movie builder");
        assert_eq!(assistant["skills"]["skill"], json!([{"@id": "characters", "name": "Characters"}]));
        assert_eq!(assistant["prompt"], json!({"@lang": "en", "#text": "Hello"}));
    }

    #[test]
    fn repeated_elements_collapse_into_arrays() {
        let node = parse_xml("<tags><tag>a</tag><tag>b</tag><tag>c</tag></tags>", "inline").expect("parse");
        assert_eq!(node["tags"]["tag"], json!(["a", "b", "c"]));
    }

    #[test]
    fn leaf_text_is_coerced() {
        let xml = concat!(
            "<model><name>gpt-4o</name><temperature>0.5</temperature>",
            "<max_tokens>256</max_tokens><stream>false</stream><code>007</code></model>",
        );
        let node = parse_xml(xml, "inline").expect("parse");
        assert_eq!(
            node["model"],
            json!({"name": "gpt-4o", "temperature": 0.5, "max_tokens": 256, "stream": false, "code": "007"})
        );
    }

    #[test]
    fn decimals_that_do_not_print_back_stay_text() {
        let node = parse_xml("<output><prompt>3.10</prompt><description>1.10</description><weight>2.5</weight></output>", "inline")
            .expect("parse");
        assert_eq!(node["output"]["prompt"], json!("3.10"));
        assert_eq!(node["output"]["description"], json!("1.10"));
        assert_eq!(node["output"]["weight"], json!(2.5));
    }

    #[test]
    fn empty_elements_and_cdata() {
        let node = parse_xml(r#"<step ref="steps/a.xml"/>"#, "inline").expect("parse");
        assert_eq!(node, json!({"step": [{"@ref": "steps/a.xml"}]}));

        let node = parse_xml("<schema><![CDATA[{\"type\": \"object\"}]]></schema>", "inline").expect("parse");
        assert_eq!(node["schema"], "{\"type\": \"object\"}");
    }

    #[test]
    fn rejects_unclosed_elements() {
        let error = parse_xml("<assistant><name>x</name>", "broken.xml").expect_err("unclosed");
        assert!(matches!(error, EngineError::MalformedDocument { .. }));
    }

    #[test]
    fn writes_attributes_text_and_children() {
        let node = json!({
            "@id": "wf",
            "name": "Character building",
            "steps": {"step": [{"@id": "a", "prompt": "Say ${name}"}, {"@id": "b", "prompt": "x < y"}]},
            "model": null
        });
        let xml = write_xml("workflow", &node).expect("write");
        assert!(xml.starts_with("<workflow id=\"wf\">"));
        assert!(xml.contains("<name>Character building</name>"));
        assert!(xml.contains("<prompt>Say ${name}</prompt>"));
        assert!(xml.contains("<prompt>x &lt; y</prompt>"));
        assert!(!xml.contains("<model"));
        assert_eq!(xml.matches("<step ").count(), 2);
    }

    #[test]
    fn parse_and_write_keep_document_order() {
        let node = parse_xml(
            "<step><prompt>Go</prompt><output><schema>{}</schema><name>x</name></output><description>d</description></step>",
            "inline",
        )
        .expect("parse");
        let xml = write_xml("step", &node["step"][0]).expect("write");
        let position = |needle: &str| xml.find(needle).expect(needle);
        assert!(position("<prompt>") < position("<output>"));
        assert!(position("<output>") < position("<description>"));
        assert!(position("<schema>") < position("<name>"));
    }
}
