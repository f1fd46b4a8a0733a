//! # Message Views
//!
//! Presentation-friendly descriptions of message shapes, and the inverse operation: building a
//! runtime message of a given type from JSON text.
//!
//! A view lists the fields of a message in declaration order. Fields of the same (non-synthetic)
//! `oneof` are folded into a single entry of kind `oneof`, placed where the first alternative
//! was declared. Message fields are expanded recursively, except when the field type already
//! appears on the path from the root: that field gets a back-reference view with no fields.
use prost_reflect::{
    Cardinality, DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, OneofDescriptor,
};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
#[error("Payload does not match message '{message}': {source}")]
pub struct PayloadDecodeError {
    pub message: String,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MessageView {
    pub full_name: String,
    pub fields: Vec<FieldView>,
    /// The message is already being described by an enclosing view.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub back_reference: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FieldView {
    pub name: String,
    /// Scalar type name, `message`, `enum` or `oneof`.
    pub kind: String,
    pub full_name: String,
    pub repeated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Alternatives of a `oneof` group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oneof: Option<Vec<FieldView>>,
}

/// Describes the fields of `desc`.
pub fn build_view(desc: &MessageDescriptor) -> MessageView {
    let mut path = Vec::new();
    message_view(desc, &mut path)
}

/// Parses `text` as the JSON form of a `desc` message.
///
/// Unknown fields, type mismatches, malformed JSON and trailing input are all rejected.
pub fn build_message(
    desc: &MessageDescriptor,
    text: &str,
) -> Result<DynamicMessage, PayloadDecodeError> {
    let decode = || -> Result<DynamicMessage, serde_json::Error> {
        let mut deserializer = serde_json::Deserializer::from_str(text);
        let message = DynamicMessage::deserialize(desc.clone(), &mut deserializer)?;
        deserializer.end()?;
        Ok(message)
    };

    decode().map_err(|source| PayloadDecodeError {
        message: desc.full_name().to_string(),
        source,
    })
}

fn message_view(desc: &MessageDescriptor, path: &mut Vec<String>) -> MessageView {
    path.push(desc.full_name().to_string());

    let mut fields: Vec<FieldView> = Vec::new();
    // oneof full name -> position of its entry in `fields`
    let mut groups: HashMap<String, usize> = HashMap::new();

    for field in desc.fields() {
        let view = field_view(&field, path);

        match field.containing_oneof().filter(|oneof| !oneof.is_synthetic()) {
            Some(oneof) => match groups.get(oneof.full_name()) {
                Some(&index) => {
                    if let Some(alternatives) = fields[index].oneof.as_mut() {
                        alternatives.push(view);
                    }
                }
                None => {
                    groups.insert(oneof.full_name().to_string(), fields.len());
                    fields.push(oneof_view(&oneof, view));
                }
            },
            None => fields.push(view),
        }
    }

    path.pop();

    MessageView {
        full_name: desc.full_name().to_string(),
        fields,
        back_reference: false,
    }
}

fn field_view(field: &FieldDescriptor, path: &mut Vec<String>) -> FieldView {
    let kind = field.kind();

    let message = match &kind {
        Kind::Message(nested) if path.iter().any(|name| name == nested.full_name()) => {
            Some(MessageView {
                full_name: nested.full_name().to_string(),
                fields: Vec::new(),
                back_reference: true,
            })
        }
        Kind::Message(nested) => Some(message_view(nested, path)),
        _ => None,
    };

    let enum_values = match &kind {
        Kind::Enum(desc) => Some(desc.values().map(|v| v.name().to_string()).collect()),
        _ => None,
    };

    FieldView {
        name: field.name().to_string(),
        kind: kind_name(&kind).to_string(),
        full_name: field.full_name().to_string(),
        repeated: field.cardinality() == Cardinality::Repeated,
        message,
        enum_values,
        oneof: None,
    }
}

fn oneof_view(oneof: &OneofDescriptor, first: FieldView) -> FieldView {
    FieldView {
        name: oneof.name().to_string(),
        kind: "oneof".to_string(),
        full_name: oneof.full_name().to_string(),
        repeated: false,
        message: None,
        enum_values: None,
        oneof: Some(vec![first]),
    }
}

/// Protobuf name of a field type; `message` and `enum` for named types.
pub fn kind_name(kind: &Kind) -> &'static str {
    match kind {
        Kind::Double => "double",
        Kind::Float => "float",
        Kind::Int32 => "int32",
        Kind::Int64 => "int64",
        Kind::Uint32 => "uint32",
        Kind::Uint64 => "uint64",
        Kind::Sint32 => "sint32",
        Kind::Sint64 => "sint64",
        Kind::Fixed32 => "fixed32",
        Kind::Fixed64 => "fixed64",
        Kind::Sfixed32 => "sfixed32",
        Kind::Sfixed64 => "sfixed64",
        Kind::Bool => "bool",
        Kind::String => "string",
        Kind::Bytes => "bytes",
        Kind::Message(_) => "message",
        Kind::Enum(_) => "enum",
    }
}
