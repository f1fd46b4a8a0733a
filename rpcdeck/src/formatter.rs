use colored::*;
use rpcdeck_core::Event;
use rpcdeck_core::prost_reflect::{
    EnumDescriptor, Kind, MessageDescriptor, MethodDescriptor, ServiceDescriptor,
};
use rpcdeck_core::schema::{Descriptor, ServiceEntry};
use rpcdeck_core::view::{FieldView, MessageView, kind_name};
use std::fmt::Display;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

pub struct ServiceList(pub Vec<ServiceEntry>);

pub struct GenericError<T: Display>(pub &'static str, pub T);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.0)
    }
}

impl<T: Display> From<GenericError<T>> for FormattedString {
    fn from(GenericError(msg, err): GenericError<T>) -> Self {
        FormattedString(format!("{} {}", format!("{msg}:").red().bold(), err))
    }
}

impl From<Event> for FormattedString {
    fn from(event: Event) -> Self {
        match event {
            Event::ConnectionEstablished { address } => {
                FormattedString(format!("{} {}", "Connected to".green().bold(), address))
            }
            Event::ConnectionStateChanged { state } => {
                FormattedString(format!("{} {}", "connection:".dimmed(), state))
            }
            Event::AvailableMethodsChanged { services } => {
                FormattedString::from(ServiceList(services))
            }
            Event::InputShapeChanged { view } => FormattedString::from(view),
            Event::CallStarted {
                client_streaming,
                server_streaming,
            } => {
                let pattern = match (client_streaming, server_streaming) {
                    (false, false) => "unary",
                    (true, false) => "client streaming",
                    (false, true) => "server streaming",
                    (true, true) => "bidirectional",
                };
                FormattedString(format!("{} ({pattern})", "Call started".cyan().bold()))
            }
            Event::PayloadReceived { text } => FormattedString(text.trim_end().to_string()),
            Event::CallEnded {
                status_code,
                status_name,
                duration,
            } => {
                let status = format!("{status_name} ({status_code})");
                let status = if status_code == 0 {
                    status.green().bold()
                } else {
                    status.red().bold()
                };
                FormattedString(format!("{} {status} in {duration:?}", "Call ended:".cyan()))
            }
        }
    }
}

impl From<ServiceList> for FormattedString {
    fn from(ServiceList(services): ServiceList) -> Self {
        if services.is_empty() {
            return FormattedString("No services found.".yellow().to_string());
        }

        let mut out = String::new();
        out.push_str("Available Services:\n");
        for service in services {
            out.push_str(&format!("  - {}\n", service.full_name.green()));
            for method in service.methods {
                out.push_str(&format!("      {}\n", method.full_name));
            }
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<MessageView> for FormattedString {
    fn from(view: MessageView) -> Self {
        let mut out = format!("{} {{\n", view.full_name.green());
        write_fields(&mut out, &view.fields, 1);
        out.push('}');
        FormattedString(out)
    }
}

fn write_fields(out: &mut String, fields: &[FieldView], depth: usize) {
    let indent = "  ".repeat(depth);

    for field in fields {
        let label = if field.repeated {
            format!("{} ", "repeated".cyan())
        } else {
            String::new()
        };

        if let Some(alternatives) = &field.oneof {
            out.push_str(&format!("{indent}{} {} {{\n", "oneof".cyan(), field.name));
            write_fields(out, alternatives, depth + 1);
            out.push_str(&format!("{indent}}}\n"));
        } else if let Some(nested) = &field.message {
            if nested.back_reference {
                out.push_str(&format!(
                    "{indent}{label}{} {} {}\n",
                    nested.full_name.yellow(),
                    field.name,
                    "(recursive)".dimmed()
                ));
            } else {
                out.push_str(&format!(
                    "{indent}{label}{} {} {{\n",
                    nested.full_name.yellow(),
                    field.name
                ));
                write_fields(out, &nested.fields, depth + 1);
                out.push_str(&format!("{indent}}}\n"));
            }
        } else if let Some(values) = &field.enum_values {
            out.push_str(&format!(
                "{indent}{label}{} {} [{}]\n",
                "enum".yellow(),
                field.name,
                values.join(", ").purple()
            ));
        } else {
            out.push_str(&format!(
                "{indent}{label}{} {}\n",
                field.kind.yellow(),
                field.name
            ));
        }
    }
}

impl From<Descriptor> for FormattedString {
    fn from(descriptor: Descriptor) -> Self {
        match descriptor {
            Descriptor::MessageDescriptor(message) => FormattedString::from(message),
            Descriptor::ServiceDescriptor(service) => FormattedString::from(service),
            Descriptor::EnumDescriptor(enum_desc) => FormattedString::from(enum_desc),
        }
    }
}

impl From<ServiceDescriptor> for FormattedString {
    fn from(service: ServiceDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "service".cyan(),
            service.name().green()
        ));

        for method in service.methods() {
            out.push_str("  ");
            out.push_str(&FormattedString::from(method).0);
            out.push('\n');
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<MethodDescriptor> for FormattedString {
    fn from(method: MethodDescriptor) -> Self {
        let stream = |streaming: bool| {
            if streaming {
                format!("{} ", "stream".cyan())
            } else {
                String::new()
            }
        };

        FormattedString(format!(
            "{} {}({}{}) {} ({}{});",
            "rpc".cyan(),
            method.name().green(),
            stream(method.is_client_streaming()),
            method.input().full_name().yellow(),
            "returns".cyan(),
            stream(method.is_server_streaming()),
            method.output().full_name().yellow()
        ))
    }
}

impl From<MessageDescriptor> for FormattedString {
    fn from(message: MessageDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "message".cyan(),
            message.name().green()
        ));

        for field in message.fields() {
            let label = if field.is_list() {
                format!("{} ", "repeated".cyan())
            } else {
                String::new()
            };

            let type_name = match field.kind() {
                Kind::Message(m) => m.full_name().to_string(),
                Kind::Enum(e) => e.full_name().to_string(),
                scalar => kind_name(&scalar).to_string(),
            };

            if field.is_map() {
                out.push_str(&format!(
                    "  // map entry: {} {} = {};\n",
                    type_name.yellow(),
                    field.name(),
                    field.number()
                ));
            } else {
                out.push_str(&format!(
                    "  {}{} {} = {};\n",
                    label,
                    type_name.yellow(),
                    field.name(),
                    field.number()
                ));
            }
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<EnumDescriptor> for FormattedString {
    fn from(enum_desc: EnumDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "enum".cyan(),
            enum_desc.name().green()
        ));

        for val in enum_desc.values() {
            out.push_str(&format!(
                "  {} = {};\n",
                val.name(),
                val.number().to_string().purple()
            ));
        }
        out.push('}');

        FormattedString(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_view_tree() {
        colored::control::set_override(false);

        let field = |name: &str, kind: &str| FieldView {
            name: name.to_string(),
            kind: kind.to_string(),
            full_name: format!("pkg.Profile.{name}"),
            repeated: false,
            message: None,
            enum_values: None,
            oneof: None,
        };

        let view = MessageView {
            full_name: "pkg.Profile".to_string(),
            fields: vec![
                FieldView {
                    repeated: true,
                    ..field("tags", "string")
                },
                FieldView {
                    oneof: Some(vec![field("email", "string"), field("phone", "string")]),
                    ..field("contact", "oneof")
                },
                FieldView {
                    message: Some(MessageView {
                        full_name: "pkg.Profile".to_string(),
                        fields: Vec::new(),
                        back_reference: true,
                    }),
                    ..field("parent", "message")
                },
            ],
            back_reference: false,
        };

        assert_eq!(
            FormattedString::from(view).0,
            "pkg.Profile {\n  repeated string tags\n  oneof contact {\n    string email\n    string phone\n  }\n  pkg.Profile parent (recursive)\n}"
        );
    }

    #[test]
    fn test_call_ended() {
        colored::control::set_override(false);

        let text = FormattedString::from(Event::CallEnded {
            status_code: 1,
            status_name: "CANCELLED".to_string(),
            duration: Duration::from_millis(5),
        })
        .0;

        assert_eq!(text, "Call ended: CANCELLED (1) in 5ms");
    }
}
