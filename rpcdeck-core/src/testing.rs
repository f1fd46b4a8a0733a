//! Descriptor pools assembled in code for unit tests.
use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MethodDescriptorProto, OneofDescriptorProto,
    ServiceDescriptorProto,
};

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        json_name: Some(name.to_string()),
        ..Default::default()
    }
}

fn typed(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, ty)
    }
}

fn repeated(mut field: FieldDescriptorProto) -> FieldDescriptorProto {
    field.label = Some(Label::Repeated as i32);
    field
}

fn in_oneof(mut field: FieldDescriptorProto, index: i32) -> FieldDescriptorProto {
    field.oneof_index = Some(index);
    field
}

fn message(name: &str, field: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field,
        ..Default::default()
    }
}

fn method(name: &str, input: &str, client_streaming: bool) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(format!(".pkg.{input}")),
        output_type: Some(".pkg.HelloReply".to_string()),
        client_streaming: Some(client_streaming),
        server_streaming: Some(false),
        ..Default::default()
    }
}

/// ```proto
/// package pkg;
///
/// enum Status { STATUS_UNKNOWN = 0; STATUS_ACTIVE = 1; }
///
/// message HelloRequest { string name = 1; }
/// message HelloReply { string message = 1; }
///
/// message Profile {
///   string id = 1;
///   oneof contact { string email = 2; string phone = 3; }
///   Status status = 4;
///   repeated string tags = 5;
///   HelloRequest greeting = 6;
///   optional string nickname = 7;
/// }
///
/// message Node { string value = 1; Node next = 2; repeated Node children = 3; }
/// // Declared a, x, b: the oneof alternatives are not adjacent.
/// message Choice { oneof pick { string a = 1; string b = 3; } string x = 2; }
///
/// message Ping { Pong pong = 1; }
/// message Pong { Ping ping = 1; }
///
/// service Greeter { rpc SayHello(HelloRequest) returns (HelloReply); rpc Collect(stream HelloRequest) returns (HelloReply); }
/// service Admin { rpc Reset(HelloRequest) returns (HelloReply); rpc Audit(HelloRequest) returns (HelloReply); }
/// ```
pub(crate) fn pool() -> DescriptorPool {
    let mut nickname = in_oneof(field("nickname", 7, Type::String), 1);
    nickname.proto3_optional = Some(true);

    let profile = DescriptorProto {
        oneof_decl: vec![
            OneofDescriptorProto {
                name: Some("contact".to_string()),
                ..Default::default()
            },
            OneofDescriptorProto {
                name: Some("_nickname".to_string()),
                ..Default::default()
            },
        ],
        ..message(
            "Profile",
            vec![
                field("id", 1, Type::String),
                in_oneof(field("email", 2, Type::String), 0),
                in_oneof(field("phone", 3, Type::String), 0),
                typed("status", 4, Type::Enum, ".pkg.Status"),
                repeated(field("tags", 5, Type::String)),
                typed("greeting", 6, Type::Message, ".pkg.HelloRequest"),
                nickname,
            ],
        )
    };

    let choice = DescriptorProto {
        oneof_decl: vec![OneofDescriptorProto {
            name: Some("pick".to_string()),
            ..Default::default()
        }],
        ..message(
            "Choice",
            vec![
                in_oneof(field("a", 1, Type::String), 0),
                field("x", 2, Type::String),
                in_oneof(field("b", 3, Type::String), 0),
            ],
        )
    };

    let file = FileDescriptorProto {
        name: Some("pkg/testing.proto".to_string()),
        package: Some("pkg".to_string()),
        message_type: vec![
            message("HelloRequest", vec![field("name", 1, Type::String)]),
            message("HelloReply", vec![field("message", 1, Type::String)]),
            profile,
            choice,
            message(
                "Node",
                vec![
                    field("value", 1, Type::String),
                    typed("next", 2, Type::Message, ".pkg.Node"),
                    repeated(typed("children", 3, Type::Message, ".pkg.Node")),
                ],
            ),
            message("Ping", vec![typed("pong", 1, Type::Message, ".pkg.Pong")]),
            message("Pong", vec![typed("ping", 1, Type::Message, ".pkg.Ping")]),
        ],
        enum_type: vec![EnumDescriptorProto {
            name: Some("Status".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("STATUS_UNKNOWN".to_string()),
                    number: Some(0),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("STATUS_ACTIVE".to_string()),
                    number: Some(1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }],
        service: vec![
            ServiceDescriptorProto {
                name: Some("Greeter".to_string()),
                method: vec![
                    method("SayHello", "HelloRequest", false),
                    method("Collect", "HelloRequest", true),
                ],
                ..Default::default()
            },
            ServiceDescriptorProto {
                name: Some("Admin".to_string()),
                method: vec![
                    method("Reset", "HelloRequest", false),
                    method("Audit", "HelloRequest", false),
                ],
                ..Default::default()
            },
        ],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    };

    DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] })
        .expect("valid test descriptors")
}
