use prost::Message;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};
use std::env::var;
use std::io::Result;
use std::path::PathBuf;

// The fixture schema is assembled here rather than read from a .proto file so that
// building the test server never depends on a `protoc` binary being installed.
//
// package pkg;
//
// message HelloRequest { string name = 1; }
// message HelloReply { string message = 1; }
// message DelayRequest { uint32 millis = 1; }
//
// service Greeter {
//   rpc SayHello(HelloRequest) returns (HelloReply);
//   rpc Delay(DelayRequest) returns (HelloReply);
//   rpc CollectHellos(stream HelloRequest) returns (HelloReply);
//   rpc CountHellos(stream HelloRequest) returns (HelloReply);
//   rpc StreamHellos(HelloRequest) returns (stream HelloReply);
//   rpc Chat(stream HelloRequest) returns (stream HelloReply);
// }
fn main() -> Result<()> {
    let out_dir = PathBuf::from(var("OUT_DIR").expect("Missing OUT_DIR environment variable"));

    let file = FileDescriptorProto {
        name: Some("pkg/greeter.proto".to_string()),
        package: Some("pkg".to_string()),
        message_type: vec![
            message("HelloRequest", "name", Type::String),
            message("HelloReply", "message", Type::String),
            message("DelayRequest", "millis", Type::Uint32),
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("Greeter".to_string()),
            method: vec![
                method("SayHello", "HelloRequest", false, false),
                method("Delay", "DelayRequest", false, false),
                method("CollectHellos", "HelloRequest", true, false),
                method("CountHellos", "HelloRequest", true, false),
                method("StreamHellos", "HelloRequest", false, true),
                method("Chat", "HelloRequest", true, true),
            ],
            ..Default::default()
        }],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    };

    let fd_set = FileDescriptorSet { file: vec![file] };

    std::fs::write(out_dir.join("descriptors.bin"), fd_set.encode_to_vec())?;

    tonic_prost_build::configure()
        .build_client(false)
        .compile_fds(fd_set)?;

    Ok(())
}

fn message(name: &str, field: &str, ty: Type) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: vec![FieldDescriptorProto {
            name: Some(field.to_string()),
            number: Some(1),
            label: Some(Label::Optional as i32),
            r#type: Some(ty as i32),
            json_name: Some(field.to_string()),
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn method(
    name: &str,
    input: &str,
    client_streaming: bool,
    server_streaming: bool,
) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(format!(".pkg.{input}")),
        output_type: Some(".pkg.HelloReply".to_string()),
        client_streaming: Some(client_streaming),
        server_streaming: Some(server_streaming),
        ..Default::default()
    }
}
