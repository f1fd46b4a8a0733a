use greeter_service::{FILE_DESCRIPTOR_SET, GreeterServer};
use greeter_service_impl::GreeterImpl;
use prost_reflect::DescriptorPool;
use rpcdeck_core::reflection::client::{ReflectionClient, ReflectionResolveError};
use rpcdeck_core::schema::SchemaRegistry;
use rpcdeck_core::telemetry::{CallContext, RpcStats, StatsHandler, Telemetry};
use std::sync::{Arc, Mutex};
use tonic::Code;
use tonic_reflection::server::v1::ServerReflectionServer;


/// Records the context and kind of every telemetry record.
#[derive(Default)]
struct Recorder(Mutex<Vec<(CallContext, &'static str)>>);

impl StatsHandler for Recorder {
    fn handle_rpc(&self, ctx: &CallContext, stats: &RpcStats) {
        let kind = match stats {
            RpcStats::InPayload { .. } => "payload",
            RpcStats::End { .. } => "end",
        };
        self.0.lock().unwrap().push((*ctx, kind));
    }
}

fn setup_reflection_client(
    telemetry: Telemetry,
) -> ReflectionClient<ServerReflectionServer<impl tonic_reflection::server::v1::ServerReflection>> {
    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .expect("Failed to setup Reflection Service");

    ReflectionClient::new(reflection_service, telemetry)
}

#[tokio::test]
async fn test_reflection_client_fetches_service_file_descriptor() {
    let mut client = setup_reflection_client(Telemetry::new());

    let fd_set = client
        .file_descriptor_set_by_symbol("pkg.Greeter")
        .await
        .expect("Failed to fetch file descriptor set by symbol");

    let pool =
        DescriptorPool::from_file_descriptor_set(fd_set).expect("Failed to build descriptor pool");

    let service = pool
        .get_service_by_name("pkg.Greeter")
        .expect("Failed to find service in file descriptor");

    let chat = service.methods().find(|m| m.name() == "Chat").unwrap();
    assert!(chat.is_client_streaming());
    assert!(chat.is_server_streaming());

    let delay = service.methods().find(|m| m.name() == "Delay").unwrap();
    assert_eq!(delay.input().full_name(), "pkg.DelayRequest");
    assert_eq!(delay.output().full_name(), "pkg.HelloReply");
}

#[tokio::test]
async fn test_reflection_client_lists_services() {
    let mut client = setup_reflection_client(Telemetry::new());

    let services = client.list_services().await.unwrap();

    assert!(services.contains(&"pkg.Greeter".to_string()));
    assert!(services.contains(&"grpc.reflection.v1.ServerReflection".to_string()));
}

#[tokio::test]
async fn test_discovery_collects_every_listed_service() {
    let mut client = setup_reflection_client(Telemetry::new());

    let registry = SchemaRegistry::discover(&mut client).await.unwrap();

    let names: Vec<_> = registry
        .services()
        .into_iter()
        .map(|service| service.full_name)
        .collect();
    assert_eq!(
        names,
        vec!["grpc.reflection.v1.ServerReflection", "pkg.Greeter"]
    );
    assert!(registry.find_method("/pkg.Greeter/SayHello").is_ok());
}

#[tokio::test]
async fn test_reflection_calls_are_tracked_as_internal() {
    let telemetry = Telemetry::new();
    let recorder = Arc::new(Recorder::default());
    telemetry.register(recorder.clone());

    let mut client = setup_reflection_client(telemetry);
    client.all_services_file_descriptor_set().await.unwrap();

    let records = recorder.0.lock().unwrap();
    assert!(!records.is_empty());
    assert!(records.iter().all(|(ctx, _)| ctx.is_internal()));
    assert_eq!(records.iter().filter(|(_, kind)| *kind == "end").count(), 2);
}

#[tokio::test]
async fn test_reflection_service_not_found_error() {
    let mut client = setup_reflection_client(Telemetry::new());

    let result = client
        .file_descriptor_set_by_symbol("non.existent.Service")
        .await;

    assert!(matches!(
        result,
        Err(ReflectionResolveError::ServerStreamFailure(status)) if status.code() == Code::NotFound
    ));
}

#[tokio::test]
async fn test_server_does_not_support_reflection() {
    let telemetry = Telemetry::new();
    let recorder = Arc::new(Recorder::default());
    telemetry.register(recorder.clone());

    // This server does NOT have the Reflection service registered.
    let server = GreeterServer::new(GreeterImpl);
    let mut client = ReflectionClient::new(server, telemetry);

    let result = client.file_descriptor_set_by_symbol("pkg.Greeter").await;

    match result {
        Err(ReflectionResolveError::ServerStreamInitFailed(status)) => {
            assert_eq!(
                status.code(),
                Code::Unimplemented,
                "Expected UNIMPLEMENTED status (service not found), but got: {:?}",
                status
            );
        }
        Err(e) => panic!("Expected StreamInitFailed(Unimplemented), got: {:?}", e),
        Ok(_) => panic!("Expected error, but got successful registry"),
    }

    assert_eq!(
        *recorder.0.lock().unwrap(),
        vec![(CallContext::internal(), "end")]
    );
}
