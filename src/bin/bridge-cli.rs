use clap::{Parser, Subcommand};
use tonic::transport::Channel;
use tonic_reflection::pb::v1::server_reflection_client::ServerReflectionClient;
use tonic_reflection::pb::v1::server_reflection_request::MessageRequest;
use tonic_reflection::pb::v1::server_reflection_response::MessageResponse;
use tonic_reflection::pb::v1::ServerReflectionRequest;

use livekit_bridge::proto::health::health_client::HealthClient;
use livekit_bridge::proto::health::HealthCheckRequest;
use livekit_bridge::proto::ServingStatus;

#[derive(Parser)]
#[command(name = "bridge-cli")]
#[command(about = "Management CLI for the LiveKit gRPC bridge", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:9090")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query grpc.health.v1 for a service ("" is the whole server)
    Health {
        #[arg(short, long, default_value = "")]
        service: String,
    },
    /// List services advertised through reflection
    Services,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let channel = Channel::from_shared(cli.addr)?.connect().await?;

    match cli.command {
        Commands::Health { service } => {
            let mut client = HealthClient::new(channel);
            let response = client
                .check(HealthCheckRequest {
                    service: service.clone(),
                })
                .await?
                .into_inner();
            let status = response.status();
            let name = if service.is_empty() { "<server>" } else { service.as_str() };
            println!("{}: {}", name, status.as_str_name());
            if status != ServingStatus::Serving {
                std::process::exit(1);
            }
        }
        Commands::Services => {
            let mut client = ServerReflectionClient::new(channel);
            let request = ServerReflectionRequest {
                host: String::new(),
                message_request: Some(MessageRequest::ListServices(String::new())),
            };
            let mut responses = client
                .server_reflection_info(tokio_stream::iter(vec![request]))
                .await?
                .into_inner();

            match responses.message().await?.and_then(|r| r.message_response) {
                Some(MessageResponse::ListServicesResponse(list)) => {
                    for service in list.service {
                        println!("{}", service.name);
                    }
                }
                Some(MessageResponse::ErrorResponse(err)) => {
                    return Err(format!("reflection error {}: {}", err.error_code, err.error_message).into());
                }
                _ => return Err("unexpected reflection response".into()),
            }
        }
    }

    Ok(())
}
