use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::directory::{MembershipRank, MemoryDirectory};
use server::network::Server;

/// Main-method of the application.
/// Parses command-line arguments, then binds the UDP socket and runs the
/// receive loop until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "27015")]
        port: u16,
        /// Community whose room is minted at startup
        #[clap(long, default_value = "1")]
        community: i64,
        /// Seed a demo account (42, "Rook") with membership in the startup
        /// community, for exercising the protocol with the test client
        #[clap(long)]
        demo: bool,
    }

    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        ..ServerConfig::default()
    };

    // Stand-in for the external account/membership store.
    let directory = MemoryDirectory::new();
    if args.demo {
        directory.insert_account(42, "Rook").await;
        directory
            .insert_membership(42, args.community, MembershipRank::Member)
            .await;
        info!("seeded demo account 42 (Rook) in community {}", args.community);
    }

    let server = Server::bind(config, directory.clone(), directory).await?;

    // The community-browse surface normally mints rooms on demand; mint the
    // default community's room up front so clients have one to name.
    let room_key = server.rooms().write().await.room_for_community(args.community);
    info!("room {} ready for community {}", room_key, args.community);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server terminated: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
