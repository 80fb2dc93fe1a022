use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use clap_derive::Parser;
use gamewire::channel::udp::UdpChannel;
use gamewire::config::ConnectionConfig;
use gamewire::connection::datagram_connection::DatagramConnection;
use gamewire::connection::processor::ForwardingProcessor;
use gamewire::message::owned_message::OwnedMessage;
use gamewire::queue::MessageQueue;
use tracing::{info, warn, Level};

#[derive(Parser)]
struct Args {
    #[clap(default_value = "0.0.0.0:60000")]
    address: String,

    #[clap(long)]
    max_body_len: Option<usize>,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut config = ConnectionConfig::default();
    if let Some(max_body_len) = args.max_body_len {
        config.max_body_len = max_body_len;
    }

    let addr: SocketAddr = args.address.parse()?;
    let channel = Arc::new(UdpChannel::bind(addr).await?);

    let inbound = Arc::new(MessageQueue::<OwnedMessage>::new());
    let processor = Arc::new(ForwardingProcessor::new(inbound.clone()));
    let connection: Arc<DatagramConnection<_, _>> = Arc::new(DatagramConnection::new(channel, processor, &config)?);
    connection.listen_for_messages();
    info!("echoing messages on {:?}", connection.local_addr());

    // the application side: block on the queue, and echo every message back to its sender
    let echo = {
        let connection = connection.clone();
        let inbound = inbound.clone();
        tokio::task::spawn_blocking(move || {
            while inbound.wait().is_ok() {
                while let Some(msg) = inbound.pop_front() {
                    info!("{} from {}", msg.message, msg.endpoint);
                    if let Err(e) = connection.send_message(msg) {
                        warn!("could not echo message: {}", e);
                    }
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    connection.close();
    inbound.close();
    echo.await?;
    Ok(())
}
