// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A trivial STUN client: send a binding request over UDP and print the
//! reflexive address from the response.

use std::env;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use stun_wire::message::MessageType;
use stun_wire::parser::Parser;

fn init_logs() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Layer;
    let level_filter = std::env::var("STUN_LOG")
        .ok()
        .and_then(|var| var.parse::<tracing_subscriber::filter::Targets>().ok())
        .unwrap_or(tracing_subscriber::filter::Targets::new().with_default(tracing::Level::ERROR));
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(level_filter),
    );
    tracing::subscriber::set_global_default(registry).unwrap()
}

fn main() -> io::Result<()> {
    init_logs();

    let args: Vec<String> = env::args().collect();
    let to = SocketAddr::from_str(if args.len() > 1 {
        &args[1]
    } else {
        "127.0.0.1:3478"
    })
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let request = stun_wire::binding_request("stun-wire client")
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_read_timeout(Some(Duration::from_secs(3)))?;
    socket.send_to(&request, to)?;
    println!("sent binding request to {to}");

    let mut buf = [0; 1280];
    let (amt, from) = socket.recv_from(&mut buf)?;
    let msg = Parser::new()
        .parse(&buf[..amt])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    info!("received from {from}: {msg}");

    if msg.message_type() != MessageType::BINDING_SUCCESS {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("unexpected response {}", msg.message_type()),
        ));
    }
    let mapped = msg.xor_mapped_address().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "response carries no mapped address")
    })?;
    println!("found visible address {mapped}");
    Ok(())
}
