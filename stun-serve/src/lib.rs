// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # stun-serve
//!
//! A minimal STUN binding echo service on top of [`stun_wire`]: every
//! parseable binding request is answered with a binding success carrying
//! the peer's reflexive address in XOR-MAPPED-ADDRESS.  Anything else —
//! unparseable datagrams, other message types, build failures — is
//! silently dropped, as a STUN server must never amplify garbage.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use tracing::{debug, info};

use stun_wire::builder::MessageBuilder;
use stun_wire::message::MessageType;
use stun_wire::parser::Parser;

/// Answer binding requests on `socket` until a transport error occurs.
///
/// # Examples
///
/// ```no_run
/// let socket = std::net::UdpSocket::bind("127.0.0.1:3478").unwrap();
/// stun_serve::serve(&socket).unwrap();
/// ```
pub fn serve(socket: &UdpSocket) -> io::Result<()> {
    let parser = Parser::new();
    let mut buf = [0; 1280];
    loop {
        let (amt, from) = socket.recv_from(&mut buf)?;
        let Some(response) = handle_datagram(&parser, &buf[..amt], from) else {
            continue;
        };
        info!("answering binding request from {from}");
        if let Err(e) = socket.send_to(&response, from) {
            debug!("failed to send response to {from}: {e}");
        }
    }
}

/// Produce the response datagram for `data`, or `None` when the datagram
/// is to be dropped.
fn handle_datagram(parser: &Parser, data: &[u8], from: SocketAddr) -> Option<Vec<u8>> {
    let msg = match parser.parse(data) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("dropping datagram from {from}: {e}");
            return None;
        }
    };
    if msg.message_type() != MessageType::BINDING_REQUEST {
        debug!("ignoring {} from {from}", msg.message_type());
        return None;
    }
    let mut response = MessageBuilder::new(MessageType::BINDING_SUCCESS, msg.transaction_id());
    response.set_xor_mapped_address(from);
    response.build().ok()
}
