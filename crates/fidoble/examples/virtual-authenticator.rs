//! Virtual authenticator demo.
//!
//! Sends a multi-fragment `MSG` request over a 20 byte control point to a
//! virtual authenticator that reports "processing" twice before answering.
//!
//! Run with: `cargo run -p fidoble --example virtual-authenticator`

use std::time::Duration;

use fidoble::frame::{Frame, FrameCommand};
use fidoble::simulator::{Behavior, VirtualAuthenticator};
use fidoble::transaction::{BleTransport, TransactionConfig};
use fidoble::transport::channel_link;

const CONTROL_POINT_LENGTH: u16 = 20;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (connection, notifications, peer) = channel_link(16);
    let behavior = Behavior::KeepAliveThenEcho {
        count: 2,
        interval: Duration::from_millis(250),
    };
    let device =
        tokio::spawn(VirtualAuthenticator::new(peer, CONTROL_POINT_LENGTH, behavior).run());

    let mut transport = BleTransport::new(
        connection,
        notifications,
        CONTROL_POINT_LENGTH,
        TransactionConfig::default(),
    );

    let request = Frame::new(FrameCommand::Msg, b"register: example.com".to_vec());
    let response = transport.transact(request).await?;
    println!(
        "response: {} ({} bytes) {:?}",
        response.command(),
        response.data().len(),
        String::from_utf8_lossy(response.data())
    );

    drop(transport);
    let transcript = device.await?;
    for event in &transcript.events {
        println!("{:<13} {:02x?}", event.direction, event.data.as_ref());
    }
    Ok(())
}
