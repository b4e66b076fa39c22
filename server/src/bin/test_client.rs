//! Hand-driven protocol exerciser: sends an init announcing a username and
//! room, then heartbeats once a second, printing every frame the server
//! answers with. Run the server with `--demo` and pass the room key it logs:
//!
//! ```text
//! test_client [server_addr] [account_id] [username] [room]
//! ```

use shared::{
    enc_string, encode_request_frame, MsgType, FLAG_CONTINUATION, FLAG_MULTI, HEADER_LEN,
    HEADER_LEN_CONT, MAGIC,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

fn describe_frame(buf: &[u8]) -> String {
    if buf.len() < 16 || buf[0..2] != MAGIC {
        return format!("{} bytes of non-protocol data", buf.len());
    }
    let seq = u16::from_le_bytes([buf[11], buf[12]]);
    let flags = buf[15];
    let continuation = flags & FLAG_CONTINUATION != 0;
    let multi = flags & FLAG_MULTI != 0;

    if continuation {
        let payload = buf.len().saturating_sub(HEADER_LEN_CONT);
        return format!("seq {} continuation fragment, {} payload bytes", seq, payload);
    }

    let type_desc = match MsgType::from_code(buf[25]) {
        Some(ty) => format!("{:?}", ty),
        None => format!("type {:#04x}", buf[25]),
    };
    format!(
        "seq {} {}{}, {} payload bytes",
        seq,
        type_desc,
        if multi { " (multi-fragment)" } else { "" },
        buf.len().saturating_sub(HEADER_LEN)
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let server_addr: SocketAddr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:27015".to_string())
        .parse()?;
    let account_id: i64 = args.next().unwrap_or_else(|| "42".to_string()).parse()?;
    let username = args.next().unwrap_or_else(|| "Rook".to_string());
    let room = args.next().unwrap_or_else(|| "c_1_0".to_string());

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    // Init: two unknown bytes, then username and room name.
    let mut payload = vec![0u8, 0u8];
    payload.extend_from_slice(&enc_string(&username));
    payload.extend_from_slice(&enc_string(&room));

    let mut seq: u16 = 1;
    let init = encode_request_frame(MsgType::C2sInit.code(), account_id, &payload, 1, seq);
    println!("Sending init as {} ({:?}) for room {:?}", account_id, username, room);
    socket.send_to(&init, server_addr).await?;

    let mut buf = [0u8; 2048];

    // Heartbeat once a second for a while, draining whatever the server
    // sends back in between.
    for _ in 0..15 {
        loop {
            match timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await {
                Ok(Ok((len, _))) => println!("  <- {}", describe_frame(&buf[..len])),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break,
            }
        }

        sleep(Duration::from_secs(1)).await;
        seq += 1;
        let heartbeat = encode_request_frame(MsgType::C2sHeartbeat.code(), account_id, &[], 3, seq);
        socket.send_to(&heartbeat, server_addr).await?;
        println!("Sent heartbeat (seq {})", seq);
    }

    Ok(())
}
