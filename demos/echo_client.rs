//! Echo Client Demo
//!
//! Spawn echo server lokal, connect lewat Connection, kirim beberapa
//! frame dan print yang mantul balik. Semua callback jalan di I/O
//! thread milik connection.
//!
//! Usage:
//!   cargo run --example echo_client

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use iris::{Connection, ConnectionConfig, ConnectionListener, Endpoint, Frame};

struct EchoPrinter;

impl ConnectionListener for EchoPrinter {
    fn connected(&self) {
        println!("[client] connected");
    }

    fn disconnected(&self) {
        println!("[client] disconnected");
    }

    fn received_frame(&self, frame: Frame) {
        println!(
            "[client] echo op={} payload={:?}",
            frame.opcode(),
            String::from_utf8_lossy(frame.payload())
        );
    }

    fn received_frames(&self, frames: Vec<Frame>) {
        println!("[client] {} echoes in one batch:", frames.len());
        for frame in frames {
            println!(
                "[client]   op={} payload={:?}",
                frame.opcode(),
                String::from_utf8_lossy(frame.payload())
            );
        }
    }
}

/// Echo server sekali pakai: mantulkan semua bytes apa adanya
fn spawn_echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind echo server");
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        if let Ok((mut stream, addr)) = listener.accept() {
            println!("[server] client from {}", addr);
            stream.set_nodelay(true).ok();
            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if stream.write_all(&buf[..n]).is_err() {
                            break;
                        }
                    }
                }
            }
            println!("[server] client gone");
        }
    });

    port
}

fn main() {
    let port = spawn_echo_server();

    let conn: Connection<Frame> =
        Connection::new(Arc::new(EchoPrinter), ConnectionConfig::default());
    conn.connect(Endpoint::new("127.0.0.1", port));

    // send() aman dari thread mana pun; di sini main thread
    for (opcode, text) in [(1u8, "halo"), (2, "iris"), (3, "echo")] {
        let frame = Frame::new(opcode, text.as_bytes().to_vec()).expect("payload <= 255");
        conn.send(frame);
    }

    thread::sleep(Duration::from_millis(500));
    conn.disconnect();
}
