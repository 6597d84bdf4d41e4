// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Best-effort UDP datagram sink for redirected diagnostic output.
// Author: Lukas Bower

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// Largest payload sent in one datagram.
pub const UDP_CHUNK_SIZE: usize = 256;

/// Line-oriented, unacknowledged datagram sink.
#[derive(Debug)]
pub struct UdpSink {
    socket: Option<UdpSocket>,
    dest: SocketAddrV4,
}

impl UdpSink {
    /// Bind an ephemeral socket that sends to `dest`.
    pub fn connect(dest: SocketAddrV4) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        Ok(Self {
            socket: Some(socket),
            dest,
        })
    }

    /// Destination address.
    #[must_use]
    pub fn destination(&self) -> SocketAddrV4 {
        self.dest
    }

    /// Send `buf` in chunks of at most [`UDP_CHUNK_SIZE`] bytes.
    ///
    /// Delivery is best-effort; once closed, writes succeed without sending.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let Some(socket) = self.socket.as_ref() else {
            return buf.len();
        };
        for chunk in buf.chunks(UDP_CHUNK_SIZE) {
            let _ = socket.send_to(chunk, self.dest);
        }
        buf.len()
    }

    /// Close the socket. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.socket = None;
    }

    /// Whether the socket is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}
