//! Client connection backed by background threads for decoding and encoding packets.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, Shutdown};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use std::thread;

use crossbeam_channel::{bounded, Sender, Receiver, TryRecvError};

use mio::{Poll, Events, Interest, Token};
use mio::net::TcpStream;
use mio::event::Event;

use tracing::{trace, warn};

use redstone::proto::{InPacket, OutPacket};


/// A connection to a server, backed by two background threads, one polling and decoding
/// incoming packets, the other one encoding and writing outgoing packets.
///
/// The threads terminate once the connection is lost and the handle is dropped.
#[derive(Debug)]
pub struct Connection {
    /// This channel allows sending commands to the command thread.
    commands_sender: Sender<ThreadCommand>,
    /// This channel allows receiving events from the poll thread.
    events_receiver: Receiver<ThreadEvent>,
}

impl Connection {

    /// Connect to the given server address, this blocks until the connection is
    /// established.
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {

        let stream = std::net::TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        let mut stream = TcpStream::from_std(stream);

        let poll = Poll::new()?;
        poll.registry().register(&mut stream, STREAM_TOKEN, Interest::READABLE)?;

        let shared = Arc::new(SharedStream {
            stream: RwLock::new(stream),
        });

        let (
            commands_sender,
            commands_receiver
        ) = bounded(1000);

        let (
            events_sender,
            events_receiver
        ) = bounded(1000);

        let poll_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("Packet Poll Thread".to_string())
            .spawn(move || {
                PollThread {
                    events_sender,
                    shared: poll_shared,
                    poll,
                    buf: Vec::new(),
                }.run();
            })?;

        thread::Builder::new()
            .name("Packet Command Thread".to_string())
            .spawn(move || {
                CommandThread {
                    commands_receiver,
                    shared,
                }.run();
            })?;

        Ok(Self {
            commands_sender,
            events_receiver,
        })

    }

    /// Poll the next event of this connection, if any. Once a [`NetEvent::Lost`] has
    /// been returned, the connection can no longer be used.
    pub fn poll(&self) -> Option<NetEvent> {
        loop { // A loop to ignore channel check.
            return Some(match self.events_receiver.try_recv() {
                Ok(ThreadEvent::ChannelCheck) => continue,
                Ok(ThreadEvent::Packet(packet)) => NetEvent::Packet(packet),
                Ok(ThreadEvent::Lost(error)) => NetEvent::Lost(error),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) =>
                    NetEvent::Lost(Some(new_io_abort_error("poll thread terminated"))),
            });
        }
    }

    pub fn send(&self, packet: OutPacket) {
        // NOTE: Commands channel can never disconnect if a handle exists.
        self.commands_sender.try_send(ThreadCommand::Packet(packet))
            .expect("commands channel is full");
    }

    /// Shutdown the connection, a [`NetEvent::Lost`] event will follow.
    pub fn disconnect(&self) {
        self.commands_sender.try_send(ThreadCommand::Disconnect)
            .expect("commands channel is full");
    }

}

/// An event of the connection.
#[derive(Debug)]
pub enum NetEvent {
    /// A packet was received from the server.
    Packet(InPacket),
    /// The connection was lost, with the error that caused it, no error means that the
    /// server closed the connection or that it was disconnected by the client.
    Lost(Option<io::Error>),
}


/// Internal polling token used for the stream.
const STREAM_TOKEN: Token = Token(0);
/// Size of the chunks read from the stream at once.
const BUF_SIZE: usize = 1024;


/// The stream shared by both threads.
#[derive(Debug)]
struct SharedStream {
    /// The stream is behind a read/write lock because most of the time it is accessed
    /// immutably, it is only accessed mutably to deregister it from the poll instance.
    stream: RwLock<TcpStream>,
}

/// Internal thread polling and decoding the incoming data.
struct PollThread {
    /// Events sent to the handle.
    events_sender: Sender<ThreadEvent>,
    /// The stream shared with the command thread.
    shared: Arc<SharedStream>,
    /// The poll used for event listening TCP events.
    poll: Poll,
    /// Incoming data that has not yet been decoded, it grows when a packet doesn't fit.
    buf: Vec<u8>,
}

impl PollThread {

    fn run(mut self) {

        let mut events = Events::with_capacity(16);

        // While events channel is not disconnected.
        while self.events_sender.send(ThreadEvent::ChannelCheck).is_ok() {
            match self.poll(&mut events) {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    self.close(Some(e));
                    return;
                }
            }
        }

    }

    /// Internal function just to make error try in common. If this function returns an
    /// error, the connection should be closed, if it returns false the thread should
    /// stop.
    fn poll(&mut self, events: &mut Events) -> io::Result<bool> {

        // NOTE: We use 1 second timeout in order to regularly check channel.
        self.poll.poll(events, Some(Duration::from_secs(1)))?;

        for event in events.iter() {
            if event.token() == STREAM_TOKEN && !self.handle_event(event)? {
                return Ok(false);
            }
        }

        Ok(true)

    }

    fn handle_event(&mut self, event: &Event) -> io::Result<bool> {

        if event.is_readable() {
            // Data may be available along with a read closed flag, read it first.
            if !self.handle_read()? {
                return Ok(false);
            }
        }

        if event.is_read_closed() || event.is_write_closed() {
            self.close(None);
            return Ok(false);
        }

        Ok(true)

    }

    /// Handle a readable event. This returns false if the thread should stop.
    fn handle_read(&mut self) -> io::Result<bool> {

        {
            let stream = self.shared.stream.read().expect("poisoned");
            let mut stream = &*stream;
            let mut chunk = [0; BUF_SIZE];

            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(len) => self.buf.extend_from_slice(&chunk[..len]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        let mut read_length = 0;

        while read_length < self.buf.len() {

            let (packet, len) = match InPacket::decode(&self.buf[read_length..]) {
                Ok(ret) => ret,
                // The packet is not fully received, wait for more data.
                Err(e) if e.is_incomplete() => break,
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            };

            trace!("received packet {}", packet.id());
            read_length += len;

            // If the channel was disconnected, stop the thread because the handle has
            // been dropped.
            if self.events_sender.send(ThreadEvent::Packet(packet)).is_err() {
                return Ok(false);
            }

        }

        // Remove the buffer part that we successfully read.
        self.buf.drain(..read_length);
        Ok(true)

    }

    /// Internal function to shutdown and deregister the stream, then notify the handle.
    fn close(&mut self, error: Option<io::Error>) {

        let mut stream = self.shared.stream.write().expect("poisoned");
        let _ = stream.shutdown(Shutdown::Both);
        let _ = self.poll.registry().deregister(&mut *stream);
        drop(stream);

        // NOTE: We ignore if the channel is disconnected, we terminate anyway.
        let _ = self.events_sender.send(ThreadEvent::Lost(error));

    }

}

/// Internal command thread, encoding and writing outgoing packets. It terminates when
/// the handle is dropped.
struct CommandThread {
    /// This channel allows receiving commands from the handle.
    commands_receiver: Receiver<ThreadCommand>,
    /// The stream shared with the poll thread.
    shared: Arc<SharedStream>,
}

impl CommandThread {

    /// Run the thread until termination.
    fn run(self) {
        // This receive commands while there is any sender.
        while let Ok(command) = self.commands_receiver.recv() {
            match command {
                ThreadCommand::Packet(packet) => self.handle_send(packet),
                ThreadCommand::Disconnect => {
                    // This shutdown is seen by the poll thread that will then deregister
                    // the stream and send the lost event.
                    let stream = self.shared.stream.read().expect("poisoned");
                    let _ = stream.shutdown(Shutdown::Both);
                }
            }
        }
    }

    fn handle_send(&self, packet: OutPacket) {

        let data = match packet.encode() {
            Ok(data) => data,
            Err(e) => {
                warn!("failed to encode packet {}: {e}", packet.id());
                return;
            }
        };

        let stream = self.shared.stream.read().expect("poisoned");
        // NOTE: For now we ignore I/O errors because the poll thread will see them.
        let _ = write_all_nonblocking(&mut &*stream, &data);

    }

}

/// Write the whole data to a non-blocking stream, waiting while it would block.
fn write_all_nonblocking(mut write: impl Write, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match write.write(data) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(len) => data = &data[len..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(Duration::from_millis(1)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

enum ThreadCommand {
    /// Send a single packet to the server.
    Packet(OutPacket),
    /// Sent by the handle to force disconnection.
    Disconnect,
}

enum ThreadEvent {
    /// Internal event to check if the channel is still connected.
    ChannelCheck,
    /// A packet was received from the server.
    Packet(InPacket),
    /// The connection was lost.
    Lost(Option<io::Error>),
}


fn new_io_abort_error(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, message)
}
